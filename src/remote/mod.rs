//! Redmine adapter.
//!
//! - [`client`] - JSON REST client with retry and the transport seam
//! - [`mapping`] - task ↔ issue conversion
//! - [`store`] - `RemoteTaskStore`, the Redmine-backed `TaskBackend`

pub mod client;
pub mod mapping;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, RedmineClient, ReqwestTransport,
    RetryPolicy, TransportError,
};
pub use mapping::{DecodedField, decode_json_field, issue_to_task, task_to_issue_payload};
pub use store::RemoteTaskStore;
