//! In-memory Redmine used by remote-store and sync tests.
//!
//! Speaks just enough of the REST surface: paginated listing with `cf_N`
//! filters, single-issue GET, create, and update with `notes` journals.
//! Can be switched offline (every request fails with a connect error) or
//! forced to answer with a fixed HTTP status.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::config::ResolvedRedmineSettings;
use crate::error::NetworkErrorKind;
use crate::model::Task;
use crate::remote::client::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::remote::mapping::{custom_field, task_to_issue_payload};

pub const BASE_URL: &str = "http://redmine.test";

#[derive(Default)]
struct FakeState {
    issues: BTreeMap<u64, Value>,
    next_id: u64,
    offline: bool,
    forced_status: Option<u16>,
    requests: Vec<HttpRequest>,
}

#[derive(Default)]
pub struct FakeRedmine {
    state: Mutex<FakeState>,
}

fn respond(status: u16, body: &Value) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_string(),
    }
}

fn priority_name(id: u64) -> &'static str {
    match id {
        1 => "Low",
        2 => "Normal",
        3 => "High",
        4 => "Urgent",
        _ => "Immediate",
    }
}

/// Apply a create/update payload to a stored issue.
fn apply_payload(issue: &mut Value, payload: &Value) {
    let Some(fields) = payload.get("issue").and_then(Value::as_object) else {
        return;
    };
    for (key, value) in fields {
        match key.as_str() {
            "status_id" => {
                issue["status"] = json!({"id": value, "name": format!("status-{value}")});
            }
            "priority_id" => {
                let name = priority_name(value.as_u64().unwrap_or(0));
                issue["priority"] = json!({"id": value, "name": name});
            }
            "assigned_to_id" => issue["assigned_to"] = json!({"id": value}),
            "notes" => {
                if let Some(journals) = issue["journals"].as_array_mut() {
                    journals.push(json!({"notes": value}));
                }
            }
            "custom_fields" => {
                let existing = issue["custom_fields"].as_array_mut().expect("custom_fields");
                for field in value.as_array().into_iter().flatten() {
                    let id = field["id"].clone();
                    match existing.iter_mut().find(|f| f["id"] == id) {
                        Some(slot) => slot["value"] = field["value"].clone(),
                        None => existing.push(json!({"id": id, "value": field["value"]})),
                    }
                }
            }
            _ => issue[key.as_str()] = value.clone(),
        }
    }
}

impl FakeRedmine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn force_status(&self, status: Option<u16>) {
        self.state.lock().unwrap().forced_status = status;
    }

    /// Store a raw issue; returns its id.
    pub fn insert_issue(&self, mut issue: Value) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        issue["id"] = json!(id);
        if issue.get("custom_fields").is_none() {
            issue["custom_fields"] = json!([]);
        }
        if issue.get("journals").is_none() {
            issue["journals"] = json!([]);
        }
        state.issues.insert(id, issue);
        id
    }

    /// Store an issue the way a create for `task` would.
    pub fn seed_task(&self, task: &Task, settings: &ResolvedRedmineSettings) -> u64 {
        let mut issue = json!({"custom_fields": [], "journals": []});
        apply_payload(&mut issue, &task_to_issue_payload(task, settings));
        self.insert_issue(issue)
    }

    pub fn issue(&self, id: u64) -> Option<Value> {
        self.state.lock().unwrap().issues.get(&id).cloned()
    }

    pub fn issue_count(&self) -> usize {
        self.state.lock().unwrap().issues.len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, method: HttpMethod) -> usize {
        self.requests().iter().filter(|r| r.method == method).count()
    }

    /// Journal notes posted to an issue, oldest first.
    pub fn notes(&self, id: u64) -> Vec<String> {
        self.issue(id)
            .and_then(|issue| issue["journals"].as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|j| j["notes"].as_str().map(String::from))
            .collect()
    }

    fn handle(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        if state.offline {
            return Err(TransportError {
                kind: NetworkErrorKind::Connect,
                message: "connection refused".into(),
            });
        }
        if let Some(status) = state.forced_status {
            return Ok(respond(status, &json!({"errors": ["forced"]})));
        }

        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .trim_start_matches('/');
        let single = path
            .strip_prefix("issues/")
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|id| id.parse::<u64>().ok());

        match (request.method, path, single) {
            (HttpMethod::Get, "issues.json", _) => {
                let filters: Vec<(u64, &str)> = request
                    .query
                    .iter()
                    .filter_map(|(k, v)| {
                        let id = k.strip_prefix("cf_")?.parse().ok()?;
                        Some((id, v.as_str()))
                    })
                    .collect();
                let matching: Vec<&Value> = state
                    .issues
                    .values()
                    .filter(|issue| {
                        filters.iter().all(|(id, want)| {
                            custom_field(issue, *id).and_then(Value::as_str) == Some(*want)
                        })
                    })
                    .collect();
                let offset: usize = request.param("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
                let limit: usize = request.param("limit").and_then(|v| v.parse().ok()).unwrap_or(25);
                let page: Vec<Value> = matching.iter().skip(offset).take(limit).map(|v| (*v).clone()).collect();
                Ok(respond(
                    200,
                    &json!({"issues": page, "total_count": matching.len(), "offset": offset, "limit": limit}),
                ))
            }
            (HttpMethod::Get, _, Some(id)) => match state.issues.get(&id) {
                Some(issue) => Ok(respond(200, &json!({"issue": issue}))),
                None => Ok(respond(404, &json!({}))),
            },
            (HttpMethod::Post, "issues.json", _) => {
                state.next_id += 1;
                let id = state.next_id;
                let mut issue = json!({"id": id, "custom_fields": [], "journals": []});
                apply_payload(&mut issue, request.body.as_ref().unwrap_or(&Value::Null));
                state.issues.insert(id, issue.clone());
                Ok(respond(201, &json!({"issue": issue})))
            }
            (HttpMethod::Put, _, Some(id)) => match state.issues.get_mut(&id) {
                Some(issue) => {
                    apply_payload(issue, request.body.as_ref().unwrap_or(&Value::Null));
                    Ok(HttpResponse {
                        status: 204,
                        body: String::new(),
                    })
                }
                None => Ok(respond(404, &json!({}))),
            },
            _ => Ok(respond(404, &json!({}))),
        }
    }
}

impl HttpTransport for FakeRedmine {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.handle(request)
    }
}

/// Settings pointing at the fake, with no retry delay and no batch pause.
pub fn test_settings() -> ResolvedRedmineSettings {
    let mut settings = ResolvedRedmineSettings::new(BASE_URL, "test-key", "agents", 1);
    settings.custom_fields.verify = Some(2);
    settings.custom_fields.commit = Some(3);
    settings.custom_fields.comments = Some(4);
    settings.custom_fields.doc = Some(5);
    settings.custom_fields.doc_version = Some(6);
    settings.custom_fields.doc_updated_at = Some(7);
    settings.custom_fields.doc_updated_by = Some(8);
    settings.attempts = 1;
    settings.backoff = std::time::Duration::ZERO;
    settings.batch_pause = std::time::Duration::ZERO;
    settings
}
