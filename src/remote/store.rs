//! Redmine-backed task store.
//!
//! With a cache configured, the local store mirrors remote state and
//! absorbs writes while Redmine is unreachable (flagged `dirty`). Only
//! [`Error::RedmineUnavailable`] triggers that fallback; a rejection from a
//! reachable server is surfaced as-is.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::{Value, json};

use crate::config::ResolvedRedmineSettings;
use crate::error::{Error, Result};
use crate::model::doc::{DocTouch, apply_doc_metadata};
use crate::model::task_id::{ensure_valid_task_id, generate_task_id};
use crate::model::{DEFAULT_DOC_UPDATER, Task, TaskComment};
use crate::remote::client::{HttpTransport, RedmineClient, ReqwestTransport, RetryPolicy};
use crate::remote::mapping::{
    comments_field_value, issue_id, issue_task_id, issue_to_task, task_to_issue_payload,
};
use crate::storage::backend::{BackendCapabilities, TaskBackend};
use crate::storage::local::LocalTaskStore;
use crate::sync::{DEFAULT_MANAGED_BY, SyncOptions, SyncReport, TasksExport, engine, write_export};

/// Issues fetched per listing page.
pub const PAGE_SIZE: usize = 100;

/// Redmine store with an optional local cache.
#[derive(Debug)]
pub struct RemoteTaskStore<T = ReqwestTransport> {
    client: RedmineClient<T>,
    settings: ResolvedRedmineSettings,
    cache: Option<LocalTaskStore>,
    managed_by: String,
}

impl RemoteTaskStore<ReqwestTransport> {
    /// Store talking to a real Redmine over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect(settings: ResolvedRedmineSettings, cache: Option<LocalTaskStore>) -> Result<Self> {
        let transport = ReqwestTransport::new(settings.timeout)?;
        Ok(Self::with_transport(settings, transport, cache))
    }
}

/// Format one comment as a Redmine journal note.
#[must_use]
pub fn comment_note(comment: &TaskComment) -> String {
    format!("{}: {}", comment.author, comment.body)
}

/// Comments in `desired` past the end of `existing`, if `desired` extends it.
///
/// Returns an empty slice when `desired` is not strictly longer or does not
/// start with `existing`.
#[must_use]
pub fn new_comments<'a>(existing: &[TaskComment], desired: &'a [TaskComment]) -> &'a [TaskComment] {
    if desired.len() <= existing.len() || desired[..existing.len()] != *existing {
        return &[];
    }
    &desired[existing.len()..]
}

impl<T: HttpTransport> RemoteTaskStore<T> {
    pub fn with_transport(
        settings: ResolvedRedmineSettings,
        transport: T,
        cache: Option<LocalTaskStore>,
    ) -> Self {
        let client = RedmineClient::new(
            transport,
            &settings.url,
            &settings.api_key,
            RetryPolicy::new(settings.attempts, settings.backoff),
        );
        Self {
            client,
            settings,
            cache,
            managed_by: DEFAULT_MANAGED_BY.to_string(),
        }
    }

    #[must_use]
    pub fn with_managed_by(mut self, managed_by: impl Into<String>) -> Self {
        self.managed_by = managed_by.into();
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ResolvedRedmineSettings {
        &self.settings
    }

    #[must_use]
    pub fn cache(&self) -> Option<&LocalTaskStore> {
        self.cache.as_ref()
    }

    /// The cache, or a `Backend` error naming the operation that needs it.
    ///
    /// # Errors
    ///
    /// `Backend` when no cache is configured.
    pub fn require_cache(&self, operation: &str) -> Result<&LocalTaskStore> {
        self.cache
            .as_ref()
            .ok_or_else(|| Error::Backend(format!("{operation} requires a local cache")))
    }

    fn default_identity(&self) -> &str {
        self.settings
            .owner_agent
            .as_deref()
            .or_else(|| self.cache.as_ref().map(LocalTaskStore::default_doc_updater))
            .unwrap_or(DEFAULT_DOC_UPDATER)
    }

    fn base_params(&self) -> Vec<(String, String)> {
        vec![
            ("project_id".into(), self.settings.project_id.clone()),
            ("status_id".into(), "*".into()),
            ("limit".into(), PAGE_SIZE.to_string()),
        ]
    }

    async fn list_issues(&self) -> Result<Vec<Value>> {
        let mut issues = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut params = self.base_params();
            params.push(("offset".into(), offset.to_string()));
            let page = self.client.get("issues.json", &params).await?;
            let batch = page
                .get("issues")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let count = batch.len();
            issues.extend(batch);
            offset += count;

            let total = page
                .get("total_count")
                .and_then(Value::as_u64)
                .and_then(|t| usize::try_from(t).ok());
            let done = match total {
                Some(total) => offset >= total || count == 0,
                None => count < PAGE_SIZE,
            };
            if done {
                break;
            }
        }
        tracing::debug!(issues = issues.len(), "listed redmine issues");
        Ok(issues)
    }

    /// Every task on the remote, sorted by id.
    ///
    /// # Errors
    ///
    /// `Backend` if two issues claim the same task id, plus request errors.
    pub async fn list_tasks_remote(&self) -> Result<Vec<Task>> {
        let issues = self.list_issues().await?;

        let mut owners: HashMap<String, u64> = HashMap::new();
        for issue in &issues {
            let Some(task_id) = issue_task_id(issue, &self.settings) else {
                continue;
            };
            let this = issue_id(issue).unwrap_or_default();
            if let Some(first) = owners.insert(task_id.clone(), this) {
                return Err(Error::Backend(format!(
                    "Duplicate task id {task_id} on Redmine issues #{first} and #{this}"
                )));
            }
        }

        let mut tasks: Vec<Task> = issues
            .iter()
            .filter_map(|issue| issue_to_task(issue, &self.settings))
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// The issue carrying `task_id`, looked up by custom-field filter.
    ///
    /// # Errors
    ///
    /// `Backend` if more than one issue carries the id, plus request errors.
    pub async fn find_issue(&self, task_id: &str) -> Result<Option<Value>> {
        let mut params = self.base_params();
        params.push((
            format!("cf_{}", self.settings.custom_fields.task_id),
            task_id.to_string(),
        ));
        let page = self.client.get("issues.json", &params).await?;
        let mut matches: Vec<Value> = page
            .get("issues")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|issue| issue_task_id(issue, &self.settings).as_deref() == Some(task_id))
            .cloned()
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(Error::Backend(format!(
                "Duplicate task id {task_id} on {n} Redmine issues"
            ))),
        }
    }

    /// One task straight from Redmine, no cache involved.
    ///
    /// # Errors
    ///
    /// Request errors and duplicate ids.
    pub async fn get_task_remote(&self, id: &str) -> Result<Option<Task>> {
        Ok(self
            .find_issue(id)
            .await?
            .and_then(|issue| issue_to_task(&issue, &self.settings)))
    }

    /// Post journal notes for comments appended since `existing`.
    ///
    /// Idempotent: nothing is posted unless `desired` strictly extends
    /// `existing`. Each note goes out in the same update that advances the
    /// comments custom field past it, so the field never records a comment
    /// whose note was not posted. Returns the number of notes posted.
    ///
    /// # Errors
    ///
    /// Request errors; notes posted before a failure stay posted.
    pub async fn append_comment_notes(
        &self,
        issue_id: u64,
        existing: &[TaskComment],
        desired: &[TaskComment],
    ) -> Result<usize> {
        let added = new_comments(existing, desired);
        let path = format!("issues/{issue_id}.json");
        for (i, comment) in added.iter().enumerate() {
            let mut update = json!({"notes": comment_note(comment)});
            if let Some(field) = self.settings.custom_fields.comments {
                let posted = &desired[..existing.len() + i + 1];
                update["custom_fields"] =
                    json!([{"id": field, "value": comments_field_value(posted)}]);
            }
            self.client.put(&path, &json!({ "issue": update })).await?;
        }
        if !added.is_empty() {
            tracing::debug!(issue_id, notes = added.len(), "posted comment notes");
        }
        Ok(added.len())
    }

    /// Write one task to Redmine with doc-metadata rules applied.
    ///
    /// Returns the task as written (never dirty). No cache involvement.
    ///
    /// # Errors
    ///
    /// Validation, request and duplicate-id errors.
    pub async fn push_task(
        &self,
        task: &Task,
        updated_by: Option<&str>,
        touch: DocTouch,
    ) -> Result<Task> {
        ensure_valid_task_id(&task.id)?;
        let existing = self.find_issue(&task.id).await?;
        let previous = existing
            .as_ref()
            .and_then(|issue| issue_to_task(issue, &self.settings));

        let mut next = task.with_dirty(false);
        apply_doc_metadata(
            &mut next,
            previous.as_ref(),
            updated_by,
            self.default_identity(),
            touch,
        );

        // New comments reach the comments field only through
        // `append_comment_notes`; until then the field keeps its prior value.
        let prior = previous.map(|p| p.comments).unwrap_or_default();
        let payload = if new_comments(&prior, &next.comments).is_empty() {
            task_to_issue_payload(&next, &self.settings)
        } else {
            let staged = Task {
                comments: prior.clone(),
                ..next.clone()
            };
            task_to_issue_payload(&staged, &self.settings)
        };

        match existing.as_ref().and_then(issue_id) {
            Some(id) => {
                self.client.put(&format!("issues/{id}.json"), &payload).await?;
                self.append_comment_notes(id, &prior, &next.comments).await?;
                tracing::debug!(task_id = %next.id, issue_id = id, "updated redmine issue");
            }
            None => {
                let created = self.client.post("issues.json", &payload).await?;
                let id = created
                    .get("issue")
                    .and_then(issue_id)
                    .ok_or_else(|| Error::Backend("Redmine create response has no issue id".into()))?;
                self.append_comment_notes(id, &prior, &next.comments).await?;
                tracing::debug!(task_id = %next.id, issue_id = id, "created redmine issue");
            }
        }
        Ok(next)
    }

    /// Remote write, falling back to a dirty cache write when unreachable.
    async fn mutate(&self, task: &Task, updated_by: Option<&str>, touch: DocTouch) -> Result<Task> {
        match self.push_task(task, updated_by, touch).await {
            Ok(written) => {
                if let Some(cache) = &self.cache {
                    cache.save_snapshot(&written)?;
                }
                Ok(written)
            }
            Err(e) if e.is_unavailable() => {
                let Some(cache) = &self.cache else {
                    return Err(e);
                };
                tracing::warn!(task_id = %task.id, error = %e, "redmine unreachable; recording change in local cache");
                cache.save(&task.with_dirty(true), updated_by, touch)
            }
            Err(e) => Err(e),
        }
    }

    /// Mirror a remote task into the cache unless a local edit is pending.
    fn refresh_cache(&self, cache: &LocalTaskStore, cached: Option<&Task>, remote: &Task) -> Result<()> {
        match cached {
            Some(local) if local.dirty => Ok(()),
            Some(local) if local.canonical_value() == remote.canonical_value() => Ok(()),
            _ => cache.save_snapshot(remote),
        }
    }

    /// Sleep between batches. `written` counts tasks written so far.
    pub(crate) async fn pace(&self, written: usize, total: usize) {
        let batch = self.settings.batch_size;
        if batch == 0 || written >= total || written % batch != 0 {
            return;
        }
        if !self.settings.batch_pause.is_zero() {
            tracing::debug!(written, total, "pausing between batches");
            tokio::time::sleep(self.settings.batch_pause).await;
        }
    }
}

impl<T: HttpTransport> TaskBackend for RemoteTaskStore<T> {
    fn name(&self) -> &'static str {
        "redmine"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::all()
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let remote = match self.list_tasks_remote().await {
            Ok(remote) => remote,
            Err(e) if e.is_unavailable() => {
                let Some(cache) = &self.cache else {
                    return Err(e);
                };
                tracing::warn!(error = %e, "redmine unreachable; listing from local cache");
                return cache.load_all();
            }
            Err(e) => return Err(e),
        };
        let Some(cache) = &self.cache else {
            return Ok(remote);
        };

        let cached: HashMap<String, Task> = cache
            .load_all()?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        let remote_ids: HashSet<String> = remote.iter().map(|t| t.id.clone()).collect();
        let mut merged = Vec::with_capacity(remote.len());
        for task in remote {
            let local = cached.get(&task.id);
            self.refresh_cache(cache, local, &task)?;
            match local {
                Some(local) if local.dirty => merged.push(local.clone()),
                _ => merged.push(task),
            }
        }
        merged.extend(
            cached
                .into_values()
                .filter(|t| t.dirty && !remote_ids.contains(&t.id)),
        );
        merged.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(merged)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        ensure_valid_task_id(id)?;
        let cached = match &self.cache {
            Some(cache) => cache.load(id)?,
            None => None,
        };
        if let Some(local) = cached.as_ref().filter(|t| t.dirty) {
            return Ok(Some(local.clone()));
        }

        match self.get_task_remote(id).await {
            Ok(Some(remote)) => {
                if let Some(cache) = &self.cache {
                    self.refresh_cache(cache, cached.as_ref(), &remote)?;
                }
                Ok(Some(remote))
            }
            Ok(None) => Ok(None),
            Err(e) if e.is_unavailable() && self.cache.is_some() => {
                tracing::warn!(id, error = %e, "redmine unreachable; reading local cache");
                Ok(cached)
            }
            Err(e) => Err(e),
        }
    }

    async fn write_task(&self, task: &Task) -> Result<()> {
        self.mutate(task, None, DocTouch::IfChanged).await.map(|_| ())
    }

    async fn write_tasks(&self, tasks: &[Task]) -> Result<()> {
        for (i, task) in tasks.iter().enumerate() {
            self.mutate(task, None, DocTouch::IfChanged).await?;
            self.pace(i + 1, tasks.len()).await;
        }
        Ok(())
    }

    async fn export_tasks_json(&self, path: &Path) -> Result<TasksExport> {
        let tasks = self.list_tasks().await?;
        write_export(path, &tasks, &self.managed_by)
    }

    async fn get_task_doc(&self, id: &str) -> Result<Option<String>> {
        Ok(self.get_task(id).await?.and_then(|t| t.doc))
    }

    async fn set_task_doc(&self, id: &str, doc: &str, updated_by: Option<&str>) -> Result<Task> {
        let mut task = self
            .get_task(id)
            .await?
            .ok_or_else(|| Error::TaskNotFound { id: id.to_string() })?;
        task.doc = Some(doc.to_string());
        self.mutate(&task, updated_by, DocTouch::IfChanged).await
    }

    async fn touch_task_doc_metadata(&self, id: &str, updated_by: Option<&str>) -> Result<Task> {
        let task = self
            .get_task(id)
            .await?
            .ok_or_else(|| Error::TaskNotFound { id: id.to_string() })?;
        self.mutate(&task, updated_by, DocTouch::Always).await
    }

    async fn sync(&self, options: &SyncOptions) -> Result<SyncReport> {
        engine::run_sync(self, options).await
    }

    async fn generate_task_id(&self, length: usize, attempts: usize) -> Result<String> {
        generate_task_id(length, attempts, |candidate| async move {
            if let Some(cache) = &self.cache {
                if !cache.is_id_available(&candidate) {
                    return Ok(false);
                }
            }
            match self.find_issue(&candidate).await {
                Ok(found) => Ok(found.is_none()),
                // The cache check above is the best available offline.
                Err(e) if e.is_unavailable() && self.cache.is_some() => Ok(true),
                Err(e) => Err(e),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, TaskStatus};
    use crate::error::NetworkErrorKind;
    use crate::remote::client::{HttpMethod, HttpRequest, HttpResponse, TransportError};
    use crate::remote::testing::{FakeRedmine, test_settings};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const ID: &str = "202601311245-7KQ3";

    fn remote_only(fake: &Arc<FakeRedmine>) -> RemoteTaskStore<Arc<FakeRedmine>> {
        RemoteTaskStore::with_transport(test_settings(), fake.clone(), None)
    }

    fn cached(fake: &Arc<FakeRedmine>) -> (TempDir, RemoteTaskStore<Arc<FakeRedmine>>) {
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalTaskStore::new(temp_dir.path().join("cache"));
        let store = RemoteTaskStore::with_transport(test_settings(), fake.clone(), Some(cache));
        (temp_dir, store)
    }

    /// Forwards to the fake but drops journal-note updates while `fail_notes` is set.
    struct DropsNotes {
        inner: Arc<FakeRedmine>,
        fail_notes: AtomicBool,
    }

    impl HttpTransport for DropsNotes {
        async fn send(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, TransportError> {
            let is_note = request
                .body
                .as_ref()
                .is_some_and(|b| b.pointer("/issue/notes").is_some());
            if is_note && self.fail_notes.load(Ordering::SeqCst) {
                return Err(TransportError {
                    kind: NetworkErrorKind::Connect,
                    message: "connection reset".into(),
                });
            }
            self.inner.send(request).await
        }
    }

    fn comments(pairs: &[(&str, &str)]) -> Vec<TaskComment> {
        pairs.iter().map(|(a, b)| TaskComment::new(*a, *b)).collect()
    }

    #[test]
    fn test_new_comments_requires_strict_extension() {
        let existing = comments(&[("a", "b")]);
        assert!(new_comments(&existing, &comments(&[("a", "b")])).is_empty());
        assert_eq!(
            new_comments(&existing, &comments(&[("a", "b"), ("c", "d")])),
            comments(&[("c", "d")]).as_slice()
        );
        assert!(new_comments(&existing, &[]).is_empty());
        assert!(new_comments(&existing, &comments(&[("x", "y"), ("c", "d")])).is_empty());
    }

    #[tokio::test]
    async fn test_append_comment_notes_exact_match_is_noop() {
        let fake = FakeRedmine::new();
        let store = remote_only(&fake);
        let id = fake.insert_issue(json!({"subject": "x"}));

        let posted = store
            .append_comment_notes(id, &comments(&[("a", "b")]), &comments(&[("a", "b")]))
            .await
            .unwrap();
        assert_eq!(posted, 0);
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_append_comment_notes_posts_only_suffix() {
        let fake = FakeRedmine::new();
        let store = remote_only(&fake);
        let id = fake.insert_issue(json!({"subject": "x"}));

        let posted = store
            .append_comment_notes(
                id,
                &comments(&[("a", "b")]),
                &comments(&[("a", "b"), ("c", "d")]),
            )
            .await
            .unwrap();
        assert_eq!(posted, 1);
        assert_eq!(fake.count(HttpMethod::Put), 1);
        assert_eq!(fake.notes(id), vec!["c: d"]);
    }

    #[tokio::test]
    async fn test_append_comment_notes_diverging_posts_nothing() {
        let fake = FakeRedmine::new();
        let store = remote_only(&fake);
        let id = fake.insert_issue(json!({"subject": "x"}));

        let existing = comments(&[("a", "b"), ("c", "d")]);
        for desired in [comments(&[("a", "b")]), comments(&[("z", "z"), ("c", "d"), ("e", "f")])] {
            let posted = store.append_comment_notes(id, &existing, &desired).await.unwrap();
            assert_eq!(posted, 0);
        }
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_write_creates_then_updates_one_issue() {
        let fake = FakeRedmine::new();
        let store = remote_only(&fake);

        let mut task = Task::new(ID, "First");
        task.comments = comments(&[("CODER", "started")]);
        store.write_task(&task).await.unwrap();
        assert_eq!(fake.issue_count(), 1);
        assert_eq!(fake.count(HttpMethod::Post), 1);

        task.title = "Second".into();
        task.comments.push(TaskComment::new("REVIEWER", "looks good"));
        store.write_task(&task).await.unwrap();
        assert_eq!(fake.issue_count(), 1);

        let loaded = store.get_task(ID).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Second");
        assert_eq!(loaded.comments.len(), 2);
        assert_eq!(fake.notes(1), vec!["CODER: started", "REVIEWER: looks good"]);

        // Re-sending the same state posts no further notes.
        store.write_task(&task).await.unwrap();
        assert_eq!(fake.notes(1).len(), 2);
    }

    #[tokio::test]
    async fn test_failed_note_is_posted_on_next_write() {
        let fake = FakeRedmine::new();
        let transport = Arc::new(DropsNotes {
            inner: fake.clone(),
            fail_notes: AtomicBool::new(false),
        });
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalTaskStore::new(temp_dir.path().join("cache"));
        let store = RemoteTaskStore::with_transport(test_settings(), transport.clone(), Some(cache));

        let mut task = Task::new(ID, "Notes");
        store.write_task(&task).await.unwrap();

        transport.fail_notes.store(true, Ordering::SeqCst);
        task.comments = comments(&[("reviewer", "looks good")]);
        store.write_task(&task).await.unwrap();
        assert!(store.cache().unwrap().load(ID).unwrap().unwrap().dirty);
        assert!(fake.notes(1).is_empty());
        // The comments field did not move ahead of the journal.
        let remote = store.get_task_remote(ID).await.unwrap().unwrap();
        assert!(remote.comments.is_empty());

        transport.fail_notes.store(false, Ordering::SeqCst);
        store.write_task(&task).await.unwrap();
        assert_eq!(fake.notes(1), vec!["reviewer: looks good"]);
        assert!(!store.cache().unwrap().load(ID).unwrap().unwrap().dirty);

        store.write_task(&task).await.unwrap();
        assert_eq!(fake.notes(1).len(), 1);
        let remote = store.get_task_remote(ID).await.unwrap().unwrap();
        assert_eq!(remote.comments, task.comments);
    }

    #[tokio::test]
    async fn test_note_update_advances_comments_field() {
        let fake = FakeRedmine::new();
        let store = remote_only(&fake);
        let id = fake.insert_issue(json!({"subject": "x"}));

        let desired = comments(&[("a", "b"), ("c", "d")]);
        store.append_comment_notes(id, &[], &desired).await.unwrap();

        let puts: Vec<_> = fake
            .requests()
            .into_iter()
            .filter(|r| r.method == HttpMethod::Put)
            .collect();
        assert_eq!(puts.len(), 2);
        let first = puts[0].body.as_ref().unwrap();
        assert_eq!(first["issue"]["notes"], "a: b");
        assert_eq!(
            first["issue"]["custom_fields"][0]["value"],
            comments_field_value(&desired[..1])
        );
        let issue = fake.issue(id).unwrap();
        assert_eq!(
            crate::remote::mapping::custom_field(&issue, 4),
            Some(&json!(comments_field_value(&desired)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_tasks_pauses_between_batches() {
        let fake = FakeRedmine::new();
        let mut settings = test_settings();
        settings.batch_size = 2;
        settings.batch_pause = Duration::from_secs(1);
        let store = RemoteTaskStore::with_transport(settings, fake.clone(), None);

        let tasks: Vec<Task> = ["202601311245-AAAA", "202601311245-AAAB", "202601311245-AAAC"]
            .into_iter()
            .map(|id| Task::new(id, "batch"))
            .collect();
        let start = tokio::time::Instant::now();
        store.write_tasks(&tasks).await.unwrap();

        // One pause after the first batch of two, none after the last task.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
        assert_eq!(fake.issue_count(), 3);
    }

    #[tokio::test]
    async fn test_priority_round_trips_only_when_mapped() {
        let fake = FakeRedmine::new();
        let mut settings = test_settings();
        settings.priority_map.insert(Priority::High, 3);
        let store = RemoteTaskStore::with_transport(settings, fake.clone(), None);

        let mut high = Task::new(ID, "high");
        high.priority = Priority::High;
        store.write_task(&high).await.unwrap();
        let loaded = store.get_task_remote(ID).await.unwrap().unwrap();
        assert_eq!(loaded.priority, Priority::High);

        // Low has no mapping, so the issue carries no priority and reads back as the default.
        let mut low = Task::new("202601311245-AAAA", "low");
        low.priority = Priority::Low;
        store.write_task(&low).await.unwrap();
        let loaded = store.get_task_remote(&low.id).await.unwrap().unwrap();
        assert_eq!(loaded.priority, Priority::default());
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let fake = FakeRedmine::new();
        let settings = test_settings();
        let alphabet = crate::model::task_id::TASK_ID_ALPHABET;
        for i in 0..150 {
            let suffix = format!("AA{}{}", alphabet[i / 32] as char, alphabet[i % 32] as char);
            fake.seed_task(&Task::new(format!("202601311245-{suffix}"), "t"), &settings);
        }
        let store = remote_only(&fake);

        let tasks = store.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 150);
        assert_eq!(fake.count(HttpMethod::Get), 2);
        assert!(tasks.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_list_rejects_duplicate_task_ids() {
        let fake = FakeRedmine::new();
        let settings = test_settings();
        fake.seed_task(&Task::new(ID, "one"), &settings);
        fake.seed_task(&Task::new(ID, "two"), &settings);
        let store = remote_only(&fake);

        let err = store.list_tasks().await.unwrap_err();
        assert!(matches!(err, Error::Backend(ref m) if m.contains(ID)));
    }

    #[tokio::test]
    async fn test_issues_without_task_id_are_ignored() {
        let fake = FakeRedmine::new();
        fake.insert_issue(json!({"subject": "human-filed bug"}));
        fake.seed_task(&Task::new(ID, "tracked"), &test_settings());
        let store = remote_only(&fake);

        let tasks = store.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "tracked");
    }

    #[tokio::test]
    async fn test_offline_write_degrades_to_dirty_cache() {
        let fake = FakeRedmine::new();
        let (_tmp, store) = cached(&fake);
        fake.set_offline(true);

        store.write_task(&Task::new(ID, "offline edit")).await.unwrap();
        let cache = store.cache().unwrap();
        let local = cache.load(ID).unwrap().unwrap();
        assert!(local.dirty);
        assert_eq!(local.title, "offline edit");
        assert_eq!(fake.issue_count(), 0);

        // Reads fall back to the cache too.
        assert_eq!(store.list_tasks().await.unwrap().len(), 1);
        assert!(store.get_task(ID).await.unwrap().unwrap().dirty);
    }

    #[tokio::test]
    async fn test_offline_without_cache_propagates() {
        let fake = FakeRedmine::new();
        let store = remote_only(&fake);
        fake.set_offline(true);

        let err = store.write_task(&Task::new(ID, "x")).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.list_tasks().await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_rejection_is_not_masked_by_cache() {
        let fake = FakeRedmine::new();
        let (_tmp, store) = cached(&fake);
        fake.force_status(Some(422));

        let err = store.write_task(&Task::new(ID, "x")).await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(store.cache().unwrap().load(ID).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_successful_write_refreshes_clean_cache() {
        let fake = FakeRedmine::new();
        let (_tmp, store) = cached(&fake);

        let mut task = Task::new(ID, "online");
        task.status = TaskStatus::Doing;
        store.write_task(&task).await.unwrap();

        let local = store.cache().unwrap().load(ID).unwrap().unwrap();
        assert!(!local.dirty);
        assert_eq!(local.title, "online");
    }

    #[tokio::test]
    async fn test_listing_keeps_dirty_cache_and_refreshes_clean() {
        let fake = FakeRedmine::new();
        let settings = test_settings();
        let other = "202601311245-AAAA";
        fake.seed_task(&Task::new(ID, "remote"), &settings);
        fake.seed_task(&Task::new(other, "remote other"), &settings);
        let (_tmp, store) = cached(&fake);
        let cache = store.cache().unwrap();
        cache.save_snapshot(&Task::new(ID, "local pending").with_dirty(true)).unwrap();

        let tasks = store.list_tasks().await.unwrap();
        let by_id: HashMap<_, _> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        assert_eq!(by_id[ID].title, "local pending");
        assert_eq!(by_id[other].title, "remote other");

        assert!(cache.load(ID).unwrap().unwrap().dirty);
        assert_eq!(cache.load(other).unwrap().unwrap().title, "remote other");
    }

    #[tokio::test]
    async fn test_set_doc_writes_through() {
        let fake = FakeRedmine::new();
        let (_tmp, store) = cached(&fake);
        store.write_task(&Task::new(ID, "doc me")).await.unwrap();

        let task = store.set_task_doc(ID, "Remote doc", Some("WRITER")).await.unwrap();
        assert_eq!(task.doc.as_deref(), Some("Remote doc"));
        assert_eq!(task.doc_updated_by.as_deref(), Some("WRITER"));

        let remote = store.get_task_remote(ID).await.unwrap().unwrap();
        assert_eq!(remote.doc.as_deref(), Some("Remote doc"));
        assert_eq!(remote.doc_updated_by.as_deref(), Some("WRITER"));

        let missing = store.set_task_doc("202601311245-ZZZZ", "x", None).await;
        assert!(matches!(missing, Err(Error::TaskNotFound { .. })));
    }

    #[tokio::test]
    async fn test_generate_task_id_checks_remote() {
        let fake = FakeRedmine::new();
        let (_tmp, store) = cached(&fake);

        let id = store.generate_task_id(6, 5).await.unwrap();
        assert!(crate::model::is_valid_task_id(&id));
        assert!(fake.requests().iter().any(|r| r.param("cf_1") == Some(id.as_str())));
    }
}
