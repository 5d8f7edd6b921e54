use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::api::TaskApi;
use crate::error::TaskError;
use crate::models::{NewTask, Priority, Task, TaskId, TaskPatch};
use crate::notify::NotificationQueue;
use crate::retry::{retry, RetryPolicy};
use crate::session::EditSession;

pub const MSG_LOAD_FAILED: &str = "Failed to load tasks. Check backend connection.";
pub const MSG_EMPTY_TITLE: &str = "Task title cannot be empty.";
pub const MSG_ADDED: &str = "Task added successfully!";
pub const MSG_ADD_FAILED: &str = "Failed to add task.";
pub const MSG_TOGGLE_FAILED: &str = "Failed to update task status.";
pub const MSG_DELETED: &str = "Task deleted successfully!";
pub const MSG_DELETE_FAILED: &str = "Failed to delete task.";
pub const MSG_RENAMED: &str = "Task updated successfully!";
pub const MSG_RENAME_FAILED: &str = "Failed to save task.";

#[derive(Debug, Default)]
struct StoreState {
    tasks: Vec<Task>,
    session: EditSession,
    // Refresh fencing: fetch attempts started / newest attempt whose result is shown
    issued: u64,
    applied: u64,
    refreshing: usize,
}

// Keeps the in-flight refresh count honest even if the refresh future is
// dropped before it settles.
struct RefreshGuard<'a>(&'a Mutex<StoreState>);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.refreshing = state.refreshing.saturating_sub(1);
    }
}

/// Local mirror of the remote task collection.
///
/// Mutations are never applied locally: each one waits for the remote store
/// to confirm and then re-fetches the whole collection. Every outcome is
/// reported through the shared [`NotificationQueue`].
pub struct TaskStore<A> {
    api: A,
    policy: RetryPolicy,
    state: Mutex<StoreState>,
    notifications: Arc<NotificationQueue>,
}

impl<A: TaskApi> TaskStore<A> {
    pub fn new(api: A, policy: RetryPolicy, notifications: Arc<NotificationQueue>) -> Self {
        Self {
            api,
            policy,
            state: Mutex::new(StoreState::default()),
            notifications,
        }
    }

    pub fn notifications(&self) -> &Arc<NotificationQueue> {
        &self.notifications
    }

    /// Snapshot of the last applied fetch, in remote order.
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().tasks.iter().filter(|t| !t.completed).count()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().refreshing > 0
    }

    pub async fn list_tasks(&self) -> Result<(), TaskError> {
        self.state.lock().refreshing += 1;
        let _guard = RefreshGuard(&self.state);

        // One ticket per attempt: results are ordered by when they were fetched
        let fetch = || {
            let ticket = self.next_ticket();
            let api = &self.api;
            async move { api.list().await.map(|tasks| (ticket, tasks)) }
        };

        match retry(&self.policy, "list tasks", fetch).await {
            Ok((ticket, tasks)) => {
                let mut state = self.state.lock();
                if ticket > state.applied {
                    log::debug!("Applying refresh #{} ({} tasks)", ticket, tasks.len());
                    state.applied = ticket;
                    state.tasks = tasks;
                } else {
                    log::debug!(
                        "Dropping stale refresh #{} (already showing #{})",
                        ticket,
                        state.applied
                    );
                }
                Ok(())
            }
            Err(err) => {
                self.notifications.error(MSG_LOAD_FAILED);
                Err(err.into())
            }
        }
    }

    pub async fn add_task(
        &self,
        title: &str,
        priority: Priority,
        due_date: Option<NaiveDateTime>,
    ) -> Result<(), TaskError> {
        if title.trim().is_empty() {
            return Err(self.reject_empty_title());
        }

        let new_task = NewTask::new(title, priority, due_date);
        match retry(&self.policy, "add task", || self.api.create(&new_task)).await {
            Ok(created) => {
                log::info!("Created task {} ({:?})", created.id, created.title);
                self.notifications.success(MSG_ADDED);
                self.refresh().await;
                Ok(())
            }
            Err(err) => {
                self.notifications.error(MSG_ADD_FAILED);
                Err(err.into())
            }
        }
    }

    /// Flips `completed` remotely. Success is silent; the refresh shows it.
    pub async fn toggle_completed(&self, task: &Task) -> Result<(), TaskError> {
        let patch = TaskPatch::completed(!task.completed);
        match retry(&self.policy, "toggle task", || self.api.update(task.id, &patch)).await {
            Ok(_) => {
                self.refresh().await;
                Ok(())
            }
            Err(err) => {
                self.notifications.error(MSG_TOGGLE_FAILED);
                Err(err.into())
            }
        }
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), TaskError> {
        match retry(&self.policy, "delete task", || self.api.delete(id)).await {
            Ok(()) => {
                log::info!("Deleted task {}", id);
                self.notifications.success(MSG_DELETED);
                self.refresh().await;
                Ok(())
            }
            Err(err) => {
                self.notifications.error(MSG_DELETE_FAILED);
                Err(err.into())
            }
        }
    }

    /// Renames a task. On success any edit session for `id` is closed; on
    /// failure it stays open so the user can try again.
    pub async fn rename_task(&self, id: TaskId, new_title: &str) -> Result<(), TaskError> {
        if new_title.trim().is_empty() {
            return Err(self.reject_empty_title());
        }

        let patch = TaskPatch::title(new_title);
        match retry(&self.policy, "rename task", || self.api.update(id, &patch)).await {
            Ok(_) => {
                self.state.lock().session.finish(id);
                self.notifications.success(MSG_RENAMED);
                self.refresh().await;
                Ok(())
            }
            Err(err) => {
                self.notifications.error(MSG_RENAME_FAILED);
                Err(err.into())
            }
        }
    }

    pub fn edit_session(&self) -> EditSession {
        self.state.lock().session.clone()
    }

    pub fn begin_edit(&self, task: &Task) {
        self.state.lock().session.begin(task);
    }

    pub fn set_edit_title(&self, title: impl Into<String>) {
        self.state.lock().session.set_title(title);
    }

    pub fn cancel_edit(&self) {
        self.state.lock().session.cancel();
    }

    /// Saves the working title of the open session, if any.
    pub async fn save_edit(&self) -> Result<(), TaskError> {
        let (id, title) = match self.edit_session() {
            EditSession::Editing { id, title } => (id, title),
            EditSession::Idle => return Ok(()),
        };
        self.rename_task(id, &title).await
    }

    fn next_ticket(&self) -> u64 {
        let mut state = self.state.lock();
        state.issued += 1;
        state.issued
    }

    fn reject_empty_title(&self) -> TaskError {
        self.notifications.warning(MSG_EMPTY_TITLE);
        TaskError::Validation(MSG_EMPTY_TITLE)
    }

    // Follow-up fetch after a confirmed mutation. Its failure is already
    // reported by `list_tasks` and does not undo the mutation.
    async fn refresh(&self) {
        if let Err(err) = self.list_tasks().await {
            log::warn!("Refresh after mutation failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::models::{Severity, Task};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Remote {
        tasks: Vec<Task>,
        next_id: u64,
        // Scripted outcomes for upcoming calls (false = fail); empty means succeed
        outcomes: VecDeque<bool>,
        calls: usize,
        list_delays: VecDeque<Duration>,
    }

    #[derive(Default)]
    struct FakeApi {
        remote: Mutex<Remote>,
    }

    impl FakeApi {
        fn with_tasks(tasks: Vec<Task>) -> Self {
            let next_id = tasks.iter().map(|t| t.id.0).max().unwrap_or(0);
            FakeApi {
                remote: Mutex::new(Remote {
                    tasks,
                    next_id,
                    ..Default::default()
                }),
            }
        }

        fn fail_next(&self, n: usize) {
            self.script(&vec![false; n]);
        }

        fn script(&self, outcomes: &[bool]) {
            self.remote.lock().outcomes = outcomes.iter().copied().collect();
        }

        fn calls(&self) -> usize {
            self.remote.lock().calls
        }

        fn snapshot(&self) -> Vec<Task> {
            self.remote.lock().tasks.clone()
        }

        fn enter(&self) -> Result<(), ApiError> {
            let mut remote = self.remote.lock();
            remote.calls += 1;
            if remote.outcomes.pop_front() == Some(false) {
                return Err(ApiError::Status {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "down".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TaskApi for FakeApi {
        async fn list(&self) -> Result<Vec<Task>, ApiError> {
            self.enter()?;
            let (tasks, delay) = {
                let mut remote = self.remote.lock();
                (remote.tasks.clone(), remote.list_delays.pop_front())
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(tasks)
        }

        async fn create(&self, new_task: &NewTask) -> Result<Task, ApiError> {
            self.enter()?;
            let mut remote = self.remote.lock();
            remote.next_id += 1;
            let mut created = task(remote.next_id, &new_task.title);
            created.priority = new_task.priority.clone();
            remote.tasks.push(created.clone());
            Ok(created)
        }

        async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
            self.enter()?;
            let mut remote = self.remote.lock();
            let found = remote.tasks.iter_mut().find(|t| t.id == id).ok_or(ApiError::Status {
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            })?;
            if let Some(completed) = patch.completed {
                found.completed = completed;
            }
            if let Some(title) = &patch.title {
                found.title = title.clone();
            }
            Ok(found.clone())
        }

        async fn delete(&self, id: TaskId) -> Result<(), ApiError> {
            self.enter()?;
            self.remote.lock().tasks.retain(|t| t.id != id);
            Ok(())
        }
    }

    fn task(id: u64, title: &str) -> Task {
        Task {
            id: TaskId(id),
            title: title.to_string(),
            description: String::new(),
            completed: false,
            created_at: None,
            due_date: None,
            priority: Priority::High,
            priority_display: None,
            is_recurring: false,
            ai_insight: None,
        }
    }

    fn store(api: FakeApi) -> TaskStore<FakeApi> {
        TaskStore::new(api, RetryPolicy::default(), Arc::new(NotificationQueue::default()))
    }

    fn shown(store: &TaskStore<FakeApi>) -> Option<(String, Severity)> {
        store
            .notifications()
            .visible()
            .map(|n| (n.message, n.severity))
    }

    #[tokio::test(start_paused = true)]
    async fn successful_operations_keep_mirror_equal_to_remote() {
        let store = store(FakeApi::default());

        store.add_task("Write report", Priority::High, None).await.unwrap();
        assert_eq!(store.tasks(), store.api.snapshot());

        store.add_task("Buy milk", Priority::Low, None).await.unwrap();
        assert_eq!(store.tasks(), store.api.snapshot());

        let first = store.tasks()[0].clone();
        store.toggle_completed(&first).await.unwrap();
        assert_eq!(store.tasks(), store.api.snapshot());

        store.rename_task(first.id, "Write final report").await.unwrap();
        assert_eq!(store.tasks(), store.api.snapshot());

        store.delete_task(first.id).await.unwrap();
        assert_eq!(store.tasks(), store.api.snapshot());
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn empty_titles_never_reach_the_network() {
        let store = store(FakeApi::with_tasks(vec![task(1, "Write report")]));

        let err = store.add_task("", Priority::Medium, None).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(shown(&store), Some((MSG_EMPTY_TITLE.into(), Severity::Warning)));

        store.notifications().dismiss();
        let err = store.rename_task(TaskId(1), "   ").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(shown(&store), Some((MSG_EMPTY_TITLE.into(), Severity::Warning)));

        assert_eq!(store.api.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn list_recovers_after_two_failures() {
        let api = FakeApi::with_tasks(vec![task(1, "Write report")]);
        api.fail_next(2);
        let store = store(api);

        let begin = Instant::now();
        store.list_tasks().await.unwrap();

        assert_eq!(begin.elapsed(), Duration::from_secs(3));
        assert_eq!(store.api.calls(), 3);
        assert_eq!(store.tasks().len(), 1);
        assert!(store.notifications().current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_list_leaves_collection_untouched() {
        let store = store(FakeApi::with_tasks(vec![task(1, "Write report")]));
        store.list_tasks().await.unwrap();
        let before = store.tasks();

        store.api.remote.lock().tasks.push(task(2, "Unseen"));
        store.api.fail_next(3);
        let err = store.list_tasks().await.unwrap_err();

        assert!(!err.is_validation());
        assert_eq!(store.tasks(), before);
        assert_eq!(shown(&store), Some((MSG_LOAD_FAILED.into(), Severity::Error)));
        assert!(!store.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_is_silent_on_success() {
        let store = store(FakeApi::with_tasks(vec![task(1, "Write report")]));
        store.list_tasks().await.unwrap();

        let target = store.task(TaskId(1)).unwrap();
        store.toggle_completed(&target).await.unwrap();

        assert!(store.task(TaskId(1)).unwrap().completed);
        assert!(store.notifications().current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_failure_is_reported() {
        let store = store(FakeApi::with_tasks(vec![task(1, "Write report")]));
        store.list_tasks().await.unwrap();
        store.api.fail_next(3);

        let target = store.task(TaskId(1)).unwrap();
        assert!(store.toggle_completed(&target).await.is_err());
        assert_eq!(shown(&store), Some((MSG_TOGGLE_FAILED.into(), Severity::Error)));
        assert!(!store.task(TaskId(1)).unwrap().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn add_failure_reports_error_and_keeps_mirror() {
        let store = store(FakeApi::default());
        store.api.fail_next(3);

        assert!(store.add_task("Write report", Priority::High, None).await.is_err());
        assert_eq!(shown(&store), Some((MSG_ADD_FAILED.into(), Severity::Error)));
        assert!(store.tasks().is_empty());
        assert!(store.api.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_reports_success() {
        let store = store(FakeApi::with_tasks(vec![task(1, "a"), task(2, "b")]));
        store.delete_task(TaskId(1)).await.unwrap();

        assert_eq!(shown(&store), Some((MSG_DELETED.into(), Severity::Success)));
        assert_eq!(store.tasks(), vec![task(2, "b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_failure_reports_error() {
        let store = store(FakeApi::with_tasks(vec![task(1, "a")]));
        store.api.fail_next(3);

        assert!(store.delete_task(TaskId(1)).await.is_err());
        assert_eq!(shown(&store), Some((MSG_DELETE_FAILED.into(), Severity::Error)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_after_mutation_overrides_success_message() {
        let store = store(FakeApi::with_tasks(vec![task(1, "a")]));
        store.list_tasks().await.unwrap();
        // The delete goes through, every refresh attempt after it does not
        store.api.script(&[true, false, false, false]);

        assert!(store.delete_task(TaskId(1)).await.is_ok());
        assert_eq!(shown(&store), Some((MSG_LOAD_FAILED.into(), Severity::Error)));
        assert!(store.api.snapshot().is_empty());
        // Last known good snapshot stays until a refresh succeeds
        assert_eq!(store.tasks(), vec![task(1, "a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn save_edit_closes_session_on_success() {
        let store = store(FakeApi::with_tasks(vec![task(1, "Write report")]));
        store.list_tasks().await.unwrap();

        store.begin_edit(&store.task(TaskId(1)).unwrap());
        store.set_edit_title("Write final report");
        store.save_edit().await.unwrap();

        assert_eq!(store.edit_session(), EditSession::Idle);
        assert_eq!(store.task(TaskId(1)).unwrap().title, "Write final report");
        assert_eq!(shown(&store), Some((MSG_RENAMED.into(), Severity::Success)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_keeps_session_open() {
        let store = store(FakeApi::with_tasks(vec![task(1, "Write report")]));
        store.list_tasks().await.unwrap();

        store.begin_edit(&store.task(TaskId(1)).unwrap());
        store.set_edit_title("Write final report");
        store.api.fail_next(3);
        assert!(store.save_edit().await.is_err());

        assert_eq!(
            store.edit_session(),
            EditSession::Editing {
                id: TaskId(1),
                title: "Write final report".into()
            }
        );
        assert_eq!(shown(&store), Some((MSG_RENAME_FAILED.into(), Severity::Error)));
    }

    #[tokio::test(start_paused = true)]
    async fn blank_working_title_keeps_session_open() {
        let store = store(FakeApi::with_tasks(vec![task(1, "Write report")]));
        store.begin_edit(&task(1, "Write report"));
        store.set_edit_title("  ");

        assert!(store.save_edit().await.unwrap_err().is_validation());
        assert!(store.edit_session().is_editing(TaskId(1)));
        assert_eq!(store.api.calls(), 0);
    }

    #[tokio::test]
    async fn save_edit_while_idle_does_nothing() {
        let store = store(FakeApi::default());
        store.save_edit().await.unwrap();
        assert_eq!(store.api.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rename_of_other_task_keeps_current_session() {
        let store = store(FakeApi::with_tasks(vec![task(1, "a"), task(2, "b")]));
        store.begin_edit(&task(2, "b"));

        store.rename_task(TaskId(1), "a2").await.unwrap();
        assert!(store.edit_session().is_editing(TaskId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_refresh_does_not_overwrite_newer_snapshot() {
        let api = FakeApi::with_tasks(vec![task(1, "old")]);
        // First fetch is slow, second is immediate
        api.remote.lock().list_delays = VecDeque::from([Duration::from_secs(5), Duration::ZERO]);
        let store = store(api);

        let slow = store.list_tasks();
        let fast = async {
            tokio::task::yield_now().await;
            store.api.remote.lock().tasks = vec![task(1, "new")];
            store.list_tasks().await
        };
        let (slow, fast) = tokio::join!(slow, fast);
        slow.unwrap();
        fast.unwrap();

        assert_eq!(store.tasks(), vec![task(1, "new")]);
        assert!(!store.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn retried_fetch_wins_over_refresh_issued_during_backoff() {
        let api = FakeApi::with_tasks(vec![task(1, "old")]);
        api.fail_next(1);
        let store = store(api);

        let retrying = store.list_tasks();
        let meanwhile = async {
            tokio::task::yield_now().await;
            store.list_tasks().await.unwrap();
            assert_eq!(store.tasks(), vec![task(1, "old")]);
            store.api.remote.lock().tasks = vec![task(1, "new")];
        };
        let (retrying, ()) = tokio::join!(retrying, meanwhile);
        retrying.unwrap();

        assert_eq!(store.api.calls(), 3);
        assert_eq!(store.tasks(), vec![task(1, "new")]);
        assert!(!store.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn loading_flag_tracks_in_flight_refresh() {
        let api = FakeApi::with_tasks(vec![task(1, "a")]);
        api.remote.lock().list_delays = VecDeque::from([Duration::from_secs(1)]);
        let store = store(api);

        let refresh = store.list_tasks();
        let observe = async {
            tokio::task::yield_now().await;
            store.is_loading()
        };
        let (result, during) = tokio::join!(refresh, observe);

        result.unwrap();
        assert!(during);
        assert!(!store.is_loading());
    }
}
