//! Sync task state and accounting.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle status of a task.
///
/// `Running` is the only non-terminal status; no transition leaves a
/// terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The executor is walking the catalog.
    Running,
    /// The walk finished without a fatal error and without being stopped.
    Completed,
    /// The walk aborted on a fatal error.
    Failed,
    /// The task was stopped through its manager.
    Stopped,
}

impl TaskStatus {
    /// Returns true for every status other than `Running`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Item counters of a task. Each counter only ever grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounters {
    /// Items discovered.
    pub total: u64,
    /// Items mirrored.
    pub done: u64,
    /// Items left alone (already present or not transferable).
    pub skipped: u64,
    /// Items that failed.
    pub failed: u64,
}

impl TaskCounters {
    /// Returns the number of items with an outcome.
    pub fn processed(&self) -> u64 {
        self.done + self.skipped + self.failed
    }
}

/// Serializable point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    /// Task id.
    pub id: String,
    /// Configuration the run was started from.
    pub config_id: String,
    /// Source server id.
    pub source_id: String,
    /// Destination server id.
    pub dest_id: String,
    /// Current status.
    pub status: TaskStatus,
    /// Percentage of discovered items with an outcome.
    pub progress: f64,
    /// Label of the work in flight.
    pub current_item: String,
    /// Items discovered.
    pub items_total: u64,
    /// Items mirrored.
    pub items_done: u64,
    /// Items skipped.
    pub items_skipped: u64,
    /// Items failed.
    pub items_failed: u64,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Time of the terminal transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Fatal error, if the run aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Timestamped log lines, oldest first.
    pub log: Vec<String>,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    progress: f64,
    current_item: String,
    counters: TaskCounters,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    log: Vec<String>,
}

impl TaskState {
    fn push_log(&mut self, task_id: &str, message: &str) {
        debug!(task = %task_id, "{message}");
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        self.log.push(format!("[{stamp}] {message}"));
    }

    /// Moves a running task into `status`. Returns false if already terminal.
    fn finish_as(&mut self, status: TaskStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        true
    }
}

/// One sync run.
///
/// Identity is fixed at creation. Everything else sits behind a single lock
/// and is only reachable through the methods below, so the executor can
/// write while managers and status readers observe concurrently.
#[derive(Debug)]
pub struct Task {
    id: String,
    config_id: String,
    source_id: String,
    dest_id: String,
    started_at: DateTime<Utc>,
    state: RwLock<TaskState>,
}

impl Task {
    /// Creates a running task with a fresh id.
    pub fn new(
        config_id: impl Into<String>,
        source_id: impl Into<String>,
        dest_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            config_id: config_id.into(),
            source_id: source_id.into(),
            dest_id: dest_id.into(),
            started_at: Utc::now(),
            state: RwLock::new(TaskState {
                status: TaskStatus::Running,
                progress: 0.0,
                current_item: String::new(),
                counters: TaskCounters::default(),
                completed_at: None,
                error: None,
                log: Vec::new(),
            }),
        }
    }

    /// Returns the task id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the configuration id.
    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    /// Returns the source server id.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Returns the destination server id.
    pub fn dest_id(&self) -> &str {
        &self.dest_id
    }

    /// Returns the creation time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the current status.
    pub fn status(&self) -> TaskStatus {
        self.state.read().status
    }

    /// Returns the progress percentage.
    pub fn progress(&self) -> f64 {
        self.state.read().progress
    }

    /// Returns the label of the work in flight.
    pub fn current_item(&self) -> String {
        self.state.read().current_item.clone()
    }

    /// Returns a copy of the counters.
    pub fn counters(&self) -> TaskCounters {
        self.state.read().counters
    }

    /// Returns the time of the terminal transition.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().completed_at
    }

    /// Returns the fatal error, if any.
    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    /// Returns a copy of the log.
    pub fn log(&self) -> Vec<String> {
        self.state.read().log.clone()
    }

    /// Returns a consistent view of the whole task.
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.read();
        TaskSnapshot {
            id: self.id.clone(),
            config_id: self.config_id.clone(),
            source_id: self.source_id.clone(),
            dest_id: self.dest_id.clone(),
            status: state.status,
            progress: state.progress,
            current_item: state.current_item.clone(),
            items_total: state.counters.total,
            items_done: state.counters.done,
            items_skipped: state.counters.skipped,
            items_failed: state.counters.failed,
            started_at: self.started_at,
            completed_at: state.completed_at,
            error: state.error.clone(),
            log: state.log.clone(),
        }
    }

    /// Appends a timestamped log line.
    pub fn add_log(&self, message: impl AsRef<str>) {
        self.state.write().push_log(&self.id, message.as_ref());
    }

    /// Records a fatal error and fails the task.
    ///
    /// The error and its log line are always recorded; the status only
    /// changes if the task is still running.
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.write();
        state.push_log(&self.id, &format!("ERROR: {message}"));
        state.error = Some(message);
        state.finish_as(TaskStatus::Failed);
    }

    /// Counts one more discovered item.
    pub fn increment_total(&self) {
        self.state.write().counters.total += 1;
    }

    /// Counts one more mirrored item.
    pub fn increment_done(&self) {
        self.state.write().counters.done += 1;
    }

    /// Counts one more skipped item.
    pub fn increment_skipped(&self) {
        self.state.write().counters.skipped += 1;
    }

    /// Counts one more failed item.
    pub fn increment_failed(&self) {
        self.state.write().counters.failed += 1;
    }

    /// Recomputes progress from the counters. No-op while nothing is discovered.
    pub fn update_progress(&self) {
        let mut state = self.state.write();
        let counters = state.counters;
        if counters.total > 0 {
            state.progress = counters.processed() as f64 / counters.total as f64 * 100.0;
        }
    }

    /// Sets the label of the work in flight.
    pub fn set_current_item(&self, label: impl Into<String>) {
        self.state.write().current_item = label.into();
    }

    /// Completes the task if it is still running and returns the final status.
    ///
    /// A task that was stopped or failed keeps its status: a stop may land
    /// while the executor is finishing its last item.
    pub fn finish(&self) -> TaskStatus {
        let mut state = self.state.write();
        if state.finish_as(TaskStatus::Completed) {
            state.current_item.clear();
            state.push_log(&self.id, "Sync completed");
        }
        state.status
    }

    /// Stops the task if it is still running. Returns true if it was.
    pub fn stop(&self) -> bool {
        let mut state = self.state.write();
        if !state.finish_as(TaskStatus::Stopped) {
            return false;
        }
        state.push_log(&self.id, "Task stopped by user");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn task() -> Task {
        Task::new("cfg-1", "src", "dst")
    }

    #[test]
    fn new_task_is_running() {
        let task = task();
        assert_eq!(task.status(), TaskStatus::Running);
        assert_eq!(task.progress(), 0.0);
        assert_eq!(task.counters(), TaskCounters::default());
        assert!(task.completed_at().is_none());
        assert_eq!(task.config_id(), "cfg-1");
        assert!(Uuid::parse_str(task.id()).is_ok());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(task().id(), task().id());
    }

    #[test]
    fn progress_from_counters() {
        let task = task();
        task.update_progress();
        assert_eq!(task.progress(), 0.0);

        for _ in 0..4 {
            task.increment_total();
        }
        task.increment_done();
        task.increment_skipped();
        task.update_progress();
        assert_eq!(task.progress(), 50.0);

        task.increment_failed();
        task.increment_done();
        task.update_progress();
        assert_eq!(task.progress(), 100.0);
    }

    #[test]
    fn log_lines_are_timestamped() {
        let task = task();
        task.add_log("hello");
        let log = task.log();
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with('['));
        assert!(log[0].ends_with("] hello"));
    }

    #[test]
    fn set_error_fails_running_task() {
        let task = task();
        task.set_error("cannot list workspaces");

        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.error().as_deref(), Some("cannot list workspaces"));
        assert!(task.completed_at().is_some());
        assert!(task.log()[0].contains("ERROR: cannot list workspaces"));
    }

    #[test]
    fn finish_only_completes_running_task() {
        let task = task();
        assert_eq!(task.finish(), TaskStatus::Completed);
        let completed_at = task.completed_at();

        assert_eq!(task.finish(), TaskStatus::Completed);
        assert_eq!(task.completed_at(), completed_at);

        let stopped = self::task();
        assert!(stopped.stop());
        assert_eq!(stopped.finish(), TaskStatus::Stopped);
    }

    #[test]
    fn terminal_status_is_final() {
        let task = task();
        assert!(task.stop());
        assert!(!task.stop());

        task.set_error("late failure");
        assert_eq!(task.status(), TaskStatus::Stopped);
        assert_eq!(task.finish(), TaskStatus::Stopped);
    }

    #[test]
    fn snapshot_json_surface() {
        let task = task();
        task.increment_total();
        task.increment_done();
        task.update_progress();
        task.set_current_item("workspace parks");

        let json = serde_json::to_value(task.snapshot()).unwrap();
        assert_eq!(json["configId"], "cfg-1");
        assert_eq!(json["sourceId"], "src");
        assert_eq!(json["destId"], "dst");
        assert_eq!(json["status"], "running");
        assert_eq!(json["itemsTotal"], 1);
        assert_eq!(json["itemsDone"], 1);
        assert_eq!(json["progress"], 100.0);
        assert_eq!(json["currentItem"], "workspace parks");
        assert!(json.get("completedAt").is_none());
        assert!(json.get("error").is_none());

        task.set_error("boom");
        let json = serde_json::to_value(task.snapshot()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
        assert!(json.get("completedAt").is_some());
    }

    proptest! {
        #[test]
        fn counters_never_exceed_total(ops in proptest::collection::vec(0u8..4, 0..64)) {
            let task = task();
            let mut last_progress = 0.0;

            for op in ops {
                let pending = {
                    let c = task.counters();
                    c.total - c.processed()
                };
                match op {
                    0 => task.increment_total(),
                    1 if pending > 0 => task.increment_done(),
                    2 if pending > 0 => task.increment_skipped(),
                    3 if pending > 0 => task.increment_failed(),
                    _ => {}
                }

                let counters = task.counters();
                prop_assert!(counters.processed() <= counters.total);

                if counters.processed() == counters.total {
                    task.update_progress();
                    prop_assert!(task.progress() >= last_progress);
                    last_progress = task.progress();
                }
            }
        }
    }
}
