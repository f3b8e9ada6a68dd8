//! Task manager: starts, tracks, stops and forgets sync runs.

use crate::cancel::CancelToken;
use crate::error::{SyncError, SyncResult};
use crate::executor::{CatalogEndpoint, Executor};
use crate::options::SyncOptions;
use crate::task::{Task, TaskStatus};
use geomirror_catalog::ContentCache;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

#[derive(Default)]
struct Registry {
    tasks: HashMap<String, Arc<Task>>,
    /// Cancel signals of tasks that can still be stopped.
    cancels: HashMap<String, CancelToken>,
    workers: HashMap<String, JoinHandle<()>>,
}

/// Ends a worker's task, also when the executor panics.
struct WorkerExit {
    task: Arc<Task>,
    registry: Arc<RwLock<Registry>>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!(task = %self.task.id(), "sync worker panicked");
            self.task.set_error("Sync worker panicked");
        }
        let status = self.task.finish();
        self.registry.write().cancels.remove(self.task.id());
        info!(task = %self.task.id(), %status, "sync task ended");
    }
}

/// Registry of sync tasks.
///
/// Each started task runs on its own thread; there is no pool and no
/// queue. Tasks stay registered after they end until
/// [`clear_completed_tasks`](Self::clear_completed_tasks) drops them.
///
/// # Example
///
/// ```
/// use geomirror_catalog::MemoryCatalog;
/// use geomirror_sync::{CatalogEndpoint, SyncManager, SyncOptions, TaskStatus};
/// use std::sync::Arc;
///
/// let source = Arc::new(MemoryCatalog::new().with_workspace("parks"));
/// let destination = Arc::new(MemoryCatalog::new());
///
/// let manager = SyncManager::new();
/// let task = manager
///     .start_sync(
///         CatalogEndpoint::new("source", source),
///         CatalogEndpoint::new("destination", destination),
///         SyncOptions::default(),
///         "nightly",
///     )
///     .unwrap();
///
/// assert_eq!(manager.wait(task.id()).unwrap(), TaskStatus::Completed);
/// ```
#[derive(Default)]
pub struct SyncManager {
    registry: Arc<RwLock<Registry>>,
    cache: Option<Arc<dyn ContentCache>>,
}

impl SyncManager {
    /// Creates a manager without a content cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives every executor started from now on this content cache.
    pub fn with_cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Starts a sync run on a new thread and returns its live task.
    pub fn start_sync(
        &self,
        source: CatalogEndpoint,
        destination: CatalogEndpoint,
        options: SyncOptions,
        config_id: impl Into<String>,
    ) -> SyncResult<Arc<Task>> {
        let task = Arc::new(Task::new(config_id, source.id.as_str(), destination.id.as_str()));
        let id = task.id().to_string();
        let cancel = CancelToken::new();

        let mut executor = Executor::new(source, destination, options);
        if let Some(cache) = &self.cache {
            executor = executor.with_cache(Arc::clone(cache));
        }

        // The worker handle is stored before this guard drops, so a clear
        // can never miss it.
        let mut registry = self.registry.write();
        registry.tasks.insert(id.clone(), Arc::clone(&task));
        registry.cancels.insert(id.clone(), cancel.clone());

        let spawned = {
            let task = Arc::clone(&task);
            let registry = Arc::clone(&self.registry);
            thread::Builder::new()
                .name(format!("geomirror-sync-{id}"))
                .spawn(move || {
                    let exit = WorkerExit { task, registry };
                    executor.execute(&exit.task, &cancel);
                })
        };

        match spawned {
            Ok(worker) => {
                registry.workers.insert(id.clone(), worker);
                drop(registry);
                info!(task = %id, config = %task.config_id(), "sync task started");
                Ok(task)
            }
            Err(e) => {
                registry.tasks.remove(&id);
                registry.cancels.remove(&id);
                Err(SyncError::Spawn(e))
            }
        }
    }

    /// Returns the task registered under `id`.
    pub fn task(&self, id: &str) -> Option<Arc<Task>> {
        self.registry.read().tasks.get(id).cloned()
    }

    /// Returns all registered tasks, oldest first.
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        let mut tasks: Vec<_> = self.registry.read().tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.started_at());
        tasks
    }

    /// Stops a running task.
    ///
    /// Fires the task's cancel signal and marks it stopped right away; the
    /// worker notices the signal at its next resource boundary. Returns false
    /// if the task is unknown, was already stopped, or has already ended.
    pub fn stop_task(&self, id: &str) -> bool {
        let (cancel, task) = {
            let mut registry = self.registry.write();
            let Some(cancel) = registry.cancels.remove(id) else {
                return false;
            };
            (cancel, registry.tasks.get(id).cloned())
        };

        cancel.cancel();
        let stopped = task.is_some_and(|task| task.stop());
        if stopped {
            info!(task = %id, "sync task stopped");
        }
        stopped
    }

    /// Stops every task that can still be stopped. Returns how many were.
    pub fn stop_all_tasks(&self) -> usize {
        let signalled: Vec<(CancelToken, Option<Arc<Task>>)> = {
            let mut registry = self.registry.write();
            let cancels: Vec<_> = registry.cancels.drain().collect();
            cancels
                .into_iter()
                .map(|(id, cancel)| {
                    let task = registry.tasks.get(&id).cloned();
                    (cancel, task)
                })
                .collect()
        };

        let mut stopped = 0;
        for (cancel, task) in signalled {
            cancel.cancel();
            if task.is_some_and(|task| task.stop()) {
                stopped += 1;
            }
        }
        info!(stopped, "stopped all sync tasks");
        stopped
    }

    /// Forgets every task that is no longer running. Returns how many.
    pub fn clear_completed_tasks(&self) -> usize {
        let mut registry = self.registry.write();
        let finished: Vec<String> = registry
            .tasks
            .iter()
            .filter(|(_, task)| task.status().is_terminal())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &finished {
            registry.tasks.remove(id);
            registry.cancels.remove(id);
            // Dropping the handle detaches a worker that has not exited yet.
            registry.workers.remove(id);
        }
        finished.len()
    }

    /// Blocks until the task's worker thread has exited and returns the
    /// task's final status.
    pub fn wait(&self, id: &str) -> SyncResult<TaskStatus> {
        let (task, worker) = {
            let mut registry = self.registry.write();
            let task = registry
                .tasks
                .get(id)
                .cloned()
                .ok_or_else(|| SyncError::UnknownTask(id.to_string()))?;
            (task, registry.workers.remove(id))
        };

        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!(task = %id, "sync worker panicked");
            }
        }
        Ok(task.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geomirror_catalog::{CatalogClient, CatalogError, CatalogResult, LayerGroup, MemoryCatalog};

    fn endpoints(source: MemoryCatalog) -> (CatalogEndpoint, CatalogEndpoint) {
        (
            CatalogEndpoint::new("src", Arc::new(source)),
            CatalogEndpoint::new("dst", Arc::new(MemoryCatalog::new())),
        )
    }

    #[test]
    fn start_and_wait() {
        let manager = SyncManager::new();
        let (source, destination) = endpoints(MemoryCatalog::new().with_workspace("parks"));

        let task = manager
            .start_sync(source, destination, SyncOptions::default(), "cfg")
            .unwrap();
        assert_eq!(task.source_id(), "src");
        assert_eq!(task.dest_id(), "dst");

        assert_eq!(manager.wait(task.id()).unwrap(), TaskStatus::Completed);
        assert!(task.completed_at().is_some());
        assert_eq!(manager.tasks().len(), 1);
    }

    #[test]
    fn fatal_error_keeps_failed_status() {
        let manager = SyncManager::new();
        let catalog = MemoryCatalog::new();
        catalog.fail_on("workspaces", CatalogError::Transport("down".into()));
        let (source, destination) = endpoints(catalog);

        let task = manager
            .start_sync(source, destination, SyncOptions::default(), "cfg")
            .unwrap();
        assert_eq!(manager.wait(task.id()).unwrap(), TaskStatus::Failed);
    }

    #[test]
    fn stop_after_end_is_rejected() {
        let manager = SyncManager::new();
        let (source, destination) = endpoints(MemoryCatalog::new());

        let task = manager
            .start_sync(source, destination, SyncOptions::default(), "cfg")
            .unwrap();
        manager.wait(task.id()).unwrap();

        assert!(!manager.stop_task(task.id()));
        assert_eq!(task.status(), TaskStatus::Completed);
    }

    #[test]
    fn unknown_task() {
        let manager = SyncManager::new();
        assert!(manager.task("nope").is_none());
        assert!(!manager.stop_task("nope"));
        assert!(matches!(manager.wait("nope"), Err(SyncError::UnknownTask(_))));
    }

    #[test]
    fn clear_completed_keeps_nothing_finished() {
        let manager = SyncManager::new();
        for _ in 0..3 {
            let (source, destination) = endpoints(MemoryCatalog::new());
            let task = manager
                .start_sync(source, destination, SyncOptions::default(), "cfg")
                .unwrap();
            manager.wait(task.id()).unwrap();
        }

        assert_eq!(manager.tasks().len(), 3);
        assert_eq!(manager.clear_completed_tasks(), 3);
        assert!(manager.tasks().is_empty());
    }

    struct PanickingCatalog;

    impl CatalogClient for PanickingCatalog {
        fn workspaces(&self) -> CatalogResult<Vec<String>> {
            panic!("catalog client bug")
        }
        fn create_workspace(&self, _: &str) -> CatalogResult<()> {
            unreachable!()
        }
        fn styles(&self, _: &str) -> CatalogResult<Vec<String>> {
            unreachable!()
        }
        fn style_sld(&self, _: &str, _: &str) -> CatalogResult<String> {
            unreachable!()
        }
        fn create_or_update_style(&self, _: &str, _: &str, _: &str) -> CatalogResult<()> {
            unreachable!()
        }
        fn data_stores(&self, _: &str) -> CatalogResult<Vec<String>> {
            unreachable!()
        }
        fn feature_types(&self, _: &str, _: &str) -> CatalogResult<Vec<String>> {
            unreachable!()
        }
        fn download_layer_as_shapefile(&self, _: &str, _: &str) -> CatalogResult<Vec<u8>> {
            unreachable!()
        }
        fn upload_shapefile_data(&self, _: &str, _: &str, _: &[u8]) -> CatalogResult<()> {
            unreachable!()
        }
        fn coverage_stores(&self, _: &str) -> CatalogResult<Vec<String>> {
            unreachable!()
        }
        fn coverages(&self, _: &str, _: &str) -> CatalogResult<Vec<String>> {
            unreachable!()
        }
        fn download_coverage_as_geotiff(&self, _: &str, _: &str) -> CatalogResult<Vec<u8>> {
            unreachable!()
        }
        fn upload_geotiff_data(&self, _: &str, _: &str, _: &[u8]) -> CatalogResult<()> {
            unreachable!()
        }
        fn layer_groups(&self, _: &str) -> CatalogResult<Vec<String>> {
            unreachable!()
        }
        fn layer_group(&self, _: &str, _: &str) -> CatalogResult<LayerGroup> {
            unreachable!()
        }
        fn create_layer_group(&self, _: &str, _: &LayerGroup) -> CatalogResult<()> {
            unreachable!()
        }
    }

    #[test]
    fn panicking_worker_fails_task() {
        let manager = SyncManager::new();
        let task = manager
            .start_sync(
                CatalogEndpoint::new("src", Arc::new(PanickingCatalog)),
                CatalogEndpoint::new("dst", Arc::new(MemoryCatalog::new())),
                SyncOptions::default(),
                "cfg",
            )
            .unwrap();

        assert_eq!(manager.wait(task.id()).unwrap(), TaskStatus::Failed);
        assert_eq!(task.error().as_deref(), Some("Sync worker panicked"));
        assert!(task.completed_at().is_some());
        assert!(manager.registry.read().cancels.is_empty());
        assert!(!manager.stop_task(task.id()));
    }

    #[test]
    fn cleared_tasks_leave_no_worker_handles() {
        let manager = SyncManager::new();
        for _ in 0..20 {
            let (source, destination) = endpoints(MemoryCatalog::new());
            manager
                .start_sync(source, destination, SyncOptions::default(), "cfg")
                .unwrap();
            manager.clear_completed_tasks();
        }
        while !manager.tasks().is_empty() {
            manager.clear_completed_tasks();
            thread::yield_now();
        }

        let registry = manager.registry.read();
        assert!(registry.workers.is_empty());
        assert!(registry.cancels.is_empty());
    }
}
