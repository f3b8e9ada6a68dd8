//! Sync executor: one pass over the source catalog.
//!
//! The executor walks workspaces, then the resources inside each workspace
//! in a fixed order (styles, data stores, coverage stores, layer groups),
//! then global styles. Every resource is classified as done, skipped or
//! failed on the task as soon as it has been handled.
//!
//! Only the failure to list the source's workspaces is fatal. Everything
//! else is logged, counted and the walk moves on. "Already exists" answers
//! from the destination count as skipped so repeated runs converge.

use crate::cancel::CancelToken;
use crate::error::{SyncError, SyncResult};
use crate::options::{DataStoreStrategy, SyncOptions};
use crate::task::Task;
use geomirror_catalog::{CacheKey, CatalogClient, CatalogResult, ContentCache, ResourceKind};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

/// A catalog server taking part in a sync run.
#[derive(Clone)]
pub struct CatalogEndpoint {
    /// Stable identity of the server, used in task records and cache keys.
    pub id: String,
    /// Client for the server's management API.
    pub client: Arc<dyn CatalogClient>,
}

impl CatalogEndpoint {
    /// Creates an endpoint.
    pub fn new(id: impl Into<String>, client: Arc<dyn CatalogClient>) -> Self {
        Self {
            id: id.into(),
            client,
        }
    }
}

impl fmt::Debug for CatalogEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEndpoint")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Skipped,
    Failed,
}

/// Runs sync passes for one source, destination and option set.
pub struct Executor {
    source: CatalogEndpoint,
    destination: CatalogEndpoint,
    options: SyncOptions,
    cache: Option<Arc<dyn ContentCache>>,
}

impl Executor {
    /// Creates an executor without a content cache.
    pub fn new(source: CatalogEndpoint, destination: CatalogEndpoint, options: SyncOptions) -> Self {
        Self {
            source,
            destination,
            options,
            cache: None,
        }
    }

    /// Routes feature and coverage downloads through a content cache.
    pub fn with_cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns the options of this executor.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Performs one full pass, recording every outcome on `task`.
    ///
    /// Returns when the pass is over or `cancel` was observed. The task's
    /// terminal status is left to the caller, except for fatal errors which
    /// fail the task here.
    pub fn execute(&self, task: &Task, cancel: &CancelToken) {
        let span = info_span!("sync", task = %task.id());
        let _enter = span.enter();

        task.add_log(format!(
            "Starting sync from {} to {}",
            self.source.id, self.destination.id
        ));
        let walk = Walk {
            executor: self,
            task,
            cancel,
        };

        match walk.run() {
            Ok(()) => {
                let c = task.counters();
                info!(
                    done = c.done,
                    skipped = c.skipped,
                    failed = c.failed,
                    "sync pass finished"
                );
                task.add_log(format!(
                    "Sync pass finished: {} done, {} skipped, {} failed",
                    c.done, c.skipped, c.failed
                ));
            }
            Err(SyncError::Cancelled) => {
                info!("sync pass cancelled");
                task.add_log("Sync cancelled");
            }
            Err(e) => {
                warn!(error = %e, "sync pass aborted");
                task.set_error(format!("Failed to get workspaces from source: {e}"));
            }
        }
    }
}

/// State of one pass.
struct Walk<'a> {
    executor: &'a Executor,
    task: &'a Task,
    cancel: &'a CancelToken,
}

impl Walk<'_> {
    fn source(&self) -> &dyn CatalogClient {
        self.executor.source.client.as_ref()
    }

    fn destination(&self) -> &dyn CatalogClient {
        self.executor.destination.client.as_ref()
    }

    fn options(&self) -> &SyncOptions {
        &self.executor.options
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Done => self.task.increment_done(),
            Outcome::Skipped => self.task.increment_skipped(),
            Outcome::Failed => self.task.increment_failed(),
        }
        self.task.update_progress();
    }

    /// Classifies the result of a create call on the destination.
    fn record_create(&self, result: CatalogResult<()>, what: &str) -> Outcome {
        let outcome = match result {
            Ok(()) => {
                self.task.add_log(format!("Created {what}"));
                Outcome::Done
            }
            Err(e) if e.is_conflict() => {
                self.task.add_log(format!("{what} already exists, skipping"));
                Outcome::Skipped
            }
            Err(e) => {
                warn!(error = %e, "failed to create {what}");
                self.task.add_log(format!("Failed to create {what}: {e}"));
                Outcome::Failed
            }
        };
        self.record(outcome);
        outcome
    }

    fn run(&self) -> SyncResult<()> {
        if self.options().workspaces {
            self.check_cancelled()?;
            self.task.set_current_item("Listing workspaces");
            let workspaces = self.source().workspaces()?;
            self.task
                .add_log(format!("Found {} workspaces on source", workspaces.len()));

            for workspace in workspaces
                .iter()
                .filter(|w| self.options().includes_workspace(w))
            {
                self.check_cancelled()?;
                self.sync_workspace(workspace)?;
            }
        }

        if self.options().styles {
            self.check_cancelled()?;
            self.sync_styles("")?;
        }

        Ok(())
    }

    fn sync_workspace(&self, workspace: &str) -> SyncResult<()> {
        info!(workspace, "syncing workspace");
        self.task.set_current_item(format!("Workspace: {workspace}"));
        self.task.increment_total();

        let outcome = self.record_create(
            self.destination().create_workspace(workspace),
            &format!("workspace {workspace}"),
        );
        if outcome == Outcome::Failed {
            return Ok(());
        }

        let options = self.options();
        if options.styles {
            self.sync_styles(workspace)?;
        }
        if options.data_stores {
            self.sync_data_stores(workspace)?;
        }
        if options.coverage_stores {
            self.sync_coverage_stores(workspace)?;
        }
        if options.layer_groups {
            self.sync_layer_groups(workspace)?;
        }
        Ok(())
    }

    /// Syncs the styles of a workspace, or global styles for `""`.
    fn sync_styles(&self, workspace: &str) -> SyncResult<()> {
        let scope = if workspace.is_empty() {
            "global styles".to_string()
        } else {
            format!("styles of {workspace}")
        };

        let styles = match self.source().styles(workspace) {
            Ok(styles) => styles,
            Err(e) => {
                warn!(workspace, error = %e, "failed to list styles");
                self.task.add_log(format!("Failed to list {scope}: {e}"));
                return Ok(());
            }
        };

        for name in &styles {
            self.check_cancelled()?;
            self.sync_style(workspace, name);
        }
        Ok(())
    }

    fn sync_style(&self, workspace: &str, name: &str) {
        let label = if workspace.is_empty() {
            format!("style {name}")
        } else {
            format!("style {workspace}:{name}")
        };
        self.task.set_current_item(format!("Style: {name}"));
        self.task.increment_total();

        let sld = match self.source().style_sld(workspace, name) {
            Ok(sld) => sld,
            Err(e) => {
                warn!(workspace, style = name, error = %e, "failed to fetch style");
                self.task.add_log(format!("Failed to fetch {label}: {e}"));
                self.record(Outcome::Failed);
                return;
            }
        };

        self.record_create(
            self.destination()
                .create_or_update_style(workspace, name, &sld),
            &label,
        );
    }

    fn sync_data_stores(&self, workspace: &str) -> SyncResult<()> {
        let stores = match self.source().data_stores(workspace) {
            Ok(stores) => stores,
            Err(e) => {
                warn!(workspace, error = %e, "failed to list data stores");
                self.task
                    .add_log(format!("Failed to list data stores of {workspace}: {e}"));
                return Ok(());
            }
        };

        for store in &stores {
            self.check_cancelled()?;
            self.task
                .set_current_item(format!("Data store: {workspace}:{store}"));
            self.task.increment_total();

            let outcome = match self.options().data_store_strategy {
                DataStoreStrategy::SameConnection => {
                    self.task.add_log(format!(
                        "Skipping data store {workspace}:{store}: same_connection \
                         requires destination to have same DB access"
                    ));
                    Outcome::Skipped
                }
                DataStoreStrategy::Skip => {
                    self.task.add_log(format!(
                        "Skipping data store {workspace}:{store}: requires manual configuration"
                    ));
                    Outcome::Skipped
                }
                DataStoreStrategy::GeoPackageCopy => {
                    self.copy_store(workspace, store, ResourceKind::FeatureType)?
                }
            };
            self.record(outcome);
        }
        Ok(())
    }

    fn sync_coverage_stores(&self, workspace: &str) -> SyncResult<()> {
        let stores = match self.source().coverage_stores(workspace) {
            Ok(stores) => stores,
            Err(e) => {
                warn!(workspace, error = %e, "failed to list coverage stores");
                self.task
                    .add_log(format!("Failed to list coverage stores of {workspace}: {e}"));
                return Ok(());
            }
        };

        for store in &stores {
            self.check_cancelled()?;
            self.task
                .set_current_item(format!("Coverage store: {workspace}:{store}"));
            self.task.increment_total();

            let outcome = self.copy_store(workspace, store, ResourceKind::Coverage)?;
            self.record(outcome);
        }
        Ok(())
    }

    /// Copies every resource of a store as its own store on the destination.
    ///
    /// The store is done if at least one resource was uploaded, skipped if
    /// none was, and failed if its resources cannot be listed.
    fn copy_store(&self, workspace: &str, store: &str, kind: ResourceKind) -> SyncResult<Outcome> {
        let listed = match kind {
            ResourceKind::FeatureType => self.source().feature_types(workspace, store),
            ResourceKind::Coverage => self.source().coverages(workspace, store),
        };
        let names = match listed {
            Ok(names) => names,
            Err(e) => {
                warn!(workspace, store, error = %e, "failed to list {kind}s");
                self.task
                    .add_log(format!("Failed to list {kind}s of {workspace}:{store}: {e}"));
                return Ok(Outcome::Failed);
            }
        };

        let mut synced_any = false;
        for name in &names {
            self.check_cancelled()?;
            self.task
                .set_current_item(format!("{kind}: {workspace}:{name}"));

            let data = match self.fetch_payload(workspace, store, kind, name) {
                Ok(data) => data,
                Err(e) => {
                    warn!(workspace, store, resource = %name, error = %e, "failed to fetch {kind}");
                    self.task.add_log(format!(
                        "Failed to fetch {kind} {workspace}:{name}, skipping: {e}"
                    ));
                    continue;
                }
            };

            let uploaded = match kind {
                ResourceKind::FeatureType => {
                    self.destination()
                        .upload_shapefile_data(workspace, name, &data)
                }
                ResourceKind::Coverage => self.destination().upload_geotiff_data(workspace, name, &data),
            };

            match uploaded {
                Ok(()) => {
                    self.task.add_log(format!(
                        "Synced {kind} {workspace}:{name} ({} bytes)",
                        data.len()
                    ));
                    synced_any = true;
                }
                Err(e) if e.is_conflict() => {
                    self.task.add_log(format!(
                        "{kind} {workspace}:{name} already exists on destination"
                    ));
                }
                Err(e) => {
                    warn!(workspace, resource = %name, error = %e, "failed to upload {kind}");
                    self.task.add_log(format!(
                        "Failed to upload {kind} {workspace}:{name}, skipping: {e}"
                    ));
                }
            }
        }

        Ok(if synced_any {
            Outcome::Done
        } else {
            Outcome::Skipped
        })
    }

    /// Returns the payload of a feature type or coverage.
    ///
    /// A valid cache entry with data is read without touching the source.
    /// Otherwise the cache downloads and stores the payload first. Without a
    /// cache the source is asked directly.
    fn fetch_payload(
        &self,
        workspace: &str,
        store: &str,
        kind: ResourceKind,
        name: &str,
    ) -> CatalogResult<Vec<u8>> {
        let Some(cache) = self.executor.cache.as_deref() else {
            return match kind {
                ResourceKind::FeatureType => self.source().download_layer_as_shapefile(workspace, name),
                ResourceKind::Coverage => self.source().download_coverage_as_geotiff(workspace, name),
            };
        };

        let source_id = self.executor.source.id.as_str();
        let key = CacheKey::new(source_id, workspace, kind, store, name);

        if let Some(entry) = cache.entry(&key) {
            if entry.has_data() && cache.is_valid(self.source(), &entry) {
                match cache.read(&entry) {
                    Ok(data) => {
                        debug!(%key, "cache hit");
                        self.task
                            .add_log(format!("Using cached {kind} {workspace}:{name}"));
                        return Ok(data);
                    }
                    Err(e) => debug!(%key, error = %e, "cached payload unreadable"),
                }
            } else {
                debug!(%key, "cache entry stale");
            }
        }

        let entry = match kind {
            ResourceKind::FeatureType => {
                cache.cache_feature_type(self.source(), source_id, workspace, store, name)?
            }
            ResourceKind::Coverage => {
                cache.cache_coverage(self.source(), source_id, workspace, store, name)?
            }
        };
        cache.read(&entry)
    }

    fn sync_layer_groups(&self, workspace: &str) -> SyncResult<()> {
        let groups = match self.source().layer_groups(workspace) {
            Ok(groups) => groups,
            Err(e) => {
                warn!(workspace, error = %e, "failed to list layer groups");
                self.task
                    .add_log(format!("Failed to list layer groups of {workspace}: {e}"));
                return Ok(());
            }
        };

        for name in &groups {
            self.check_cancelled()?;
            self.task
                .set_current_item(format!("Layer group: {workspace}:{name}"));
            self.task.increment_total();
            let label = format!("layer group {workspace}:{name}");

            let group = match self.source().layer_group(workspace, name) {
                Ok(group) => group.qualified(workspace),
                Err(e) => {
                    warn!(workspace, group = %name, error = %e, "failed to fetch layer group");
                    self.task.add_log(format!("Failed to fetch {label}: {e}"));
                    self.record(Outcome::Failed);
                    continue;
                }
            };

            self.record_create(self.destination().create_layer_group(workspace, &group), &label);
        }
        Ok(())
    }
}
