//! Shared helpers for sync integration tests.

#![allow(dead_code)]

use geomirror_catalog::{CatalogClient, CatalogResult, LayerGroup, MemoryCatalog};
use geomirror_sync::{CatalogEndpoint, SyncManager, Task, TaskStatus};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Installs a test log subscriber once. `RUST_LOG=debug` shows executor traces.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn endpoint(id: &str, catalog: &Arc<MemoryCatalog>) -> CatalogEndpoint {
    CatalogEndpoint::new(id, catalog.clone())
}

pub fn log_contains(task: &Task, needle: &str) -> bool {
    task.log().iter().any(|line| line.contains(needle))
}

/// Polls until the task leaves `Running` or the timeout expires.
pub fn wait_terminal(task: &Task, timeout: Duration) -> TaskStatus {
    let deadline = Instant::now() + timeout;
    while !task.status().is_terminal() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    task.status()
}

pub fn run_to_end(manager: &SyncManager, task: &Task) -> TaskStatus {
    manager.wait(task.id()).unwrap()
}

/// A catalog that parks the first call matching a prefix until released.
pub struct GatedCatalog {
    inner: Arc<MemoryCatalog>,
    gate: String,
    reached: Mutex<Option<Sender<()>>>,
    release: Mutex<Receiver<()>>,
}

/// Test-side handle of a [`GatedCatalog`].
pub struct Gate {
    reached: Receiver<()>,
    release: Sender<()>,
}

impl Gate {
    /// Blocks until the gated call has been entered.
    pub fn wait_reached(&self) {
        self.reached
            .recv_timeout(Duration::from_secs(10))
            .expect("gated call never reached");
    }

    /// Lets the gated call proceed.
    pub fn open(&self) {
        self.release.send(()).unwrap();
    }
}

impl GatedCatalog {
    pub fn new(inner: Arc<MemoryCatalog>, gate: &str) -> (Arc<Self>, Gate) {
        let (reached_tx, reached_rx) = channel();
        let (release_tx, release_rx) = channel();
        let catalog = Arc::new(Self {
            inner,
            gate: gate.to_string(),
            reached: Mutex::new(Some(reached_tx)),
            release: Mutex::new(release_rx),
        });
        (
            catalog,
            Gate {
                reached: reached_rx,
                release: release_tx,
            },
        )
    }

    fn pass(&self, call: String) {
        if !call.starts_with(&self.gate) {
            return;
        }
        let Some(reached) = self.reached.lock().unwrap().take() else {
            return;
        };
        reached.send(()).unwrap();
        self.release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(10))
            .expect("gate never opened");
    }
}

impl CatalogClient for GatedCatalog {
    fn workspaces(&self) -> CatalogResult<Vec<String>> {
        self.pass("workspaces".into());
        self.inner.workspaces()
    }

    fn create_workspace(&self, name: &str) -> CatalogResult<()> {
        self.pass(format!("create_workspace {name}"));
        self.inner.create_workspace(name)
    }

    fn styles(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.pass(format!("styles {workspace}"));
        self.inner.styles(workspace)
    }

    fn style_sld(&self, workspace: &str, name: &str) -> CatalogResult<String> {
        self.pass(format!("style_sld {workspace}/{name}"));
        self.inner.style_sld(workspace, name)
    }

    fn create_or_update_style(&self, workspace: &str, name: &str, sld: &str) -> CatalogResult<()> {
        self.pass(format!("create_or_update_style {workspace}/{name}"));
        self.inner.create_or_update_style(workspace, name, sld)
    }

    fn data_stores(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.pass(format!("data_stores {workspace}"));
        self.inner.data_stores(workspace)
    }

    fn feature_types(&self, workspace: &str, store: &str) -> CatalogResult<Vec<String>> {
        self.pass(format!("feature_types {workspace}/{store}"));
        self.inner.feature_types(workspace, store)
    }

    fn download_layer_as_shapefile(&self, workspace: &str, feature_type: &str) -> CatalogResult<Vec<u8>> {
        self.pass(format!("download_layer_as_shapefile {workspace}/{feature_type}"));
        self.inner.download_layer_as_shapefile(workspace, feature_type)
    }

    fn upload_shapefile_data(&self, workspace: &str, store: &str, data: &[u8]) -> CatalogResult<()> {
        self.pass(format!("upload_shapefile_data {workspace}/{store}"));
        self.inner.upload_shapefile_data(workspace, store, data)
    }

    fn coverage_stores(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.pass(format!("coverage_stores {workspace}"));
        self.inner.coverage_stores(workspace)
    }

    fn coverages(&self, workspace: &str, store: &str) -> CatalogResult<Vec<String>> {
        self.pass(format!("coverages {workspace}/{store}"));
        self.inner.coverages(workspace, store)
    }

    fn download_coverage_as_geotiff(&self, workspace: &str, coverage: &str) -> CatalogResult<Vec<u8>> {
        self.pass(format!("download_coverage_as_geotiff {workspace}/{coverage}"));
        self.inner.download_coverage_as_geotiff(workspace, coverage)
    }

    fn upload_geotiff_data(&self, workspace: &str, store: &str, data: &[u8]) -> CatalogResult<()> {
        self.pass(format!("upload_geotiff_data {workspace}/{store}"));
        self.inner.upload_geotiff_data(workspace, store, data)
    }

    fn layer_groups(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.pass(format!("layer_groups {workspace}"));
        self.inner.layer_groups(workspace)
    }

    fn layer_group(&self, workspace: &str, name: &str) -> CatalogResult<LayerGroup> {
        self.pass(format!("layer_group {workspace}/{name}"));
        self.inner.layer_group(workspace, name)
    }

    fn create_layer_group(&self, workspace: &str, group: &LayerGroup) -> CatalogResult<()> {
        self.pass(format!("create_layer_group {workspace}/{}", group.name));
        self.inner.create_layer_group(workspace, group)
    }
}
