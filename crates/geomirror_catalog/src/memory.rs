//! In-memory catalog server.

use crate::client::{same_style_definition, CatalogClient};
use crate::error::{CatalogError, CatalogResult};
use crate::types::LayerGroup;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};

type Payloads = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Default)]
struct CatalogState {
    workspaces: BTreeSet<String>,
    styles: BTreeMap<(String, String), String>,
    data_stores: BTreeMap<(String, String), Payloads>,
    coverage_stores: BTreeMap<(String, String), Payloads>,
    layer_groups: BTreeMap<(String, String), LayerGroup>,
}

impl CatalogState {
    fn require_workspace(&self, workspace: &str) -> CatalogResult<()> {
        if self.workspaces.contains(workspace) {
            Ok(())
        } else {
            Err(CatalogError::NotFound(format!("workspace '{workspace}'")))
        }
    }

    fn stores_in(stores: &BTreeMap<(String, String), Payloads>, workspace: &str) -> Vec<String> {
        stores
            .keys()
            .filter(|(ws, _)| ws == workspace)
            .map(|(_, store)| store.clone())
            .collect()
    }

    fn find_payload(
        stores: &BTreeMap<(String, String), Payloads>,
        workspace: &str,
        name: &str,
    ) -> Option<Vec<u8>> {
        stores
            .iter()
            .filter(|((ws, _), _)| ws == workspace)
            .find_map(|(_, resources)| resources.get(name).cloned())
    }
}

/// A thread-safe in-memory model of a catalog server.
///
/// Seed it with the builder methods, hand it to a sync run as source or
/// destination, then inspect what was created. Creating something that
/// already exists fails with [`CatalogError::Conflict`], the same way a
/// real server answers 409. Failures can be injected per call, and every
/// trait call is journaled as `"<operation> <target>"`.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
    failures: RwLock<Vec<(String, CatalogError)>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a workspace.
    pub fn with_workspace(self, workspace: &str) -> Self {
        self.state.write().workspaces.insert(workspace.to_string());
        self
    }

    /// Adds a style. An empty workspace adds a global style.
    pub fn with_style(self, workspace: &str, name: &str, sld: &str) -> Self {
        {
            let mut state = self.state.write();
            if !workspace.is_empty() {
                state.workspaces.insert(workspace.to_string());
            }
            state
                .styles
                .insert((workspace.to_string(), name.to_string()), sld.to_string());
        }
        self
    }

    /// Adds an empty data store.
    pub fn with_data_store(self, workspace: &str, store: &str) -> Self {
        {
            let mut state = self.state.write();
            state.workspaces.insert(workspace.to_string());
            state
                .data_stores
                .entry((workspace.to_string(), store.to_string()))
                .or_default();
        }
        self
    }

    /// Adds a feature type and its payload, creating the store if needed.
    pub fn with_feature_type(self, workspace: &str, store: &str, name: &str, data: Vec<u8>) -> Self {
        {
            let mut state = self.state.write();
            state.workspaces.insert(workspace.to_string());
            state
                .data_stores
                .entry((workspace.to_string(), store.to_string()))
                .or_default()
                .insert(name.to_string(), data);
        }
        self
    }

    /// Adds an empty coverage store.
    pub fn with_coverage_store(self, workspace: &str, store: &str) -> Self {
        {
            let mut state = self.state.write();
            state.workspaces.insert(workspace.to_string());
            state
                .coverage_stores
                .entry((workspace.to_string(), store.to_string()))
                .or_default();
        }
        self
    }

    /// Adds a coverage and its payload, creating the store if needed.
    pub fn with_coverage(self, workspace: &str, store: &str, name: &str, data: Vec<u8>) -> Self {
        {
            let mut state = self.state.write();
            state.workspaces.insert(workspace.to_string());
            state
                .coverage_stores
                .entry((workspace.to_string(), store.to_string()))
                .or_default()
                .insert(name.to_string(), data);
        }
        self
    }

    /// Adds a layer group.
    pub fn with_layer_group(self, workspace: &str, group: LayerGroup) -> Self {
        {
            let mut state = self.state.write();
            state.workspaces.insert(workspace.to_string());
            state
                .layer_groups
                .insert((workspace.to_string(), group.name.clone()), group);
        }
        self
    }

    /// Makes every call whose journal line starts with `call_prefix` fail.
    ///
    /// For example `"create_workspace parks"` or `"download_layer_as_shapefile"`.
    pub fn fail_on(&self, call_prefix: &str, error: CatalogError) {
        self.failures.write().push((call_prefix.to_string(), error));
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Returns the recorded calls, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns how many recorded calls start with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Returns true if the workspace exists.
    pub fn has_workspace(&self, workspace: &str) -> bool {
        self.state.read().workspaces.contains(workspace)
    }

    /// Returns a style definition without journaling the lookup.
    pub fn stored_style(&self, workspace: &str, name: &str) -> Option<String> {
        self.state
            .read()
            .styles
            .get(&(workspace.to_string(), name.to_string()))
            .cloned()
    }

    /// Returns a feature type payload without journaling the lookup.
    pub fn stored_feature_type(&self, workspace: &str, store: &str, name: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .data_stores
            .get(&(workspace.to_string(), store.to_string()))
            .and_then(|resources| resources.get(name).cloned())
    }

    /// Returns a coverage payload without journaling the lookup.
    pub fn stored_coverage(&self, workspace: &str, store: &str, name: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .coverage_stores
            .get(&(workspace.to_string(), store.to_string()))
            .and_then(|resources| resources.get(name).cloned())
    }

    /// Returns a layer group without journaling the lookup.
    pub fn stored_layer_group(&self, workspace: &str, name: &str) -> Option<LayerGroup> {
        self.state
            .read()
            .layer_groups
            .get(&(workspace.to_string(), name.to_string()))
            .cloned()
    }

    fn call(&self, line: String) -> CatalogResult<()> {
        let injected = self
            .failures
            .read()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, error)| error.clone());
        self.calls.lock().push(line);
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl CatalogClient for MemoryCatalog {
    fn workspaces(&self) -> CatalogResult<Vec<String>> {
        self.call("workspaces".into())?;
        Ok(self.state.read().workspaces.iter().cloned().collect())
    }

    fn create_workspace(&self, name: &str) -> CatalogResult<()> {
        self.call(format!("create_workspace {name}"))?;
        if self.state.write().workspaces.insert(name.to_string()) {
            Ok(())
        } else {
            Err(CatalogError::Conflict(format!("workspace '{name}'")))
        }
    }

    fn styles(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.call(format!("styles {workspace}"))?;
        let state = self.state.read();
        if !workspace.is_empty() {
            state.require_workspace(workspace)?;
        }
        Ok(state
            .styles
            .keys()
            .filter(|(ws, _)| ws == workspace)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn style_sld(&self, workspace: &str, name: &str) -> CatalogResult<String> {
        self.call(format!("style_sld {workspace}/{name}"))?;
        self.stored_style(workspace, name)
            .ok_or_else(|| CatalogError::NotFound(format!("style '{name}'")))
    }

    fn create_or_update_style(&self, workspace: &str, name: &str, sld: &str) -> CatalogResult<()> {
        self.call(format!("create_or_update_style {workspace}/{name}"))?;
        let mut state = self.state.write();
        if !workspace.is_empty() {
            state.require_workspace(workspace)?;
        }
        let key = (workspace.to_string(), name.to_string());
        if state
            .styles
            .get(&key)
            .is_some_and(|existing| same_style_definition(existing, sld))
        {
            return Err(CatalogError::Conflict(format!("style '{name}'")));
        }
        state.styles.insert(key, sld.to_string());
        Ok(())
    }

    fn data_stores(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.call(format!("data_stores {workspace}"))?;
        let state = self.state.read();
        state.require_workspace(workspace)?;
        Ok(CatalogState::stores_in(&state.data_stores, workspace))
    }

    fn feature_types(&self, workspace: &str, store: &str) -> CatalogResult<Vec<String>> {
        self.call(format!("feature_types {workspace}/{store}"))?;
        self.state
            .read()
            .data_stores
            .get(&(workspace.to_string(), store.to_string()))
            .map(|resources| resources.keys().cloned().collect())
            .ok_or_else(|| CatalogError::NotFound(format!("data store '{store}'")))
    }

    fn download_layer_as_shapefile(
        &self,
        workspace: &str,
        feature_type: &str,
    ) -> CatalogResult<Vec<u8>> {
        self.call(format!("download_layer_as_shapefile {workspace}/{feature_type}"))?;
        CatalogState::find_payload(&self.state.read().data_stores, workspace, feature_type)
            .ok_or_else(|| CatalogError::NotFound(format!("feature type '{feature_type}'")))
    }

    fn upload_shapefile_data(&self, workspace: &str, store: &str, data: &[u8]) -> CatalogResult<()> {
        self.call(format!("upload_shapefile_data {workspace}/{store}"))?;
        let mut state = self.state.write();
        state.require_workspace(workspace)?;
        let key = (workspace.to_string(), store.to_string());
        if state.data_stores.contains_key(&key) {
            return Err(CatalogError::Conflict(format!("data store '{store}'")));
        }
        let mut resources = Payloads::new();
        resources.insert(store.to_string(), data.to_vec());
        state.data_stores.insert(key, resources);
        Ok(())
    }

    fn coverage_stores(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.call(format!("coverage_stores {workspace}"))?;
        let state = self.state.read();
        state.require_workspace(workspace)?;
        Ok(CatalogState::stores_in(&state.coverage_stores, workspace))
    }

    fn coverages(&self, workspace: &str, store: &str) -> CatalogResult<Vec<String>> {
        self.call(format!("coverages {workspace}/{store}"))?;
        self.state
            .read()
            .coverage_stores
            .get(&(workspace.to_string(), store.to_string()))
            .map(|resources| resources.keys().cloned().collect())
            .ok_or_else(|| CatalogError::NotFound(format!("coverage store '{store}'")))
    }

    fn download_coverage_as_geotiff(&self, workspace: &str, coverage: &str) -> CatalogResult<Vec<u8>> {
        self.call(format!("download_coverage_as_geotiff {workspace}/{coverage}"))?;
        CatalogState::find_payload(&self.state.read().coverage_stores, workspace, coverage)
            .ok_or_else(|| CatalogError::NotFound(format!("coverage '{coverage}'")))
    }

    fn upload_geotiff_data(&self, workspace: &str, store: &str, data: &[u8]) -> CatalogResult<()> {
        self.call(format!("upload_geotiff_data {workspace}/{store}"))?;
        let mut state = self.state.write();
        state.require_workspace(workspace)?;
        let key = (workspace.to_string(), store.to_string());
        if state.coverage_stores.contains_key(&key) {
            return Err(CatalogError::Conflict(format!("coverage store '{store}'")));
        }
        let mut resources = Payloads::new();
        resources.insert(store.to_string(), data.to_vec());
        state.coverage_stores.insert(key, resources);
        Ok(())
    }

    fn layer_groups(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.call(format!("layer_groups {workspace}"))?;
        let state = self.state.read();
        state.require_workspace(workspace)?;
        Ok(state
            .layer_groups
            .keys()
            .filter(|(ws, _)| ws == workspace)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn layer_group(&self, workspace: &str, name: &str) -> CatalogResult<LayerGroup> {
        self.call(format!("layer_group {workspace}/{name}"))?;
        self.stored_layer_group(workspace, name)
            .ok_or_else(|| CatalogError::NotFound(format!("layer group '{name}'")))
    }

    fn create_layer_group(&self, workspace: &str, group: &LayerGroup) -> CatalogResult<()> {
        self.call(format!("create_layer_group {workspace}/{}", group.name))?;
        let mut state = self.state.write();
        state.require_workspace(workspace)?;
        let key = (workspace.to_string(), group.name.clone());
        if state.layer_groups.contains_key(&key) {
            return Err(CatalogError::Conflict(format!("layer group '{}'", group.name)));
        }
        state.layer_groups.insert(key, group.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_listing() {
        let catalog = MemoryCatalog::new()
            .with_workspace("parks")
            .with_style("parks", "green", "<sld/>")
            .with_style("", "point", "<sld/>")
            .with_feature_type("parks", "db", "trees", vec![1]);

        assert_eq!(catalog.workspaces().unwrap(), vec!["parks"]);
        assert_eq!(catalog.styles("parks").unwrap(), vec!["green"]);
        assert_eq!(catalog.styles("").unwrap(), vec!["point"]);
        assert_eq!(catalog.data_stores("parks").unwrap(), vec!["db"]);
        assert_eq!(catalog.feature_types("parks", "db").unwrap(), vec!["trees"]);
        assert_eq!(
            catalog.download_layer_as_shapefile("parks", "trees").unwrap(),
            vec![1]
        );
    }

    #[test]
    fn create_twice_conflicts() {
        let catalog = MemoryCatalog::new();
        catalog.create_workspace("parks").unwrap();

        let err = catalog.create_workspace("parks").unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn identical_style_conflicts_but_changed_style_updates() {
        let catalog = MemoryCatalog::new().with_style("parks", "green", "<v1/>");

        assert!(catalog
            .create_or_update_style("parks", "green", "<v1/>")
            .unwrap_err()
            .is_conflict());
        catalog
            .create_or_update_style("parks", "green", "<v2/>")
            .unwrap();
        assert_eq!(catalog.stored_style("parks", "green").unwrap(), "<v2/>");
    }

    #[test]
    fn upload_creates_store_named_after_resource() {
        let catalog = MemoryCatalog::new().with_workspace("parks");

        catalog
            .upload_shapefile_data("parks", "trees", b"zip")
            .unwrap();
        assert_eq!(
            catalog.stored_feature_type("parks", "trees", "trees").unwrap(),
            b"zip"
        );
        assert!(catalog
            .upload_shapefile_data("parks", "trees", b"zip")
            .unwrap_err()
            .is_conflict());
    }

    #[test]
    fn upload_into_missing_workspace_fails() {
        let catalog = MemoryCatalog::new();
        let err = catalog.upload_geotiff_data("nope", "dem", b"tif").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn injected_failure_and_journal() {
        let catalog = MemoryCatalog::new().with_workspace("parks");
        catalog.fail_on(
            "create_workspace roads",
            CatalogError::Transport("connection reset".into()),
        );

        assert!(catalog.create_workspace("lakes").is_ok());
        assert!(matches!(
            catalog.create_workspace("roads"),
            Err(CatalogError::Transport(_))
        ));
        assert_eq!(catalog.call_count("create_workspace"), 2);

        catalog.clear_failures();
        assert!(catalog.create_workspace("roads").is_ok());
    }

    #[test]
    fn layer_group_roundtrip() {
        let catalog = MemoryCatalog::new().with_workspace("parks");
        let group = LayerGroup::new("base", "Base", "SINGLE").with_layer("parks:roads");

        catalog.create_layer_group("parks", &group).unwrap();
        assert_eq!(catalog.layer_groups("parks").unwrap(), vec!["base"]);
        assert_eq!(catalog.layer_group("parks", "base").unwrap(), group);
        assert!(catalog
            .create_layer_group("parks", &group)
            .unwrap_err()
            .is_conflict());
    }
}
