//! Options selecting what a sync run mirrors.

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How vector data stores are transferred to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStoreStrategy {
    /// Reuse the source's database connection. Not attempted over the
    /// network since the destination may lack the same database access.
    SameConnection,
    /// Download every feature type and upload it as its own store.
    #[default]
    #[serde(rename = "geopackage_copy")]
    GeoPackageCopy,
    /// Leave data stores for manual configuration.
    Skip,
}

impl fmt::Display for DataStoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataStoreStrategy::SameConnection => write!(f, "same_connection"),
            DataStoreStrategy::GeoPackageCopy => write!(f, "geopackage_copy"),
            DataStoreStrategy::Skip => write!(f, "skip"),
        }
    }
}

/// Options for one sync run. Fixed for the run's duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    /// Mirror workspaces and everything inside them.
    pub workspaces: bool,
    /// Mirror styles, per workspace and global.
    pub styles: bool,
    /// Mirror vector data stores.
    pub data_stores: bool,
    /// Mirror raster coverage stores.
    pub coverage_stores: bool,
    /// Mirror layer groups.
    pub layer_groups: bool,
    /// Workspaces to mirror. Empty means all of them.
    pub workspace_filter: Vec<String>,
    /// Transfer strategy for data stores.
    pub data_store_strategy: DataStoreStrategy,
}

impl SyncOptions {
    /// Creates options with every resource kind disabled.
    pub fn none() -> Self {
        Self {
            workspaces: false,
            styles: false,
            data_stores: false,
            coverage_stores: false,
            layer_groups: false,
            workspace_filter: Vec::new(),
            data_store_strategy: DataStoreStrategy::default(),
        }
    }

    /// Parses options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Enables or disables workspaces.
    pub fn with_workspaces(mut self, enabled: bool) -> Self {
        self.workspaces = enabled;
        self
    }

    /// Enables or disables styles.
    pub fn with_styles(mut self, enabled: bool) -> Self {
        self.styles = enabled;
        self
    }

    /// Enables or disables data stores.
    pub fn with_data_stores(mut self, enabled: bool) -> Self {
        self.data_stores = enabled;
        self
    }

    /// Enables or disables coverage stores.
    pub fn with_coverage_stores(mut self, enabled: bool) -> Self {
        self.coverage_stores = enabled;
        self
    }

    /// Enables or disables layer groups.
    pub fn with_layer_groups(mut self, enabled: bool) -> Self {
        self.layer_groups = enabled;
        self
    }

    /// Restricts the run to the named workspaces.
    pub fn with_workspace_filter<I, S>(mut self, workspaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workspace_filter = workspaces.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the data store strategy.
    pub fn with_data_store_strategy(mut self, strategy: DataStoreStrategy) -> Self {
        self.data_store_strategy = strategy;
        self
    }

    /// Returns true if the workspace passes the filter.
    pub fn includes_workspace(&self, name: &str) -> bool {
        self.workspace_filter.is_empty() || self.workspace_filter.iter().any(|w| w == name)
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workspaces: true,
            styles: true,
            data_stores: true,
            coverage_stores: true,
            layer_groups: true,
            workspace_filter: Vec::new(),
            data_store_strategy: DataStoreStrategy::default(),
        }
    }
}
