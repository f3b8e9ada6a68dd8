//! Resource types shared by catalog clients and caches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of bulk resource a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A vector layer published from a data store.
    FeatureType,
    /// A raster layer published from a coverage store.
    Coverage,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::FeatureType => write!(f, "feature type"),
            ResourceKind::Coverage => write!(f, "coverage"),
        }
    }
}

/// A layer group definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayerGroup {
    /// Group name.
    pub name: String,
    /// Human readable title.
    pub title: String,
    /// Composition mode (e.g. `SINGLE`, `NAMED`).
    pub mode: String,
    /// Member layer names, in drawing order.
    pub layers: Vec<String>,
}

impl LayerGroup {
    /// Creates a new layer group definition.
    pub fn new(name: impl Into<String>, title: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            mode: mode.into(),
            layers: Vec::new(),
        }
    }

    /// Appends a member layer.
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layers.push(layer.into());
        self
    }

    /// Returns a copy whose member names carry a `workspace:` prefix.
    ///
    /// Names that are already qualified are kept as they are.
    pub fn qualified(&self, workspace: &str) -> Self {
        let layers = self
            .layers
            .iter()
            .map(|layer| {
                if layer.contains(':') {
                    layer.clone()
                } else {
                    format!("{workspace}:{layer}")
                }
            })
            .collect();

        Self {
            name: self.name.clone(),
            title: self.title.clone(),
            mode: self.mode.clone(),
            layers,
        }
    }
}

/// Identifies one cached resource payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Identity of the source server the payload came from.
    pub source_id: String,
    /// Workspace name.
    pub workspace: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Data store or coverage store name.
    pub store: String,
    /// Feature type or coverage name.
    pub name: String,
}

impl CacheKey {
    /// Creates a new cache key.
    pub fn new(
        source_id: impl Into<String>,
        workspace: impl Into<String>,
        kind: ResourceKind,
        store: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            workspace: workspace.into(),
            kind,
            store: store.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.source_id, self.workspace, self.kind, self.store, self.name
        )
    }
}

/// A record of a previously fetched payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// What the entry describes.
    pub key: CacheKey,
    /// Handle to the cached payload, if the download ever succeeded.
    pub data_file: Option<String>,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry with a payload handle.
    pub fn new(key: CacheKey, data_file: impl Into<String>) -> Self {
        Self {
            key,
            data_file: Some(data_file.into()),
            cached_at: Utc::now(),
        }
    }

    /// Creates an entry that records metadata only.
    pub fn without_data(key: CacheKey) -> Self {
        Self {
            key,
            data_file: None,
            cached_at: Utc::now(),
        }
    }

    /// Returns true if the entry points at cached payload bytes.
    pub fn has_data(&self) -> bool {
        self.data_file.as_deref().is_some_and(|f| !f.is_empty())
    }
}
