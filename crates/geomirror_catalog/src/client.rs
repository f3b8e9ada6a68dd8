//! Catalog client abstraction.

use crate::error::CatalogResult;
use crate::types::LayerGroup;

/// A typed management client for one catalog server.
///
/// Source and destination servers each get their own instance. Every call
/// is blocking and may be issued concurrently from several sync tasks, so
/// implementations must be safe to share between threads.
///
/// Errors for resources that already exist must be distinguishable through
/// [`CatalogError::is_conflict`](crate::CatalogError::is_conflict): either
/// return [`CatalogError::Conflict`](crate::CatalogError::Conflict) or keep
/// "already exists" / "409" in the error text.
pub trait CatalogClient: Send + Sync {
    /// Lists workspace names.
    fn workspaces(&self) -> CatalogResult<Vec<String>>;

    /// Creates a workspace.
    fn create_workspace(&self, name: &str) -> CatalogResult<()>;

    /// Lists style names in a workspace, or global styles when `workspace` is empty.
    fn styles(&self, workspace: &str) -> CatalogResult<Vec<String>>;

    /// Fetches a style definition (SLD document).
    fn style_sld(&self, workspace: &str, name: &str) -> CatalogResult<String>;

    /// Creates a style or replaces its definition.
    ///
    /// Reports a conflict when the style exists with the same definition.
    /// Servers may reformat stored SLD, so implementations compare
    /// definitions with insignificant whitespace and the XML declaration
    /// ignored; other rewrites still count as a change.
    fn create_or_update_style(&self, workspace: &str, name: &str, sld: &str) -> CatalogResult<()>;

    /// Lists data store names in a workspace.
    fn data_stores(&self, workspace: &str) -> CatalogResult<Vec<String>>;

    /// Lists feature type names published from a data store.
    fn feature_types(&self, workspace: &str, store: &str) -> CatalogResult<Vec<String>>;

    /// Downloads a feature type's features as a zipped shapefile.
    fn download_layer_as_shapefile(&self, workspace: &str, feature_type: &str)
        -> CatalogResult<Vec<u8>>;

    /// Uploads a zipped shapefile as a new data store.
    fn upload_shapefile_data(&self, workspace: &str, store: &str, data: &[u8])
        -> CatalogResult<()>;

    /// Lists coverage store names in a workspace.
    fn coverage_stores(&self, workspace: &str) -> CatalogResult<Vec<String>>;

    /// Lists coverage names published from a coverage store.
    fn coverages(&self, workspace: &str, store: &str) -> CatalogResult<Vec<String>>;

    /// Downloads a coverage as GeoTIFF.
    fn download_coverage_as_geotiff(&self, workspace: &str, coverage: &str)
        -> CatalogResult<Vec<u8>>;

    /// Uploads a GeoTIFF as a new coverage store.
    fn upload_geotiff_data(&self, workspace: &str, store: &str, data: &[u8]) -> CatalogResult<()>;

    /// Lists layer group names in a workspace.
    fn layer_groups(&self, workspace: &str) -> CatalogResult<Vec<String>>;

    /// Fetches a layer group definition.
    fn layer_group(&self, workspace: &str, name: &str) -> CatalogResult<LayerGroup>;

    /// Creates a layer group.
    fn create_layer_group(&self, workspace: &str, group: &LayerGroup) -> CatalogResult<()>;
}

/// Returns true if two SLD documents differ only in formatting.
///
/// Whitespace runs, whitespace between tags and a leading XML declaration
/// are ignored.
pub fn same_style_definition(a: &str, b: &str) -> bool {
    normalize_sld(a) == normalize_sld(b)
}

fn normalize_sld(sld: &str) -> String {
    let mut body = sld.trim_start();
    if body.starts_with("<?xml") {
        if let Some(end) = body.find("?>") {
            body = &body[end + 2..];
        }
    }
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("> <", "><")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reformatted_style_is_the_same() {
        let stored = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<StyledLayerDescriptor>\n  <Name>green</Name>\n</StyledLayerDescriptor>\n";
        let sent = "<StyledLayerDescriptor><Name>green</Name></StyledLayerDescriptor>";
        assert!(same_style_definition(stored, sent));
    }

    #[test]
    fn changed_content_differs() {
        assert!(!same_style_definition("<Name>green</Name>", "<Name>red</Name>"));
        assert!(!same_style_definition("<Name>dark green</Name>", "<Name>darkgreen</Name>"));
    }
}
