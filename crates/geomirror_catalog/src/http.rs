//! REST catalog client.
//!
//! This module maps [`CatalogClient`] calls onto a GeoServer-style REST
//! management API. The actual HTTP client is abstracted via a trait so
//! any HTTP library (reqwest, ureq, hyper) can be plugged in.
//!
//! Resource names are arbitrary user input. They only ever enter a URL as
//! a percent-encoded path segment or a form-encoded query value.

use crate::client::{same_style_definition, CatalogClient};
use crate::error::{is_conflict_text, CatalogError, CatalogResult};
use crate::types::LayerGroup;
use serde_json::{json, Value};
use std::iter;
use tracing::debug;
use url::Url;

const JSON: &str = "application/json";
const SLD: &str = "application/vnd.ogc.sld+xml";
const ZIP: &str = "application/zip";
const GEOTIFF: &str = "image/tiff";

/// HTTP method used by the catalog client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
}

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Body content type, if there is a body.
    pub content_type: Option<&'static str>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    fn get(url: String) -> Self {
        Self {
            method: Method::Get,
            url,
            content_type: None,
            body: Vec::new(),
        }
    }

    fn with_body(method: Method, url: String, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            method,
            url,
            content_type: Some(content_type),
            body,
        }
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client abstraction.
///
/// Implementations handle connection reuse, authentication and timeouts.
/// Any failure to obtain a response is reported as an error string.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// A [`CatalogClient`] speaking the GeoServer REST API.
pub struct RestCatalogClient<C: HttpClient> {
    /// Base URL of the server (e.g., "https://maps.example.com/geoserver").
    base_url: Url,
    /// HTTP client implementation.
    client: C,
}

impl<C: HttpClient> RestCatalogClient<C> {
    /// Creates a new REST catalog client.
    ///
    /// Fails with [`CatalogError::InvalidUrl`] if `base_url` is not an
    /// absolute URL that can carry a path.
    pub fn new(base_url: &str, client: C) -> CatalogResult<Self> {
        let raw = base_url;
        let mut base_url =
            Url::parse(raw).map_err(|e| CatalogError::InvalidUrl(format!("{raw}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CatalogError::InvalidUrl(format!("{raw} cannot be a base")));
        }
        if let Ok(mut segments) = base_url.path_segments_mut() {
            segments.pop_if_empty();
        }
        base_url.set_query(None);
        base_url.set_fragment(None);

        Ok(Self { base_url, client })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Appends encoded path segments and query pairs to the base URL.
    fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
        query: &[(&str, &str)],
    ) -> CatalogResult<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CatalogError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.into())
    }

    fn rest(&self, segments: &[&str]) -> CatalogResult<String> {
        self.endpoint(iter::once("rest").chain(segments.iter().copied()), &[])
    }

    fn execute(&self, request: HttpRequest) -> CatalogResult<HttpResponse> {
        debug!(method = ?request.method, url = %request.url, "catalog request");
        let response = self.client.send(request).map_err(CatalogError::Transport)?;

        match response.status {
            200..=299 => Ok(response),
            404 => Err(CatalogError::NotFound(response.text())),
            409 => Err(CatalogError::Conflict(response.text())),
            status => {
                let message = response.text();
                if is_conflict_text(&message) {
                    Err(CatalogError::Conflict(message))
                } else {
                    Err(CatalogError::Http { status, message })
                }
            }
        }
    }

    fn get_json(&self, url: String) -> CatalogResult<Value> {
        let response = self.execute(HttpRequest::get(url))?;
        serde_json::from_slice(&response.body).map_err(|e| CatalogError::Decode(e.to_string()))
    }

    fn get_bytes(&self, url: String) -> CatalogResult<Vec<u8>> {
        Ok(self.execute(HttpRequest::get(url))?.body)
    }

    fn send_json(&self, method: Method, url: String, body: &Value) -> CatalogResult<()> {
        let body = serde_json::to_vec(body).map_err(|e| CatalogError::Decode(e.to_string()))?;
        self.execute(HttpRequest::with_body(method, url, JSON, body))?;
        Ok(())
    }

    fn list(&self, segments: &[&str], collection: &str, item: &str) -> CatalogResult<Vec<String>> {
        let value = self.get_json(self.rest(segments)?)?;
        Ok(names_at(&value, collection, item))
    }

    fn exists(&self, url: String) -> CatalogResult<bool> {
        match self.execute(HttpRequest::get(url)) {
            Ok(_) => Ok(true),
            Err(CatalogError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn upload(
        &self,
        workspace: &str,
        store_collection: &str,
        store: &str,
        file: &str,
        content_type: &'static str,
        data: &[u8],
    ) -> CatalogResult<()> {
        let store_json = format!("{store}.json");
        let store_url = self.rest(&[
            "workspaces",
            workspace,
            store_collection,
            store_json.as_str(),
        ])?;
        if self.exists(store_url)? {
            return Err(CatalogError::Conflict(format!("store '{store}'")));
        }

        let url = self.rest(&["workspaces", workspace, store_collection, store, file])?;
        self.execute(HttpRequest::with_body(Method::Put, url, content_type, data.to_vec()))?;
        Ok(())
    }
}

/// Path segments below `/rest`, scoped to a workspace unless it is global (`""`).
fn scoped<'a>(workspace: &'a str, tail: &[&'a str]) -> Vec<&'a str> {
    let mut segments = Vec::with_capacity(tail.len() + 2);
    if !workspace.is_empty() {
        segments.extend(["workspaces", workspace]);
    }
    segments.extend_from_slice(tail);
    segments
}

/// Extracts `value[collection][item][*].name`.
///
/// GeoServer answers an empty collection with `""` instead of an object and a
/// single-element collection may be an object instead of an array.
fn names_at(value: &Value, collection: &str, item: &str) -> Vec<String> {
    match &value[collection][item] {
        Value::Array(items) => items
            .iter()
            .filter_map(|i| i["name"].as_str().map(str::to_string))
            .collect(),
        Value::Object(single) => single
            .get("name")
            .and_then(Value::as_str)
            .map(|n| vec![n.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn parse_layer_group(value: &Value) -> CatalogResult<LayerGroup> {
    let group = &value["layerGroup"];
    let name = group["name"]
        .as_str()
        .ok_or_else(|| CatalogError::Decode("layer group without name".into()))?;

    let published = &group["publishables"]["published"];
    let members: Vec<&Value> = match published {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![published],
        _ => Vec::new(),
    };

    Ok(LayerGroup {
        name: name.to_string(),
        title: group["title"].as_str().unwrap_or_default().to_string(),
        mode: group["mode"].as_str().unwrap_or("SINGLE").to_string(),
        layers: members
            .into_iter()
            .filter_map(|m| m["name"].as_str().map(str::to_string))
            .collect(),
    })
}

impl<C: HttpClient> CatalogClient for RestCatalogClient<C> {
    fn workspaces(&self) -> CatalogResult<Vec<String>> {
        self.list(&["workspaces.json"], "workspaces", "workspace")
    }

    fn create_workspace(&self, name: &str) -> CatalogResult<()> {
        let body = json!({ "workspace": { "name": name } });
        self.send_json(Method::Post, self.rest(&["workspaces"])?, &body)
    }

    fn styles(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.list(&scoped(workspace, &["styles.json"]), "styles", "style")
    }

    fn style_sld(&self, workspace: &str, name: &str) -> CatalogResult<String> {
        let file = format!("{name}.sld");
        let url = self.rest(&scoped(workspace, &["styles", file.as_str()]))?;
        let bytes = self.get_bytes(url)?;
        String::from_utf8(bytes).map_err(|e| CatalogError::Decode(e.to_string()))
    }

    fn create_or_update_style(&self, workspace: &str, name: &str, sld: &str) -> CatalogResult<()> {
        let create_url = self.endpoint(
            iter::once("rest").chain(scoped(workspace, &["styles"])),
            &[("name", name)],
        )?;
        let created = self.execute(HttpRequest::with_body(
            Method::Post,
            create_url,
            SLD,
            sld.as_bytes().to_vec(),
        ));

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => {
                if same_style_definition(&self.style_sld(workspace, name)?, sld) {
                    return Err(e);
                }
                let url = self.rest(&scoped(workspace, &["styles", name]))?;
                self.execute(HttpRequest::with_body(
                    Method::Put,
                    url,
                    SLD,
                    sld.as_bytes().to_vec(),
                ))?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn data_stores(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.list(
            &["workspaces", workspace, "datastores.json"],
            "dataStores",
            "dataStore",
        )
    }

    fn feature_types(&self, workspace: &str, store: &str) -> CatalogResult<Vec<String>> {
        self.list(
            &["workspaces", workspace, "datastores", store, "featuretypes.json"],
            "featureTypes",
            "featureType",
        )
    }

    fn download_layer_as_shapefile(
        &self,
        workspace: &str,
        feature_type: &str,
    ) -> CatalogResult<Vec<u8>> {
        let type_name = format!("{workspace}:{feature_type}");
        let url = self.endpoint(
            [workspace, "ows"],
            &[
                ("service", "WFS"),
                ("version", "1.0.0"),
                ("request", "GetFeature"),
                ("typeName", type_name.as_str()),
                ("outputFormat", "SHAPE-ZIP"),
            ],
        )?;
        self.get_bytes(url)
    }

    fn upload_shapefile_data(&self, workspace: &str, store: &str, data: &[u8]) -> CatalogResult<()> {
        self.upload(workspace, "datastores", store, "file.shp", ZIP, data)
    }

    fn coverage_stores(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.list(
            &["workspaces", workspace, "coveragestores.json"],
            "coverageStores",
            "coverageStore",
        )
    }

    fn coverages(&self, workspace: &str, store: &str) -> CatalogResult<Vec<String>> {
        self.list(
            &["workspaces", workspace, "coveragestores", store, "coverages.json"],
            "coverages",
            "coverage",
        )
    }

    fn download_coverage_as_geotiff(&self, workspace: &str, coverage: &str) -> CatalogResult<Vec<u8>> {
        let coverage_id = format!("{workspace}__{coverage}");
        let url = self.endpoint(
            [workspace, "ows"],
            &[
                ("service", "WCS"),
                ("version", "2.0.1"),
                ("request", "GetCoverage"),
                ("coverageId", coverage_id.as_str()),
                ("format", "image/geotiff"),
            ],
        )?;
        self.get_bytes(url)
    }

    fn upload_geotiff_data(&self, workspace: &str, store: &str, data: &[u8]) -> CatalogResult<()> {
        self.upload(workspace, "coveragestores", store, "file.geotiff", GEOTIFF, data)
    }

    fn layer_groups(&self, workspace: &str) -> CatalogResult<Vec<String>> {
        self.list(
            &["workspaces", workspace, "layergroups.json"],
            "layerGroups",
            "layerGroup",
        )
    }

    fn layer_group(&self, workspace: &str, name: &str) -> CatalogResult<LayerGroup> {
        let file = format!("{name}.json");
        let value = self.get_json(self.rest(&["workspaces", workspace, "layergroups", file.as_str()])?)?;
        parse_layer_group(&value)
    }

    fn create_layer_group(&self, workspace: &str, group: &LayerGroup) -> CatalogResult<()> {
        let body = json!({
            "layerGroup": {
                "name": group.name,
                "title": group.title,
                "mode": group.mode,
                "layers": { "layer": group.layers },
            }
        });
        self.send_json(
            Method::Post,
            self.rest(&["workspaces", workspace, "layergroups"])?,
            &body,
        )
    }
}
