//! # geomirror catalog
//!
//! Contracts for the servers and caches a geomirror sync run talks to.
//!
//! This crate provides:
//! - `CatalogClient`, the typed management API of one catalog server
//! - `ContentCache`, a store of previously downloaded feature and coverage payloads
//! - `CatalogError` with conflict ("already exists") classification
//! - `RestCatalogClient`, a GeoServer REST mapping over a pluggable `HttpClient`
//! - `MemoryCatalog` and `MemoryCache`, in-memory implementations for tests
//!
//! ## Conflict contract
//!
//! The sync engine treats "the target already exists" as a skip, not a
//! failure. Clients report it either as a typed `CatalogError::Conflict` or
//! with "already exists" / "409" in the error text.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cache;
mod client;
mod error;
mod http;
mod memory;
mod types;

pub use cache::{ContentCache, MemoryCache};
pub use client::{same_style_definition, CatalogClient};
pub use error::{is_conflict_text, CatalogError, CatalogResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, RestCatalogClient};
pub use memory::MemoryCatalog;
pub use types::{CacheEntry, CacheKey, LayerGroup, ResourceKind};
