//! # MagicWord Catalog
//!
//! Shared-library catalog: paged remote index, uploads and downloads, and
//! the JSON package format used to move libraries between installations.

pub mod client;
pub mod error;
pub mod package;
pub mod paginator;

pub use client::{CatalogSource, HttpCatalogClient, RemoteLibrary, UploadRequest};
pub use error::CatalogError;
pub use package::{ExportPackage, LibraryExport, PackageWord};
pub use paginator::CatalogPaginator;
