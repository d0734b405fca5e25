//! Catalog errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// One index page could not be fetched or parsed; pagination skips it
    #[error("Failed to fetch catalog page {page}: {message}")]
    PagedFetch { page: usize, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Upload rejected: {0}")]
    Upload(String),

    #[error("Catalog base URL is not configured (set catalog.base_url)")]
    NotConfigured,

    #[error("Invalid library package: {0}")]
    Package(String),

    #[error("Storage error: {0}")]
    Storage(#[from] mw_common::Error),
}
