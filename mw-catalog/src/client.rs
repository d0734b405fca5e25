//! Shared-library catalog client
//!
//! The catalog is a static file tree behind a small proxy:
//!
//! - `GET  {base}/library/file/num.json` → page count
//! - `GET  {base}/library/file/index_{n}.json` → one page of library records (0-based)
//! - `GET  {base}/library/file/{id}/library.json` → the library package
//! - `POST {base}/library/upload` with `{name, description, contentBase64, tags}`

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use mw_common::config::CatalogConfig;

use crate::error::CatalogError;
use crate::package::ExportPackage;

const USER_AGENT: &str = concat!("magicword/", env!("CARGO_PKG_VERSION"));

/// One catalog record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLibrary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Epoch ms of the upload
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub author: Option<String>,
    /// Explicit package location; defaults to the file tree layout
    #[serde(default)]
    pub download_url: Option<String>,
}

impl RemoteLibrary {
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.trim().to_lowercase();
        self.tags.iter().any(|t| t.trim().to_lowercase() == wanted)
    }

    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        self.name.to_lowercase().contains(&query) || self.description.to_lowercase().contains(&query)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// Paged read access to the catalog index
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Records on index page `page` (0-based)
    async fn fetch_index_page(&self, page: usize) -> Result<Vec<RemoteLibrary>, CatalogError>;

    /// Number of index pages
    async fn fetch_page_count(&self) -> Result<usize, CatalogError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub name: String,
    pub description: String,
    pub content_base64: String,
    pub tags: Vec<String>,
}

impl UploadRequest {
    pub fn from_package(
        package: &ExportPackage,
        name: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
    ) -> Result<Self, CatalogError> {
        Ok(Self {
            name: name.into(),
            description: description.into(),
            content_base64: package.to_base64()?,
            tags: tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "string_or_number")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(id)| id))
}

/// `num.json` is either a bare integer or `{"count": n}`
fn parse_page_count(raw: &str) -> Result<usize, CatalogError> {
    let value: serde_json::Value =
        serde_json::from_str(raw.trim()).map_err(|e| CatalogError::Parse(e.to_string()))?;
    value
        .as_u64()
        .or_else(|| value.get("count").and_then(serde_json::Value::as_u64))
        .map(|n| n as usize)
        .ok_or_else(|| CatalogError::Parse(format!("unexpected page count: {}", value)))
}

pub struct HttpCatalogClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    /// Requires `catalog.base_url`
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(CatalogError::NotConfigured)?
            .trim_end_matches('/')
            .to_string();

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self { http_client, base_url })
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/library/file/{}", self.base_url, path)
    }

    async fn get_text(&self, url: &str) -> Result<String, CatalogError> {
        tracing::debug!(url, "Catalog GET");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api(status.as_u16(), error_text));
        }

        response
            .text()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))
    }

    /// Fetch and parse the package of one catalog record
    pub async fn download(&self, library: &RemoteLibrary) -> Result<ExportPackage, CatalogError> {
        let url = library
            .download_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.file_url(&format!("{}/library.json", library.id)));
        let body = self.get_text(&url).await?;
        ExportPackage::from_json(&body)
    }

    /// Publish a package; returns the catalog id assigned to it
    pub async fn upload(&self, request: &UploadRequest) -> Result<String, CatalogError> {
        let url = format!("{}/library/upload", self.base_url);
        tracing::info!(name = %request.name, tags = ?request.tags, "Uploading library");

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<UploadResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(UploadResponse { success: true, id: Some(id), .. }) if status.is_success() => Ok(id),
            Some(UploadResponse { error: Some(error), .. }) => Err(CatalogError::Upload(error)),
            _ if !status.is_success() => Err(CatalogError::Api(status.as_u16(), body)),
            _ => Err(CatalogError::Parse(format!("unexpected upload response: {}", body))),
        }
    }

    /// Look a record up by id, scanning every index page
    pub async fn find(&self, id: &str) -> Result<Option<RemoteLibrary>, CatalogError> {
        let pages = self.fetch_page_count().await?;
        for page in 0..pages {
            match self.fetch_index_page(page).await {
                Ok(records) => {
                    if let Some(found) = records.into_iter().find(|r| r.id == id) {
                        return Ok(Some(found));
                    }
                }
                Err(e) => tracing::warn!(page, error = %e, "Skipping unreadable catalog page"),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogClient {
    async fn fetch_index_page(&self, page: usize) -> Result<Vec<RemoteLibrary>, CatalogError> {
        let body = self
            .get_text(&self.file_url(&format!("index_{}.json", page)))
            .await
            .map_err(|e| CatalogError::PagedFetch { page, message: e.to_string() })?;
        serde_json::from_str(&body)
            .map_err(|e| CatalogError::PagedFetch { page, message: e.to_string() })
    }

    async fn fetch_page_count(&self) -> Result<usize, CatalogError> {
        let body = self.get_text(&self.file_url("num.json")).await?;
        parse_page_count(&body)
    }
}
