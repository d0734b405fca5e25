//! Incremental catalog browsing
//!
//! Each [`CatalogPaginator::fetch_page`] call walks forward from the cursor,
//! filtering pages locally, until it has a batch, hits the per-call fetch
//! cap, or runs out of pages. Unreadable pages are skipped.

use std::sync::Arc;

use mw_common::config::CatalogConfig;

use crate::client::{CatalogSource, RemoteLibrary};
use crate::error::CatalogError;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_PAGES_PER_CALL: usize = 5;

pub struct CatalogPaginator {
    source: Arc<dyn CatalogSource>,
    cursor: usize,
    page_count: Option<usize>,
    batch_size: usize,
    max_pages_per_call: usize,
}

fn normalized_filter(filter: Option<&str>) -> Option<String> {
    filter
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
}

impl CatalogPaginator {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            cursor: 0,
            page_count: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_pages_per_call: DEFAULT_MAX_PAGES_PER_CALL,
        }
    }

    pub fn with_config(source: Arc<dyn CatalogSource>, config: &CatalogConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_pages_per_call: config.max_pages_per_call.max(1),
            ..Self::new(source)
        }
    }

    /// Next index page to fetch
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Cached page count, once known
    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    /// True once the cursor has passed the last page
    pub fn is_exhausted(&self) -> bool {
        matches!(self.page_count, Some(count) if self.cursor >= count)
    }

    /// Start over from page 0, keeping the cached page count
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    async fn ensure_page_count(&mut self) -> Result<usize, CatalogError> {
        if let Some(count) = self.page_count {
            return Ok(count);
        }
        let count = self.source.fetch_page_count().await?;
        tracing::debug!(pages = count, "Catalog page count");
        self.page_count = Some(count);
        Ok(count)
    }

    /// Fetch the next batch of records matching `query` and `tag`
    ///
    /// Returns an empty list once every page has been read. Matches from the
    /// last page fetched are all returned, so a batch may exceed the target
    /// size. Only a failed page-count lookup is an error.
    pub async fn fetch_page(
        &mut self,
        query: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<RemoteLibrary>, CatalogError> {
        let page_count = self.ensure_page_count().await?;
        let query = normalized_filter(query);
        let tag = normalized_filter(tag);

        let mut results = Vec::new();
        let mut fetched = 0;

        while self.cursor < page_count
            && fetched < self.max_pages_per_call
            && results.len() < self.batch_size
        {
            let page = self.cursor;
            self.cursor += 1;
            fetched += 1;

            match self.source.fetch_index_page(page).await {
                Ok(records) => results.extend(records.into_iter().filter(|record| {
                    query.as_deref().map_or(true, |q| record.matches_query(q))
                        && tag.as_deref().map_or(true, |t| record.has_tag(t))
                })),
                Err(e) => {
                    tracing::warn!(page, error = %e, "Skipping unreadable catalog page");
                }
            }
        }

        tracing::debug!(
            fetched,
            matches = results.len(),
            cursor = self.cursor,
            "Catalog batch fetched"
        );
        Ok(results)
    }
}
