//! Catalog endpoints.

use tidecast_net::{CachePolicy, RequestDescriptor, RequestExecutor, Result};

use crate::models::{HomeSectionsResponse, SearchResults};

const HOME_SECTIONS: &str = "/home_sections";
const SEARCH: &str = "/search";

/// Typed access to the catalog API.
///
/// Cloning is cheap; clones share the executor and its in-flight registry.
#[derive(Clone)]
pub struct CatalogService {
    executor: RequestExecutor,
}

impl CatalogService {
    /// Create a service on top of an executor.
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// The underlying executor.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Fetch one page of home sections. Pages start at 1; 0 is read as 1.
    pub async fn home_sections(&self, page: u32) -> Result<HomeSectionsResponse> {
        let page = page.max(1);
        tracing::debug!(target: "tidecast_catalog", page, "loading home sections");

        let descriptor = RequestDescriptor::get(HOME_SECTIONS)
            .with_param("page", page)
            .with_cache_policy(CachePolicy::Automatic);
        self.executor.execute(&descriptor).await
    }

    /// Search the catalog.
    ///
    /// The query is trimmed first. A blank query returns
    /// [`SearchResults::empty`] without a request.
    pub async fn search(&self, query: &str, page: u32) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::empty());
        }
        tracing::debug!(target: "tidecast_catalog", query, page, "searching");

        let descriptor = RequestDescriptor::get(SEARCH)
            .with_param("q", query)
            .with_param("page", page.max(1))
            .with_cache_policy(CachePolicy::MemoryOnly);
        self.executor.execute(&descriptor).await
    }

    /// Cancel every request in flight on the shared executor.
    pub fn cancel_all(&self) -> usize {
        self.executor.cancel_all()
    }
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("base_url", &self.executor.config().base_url)
            .finish_non_exhaustive()
    }
}
