//! Infinite-scroll retrieval.
//!
//! Pages of a list endpoint are accumulated into one [`InfiniteData`] value
//! stored in the query cache under `[scope, filters]`. Invalidating that key
//! refetches every page loaded so far, in order.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use mileage_core::Page;

use crate::api::{PageRequest, QueryParams};
use crate::cache::{BoxFuture, Fetcher, KeyFilter, QueryCache, QueryKey};
use crate::error::ApiError;

/// Page size of every operator list.
pub const ADMIN_PAGE_SIZE: u32 = 20;
/// Page size of the member request tracking list.
pub const MEMBER_TRACKING_PAGE_SIZE: u32 = 5;

pub const LEDGERS_INFINITE_SCOPE: &str = "miles-ledgers-infinite";

type InfiniteFuture<T> = BoxFuture<Result<InfiniteData<T>, ApiError>>;

/// Pages fetched so far for one filter set.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteData<T> {
    pub pages: Vec<Page<T>>,
    pub page_size: u32,
}

impl<T> InfiniteData<T> {
    pub const fn new(page_size: u32) -> Self {
        Self {
            pages: Vec::new(),
            page_size,
        }
    }

    /// Items of every page, in order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|p| p.data.iter())
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.pages.iter_mut().flat_map(|p| p.data.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.data.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total reported by the first page.
    pub fn total(&self) -> u64 {
        self.pages.first().map_or(0, |p| p.total)
    }

    pub fn has_next_page(&self) -> bool {
        let fetched = u64::try_from(self.pages.len()).unwrap_or(u64::MAX);
        fetched.saturating_mul(u64::from(self.page_size)) < self.total()
    }

    /// The request for the page after the last one loaded.
    pub fn next_page(&self) -> PageRequest {
        PageRequest {
            page: u32::try_from(self.pages.len()).unwrap_or(u32::MAX - 1) + 1,
            size: self.page_size,
        }
    }
}

/// Fetches one page for a filter set.
pub type PageLoader<T, F> =
    Arc<dyn Fn(F, PageRequest) -> BoxFuture<Result<Page<T>, ApiError>> + Send + Sync>;

/// Wrap an async closure as a [`PageLoader`].
pub fn page_loader<T, F, L, Fut>(load: L) -> PageLoader<T, F>
where
    L: Fn(F, PageRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, ApiError>> + Send + 'static,
{
    Arc::new(
        move |filters: F, page: PageRequest| -> BoxFuture<Result<Page<T>, ApiError>> {
            Box::pin(load(filters, page))
        },
    )
}

/// One infinite-scroll list bound to a filter set.
pub struct InfiniteList<T, F> {
    cache: QueryCache<InfiniteData<T>>,
    scope: String,
    page_size: u32,
    loader: PageLoader<T, F>,
    filters: F,
}

impl<T, F> InfiniteList<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: QueryParams,
{
    pub fn new(
        cache: QueryCache<InfiniteData<T>>,
        scope: impl Into<String>,
        page_size: u32,
        loader: PageLoader<T, F>,
        filters: F,
    ) -> Self {
        Self {
            cache,
            scope: scope.into(),
            page_size,
            loader,
            filters,
        }
    }

    pub const fn filters(&self) -> &F {
        &self.filters
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn key(&self) -> QueryKey {
        QueryKey::new(self.scope.clone()).params(self.filters.query_pairs())
    }

    /// Read through the cache, loading page 1 on first use.
    pub async fn load(&self) -> Result<InfiniteData<T>, ApiError> {
        self.cache.fetch(self.key(), self.refetch_all()).await
    }

    pub async fn data(&self) -> Option<InfiniteData<T>> {
        self.cache.get(&self.key()).await
    }

    pub async fn is_fetching(&self) -> bool {
        self.cache.is_fetching(&self.key()).await
    }

    /// Load the next page. Returns `None` without a request when a fetch is
    /// already running or every page has been loaded.
    pub async fn fetch_next_page(&self) -> Result<Option<InfiniteData<T>>, ApiError> {
        let key = self.key();
        if self.cache.is_fetching(&key).await {
            debug!(%key, "Next page skipped: fetch in progress");
            return Ok(None);
        }
        let Some(current) = self.cache.get(&key).await else {
            return self.load().await.map(Some);
        };
        if !current.has_next_page() {
            return Ok(None);
        }

        let loader = Arc::clone(&self.loader);
        let filters = self.filters.clone();
        let page_size = self.page_size;
        let data = self
            .cache
            .run(
                key,
                Box::new(move |prev: Option<InfiniteData<T>>| -> InfiniteFuture<T> {
                    Box::pin(async move {
                        let mut data = prev.unwrap_or_else(|| InfiniteData::new(page_size));
                        let page = loader(filters, data.next_page()).await?;
                        data.pages.push(page);
                        Ok(data)
                    })
                }),
            )
            .await?;
        Ok(Some(data))
    }

    /// Sentinel visibility callback: fetch the next page when it scrolls into view.
    pub async fn on_sentinel_visible(
        &self,
        visible: bool,
    ) -> Result<Option<InfiniteData<T>>, ApiError> {
        if !visible {
            return Ok(None);
        }
        self.fetch_next_page().await
    }

    /// Switch filters. The list restarts at page 1; nothing from the previous
    /// filter set is carried over, and the entry it leaves is dropped.
    pub async fn set_filters(&mut self, filters: F) -> Result<InfiniteData<T>, ApiError> {
        if filters == self.filters {
            return self.load().await;
        }
        let previous = self.key();
        self.filters = filters;
        let removed = self
            .cache
            .remove(&KeyFilter::Exact(previous))
            .await
            + self.cache.remove(&KeyFilter::Exact(self.key())).await;
        debug!(key = %self.key(), removed, "Filters changed, list reset");
        self.load().await
    }

    /// Fetcher registered with the cache: page 1 on first load, otherwise
    /// every page already loaded.
    fn refetch_all(&self) -> Fetcher<InfiniteData<T>> {
        let loader = Arc::clone(&self.loader);
        let filters = self.filters.clone();
        let page_size = self.page_size;
        Arc::new(move |prev: Option<InfiniteData<T>>| -> InfiniteFuture<T> {
            let loader = Arc::clone(&loader);
            let filters = filters.clone();
            Box::pin(async move {
                let loaded = prev.map_or(1, |p| p.pages.len().max(1));
                let mut data = InfiniteData::new(page_size);
                let mut request = PageRequest::first(page_size);
                for _ in 0..loaded {
                    let page = loader(filters.clone(), request).await?;
                    data.pages.push(page);
                    if !data.has_next_page() {
                        break;
                    }
                    request = request.next();
                }
                Ok(data)
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn data(pages: usize, size: u32, total: u64) -> InfiniteData<u32> {
        InfiniteData {
            pages: (0..pages)
                .map(|_| Page {
                    data: vec![0; size as usize],
                    total,
                })
                .collect(),
            page_size: size,
        }
    }

    #[test]
    fn has_next_page_boundaries() {
        let size = ADMIN_PAGE_SIZE;
        let total = u64::from(size);
        assert!(!data(1, size, 0).has_next_page());
        assert!(!data(1, size, 1).has_next_page());
        assert!(!data(1, size, total).has_next_page());
        assert!(data(1, size, total + 1).has_next_page());
        assert!(!data(2, size, total + 1).has_next_page());
        assert!(data(1, size, total * 3).has_next_page());
        assert!(!data(3, size, total * 3).has_next_page());
    }

    #[test]
    fn empty_data_has_no_total() {
        let empty = InfiniteData::<u32>::new(MEMBER_TRACKING_PAGE_SIZE);
        assert_eq!(empty.total(), 0);
        assert!(empty.is_empty());
        assert!(!empty.has_next_page());
        assert_eq!(empty.next_page(), PageRequest::first(MEMBER_TRACKING_PAGE_SIZE));
    }
}
