//! Accrual request store.
//!
//! Holds the two cache partitions the review queue is shown from: the flat
//! paged list (`accrual-requests`) and the infinite-scroll list
//! (`accrual-requests-infinite`). Created once per front-end and passed
//! explicitly; [`AccrualStore::shutdown`] tears it down.
//!
//! The flat partition backs numbered page views (`mileage admin requests
//! --page N`); the infinite partition backs the scrolling queue. Review
//! mutations patch both, and the store tracks which of them are still open.

use std::sync::Arc;

use mileage_core::{AccrualRequest, Page};

use crate::api::{AccrualRequestFilters, AdminApi, PageRequest, QueryParams};
use crate::cache::{CacheConfig, KeyFilter, QueryCache, QueryKey, fetcher};
use crate::error::ApiError;
use crate::mutation::OpenTransactions;
use crate::pagination::{ADMIN_PAGE_SIZE, InfiniteData, InfiniteList, page_loader};

pub const FLAT_SCOPE: &str = "accrual-requests";
pub const INFINITE_SCOPE: &str = "accrual-requests-infinite";

pub type AccrualList = InfiniteList<AccrualRequest, AccrualRequestFilters>;

#[derive(Clone)]
pub struct AccrualStore {
    api: Arc<dyn AdminApi>,
    flat: QueryCache<Page<AccrualRequest>>,
    infinite: QueryCache<InfiniteData<AccrualRequest>>,
    transactions: Arc<OpenTransactions>,
}

impl AccrualStore {
    pub fn new(api: Arc<dyn AdminApi>, config: CacheConfig) -> Self {
        Self {
            api,
            flat: QueryCache::new(config),
            infinite: QueryCache::new(config),
            transactions: Arc::new(OpenTransactions::default()),
        }
    }

    pub fn api(&self) -> Arc<dyn AdminApi> {
        Arc::clone(&self.api)
    }

    pub const fn flat(&self) -> &QueryCache<Page<AccrualRequest>> {
        &self.flat
    }

    pub const fn infinite(&self) -> &QueryCache<InfiniteData<AccrualRequest>> {
        &self.infinite
    }

    /// Review mutations that have not settled yet.
    pub fn transactions(&self) -> &OpenTransactions {
        &self.transactions
    }

    pub fn flat_key(filters: &AccrualRequestFilters, page: PageRequest) -> QueryKey {
        QueryKey::new(FLAT_SCOPE)
            .params(filters.query_pairs())
            .param("page", page.page)
            .param("size", page.size)
    }

    /// One page of the review queue, through the flat partition.
    pub async fn list(
        &self,
        filters: &AccrualRequestFilters,
        page: PageRequest,
    ) -> Result<Page<AccrualRequest>, ApiError> {
        let api = self.api();
        let owned = filters.clone();
        let fetch = fetcher(move |_prev| {
            let api = Arc::clone(&api);
            let filters = owned.clone();
            async move { api.list_accrual_requests(&filters, page).await }
        });
        self.flat.fetch(Self::flat_key(filters, page), fetch).await
    }

    /// Infinite-scroll view of the review queue (20 per page).
    pub fn infinite_list(&self, filters: AccrualRequestFilters) -> AccrualList {
        let api = self.api();
        let loader = page_loader(move |filters: AccrualRequestFilters, page| {
            let api = Arc::clone(&api);
            async move { api.list_accrual_requests(&filters, page).await }
        });
        InfiniteList::new(
            self.infinite.clone(),
            INFINITE_SCOPE,
            ADMIN_PAGE_SIZE,
            loader,
            filters,
        )
    }

    /// Mark both partitions stale and refetch what they hold.
    pub async fn invalidate(&self) {
        self.flat.invalidate(&KeyFilter::scope(FLAT_SCOPE)).await;
        self.infinite.invalidate(&KeyFilter::scope(INFINITE_SCOPE)).await;
    }

    /// Both partitions' refetches have settled.
    pub async fn settled(&self) {
        self.flat.settled(&KeyFilter::scope(FLAT_SCOPE)).await;
        self.infinite.settled(&KeyFilter::scope(INFINITE_SCOPE)).await;
    }

    pub async fn shutdown(&self) {
        self.flat.shutdown().await;
        self.infinite.shutdown().await;
    }
}
