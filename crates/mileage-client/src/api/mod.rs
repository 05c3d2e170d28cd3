//! REST endpoint bindings.
//!
//! Each front-end talks to the API through a trait ([`AdminApi`],
//! [`MemberApi`]) implemented for [`ApiClient`](crate::http::ApiClient), so
//! stores and mutations can be exercised against in-memory fakes.

mod admin;
mod member;

pub use admin::{AdminApi, AdminLedgerFilters, AccrualRequestFilters};
pub use member::{ApiVersion, MemberApi, MemberLedgerFilters, MemberRequestFilters};

use crate::http::QueryPairs;

/// Filters that become query-string parameters. Excludes paging.
pub trait QueryParams: Clone + PartialEq + Send + Sync + 'static {
    fn query_pairs(&self) -> QueryPairs;
}

impl QueryParams for () {
    fn query_pairs(&self) -> QueryPairs {
        QueryPairs::new()
    }
}

/// 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const fn first(size: u32) -> Self {
        Self { page: 1, size }
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            page: self.page + 1,
            size: self.size,
        }
    }

    pub(crate) fn push_to(self, query: &mut QueryPairs) {
        query.push(("page", self.page.to_string()));
        query.push(("size", self.size.to_string()));
    }
}
