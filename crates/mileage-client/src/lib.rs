//! Mileage API client.
//!
//! - `http`: backend REST client with bearer tokens and one retry on 401
//! - `auth`: identity provider login, renewal and claims
//! - `cache`: request-deduplicating query cache
//! - `store` / `mutation`: review queue partitions and optimistic approve / reject
//! - `pagination`: infinite-scroll lists
//! - `debounce`: debounced search input
//! - `guard`: login / onboarding gating
//! - `api`: endpoint bindings
//! - `media`: direct uploads to the media host

pub mod api;
pub mod auth;
pub mod cache;
pub mod debounce;
pub mod error;
pub mod guard;
pub mod http;
pub mod media;
pub mod mutation;
pub mod pagination;
pub mod store;

pub use cache::{CacheConfig, KeyFilter, QueryCache, QueryKey};
pub use error::{ApiError, ErrorKind};
pub use http::{ApiClient, StaticToken, TokenProvider};
pub use mutation::{Notifier, ReviewError, ReviewMutations, Toast, ToastLevel};
pub use pagination::{InfiniteData, InfiniteList};
pub use store::AccrualStore;
