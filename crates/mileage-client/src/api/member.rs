use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;

use mileage_core::models::{CustomerUpdate, OnboardRequest, ProfileUpdate};
use mileage_core::{AccrualRequest, AccrualRequestForm, MileageLedgerEntry, Page, Profile};

use super::{PageRequest, QueryParams};
use crate::error::ApiError;
use crate::http::{ApiClient, QueryPairs, push_opt};

const SUBMIT_ACCRUAL_REQUEST: &str = "/api/v1/accrual-requests/";
const MILES_LEDGERS: &str = "/api/v1/miles-ledgers";
const PROFILE: &str = "/api/v1/profile";
const ONBOARD: &str = "/api/v1/customers/onboard";
const CUSTOMERS: &str = "/api/v1/customers";

/// Both versions of the member request list are live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
}

impl ApiVersion {
    fn accrual_requests_path(self) -> &'static str {
        match self {
            Self::V1 => "/api/v1/accrual-requests",
            Self::V2 => "/api/v2/accrual-requests",
        }
    }
}

/// Member-side endpoints.
#[async_trait]
pub trait MemberApi: Send + Sync {
    async fn list_accrual_requests(
        &self,
        version: ApiVersion,
        filters: &MemberRequestFilters,
        page: PageRequest,
    ) -> Result<Page<AccrualRequest>, ApiError>;

    /// Validates and normalizes the form before sending it.
    async fn submit_accrual_request(
        &self,
        form: &AccrualRequestForm,
    ) -> Result<AccrualRequest, ApiError>;

    async fn list_miles_ledgers(
        &self,
        filters: &MemberLedgerFilters,
        page: PageRequest,
    ) -> Result<Page<MileageLedgerEntry>, ApiError>;

    async fn profile(&self) -> Result<Profile, ApiError>;

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError>;

    async fn onboard(&self, request: &OnboardRequest) -> Result<Profile, ApiError>;

    async fn update_customer(&self, update: &CustomerUpdate) -> Result<Profile, ApiError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MemberRequestFilters {
    pub keyword: Option<String>,
}

impl QueryParams for MemberRequestFilters {
    fn query_pairs(&self) -> QueryPairs {
        let mut q = QueryPairs::new();
        push_opt(&mut q, "keyword", self.keyword.as_deref());
        q
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MemberLedgerFilters {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub transaction_id: Option<String>,
}

impl QueryParams for MemberLedgerFilters {
    fn query_pairs(&self) -> QueryPairs {
        let mut q = QueryPairs::new();
        push_opt(&mut q, "date_from", self.date_from);
        push_opt(&mut q, "date_to", self.date_to);
        push_opt(&mut q, "transaction_id", self.transaction_id.as_deref());
        q
    }
}

#[async_trait]
impl MemberApi for ApiClient {
    async fn list_accrual_requests(
        &self,
        version: ApiVersion,
        filters: &MemberRequestFilters,
        page: PageRequest,
    ) -> Result<Page<AccrualRequest>, ApiError> {
        let mut query = filters.query_pairs();
        page.push_to(&mut query);
        self.get(version.accrual_requests_path(), &query).await
    }

    async fn submit_accrual_request(
        &self,
        form: &AccrualRequestForm,
    ) -> Result<AccrualRequest, ApiError> {
        let form = form.clone().normalized();
        form.validate()?;
        let created: AccrualRequest = self.post(SUBMIT_ACCRUAL_REQUEST, &form).await?;
        info!(id = %created.id, pnr = %created.pnr, "Accrual request submitted");
        Ok(created)
    }

    async fn list_miles_ledgers(
        &self,
        filters: &MemberLedgerFilters,
        page: PageRequest,
    ) -> Result<Page<MileageLedgerEntry>, ApiError> {
        let mut query = filters.query_pairs();
        page.push_to(&mut query);
        self.get(MILES_LEDGERS, &query).await
    }

    async fn profile(&self) -> Result<Profile, ApiError> {
        self.get(PROFILE, &QueryPairs::new()).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        if update.is_empty() {
            return self.profile().await;
        }
        self.patch(PROFILE, update).await
    }

    async fn onboard(&self, request: &OnboardRequest) -> Result<Profile, ApiError> {
        let profile: Profile = self.post(ONBOARD, request).await?;
        info!(id = %profile.id, "Customer onboarded");
        Ok(profile)
    }

    async fn update_customer(&self, update: &CustomerUpdate) -> Result<Profile, ApiError> {
        self.patch(CUSTOMERS, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_selects_path() {
        assert_eq!(
            ApiVersion::V1.accrual_requests_path(),
            "/api/v1/accrual-requests"
        );
        assert_eq!(
            ApiVersion::V2.accrual_requests_path(),
            "/api/v2/accrual-requests"
        );
    }

    #[test]
    fn ledger_filters_format_dates() {
        let filters = MemberLedgerFilters {
            date_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            date_to: None,
            transaction_id: Some(String::new()),
        };
        assert_eq!(
            filters.query_pairs(),
            vec![("date_from", "2024-01-01".to_string())]
        );
    }
}
