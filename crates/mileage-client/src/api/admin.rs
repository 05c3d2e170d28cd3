use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use mileage_core::{AccrualRequest, AccrualStatus, EntityId, MileageLedgerEntry, Page};

use super::{PageRequest, QueryParams};
use crate::error::ApiError;
use crate::http::{ApiClient, QueryPairs, push_opt};

const ACCRUAL_REQUESTS: &str = "/api/v1/admin/accrual-requests";
const MILES_LEDGERS: &str = "/api/v1/admin/miles-ledgers";

/// Operator-side endpoints.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_accrual_requests(
        &self,
        filters: &AccrualRequestFilters,
        page: PageRequest,
    ) -> Result<Page<AccrualRequest>, ApiError>;

    async fn approve_accrual_request(&self, id: &EntityId) -> Result<(), ApiError>;

    async fn reject_accrual_request(&self, id: &EntityId, reason: &str) -> Result<(), ApiError>;

    async fn list_miles_ledgers(
        &self,
        filters: &AdminLedgerFilters,
        page: PageRequest,
    ) -> Result<Page<MileageLedgerEntry>, ApiError>;
}

/// Review queue filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AccrualRequestFilters {
    pub keyword: Option<String>,
    pub status: Option<AccrualStatus>,
    pub submitted_date: Option<NaiveDate>,
}

impl QueryParams for AccrualRequestFilters {
    fn query_pairs(&self) -> QueryPairs {
        let mut q = QueryPairs::new();
        push_opt(&mut q, "keyword", self.keyword.as_deref());
        push_opt(&mut q, "status", self.status);
        push_opt(&mut q, "submitted_date", self.submitted_date);
        q
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AdminLedgerFilters {
    pub customer_id: Option<EntityId>,
    pub accrual_request_id: Option<EntityId>,
}

impl QueryParams for AdminLedgerFilters {
    fn query_pairs(&self) -> QueryPairs {
        let mut q = QueryPairs::new();
        push_opt(&mut q, "customer_id", self.customer_id.as_ref());
        push_opt(&mut q, "accrual_request_id", self.accrual_request_id.as_ref());
        q
    }
}

#[async_trait]
impl AdminApi for ApiClient {
    async fn list_accrual_requests(
        &self,
        filters: &AccrualRequestFilters,
        page: PageRequest,
    ) -> Result<Page<AccrualRequest>, ApiError> {
        let mut query = filters.query_pairs();
        page.push_to(&mut query);
        self.get(ACCRUAL_REQUESTS, &query).await
    }

    async fn approve_accrual_request(&self, id: &EntityId) -> Result<(), ApiError> {
        self.patch_no_content(&format!("{ACCRUAL_REQUESTS}/{id}/approve"), None)
            .await?;
        info!(%id, "Accrual request approved");
        Ok(())
    }

    async fn reject_accrual_request(&self, id: &EntityId, reason: &str) -> Result<(), ApiError> {
        self.patch_no_content(
            &format!("{ACCRUAL_REQUESTS}/{id}/reject"),
            Some(json!({ "rejected_reason": reason })),
        )
        .await?;
        info!(%id, "Accrual request rejected");
        Ok(())
    }

    async fn list_miles_ledgers(
        &self,
        filters: &AdminLedgerFilters,
        page: PageRequest,
    ) -> Result<Page<MileageLedgerEntry>, ApiError> {
        let mut query = filters.query_pairs();
        page.push_to(&mut query);
        self.get(MILES_LEDGERS, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_filters_skip_empty_values() {
        let filters = AccrualRequestFilters {
            keyword: Some(" ABC123 ".into()),
            status: Some(AccrualStatus::InProgress),
            submitted_date: None,
        };
        assert_eq!(
            filters.query_pairs(),
            vec![
                ("keyword", "ABC123".to_string()),
                ("status", "inprogress".to_string()),
            ]
        );
        assert!(AccrualRequestFilters::default().query_pairs().is_empty());
    }

    #[test]
    fn page_request_is_appended_last() {
        let mut q = AdminLedgerFilters {
            customer_id: Some(EntityId::from(42_u64)),
            accrual_request_id: None,
        }
        .query_pairs();
        PageRequest::first(20).next().push_to(&mut q);
        assert_eq!(
            q,
            vec![
                ("customer_id", "42".to_string()),
                ("page", "2".to_string()),
                ("size", "20".to_string()),
            ]
        );
    }
}
