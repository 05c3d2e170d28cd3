//! Shared fixtures: an in-memory review backend and a recording toast sink.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::Notify;

use mileage_client::api::{AccrualRequestFilters, AdminApi, AdminLedgerFilters, PageRequest};
use mileage_client::mutation::{Notifier, Toast, ToastLevel};
use mileage_client::{ApiError, ErrorKind};
use mileage_core::{AccrualRequest, AccrualStatus, EntityId, MileageLedgerEntry, Page};

pub const TARGET_ID: &str = "245241133272138248";
pub const SERVER_REVIEWER: &str = "ops@mileage.test";

pub fn request(id: &str, pnr: &str, status: AccrualStatus) -> AccrualRequest {
    AccrualRequest {
        id: EntityId::parse(id).unwrap(),
        customer_id: Some(EntityId::from(7_u64)),
        ticket_id: format!("738-{id}"),
        pnr: pnr.to_string(),
        carrier: "VN".into(),
        booking_class: "J".into(),
        from_code: "SGN".into(),
        to_code: "HAN".into(),
        departure_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        qualifying_miles: 710,
        bonus_miles: 0,
        qualifying_accrual_rate: 1.0,
        bonus_accrual_rate: 0.0,
        distance: 710,
        ticket_image_url: Some("https://res.cloudinary.com/demo/t.png".into()),
        boarding_pass_url: Some("https://res.cloudinary.com/demo/b.png".into()),
        status,
        reviewed_by: None,
        reviewed_at: None,
        rejected_reason: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
        updated_at: None,
    }
}

/// `count` pending requests with ids 1..=count.
pub fn queue(count: u64) -> Vec<AccrualRequest> {
    (1..=count)
        .map(|i| request(&i.to_string(), &format!("PNR{i:03}"), AccrualStatus::Pending))
        .collect()
}

/// Pauses a call until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// In-memory stand-in for the admin endpoints.
#[derive(Default)]
pub struct FakeAdminApi {
    pub requests: Mutex<Vec<AccrualRequest>>,
    pub fail_reviews: Mutex<Option<ApiError>>,
    pub review_gate: Mutex<Option<Arc<Gate>>>,
    pub list_gate: Mutex<Option<Arc<Gate>>>,
    pub list_calls: AtomicUsize,
    pub approve_calls: AtomicUsize,
    pub reject_reasons: Mutex<Vec<String>>,
}

impl FakeAdminApi {
    pub fn with_requests(requests: Vec<AccrualRequest>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(requests),
            ..Self::default()
        })
    }

    pub fn fail_reviews_with_status(&self, status: u16) {
        *self.fail_reviews.lock().unwrap() = Some(ApiError {
            status: Some(status),
            ..ApiError::new(ErrorKind::Server, "INTERNAL_SERVER_ERROR", "Internal Server Error")
        });
    }

    pub fn hold_reviews(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.review_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn hold_lists(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.list_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn review(
        &self,
        id: &EntityId,
        status: AccrualStatus,
        reason: Option<&str>,
    ) -> Result<(), ApiError> {
        let gate = self.review_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(err) = self.fail_reviews.lock().unwrap().clone() {
            return Err(err);
        }
        let mut requests = self.requests.lock().unwrap();
        let Some(found) = requests.iter_mut().find(|r| r.id == *id) else {
            return Err(ApiError::new(ErrorKind::NotFound, "NOT_FOUND", "Not Found"));
        };
        found.status = status;
        found.reviewed_by = Some(SERVER_REVIEWER.into());
        found.reviewed_at = Some(Utc::now());
        found.rejected_reason = reason.map(str::to_string);
        Ok(())
    }
}

#[async_trait]
impl AdminApi for FakeAdminApi {
    async fn list_accrual_requests(
        &self,
        filters: &AccrualRequestFilters,
        page: PageRequest,
    ) -> Result<Page<AccrualRequest>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let matching: Vec<AccrualRequest> = self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filters.status.is_none_or(|s| r.status == s))
            .filter(|r| {
                filters
                    .keyword
                    .as_deref()
                    .is_none_or(|k| r.pnr.contains(k))
            })
            .cloned()
            .collect();
        let gate = self.list_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let size = page.size as usize;
        let start = (page.page as usize - 1) * size;
        Ok(Page {
            total: matching.len() as u64,
            data: matching.into_iter().skip(start).take(size).collect(),
        })
    }

    async fn approve_accrual_request(&self, id: &EntityId) -> Result<(), ApiError> {
        self.approve_calls.fetch_add(1, Ordering::SeqCst);
        self.review(id, AccrualStatus::Approved, None).await
    }

    async fn reject_accrual_request(&self, id: &EntityId, reason: &str) -> Result<(), ApiError> {
        self.reject_reasons.lock().unwrap().push(reason.to_string());
        self.review(id, AccrualStatus::Rejected, Some(reason)).await
    }

    async fn list_miles_ledgers(
        &self,
        _filters: &AdminLedgerFilters,
        _page: PageRequest,
    ) -> Result<Page<MileageLedgerEntry>, ApiError> {
        Ok(Page::empty())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn count(&self, level: ToastLevel) -> usize {
        self.toasts
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.level == level)
            .count()
    }

    pub fn last(&self) -> Option<Toast> {
        self.toasts.lock().unwrap().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
    }
}
