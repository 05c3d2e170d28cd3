#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! HTTP behaviour against an in-process server: bearer attachment, the single
//! retry after a 401, error normalization and direct media uploads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use mileage_client::api::{AccrualRequestFilters, AdminApi, MemberApi, PageRequest};
use mileage_client::media::{MediaUploader, ResourceType};
use mileage_client::{ApiClient, ApiError, ErrorKind, TokenProvider};
use mileage_core::config::MediaSettings;
use mileage_core::{AccrualStatus, EntityId, Tier};

const FRESH: &str = "fresh-token";
const STALE: &str = "stale-token";

#[derive(Default)]
struct ServerState {
    requests: AtomicUsize,
    /// When set, every request is answered with 401.
    always_unauthorized: bool,
    authorization: Mutex<Vec<Option<String>>>,
    bodies: Mutex<Vec<Value>>,
}

impl ServerState {
    fn record(&self, headers: &HeaderMap) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let expected = format!("Bearer {FRESH}");
        let ok = !self.always_unauthorized && auth.as_deref() == Some(expected.as_str());
        self.authorization.lock().unwrap().push(auth);
        ok
    }
}

type Shared = State<Arc<ServerState>>;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Invalid or expired token"})),
    )
        .into_response()
}

async fn profile(State(state): Shared, headers: HeaderMap) -> Response {
    if !state.record(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": 245_241_133_272_138_248_u64,
        "name": "Lan Nguyen",
        "email": "lan@example.com",
        "phone": "+84901234567",
        "total_qualifying_miles": 12_500,
        "total_bonus_miles": 800,
        "tier": "gold",
        "created_at": "2024-01-01T00:00:00Z"
    }))
    .into_response()
}

async fn list_requests(State(state): Shared, headers: HeaderMap) -> Response {
    if !state.record(&headers) {
        return unauthorized();
    }
    Json(json!({
        "data": [{
            "id": "245241133272138248",
            "ticket_id": "7382412345678",
            "pnr": "AB12CD",
            "carrier": "VN",
            "booking_class": "J",
            "from_code": "SGN",
            "to_code": "HAN",
            "departure_date": "2024-05-01",
            "status": "pending",
            "created_at": "2024-05-02T09:00:00Z"
        }],
        "total": 1
    }))
    .into_response()
}

async fn reject(
    State(state): Shared,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.record(&headers) {
        return unauthorized();
    }
    state.bodies.lock().unwrap().push(body);
    if id == "1" {
        return (
            StatusCode::CONFLICT,
            Json(json!({"code": "REQUEST_NOT_ACTIONABLE", "message": "Request already reviewed"})),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn upload(State(state): Shared, headers: HeaderMap) -> Response {
    let _ = state.record(&headers);
    Json(json!({
        "secure_url": "https://res.cloudinary.com/mileage-demo/image/upload/v1/boarding.png",
        "public_id": "boarding",
        "bytes": 4
    }))
    .into_response()
}

async fn serve(state: Arc<ServerState>) -> SocketAddr {
    let app = Router::new()
        .route("/api/v1/profile", get(profile))
        .route("/api/v1/admin/accrual-requests", get(list_requests))
        .route("/api/v1/admin/accrual-requests/{id}/reject", patch(reject))
        .route("/v1_1/{cloud}/{resource}/upload", post(upload))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Hands out a stale token until asked to refresh.
#[derive(Default)]
struct RotatingToken {
    forced: AtomicUsize,
}

#[async_trait]
impl TokenProvider for RotatingToken {
    async fn access_token(&self, force_refresh: bool) -> Result<String, ApiError> {
        if force_refresh {
            self.forced.fetch_add(1, Ordering::SeqCst);
            return Ok(FRESH.to_string());
        }
        Ok(STALE.to_string())
    }
}

type Setup = (Arc<ServerState>, Arc<RotatingToken>, ApiClient, SocketAddr);

async fn setup(always_unauthorized: bool) -> Setup {
    let state = Arc::new(ServerState {
        always_unauthorized,
        ..ServerState::default()
    });
    let addr = serve(Arc::clone(&state)).await;
    let tokens = Arc::new(RotatingToken::default());
    let client = ApiClient::new(
        &format!("http://{addr}/"),
        Duration::from_secs(5),
        tokens.clone(),
    )
    .unwrap();
    (state, tokens, client, addr)
}

// =============================================================================
// Token attachment and 401 retry
// =============================================================================

#[tokio::test]
async fn unauthorized_then_success_retries_once_with_fresh_token() {
    let (state, tokens, client, _) = setup(false).await;

    let profile = MemberApi::profile(&client).await.unwrap();
    assert_eq!(profile.id, EntityId::parse("245241133272138248").unwrap());
    assert_eq!(profile.tier, Tier::Gold);

    assert_eq!(state.requests.load(Ordering::SeqCst), 2);
    assert_eq!(tokens.forced.load(Ordering::SeqCst), 1);
    let seen = state.authorization.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            Some(format!("Bearer {STALE}")),
            Some(format!("Bearer {FRESH}")),
        ]
    );
}

#[tokio::test]
async fn second_unauthorized_is_surfaced() {
    let (state, tokens, client, _) = setup(true).await;

    let err = MemberApi::profile(&client).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.status, Some(401));
    assert_eq!(err.message, "Invalid or expired token");
    assert_eq!(state.requests.load(Ordering::SeqCst), 2);
    assert_eq!(tokens.forced.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn list_sends_filters_and_decodes_page() {
    let (_state, _tokens, client, _) = setup(false).await;
    let filters = AccrualRequestFilters {
        status: Some(AccrualStatus::Pending),
        ..AccrualRequestFilters::default()
    };
    let page = AdminApi::list_accrual_requests(&client, &filters, PageRequest::first(20))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].id.as_str(), "245241133272138248");
}

// =============================================================================
// Reject body and error normalization
// =============================================================================

#[tokio::test]
async fn reject_sends_reason_body() {
    let (state, _tokens, client, _) = setup(false).await;
    let id = EntityId::parse("245241133272138248").unwrap();
    client
        .reject_accrual_request(&id, "Boarding pass is unreadable")
        .await
        .unwrap();
    let bodies = state.bodies.lock().unwrap().clone();
    assert_eq!(
        bodies.last(),
        Some(&json!({"rejected_reason": "Boarding pass is unreadable"}))
    );
}

#[tokio::test]
async fn conflict_is_normalized() {
    let (_state, _tokens, client, _) = setup(false).await;
    let err = client
        .reject_accrual_request(&EntityId::from(1_u64), "duplicate")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(err.code, "REQUEST_NOT_ACTIONABLE");
    assert_eq!(err.message, "Request already reviewed");
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let client = ApiClient::unauthenticated("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = MemberApi::profile(&client).await.unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Network | ErrorKind::Timeout));
}

// =============================================================================
// Media uploads
// =============================================================================

#[tokio::test]
async fn media_upload_never_carries_backend_token() {
    let (state, _tokens, _client, addr) = setup(false).await;
    let uploader = MediaUploader::with_host(
        &format!("http://{addr}/v1_1"),
        &MediaSettings {
            cloud_name: "mileage-demo".into(),
            upload_preset: "unsigned_docs".into(),
        },
        Duration::from_secs(5),
    )
    .unwrap();

    let uploaded = uploader
        .upload_bytes("boarding.png", b"\x89PNG".to_vec(), ResourceType::Image)
        .await
        .unwrap();
    assert!(uploaded.secure_url.starts_with("https://res.cloudinary.com/"));
    assert_eq!(uploaded.bytes, Some(4));
    assert_eq!(*state.authorization.lock().unwrap(), vec![None]);
}
