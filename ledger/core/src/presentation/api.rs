// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ledger HTTP API
//!
//! Thin Axum adapter over [`RequestGuard`] and [`SafetyCaseService`]. Every
//! `/api/v1` route runs behind the guard middleware, which lifts the
//! authentication headers, inserts the [`AuthorizedRequest`] into request
//! extensions and renders rejections as the standard error envelope.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/health` | liveness (unguarded) |
//! | POST | `/api/v1/bundles` | create bundle |
//! | GET | `/api/v1/bundles?session_id=` | list caller tenant's bundles |
//! | GET | `/api/v1/bundles/{id}` | fetch bundle |
//! | POST | `/api/v1/bundles/{id}/verify` | re-verify |
//! | GET | `/api/v1/bundles/{id}/export?format=json\|tar` | verified export |
//! | GET | `/api/v1/stats` | caller tenant's aggregate stats |
//!
//! Bundles belonging to another tenant are reported as not found.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::application::bundle_builder::BundleRequest;
use crate::application::request_guard::{AuthorizedRequest, InboundRequest, RequestGuard};
use crate::application::runtime::LedgerRuntime;
use crate::application::safety_case_service::{SafetyCaseError, SafetyCaseService};
use crate::domain::auth::{AuthFailure, ErrorEnvelope};
use crate::domain::safety_case::{BundleId, SafetyCaseBundle};
use crate::infrastructure::export::ExportFormat;

pub const PF_SIGNATURE_HEADER: &str = "x-pf-signature";
pub const ACCESS_RECEIPTS_HEADER: &str = "x-access-receipts";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct ApiState {
    pub service: Arc<SafetyCaseService>,
    pub guard: Arc<RequestGuard>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(service: Arc<SafetyCaseService>, guard: Arc<RequestGuard>) -> Self {
        Self {
            service,
            guard,
            started_at: Instant::now(),
        }
    }

    pub fn from_runtime(runtime: &LedgerRuntime) -> Self {
        Self::new(runtime.service.clone(), runtime.guard.clone())
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    let guarded = Router::new()
        .route("/api/v1/bundles", post(create_bundle).get(list_bundles))
        .route("/api/v1/bundles/{id}", get(get_bundle))
        .route("/api/v1/bundles/{id}/verify", post(verify_bundle))
        .route("/api/v1/bundles/{id}/export", get(export_bundle))
        .route("/api/v1/stats", get(stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_authorization));

    Router::new()
        .route("/health", get(health))
        .merge(guarded)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let request_id = self.request_id.clone();
        let mut response = (status, Json(self)).into_response();
        set_header(&mut response, REQUEST_ID_HEADER, &request_id);
        response
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn set_header(response: &mut Response, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(name), value);
    }
}

async fn require_authorization(
    State(state): State<Arc<ApiState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let inbound = InboundRequest {
        assertion: header_string(headers, PF_SIGNATURE_HEADER),
        receipts: header_string(headers, ACCESS_RECEIPTS_HEADER),
        request_id: header_string(headers, REQUEST_ID_HEADER),
    };

    match state.guard.authorize(inbound) {
        Ok(authorized) => {
            let request_id = authorized.request_id.clone();
            let rate = authorized.rate;
            request.extensions_mut().insert(authorized);

            let mut response = next.run(request).await;
            set_header(&mut response, REQUEST_ID_HEADER, &request_id);
            set_header(&mut response, "x-ratelimit-limit", &rate.limit.to_string());
            set_header(&mut response, "x-ratelimit-remaining", &rate.remaining.to_string());
            set_header(&mut response, "x-ratelimit-reset", &rate.reset_at.timestamp().to_string());
            response
        }
        Err(rejected) => {
            let retry_after = match &rejected.failure {
                AuthFailure::RateLimited(limit) => {
                    Some((limit.reset_at - rejected.rejected_at).num_seconds().max(1))
                }
                _ => None,
            };
            let mut response = rejected.envelope().into_response();
            if let Some(seconds) = retry_after {
                set_header(&mut response, "retry-after", &seconds.to_string());
            }
            response
        }
    }
}

/// Non-authentication failures raised by handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    request_id: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>, request_id: &str) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            request_id: request_id.to_string(),
        }
    }

    fn not_found(request_id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Bundle not found", request_id)
    }

    fn from_service(err: SafetyCaseError, request_id: &str) -> Self {
        match err {
            SafetyCaseError::NotFound(_) => Self::not_found(request_id),
            SafetyCaseError::VerificationFailed { errors, .. } => {
                let mut api = Self::new(
                    StatusCode::CONFLICT,
                    "VERIFICATION_FAILED",
                    "Bundle failed verification",
                    request_id,
                );
                api.details = Some(json!({ "errors": errors }));
                api
            }
            SafetyCaseError::ReceiptRejected(failure) => {
                let status =
                    StatusCode::from_u16(failure.status()).unwrap_or(StatusCode::FORBIDDEN);
                let mut api = Self::new(status, failure.code().as_str(), failure.public_message(), request_id);
                api.details = failure.details();
                api
            }
            other => {
                error!(request_id, error = %other, "Ledger operation failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error",
                    request_id,
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": { "code": self.code, "message": self.message },
            "timestamp": Utc::now(),
            "request_id": self.request_id,
        });
        if let Some(details) = self.details {
            body["error"]["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

async fn health(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Load a bundle, hiding those owned by other tenants.
async fn load_owned(
    state: &ApiState,
    raw_id: &str,
    auth: &AuthorizedRequest,
) -> Result<SafetyCaseBundle, ApiError> {
    let id = BundleId::parse_str(raw_id).map_err(|_| ApiError::not_found(&auth.request_id))?;
    let bundle = state
        .service
        .get(id)
        .await
        .map_err(|e| ApiError::from_service(e, &auth.request_id))?;
    if bundle.tenant != auth.principal.tenant {
        return Err(ApiError::not_found(&auth.request_id));
    }
    Ok(bundle)
}

async fn create_bundle(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthorizedRequest>,
    Json(request): Json<BundleRequest>,
) -> Result<(StatusCode, Json<SafetyCaseBundle>), ApiError> {
    if request.tenant != auth.principal.tenant {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "TENANT_MISMATCH",
            "Bundle tenant does not match capability tenant",
            &auth.request_id,
        ));
    }
    let bundle = state
        .service
        .create(request)
        .await
        .map_err(|e| ApiError::from_service(e, &auth.request_id))?;
    Ok((StatusCode::CREATED, Json(bundle)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    session_id: Option<String>,
}

async fn list_bundles(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthorizedRequest>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SafetyCaseBundle>>, ApiError> {
    let tenant = &auth.principal.tenant;
    let bundles = match query.session_id.as_deref() {
        Some(session_id) => state.service.list_by_session(session_id).await,
        None => state.service.list_by_tenant(tenant).await,
    }
    .map_err(|e| ApiError::from_service(e, &auth.request_id))?;

    Ok(Json(bundles.into_iter().filter(|b| &b.tenant == tenant).collect()))
}

async fn get_bundle(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthorizedRequest>,
    Path(id): Path<String>,
) -> Result<Json<SafetyCaseBundle>, ApiError> {
    Ok(Json(load_owned(&state, &id, &auth).await?))
}

async fn verify_bundle(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthorizedRequest>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let bundle = load_owned(&state, &id, &auth).await?;
    let report = state
        .service
        .verify(bundle.id)
        .await
        .map_err(|e| ApiError::from_service(e, &auth.request_id))?;
    Ok(Json(report).into_response())
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

async fn export_bundle(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthorizedRequest>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = match query.format.as_deref() {
        Some(raw) => raw.parse::<ExportFormat>().map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST, "INVALID_FORMAT", e.to_string(), &auth.request_id)
        })?,
        None => ExportFormat::default(),
    };
    let bundle = load_owned(&state, &id, &auth).await?;
    let bytes = state
        .service
        .export(bundle.id, format)
        .await
        .map_err(|e| ApiError::from_service(e, &auth.request_id))?;

    let disposition = format!(
        "attachment; filename=\"safety-case-{}.{}\"",
        bundle.id,
        format.file_extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn stats(
    State(state): State<Arc<ApiState>>,
    Extension(auth): Extension<AuthorizedRequest>,
) -> Result<Response, ApiError> {
    let stats = state
        .service
        .tenant_stats_at(&auth.principal.tenant, Utc::now())
        .await
        .map_err(|e| ApiError::from_service(e, &auth.request_id))?;
    Ok(Json(stats).into_response())
}
