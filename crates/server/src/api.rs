//! JSON API for request routing and SLA administration.
//!
//! Every endpoint identifies its caller through the `x-actor-id` header. A
//! single request and its audit trail are only readable by its submitter, its
//! current handler and administrators.
//!
//! - `POST  /api/v1/requests`                : submit a request
//! - `GET   /api/v1/requests`                : list requests visible to the caller
//! - `GET   /api/v1/requests/summary`        : per-status counts of visible requests
//! - `GET   /api/v1/requests/{id}`           : fetch one request
//! - `PATCH /api/v1/requests/{id}`           : edit a pending request
//! - `POST  /api/v1/requests/{id}/decision`  : approve or reject
//! - `GET   /api/v1/requests/{id}/audit`     : audit trail
//! - `GET   /api/v1/handlers`                : users a request can be targeted at
//! - `GET   /api/v1/config/sla`              : effective SLA minutes
//! - `PUT   /api/v1/config/sla`              : change the SLA (administrators)
//! - `POST  /api/v1/sla/sweep`               : run an SLA sweep now (administrators)

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use handoff_core::audit::AuditEntry;
use handoff_core::domain::request::{
    Decision, Page, Request, RequestDraft, RequestId, RequestPatch, RequestView, StatusSummary,
};
use handoff_core::domain::user::{User, UserId};
use handoff_core::errors::{InterfaceError, WorkflowError};
use handoff_core::service::RequestService;
use handoff_core::sla::{SlaMonitor, SweepOutcome, SweepReport};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    service: RequestService,
    monitor: Arc<SlaMonitor>,
}

impl ApiState {
    pub fn new(service: RequestService, monitor: Arc<SlaMonitor>) -> Self {
        Self { service, monitor }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/requests", post(create_request).get(list_requests))
        .route("/api/v1/requests/summary", get(request_summary))
        .route("/api/v1/requests/{id}", get(get_request).patch(edit_request))
        .route("/api/v1/requests/{id}/decision", post(decide_request))
        .route("/api/v1/requests/{id}/audit", get(audit_trail))
        .route("/api/v1/handlers", get(list_handlers))
        .route("/api/v1/config/sla", get(get_sla).put(set_sla))
        .route("/api/v1/sla/sweep", post(run_sla_sweep))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub status: Decision,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SlaSetting {
    pub minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub skipped: bool,
    pub report: Option<SweepReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

/// Failure returned by every handler; renders as [`ErrorBody`].
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status =
            StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(
                event_name = "api.request.failed",
                correlation_id = %error.correlation_id(),
                error_kind = error.kind(),
                error = %error,
                "request failed"
            );
        }

        let body = ErrorBody {
            error: error.kind(),
            message: error.user_message(),
            detail: error.message().to_string(),
            correlation_id: error.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Caller identity plus the correlation id used for logs and error bodies.
struct CallContext {
    actor_id: UserId,
    correlation_id: String,
}

impl CallContext {
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let correlation_id = headers
            .get(CORRELATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let actor_id = headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .map(UserId)
            .ok_or_else(|| {
                ApiError(InterfaceError::BadRequest {
                    kind: "missing_actor",
                    message: format!("header `{ACTOR_HEADER}` must carry a numeric user id"),
                    correlation_id: correlation_id.clone(),
                })
            })?;

        Ok(Self { actor_id, correlation_id })
    }

    fn fail(&self, error: WorkflowError) -> ApiError {
        ApiError(error.into_interface(self.correlation_id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(draft): Json<RequestDraft>,
) -> Result<(StatusCode, Json<Request>), ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let request =
        state.service.create_request(call.actor_id, draft).await.map_err(|e| call.fail(e))?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RequestView>>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let page = Page::new(query.skip, query.limit);
    let views =
        state.service.list_requests_for_user(call.actor_id, page).await.map_err(|e| call.fail(e))?;
    Ok(Json(views))
}

async fn request_summary(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<StatusSummary>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let summary = state.service.status_summary(call.actor_id).await.map_err(|e| call.fail(e))?;
    Ok(Json(summary))
}

async fn get_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Request>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let request =
        state.service.request(call.actor_id, RequestId(id)).await.map_err(|e| call.fail(e))?;
    Ok(Json(request))
}

async fn edit_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<RequestPatch>,
) -> Result<Json<Request>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let request = state
        .service
        .edit_request(RequestId(id), call.actor_id, patch)
        .await
        .map_err(|e| call.fail(e))?;
    Ok(Json(request))
}

async fn decide_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<Request>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let request = state
        .service
        .decide_request(RequestId(id), call.actor_id, body.status, body.reason)
        .await
        .map_err(|e| call.fail(e))?;
    Ok(Json(request))
}

async fn audit_trail(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let entries =
        state.service.audit_trail(call.actor_id, RequestId(id)).await.map_err(|e| call.fail(e))?;
    Ok(Json(entries))
}

async fn list_handlers(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let handlers = state.service.handlers(call.actor_id).await.map_err(|e| call.fail(e))?;
    Ok(Json(handlers))
}

async fn get_sla(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SlaSetting>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let minutes = state.service.sla_minutes().await.map_err(|e| call.fail(e))?;
    Ok(Json(SlaSetting { minutes }))
}

async fn set_sla(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SlaSetting>,
) -> Result<Json<SlaSetting>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let minutes =
        state.service.set_sla_minutes(call.actor_id, body.minutes).await.map_err(|e| call.fail(e))?;
    Ok(Json(SlaSetting { minutes }))
}

async fn run_sla_sweep(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, ApiError> {
    let call = CallContext::from_headers(&headers)?;
    let actor = state.service.user(call.actor_id).await.map_err(|e| call.fail(e))?;
    if !actor.is_administrator() {
        return Err(call.fail(WorkflowError::NotAuthorized {
            actor_id: actor.id,
            action: "run an SLA sweep".to_string(),
        }));
    }

    let outcome = state.monitor.run().await.map_err(|e| call.fail(e))?;
    info!(
        event_name = "sla.sweep.manual",
        correlation_id = %call.correlation_id,
        actor_id = %actor.id,
        skipped = matches!(outcome, SweepOutcome::Skipped),
        "manual SLA sweep requested"
    );

    Ok(Json(match outcome {
        SweepOutcome::Completed(report) => SweepResponse { skipped: false, report: Some(report) },
        SweepOutcome::Skipped => SweepResponse { skipped: true, report: None },
    }))
}
