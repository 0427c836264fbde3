//! HTTP surface over [`ApprovalService`]
//!
//! The caller is identified by the `x-user-id` header; its permission set is
//! loaded once per request. Service calls hit sled, so they run on the
//! blocking pool.
use super::error::{ApprovalError, ValidationError};
use super::history::HistoryEntry;
use super::report::{ProgressReport, ProgressReportDraft};
use super::service::{ApprovalService, ApprovalStats, PageRequest};
use super::store::{Paginated, SledReportStore};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use std::sync::Arc;

pub const USER_HEADER: &str = "x-user-id";

pub type SledApprovalService = ApprovalService<SledReportStore>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SledApprovalService>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApproveRequest {
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RejectRequest {
    // absent reasons fail the length check like empty ones
    pub rejection_reason: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsQuery {
    pub department_id: Option<String>,
}

impl IntoResponse for ApprovalError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

fn caller(headers: &HeaderMap) -> Result<String, ApprovalError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApprovalError::Unauthenticated(format!("missing {USER_HEADER} header")))
}

/// An empty body reads as the default request.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApprovalError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ValidationError::MalformedBody(err.to_string()).into())
}

async fn run<T, F>(state: AppState, op: F) -> Result<T, ApprovalError>
where
    T: Send + 'static,
    F: FnOnce(&SledApprovalService) -> Result<T, ApprovalError> + Send + 'static,
{
    let service = state.service;
    tokio::task::spawn_blocking(move || op(&service))
        .await
        .map_err(|err| ApprovalError::Internal(format!("request task failed: {err}")))?
}

pub fn router(service: Arc<SledApprovalService>) -> Router {
    Router::new()
        .route("/approvals/pending", get(pending))
        .route("/approvals/stats", get(stats))
        .route("/approvals/:report_id/approve", post(approve))
        .route("/approvals/:report_id/reject", post(reject))
        .route("/approvals/:report_id/submit", post(submit))
        .route("/approvals/:report_id/withdraw", post(withdraw))
        .route("/approvals/:report_id/history", get(history))
        .route("/progress-reports", post(create_report))
        .route(
            "/progress-reports/:report_id",
            get(get_report).delete(delete_report),
        )
        .with_state(AppState { service })
}

async fn approve(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProgressReport>, ApprovalError> {
    let user_id = caller(&headers)?;
    let request: ApproveRequest = parse_body(&body)?;
    let report = run(state, move |service| {
        let actor = service.actor(&user_id)?;
        service.approve(&actor, &report_id, request.comments)
    })
    .await?;
    Ok(Json(report))
}

async fn reject(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProgressReport>, ApprovalError> {
    let user_id = caller(&headers)?;
    let request: RejectRequest = parse_body(&body)?;
    let report = run(state, move |service| {
        let actor = service.actor(&user_id)?;
        service.reject(
            &actor,
            &report_id,
            request.rejection_reason.unwrap_or_default(),
            request.comments,
        )
    })
    .await?;
    Ok(Json(report))
}

async fn submit(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProgressReport>, ApprovalError> {
    let user_id = caller(&headers)?;
    let report = run(state, move |service| {
        service.submit(&service.actor(&user_id)?, &report_id)
    })
    .await?;
    Ok(Json(report))
}

async fn withdraw(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProgressReport>, ApprovalError> {
    let user_id = caller(&headers)?;
    let report = run(state, move |service| {
        service.withdraw(&service.actor(&user_id)?, &report_id)
    })
    .await?;
    Ok(Json(report))
}

async fn history(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<HistoryEntry>>, ApprovalError> {
    let user_id = caller(&headers)?;
    let entries = run(state, move |service| {
        service.history(&service.actor(&user_id)?, &report_id)
    })
    .await?;
    Ok(Json(entries))
}

async fn pending(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
    headers: HeaderMap,
) -> Result<Json<Paginated<ProgressReport>>, ApprovalError> {
    let user_id = caller(&headers)?;
    let reports = run(state, move |service| {
        service.pending(&service.actor(&user_id)?, page)
    })
    .await?;
    Ok(Json(reports))
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
    headers: HeaderMap,
) -> Result<Json<ApprovalStats>, ApprovalError> {
    let user_id = caller(&headers)?;
    let stats = run(state, move |service| {
        let actor = service.actor(&user_id)?;
        service.stats(&actor, query.department_id.as_deref())
    })
    .await?;
    Ok(Json(stats))
}

async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ProgressReport>), ApprovalError> {
    let user_id = caller(&headers)?;
    let draft: ProgressReportDraft = parse_body(&body)?;
    let report = run(state, move |service| {
        service.create_report(&service.actor(&user_id)?, draft)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn get_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProgressReport>, ApprovalError> {
    let user_id = caller(&headers)?;
    let report = run(state, move |service| {
        service.get_report(&service.actor(&user_id)?, &report_id)
    })
    .await?;
    Ok(Json(report))
}

async fn delete_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProgressReport>, ApprovalError> {
    let user_id = caller(&headers)?;
    let report = run(state, move |service| {
        service.delete_report(&service.actor(&user_id)?, &report_id)
    })
    .await?;
    Ok(Json(report))
}
