//! HTTP handlers for the ticket, stats, chat, and health routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use chgd_core::chat::{ChatRequest, ChatResponse};
use chgd_core::query::{DashboardStats, TicketPage};
use chgd_core::ticket::ChangeTicket;
use chgd_engine::query::{parse_filters, parse_sort};
use chgd_engine::EngineError;

use crate::server::AppState;

/// JSON error body: `{error, message}` with a machine-readable error code.
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "invalid_request",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.error,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                error: "not_found",
                message,
            },
            EngineError::InvalidFilter(message) => Self {
                status: StatusCode::BAD_REQUEST,
                error: "invalid_filter",
                message,
            },
            EngineError::Store(e) => {
                warn!(error = %e, "store error while handling request");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: "internal",
                    message: "internal storage error".to_string(),
                }
            }
        }
    }
}

/// Query string for `GET /tickets`. All fields optional; unknown spellings
/// are rejected with `invalid_filter` rather than silently ignored.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    status: Option<String>,
    priority: Option<String>,
    compliance: Option<String>,
    assignee: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    page: Option<usize>,
    #[serde(rename = "pageSize", alias = "page_size")]
    page_size: Option<usize>,
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<TicketPage>, ApiError> {
    let filters = parse_filters(
        params.status.as_deref(),
        params.priority.as_deref(),
        params.compliance.as_deref(),
        params.assignee.as_deref(),
    )?;
    let (sort_by, sort_order) = parse_sort(
        params.sort_by.as_deref(),
        params.sort_order.as_deref(),
    )?;

    let page = state.query.list(
        &filters,
        sort_by,
        sort_order,
        params.page.unwrap_or(1),
        params.page_size.unwrap_or(chgd_engine::query::DEFAULT_PAGE_SIZE),
    )?;
    Ok(Json(page))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChangeTicket>, ApiError> {
    let ticket = state.query.get(&id)?;
    Ok(Json(ticket))
}

pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, ApiError> {
    let stats = state.stats.compute()?;
    Ok(Json(stats))
}

/// Generation failures never surface as 5xx: the bridge's fallback text
/// rides a 200 instead.
pub async fn chat(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let response = state.bridge.respond(&request).await;
    Ok(Json(ChatResponse { response }))
}

pub async fn health(State(state): State<AppState>) -> Response {
    let probe = state.db.with_conn(|conn| {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| chgd_store::StoreError::Database(e.to_string()))
    });

    match probe {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "healthy"}))).into_response(),
        Err(e) => {
            warn!(error = %e, "health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unhealthy"})),
            )
                .into_response()
        }
    }
}
