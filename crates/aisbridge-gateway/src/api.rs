//! Thin HTTP boundary over the control-plane correlator and the AIS store.
//!
//! Handlers never expose internal failure detail: a control-plane call that
//! errors or times out presents as a generic "operation failed" so callers
//! cannot distinguish a dead controller from a slow one.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use aisbridge_store::{AisRecord, QueryOrder};

use crate::state::AppState;
use crate::ws::ws_handler;

/// The gateway's full route table.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/ais/history", post(ais_history_handler))
        .route("/api/ais/earliest", get(ais_earliest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/health", get(health_handler))
        .route("/api/config/:suffix", get(get_config_handler).post(set_config_handler))
        .with_state(state)
}

/// Compose a controller RPC method name from a verb and a config suffix,
/// e.g. `get` + `AisCfg` → `getAisCfg`.
fn rpc_method(verb: &str, suffix: &str) -> String {
    format!("{verb}{suffix}")
}

/// Row offset of a 1-based page. Saturates so no page/size combination a
/// caller sends can overflow.
fn page_offset(current_page: u64, page_record: u64) -> u64 {
    current_page.saturating_sub(1).saturating_mul(page_record)
}

/// Pages needed to show `total` rows at `page_record` rows per page.
fn total_pages(total: u64, page_record: u64) -> u64 {
    if page_record == 0 {
        return 0;
    }
    total.div_ceil(page_record)
}

fn default_current_page() -> u64 {
    1
}

fn default_page_record() -> u64 {
    20
}

/// Body of a historical AIS query.
#[derive(Debug, Deserialize)]
pub struct AisHistoryQuery {
    /// Range start, epoch milliseconds UTC inclusive.
    pub start_time_ms: i64,
    /// Range end, epoch milliseconds UTC inclusive.
    pub end_time_ms: i64,
    /// 1-based page number.
    #[serde(default = "default_current_page")]
    pub current_page: u64,
    /// Rows per page.
    #[serde(default = "default_page_record")]
    pub page_record: u64,
    /// Sort direction over event time.
    #[serde(default)]
    pub order: Option<QueryOrder>,
}

/// One page of historical AIS rows.
#[derive(Debug, Serialize)]
pub struct AisHistoryPage {
    /// Echoed page number.
    pub current_page: u64,
    /// Echoed page size.
    pub page_record: u64,
    /// Matching rows across the whole range.
    pub total: u64,
    /// Pages needed for `total` at this page size.
    pub total_pages: u64,
    /// The page's rows.
    pub result: Vec<AisRecord>,
}

fn operation_failed() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": "operation failed" })),
    )
        .into_response()
}

async fn ais_history_handler(
    State(state): State<Arc<AppState>>,
    Json(query): Json<AisHistoryQuery>,
) -> Response {
    let store = state.store.clone();
    let order = query.order.unwrap_or(QueryOrder::Desc);
    let offset = page_offset(query.current_page, query.page_record);
    let page = tokio::task::spawn_blocking(move || {
        store.query_range(
            query.start_time_ms,
            query.end_time_ms,
            offset,
            query.page_record,
            order,
        )
    })
    .await;

    match page {
        Ok(Ok(page)) => Json(AisHistoryPage {
            current_page: query.current_page,
            page_record: query.page_record,
            total: page.total,
            total_pages: total_pages(page.total, query.page_record),
            result: page.rows,
        })
        .into_response(),
        Ok(Err(err)) => {
            warn!(error = %err, "ais history query failed");
            operation_failed()
        }
        Err(err) => {
            warn!(error = %err, "ais history task failed");
            operation_failed()
        }
    }
}

async fn ais_earliest_handler(State(state): State<Arc<AppState>>) -> Response {
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.earliest()).await {
        Ok(Ok(earliest)) => Json(json!({ "earliest": earliest })).into_response(),
        Ok(Err(err)) => {
            warn!(error = %err, "earliest-record lookup failed");
            operation_failed()
        }
        Err(err) => {
            warn!(error = %err, "earliest-record task failed");
            operation_failed()
        }
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({ "status": state.status.latest() })).into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    if state.bus.ping().await {
        Json(json!({ "redis": "up", "clients": state.registry.len() })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "redis": "down" })),
        )
            .into_response()
    }
}

async fn get_config_handler(
    State(state): State<Arc<AppState>>,
    Path(suffix): Path<String>,
) -> Response {
    let method = rpc_method("get", &suffix);
    match state.rpc.call_default(&method, json!({})).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            warn!(method = %method, error = %err, "config read failed");
            operation_failed()
        }
    }
}

async fn set_config_handler(
    State(state): State<Arc<AppState>>,
    Path(suffix): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let method = rpc_method("set", &suffix);
    match state.rpc.call_default(&method, body).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            warn!(method = %method, error = %err, "config write failed");
            operation_failed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_method_composes_verb_and_suffix() {
        assert_eq!(rpc_method("get", "AisCfg"), "getAisCfg");
        assert_eq!(rpc_method("set", "NetworkCfg"), "setNetworkCfg");
    }

    #[test]
    fn page_offset_is_zero_based_and_saturates() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(0, 20), 0);
        assert_eq!(page_offset(u64::MAX, u64::MAX), u64::MAX);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
        assert_eq!(total_pages(10, 0), 0);
    }

    #[test]
    fn history_query_defaults_page_params() {
        let query: AisHistoryQuery =
            serde_json::from_str(r#"{"start_time_ms": 1, "end_time_ms": 2}"#).unwrap();
        assert_eq!(query.current_page, 1);
        assert_eq!(query.page_record, 20);
        assert!(query.order.is_none());
    }

    #[test]
    fn history_query_accepts_explicit_order() {
        let query: AisHistoryQuery = serde_json::from_str(
            r#"{"start_time_ms": 1, "end_time_ms": 2, "current_page": 3, "page_record": 50, "order": "asc"}"#,
        )
        .unwrap();
        assert_eq!(query.current_page, 3);
        assert_eq!(query.page_record, 50);
        assert_eq!(query.order, Some(QueryOrder::Asc));
    }
}
