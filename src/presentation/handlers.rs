// HTTP request handlers
use crate::application::bucket_store::StoreError;
use crate::application::ingest_stats::IngestStatsView;
use crate::domain::live::LiveEntry;
use crate::domain::trajectory::{RouteSummary, TracePoint};
use crate::domain::warehouse::WarehouseRef;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type ApiResult<T> = Result<Json<T>, StatusCode>;

#[derive(Debug, Default, Deserialize)]
pub struct TraceQuery {
    /// Comma-separated vehicle ids
    pub vehicles: Option<String>,
    /// Comma-separated route ids
    pub routes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakReport {
    pub count: usize,
    pub vehicle_ids: Vec<String>,
}

/// "a, b,,c" -> ["a", "b", "c"]; absent parameter means no filter
fn split_ids(param: Option<String>) -> Option<Vec<String>> {
    param.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn query_failed(what: &str, e: StoreError) -> StatusCode {
    tracing::error!(error = %e, "Error fetching {}", what);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_vehicles(State(state): State<Arc<AppState>>) -> ApiResult<Vec<String>> {
    state
        .trajectory_service
        .list_vehicles()
        .await
        .map(Json)
        .map_err(|e| query_failed("vehicles", e))
}

pub async fn live_positions(State(state): State<Arc<AppState>>) -> Json<Vec<LiveEntry>> {
    Json(state.live_snapshot.entries())
}

pub async fn vehicles_on_break(State(state): State<Arc<AppState>>) -> Json<BreakReport> {
    let vehicle_ids = state.live_snapshot.vehicles_on_break();
    Json(BreakReport {
        count: vehicle_ids.len(),
        vehicle_ids,
    })
}

pub async fn get_trace(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TraceQuery>,
) -> ApiResult<Vec<TracePoint>> {
    state
        .trajectory_service
        .get_trace(split_ids(query.vehicles), split_ids(query.routes))
        .await
        .map(Json)
        .map_err(|e| query_failed("trace", e))
}

pub async fn get_routes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TraceQuery>,
) -> ApiResult<Vec<RouteSummary>> {
    let Some(vehicle_ids) = split_ids(query.vehicles) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    state
        .trajectory_service
        .get_route_summaries(vehicle_ids)
        .await
        .map(Json)
        .map_err(|e| query_failed("routes", e))
}

pub async fn list_warehouses(State(state): State<Arc<AppState>>) -> ApiResult<Vec<WarehouseRef>> {
    state
        .warehouse_service
        .list_warehouses()
        .await
        .map(Json)
        .map_err(|e| query_failed("warehouses", e))
}

pub async fn ingest_stats(State(state): State<Arc<AppState>>) -> Json<IngestStatsView> {
    Json(state.ingest_stats.view())
}
