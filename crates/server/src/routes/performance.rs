use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use orchestrator::OperationStats;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/performance",
    responses(
        (status = 200, description = "Statistics per recorded operation", body = BTreeMap<String, OperationStats>),
    ),
    tag = "monitoring"
)]
pub async fn get_performance(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, OperationStats>> {
    Json(state.registry.monitor().stats())
}
