use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct SchemaListResponse {
    pub schemas: Vec<String>,
    pub count: usize,
}

#[utoipa::path(
    get,
    path = "/api/configs",
    responses(
        (status = 200, description = "Configuration names mapped to descriptions", body = BTreeMap<String, String>),
    ),
    tag = "catalog"
)]
pub async fn list_configs(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(state.configs.list())
}

#[utoipa::path(
    get,
    path = "/api/schemas",
    responses(
        (status = 200, description = "Available result schema names", body = SchemaListResponse),
    ),
    tag = "catalog"
)]
pub async fn list_schemas(State(state): State<AppState>) -> Json<SchemaListResponse> {
    let schemas = state.schemas.names();
    Json(SchemaListResponse {
        count: schemas.len(),
        schemas,
    })
}
