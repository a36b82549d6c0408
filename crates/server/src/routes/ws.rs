use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use websocket::WsState;

use crate::state::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let ws_state = Arc::new(WsState::new(state.registry.clone()));
    websocket::ws_handler(ws, Path(client_id), State(ws_state)).await
}
