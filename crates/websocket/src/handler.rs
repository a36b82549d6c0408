use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::interval;

use events::EventBus;
use orchestrator::TaskRegistry;

use crate::messages::{ClientMessage, ServerMessage, SubscriptionFilter};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WsState {
    pub event_bus: EventBus,
    pub registry: TaskRegistry,
}

impl WsState {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            event_bus: registry.events().clone(),
            registry,
        }
    }

    /// Answer one client message, updating the connection's filter.
    fn respond(&self, message: ClientMessage, filter: &mut SubscriptionFilter) -> ServerMessage {
        match message {
            ClientMessage::Ping => ServerMessage::Pong,
            ClientMessage::GetTaskStatus { task_id } => match self.registry.status(&task_id) {
                Ok(task) => ServerMessage::TaskStatus { task },
                Err(e) => ServerMessage::error(e.to_string()),
            },
            ClientMessage::Subscribe { task_ids } => {
                *filter = SubscriptionFilter::from_task_ids(task_ids.clone());
                ServerMessage::Subscribed { task_ids }
            }
            ClientMessage::Unsubscribe => {
                *filter = SubscriptionFilter::Nothing;
                ServerMessage::Unsubscribed
            }
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<WsState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

fn encode<T: Serialize>(payload: &T) -> Option<Message> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode WebSocket message");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<WsState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = state.event_bus.subscribe();
    let mut filter = SubscriptionFilter::default();

    tracing::info!(client_id = %client_id, "WebSocket client connected");

    if let Some(msg) = encode(&ServerMessage::connected(&client_id)) {
        if sender.send(msg).await.is_err() {
            state.event_bus.unsubscribe(subscription.id());
            return;
        }
    }

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let Some(msg) = encode(&ServerMessage::Pong) else { continue };
                if sender.send(msg).await.is_err() {
                    break;
                }
            }

            envelope = subscription.recv() => {
                match envelope {
                    Some(envelope) => {
                        if !filter.matches(&envelope) {
                            continue;
                        }
                        let Some(msg) = encode(&envelope) else { continue };
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        tracing::warn!(client_id = %client_id, "WebSocket client fell behind the event bus");
                        break;
                    }
                }
            }

            msg = tokio::time::timeout(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL, receiver.next()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => state.respond(message, &mut filter),
                            Err(e) => ServerMessage::error(format!("Invalid message: {}", e)),
                        };
                        let Some(msg) = encode(&response) else { continue };
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) => {
                        break;
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) => {
                        break;
                    }
                    Ok(None) => {
                        break;
                    }
                    Err(_) => {
                        tracing::debug!(client_id = %client_id, "WebSocket client idle");
                    }
                }
            }
        }
    }

    state.event_bus.unsubscribe(subscription.id());
    tracing::info!(client_id = %client_id, "WebSocket connection closed");
}
