use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;

use events::{EventBus, EventEnvelope};

use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub task_ids: Option<String>,
}

fn parse_task_ids(task_ids: Option<&str>) -> Option<Vec<String>> {
    task_ids.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn envelope_to_sse_event(envelope: &EventEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.sequence.to_string())
        .event(envelope.event.kind())
        .data(data))
}

/// Releases the bus subscription when the client goes away.
struct SubscriptionGuard {
    bus: EventBus,
    id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(
        ("task_ids" = Option<String>, Query, description = "Comma-separated task IDs to filter events"),
    ),
    responses(
        (status = 200, description = "SSE event stream"),
    ),
    tag = "events"
)]
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let task_ids = parse_task_ids(query.task_ids.as_deref());

    let subscription = state.event_bus.subscribe();
    let guard = SubscriptionGuard {
        bus: state.event_bus.clone(),
        id: subscription.id(),
    };
    tracing::debug!(subscriber = guard.id, ?task_ids, "SSE client subscribed");

    let stream = subscription.into_stream().filter_map(move |envelope| {
        let _guard = &guard;
        let keep = task_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == envelope.task_id()));
        futures::future::ready(keep.then(|| envelope_to_sse_event(&envelope)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
