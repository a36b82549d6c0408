//! Event system for task progress streaming
//!
//! This crate provides the event bus and the lifecycle/step events that
//! subscribers (SSE and WebSocket clients) receive.

mod bus;
mod types;

pub use bus::{EventBus, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use types::*;
