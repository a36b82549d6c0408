//! Event types published while tasks run

use automation_core::{ErrorCategory, Step};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Bus-wide publish order
    pub sequence: u64,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
    /// The actual event, flattened next to the metadata
    #[serde(flatten)]
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(sequence: u64, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn task_id(&self) -> &str {
        self.event.task_id()
    }
}

/// All events a task can emit
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Execution began (cache miss)
    TaskStarted { task_id: String },

    /// A step was appended or resolved
    StepUpdate { task_id: String, step: Step },

    TaskCompleted {
        task_id: String,
        #[schema(value_type = Object)]
        result: Value,
        from_cache: bool,
    },

    TaskFailed {
        task_id: String,
        error: String,
        category: ErrorCategory,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggestion: Option<String>,
    },

    TaskCancelled { task_id: String },
}

impl Event {
    /// Get the task ID associated with this event
    pub fn task_id(&self) -> &str {
        match self {
            Event::TaskStarted { task_id }
            | Event::StepUpdate { task_id, .. }
            | Event::TaskCompleted { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskCancelled { task_id } => task_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::TaskStarted { .. } => "task_started",
            Event::StepUpdate { .. } => "step_update",
            Event::TaskCompleted { .. } => "task_completed",
            Event::TaskFailed { .. } => "task_failed",
            Event::TaskCancelled { .. } => "task_cancelled",
        }
    }

    /// Whether this event ends the task's stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::TaskCompleted { .. } | Event::TaskFailed { .. } | Event::TaskCancelled { .. }
        )
    }
}
