use automation_core::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use events::EventEnvelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    GetTaskStatus {
        task_id: String,
    },
    /// `task_ids: None` subscribes to every task
    Subscribe {
        #[serde(default)]
        task_ids: Option<Vec<String>>,
    },
    Unsubscribe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        client_id: String,
        timestamp: DateTime<Utc>,
    },
    Pong,
    TaskStatus {
        task: Task,
    },
    Subscribed {
        #[serde(skip_serializing_if = "Option::is_none")]
        task_ids: Option<Vec<String>>,
    },
    Unsubscribed,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn connected(client_id: impl Into<String>) -> Self {
        Self::Connected {
            client_id: client_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Which events a client receives. Clients start out receiving everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubscriptionFilter {
    #[default]
    All,
    Tasks(Vec<String>),
    Nothing,
}

impl SubscriptionFilter {
    pub fn from_task_ids(task_ids: Option<Vec<String>>) -> Self {
        match task_ids {
            Some(ids) => Self::Tasks(ids),
            None => Self::All,
        }
    }

    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        match self {
            Self::All => true,
            Self::Tasks(ids) => ids.iter().any(|id| id == envelope.task_id()),
            Self::Nothing => false,
        }
    }
}
