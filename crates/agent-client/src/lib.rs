//! HTTP client for a browser agent process.
//!
//! [`RemoteStepExecutor`] implements the orchestrator's step executor contract
//! by opening one agent session per task and requesting steps over HTTP.

pub mod client;
pub mod error;
pub mod executor;
pub mod types;

pub use client::AgentClient;
pub use error::{AgentError, Result};
pub use executor::RemoteStepExecutor;
pub use types::*;
