//! Task orchestration engine.
//!
//! The [`TaskRegistry`] owns every task and drives it through its lifecycle,
//! calling the external step executor under a retry policy, caching successful
//! results and publishing progress on the event bus.

pub mod cache;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod state_machine;

pub use cache::{ResultCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use error::{ExecutionFailure, OrchestratorError, Result};
pub use metrics::{OperationStats, PerformanceMonitor};
pub use registry::{RegistrySettings, TaskOptions, TaskRegistry, TASK_EXECUTION_OPERATION};
pub use retry::{RetryEngine, RetryError, RetryPolicy, RetryStrategy};
pub use state_machine::TaskStateMachine;
