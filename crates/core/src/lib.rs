//! Domain types shared by the automation orchestration crates.
//!
//! Tasks and steps, the error classifier, configuration templates, result
//! schemas and the contract the orchestrator uses to drive an external step
//! executor.

pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod schema;

pub use classifier::{Classification, ErrorCategory, ErrorClassifier};
pub use config::{
    AutomationConfig, BrowserSettings, ConfigCatalog, LlmSettings, PerformanceSettings,
    TrackingSettings,
};
pub use domain::*;
pub use error::CoreError;
pub use executor::{
    EndReason, ExecutionRequest, ExecutorError, StepExecutor, StepOutcome, StepReport,
};
pub use schema::{ResultSchema, SchemaCatalog};
