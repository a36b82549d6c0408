use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration '{0}' not found")]
    ConfigNotFound(String),

    #[error("Schema '{0}' not found")]
    SchemaNotFound(String),

    #[error("Invalid configuration override: {0}")]
    InvalidOverride(String),

    #[error("Invalid status transition for step {index} from {from} to {to}")]
    InvalidStepTransition { index: u32, from: String, to: String },

    #[error("Result failed schema '{schema}' validation: {reason}")]
    SchemaViolation { schema: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::ConfigNotFound("turbo".to_string());
        assert!(error.to_string().contains("turbo"));
    }
}
