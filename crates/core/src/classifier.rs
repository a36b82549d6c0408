//! Failure classification for step execution errors.
//!
//! Messages are matched against an ordered keyword table; the first row that
//! matches decides the category. Each category carries a fixed remediation
//! suggestion and a retryability flag used by the retry engine.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    RateLimit,
    Network,
    ElementNotFound,
    Browser,
    Authentication,
    Captcha,
    ServerError,
    Validation,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::ElementNotFound => "element_not_found",
            Self::Browser => "browser",
            Self::Authentication => "authentication",
            Self::Captcha => "captcha",
            Self::ServerError => "server_error",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluated top to bottom. Keywords are lowercase.
const CATEGORY_TABLE: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Timeout,
        &["timeout", "timed out", "deadline exceeded"],
    ),
    (
        ErrorCategory::RateLimit,
        &["rate limit", "too many requests", "429", "throttle"],
    ),
    (
        ErrorCategory::Network,
        &["connection", "network", "dns", "ssl", "certificate"],
    ),
    (
        ErrorCategory::ElementNotFound,
        &[
            "element not found",
            "no such element",
            "stale element",
            "selector",
        ],
    ),
    (
        ErrorCategory::Browser,
        &["webdriver", "browser", "page crashed", "target closed"],
    ),
    (
        ErrorCategory::Authentication,
        &[
            "unauthorized",
            "forbidden",
            "permission",
            "401",
            "403",
            "login",
            "password",
            "credentials",
        ],
    ),
    (
        ErrorCategory::Captcha,
        &["captcha", "recaptcha", "robot", "verification"],
    ),
    (
        ErrorCategory::ServerError,
        &["500", "502", "503", "504", "internal server error"],
    ),
    (
        ErrorCategory::Validation,
        &["invalid", "required field", "validation", "schema"],
    ),
];

/// Result of classifying one failure message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub suggestion: &'static str,
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn categorize(&self, message: &str) -> ErrorCategory {
        let lowered = message.to_lowercase();
        CATEGORY_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(category, _)| *category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    pub fn suggest(&self, category: ErrorCategory) -> &'static str {
        match category {
            ErrorCategory::Timeout => {
                "The operation took too long. Increase the task timeout or split the task into smaller steps."
            }
            ErrorCategory::RateLimit => {
                "Reduce request frequency. Implement delays between actions."
            }
            ErrorCategory::Network => {
                "Check internet connection and try again. Consider using a different network or VPN."
            }
            ErrorCategory::ElementNotFound => {
                "Wait for page to load completely. Try refreshing the page or using different selectors."
            }
            ErrorCategory::Browser => {
                "Restart the browser session. Check that the browser and its driver are installed and compatible."
            }
            ErrorCategory::Authentication => {
                "Verify credentials are correct. Check if account is locked or requires 2FA."
            }
            ErrorCategory::Captcha => {
                "Manual intervention required for CAPTCHA. Consider using CAPTCHA solving services."
            }
            ErrorCategory::ServerError => {
                "Server is experiencing issues. Try again later or contact site administrator."
            }
            ErrorCategory::Validation => {
                "Check input data format and required fields. Verify form requirements."
            }
            ErrorCategory::Unknown => {
                "Review error details and check automation logs for more information."
            }
        }
    }

    /// Categories that need a human or a changed input never succeed on retry.
    pub fn is_retryable(&self, category: ErrorCategory) -> bool {
        !matches!(
            category,
            ErrorCategory::Authentication | ErrorCategory::Captcha | ErrorCategory::Validation
        )
    }

    pub fn classify(&self, message: &str) -> Classification {
        let category = self.categorize(message);
        Classification {
            category,
            suggestion: self.suggest(category),
            retryable: self.is_retryable(category),
        }
    }
}
