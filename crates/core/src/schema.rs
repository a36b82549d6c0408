//! Named result schemas and required-field validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::error::CoreError;

pub const DEFAULT_SCHEMA: &str = "comprehensive_automation";

/// Shape a task result is expected to have.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ResultSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Top-level fields that must be present and non-null
    #[serde(default)]
    pub required: Vec<String>,
    /// JSON schema document describing the full result
    #[serde(default)]
    #[schema(value_type = Object)]
    pub schema: Value,
}

impl ResultSchema {
    pub fn new(name: impl Into<String>, required: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required: required.iter().map(|f| f.to_string()).collect(),
            schema: Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_document(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Check that `result` is an object carrying every required field.
    pub fn validate(&self, result: &Value) -> Result<(), CoreError> {
        let Some(object) = result.as_object() else {
            return Err(CoreError::SchemaViolation {
                schema: self.name.clone(),
                reason: "result is not a JSON object".to_string(),
            });
        };

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|field| object.get(field.as_str()).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::SchemaViolation {
                schema: self.name.clone(),
                reason: format!("missing required fields: {}", missing.join(", ")),
            })
        }
    }
}

const SELECTIONS: &[(&[&str], &str)] = &[
    (
        &[
            "login",
            "sign in",
            "authenticate",
            "temp mail",
            "temporary email",
        ],
        "login_automation",
    ),
    (
        &["form", "fill", "submit", "register", "signup"],
        "form_filling",
    ),
    (
        &["search", "find", "look for", "google", "bing"],
        "web_search",
    ),
    (
        &["buy", "purchase", "cart", "checkout", "product", "shop"],
        "ecommerce_automation",
    ),
    (
        &["post", "tweet", "facebook", "instagram", "linkedin", "social"],
        "social_media_automation",
    ),
    (
        &["scrape", "extract", "collect data", "harvest"],
        "web_scraping",
    ),
    (
        &["download", "upload", "file", "document", "pdf"],
        "file_operations",
    ),
    (
        &["navigate", "go to", "visit", "browse"],
        "navigation_task",
    ),
];

#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, ResultSchema>,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCatalog {
    pub fn new() -> Self {
        let schemas = builtin_schemas()
            .into_iter()
            .map(|schema| (schema.name.clone(), schema))
            .collect();
        Self { schemas }
    }

    pub fn get(&self, name: &str) -> Result<ResultSchema, CoreError> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::SchemaNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Pick a schema by description keywords, falling back to the broad default.
    pub fn for_description(&self, description: &str) -> ResultSchema {
        let lowered = description.to_lowercase();
        let name = SELECTIONS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
            .map(|(_, name)| *name)
            .unwrap_or(DEFAULT_SCHEMA);

        self.get(name)
            .unwrap_or_else(|_| ResultSchema::new(DEFAULT_SCHEMA, &[]))
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn schema(name: &str, description: &str, properties: Value, required: &[&str]) -> ResultSchema {
    ResultSchema::new(name, required)
        .with_description(description)
        .with_document(object_schema(properties, required))
}

fn builtin_schemas() -> Vec<ResultSchema> {
    vec![
        schema(
            "login_automation",
            "Outcome of a login or account creation flow",
            json!({
                "success": { "type": "boolean" },
                "login_url": { "type": "string" },
                "username": { "type": ["string", "null"] },
                "email": { "type": ["string", "null"] },
                "error_message": { "type": ["string", "null"] },
                "redirect_url": { "type": ["string", "null"] },
            }),
            &["success", "login_url"],
        ),
        schema(
            "form_filling",
            "Fields filled and submission outcome of a web form",
            json!({
                "form_url": { "type": "string" },
                "fields_filled": { "type": "object" },
                "submission_successful": { "type": "boolean" },
                "confirmation_message": { "type": ["string", "null"] },
                "errors": { "type": "array", "items": { "type": "string" } },
            }),
            &["form_url", "fields_filled", "submission_successful"],
        ),
        schema(
            "web_search",
            "Search engine query and top results",
            json!({
                "query": { "type": "string" },
                "search_engine": { "type": "string" },
                "results_count": { "type": "integer" },
                "top_results": { "type": "array", "items": { "type": "object" } },
            }),
            &["query", "search_engine", "results_count", "top_results"],
        ),
        schema(
            "ecommerce_automation",
            "Shopping action with product and cart details",
            json!({
                "action_type": { "type": "string" },
                "products": { "type": "array", "items": { "type": "object" } },
                "cart_total": { "type": ["string", "null"] },
                "success": { "type": "boolean" },
            }),
            &["action_type", "success"],
        ),
        schema(
            "social_media_automation",
            "Social platform action and its outcome",
            json!({
                "platform": { "type": "string" },
                "action": { "type": "string" },
                "content": { "type": ["string", "null"] },
                "post_url": { "type": ["string", "null"] },
                "success": { "type": "boolean" },
            }),
            &["platform", "action", "success"],
        ),
        schema(
            "web_scraping",
            "Structured data scraped from a target page",
            json!({
                "target_url": { "type": "string" },
                "data_points": { "type": "integer" },
                "structured_data": { "type": "array", "items": { "type": "object" } },
                "scraping_duration": { "type": "number" },
            }),
            &[
                "target_url",
                "data_points",
                "structured_data",
                "scraping_duration",
            ],
        ),
        schema(
            "file_operations",
            "File download or upload outcome",
            json!({
                "operation": { "type": "string" },
                "file_path": { "type": "string" },
                "file_size": { "type": ["integer", "null"] },
                "success": { "type": "boolean" },
            }),
            &["operation", "file_path", "success"],
        ),
        schema(
            "navigation_task",
            "Pages visited while navigating a site",
            json!({
                "start_url": { "type": "string" },
                "end_url": { "type": "string" },
                "pages_visited": { "type": "array", "items": { "type": "string" } },
                "navigation_time": { "type": "number" },
                "success": { "type": "boolean" },
            }),
            &[
                "start_url",
                "end_url",
                "pages_visited",
                "navigation_time",
                "success",
            ],
        ),
        schema(
            "data_extraction",
            "Generic extracted data keyed by source URL",
            json!({
                "url": { "type": "string" },
                "timestamp": { "type": "string" },
                "data": { "type": "object" },
            }),
            &["url", "timestamp", "data"],
        ),
        schema(
            DEFAULT_SCHEMA,
            "Broad result shape for tasks that span several categories",
            json!({
                "task_type": { "type": "string" },
                "success": { "type": "boolean" },
                "duration": { "type": "number" },
                "steps_completed": { "type": "array", "items": { "type": "string" } },
                "data_extracted": { "type": "object" },
                "errors": { "type": "array", "items": { "type": "string" } },
            }),
            &["task_type", "success", "duration"],
        ),
    ]
}
