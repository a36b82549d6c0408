//! Automation configuration templates.
//!
//! A configuration bundles browser, model, performance and tracking settings.
//! The catalog ships a fixed set of named templates, can recommend one from a
//! task description and accepts user-defined entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::error::CoreError;

pub const DEFAULT_CONFIG: &str = "default";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub highlight_elements: bool,
    /// Seconds to wait between consecutive browser actions
    pub wait_between_actions: f64,
    pub enable_default_extensions: bool,
    pub disable_images: bool,
    pub disable_javascript: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1920,
            window_height: 1080,
            highlight_elements: true,
            wait_between_actions: 0.3,
            enable_default_extensions: true,
            disable_images: false,
            disable_javascript: false,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(default)]
pub struct PerformanceSettings {
    pub max_steps: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub parallel_tasks: bool,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            timeout_secs: 300,
            retry_attempts: 3,
            parallel_tasks: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(default)]
pub struct TrackingSettings {
    pub save_screenshots: bool,
    pub save_html: bool,
    pub log_level: String,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            save_screenshots: true,
            save_html: false,
            log_level: "INFO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(default)]
pub struct AutomationConfig {
    pub name: String,
    pub description: String,
    pub browser: BrowserSettings,
    pub llm: LlmSettings,
    pub performance: PerformanceSettings,
    pub tracking: TrackingSettings,
    #[schema(value_type = Object)]
    pub custom: BTreeMap<String, Value>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CONFIG.to_string(),
            description: "Balanced settings for general automation".to_string(),
            browser: BrowserSettings::default(),
            llm: LlmSettings::default(),
            performance: PerformanceSettings::default(),
            tracking: TrackingSettings::default(),
            custom: BTreeMap::new(),
        }
    }
}

impl AutomationConfig {
    /// Deep-merge a JSON object of overrides into a copy of this configuration.
    ///
    /// Nested objects merge key by key; any other value replaces the existing one.
    pub fn with_overrides(&self, overrides: &Value) -> Result<Self, CoreError> {
        if !overrides.is_object() {
            return Err(CoreError::InvalidOverride(
                "overrides must be a JSON object".to_string(),
            ));
        }

        let mut base = serde_json::to_value(self)
            .map_err(|e| CoreError::InvalidOverride(e.to_string()))?;
        merge(&mut base, overrides);

        serde_json::from_value(base).map_err(|e| CoreError::InvalidOverride(e.to_string()))
    }
}

fn merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value)
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}

/// Keyword groups checked in order by [`ConfigCatalog::recommend`].
const RECOMMENDATIONS: &[(&[&str], &str)] = &[
    (
        &["fast", "quick", "speed", "batch", "bulk"],
        "fast_automation",
    ),
    (
        &["stealth", "undetected", "bypass", "avoid detection"],
        "stealth_automation",
    ),
    (
        &["scrape", "extract", "collect", "harvest", "data"],
        "data_extraction",
    ),
    (
        &["form", "fill", "submit", "register", "signup"],
        "form_automation",
    ),
    (
        &["buy", "shop", "product", "cart", "price"],
        "ecommerce_automation",
    ),
    (
        &["social", "post", "tweet", "facebook", "instagram"],
        "social_media_automation",
    ),
    (
        &["test", "verify", "check", "validate", "qa"],
        "testing_automation",
    ),
];
const FALLBACK_RECOMMENDATION: &str = "visual_automation";

#[derive(Debug, Clone)]
pub struct ConfigCatalog {
    configs: BTreeMap<String, AutomationConfig>,
}

impl Default for ConfigCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigCatalog {
    /// Catalog holding only the built-in templates.
    pub fn new() -> Self {
        let configs = builtin_templates()
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();
        Self { configs }
    }

    pub fn get(&self, name: &str) -> Result<AutomationConfig, CoreError> {
        self.configs
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ConfigNotFound(name.to_string()))
    }

    /// Template names mapped to their descriptions.
    pub fn list(&self) -> BTreeMap<String, String> {
        self.configs
            .iter()
            .map(|(name, config)| (name.clone(), config.description.clone()))
            .collect()
    }

    /// Add or replace an entry. Custom entries may shadow built-ins.
    pub fn insert(&mut self, config: AutomationConfig) -> Result<(), CoreError> {
        if config.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "configuration name must not be empty".to_string(),
            ));
        }
        self.configs.insert(config.name.clone(), config);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Pick the template whose keywords first match the description.
    pub fn recommend(&self, description: &str) -> AutomationConfig {
        let name = recommend_name(description);
        self.get(name).unwrap_or_default()
    }
}

pub fn recommend_name(description: &str) -> &'static str {
    let lowered = description.to_lowercase();
    RECOMMENDATIONS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, name)| *name)
        .unwrap_or(FALLBACK_RECOMMENDATION)
}

fn custom(entries: Value) -> BTreeMap<String, Value> {
    match entries {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}

fn template(name: &str, description: &str) -> AutomationConfig {
    AutomationConfig {
        name: name.to_string(),
        description: description.to_string(),
        ..AutomationConfig::default()
    }
}

fn builtin_templates() -> Vec<AutomationConfig> {
    let mut fast = template(
        "fast_automation",
        "Optimized for speed with minimal visual feedback",
    );
    fast.browser = BrowserSettings {
        headless: true,
        window_width: 1280,
        window_height: 720,
        highlight_elements: false,
        wait_between_actions: 0.1,
        enable_default_extensions: false,
        disable_images: true,
        ..BrowserSettings::default()
    };
    fast.performance = PerformanceSettings {
        max_steps: 25,
        timeout_secs: 120,
        retry_attempts: 2,
        parallel_tasks: true,
    };
    fast.tracking = TrackingSettings {
        save_screenshots: false,
        save_html: false,
        log_level: "WARNING".to_string(),
    };

    let mut visual = template(
        "visual_automation",
        "Full visual feedback for monitoring and debugging",
    );
    visual.browser = BrowserSettings {
        headless: false,
        wait_between_actions: 1.0,
        ..BrowserSettings::default()
    };
    visual.performance = PerformanceSettings {
        max_steps: 50,
        timeout_secs: 600,
        retry_attempts: 3,
        parallel_tasks: false,
    };
    visual.tracking = TrackingSettings {
        save_screenshots: true,
        save_html: true,
        log_level: "INFO".to_string(),
    };

    let mut stealth = template(
        "stealth_automation",
        "Human-like pacing to avoid bot detection",
    );
    stealth.browser = BrowserSettings {
        window_width: 1366,
        window_height: 768,
        highlight_elements: false,
        wait_between_actions: 2.0,
        enable_default_extensions: false,
        user_agent: Some(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        ),
        ..BrowserSettings::default()
    };
    stealth.llm.temperature = 0.2;
    stealth.performance = PerformanceSettings {
        max_steps: 40,
        timeout_secs: 480,
        retry_attempts: 3,
        parallel_tasks: false,
    };
    stealth.tracking.save_screenshots = false;
    stealth.custom = custom(json!({
        "random_delays": true,
        "human_typing_speed": true,
        "mouse_movements": true,
    }));

    let mut data = template(
        "data_extraction",
        "Structured data collection across many pages",
    );
    data.browser = BrowserSettings {
        headless: true,
        highlight_elements: false,
        wait_between_actions: 0.5,
        enable_default_extensions: false,
        disable_images: true,
        ..BrowserSettings::default()
    };
    data.llm = LlmSettings {
        temperature: 0.0,
        max_tokens: 6000,
        ..LlmSettings::default()
    };
    data.performance = PerformanceSettings {
        max_steps: 100,
        timeout_secs: 900,
        retry_attempts: 5,
        parallel_tasks: true,
    };
    data.tracking = TrackingSettings {
        save_screenshots: false,
        save_html: true,
        log_level: "INFO".to_string(),
    };
    data.custom = custom(json!({
        "pagination_handling": true,
        "data_validation": true,
        "export_formats": ["json", "csv", "xlsx"],
    }));

    let mut form = template(
        "form_automation",
        "Careful form filling with field validation",
    );
    form.browser = BrowserSettings {
        window_width: 1440,
        window_height: 900,
        wait_between_actions: 0.8,
        ..BrowserSettings::default()
    };
    form.llm.max_tokens = 3000;
    form.performance = PerformanceSettings {
        max_steps: 30,
        timeout_secs: 300,
        retry_attempts: 3,
        parallel_tasks: false,
    };
    form.custom = custom(json!({
        "form_validation": true,
        "auto_captcha_detection": true,
        "field_mapping": true,
    }));

    let mut ecommerce = template(
        "ecommerce_automation",
        "Product search, price tracking and cart handling",
    );
    ecommerce.browser = BrowserSettings {
        window_width: 1600,
        window_height: 1000,
        wait_between_actions: 1.2,
        ..BrowserSettings::default()
    };
    ecommerce.performance = PerformanceSettings {
        max_steps: 60,
        timeout_secs: 600,
        retry_attempts: 3,
        parallel_tasks: false,
    };
    ecommerce.custom = custom(json!({
        "price_tracking": true,
        "product_comparison": true,
        "cart_management": true,
        "checkout_automation": false,
    }));

    let mut social = template(
        "social_media_automation",
        "Rate-limited posting and engagement on social platforms",
    );
    social.browser = BrowserSettings {
        window_width: 1280,
        window_height: 800,
        wait_between_actions: 2.5,
        ..BrowserSettings::default()
    };
    social.llm = LlmSettings {
        temperature: 0.3,
        max_tokens: 3000,
        ..LlmSettings::default()
    };
    social.performance = PerformanceSettings {
        max_steps: 40,
        timeout_secs: 480,
        retry_attempts: 2,
        parallel_tasks: false,
    };
    social.custom = custom(json!({
        "rate_limiting": true,
        "content_moderation": true,
        "engagement_tracking": true,
        "platform_specific_rules": true,
    }));

    let mut testing = template(
        "testing_automation",
        "Assertion-driven website testing and QA",
    );
    testing.browser = BrowserSettings {
        headless: true,
        highlight_elements: false,
        wait_between_actions: 0.3,
        enable_default_extensions: false,
        disable_images: true,
        ..BrowserSettings::default()
    };
    testing.llm.temperature = 0.0;
    testing.performance = PerformanceSettings {
        max_steps: 80,
        timeout_secs: 600,
        retry_attempts: 1,
        parallel_tasks: true,
    };
    testing.tracking = TrackingSettings {
        save_screenshots: true,
        save_html: true,
        log_level: "DEBUG".to_string(),
    };
    testing.custom = custom(json!({
        "assertion_checking": true,
        "performance_monitoring": true,
        "error_reporting": true,
        "test_coverage": true,
    }));

    vec![
        AutomationConfig::default(),
        fast,
        visual,
        stealth,
        data,
        form,
        ecommerce,
        social,
        testing,
    ]
}
