use std::path::{Path, PathBuf};
use std::time::Duration;

use automation_core::{AutomationConfig, ConfigCatalog};
use orchestrator::{RegistrySettings, RetryPolicy, RetryStrategy};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_AGENT_URL: &str = "http://localhost:8765";

/// Service configuration, read from a TOML file with `[server]`,
/// `[orchestrator]` and `[retry]` sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub orchestrator: OrchestratorSection,
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Returned to clients that request a visible browser
    pub vnc_url: String,
    /// Base URL of the browser agent
    pub agent_url: String,
    /// Directory of `*.json` automation configs added to the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configs_dir: Option<PathBuf>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            vnc_url: "vnc://localhost:5900".to_string(),
            agent_url: DEFAULT_AGENT_URL.to_string(),
            configs_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_concurrent_tasks: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub cache_sweep_interval_secs: u64,
    pub event_queue_capacity: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            cache_ttl_secs: 24 * 60 * 60,
            cache_capacity: orchestrator::DEFAULT_CACHE_CAPACITY,
            cache_sweep_interval_secs: 300,
            event_queue_capacity: events::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySection {
    pub strategy: RetryStrategy,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

impl ServerConfig {
    /// Read the config file, falling back to defaults when it is missing or invalid.
    pub async fn read(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    pub async fn write(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(path, content).await?;
        debug!(path = %path.display(), "Config saved successfully");

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            strategy: self.retry.strategy,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
            ..RetryPolicy::default()
        }
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            max_concurrent_tasks: self.orchestrator.max_concurrent_tasks,
            cache_ttl: Duration::from_secs(self.orchestrator.cache_ttl_secs),
            cache_capacity: self.orchestrator.cache_capacity,
            retry: self.retry_policy(),
        }
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.orchestrator.cache_sweep_interval_secs.max(1))
    }
}

/// Add every `*.json` automation config in `dir` to the catalog.
///
/// Unreadable or invalid files are skipped with a warning. Returns how many
/// configs were added.
pub async fn load_custom_configs(dir: &Path, catalog: &mut ConfigCatalog) -> usize {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to read configs directory");
            return 0;
        }
    };

    let mut loaded = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to list configs directory");
                break;
            }
        };

        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read automation config");
                continue;
            }
        };

        let mut config: AutomationConfig = match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid automation config");
                continue;
            }
        };

        if config.name.trim().is_empty() || config.name == automation_core::config::DEFAULT_CONFIG {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                config.name = stem.to_string();
            }
        }

        let name = config.name.clone();
        match catalog.insert(config) {
            Ok(()) => {
                info!(config = %name, path = %path.display(), "Loaded custom automation config");
                loaded += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Rejected automation config"),
        }
    }

    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.agent_url, DEFAULT_AGENT_URL);
        assert_eq!(config.orchestrator.max_concurrent_tasks, 5);
        assert_eq!(config.orchestrator.cache_ttl_secs, 86_400);
        assert_eq!(config.retry.strategy, RetryStrategy::Exponential);
    }

    #[tokio::test]
    async fn test_config_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfig::read(&temp_dir.path().join("missing.toml")).await;
        assert_eq!(config, ServerConfig::default());
    }

    #[tokio::test]
    async fn test_config_read_invalid_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let config = ServerConfig::read(&path).await;
        assert_eq!(config, ServerConfig::default());
    }

    #[tokio::test]
    async fn test_config_partial_sections() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9100\n\n[retry]\nstrategy = \"fibonacci\"\njitter = false\n",
        )
        .unwrap();

        let config = ServerConfig::read(&path).await;
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.retry.strategy, RetryStrategy::Fibonacci);
        assert!(!config.retry.jitter);
        assert_eq!(config.orchestrator, OrchestratorSection::default());
    }

    #[tokio::test]
    async fn test_config_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = ServerConfig::default();
        config.server.port = 9200;
        config.orchestrator.max_concurrent_tasks = 2;
        config.write(&path).await.unwrap();

        let loaded = ServerConfig::read(&path).await;
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_registry_settings_from_sections() {
        let mut config = ServerConfig::default();
        config.orchestrator.cache_ttl_secs = 60;
        config.retry.base_delay_ms = 250;
        config.retry.strategy = RetryStrategy::Linear;

        let settings = config.registry_settings();
        assert_eq!(settings.cache_ttl, Duration::from_secs(60));
        assert_eq!(settings.retry.base_delay, Duration::from_millis(250));
        assert_eq!(settings.retry.strategy, RetryStrategy::Linear);
        assert_eq!(settings.retry.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_load_custom_configs() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("night_crawl.json"),
            r#"{"description": "Slow overnight crawl", "performance": {"max_steps": 500}}"#,
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("broken.json"), "{ nope").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let mut catalog = ConfigCatalog::new();
        let before = catalog.len();
        let loaded = load_custom_configs(temp_dir.path(), &mut catalog).await;

        assert_eq!(loaded, 1);
        assert_eq!(catalog.len(), before + 1);
        let config = catalog.get("night_crawl").unwrap();
        assert_eq!(config.description, "Slow overnight crawl");
        assert_eq!(config.performance.max_steps, 500);
    }
}
