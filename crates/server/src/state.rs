use std::sync::Arc;

use agent_client::{AgentClient, RemoteStepExecutor};
use automation_core::{ConfigCatalog, SchemaCatalog, StepExecutor};
use events::EventBus;
use orchestrator::TaskRegistry;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub registry: TaskRegistry,
    pub event_bus: EventBus,
    pub configs: Arc<ConfigCatalog>,
    pub schemas: Arc<SchemaCatalog>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// State whose tasks run against the browser agent at `config.server.agent_url`.
    pub fn new(config: ServerConfig) -> Self {
        let executor = RemoteStepExecutor::new(AgentClient::new(config.server.agent_url.clone()));
        Self::with_executor(config, Arc::new(executor))
    }

    pub fn with_executor(config: ServerConfig, executor: Arc<dyn StepExecutor>) -> Self {
        let event_bus = EventBus::with_capacity(config.orchestrator.event_queue_capacity);
        let registry = TaskRegistry::new(executor, event_bus.clone(), config.registry_settings());

        Self {
            registry,
            event_bus,
            configs: Arc::new(ConfigCatalog::new()),
            schemas: Arc::new(SchemaCatalog::new()),
            config: Arc::new(config),
        }
    }

    pub fn with_configs(mut self, configs: ConfigCatalog) -> Self {
        self.configs = Arc::new(configs);
        self
    }

    /// Periodically drop expired cache entries. Must be called inside a tokio runtime.
    pub fn start_cache_sweeper(&self) -> JoinHandle<()> {
        self.registry
            .cache()
            .spawn_sweeper(self.config.cache_sweep_interval())
    }
}
