use arena::net::EndpointConfig;
use arena::sim::{EngineConfig, SchedulerConfig};

/// Immutable server wiring, assembled from the CLI at startup.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub scheduler: SchedulerConfig,
    pub engine: EngineConfig,
    pub endpoint: EndpointConfig,
}
