use arena::clock::ClockConfig;
use arena::diagnostics::RecorderConfig;
use arena::net::SessionConfig;
use arena::physics::PhysicsConfig;

use super::interpolation::InterpolationConfig;
use super::prediction::PredictionConfig;

/// Immutable client wiring, built once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    /// Must match the server's view rotation scale.
    pub look_sensitivity: f32,
    pub tick_rate: u32,
    pub clock_sync_interval_ms: f64,
    pub high_latency_threshold_ms: f64,
    pub session: SessionConfig,
    pub clock: ClockConfig,
    pub prediction: PredictionConfig,
    pub interpolation: InterpolationConfig,
    pub physics: PhysicsConfig,
    pub recorder: RecorderConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", arena::DEFAULT_PORT),
            look_sensitivity: 0.002,
            tick_rate: arena::DEFAULT_TICK_RATE,
            clock_sync_interval_ms: 250.0,
            high_latency_threshold_ms: 150.0,
            session: SessionConfig::default(),
            clock: ClockConfig::default(),
            prediction: PredictionConfig::default(),
            interpolation: InterpolationConfig::default(),
            physics: PhysicsConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}
