mod client;
mod config;
mod input;
mod interpolation;
mod prediction;

pub use client::GameClient;
pub use config::ClientConfig;
pub use input::InputCapture;
pub use interpolation::{InterpolationBuffer, InterpolationConfig, RemoteEntityView};
pub use prediction::{PredictionConfig, PredictionSystem, ReconcileReport};
