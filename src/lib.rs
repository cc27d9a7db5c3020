//! DAE Meter Bridge Library
//!
//! Logs in to the DAE water-meter web service, polls channel and meter readings on a
//! fixed interval and exposes every meter as a sensor that follows the latest poll.

pub mod config;
pub mod config_flow;
pub mod dae_client;
pub mod dae_types;
pub mod errors;
pub mod host;
pub mod poll_coordinator;
pub mod sensor;

// Re-export commonly used types for easier access
pub use config::BridgeConfig;
pub use config_flow::{ConfigFlow, FlowResult};
pub use dae_client::DaeClient;
pub use dae_types::{Channel, Credentials, Meter, MeterDevice, Snapshot};
pub use errors::{DaeError, DaeResult, HostError};
pub use host::{ClientSettings, ConfigEntry, HostRegistry};
pub use poll_coordinator::{CoordinatorHandle, PollCoordinator, SnapshotSource};
pub use sensor::MeterSensor;
