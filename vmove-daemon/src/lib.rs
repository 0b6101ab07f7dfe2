mod config;
mod controller;
mod registry;
mod store;

pub use config::load_settings;
pub use controller::{Controller, ControllerListener, drain_events};
pub use registry::LoggingRegistry;
pub use store::{DEFAULT_POINT, LastPointStore};

use serde::{Deserialize, Serialize};
use vmove_logic::{GeoPoint, ServicePhase, SimError};

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;
pub use vmove_transport::get_socket_name;

/// Local socket name the daemon takes control commands on by default
pub const DEFAULT_CONTROL_SOCKET: &str = "vmove-control.sock";

/// Sent by a controller (one JSON object per line)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ControlRequest {
    /// Teleport to a point, this also resets the destination
    SetCurrentPosition { lat: f64, lng: f64 },
    /// Start moving towards a point
    SetDestination { lat: f64, lng: f64 },
    /// Start reporting
    Start,
    /// Stop reporting
    Stop,
    /// Get a [StatusReport]
    Status,
    /// Stop reporting and exit the daemon
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub running: bool,
    pub phase: ServicePhase,
    pub current_position: Option<GeoPoint>,
    pub destination: Option<GeoPoint>,
}

/// Sent back by the daemon (one JSON object per line)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ControlResponse {
    Complete,
    Status(StatusReport),
    /// Pushed whenever the service starts or stops, not a reply to any request
    StateChanged(bool),
    Error(String),
}

impl From<SimError> for ControlResponse {
    fn from(value: SimError) -> Self {
        ControlResponse::Error(value.to_string())
    }
}

impl From<anyhow::Error> for ControlResponse {
    fn from(value: anyhow::Error) -> Self {
        ControlResponse::Error(format!("{value:#}"))
    }
}

impl From<StatusReport> for ControlResponse {
    fn from(val: StatusReport) -> Self {
        ControlResponse::Status(val)
    }
}

/// Encode a message as a single line of JSON
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let mut encoded = serde_json::to_vec(msg).context("Failed to encode")?;
    encoded.push(b'\n');
    Ok(encoded)
}
