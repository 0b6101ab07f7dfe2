use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong while simulating and reporting positions.
///
/// Only [SimError::Unauthorized] is terminal, everything else is handled where it happens.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum SimError {
    /// The host won't let us inject locations, the user has to allow mock locations for us
    /// before this can succeed so it's never retried
    #[error("Mock locations are not allowed for provider \"{0}\", please enable mock location")]
    Unauthorized(String),
    /// A provider with this name is already registered with the host
    #[error("Mock provider \"{0}\" already exists")]
    AlreadyRegistered(String),
    /// Disabling or removing the provider failed while shutting down
    #[error("Failed to clean up mock provider \"{provider}\": {reason}")]
    CleanupFailure { provider: String, reason: String },
    /// A position outside of the valid lat/lng range
    #[error("Invalid position ({lat}, {lng})")]
    InvalidArgument { lat: f64, lng: f64 },
    /// Any other failure reported by the host location service
    #[error("Host location service error: {0}")]
    Host(String),
    /// The boundary to a delegated provider host failed
    #[error("Provider transport error: {0}")]
    Transport(String),
}

impl SimError {
    /// Whether this error must stop the service instead of being logged and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
