use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{error::SimError, geo::GeoPoint};

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerRequirement {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccuracyClass {
    Fine,
    Coarse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Quality attributes a provider is registered with
pub struct ProviderProperties {
    pub requires_network: bool,
    pub requires_satellite: bool,
    pub requires_cell: bool,
    pub has_monetary_cost: bool,
    pub supports_altitude: bool,
    pub supports_speed: bool,
    pub supports_bearing: bool,
    pub power: PowerRequirement,
    pub accuracy: AccuracyClass,
}

impl ProviderProperties {
    /// What the synthetic GPS source advertises, low power and fine accuracy without any special
    /// requirements
    pub const MOCK_GPS: Self = Self {
        requires_network: false,
        requires_satellite: false,
        requires_cell: false,
        has_monetary_cost: false,
        supports_altitude: true,
        supports_speed: true,
        supports_bearing: true,
        power: PowerRequirement::Low,
        accuracy: AccuracyClass::Fine,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// A single position update for the host
pub struct Fix {
    pub position: GeoPoint,
    /// Horizontal accuracy radius in meters
    pub accuracy_m: f32,
    pub altitude_m: f64,
    /// Wall clock time of the fix
    pub time: UtcDT,
    /// Monotonic timestamp of the fix
    pub elapsed_realtime_nanos: u64,
}

/// The host platform's registry of synthetic location sources, keyed by provider name.
///
/// Implementations report a duplicate registration as [SimError::AlreadyRegistered] and a missing
/// mock location authorization as [SimError::Unauthorized].
pub trait MockLocationRegistry: Send + Sync {
    fn add_test_provider(&self, name: &str, properties: ProviderProperties) -> Result<(), SimError>;
    fn set_test_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), SimError>;
    fn set_test_provider_location(&self, name: &str, fix: &Fix) -> Result<(), SimError>;
    fn remove_test_provider(&self, name: &str) -> Result<(), SimError>;
}

impl<R: MockLocationRegistry + ?Sized> MockLocationRegistry for Arc<R> {
    fn add_test_provider(&self, name: &str, properties: ProviderProperties) -> Result<(), SimError> {
        (**self).add_test_provider(name, properties)
    }

    fn set_test_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), SimError> {
        (**self).set_test_provider_enabled(name, enabled)
    }

    fn set_test_provider_location(&self, name: &str, fix: &Fix) -> Result<(), SimError> {
        (**self).set_test_provider_location(name, fix)
    }

    fn remove_test_provider(&self, name: &str) -> Result<(), SimError> {
        (**self).remove_test_provider(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderState {
    Unregistered,
    Enabled,
    Disabled,
    Removed,
}

/// One synthetic source registered with the host, from registration to removal
pub struct MockProviderLifecycle<R: MockLocationRegistry> {
    name: String,
    registry: R,
    state: ProviderState,
}

impl<R: MockLocationRegistry> MockProviderLifecycle<R> {
    pub fn new(name: impl Into<String>, registry: R) -> Self {
        Self {
            name: name.into(),
            registry,
            state: ProviderState::Unregistered,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    /// Register and enable the provider. A leftover registration is fine, a missing
    /// authorization is not.
    pub fn start(&mut self) -> Result<(), SimError> {
        match self
            .registry
            .add_test_provider(&self.name, ProviderProperties::MOCK_GPS)
        {
            Ok(()) => {}
            Err(SimError::AlreadyRegistered(_)) => {
                warn!("Mock provider {} already exists", self.name);
            }
            Err(why) => return Err(why),
        }

        self.registry.set_test_provider_enabled(&self.name, true)?;
        self.state = ProviderState::Enabled;
        info!("Mock provider {} enabled", self.name);
        Ok(())
    }

    pub fn push(&self, fix: &Fix) -> Result<(), SimError> {
        debug_assert_eq!(
            self.state,
            ProviderState::Enabled,
            "Pushed a fix to a provider that isn't enabled"
        );

        if self.state != ProviderState::Enabled {
            error!(
                "Dropping fix for provider {} in state {:?}",
                self.name, self.state
            );
            return Err(SimError::Host(format!("Provider {} is not enabled", self.name)));
        }

        self.registry.set_test_provider_location(&self.name, fix)
    }

    /// Disable and remove the provider, failures are only logged
    pub fn stop(&mut self) {
        if matches!(
            self.state,
            ProviderState::Unregistered | ProviderState::Removed
        ) {
            return;
        }

        if let Err(why) = self.registry.set_test_provider_enabled(&self.name, false) {
            warn!("{}", self.cleanup_failure(why));
        }
        self.state = ProviderState::Disabled;

        if let Err(why) = self.registry.remove_test_provider(&self.name) {
            warn!("{}", self.cleanup_failure(why));
        }
        self.state = ProviderState::Removed;
        info!("Mock provider {} disabled", self.name);
    }

    fn cleanup_failure(&self, why: SimError) -> SimError {
        SimError::CleanupFailure {
            provider: self.name.clone(),
            reason: why.to_string(),
        }
    }
}
