use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{debug, info};
use vmove_logic::{Fix, MockLocationRegistry, ProviderProperties, SimError};

/// Stand-in for the platform's location manager when running on a desktop host.
///
/// Keeps track of registered providers and logs every fix it's given.
pub struct LoggingRegistry {
    providers: Mutex<HashMap<String, bool>>,
    allow_mock_locations: AtomicBool,
}

impl LoggingRegistry {
    pub fn new(allow_mock_locations: bool) -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
            allow_mock_locations: AtomicBool::new(allow_mock_locations),
        }
    }

    /// Simulate the user granting or revoking the mock location permission
    pub fn set_allow_mock_locations(&self, allow: bool) {
        self.allow_mock_locations.store(allow, Ordering::Release);
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.providers().get(name).copied().unwrap_or(false)
    }

    fn providers(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_allowed(&self, name: &str) -> Result<(), SimError> {
        if self.allow_mock_locations.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SimError::Unauthorized(name.to_string()))
        }
    }

    fn unknown(name: &str) -> SimError {
        SimError::Host(format!("No provider named {name}"))
    }
}

impl MockLocationRegistry for LoggingRegistry {
    fn add_test_provider(&self, name: &str, properties: ProviderProperties) -> Result<(), SimError> {
        let mut providers = self.providers();
        if providers.contains_key(name) {
            return Err(SimError::AlreadyRegistered(name.to_string()));
        }
        debug!("Registering {name} with {properties:?}");
        providers.insert(name.to_string(), false);
        Ok(())
    }

    fn set_test_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), SimError> {
        if enabled {
            self.check_allowed(name)?;
        }
        let mut providers = self.providers();
        let slot = providers.get_mut(name).ok_or_else(|| Self::unknown(name))?;
        *slot = enabled;
        info!("Provider {name} enabled: {enabled}");
        Ok(())
    }

    fn set_test_provider_location(&self, name: &str, fix: &Fix) -> Result<(), SimError> {
        self.check_allowed(name)?;
        match self.providers().get(name) {
            Some(true) => {}
            Some(false) => return Err(SimError::Host(format!("Provider {name} is disabled"))),
            None => return Err(Self::unknown(name)),
        }
        info!(
            "[{name}] {} acc={}m alt={}m at {}",
            fix.position,
            fix.accuracy_m,
            fix.altitude_m,
            fix.time.to_rfc3339()
        );
        Ok(())
    }

    fn remove_test_provider(&self, name: &str) -> Result<(), SimError> {
        self.providers()
            .remove(name)
            .map(|_| debug!("Removed provider {name}"))
            .ok_or_else(|| Self::unknown(name))
    }
}
