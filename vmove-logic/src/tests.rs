use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::DateTime;

use crate::{
    SimError, StateListener,
    geo::GeoPoint,
    provider::{Fix, MockLocationRegistry, ProviderProperties},
};

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryCall {
    Add(String),
    Enable(String, bool),
    Push(Fix),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Registry(RegistryCall),
    StateChanged(bool),
    Fatal(SimError),
}

/// Ordered record of everything the registry and listener saw
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Registry(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn pushes(&self) -> Vec<Fix> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RegistryCall::Push(fix) => Some(fix),
                _ => None,
            })
            .collect()
    }
}

pub struct MockRegistry {
    pub log: EventLog,
    providers: Mutex<HashSet<String>>,
    allow_mock: AtomicBool,
    cleanup_fails: AtomicBool,
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Self::with_log(EventLog::default())
    }

    pub fn with_log(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            providers: Mutex::new(HashSet::new()),
            allow_mock: AtomicBool::new(true),
            cleanup_fails: AtomicBool::new(false),
        })
    }

    pub fn preregister(&self, name: &str) {
        self.providers.lock().unwrap().insert(name.to_string());
    }

    pub fn deny_mock_locations(&self) {
        self.allow_mock.store(false, Ordering::SeqCst);
    }

    pub fn allow_mock_locations(&self) {
        self.allow_mock.store(true, Ordering::SeqCst);
    }

    pub fn fail_cleanup(&self) {
        self.cleanup_fails.store(true, Ordering::SeqCst);
    }

    fn check_allowed(&self, name: &str) -> Result<(), SimError> {
        if self.allow_mock.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SimError::Unauthorized(name.to_string()))
        }
    }

    fn check_cleanup(&self) -> Result<(), SimError> {
        if self.cleanup_fails.load(Ordering::SeqCst) {
            Err(SimError::Host("cleanup refused".into()))
        } else {
            Ok(())
        }
    }
}

impl MockLocationRegistry for MockRegistry {
    fn add_test_provider(&self, name: &str, _properties: ProviderProperties) -> Result<(), SimError> {
        self.log.push(Event::Registry(RegistryCall::Add(name.into())));
        if self.providers.lock().unwrap().insert(name.to_string()) {
            Ok(())
        } else {
            Err(SimError::AlreadyRegistered(name.to_string()))
        }
    }

    fn set_test_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), SimError> {
        self.log
            .push(Event::Registry(RegistryCall::Enable(name.into(), enabled)));
        if enabled {
            self.check_allowed(name)
        } else {
            self.check_cleanup()
        }
    }

    fn set_test_provider_location(&self, name: &str, fix: &Fix) -> Result<(), SimError> {
        self.check_allowed(name)?;
        self.log.push(Event::Registry(RegistryCall::Push(*fix)));
        Ok(())
    }

    fn remove_test_provider(&self, name: &str) -> Result<(), SimError> {
        self.log.push(Event::Registry(RegistryCall::Remove(name.into())));
        self.check_cleanup()?;
        self.providers.lock().unwrap().remove(name);
        Ok(())
    }
}

pub struct RecordingListener(EventLog);

impl RecordingListener {
    pub fn new(log: EventLog) -> Self {
        Self(log)
    }
}

impl StateListener for RecordingListener {
    fn state_changed(&self, running: bool) {
        self.0.push(Event::StateChanged(running));
    }

    fn fatal(&self, why: &SimError) {
        self.0.push(Event::Fatal(why.clone()));
    }
}

pub fn sample_fix() -> Fix {
    Fix {
        position: GeoPoint::new(1.0, 2.0).unwrap(),
        accuracy_m: 1.0,
        altitude_m: 30.0,
        time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        elapsed_realtime_nanos: 42,
    }
}
