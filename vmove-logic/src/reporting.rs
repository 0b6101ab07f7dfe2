use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::{info, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::SimError,
    geo::{GeoPoint, to_offset_frame},
    provider::{Fix, MockLocationRegistry, MockProviderLifecycle},
    settings::SimulationSettings,
    sim_state::SimulationState,
};

/// Somewhere the reporting loop can send positions to.
///
/// Positions are handed over uncorrected, converting them to the offset frame is up to the sink
/// (or whoever is on the other end of it).
pub trait ReportingSink: Send + 'static {
    /// Get the sink ready to receive positions, registering any providers needed
    fn start(&mut self) -> impl Future<Output = Result<(), SimError>> + Send;
    /// Report a single position
    fn report(&mut self, position: GeoPoint) -> impl Future<Output = Result<(), SimError>> + Send;
    /// Tear the sink down, this is best-effort and never fails
    fn stop(&mut self) -> impl Future<Output = ()> + Send;
}

/// Pushes positions straight into a mock provider in this process
pub struct DirectSink<R: MockLocationRegistry> {
    provider: MockProviderLifecycle<R>,
    accuracy_m: f32,
    altitude_m: f64,
    clock_origin: Instant,
}

impl<R: MockLocationRegistry> DirectSink<R> {
    pub fn new(registry: R, settings: &SimulationSettings) -> Self {
        Self {
            provider: MockProviderLifecycle::new(settings.provider_name.clone(), registry),
            accuracy_m: settings.accuracy_m,
            altitude_m: settings.altitude_m,
            clock_origin: Instant::now(),
        }
    }

    pub fn provider(&self) -> &MockProviderLifecycle<R> {
        &self.provider
    }

    fn make_fix(&self, position: GeoPoint) -> Fix {
        Fix {
            position: to_offset_frame(position),
            accuracy_m: self.accuracy_m,
            altitude_m: self.altitude_m,
            time: Utc::now(),
            elapsed_realtime_nanos: self.clock_origin.elapsed().as_nanos() as u64,
        }
    }
}

impl<R: MockLocationRegistry + 'static> ReportingSink for DirectSink<R> {
    async fn start(&mut self) -> Result<(), SimError> {
        self.provider.start()
    }

    async fn report(&mut self, position: GeoPoint) -> Result<(), SimError> {
        let fix = self.make_fix(position);
        self.provider.push(&fix)
    }

    async fn stop(&mut self) {
        self.provider.stop();
    }
}

/// Periodic task that reports the current position to a [ReportingSink].
///
/// Owns the sink exclusively, nothing else may talk to it while the loop exists.
pub struct ReportingLoop<S: ReportingSink> {
    sink: S,
    state: Arc<SimulationState>,
    interval: Duration,
}

impl<S: ReportingSink> ReportingLoop<S> {
    pub fn new(sink: S, state: Arc<SimulationState>, interval: Duration) -> Self {
        Self {
            sink,
            state,
            interval,
        }
    }

    pub async fn start(&mut self) -> Result<(), SimError> {
        self.sink.start().await
    }

    async fn tick(&mut self) -> Result<(), SimError> {
        if !self.state.is_running() {
            return Ok(());
        }

        match self.state.current_position() {
            Some(position) => self.sink.report(position).await,
            None => Ok(()),
        }
    }

    /// Main loop, ticks until `cancel` fires or the sink reports a fatal error.
    /// The sink is always stopped before this returns.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SimError> {
        let res = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }

            if let Err(why) = self.tick().await {
                if why.is_fatal() {
                    break Err(why);
                }
                warn!("Failed to report position: {why}");
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break Ok(());
                }

                _ = tokio::time::sleep(self.interval) => {}
            }
        };

        self.sink.stop().await;
        info!("Reporting loop stopped");

        res
    }
}
