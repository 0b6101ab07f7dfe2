use std::{sync::Arc, time::Duration};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::SimError,
    reporting::{ReportingLoop, ReportingSink},
    sim_state::SimulationState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServicePhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Receives service state transitions
pub trait StateListener: Send + Sync + 'static {
    /// The "running" flag changed
    fn state_changed(&self, running: bool);

    /// The service hit an error it can't recover from (see [SimError::is_fatal]), the owning
    /// process should exit.
    fn fatal(&self, _why: &SimError) {}
}

struct Shared<L: StateListener> {
    state: Arc<SimulationState>,
    phase: RwLock<ServicePhase>,
    listener: L,
}

impl<L: StateListener> Shared<L> {
    /// Wind down after the loop exits (or failed to start), the provider is already cleaned up
    /// at this point.
    async fn finish(&self, res: Result<(), SimError>) {
        self.state.reset();
        *self.phase.write().await = ServicePhase::Stopped;
        self.listener.state_changed(false);

        if let Err(why) = res {
            if why.is_fatal() {
                error!("Stopping service: {why}");
                self.listener.fatal(&why);
            } else {
                error!("Service stopped with error: {why}");
            }
        }
    }
}

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the reporting loop and tracks whether a simulation is running
pub struct ServiceStateMachine<L: StateListener> {
    shared: Arc<Shared<L>>,
    interval: Duration,
    reporting: Mutex<Option<LoopHandle>>,
}

impl<L: StateListener> ServiceStateMachine<L> {
    pub fn new(state: Arc<SimulationState>, listener: L, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state,
                phase: RwLock::new(ServicePhase::Stopped),
                listener,
            }),
            interval,
            reporting: Mutex::new(None),
        }
    }

    /// Get a handle to the simulation state for updating positions
    pub fn state(&self) -> Arc<SimulationState> {
        self.shared.state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.is_running()
    }

    pub async fn phase(&self) -> ServicePhase {
        *self.shared.phase.read().await
    }

    /// Start reporting to `sink`. Does nothing if the service isn't stopped.
    pub async fn on_start<S: ReportingSink>(&self, sink: S) -> Result<(), SimError> {
        let mut reporting = self.reporting.lock().await;

        {
            let mut phase = self.shared.phase.write().await;
            if *phase != ServicePhase::Stopped {
                warn!("Service is {:?}, ignoring start", *phase);
                return Ok(());
            }
            *phase = ServicePhase::Starting;
        }

        // A loop that died on its own leaves its handle behind
        if let Some(old) = reporting.take() {
            old.task.await.ok();
        }

        let mut reporting_loop = ReportingLoop::new(sink, self.shared.state.clone(), self.interval);

        if let Err(why) = reporting_loop.start().await {
            self.shared.finish(Err(why.clone())).await;
            return Err(why);
        }

        self.shared.state.set_running(true);
        *self.shared.phase.write().await = ServicePhase::Running;
        self.shared.listener.state_changed(true);
        info!("Service running");

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let shared = self.shared.clone();
            let cancel = cancel.clone();
            async move {
                let res = reporting_loop.run(cancel).await;
                shared.finish(res).await;
            }
        });

        *reporting = Some(LoopHandle { cancel, task });

        Ok(())
    }

    /// Stop reporting, returns once the provider is cleaned up and listeners were notified.
    pub async fn on_stop(&self) {
        let mut reporting = self.reporting.lock().await;

        {
            let mut phase = self.shared.phase.write().await;
            if *phase != ServicePhase::Running {
                warn!("Service is {:?}, ignoring stop", *phase);
                return;
            }
            *phase = ServicePhase::Stopping;
        }

        if let Some(handle) = reporting.take() {
            handle.cancel.cancel();
            if let Err(why) = handle.task.await {
                error!("Reporting task failed: {why:?}");
            }
        }

        info!("Service stopped");
    }
}
