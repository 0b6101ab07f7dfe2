use std::sync::{Arc, OnceLock};

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vmove_logic::{
    DirectSink, MovementDriver, ReportingMode, ServiceStateMachine, SimError, SimulationSettings,
    SimulationState, StateListener,
};
use vmove_transport::RemoteSink;

use crate::{ControlRequest, ControlResponse, StatusReport, registry::LoggingRegistry, store::LastPointStore};

/// Forwards service transitions to whoever is connected to the daemon
pub struct ControllerListener {
    responses: mpsc::Sender<ControlResponse>,
    shutdown: CancellationToken,
    fatal: Arc<OnceLock<SimError>>,
}

impl StateListener for ControllerListener {
    fn state_changed(&self, running: bool) {
        if let Err(why) = self.responses.try_send(ControlResponse::StateChanged(running)) {
            warn!("Dropped state change notification: {why}");
        }
    }

    fn fatal(&self, why: &SimError) {
        self.fatal.set(why.clone()).ok();
        self.shutdown.cancel();
    }
}

/// Everything the daemon does in response to control requests, independent of the socket it
/// takes them from.
pub struct Controller {
    service: ServiceStateMachine<ControllerListener>,
    settings: SimulationSettings,
    registry: Arc<LoggingRegistry>,
    store: LastPointStore,
    shutdown: CancellationToken,
    fatal: Arc<OnceLock<SimError>>,
}

impl Controller {
    /// Create a new controller, this spawns the movement animation so it must be called from
    /// within a tokio runtime.
    pub fn new(
        settings: SimulationSettings,
        registry: Arc<LoggingRegistry>,
        store: LastPointStore,
        responses: mpsc::Sender<ControlResponse>,
        shutdown: CancellationToken,
    ) -> Self {
        let state = Arc::new(SimulationState::default());
        let fatal = Arc::new(OnceLock::new());

        let listener = ControllerListener {
            responses,
            shutdown: shutdown.clone(),
            fatal: fatal.clone(),
        };

        let service = ServiceStateMachine::new(state.clone(), listener, settings.tick_interval());

        let driver = MovementDriver::new(state, settings.speed_kmh, settings.animation_interval());
        tokio::spawn(driver.run(shutdown.child_token()));

        Self {
            service,
            settings,
            registry,
            store,
            shutdown,
            fatal,
        }
    }

    pub fn state(&self) -> Arc<SimulationState> {
        self.service.state()
    }

    /// Fires when the daemon should exit
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The error that stopped the service for good, if any
    pub fn fatal_error(&self) -> Option<SimError> {
        self.fatal.get().cloned()
    }

    pub async fn status(&self) -> StatusReport {
        let state = self.state();
        StatusReport {
            running: state.is_running(),
            phase: self.service.phase().await,
            current_position: state.current_position(),
            destination: state.destination(),
        }
    }

    fn save_position(&self) {
        if let Some(point) = self.state().current_position() {
            if let Err(why) = self.store.save(point) {
                warn!("Couldn't save last point: {why:#}");
            }
        }
    }

    /// Start reporting, resuming from the last saved point if no position was set
    pub async fn start(&self) -> Result<(), SimError> {
        let state = self.state();
        if state.current_position().is_none() {
            let point = self.store.load();
            info!("Resuming from {point}");
            state.set_current_position(point.lat(), point.lng())?;
        }

        match &self.settings.mode {
            ReportingMode::Direct => {
                let sink = DirectSink::new(self.registry.clone(), &self.settings);
                self.service.on_start(sink).await
            }
            ReportingMode::Delegated { socket } => {
                let sink = RemoteSink::connect(socket)
                    .await
                    .map_err(|why| SimError::Transport(format!("{why:#}")))?;
                self.service.on_start(sink).await
            }
        }
    }

    /// Remember where we are and stop reporting
    pub async fn stop(&self) {
        self.save_position();
        self.service.on_stop().await;
    }

    pub async fn process_req(&self, req: ControlRequest) -> ControlResponse {
        let res = match req {
            ControlRequest::SetCurrentPosition { lat, lng } => self
                .state()
                .set_current_position(lat, lng)
                .map(|point| {
                    if let Err(why) = self.store.save(point) {
                        warn!("Couldn't save last point: {why:#}");
                    }
                }),
            ControlRequest::SetDestination { lat, lng } => {
                self.state().set_destination(lat, lng).map(|_| ())
            }
            ControlRequest::Start => self.start().await,
            ControlRequest::Stop => {
                self.stop().await;
                Ok(())
            }
            ControlRequest::Status => return self.status().await.into(),
            ControlRequest::Shutdown => {
                self.stop().await;
                self.shutdown.cancel();
                Ok(())
            }
        };

        match res {
            Ok(()) => ControlResponse::Complete,
            Err(why) => why.into(),
        }
    }

    /// Handle a request, the state changes it caused come first and the reply comes last.
    /// `events` is the receiving end of the channel given to [Controller::new].
    pub async fn respond(
        &self,
        req: ControlRequest,
        events: &mut mpsc::Receiver<ControlResponse>,
    ) -> Vec<ControlResponse> {
        let reply = self.process_req(req).await;
        let mut out = drain_events(events);
        out.push(reply);
        out
    }
}

/// Take every event queued so far without waiting
pub fn drain_events(events: &mut mpsc::Receiver<ControlResponse>) -> Vec<ControlResponse> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}
