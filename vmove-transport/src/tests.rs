use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{io::DuplexStream, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use vmove_logic::{
    Fix, GeoPoint, MockLocationRegistry, ProviderProperties, ReportingSink, ServiceStateMachine,
    SimError, SimulationSettings, SimulationState, StateListener, correct, prelude::*,
};

use crate::{ProviderHost, ProviderRequest, ProviderResponse, RemoteSink, read_frame, write_frame};

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Add,
    Enable(bool),
    Push(GeoPoint),
    Remove,
    StateChanged(bool),
    Fatal,
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Seen>>,
    denied: AtomicBool,
}

impl Recorder {
    fn record(&self, seen: Seen) {
        self.seen.lock().unwrap().push(seen);
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn pushes(&self) -> Vec<GeoPoint> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Push(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn check(&self, name: &str) -> Result<(), SimError> {
        if self.denied.load(Ordering::SeqCst) {
            Err(SimError::Unauthorized(name.to_string()))
        } else {
            Ok(())
        }
    }
}

impl MockLocationRegistry for Recorder {
    fn add_test_provider(&self, _name: &str, _properties: ProviderProperties) -> Result<(), SimError> {
        self.record(Seen::Add);
        Ok(())
    }

    fn set_test_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), SimError> {
        self.record(Seen::Enable(enabled));
        if enabled { self.check(name) } else { Ok(()) }
    }

    fn set_test_provider_location(&self, name: &str, fix: &Fix) -> Result<(), SimError> {
        self.check(name)?;
        self.record(Seen::Push(fix.position));
        Ok(())
    }

    fn remove_test_provider(&self, _name: &str) -> Result<(), SimError> {
        self.record(Seen::Remove);
        Ok(())
    }
}

struct Listener(Arc<Recorder>);

impl StateListener for Listener {
    fn state_changed(&self, running: bool) {
        self.0.record(Seen::StateChanged(running));
    }

    fn fatal(&self, _why: &SimError) {
        self.0.record(Seen::Fatal);
    }
}

type HostTask = JoinHandle<Result>;

fn spawn_host(recorder: &Arc<Recorder>) -> (RemoteSink<DuplexStream>, HostTask) {
    let (client, server) = tokio::io::duplex(1024);
    let host = ProviderHost::new(recorder.clone(), SimulationSettings::default());
    let task = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        host.serve_connection(server, &cancel).await
    });
    (RemoteSink::new(client), task)
}

fn beijing() -> GeoPoint {
    GeoPoint::new(39.904989, 116.405285).unwrap()
}

#[tokio::test]
async fn test_host_corrects_forwarded_positions() {
    let recorder = Arc::new(Recorder::default());
    let (mut sink, host) = spawn_host(&recorder);

    sink.start().await.unwrap();
    sink.report(beijing()).await.unwrap();
    sink.stop().await;

    host.await.unwrap().unwrap();

    assert_eq!(
        recorder.seen(),
        vec![
            Seen::Add,
            Seen::Enable(true),
            Seen::Push(correct(beijing())),
            Seen::Enable(false),
            Seen::Remove,
        ]
    );
}

#[tokio::test]
async fn test_unauthorized_crosses_the_boundary() {
    let recorder = Arc::new(Recorder::default());
    recorder.denied.store(true, Ordering::SeqCst);
    let (mut sink, host) = spawn_host(&recorder);

    let err = sink.start().await.unwrap_err();
    assert_eq!(err, SimError::Unauthorized("gps".into()));

    drop(sink);
    host.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_report_before_start_is_rejected() {
    let recorder = Arc::new(Recorder::default());
    let (mut sink, host) = spawn_host(&recorder);

    let err = sink.report(beijing()).await.unwrap_err();
    assert!(matches!(err, SimError::Host(_)));
    assert!(recorder.pushes().is_empty());

    drop(sink);
    host.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_host_cleans_up_on_hangup() {
    let recorder = Arc::new(Recorder::default());
    let (mut sink, host) = spawn_host(&recorder);

    sink.start().await.unwrap();
    drop(sink);
    host.await.unwrap().unwrap();

    assert_eq!(recorder.seen().last(), Some(&Seen::Remove));
}

#[tokio::test]
async fn test_dead_host_is_a_transport_error() {
    let (client, server) = tokio::io::duplex(64);
    drop(server);
    let mut sink = RemoteSink::new(client);

    let err = sink.start().await.unwrap_err();
    assert!(matches!(err, SimError::Transport(_)));
    assert!(!err.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_is_never_taken_for_the_next_one() {
    let (client, mut server) = tokio::io::duplex(1024);

    // Answers the first report after the sink gave up on it, then refuses everything
    let host = tokio::spawn(async move {
        let mut reports = 0;
        while let Ok(Some(req)) = read_frame::<_, ProviderRequest>(&mut server).await {
            let resp = match req {
                ProviderRequest::Start => ProviderResponse::Ok,
                ProviderRequest::Report(_) if reports == 0 => {
                    reports += 1;
                    tokio::time::sleep(Duration::from_secs(6)).await;
                    ProviderResponse::Ok
                }
                _ => ProviderResponse::Err(SimError::Unauthorized("gps".into())),
            };
            if write_frame(&mut server, &resp).await.is_err() {
                break;
            }
        }
    });

    let mut sink = RemoteSink::new(client);
    sink.start().await.unwrap();

    let first = sink.report(beijing()).await;
    assert!(matches!(first, Err(SimError::Transport(_))), "{first:?}");
    assert!(!sink.is_connected());

    // The late Ok must not show up here
    let second = sink.report(beijing()).await;
    assert!(matches!(second, Err(SimError::Transport(_))), "{second:?}");

    sink.stop().await;
    drop(sink);
    host.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_delegated_service() {
    let recorder = Arc::new(Recorder::default());
    let (sink, host) = spawn_host(&recorder);

    let state = Arc::new(SimulationState::default());
    let service = ServiceStateMachine::new(
        state.clone(),
        Listener(recorder.clone()),
        Duration::from_millis(1000),
    );

    state
        .set_current_position(beijing().lat(), beijing().lng())
        .unwrap();
    service.on_start(sink).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    service.on_stop().await;
    host.await.unwrap().unwrap();

    assert_eq!(recorder.pushes(), vec![correct(beijing()); 3]);

    let seen = recorder.seen();
    let n = seen.len();
    assert_eq!(
        &seen[n - 3..],
        &[Seen::Enable(false), Seen::Remove, Seen::StateChanged(false)]
    );
    assert!(!seen.contains(&Seen::Fatal));
}

#[tokio::test(start_paused = true)]
async fn test_delegated_unauthorized_stops_service() {
    let recorder = Arc::new(Recorder::default());
    let (sink, host) = spawn_host(&recorder);

    let state = Arc::new(SimulationState::default());
    let service = ServiceStateMachine::new(
        state.clone(),
        Listener(recorder.clone()),
        Duration::from_millis(1000),
    );

    state
        .set_current_position(beijing().lat(), beijing().lng())
        .unwrap();
    service.on_start(sink).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    recorder.denied.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(!service.is_running());
    assert_eq!(recorder.seen().last(), Some(&Seen::Fatal));
    host.await.unwrap().unwrap();
}
