//! End-to-end lifecycle scenarios against a scripted server.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use steward_core::dispatch::{CallbackManager, ControllerEvent, DispatchError, EventDispatcher};
use steward_core::testing::{Reply, ScriptedServer};
use steward_core::{
    ConnectionSession, Controller, ControllerConfig, RemoteCallback, SessionState, ShutdownHandle,
    ShutdownReason,
};
use tokio::time::Instant;
use tracing::subscriber::DefaultGuard;

/// Collects formatted log output of the current thread.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Routes INFO and above into this buffer until the guard drops.
    /// Tokio tests run on one thread, so spawned tasks are captured too.
    fn install(&self) -> DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn lines_matching(&self, level: &str, needle: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains(level) && line.contains(needle))
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Records tick start times and controller events, and optionally asks
/// for a shutdown after a number of ticks.
#[derive(Clone, Default)]
struct Recorder {
    ticks: Arc<Mutex<Vec<Instant>>>,
    events: Arc<Mutex<Vec<ControllerEvent>>>,
}

struct RecordingDispatcher {
    recorder: Recorder,
    work: Duration,
    stop: Option<(usize, ShutdownHandle, Option<String>)>,
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn process_due_events(
        &mut self,
        _session: &mut ConnectionSession,
    ) -> Result<(), DispatchError> {
        let count = {
            let mut ticks = self.recorder.ticks.lock().unwrap();
            ticks.push(Instant::now());
            ticks.len()
        };
        tokio::time::sleep(self.work).await;
        if let Some((after, handle, message)) = &self.stop {
            if count >= *after {
                handle.request_shutdown(message.clone());
            }
        }
        Ok(())
    }

    async fn notify(&mut self, event: ControllerEvent) {
        self.recorder.events.lock().unwrap().push(event);
    }
}

fn controller_with(
    server: &ScriptedServer,
    work: Duration,
    stop_after: usize,
    message: Option<&str>,
) -> (Controller, Recorder) {
    let recorder = Recorder::default();
    let handle = ShutdownHandle::new();
    let dispatcher = RecordingDispatcher {
        recorder: recorder.clone(),
        work,
        stop: Some((stop_after, handle.clone(), message.map(str::to_string))),
    };
    let controller = Controller::new(ControllerConfig::default(), server.connector(), dispatcher);

    // Forward the dispatcher's handle to the controller's.
    let controller_handle = controller.shutdown_handle();
    tokio::spawn(async move {
        handle.requested().await;
        controller_handle.request_shutdown(handle.message());
    });

    (controller, recorder)
}

fn intervals(ticks: &[Instant]) -> Vec<Duration> {
    ticks.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn clean_run_with_operator_message() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let server = ScriptedServer::new();
    let mut controller = Controller::new(
        ControllerConfig::default(),
        server.connector(),
        CallbackManager::new(),
    );

    let handle = controller.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.request_shutdown(Some("maintenance".to_string()));
    });

    let reason = controller.start().await;

    assert_eq!(reason, ShutdownReason::OperatorRequested);
    assert_eq!(reason.exit_code(), 0);
    assert_eq!(server.terminations(), 1);

    let calls = server.calls();
    let announcements: Vec<_> = calls
        .iter()
        .filter(|call| call.method == "ChatSendServerMessage")
        .collect();
    assert_eq!(announcements.len(), 2);
    assert!(announcements[0].params[0]
        .as_str()
        .unwrap()
        .contains("successfully started!"));
    assert_eq!(
        announcements[1].params,
        vec![json!("$<$z$ff0» $fffSteward shutting down.$>")]
    );
    assert_eq!(
        calls.last().map(|call| call.method.as_str()),
        Some("SendHideManialinkPage")
    );

    let logged = logs.lines_matching("INFO", "maintenance");
    assert_eq!(logged.len(), 1, "{logged:?}");
    assert!(logged[0].trim_end().ends_with("maintenance"));
    assert_eq!(logs.lines_matching("INFO", "Quitting Steward!").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn successful_bootstrap_visits_every_state_in_order() {
    let server = ScriptedServer::new();
    let (mut controller, recorder) = controller_with(&server, Duration::ZERO, 1, None);

    controller.start().await;

    assert_eq!(
        controller.session().history(),
        &[
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Authenticated,
            SessionState::CallbacksEnabled,
            SessionState::Ready,
            SessionState::Terminated,
        ]
    );
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![ControllerEvent::Init, ControllerEvent::Shutdown]
    );
}

#[tokio::test(start_paused = true)]
async fn bad_credentials_never_enter_the_loop() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let server = ScriptedServer::new().fail("Authenticate", "E_AUTH", "Bad credentials");
    let (mut controller, recorder) = controller_with(&server, Duration::ZERO, 1, None);

    let reason = controller.start().await;

    assert_eq!(reason, ShutdownReason::BootstrapFailure);
    assert_eq!(reason.exit_code(), 1);
    assert!(recorder.ticks.lock().unwrap().is_empty());
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![ControllerEvent::Shutdown]
    );
    assert_eq!(server.terminations(), 1);
    assert_eq!(server.call_count("EnableCallbacks"), 0);
    assert_eq!(server.call_count("SendHideManialinkPage"), 1);

    let fatal = logs.lines_matching("ERROR", "E_AUTH");
    assert_eq!(fatal.len(), 1, "{fatal:?}");
    assert!(fatal[0].contains("authenticate"));
    // Reported once, by the failing step.
    assert_eq!(
        logs.lines()
            .iter()
            .filter(|line| line.contains("Bad credentials"))
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn unreachable_server_skips_remote_shutdown_steps() {
    let server = ScriptedServer::new().refuse_connections("Connection refused");
    let (mut controller, recorder) = controller_with(&server, Duration::ZERO, 1, None);

    let reason = controller.start().await;

    assert_eq!(reason, ShutdownReason::BootstrapFailure);
    assert!(recorder.ticks.lock().unwrap().is_empty());
    assert!(server.calls().is_empty());
    assert_eq!(server.terminations(), 0);
    assert!(controller.session().is_terminated());
}

#[tokio::test(start_paused = true)]
async fn rejected_api_version_keeps_running() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let server = ScriptedServer::new().fail("SetApiVersion", "-1000", "Unknown version");
    let (mut controller, recorder) = controller_with(&server, Duration::ZERO, 3, None);

    let reason = controller.start().await;

    assert_eq!(reason, ShutdownReason::OperatorRequested);
    assert!(controller
        .session()
        .history()
        .contains(&SessionState::Ready));
    assert!(!controller.session().api_version_accepted());
    assert_eq!(recorder.ticks.lock().unwrap().len(), 3);

    let warned = logs.lines_matching("WARN", "Couldn't set API version");
    assert_eq!(warned.len(), 1, "{warned:?}");
    assert!(warned[0].contains("-1000"));
}

#[tokio::test(start_paused = true)]
async fn fast_ticks_are_spaced_one_period_apart() {
    let server = ScriptedServer::new();
    let (mut controller, recorder) =
        controller_with(&server, Duration::from_millis(100), 5, None);

    controller.start().await;

    let ticks = recorder.ticks.lock().unwrap();
    assert!(ticks.len() >= 5);
    for interval in intervals(&ticks[..5]) {
        assert_eq!(interval, Duration::from_millis(300));
    }
}

#[tokio::test(start_paused = true)]
async fn slow_ticks_do_not_sleep() {
    let server = ScriptedServer::new();
    let (mut controller, recorder) =
        controller_with(&server, Duration::from_millis(500), 3, None);

    controller.start().await;

    let ticks = recorder.ticks.lock().unwrap();
    for interval in intervals(&ticks[..3]) {
        assert_eq!(interval, Duration::from_millis(500));
    }
}

#[tokio::test(start_paused = true)]
async fn broken_callback_stream_is_a_fatal_loop_error() {
    let server = ScriptedServer::new();
    let mut manager = CallbackManager::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    manager.on_callback("ManiaPlanet.PlayerConnect", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let mut controller = Controller::new(ControllerConfig::default(), server.connector(), manager);

    server.push_callback(RemoteCallback::new(
        "ManiaPlanet.PlayerConnect",
        vec![json!("alice"), json!(false)],
    ));
    let breaker = server.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        breaker.break_callback_stream();
    });

    let reason = controller.start().await;

    assert_eq!(reason, ShutdownReason::FatalLoopError);
    assert_eq!(reason.exit_code(), 2);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(controller.shutdown_handle().is_requested());
    // The connection is gone, so nothing is announced on the way out.
    assert_eq!(server.call_count("ChatSendServerMessage"), 1);
    assert_eq!(server.terminations(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_twice_terminates_once() {
    let server = ScriptedServer::new();
    let (mut controller, _recorder) = controller_with(&server, Duration::ZERO, 2, Some("bye"));

    controller.start().await;
    controller
        .shutdown(ShutdownReason::OperatorRequested, Some("bye"))
        .await;

    assert_eq!(server.terminations(), 1);
    assert_eq!(server.call_count("SendHideManialinkPage"), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_server_is_awaited_before_ready() {
    let server = ScriptedServer::new().respond_sequence(
        "GetStatus",
        vec![
            Reply::Value(json!({"Code": 1})),
            Reply::Value(json!({"Code": 3})),
        ],
    );
    let (mut controller, _recorder) = controller_with(&server, Duration::ZERO, 1, None);
    let started = Instant::now();

    let reason = controller.start().await;

    assert_eq!(reason, ShutdownReason::OperatorRequested);
    assert_eq!(server.call_count("GetStatus"), 3);
    assert!(started.elapsed() >= Duration::from_secs(2));
}
