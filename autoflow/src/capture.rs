use crate::{AutoflowError, Event, MouseButton, Result, Store, Trace};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Receiver,
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{info, warn};

/// Virtual key code of the recording toggle hot-key (F8). Pressing it is
/// the external collaborator's business; it must never appear in a trace.
pub const DEFAULT_TOGGLE_KEY_CODE: u32 = 0x77;

/// Configuration for the capture listener
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Minimum time between recorded mouse moves (milliseconds)
    pub mouse_move_throttle_ms: u64,

    /// Virtual key code excluded from the trace (the recording toggle)
    pub toggle_key_code: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            mouse_move_throttle_ms: 50,
            toggle_key_code: DEFAULT_TOGGLE_KEY_CODE,
        }
    }
}

/// One raw OS input notification, copied out of the hook callback.
///
/// The hook callback only builds this fixed-size value and hands it to a
/// channel; all filtering and trace mutation happens on the capture worker.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RawNotification {
    MouseMove { x: i32, y: i32, at: Instant },
    ButtonDown { button: MouseButton, x: i32, y: i32, at: Instant },
    KeyDown { key_code: u32, at: Instant },
}

impl RawNotification {
    fn at(&self) -> Instant {
        match *self {
            RawNotification::MouseMove { at, .. } => at,
            RawNotification::ButtonDown { at, .. } => at,
            RawNotification::KeyDown { at, .. } => at,
        }
    }
}

/// Turns raw notifications into recorded events, applying the reduction
/// policy: mouse moves are rate-limited and jitter at rest is suppressed,
/// button-up and key-up transitions never reach this type, and the toggle
/// hot-key is excluded. `delay_ms` is measured against the previously
/// *recorded* event (or recording start for the first one).
pub(crate) struct EventReducer {
    throttle: Duration,
    toggle_key_code: u32,
    last_event_at: Instant,
    last_move_at: Instant,
    last_move_pos: Option<(i32, i32)>,
}

impl EventReducer {
    pub(crate) fn new(config: &RecorderConfig, started_at: Instant) -> Self {
        Self {
            throttle: Duration::from_millis(config.mouse_move_throttle_ms),
            toggle_key_code: config.toggle_key_code,
            last_event_at: started_at,
            last_move_at: started_at,
            last_move_pos: None,
        }
    }

    pub(crate) fn reduce(&mut self, raw: &RawNotification) -> Option<Event> {
        let at = raw.at();
        let delay_ms = at.saturating_duration_since(self.last_event_at).as_millis() as u64;

        let event = match *raw {
            RawNotification::MouseMove { x, y, .. } => {
                if at.saturating_duration_since(self.last_move_at) < self.throttle {
                    return None;
                }
                if self.last_move_pos == Some((x, y)) {
                    return None;
                }
                self.last_move_at = at;
                self.last_move_pos = Some((x, y));
                Event::mouse_move(x, y, delay_ms)
            }
            RawNotification::ButtonDown { button, x, y, .. } => {
                Event::mouse_click(x, y, button, delay_ms)
            }
            RawNotification::KeyDown { key_code, .. } => {
                if key_code == self.toggle_key_code {
                    return None;
                }
                Event::key_press(key_code, delay_ms)
            }
        };

        self.last_event_at = at;
        Some(event)
    }
}

struct Session {
    trace: Arc<Mutex<Trace>>,
    #[cfg(target_os = "windows")]
    listener: crate::platform::windows::HookListener,
    worker: JoinHandle<()>,
}

/// The capture listener: installs global mouse/keyboard taps and grows a
/// trace while a recording session is active.
pub struct Recorder {
    config: RecorderConfig,
    store: Store,
    recording: AtomicBool,
    session: Mutex<Option<Session>>,
}

impl Recorder {
    pub fn new(store: Store, config: RecorderConfig) -> Self {
        Self {
            config,
            store,
            recording: AtomicBool::new(false),
            session: Mutex::new(None),
        }
    }

    /// Start a capture session: install the low-level mouse and keyboard
    /// taps, allocate a fresh trace stamped with the current screen
    /// resolution, and begin accepting notifications.
    pub async fn start(&self) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            use crate::platform::{windows::HookListener, InputBackend};

            let mut session = self.session.lock().unwrap();
            if session.is_some() {
                return Err(AutoflowError::StateConflict(
                    "recording is already in progress".to_string(),
                ));
            }

            let resolution = crate::platform::windows::WindowsBackend::new().screen_resolution();
            info!(%resolution, "Starting capture session");

            let trace = Arc::new(Mutex::new(Trace::new(resolution)));
            let (raw_tx, raw_rx) = std::sync::mpsc::channel();

            // Hook installation rolls itself back on partial failure
            let listener = HookListener::install(raw_tx)?;

            let reducer = EventReducer::new(&self.config, Instant::now());
            let worker_trace = Arc::clone(&trace);
            let worker = std::thread::spawn(move || capture_worker(reducer, raw_rx, worker_trace));

            *session = Some(Session {
                trace,
                listener,
                worker,
            });
            self.recording.store(true, Ordering::SeqCst);
            Ok(())
        }

        #[cfg(not(target_os = "windows"))]
        {
            Err(AutoflowError::ResourceUnavailable(
                "input capture is only supported on Windows".to_string(),
            ))
        }
    }

    /// Stop the capture session: remove both taps, drain the worker, and
    /// hand the completed trace to the store. Returns once persistence
    /// succeeds or propagates its failure.
    pub async fn stop(&self) -> Result<()> {
        let session = self.session.lock().unwrap().take();
        let Some(session) = session else {
            return Err(AutoflowError::StateConflict(
                "no recording in progress".to_string(),
            ));
        };

        self.recording.store(false, Ordering::SeqCst);

        // Teardown joins OS threads; keep that off the async executor
        #[cfg(target_os = "windows")]
        {
            let listener = session.listener;
            if tokio::task::spawn_blocking(move || listener.stop())
                .await
                .is_err()
            {
                warn!("Hook teardown panicked");
            }
        }

        let worker = session.worker;
        let drained = tokio::task::spawn_blocking(move || worker.join().is_ok()).await;
        if !matches!(drained, Ok(true)) {
            warn!("Capture worker panicked while draining");
        }

        let trace = session.trace.lock().unwrap().clone();
        info!(events = trace.len(), "Capture session stopped");
        self.store.save_trace(&trace)
    }

    /// Non-blocking snapshot of the session state
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

/// Drains raw notifications into the shared trace. Exits when every sender
/// is gone, i.e. once the hook listener has been torn down.
fn capture_worker(
    mut reducer: EventReducer,
    raw_rx: Receiver<RawNotification>,
    trace: Arc<Mutex<Trace>>,
) {
    while let Ok(raw) = raw_rx.recv() {
        if let Some(event) = reducer.reduce(&raw) {
            trace.lock().unwrap().add_event(event);
        }
    }
}
