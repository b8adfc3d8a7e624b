use crate::{
    platform::{create_backend, InputBackend},
    AutoflowError, Event, EventKind, MouseButton, Result, Store,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::{sync::Notify, time::sleep};
use tracing::{debug, info, warn};

/// Squared displacement (in pixels) of the real cursor from the drift
/// baseline beyond which playback treats the movement as user interference
const DRIFT_THRESHOLD_SQ: i64 = 50 * 50;

/// Bound on how long a paused playback waits before re-checking its state;
/// resume and stop also wake it immediately
const PAUSE_RECHECK: Duration = Duration::from_millis(100);

/// Settle delay after positioning the cursor and between press/release
const CLICK_SETTLE: Duration = Duration::from_millis(10);

/// Gap between the two clicks of a synthesized double click
const DOUBLE_CLICK_GAP: Duration = Duration::from_millis(50);

/// How long a synthesized key is held down
const KEY_HOLD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

struct PlayState {
    state: PlaybackState,
    /// Monotonic session counter; a finished worker only resets the state
    /// if no newer session has started since
    session: u64,
    /// Stop signal of the current session
    stop: Arc<AtomicBool>,
}

/// The replay engine: reproduces a persisted trace as synthetic input at a
/// caller-chosen speed, pausing when a live user moves the real cursor.
pub struct Player {
    store: Store,
    backend: Arc<dyn InputBackend>,
    state: Arc<Mutex<PlayState>>,
    /// Wakes the paused-wait loop on resume or stop
    wake: Arc<Notify>,
}

impl Player {
    /// Create a player using the current platform's input facility
    pub fn new(store: Store) -> Result<Self> {
        Ok(Self::with_backend(store, create_backend()?))
    }

    /// Create a player dispatching through a custom input backend
    pub fn with_backend(store: Store, backend: Arc<dyn InputBackend>) -> Self {
        Self {
            store,
            backend,
            state: Arc::new(Mutex::new(PlayState {
                state: PlaybackState::Idle,
                session: 0,
                stop: Arc::new(AtomicBool::new(false)),
            })),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Begin asynchronous execution of the persisted trace.
    ///
    /// A non-positive `speed_factor` is treated as 1.0. The current cursor
    /// position is recorded as the initial drift baseline.
    pub async fn start(&self, speed_factor: f64) -> Result<()> {
        if self.is_playing() {
            return Err(AutoflowError::StateConflict(
                "playback is already in progress".to_string(),
            ));
        }

        // Always a fresh load; the player never mutates or caches a trace
        let trace = self.store.load_trace()?;
        if trace.is_empty() {
            return Err(AutoflowError::DataUnavailable(
                "no recorded trace to play".to_string(),
            ));
        }

        let speed = if speed_factor > 0.0 { speed_factor } else { 1.0 };
        let baseline = self.backend.cursor_pos()?;

        // The state lock is never held across the load or cursor query
        // above, so re-check for a concurrent start
        let mut ps = self.state.lock().unwrap();
        if ps.state != PlaybackState::Idle {
            return Err(AutoflowError::StateConflict(
                "playback is already in progress".to_string(),
            ));
        }

        ps.state = PlaybackState::Playing;
        ps.session += 1;
        ps.stop = Arc::new(AtomicBool::new(false));

        info!(
            events = trace.len(),
            speed, "Starting playback of recorded trace"
        );

        let task = PlaybackTask {
            events: trace.events,
            speed,
            baseline,
            session: ps.session,
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
            stop: Arc::clone(&ps.stop),
            wake: Arc::clone(&self.wake),
        };
        tokio::spawn(task.run());

        Ok(())
    }

    /// Signal the running execution to abandon its remaining events
    pub fn stop(&self) -> Result<()> {
        let mut ps = self.state.lock().unwrap();
        if ps.state == PlaybackState::Idle {
            return Err(AutoflowError::StateConflict(
                "no playback in progress".to_string(),
            ));
        }

        ps.stop.store(true, Ordering::SeqCst);
        ps.state = PlaybackState::Idle;
        self.wake.notify_waiters();
        info!("Playback stop requested");
        Ok(())
    }

    /// Halt progression before the next queued event
    pub fn pause(&self) -> Result<()> {
        let mut ps = self.state.lock().unwrap();
        match ps.state {
            PlaybackState::Idle => Err(AutoflowError::StateConflict(
                "no playback in progress".to_string(),
            )),
            PlaybackState::Paused => Err(AutoflowError::StateConflict(
                "playback is already paused".to_string(),
            )),
            PlaybackState::Playing => {
                ps.state = PlaybackState::Paused;
                Ok(())
            }
        }
    }

    /// Resume a paused playback with the next pending event
    pub fn resume(&self) -> Result<()> {
        let mut ps = self.state.lock().unwrap();
        match ps.state {
            PlaybackState::Idle => Err(AutoflowError::StateConflict(
                "no playback in progress".to_string(),
            )),
            PlaybackState::Playing => Err(AutoflowError::StateConflict(
                "playback is not paused".to_string(),
            )),
            PlaybackState::Paused => {
                ps.state = PlaybackState::Playing;
                self.wake.notify_waiters();
                Ok(())
            }
        }
    }

    /// Non-blocking snapshot: true while playing or paused
    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().state != PlaybackState::Idle
    }
}

struct PlaybackTask {
    events: Vec<Event>,
    speed: f64,
    baseline: (i32, i32),
    session: u64,
    backend: Arc<dyn InputBackend>,
    state: Arc<Mutex<PlayState>>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PlaybackTask {
    async fn run(mut self) {
        let mut idx = 0usize;
        while idx < self.events.len() {
            if self.stop.load(Ordering::SeqCst) {
                debug!("Playback aborted at event {}", idx);
                break;
            }

            if self.is_paused() {
                if !self.wait_resumed().await {
                    debug!("Playback stopped while paused at event {}", idx);
                    break;
                }
            }

            // Drift check against the real cursor, skipped for the first
            // event (the baseline is the position at playback start)
            let current = self.backend.cursor_pos().unwrap_or(self.baseline);
            if idx > 0 {
                let dx = (current.0 - self.baseline.0) as i64;
                let dy = (current.1 - self.baseline.1) as i64;
                if dx * dx + dy * dy > DRIFT_THRESHOLD_SQ {
                    warn!(
                        "User cursor moved {},{} -> {},{} during playback, pausing before event {}",
                        self.baseline.0, self.baseline.1, current.0, current.1, idx
                    );
                    self.force_pause();
                    // Re-measure from where the user left the cursor, and
                    // re-evaluate this event once resumed
                    self.baseline = current;
                    continue;
                }
            }

            let event = self.events[idx].clone();
            if event.delay_ms > 0 {
                let scaled = (event.delay_ms as f64 / self.speed) as u64;
                sleep(Duration::from_millis(scaled)).await;
            }

            if let Err(e) = self.dispatch(&event).await {
                // Best-effort semantics: an undeliverable action does not
                // abort the remainder of the trace
                warn!("Failed to dispatch event {}: {}", idx, e);
            }

            self.baseline = current;
            idx += 1;
        }

        let mut ps = self.state.lock().unwrap();
        if ps.session == self.session {
            ps.state = PlaybackState::Idle;
        }
        info!("Playback finished");
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().state == PlaybackState::Paused
    }

    fn force_pause(&self) {
        let mut ps = self.state.lock().unwrap();
        if ps.session == self.session && ps.state == PlaybackState::Playing {
            ps.state = PlaybackState::Paused;
        }
    }

    /// Block until resumed or stopped; returns false when stopped
    async fn wait_resumed(&self) -> bool {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return false;
            }
            if !self.is_paused() {
                return true;
            }
            let _ = tokio::time::timeout(PAUSE_RECHECK, self.wake.notified()).await;
        }
    }

    async fn dispatch(&self, event: &Event) -> Result<()> {
        match event.kind {
            EventKind::MouseMove => self.backend.move_cursor(event.x, event.y),
            EventKind::MouseClick => self.click(event.x, event.y, event.button).await,
            EventKind::KeyPress => {
                self.backend.key_down(event.key_code)?;
                sleep(KEY_HOLD).await;
                self.backend.key_up(event.key_code)
            }
        }
    }

    async fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        if button == MouseButton::Double {
            self.single_click(x, y, MouseButton::Left).await?;
            sleep(DOUBLE_CLICK_GAP).await;
            return self.single_click(x, y, MouseButton::Left).await;
        }
        self.single_click(x, y, button).await
    }

    async fn single_click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        self.backend.move_cursor(x, y)?;
        sleep(CLICK_SETTLE).await;
        self.backend.button_down(button)?;
        sleep(CLICK_SETTLE).await;
        self.backend.button_up(button)
    }
}
