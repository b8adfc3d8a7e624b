use crate::{AutoflowError, Player, Result, ScheduleConfig, Store};
use chrono::{DateTime, Local, NaiveTime};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Interval between schedule evaluations
const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Success notification, fired after a scheduled replay has run
pub type OnTaskRun = Arc<dyn Fn() + Send + Sync>;

/// Failure notification, fired with the cause of a failed check
pub type OnTaskFailed = Arc<dyn Fn(&AutoflowError) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_task_run: Option<OnTaskRun>,
    on_task_failed: Option<OnTaskFailed>,
}

/// Triggers at most one unattended replay per calendar day, at the
/// configured time, while enabled.
///
/// The callbacks are advisory notifications to the external UI
/// collaborator; the scheduler itself never terminates on failure and
/// retries naturally on the next tick, bounded by the daily gate.
pub struct Scheduler {
    store: Store,
    player: Arc<Player>,
    config: Mutex<Option<ScheduleConfig>>,
    callbacks: Mutex<Callbacks>,
    running: AtomicBool,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl Scheduler {
    pub fn new(store: Store, player: Arc<Player>) -> Self {
        Self {
            store,
            player,
            config: Mutex::new(None),
            callbacks: Mutex::new(Callbacks::default()),
            running: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
        }
    }

    /// Register the success/failure notification handlers
    pub fn set_callbacks(
        &self,
        on_task_run: impl Fn() + Send + Sync + 'static,
        on_task_failed: impl Fn(&AutoflowError) + Send + Sync + 'static,
    ) {
        let mut callbacks = self.callbacks.lock().unwrap();
        callbacks.on_task_run = Some(Arc::new(on_task_run));
        callbacks.on_task_failed = Some(Arc::new(on_task_failed));
    }

    /// Load the persisted configuration and begin the periodic check loop.
    /// One check runs immediately, then one per tick.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AutoflowError::StateConflict(
                "scheduler is already running".to_string(),
            ));
        }

        let config = match self.store.load_config() {
            Ok(config) => config,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        *self.config.lock().unwrap() = Some(config);

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.stop_tx.lock().unwrap() = Some(stop_tx);

        info!("Scheduler started");
        let scheduler = Arc::clone(self);
        tokio::spawn(scheduler.run_loop(stop_rx));

        Ok(())
    }

    /// Halt the periodic check loop
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(AutoflowError::StateConflict(
                "scheduler is not running".to_string(),
            ));
        }

        if let Some(stop_tx) = self.stop_tx.lock().unwrap().take() {
            let _ = stop_tx.send(true);
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Non-blocking snapshot of the loop state
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Replace the in-memory configuration and persist it; takes effect on
    /// the next check
    pub fn update_config(&self, config: ScheduleConfig) -> Result<()> {
        *self.config.lock().unwrap() = Some(config.clone());
        self.store.save_config(&config)
    }

    async fn run_loop(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        // The first tick of a tokio interval completes immediately
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_at(Local::now()).await;
                }
                _ = stop_rx.changed() => {
                    debug!("Scheduler loop exiting");
                    break;
                }
            }
        }
    }

    /// One schedule evaluation, as of the provided instant.
    ///
    /// No-op while disabled, before today's target time, or once today's
    /// run is recorded. A replay start failure leaves the day unmarked and
    /// is retried on the next tick; a post-run persistence failure is
    /// reported but the day still counts as run.
    pub async fn tick_at(&self, now: DateTime<Local>) {
        let Some(config) = self.config.lock().unwrap().clone() else {
            return;
        };
        if !config.is_enabled {
            return;
        }

        let today = now.format("%Y-%m-%d").to_string();
        if config.has_run_on(&today) {
            return;
        }

        let target = match NaiveTime::parse_from_str(&config.schedule_time, "%H:%M") {
            Ok(target) => target,
            Err(e) => {
                self.notify_failed(&AutoflowError::ConfigurationInvalid(format!(
                    "schedule time {:?}: {e}",
                    config.schedule_time
                )));
                return;
            }
        };

        if now.time() < target {
            return;
        }

        info!(%today, speed = config.normalized_speed(), "Scheduled replay due, starting playback");
        if let Err(e) = self.player.start(config.normalized_speed()).await {
            warn!("Scheduled replay failed to start: {e}");
            self.notify_failed(&e);
            return;
        }

        // The automation ran; the day is complete even if recording that
        // fact fails below
        let updated = {
            let mut guard = self.config.lock().unwrap();
            if let Some(config) = guard.as_mut() {
                config.last_run_date = today;
            }
            guard.clone()
        };
        if let Some(updated) = updated {
            if let Err(e) = self.store.save_config(&updated) {
                warn!("Failed to persist last run date: {e}");
                self.notify_failed(&e);
            }
        }

        self.notify_run();
    }

    // The handlers are cloned out before invocation so a callback may call
    // back into the scheduler, including `set_callbacks`
    fn notify_run(&self) {
        let handler = self.callbacks.lock().unwrap().on_task_run.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn notify_failed(&self, error: &AutoflowError) {
        let handler = self.callbacks.lock().unwrap().on_task_failed.clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }
}
