use autoflow::{
    AutoflowError, Event, InputBackend, MouseButton, Player, ScheduleConfig, Scheduler, Store,
    Trace,
};
use chrono::{Local, TimeZone};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Move(i32, i32),
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    KeyDown(u32),
    KeyUp(u32),
}

/// Records every dispatched action instead of touching the OS. The fake
/// cursor can either follow synthetic moves (like the real pointer) or be
/// driven only by the test, to simulate a user wrestling for control.
struct MockBackend {
    ops: Mutex<Vec<(Op, Instant)>>,
    cursor: Mutex<(i32, i32)>,
    moves_update_cursor: bool,
}

impl MockBackend {
    fn new(moves_update_cursor: bool) -> Arc<Self> {
        Arc::new(Self {
            ops: Mutex::new(Vec::new()),
            cursor: Mutex::new((0, 0)),
            moves_update_cursor,
        })
    }

    fn set_cursor(&self, x: i32, y: i32) {
        *self.cursor.lock().unwrap() = (x, y);
    }

    fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().iter().map(|(op, _)| *op).collect()
    }

    fn op_times(&self) -> Vec<Instant> {
        self.ops.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    fn record(&self, op: Op) {
        self.ops.lock().unwrap().push((op, Instant::now()));
    }
}

impl InputBackend for MockBackend {
    fn cursor_pos(&self) -> autoflow::Result<(i32, i32)> {
        Ok(*self.cursor.lock().unwrap())
    }

    fn move_cursor(&self, x: i32, y: i32) -> autoflow::Result<()> {
        self.record(Op::Move(x, y));
        if self.moves_update_cursor {
            self.set_cursor(x, y);
        }
        Ok(())
    }

    fn button_down(&self, button: MouseButton) -> autoflow::Result<()> {
        self.record(Op::ButtonDown(button));
        Ok(())
    }

    fn button_up(&self, button: MouseButton) -> autoflow::Result<()> {
        self.record(Op::ButtonUp(button));
        Ok(())
    }

    fn key_down(&self, key_code: u32) -> autoflow::Result<()> {
        self.record(Op::KeyDown(key_code));
        Ok(())
    }

    fn key_up(&self, key_code: u32) -> autoflow::Result<()> {
        self.record(Op::KeyUp(key_code));
        Ok(())
    }

    fn screen_resolution(&self) -> String {
        "1920x1080".to_string()
    }
}

fn store_with_trace(events: Vec<Event>) -> (TempDir, Store) {
    let dir = tempdir().expect("tempdir");
    let store = Store::new(dir.path());
    let mut trace = Trace::new("1920x1080");
    for event in events {
        trace.add_event(event);
    }
    store.save_trace(&trace).expect("save trace");
    (dir, store)
}

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn playback_dispatches_in_order_and_scales_delays() {
    let (_dir, store) = store_with_trace(vec![
        Event::mouse_move(10, 10, 0),
        Event::mouse_click(20, 20, MouseButton::Left, 500),
    ]);
    let backend = MockBackend::new(true);
    let player = Player::with_backend(store, backend.clone());

    let started = Instant::now();
    player.start(2.0).await.expect("start playback");
    assert!(player.is_playing());

    assert!(
        wait_until(Duration::from_secs(5), || !player.is_playing()).await,
        "playback should complete"
    );

    assert_eq!(
        backend.ops(),
        vec![
            Op::Move(10, 10),
            Op::Move(20, 20),
            Op::ButtonDown(MouseButton::Left),
            Op::ButtonUp(MouseButton::Left),
        ]
    );

    // 500ms recorded delay at speed 2.0 sleeps ~250ms before the click
    let times = backend.op_times();
    let click_positioning_gap = times[1].duration_since(times[0]);
    assert!(
        click_positioning_gap >= Duration::from_millis(230),
        "expected ~250ms before the click, got {click_positioning_gap:?}"
    );
    assert!(
        click_positioning_gap < Duration::from_millis(480),
        "the full 500ms delay should have been halved, got {click_positioning_gap:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn double_click_synthesizes_two_left_clicks() {
    let (_dir, store) = store_with_trace(vec![Event::mouse_click(
        30,
        40,
        MouseButton::Double,
        0,
    )]);
    let backend = MockBackend::new(true);
    let player = Player::with_backend(store, backend.clone());

    player.start(1.0).await.expect("start playback");
    assert!(wait_until(Duration::from_secs(5), || !player.is_playing()).await);

    assert_eq!(
        backend.ops(),
        vec![
            Op::Move(30, 40),
            Op::ButtonDown(MouseButton::Left),
            Op::ButtonUp(MouseButton::Left),
            Op::Move(30, 40),
            Op::ButtonDown(MouseButton::Left),
            Op::ButtonUp(MouseButton::Left),
        ]
    );
}

#[tokio::test]
async fn key_press_taps_the_mapped_key() {
    let (_dir, store) = store_with_trace(vec![Event::key_press(0x41, 0)]);
    let backend = MockBackend::new(true);
    let player = Player::with_backend(store, backend.clone());

    player.start(1.0).await.expect("start playback");
    assert!(wait_until(Duration::from_secs(5), || !player.is_playing()).await);

    assert_eq!(backend.ops(), vec![Op::KeyDown(0x41), Op::KeyUp(0x41)]);
}

#[tokio::test]
async fn empty_trace_fails_without_dispatching() {
    let dir = tempdir().expect("tempdir");
    let store = Store::new(dir.path());
    let backend = MockBackend::new(true);
    let player = Player::with_backend(store, backend.clone());

    let err = player.start(1.0).await.expect_err("empty trace must fail");
    assert!(matches!(err, AutoflowError::DataUnavailable(_)));
    assert!(!player.is_playing());
    assert!(backend.ops().is_empty());
}

#[tokio::test]
async fn pause_halts_progression_and_stop_while_paused_goes_idle() {
    let (_dir, store) = store_with_trace(vec![
        Event::mouse_move(10, 10, 0),
        Event::mouse_move(20, 20, 300),
        Event::mouse_move(30, 30, 300),
        Event::mouse_move(40, 40, 300),
        Event::mouse_move(50, 50, 300),
    ]);
    let backend = MockBackend::new(true);
    let player = Player::with_backend(store, backend.clone());

    player.start(1.0).await.expect("start playback");
    tokio::time::sleep(Duration::from_millis(50)).await;
    player.pause().expect("pause");

    // The event already past its pre-sleep checks still lands; nothing
    // beyond it may execute while paused
    tokio::time::sleep(Duration::from_millis(800)).await;
    let frozen = backend.ops().len();
    assert!(frozen <= 2, "expected at most 2 moves, got {frozen}");
    assert!(player.is_playing(), "paused playback is still a session");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(backend.ops().len(), frozen, "no progress while paused");

    player.stop().expect("stop while paused");
    assert!(!player.is_playing());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        backend.ops().len(),
        frozen,
        "remaining events must not execute after stop"
    );
}

#[tokio::test]
async fn cursor_interference_pauses_and_event_runs_after_resume() {
    let (_dir, store) = store_with_trace(vec![
        Event::mouse_move(10, 10, 0),
        Event::mouse_move(20, 20, 300),
        Event::mouse_move(30, 30, 300),
    ]);
    // The fake cursor only moves when the test says so, simulating a user
    // holding the pointer still somewhere else
    let backend = MockBackend::new(false);
    let player = Player::with_backend(store, backend.clone());

    player.start(1.0).await.expect("start playback");

    // Shove the cursor >50px away while the second event is sleeping
    tokio::time::sleep(Duration::from_millis(150)).await;
    backend.set_cursor(200, 200);

    assert!(
        wait_until(Duration::from_secs(2), || backend.ops().len() == 2).await,
        "first two moves should have dispatched"
    );
    // The third event's drift check must force a pause instead of running
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(backend.ops().len(), 2);
    assert!(player.is_playing(), "interference pauses, it does not stop");

    player.resume().expect("resume");
    assert!(
        wait_until(Duration::from_secs(5), || !player.is_playing()).await,
        "playback should finish after resume"
    );
    // The skipped event executed rather than being dropped
    assert_eq!(backend.ops().last(), Some(&Op::Move(30, 30)));
    assert_eq!(backend.ops().len(), 3);
}

#[tokio::test]
async fn playback_state_transitions_reject_wrong_states() {
    let (_dir, store) = store_with_trace(vec![Event::mouse_move(10, 10, 2_000)]);
    let backend = MockBackend::new(true);
    let player = Player::with_backend(store, backend.clone());

    assert!(matches!(
        player.stop(),
        Err(AutoflowError::StateConflict(_))
    ));
    assert!(matches!(
        player.pause(),
        Err(AutoflowError::StateConflict(_))
    ));
    assert!(matches!(
        player.resume(),
        Err(AutoflowError::StateConflict(_))
    ));

    player.start(1.0).await.expect("start playback");
    assert!(matches!(
        player.start(1.0).await,
        Err(AutoflowError::StateConflict(_))
    ));
    assert!(matches!(
        player.resume(),
        Err(AutoflowError::StateConflict(_))
    ));

    player.pause().expect("pause");
    assert!(matches!(
        player.pause(),
        Err(AutoflowError::StateConflict(_))
    ));

    player.resume().expect("resume");
    player.stop().expect("stop");
    assert!(!player.is_playing());
}

#[tokio::test]
async fn nonpositive_speed_factor_plays_at_original_pace() {
    let (_dir, store) = store_with_trace(vec![
        Event::mouse_move(10, 10, 0),
        Event::mouse_move(20, 20, 200),
    ]);
    let backend = MockBackend::new(true);
    let player = Player::with_backend(store, backend.clone());

    player.start(0.0).await.expect("start playback");
    assert!(wait_until(Duration::from_secs(5), || !player.is_playing()).await);

    let times = backend.op_times();
    let gap = times[1].duration_since(times[0]);
    assert!(
        gap >= Duration::from_millis(180),
        "speed 0 must fall back to 1.0, got gap {gap:?}"
    );
}

struct SchedulerFixture {
    dir: TempDir,
    store: Store,
    backend: Arc<MockBackend>,
    scheduler: Arc<Scheduler>,
    run_count: Arc<AtomicUsize>,
    fail_count: Arc<AtomicUsize>,
}

fn scheduler_fixture(config: ScheduleConfig, events: Vec<Event>) -> SchedulerFixture {
    let (dir, store) = store_with_trace(events);
    let backend = MockBackend::new(true);
    let player = Arc::new(Player::with_backend(store.clone(), backend.clone()));
    let scheduler = Arc::new(Scheduler::new(store.clone(), player));

    let run_count = Arc::new(AtomicUsize::new(0));
    let fail_count = Arc::new(AtomicUsize::new(0));
    let runs = Arc::clone(&run_count);
    let fails = Arc::clone(&fail_count);
    scheduler.set_callbacks(
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
        },
        move |_err| {
            fails.fetch_add(1, Ordering::SeqCst);
        },
    );
    scheduler.update_config(config).expect("seed config");

    SchedulerFixture {
        dir,
        store,
        backend,
        scheduler,
        run_count,
        fail_count,
    }
}

fn enabled_config() -> ScheduleConfig {
    ScheduleConfig {
        schedule_time: "08:30".to_string(),
        is_enabled: true,
        auto_start: false,
        speed_factor: 1.0,
        last_run_date: "".to_string(),
    }
}

#[tokio::test]
async fn scheduler_triggers_once_per_day() {
    let fixture = scheduler_fixture(enabled_config(), vec![Event::mouse_move(5, 5, 0)]);

    let now = Local.with_ymd_and_hms(2024, 6, 1, 8, 31, 0).unwrap();
    fixture.scheduler.tick_at(now).await;

    assert!(
        wait_until(Duration::from_secs(5), || !fixture.backend.ops().is_empty()).await,
        "the scheduled replay should dispatch"
    );
    assert_eq!(fixture.run_count.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.fail_count.load(Ordering::SeqCst), 0);

    let persisted = fixture.store.load_config().expect("reload config");
    assert_eq!(persisted.last_run_date, "2024-06-01");

    // Same day, later tick: the daily gate holds
    let dispatched = fixture.backend.ops().len();
    let later = Local.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    fixture.scheduler.tick_at(later).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fixture.backend.ops().len(), dispatched);
    assert_eq!(fixture.run_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scheduler_waits_for_target_time() {
    let fixture = scheduler_fixture(enabled_config(), vec![Event::mouse_move(5, 5, 0)]);

    let too_early = Local.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    fixture.scheduler.tick_at(too_early).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fixture.backend.ops().is_empty());
    assert_eq!(fixture.run_count.load(Ordering::SeqCst), 0);
    let persisted = fixture.store.load_config().expect("reload config");
    assert_eq!(persisted.last_run_date, "");
}

#[tokio::test]
async fn scheduler_disabled_is_a_noop() {
    let mut config = enabled_config();
    config.is_enabled = false;
    let fixture = scheduler_fixture(config, vec![Event::mouse_move(5, 5, 0)]);

    let now = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    fixture.scheduler.tick_at(now).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fixture.backend.ops().is_empty());
    assert_eq!(fixture.run_count.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.fail_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scheduler_reports_malformed_schedule_time() {
    let mut config = enabled_config();
    config.schedule_time = "8h30".to_string();
    let fixture = scheduler_fixture(config, vec![Event::mouse_move(5, 5, 0)]);

    let now = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    fixture.scheduler.tick_at(now).await;

    assert_eq!(fixture.fail_count.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.run_count.load(Ordering::SeqCst), 0);
    assert!(fixture.backend.ops().is_empty());
}

#[tokio::test]
async fn scheduler_post_run_persistence_failure_still_marks_day() {
    let fixture = scheduler_fixture(enabled_config(), vec![Event::mouse_move(5, 5, 0)]);

    // Make the post-run config save fail: a directory squats on its path
    let config_path = fixture.dir.path().join(autoflow::CONFIG_FILE);
    std::fs::remove_file(&config_path).expect("remove config file");
    std::fs::create_dir(&config_path).expect("occupy config path");

    let now = Local.with_ymd_and_hms(2024, 6, 1, 8, 31, 0).unwrap();
    fixture.scheduler.tick_at(now).await;

    // The automation ran, so the day counts: the failure is reported but
    // the success notification still fires
    assert_eq!(fixture.fail_count.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.run_count.load(Ordering::SeqCst), 1);
    assert!(
        wait_until(Duration::from_secs(5), || !fixture.backend.ops().is_empty()).await,
        "the scheduled replay should dispatch"
    );

    // Same day, later tick: marked in memory despite the failed save
    let dispatched = fixture.backend.ops().len();
    let later = Local.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    fixture.scheduler.tick_at(later).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fixture.backend.ops().len(), dispatched);
    assert_eq!(fixture.run_count.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.fail_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scheduler_callback_may_reregister_callbacks() {
    let mut config = enabled_config();
    config.schedule_time = "nonsense".to_string();
    let fixture = scheduler_fixture(config, vec![Event::mouse_move(5, 5, 0)]);

    // A handler that re-enters callback registration must not deadlock
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);
    let inner = Arc::clone(&fixture.scheduler);
    fixture.scheduler.set_callbacks(
        || {},
        move |_err| {
            handler_hits.fetch_add(1, Ordering::SeqCst);
            inner.set_callbacks(|| {}, |_err| {});
        },
    );

    let now = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    fixture.scheduler.tick_at(now).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scheduler_failed_replay_leaves_day_unmarked() {
    // An enabled schedule but nothing recorded: playback start fails
    let dir = tempdir().expect("tempdir");
    let store = Store::new(dir.path());
    let backend = MockBackend::new(true);
    let player = Arc::new(Player::with_backend(store.clone(), backend.clone()));
    let scheduler = Arc::new(Scheduler::new(store.clone(), player));

    let fail_count = Arc::new(AtomicUsize::new(0));
    let fails = Arc::clone(&fail_count);
    scheduler.set_callbacks(
        || {},
        move |_err| {
            fails.fetch_add(1, Ordering::SeqCst);
        },
    );
    scheduler.update_config(enabled_config()).expect("seed config");

    let now = Local.with_ymd_and_hms(2024, 6, 1, 8, 31, 0).unwrap();
    scheduler.tick_at(now).await;

    assert_eq!(fail_count.load(Ordering::SeqCst), 1);
    let persisted = store.load_config().expect("reload config");
    assert_eq!(
        persisted.last_run_date, "",
        "a failed replay must stay eligible for retry"
    );
}

#[tokio::test]
async fn scheduler_start_stop_guards() {
    let mut config = enabled_config();
    config.is_enabled = false;
    let fixture = scheduler_fixture(config, vec![Event::mouse_move(5, 5, 0)]);
    let scheduler = &fixture.scheduler;

    assert!(matches!(
        scheduler.stop(),
        Err(AutoflowError::StateConflict(_))
    ));

    scheduler.start().await.expect("start scheduler");
    assert!(scheduler.is_running());
    assert!(matches!(
        scheduler.start().await,
        Err(AutoflowError::StateConflict(_))
    ));

    scheduler.stop().expect("stop scheduler");
    assert!(!scheduler.is_running());
    assert!(matches!(
        scheduler.stop(),
        Err(AutoflowError::StateConflict(_))
    ));
}
