//! Input capture/replay engine for Windows
//!
//! This crate records a user's mouse and keyboard activity through global
//! low-level hooks into a timestamped trace, persists it as JSON, and
//! replays the trace against the OS input subsystem at a caller-chosen
//! speed. A scheduler can trigger unattended replay at most once per
//! calendar day. The windowed UI, tray icon, and hot-key registration are
//! external collaborators that drive this engine through its public
//! surface.

#![cfg_attr(not(target_os = "windows"), allow(unused))]

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod player;
pub mod scheduler;
pub mod storage;

pub use capture::{Recorder, RecorderConfig, DEFAULT_TOGGLE_KEY_CODE};
pub use config::ScheduleConfig;
pub use error::{AutoflowError, Result};
pub use events::{Event, EventKind, MouseButton, Trace, TraceMeta, TRACE_VERSION};
pub use platform::{create_backend, InputBackend};
pub use player::Player;
pub use scheduler::{OnTaskFailed, OnTaskRun, Scheduler};
pub use storage::{Store, CONFIG_FILE, TRACE_FILE};
