use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Schema version written into every new trace. Adding an event kind
/// requires bumping this.
pub const TRACE_VERSION: &str = "1.0";

/// The kind of a recorded input action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MouseMove,
    MouseClick,
    KeyPress,
}

/// The mouse button of a recorded click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    /// Two sequential left clicks during replay
    Double,
    /// No button involved (moves and key presses)
    None,
}

/// One recorded input action.
///
/// Coordinates are absolute screen pixels and only meaningful for mouse
/// kinds; `key_code` is a platform virtual key code, only meaningful for
/// key presses. `delay_ms` is the wall-clock gap since the previously
/// *recorded* event (delta time, not an absolute timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The kind of action
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Absolute screen X coordinate (0 for key presses)
    pub x: i32,

    /// Absolute screen Y coordinate (0 for key presses)
    pub y: i32,

    /// The mouse button (`None` unless this is a click)
    pub button: MouseButton,

    /// Platform virtual key code (0 unless this is a key press)
    pub key_code: u32,

    /// Milliseconds elapsed since the previous recorded event
    #[serde(rename = "delay")]
    pub delay_ms: u64,
}

impl Event {
    pub fn mouse_move(x: i32, y: i32, delay_ms: u64) -> Self {
        Self {
            kind: EventKind::MouseMove,
            x,
            y,
            button: MouseButton::None,
            key_code: 0,
            delay_ms,
        }
    }

    pub fn mouse_click(x: i32, y: i32, button: MouseButton, delay_ms: u64) -> Self {
        Self {
            kind: EventKind::MouseClick,
            x,
            y,
            button,
            key_code: 0,
            delay_ms,
        }
    }

    pub fn key_press(key_code: u32, delay_ms: u64) -> Self {
        Self {
            kind: EventKind::KeyPress,
            x: 0,
            y: 0,
            button: MouseButton::None,
            key_code,
            delay_ms,
        }
    }
}

/// Metadata of a recorded trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMeta {
    /// The schema version of the trace
    pub version: String,

    /// Seconds since the Unix epoch when the recording started
    pub created_at: i64,

    /// Screen resolution at capture time, e.g. "1920x1080"
    pub resolution: String,

    /// Total number of recorded events; always equals `events.len()`
    pub total_events: usize,
}

/// An ordered recording of input events produced by one capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub meta: TraceMeta,
    pub events: Vec<Event>,
}

impl Trace {
    /// Create a new empty trace stamped with the current time and the
    /// given screen resolution. A trace with zero events is valid and
    /// represents "nothing recorded yet".
    pub fn new(resolution: impl Into<String>) -> Self {
        Self {
            meta: TraceMeta {
                version: TRACE_VERSION.to_string(),
                created_at: Utc::now().timestamp(),
                resolution: resolution.into(),
                total_events: 0,
            },
            events: Vec::new(),
        }
    }

    /// Append an event, keeping `total_events` in sync. Append is total:
    /// there is no error condition.
    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
        self.meta.total_events = self.events.len();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
