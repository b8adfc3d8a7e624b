use serde::{Deserialize, Serialize};

/// Persisted automation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily trigger time in 24-hour "HH:MM" form
    pub schedule_time: String,

    /// Whether the scheduler may trigger unattended replay
    pub is_enabled: bool,

    /// Whether the startup-shortcut installer is active. Owned by the
    /// external shortcut-installer collaborator; only echoed here.
    pub auto_start: bool,

    /// Replay speed multiplier (1.0 = original pace, >1.0 = faster)
    pub speed_factor: f64,

    /// "YYYY-MM-DD" of the last scheduled run, or empty if never run
    pub last_run_date: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            schedule_time: "08:30".to_string(),
            is_enabled: false,
            auto_start: false,
            speed_factor: 1.0,
            last_run_date: "".to_string(),
        }
    }
}

impl ScheduleConfig {
    /// Whether the scheduled task already ran on the given day
    pub fn has_run_on(&self, day: &str) -> bool {
        self.last_run_date == day
    }

    /// The configured speed factor, with non-positive values normalized
    /// to 1.0. The persisted value is never rewritten.
    pub fn normalized_speed(&self) -> f64 {
        if self.speed_factor > 0.0 {
            self.speed_factor
        } else {
            1.0
        }
    }
}
