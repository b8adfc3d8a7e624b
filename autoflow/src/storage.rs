use crate::{AutoflowError, Result, ScheduleConfig, Trace};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// File name of the persisted trace inside the store directory
pub const TRACE_FILE: &str = "trace.json";

/// File name of the persisted schedule configuration
pub const CONFIG_FILE: &str = "config.json";

/// Durable load/save of the trace and the schedule configuration.
///
/// All state lives in a single directory as human-readable, indented JSON.
/// An absent trace file is equivalent to an empty trace; an absent config
/// file yields defaults. A file that fails to parse is an error, never
/// treated as empty.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Create a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create a store co-located with the running executable
    pub fn in_exe_dir() -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| AutoflowError::PersistenceFailure(format!("executable path: {e}")))?;
        let dir = exe
            .parent()
            .ok_or_else(|| {
                AutoflowError::PersistenceFailure("executable has no parent directory".to_string())
            })?
            .to_path_buf();
        Ok(Self::new(dir))
    }

    fn trace_path(&self) -> PathBuf {
        self.dir.join(TRACE_FILE)
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Load the persisted trace, or an empty trace with empty resolution
    /// if none has been saved yet
    pub fn load_trace(&self) -> Result<Trace> {
        let path = self.trace_path();
        if !path.exists() {
            debug!("No trace file at {:?}, returning empty trace", path);
            let mut trace = Trace::new("");
            trace.meta.created_at = 0;
            return Ok(trace);
        }

        let data = fs::read_to_string(&path)?;
        let trace: Trace = serde_json::from_str(&data)
            .map_err(|e| AutoflowError::PersistenceFailure(format!("parse {TRACE_FILE}: {e}")))?;

        if trace.meta.total_events != trace.events.len() {
            return Err(AutoflowError::PersistenceFailure(format!(
                "{TRACE_FILE}: total_events is {} but {} events are present",
                trace.meta.total_events,
                trace.events.len()
            )));
        }

        Ok(trace)
    }

    /// Persist the trace, replacing any prior one
    pub fn save_trace(&self, trace: &Trace) -> Result<()> {
        let path = self.trace_path();
        info!(events = trace.len(), "Saving trace to {:?}", path);
        write_json(&path, trace)
    }

    /// Load the persisted schedule configuration, or defaults if none has
    /// been saved yet
    pub fn load_config(&self) -> Result<ScheduleConfig> {
        let path = self.config_path();
        if !path.exists() {
            debug!("No config file at {:?}, returning defaults", path);
            return Ok(ScheduleConfig::default());
        }

        let data = fs::read_to_string(&path)?;
        serde_json::from_str(&data)
            .map_err(|e| AutoflowError::PersistenceFailure(format!("parse {CONFIG_FILE}: {e}")))
    }

    /// Persist the schedule configuration
    pub fn save_config(&self, config: &ScheduleConfig) -> Result<()> {
        write_json(&self.config_path(), config)
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
