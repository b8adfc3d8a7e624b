use crate::{AutoflowError, MouseButton, Result};
use std::sync::Arc;

/// The OS seam for the replay engine: cursor queries and synthetic input
/// dispatch. The capture hooks are platform-specific enough that they live
/// directly in the platform module instead of behind this trait.
pub trait InputBackend: Send + Sync {
    /// Current cursor position in absolute screen pixels
    fn cursor_pos(&self) -> Result<(i32, i32)>;

    /// Move the pointer to the given absolute screen position
    fn move_cursor(&self, x: i32, y: i32) -> Result<()>;

    /// Press the given mouse button without releasing it
    fn button_down(&self, button: MouseButton) -> Result<()>;

    /// Release the given mouse button
    fn button_up(&self, button: MouseButton) -> Result<()>;

    /// Press the key with the given virtual key code without releasing it
    fn key_down(&self, key_code: u32) -> Result<()>;

    /// Release the key with the given virtual key code
    fn key_up(&self, key_code: u32) -> Result<()>;

    /// Primary screen resolution as "WxH"
    fn screen_resolution(&self) -> String;
}

#[cfg(target_os = "windows")]
pub mod windows;

/// Create the input backend for the current platform
pub fn create_backend() -> Result<Arc<dyn InputBackend>> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsBackend::new()))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(AutoflowError::ResourceUnavailable(
            "input capture/replay is only supported on Windows".to_string(),
        ))
    }
}
