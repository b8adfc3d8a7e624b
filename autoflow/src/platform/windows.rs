use crate::capture::RawNotification;
use crate::platform::InputBackend;
use crate::{AutoflowError, MouseButton, Result};
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, warn};
use windows::Win32::Foundation::{LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN,
    MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEINPUT,
    MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetCursorPos, GetMessageW, GetSystemMetrics,
    PostThreadMessageW, SetCursorPos, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx,
    KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT, SM_CXSCREEN, SM_CYSCREEN, WH_KEYBOARD_LL, WH_MOUSE_LL,
    WM_KEYDOWN, WM_LBUTTONDOWN, WM_MBUTTONDOWN, WM_MOUSEMOVE, WM_QUIT, WM_RBUTTONDOWN,
    WM_SYSKEYDOWN,
};

/// Sender slot shared with the hook callbacks. The callbacks are invoked
/// by the OS on the pump thread and cannot capture state, so this is the
/// one process-wide slot; it is installed at session start and cleared at
/// session stop.
static HOOK_TX: Mutex<Option<Sender<RawNotification>>> = Mutex::new(None);

fn forward(raw: RawNotification) {
    if let Ok(guard) = HOOK_TX.lock() {
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(raw);
        }
    }
}

/// Low-level mouse hook procedure. Runs on the pump thread; it only copies
/// the fixed-size notification into the channel and returns.
unsafe extern "system" fn mouse_hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
        let raw = match wparam.0 as u32 {
            WM_MOUSEMOVE => Some(RawNotification::MouseMove {
                x: info.pt.x,
                y: info.pt.y,
                at: Instant::now(),
            }),
            WM_LBUTTONDOWN => Some(button_down(MouseButton::Left, info.pt)),
            WM_RBUTTONDOWN => Some(button_down(MouseButton::Right, info.pt)),
            WM_MBUTTONDOWN => Some(button_down(MouseButton::Middle, info.pt)),
            _ => None,
        };
        if let Some(raw) = raw {
            forward(raw);
        }
    }
    CallNextHookEx(None, code, wparam, lparam)
}

fn button_down(button: MouseButton, pt: POINT) -> RawNotification {
    RawNotification::ButtonDown {
        button,
        x: pt.x,
        y: pt.y,
        at: Instant::now(),
    }
}

/// Low-level keyboard hook procedure. Key-up transitions are dropped here;
/// the toggle hot-key is filtered later by the reducer.
unsafe extern "system" fn keyboard_hook_proc(
    code: i32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if code >= 0 {
        let msg = wparam.0 as u32;
        if msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN {
            let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
            forward(RawNotification::KeyDown {
                key_code: info.vkCode,
                at: Instant::now(),
            });
        }
    }
    CallNextHookEx(None, code, wparam, lparam)
}

/// Global input taps plus the message pump that services them.
///
/// Low-level hooks deliver into whichever thread installed them, and only
/// while that thread pumps messages, so installation, the `GetMessageW`
/// loop, and removal all happen on one dedicated thread.
pub struct HookListener {
    pump_thread_id: u32,
    pump: Option<JoinHandle<()>>,
}

impl HookListener {
    /// Install both taps and start pumping. On partial failure the
    /// already-installed tap is removed before returning the error.
    pub fn install(tx: Sender<RawNotification>) -> Result<Self> {
        *HOOK_TX.lock().unwrap() = Some(tx);

        let (ready_tx, ready_rx) = channel();
        let pump = std::thread::spawn(move || pump_thread(ready_tx));

        match ready_rx.recv() {
            Ok(Ok(pump_thread_id)) => {
                debug!(pump_thread_id, "Input hooks installed");
                Ok(Self {
                    pump_thread_id,
                    pump: Some(pump),
                })
            }
            Ok(Err(e)) => {
                HOOK_TX.lock().unwrap().take();
                let _ = pump.join();
                Err(e)
            }
            Err(_) => {
                HOOK_TX.lock().unwrap().take();
                let _ = pump.join();
                Err(AutoflowError::ResourceUnavailable(
                    "hook thread exited during installation".to_string(),
                ))
            }
        }
    }

    /// Tear down both taps and stop the pump. Dropping the sender slot
    /// lets the capture worker drain out and exit.
    pub fn stop(mut self) {
        unsafe {
            if let Err(e) =
                PostThreadMessageW(self.pump_thread_id, WM_QUIT, WPARAM(0), LPARAM(0))
            {
                warn!("Failed to post quit message to pump thread: {e}");
            }
        }
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                warn!("Hook pump thread panicked");
            }
        }
        HOOK_TX.lock().unwrap().take();
    }
}

fn pump_thread(ready: Sender<Result<u32>>) {
    unsafe {
        let mouse_hook = match SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), None, 0) {
            Ok(hook) => hook,
            Err(e) => {
                let _ = ready.send(Err(AutoflowError::ResourceUnavailable(format!(
                    "failed to install mouse hook: {e}"
                ))));
                return;
            }
        };
        let keyboard_hook =
            match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) {
                Ok(hook) => hook,
                Err(e) => {
                    if UnhookWindowsHookEx(mouse_hook).is_err() {
                        warn!("Failed to roll back mouse hook");
                    }
                    let _ = ready.send(Err(AutoflowError::ResourceUnavailable(format!(
                        "failed to install keyboard hook: {e}"
                    ))));
                    return;
                }
            };

        let _ = ready.send(Ok(GetCurrentThreadId()));

        let mut msg = MSG::default();
        loop {
            // Returns 0 on WM_QUIT, -1 on failure
            let ret = GetMessageW(&mut msg, None, 0, 0);
            if ret.0 <= 0 {
                break;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        // Inverse install order
        if UnhookWindowsHookEx(keyboard_hook).is_err() {
            warn!("Failed to remove keyboard hook");
        }
        if UnhookWindowsHookEx(mouse_hook).is_err() {
            warn!("Failed to remove mouse hook");
        }
    }
}

/// Input synthesis and cursor queries through the Win32 `SendInput` family
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBackend for WindowsBackend {
    fn cursor_pos(&self) -> Result<(i32, i32)> {
        let mut point = POINT::default();
        unsafe { GetCursorPos(&mut point) }
            .map_err(|e| AutoflowError::ResourceUnavailable(format!("GetCursorPos: {e}")))?;
        Ok((point.x, point.y))
    }

    fn move_cursor(&self, x: i32, y: i32) -> Result<()> {
        unsafe { SetCursorPos(x, y) }
            .map_err(|e| AutoflowError::ResourceUnavailable(format!("SetCursorPos: {e}")))
    }

    fn button_down(&self, button: MouseButton) -> Result<()> {
        send_mouse_input(button_flags(button)?.0)
    }

    fn button_up(&self, button: MouseButton) -> Result<()> {
        send_mouse_input(button_flags(button)?.1)
    }

    fn key_down(&self, key_code: u32) -> Result<()> {
        send_keyboard_input(key_code, KEYBD_EVENT_FLAGS(0))
    }

    fn key_up(&self, key_code: u32) -> Result<()> {
        send_keyboard_input(key_code, KEYEVENTF_KEYUP)
    }

    fn screen_resolution(&self) -> String {
        let width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
        let height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
        format!("{width}x{height}")
    }
}

fn button_flags(button: MouseButton) -> Result<(MOUSE_EVENT_FLAGS, MOUSE_EVENT_FLAGS)> {
    match button {
        MouseButton::Left => Ok((MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP)),
        MouseButton::Right => Ok((MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP)),
        MouseButton::Middle => Ok((MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP)),
        // Double is expanded into two left clicks before reaching the
        // backend; None never denotes a pressable button
        MouseButton::Double | MouseButton::None => Err(AutoflowError::ResourceUnavailable(
            format!("no synthetic press for button {button:?}"),
        )),
    }
}

fn send_mouse_input(flags: MOUSE_EVENT_FLAGS) -> Result<()> {
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };
    let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if sent == 0 {
        return Err(AutoflowError::ResourceUnavailable(
            "SendInput inserted no mouse events".to_string(),
        ));
    }
    Ok(())
}

fn send_keyboard_input(key_code: u32, flags: KEYBD_EVENT_FLAGS) -> Result<()> {
    let input = INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(key_code as u16),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };
    let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if sent == 0 {
        return Err(AutoflowError::ResourceUnavailable(
            "SendInput inserted no keyboard events".to_string(),
        ));
    }
    Ok(())
}
