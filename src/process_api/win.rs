use std::collections::HashSet;

use anyhow::Result;
use tracing::{error, instrument};
use windows::Win32::{
    Foundation::{BOOL, HWND, LPARAM},
    UI::WindowsAndMessaging::{
        EnumWindows, GetForegroundWindow, GetWindowThreadProcessId, IsWindowVisible,
    },
};

use super::{DesktopProbe, ProcessId};

fn window_process(window: HWND) -> Option<ProcessId> {
    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    (id != 0).then_some(id)
}

#[tracing::instrument]
pub fn get_foreground_process() -> Option<ProcessId> {
    let window = unsafe { GetForegroundWindow() };
    if window.is_invalid() {
        return None;
    }
    window_process(window)
}

unsafe extern "system" fn collect_visible(window: HWND, param: LPARAM) -> BOOL {
    // SAFETY: `param` is the `HashSet` passed by `get_windowed_processes` and outlives the
    // enumeration.
    let pids = unsafe { &mut *(param.0 as *mut HashSet<ProcessId>) };
    if unsafe { IsWindowVisible(window) }.as_bool() {
        if let Some(pid) = window_process(window) {
            pids.insert(pid);
        }
    }
    BOOL::from(true)
}

pub fn get_windowed_processes() -> Result<HashSet<ProcessId>> {
    let mut pids = HashSet::new();
    unsafe {
        EnumWindows(
            Some(collect_visible),
            LPARAM(&mut pids as *mut HashSet<ProcessId> as isize),
        )
    }?;
    Ok(pids)
}

pub struct WindowsProbe {}

impl WindowsProbe {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopProbe for WindowsProbe {
    fn foreground_process(&mut self) -> Result<Option<ProcessId>> {
        Ok(get_foreground_process())
    }

    #[instrument(skip(self))]
    fn windowed_processes(&mut self) -> Result<Option<HashSet<ProcessId>>> {
        get_windowed_processes()
            .map(Some)
            .inspect_err(|e| error!("Failed to enumerate windows {e:?}"))
    }
}
