//! Contains logic for querying running applications in different environments.
//! [GenericProcessSource] is the main artifact of this module that abstracts
//! the operations.

pub mod system;
#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use anyhow::Result;
use serde::Serialize;
use system::{HeadlessProbe, SystemProcessSource};

pub type ProcessId = u32;

/// Opaque reference to an application icon. The core never looks inside, it only hands it to
/// presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IconHandle(pub Arc<str>);

/// View of one running process at the moment of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub process_id: ProcessId,
    /// Human readable name. For example 'firefox' or 'Code'
    pub display_name: Option<Arc<str>>,
    /// Stable identity of the application across launches. Linux and Windows don't have bundles,
    /// so this is the full path to the executable. For example /usr/lib/firefox/firefox
    pub bundle_identifier: Option<Arc<str>>,
    pub icon: Option<IconHandle>,
    pub is_foreground: bool,
    pub is_terminated: bool,
}

/// Delivered to a [TerminationHandler] when any process in the system exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationNotice {
    pub process_id: ProcessId,
    pub bundle_identifier: Option<Arc<str>>,
}

/// Called from an arbitrary thread. Implementations must hand the notice off instead of doing
/// any work in place.
pub type TerminationHandler = Box<dyn Fn(TerminationNotice) + Send + Sync>;

/// Intended to serve as a contract every environment must implement.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessSource: Send {
    /// Returns all running processes a user can bring to the foreground. There is no ordering
    /// guarantee.
    fn list_foreground_capable_processes(&mut self) -> Result<Vec<ProcessSnapshot>>;

    /// Registers a callback for every process termination in the system, not only the watched
    /// ones.
    fn subscribe_to_termination(&mut self, handler: TerminationHandler) -> Result<()>;
}

/// Answers desktop specific questions sysinfo can't: which process owns the focused window and
/// which processes own windows at all.
pub trait DesktopProbe: Send {
    fn foreground_process(&mut self) -> Result<Option<ProcessId>>;

    /// `None` means the desktop can't tell, and every process of the current user is considered
    /// user-facing.
    fn windowed_processes(&mut self) -> Result<Option<HashSet<ProcessId>>>;
}

/// Serves as a cross-compatible ProcessSource implementation.
pub struct GenericProcessSource {
    inner: Box<dyn ProcessSource>,
}

fn platform_probe() -> Result<Box<dyn DesktopProbe>> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "win")] {
            use win::WindowsProbe;
            Ok(Box::new(WindowsProbe::new()))
        }
        else if #[cfg(feature = "x11")] {
            use x11::X11Probe;
            Ok(Box::new(X11Probe::new()?))
        }
        else {
            Ok(Box::new(HeadlessProbe))
        }
    }
}

impl GenericProcessSource {
    pub fn new(termination_poll_interval: Duration) -> Result<Self> {
        Ok(Self {
            inner: Box::new(SystemProcessSource::new(
                platform_probe()?,
                termination_poll_interval,
            )),
        })
    }
}

impl ProcessSource for GenericProcessSource {
    fn list_foreground_capable_processes(&mut self) -> Result<Vec<ProcessSnapshot>> {
        self.inner.list_foreground_capable_processes()
    }

    fn subscribe_to_termination(&mut self, handler: TerminationHandler) -> Result<()> {
        self.inner.subscribe_to_termination(handler)
    }
}

impl fmt::Display for ProcessSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.display_name.as_deref().unwrap_or("<unnamed>"),
            self.process_id
        )
    }
}

/// Drops terminated processes and orders the rest by name, then process id.
pub fn running_by_name(mut apps: Vec<ProcessSnapshot>) -> Vec<ProcessSnapshot> {
    apps.retain(|v| !v.is_terminated);
    apps.sort_by(|a, b| (&a.display_name, a.process_id).cmp(&(&b.display_name, b.process_id)));
    apps
}

#[cfg(test)]
pub(crate) fn test_snapshot(process_id: ProcessId, name: &str, is_foreground: bool) -> ProcessSnapshot {
    ProcessSnapshot {
        process_id,
        display_name: Some(name.into()),
        bundle_identifier: Some(format!("/usr/bin/{name}").into()),
        icon: None,
        is_foreground,
        is_terminated: false,
    }
}
