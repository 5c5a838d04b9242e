use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::process_api::{IconHandle, ProcessId, ProcessSnapshot};

/// Status of a single watched application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MonitorStatus {
    /// The application owns the focused window.
    Active,
    /// Running in the background.
    NotActive,
    /// The process vanished while it was watched.
    RemovedFromSystem,
}

/// Session level summary shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewStatus {
    #[default]
    Inactive,
    Active,
    NotActive,
    NothingApp,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Active => write!(f, "active"),
            MonitorStatus::NotActive => write!(f, "not active"),
            MonitorStatus::RemovedFromSystem => write!(f, "removed"),
        }
    }
}

impl fmt::Display for ViewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewStatus::Inactive => write!(f, "Inactive"),
            ViewStatus::Active => write!(f, "Monitoring active"),
            ViewStatus::NotActive => write!(f, "Monitoring paused"),
            ViewStatus::NothingApp => write!(f, "No application is being watched"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedApp {
    pub process_id: ProcessId,
    pub display_name: Option<Arc<str>>,
    pub bundle_identifier: Option<Arc<str>>,
    pub icon: Option<IconHandle>,
    pub status: MonitorStatus,
}

impl From<ProcessSnapshot> for WatchedApp {
    /// New entries always start as [MonitorStatus::NotActive]. Focus is only ever decided by the
    /// reconciler.
    fn from(
        ProcessSnapshot {
            process_id,
            display_name,
            bundle_identifier,
            icon,
            ..
        }: ProcessSnapshot,
    ) -> Self {
        WatchedApp {
            process_id,
            display_name,
            bundle_identifier,
            icon,
            status: MonitorStatus::NotActive,
        }
    }
}

/// Read-only copy of everything presentation is allowed to see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub view_status: ViewStatus,
    pub productive_seconds: u64,
    pub total_seconds: u64,
    pub watched_apps: Vec<WatchedApp>,
    pub available_apps: Vec<ProcessSnapshot>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
