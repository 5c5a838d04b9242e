use thiserror::Error;

use crate::process_api::ProcessId;

/// Recoverable failures of monitor commands. None of them stop the session, they end up in
/// [MonitorSnapshot::last_error](super::entities::MonitorSnapshot::last_error).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("process {process_id} is already watched")]
    DuplicateSelection { process_id: ProcessId },
    #[error("process {process_id} is not running")]
    UnknownProcess { process_id: ProcessId },
    #[error("failed to query running processes: {0}")]
    ProcessQueryFailure(String),
    #[error("invalid command: {0}")]
    InvalidCommand(&'static str),
}

impl From<anyhow::Error> for MonitorError {
    fn from(value: anyhow::Error) -> Self {
        MonitorError::ProcessQueryFailure(format!("{value:#}"))
    }
}
