use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::process_api::{ProcessId, ProcessSnapshot};

use super::{
    entities::{MonitorStatus, WatchedApp},
    error::MonitorError,
};

/// Applications the user asked to monitor, keyed by process id.
#[derive(Debug, Default)]
pub struct WatchList {
    entries: BTreeMap<ProcessId, WatchedApp>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, snapshot: ProcessSnapshot) -> Result<(), MonitorError> {
        let process_id = snapshot.process_id;
        if self.entries.contains_key(&process_id) {
            return Err(MonitorError::DuplicateSelection { process_id });
        }
        info!("Watching {snapshot}");
        self.entries.insert(process_id, snapshot.into());
        Ok(())
    }

    /// Marks the entry as gone. The entry itself stays until [WatchList::reset] so the user can
    /// still see it. Returns whether a watched entry matched.
    pub fn on_terminated(&mut self, process_id: ProcessId) -> bool {
        match self.entries.get_mut(&process_id) {
            Some(app) => {
                debug!("Watched process {process_id} terminated");
                app.status = MonitorStatus::RemovedFromSystem;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Entries ordered by process id.
    pub fn all(&self) -> Vec<WatchedApp> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, process_id: ProcessId) -> Option<&WatchedApp> {
        self.entries.get(&process_id)
    }

    pub fn contains(&self, process_id: ProcessId) -> bool {
        self.entries.contains_key(&process_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn any_active(&self) -> bool {
        self.entries
            .values()
            .any(|app| app.status == MonitorStatus::Active)
    }

    pub(super) fn entries_mut(&mut self) -> impl Iterator<Item = &mut WatchedApp> {
        self.entries.values_mut()
    }

    /// Moves an entry to a new process id. Refuses when the target id is already watched, which
    /// keeps process ids unique.
    pub(super) fn rebind(&mut self, from: ProcessId, to: ProcessId) -> Option<&mut WatchedApp> {
        if from == to || self.entries.contains_key(&to) {
            return None;
        }
        let mut app = self.entries.remove(&from)?;
        app.process_id = to;
        Some(self.entries.entry(to).or_insert(app))
    }
}
