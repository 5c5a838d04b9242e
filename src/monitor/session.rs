use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::{
    process_api::{running_by_name, ProcessId, ProcessSnapshot, ProcessSource, TerminationNotice},
    utils::clock::Clock,
};

use super::{
    config::RelaunchPolicy,
    entities::{MonitorSnapshot, ViewStatus},
    error::MonitorError,
    reconciler::{reconcile, Decision},
    timer::TimerEngine,
    watch_list::WatchList,
};

/// State of one monitoring session together with the process source it reconciles against.
///
/// Every mutation goes through `&mut self`, so whoever owns the session serializes commands,
/// terminations and ticks by construction.
pub struct Session {
    source: Box<dyn ProcessSource>,
    watch_list: WatchList,
    timer: TimerEngine,
    view_status: ViewStatus,
    available_apps: Vec<ProcessSnapshot>,
    pending_terminations: VecDeque<TerminationNotice>,
    relaunch_policy: RelaunchPolicy,
    clock: Box<dyn Clock>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<MonitorError>,
}

impl Session {
    pub fn new(
        source: Box<dyn ProcessSource>,
        relaunch_policy: RelaunchPolicy,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            source,
            watch_list: WatchList::new(),
            timer: TimerEngine::new(),
            view_status: ViewStatus::Inactive,
            available_apps: Vec::new(),
            pending_terminations: VecDeque::new(),
            relaunch_policy,
            clock,
            started_at: None,
            last_error: None,
        }
    }

    /// Stores the outcome of a command so presentation can see it in the next snapshot.
    fn record<T>(&mut self, result: Result<T, MonitorError>) -> Result<T, MonitorError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => {
                warn!("{e}");
                self.last_error = Some(e.clone());
            }
        }
        result
    }

    fn query(&mut self) -> Result<Vec<ProcessSnapshot>, MonitorError> {
        Ok(self.source.list_foreground_capable_processes()?)
    }

    pub fn refresh_available_apps(&mut self) -> Result<(), MonitorError> {
        let result = self.query().map(|apps| {
            self.available_apps = running_by_name(apps);
            debug!("{} applications available", self.available_apps.len());
        });
        self.record(result)
    }

    pub fn select_app(&mut self, process_id: ProcessId) -> Result<(), MonitorError> {
        let result = self.select_inner(process_id);
        self.record(result)
    }

    fn select_inner(&mut self, process_id: ProcessId) -> Result<(), MonitorError> {
        if self.watch_list.contains(process_id) {
            return Err(MonitorError::DuplicateSelection { process_id });
        }
        let snapshot = match find_snapshot(&self.available_apps, process_id) {
            Some(v) => v,
            None => {
                self.refresh_available_apps()?;
                find_snapshot(&self.available_apps, process_id)
                    .ok_or(MonitorError::UnknownProcess { process_id })?
            }
        };
        self.watch_list.select(snapshot)?;
        if self.view_status == ViewStatus::NothingApp {
            self.view_status = ViewStatus::Inactive;
        }
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), MonitorError> {
        let result = if self.watch_list.is_empty() {
            self.view_status = ViewStatus::NothingApp;
            Err(MonitorError::InvalidCommand(
                "play needs at least one watched application",
            ))
        } else {
            if self.timer.play() {
                self.started_at = Some(self.clock.time());
                info!("Session started");
            }
            self.view_status = ViewStatus::Active;
            Ok(())
        };
        self.record(result)
    }

    pub fn pause(&mut self) -> Result<(), MonitorError> {
        let result = if self.timer.is_started() {
            self.timer.pause();
            self.view_status = ViewStatus::NotActive;
            info!("Session paused");
            Ok(())
        } else {
            Err(MonitorError::InvalidCommand("pause before play"))
        };
        self.record(result)
    }

    pub fn reset(&mut self) {
        self.timer.reset();
        self.watch_list.reset();
        self.pending_terminations.clear();
        self.view_status = ViewStatus::Inactive;
        self.started_at = None;
        self.last_error = None;
        info!("Session reset");
    }

    /// Queues a notice for a watched process. It takes effect on the next tick, or on
    /// [Session::apply_pending_terminations] when no tick is scheduled. Other notices are dropped.
    pub fn notify_terminated(&mut self, notice: TerminationNotice) {
        if !self.watch_list.contains(notice.process_id) {
            trace!("Ignoring termination of unwatched {}", notice.process_id);
            return;
        }
        self.pending_terminations.push_back(notice);
    }

    /// Returns whether any watched entry was affected.
    pub fn apply_pending_terminations(&mut self) -> bool {
        let mut affected = false;
        while let Some(notice) = self.pending_terminations.pop_front() {
            affected |= self.watch_list.on_terminated(notice.process_id);
        }
        affected
    }

    /// One scheduling step: terminations, reconciliation, the elapsed second, then the decision
    /// for the next second. The elapsed second is productive only if a watched application was
    /// focused at both of its ends. A failed process query skips the whole step.
    pub fn tick(&mut self) -> Result<(), MonitorError> {
        if !self.timer.is_started() {
            self.apply_pending_terminations();
            return Ok(());
        }

        let live = match self.query() {
            Ok(v) => v,
            Err(e) => return self.record(Err(e)),
        };

        self.apply_pending_terminations();
        let decision = reconcile(&mut self.watch_list, &live, self.relaunch_policy);
        self.timer.advance(self.watch_list.any_active());
        self.apply_decision(decision);
        debug!(
            "Tick {decision:?} productive {} total {}",
            self.timer.productive_seconds(),
            self.timer.total_seconds()
        );
        if matches!(self.last_error, Some(MonitorError::ProcessQueryFailure(_))) {
            self.last_error = None;
        }
        Ok(())
    }

    fn apply_decision(&mut self, decision: Decision) {
        let previous = self.view_status;
        match decision {
            Decision::NothingApp => {
                self.timer.set_focused(false);
                self.view_status = ViewStatus::NothingApp;
            }
            Decision::Run => {
                self.timer.set_focused(true);
                if self.timer.is_armed() {
                    self.view_status = ViewStatus::Active;
                }
            }
            Decision::Pause => {
                self.timer.set_focused(false);
                if self.timer.is_armed() {
                    self.view_status = ViewStatus::NotActive;
                }
            }
        }
        if previous != self.view_status {
            info!("Session {previous:?} -> {:?}", self.view_status);
        }
    }

    pub fn is_started(&self) -> bool {
        self.timer.is_started()
    }

    pub fn view_status(&self) -> ViewStatus {
        self.view_status
    }

    pub fn productive_seconds(&self) -> u64 {
        self.timer.productive_seconds()
    }

    pub fn total_seconds(&self) -> u64 {
        self.timer.total_seconds()
    }

    pub fn watch_list(&self) -> &WatchList {
        &self.watch_list
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            view_status: self.view_status,
            productive_seconds: self.timer.productive_seconds(),
            total_seconds: self.timer.total_seconds(),
            watched_apps: self.watch_list.all(),
            available_apps: self.available_apps.clone(),
            started_at: self.started_at,
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }
}

fn find_snapshot(apps: &[ProcessSnapshot], process_id: ProcessId) -> Option<ProcessSnapshot> {
    apps.iter().find(|v| v.process_id == process_id).cloned()
}
