use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::Result;
use sysinfo::{
    get_current_pid, Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System,
    Uid, UpdateKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace};

use super::{
    DesktopProbe, ProcessId, ProcessSnapshot, ProcessSource, TerminationHandler,
    TerminationNotice,
};

/// Used when no desktop integration is compiled in. It can't see focus, so nothing is ever
/// reported as foreground.
pub struct HeadlessProbe;

impl DesktopProbe for HeadlessProbe {
    fn foreground_process(&mut self) -> Result<Option<ProcessId>> {
        Ok(None)
    }

    fn windowed_processes(&mut self) -> Result<Option<HashSet<ProcessId>>> {
        Ok(None)
    }
}

/// [ProcessSource] on top of sysinfo. Desktop specific knowledge comes from the [DesktopProbe].
pub struct SystemProcessSource {
    system: System,
    probe: Box<dyn DesktopProbe>,
    termination_poll_interval: Duration,
    watcher_shutdown: CancellationToken,
}

impl SystemProcessSource {
    pub fn new(probe: Box<dyn DesktopProbe>, termination_poll_interval: Duration) -> Self {
        Self {
            system: System::new(),
            probe,
            termination_poll_interval,
            watcher_shutdown: CancellationToken::new(),
        }
    }
}

impl Drop for SystemProcessSource {
    fn drop(&mut self) {
        self.watcher_shutdown.cancel();
    }
}

/// Status is always refreshed. Exe and user never change for a running process.
fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_exe(UpdateKind::OnlyIfNotSet)
        .with_user(UpdateKind::OnlyIfNotSet)
}

fn refresh(system: &mut System) {
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
}

fn current_user(system: &System) -> Option<Uid> {
    let pid = get_current_pid().ok()?;
    system.process(pid).and_then(|p| p.user_id()).cloned()
}

/// Without a window list the best guess is a real executable owned by whoever runs us.
fn is_user_facing(process: &Process, user: Option<&Uid>) -> bool {
    if process.exe().is_none() {
        return false;
    }
    match user {
        Some(user) => process.user_id() == Some(user),
        None => true,
    }
}

fn identity(process: &Process) -> Option<Arc<str>> {
    process.exe().and_then(|v| v.to_str()).map(Arc::from)
}

fn snapshot_of(process: &Process, foreground: Option<ProcessId>) -> ProcessSnapshot {
    let process_id = process.pid().as_u32();
    ProcessSnapshot {
        process_id,
        display_name: Some(Arc::from(&*process.name().to_string_lossy())),
        bundle_identifier: identity(process),
        icon: None,
        is_foreground: foreground == Some(process_id),
        is_terminated: matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
    }
}

impl ProcessSource for SystemProcessSource {
    #[instrument(skip(self))]
    fn list_foreground_capable_processes(&mut self) -> Result<Vec<ProcessSnapshot>> {
        refresh(&mut self.system);
        let foreground = self.probe.foreground_process()?;
        let windowed = self.probe.windowed_processes()?;
        let user = current_user(&self.system);

        let snapshots = self
            .system
            .processes()
            .values()
            // Threads show up as processes on Linux.
            .filter(|p| p.thread_kind().is_none())
            .filter(|p| match &windowed {
                Some(windowed) => windowed.contains(&p.pid().as_u32()),
                None => is_user_facing(p, user.as_ref()),
            })
            .map(|p| snapshot_of(p, foreground))
            .collect::<Vec<_>>();
        trace!("Found {} foreground capable processes", snapshots.len());
        Ok(snapshots)
    }

    fn subscribe_to_termination(&mut self, handler: TerminationHandler) -> Result<()> {
        let shutdown = self.watcher_shutdown.clone();
        let interval = self.termination_poll_interval;
        thread::Builder::new()
            .name("termination-watcher".into())
            .spawn(move || watch_terminations(handler, interval, shutdown))
            .inspect_err(|e| error!("Failed to spawn termination watcher {e:?}"))?;
        info!("Subscribed to process terminations");
        Ok(())
    }
}

fn known_processes(system: &System) -> HashMap<Pid, Option<Arc<str>>> {
    system
        .processes()
        .iter()
        .filter(|(_, p)| p.thread_kind().is_none())
        .map(|(pid, p)| (*pid, identity(p)))
        .collect()
}

/// Returns every process present in `previous` but missing from `current`.
fn vanished(
    previous: &HashMap<Pid, Option<Arc<str>>>,
    current: &HashMap<Pid, Option<Arc<str>>>,
) -> Vec<TerminationNotice> {
    previous
        .iter()
        .filter(|(pid, _)| !current.contains_key(pid))
        .map(|(pid, identity)| TerminationNotice {
            process_id: pid.as_u32(),
            bundle_identifier: identity.clone(),
        })
        .collect()
}

/// Polls the process table on its own [System] and reports processes that disappeared since the
/// previous poll. Runs until `shutdown` is cancelled.
fn watch_terminations(handler: TerminationHandler, interval: Duration, shutdown: CancellationToken) {
    let mut system = System::new();
    refresh(&mut system);
    let mut previous = known_processes(&system);

    while !shutdown.is_cancelled() {
        thread::sleep(interval);
        refresh(&mut system);
        let current = known_processes(&system);
        for notice in vanished(&previous, &current) {
            debug!("Process {} terminated", notice.process_id);
            handler(notice);
        }
        previous = current;
    }
    debug!("Termination watcher stopped");
}
