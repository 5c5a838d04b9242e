//! The monitoring core. [MonitorService] owns a [Session] and is the only place it gets mutated:
//! commands, termination notices and ticks are all handled on its event loop.

use std::{future, time::Duration};

use anyhow::Result;
use config::MonitorConfig;
use entities::MonitorSnapshot;
use session::Session;
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span};

use crate::{
    process_api::{ProcessId, ProcessSource, TerminationNotice},
    utils::clock::Clock,
};

pub mod config;
pub mod entities;
pub mod error;
pub mod reconciler;
pub mod session;
pub mod shutdown;
pub mod timer;
pub mod watch_list;

/// Inbound commands from presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectApp(ProcessId),
    Play,
    Pause,
    Reset,
    RefreshAvailableApps,
}

/// Presentation side of a running [MonitorService].
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<MonitorSnapshot>,
}

impl MonitorHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .inspect_err(|e| error!("Monitor is not running {e:?}"))?;
        Ok(())
    }

    /// Latest published state.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.state.clone()
    }
}

pub struct MonitorService {
    session: Session,
    commands: mpsc::Receiver<Command>,
    terminations: mpsc::UnboundedReceiver<TerminationNotice>,
    state: watch::Sender<MonitorSnapshot>,
    shutdown: CancellationToken,
    tick_interval: Duration,
    clock: Box<dyn Clock>,
}

/// Builds the service around `source` and subscribes to its terminations. The service does
/// nothing until [MonitorService::run] is polled.
pub fn create_monitor(
    mut source: impl ProcessSource + 'static,
    config: &MonitorConfig,
    shutdown: CancellationToken,
    clock: impl Clock + Clone,
) -> Result<(MonitorService, MonitorHandle)> {
    let (termination_sender, terminations) = mpsc::unbounded_channel();
    source.subscribe_to_termination(Box::new(move |notice| {
        // The receiver is gone only after the service stopped.
        let _ = termination_sender.send(notice);
    }))?;

    let session = Session::new(Box::new(source), config.relaunch_policy, Box::new(clock.clone()));
    let (command_sender, commands) = mpsc::channel(16);
    let (state_sender, state) = watch::channel(session.snapshot());

    let service = MonitorService {
        session,
        commands,
        terminations,
        state: state_sender,
        shutdown,
        tick_interval: config.tick_interval,
        clock: Box::new(clock),
    };
    let handle = MonitorHandle {
        commands: command_sender,
        state,
    };
    Ok((service, handle))
}

impl MonitorService {
    /// Returns the deadline of the next tick after the command, `None` stops ticking.
    fn apply(&mut self, command: Command, next_tick: Option<Instant>) -> Option<Instant> {
        info!("Received {command:?}");
        // Errors are already recorded in the session and show up in the next snapshot.
        let _ = match command {
            Command::SelectApp(process_id) => self.session.select_app(process_id),
            Command::Play => self.session.play(),
            Command::Pause => self.session.pause(),
            Command::RefreshAvailableApps => self.session.refresh_available_apps(),
            Command::Reset => {
                self.session.reset();
                return None;
            }
        };
        match next_tick {
            None if self.session.is_started() => Some(self.clock.instant() + self.tick_interval),
            other => other,
        }
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot();
        self.state.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Executes the monitor event loop until shutdown or until every [MonitorHandle] is dropped.
    pub async fn run(mut self) -> Result<()> {
        let mut next_tick: Option<Instant> = None;
        loop {
            let clock = &self.clock;
            let tick = async move {
                match next_tick {
                    Some(at) => clock.sleep_until(at).await,
                    None => future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Monitor shutting down");
                    return Ok(())
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        info!("All monitor handles dropped");
                        return Ok(())
                    };
                    next_tick = self.apply(command, next_tick);
                }
                Some(notice) = self.terminations.recv() => {
                    debug!("Termination of {}", notice.process_id);
                    self.session.notify_terminated(notice);
                    if next_tick.is_none() {
                        self.session.apply_pending_terminations();
                    }
                }
                _ = tick => {
                    if let Err(e) = info_span!("Monitor tick").in_scope(|| self.session.tick()) {
                        error!("Tick skipped {e}");
                    }
                    next_tick = next_tick.map(|at| at + self.tick_interval);
                }
            }

            self.publish();
        }
    }
}

#[cfg(test)]
mod monitor_tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::Result;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{
        config::{MonitorConfig, RelaunchPolicy},
        create_monitor,
        entities::{MonitorStatus, ViewStatus},
        session::tests::{scripted_source, SharedProcesses, TestClock},
        Command,
    };
    use crate::{
        process_api::{test_snapshot, MockProcessSource, TerminationHandler, TerminationNotice},
        utils::logging::TEST_LOGGING,
    };

    fn config() -> MonitorConfig {
        MonitorConfig {
            tick_interval: Duration::from_secs(1),
            termination_poll_interval: Duration::from_millis(500),
            relaunch_policy: RelaunchPolicy::BundleIdentifier,
        }
    }

    /// Lets the service loop process everything that is ready without moving time.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counts_focused_time() -> Result<()> {
        *TEST_LOGGING;
        let processes: SharedProcesses = Arc::new(Mutex::new(Ok(vec![
            test_snapshot(1, "a", true),
            test_snapshot(2, "b", false),
        ])));
        let shutdown = CancellationToken::new();
        let (service, handle) = create_monitor(
            scripted_source(&processes),
            &config(),
            shutdown.clone(),
            TestClock,
        )?;
        let runner = tokio::spawn(service.run());

        handle.send(Command::RefreshAvailableApps).await?;
        handle.send(Command::SelectApp(1)).await?;
        handle.send(Command::SelectApp(2)).await?;
        handle.send(Command::Play).await?;
        settle().await;
        assert_eq!(handle.snapshot().view_status, ViewStatus::Active);

        tokio::time::sleep(Duration::from_millis(5500)).await;
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.total_seconds, 5);
        // The first tick only finds out about focus.
        assert_eq!(snapshot.productive_seconds, 4);
        assert_eq!(snapshot.watched_apps[0].status, MonitorStatus::Active);

        shutdown.cancel();
        runner.await??;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn focus_loss_stops_counting_on_that_tick() -> Result<()> {
        *TEST_LOGGING;
        let processes: SharedProcesses =
            Arc::new(Mutex::new(Ok(vec![test_snapshot(1, "a", true)])));
        let shutdown = CancellationToken::new();
        let (service, handle) = create_monitor(
            scripted_source(&processes),
            &config(),
            shutdown.clone(),
            TestClock,
        )?;
        let runner = tokio::spawn(service.run());

        handle.send(Command::SelectApp(1)).await?;
        handle.send(Command::Play).await?;
        tokio::time::sleep(Duration::from_millis(3500)).await;
        settle().await;
        assert_eq!(handle.snapshot().productive_seconds, 2);

        *processes.lock().unwrap() = Ok(vec![test_snapshot(1, "a", false)]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.view_status, ViewStatus::NotActive);
        assert_eq!(snapshot.total_seconds, 4);
        assert_eq!(snapshot.productive_seconds, 2);

        shutdown.cancel();
        runner.await??;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_reset_stop_counting() -> Result<()> {
        *TEST_LOGGING;
        let processes: SharedProcesses =
            Arc::new(Mutex::new(Ok(vec![test_snapshot(1, "a", true)])));
        let shutdown = CancellationToken::new();
        let (service, handle) = create_monitor(
            scripted_source(&processes),
            &config(),
            shutdown.clone(),
            TestClock,
        )?;
        let runner = tokio::spawn(service.run());

        handle.send(Command::SelectApp(1)).await?;
        handle.send(Command::Play).await?;
        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.send(Command::Pause).await?;
        settle().await;
        let paused = handle.snapshot();
        assert_eq!(paused.view_status, ViewStatus::NotActive);
        assert_eq!(paused.productive_seconds, 2);

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;
        let later = handle.snapshot();
        assert_eq!(later.productive_seconds, 2);
        assert_eq!(later.total_seconds, 6);
        assert_eq!(later.view_status, ViewStatus::NotActive);

        handle.send(Command::Reset).await?;
        settle().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;
        let reset = handle.snapshot();
        assert_eq!(reset.view_status, ViewStatus::Inactive);
        assert_eq!(reset.total_seconds, 0);
        assert_eq!(reset.productive_seconds, 0);
        assert!(reset.watched_apps.is_empty());

        drop(handle);
        runner.await??;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn play_without_apps_reports_nothing_app() -> Result<()> {
        *TEST_LOGGING;
        let processes: SharedProcesses = Arc::new(Mutex::new(Ok(vec![])));
        let shutdown = CancellationToken::new();
        let (service, handle) = create_monitor(
            scripted_source(&processes),
            &config(),
            shutdown.clone(),
            TestClock,
        )?;
        let runner = tokio::spawn(service.run());

        handle.send(Command::Play).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.view_status, ViewStatus::NothingApp);
        assert_eq!(snapshot.total_seconds, 0);
        assert!(snapshot.last_error.is_some());

        shutdown.cancel();
        runner.await??;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn termination_notice_marks_app_removed() -> Result<()> {
        *TEST_LOGGING;
        let handler: Arc<Mutex<Option<TerminationHandler>>> = Arc::new(Mutex::new(None));
        let mut source = MockProcessSource::new();
        source
            .expect_list_foreground_capable_processes()
            .returning(|| Ok(vec![test_snapshot(1, "a", true), test_snapshot(2, "b", false)]));
        let stored = handler.clone();
        source
            .expect_subscribe_to_termination()
            .times(1)
            .returning(move |h| {
                *stored.lock().unwrap() = Some(h);
                Ok(())
            });

        let shutdown = CancellationToken::new();
        let (service, handle) = create_monitor(source, &config(), shutdown.clone(), TestClock)?;
        let runner = tokio::spawn(service.run());

        handle.send(Command::SelectApp(1)).await?;
        handle.send(Command::SelectApp(2)).await?;
        settle().await;

        // Delivered from a foreign thread, like a real source would.
        let (done, mut delivered) = mpsc::channel(1);
        let deliver = handler.clone();
        std::thread::spawn(move || {
            if let Some(h) = deliver.lock().unwrap().as_ref() {
                h(TerminationNotice {
                    process_id: 2,
                    bundle_identifier: Some("/usr/bin/b".into()),
                });
            }
            let _ = done.blocking_send(());
        });
        delivered.recv().await;
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.watched_apps.len(), 2);
        assert_eq!(
            snapshot.watched_apps[1].status,
            MonitorStatus::RemovedFromSystem
        );

        shutdown.cancel();
        runner.await??;
        Ok(())
    }
}
