use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    monitor::{
        config::{MonitorConfig, RelaunchPolicy},
        create_monitor,
        shutdown::detect_shutdown,
        Command, MonitorHandle,
    },
    process_api::{GenericProcessSource, ProcessId, ProcessSnapshot},
    utils::clock::DefaultClock,
};

use super::{
    available_apps,
    input::{parse_command, FrontendCommand, HELP},
    render,
};

const APPS_REFRESH_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
pub struct WatchCommand {
    #[arg(long = "pid", help = "Process id of an application to watch. Can be repeated")]
    pids: Vec<ProcessId>,
    #[arg(
        long = "name",
        help = "Watch every running application with this name (case insensitive). Can be repeated"
    )]
    names: Vec<String>,
    #[arg(long, help = "Print every state change as JSON")]
    json: bool,
    #[arg(long = "tick-ms", default_value_t = 1000, help = "Length of one tick in milliseconds")]
    tick_ms: u64,
    #[arg(
        long = "relaunch-policy",
        value_enum,
        default_value_t = RelaunchPolicy::BundleIdentifier,
        help = "How a relaunched application is matched to a removed entry"
    )]
    relaunch_policy: RelaunchPolicy,
    #[arg(long = "no-play", help = "Only select applications, wait for 'play' on stdin")]
    no_play: bool,
}

impl WatchCommand {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            tick_interval: Duration::from_millis(self.tick_ms.max(1)),
            relaunch_policy: self.relaunch_policy,
            ..MonitorConfig::default()
        }
    }
}

/// Process ids of applications whose name matches one of `names`.
fn resolve_names(apps: &[ProcessSnapshot], names: &[String]) -> Vec<ProcessId> {
    apps.iter()
        .filter(|app| {
            app.display_name.as_deref().is_some_and(|display| {
                names.iter().any(|name| name.eq_ignore_ascii_case(display))
            })
        })
        .map(|app| app.process_id)
        .collect()
}

/// Command to process `watch` command. Runs the monitor and a terminal frontend for it until
/// Ctrl-C or `quit`.
pub async fn process_watch_command(command: WatchCommand) -> Result<()> {
    let config = command.monitor_config();
    let mut source = GenericProcessSource::new(config.termination_poll_interval)?;

    let mut pids = command.pids.clone();
    if !command.names.is_empty() {
        let resolved = resolve_names(&available_apps(&mut source)?, &command.names);
        if resolved.is_empty() {
            return Err(anyhow!("No running application matches {:?}", command.names));
        }
        pids.extend(resolved);
    }
    pids.sort_unstable();
    pids.dedup();

    let shutdown = CancellationToken::new();
    let (service, handle) = create_monitor(source, &config, shutdown.clone(), DefaultClock)?;

    let (_, monitor_result, frontend_result) = tokio::join!(
        detect_shutdown(shutdown.clone()),
        service.run(),
        frontend(handle, &command, pids, shutdown),
    );

    if let Err(e) = &monitor_result {
        error!("Monitor got an error {e:?}");
    }
    monitor_result.and(frontend_result)
}

async fn frontend(
    handle: MonitorHandle,
    command: &WatchCommand,
    pids: Vec<ProcessId>,
    shutdown: CancellationToken,
) -> Result<()> {
    // Stops the monitor however the frontend exits.
    let _stop = shutdown.clone().drop_guard();

    handle.send(Command::RefreshAvailableApps).await?;
    for pid in pids {
        handle.send(Command::SelectApp(pid)).await?;
    }
    if !command.no_play {
        handle.send(Command::Play).await?;
    }
    if !command.json {
        println!("{HELP}");
    }

    let mut states = WatchStream::new(handle.subscribe());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(snapshot) = states.next() => {
                if command.json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    println!("{}", render::status_line(&snapshot));
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    info!("Stdin closed, commands are disabled");
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(FrontendCommand::Monitor(monitor_command)) => handle.send(monitor_command).await?,
                    Ok(FrontendCommand::ShowApps) => {
                        let mut updates = handle.subscribe();
                        updates.mark_unchanged();
                        handle.send(Command::RefreshAvailableApps).await?;
                        // An unchanged list publishes nothing, so don't wait forever.
                        let _ = tokio::time::timeout(APPS_REFRESH_WAIT, updates.changed()).await;
                        print!("{}", render::app_table(&handle.snapshot().available_apps));
                    }
                    Ok(FrontendCommand::Quit) => break,
                    Err(e) => println!("{e}. {HELP}"),
                }
            }
        }
    }

    if !command.json {
        println!("{}", render::summary(&handle.snapshot()));
    }
    Ok(())
}
