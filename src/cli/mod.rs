pub mod input;
pub mod render;
pub mod watch;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use watch::{process_watch_command, WatchCommand};

use crate::{
    monitor::config::MonitorConfig,
    process_api::{running_by_name, GenericProcessSource, ProcessSnapshot, ProcessSource},
    utils::{
        dir::create_application_default_path, logging::enable_logging,
        runtime::single_thread_runtime,
    },
};

#[derive(Parser, Debug)]
#[command(name = "focuswatch", version, long_about = None)]
#[command(about = "Measures how long selected applications stay in the foreground", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory for logs. By default $XDG_STATE_HOME/focuswatch or $HOME/.local/state/focuswatch"
    )]
    dir: Option<PathBuf>,
    #[arg(long = "log-filter", global = true, help = "Log level. Falls back to RUST_LOG, then info")]
    log: Option<LevelFilter>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console", global = true)]
    log_console: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "List applications that can be watched")]
    Apps {
        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },
    #[command(about = "Watch applications and count the time they spend in the foreground")]
    Watch {
        #[command(flatten)]
        command: WatchCommand,
    },
}

pub fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(&app_dir, args.log, args.log_console)?;

    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(async move {
        match args.commands {
            Commands::Apps { json } => process_apps_command(json),
            Commands::Watch { command } => process_watch_command(command).await,
        }
    });
    // A pending stdin read would otherwise keep the runtime alive until the next line.
    runtime.shutdown_background();
    result
}

/// Running, user-facing applications ordered by name.
pub fn available_apps(source: &mut impl ProcessSource) -> Result<Vec<ProcessSnapshot>> {
    Ok(running_by_name(source.list_foreground_capable_processes()?))
}

fn process_apps_command(json: bool) -> Result<()> {
    let mut source = GenericProcessSource::new(MonitorConfig::default().termination_poll_interval)?;
    let apps = available_apps(&mut source)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&apps)?);
    } else {
        print!("{}", render::app_table(&apps));
    }
    Ok(())
}
