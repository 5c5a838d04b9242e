use anyhow::{anyhow, Result};

use crate::monitor::Command;

/// A line typed into the terminal while watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendCommand {
    Monitor(Command),
    ShowApps,
    Quit,
}

pub const HELP: &str = "commands: play | pause | reset | select <pid> | apps | quit";

pub fn parse_command(line: &str) -> Result<FrontendCommand> {
    let mut words = line.split_whitespace();
    let command = match words.next() {
        Some("play") => FrontendCommand::Monitor(Command::Play),
        Some("pause") => FrontendCommand::Monitor(Command::Pause),
        Some("reset") => FrontendCommand::Monitor(Command::Reset),
        Some("select") => {
            let pid = words
                .next()
                .ok_or_else(|| anyhow!("select needs a process id"))?
                .parse()
                .map_err(|e| anyhow!("invalid process id: {e}"))?;
            FrontendCommand::Monitor(Command::SelectApp(pid))
        }
        Some("apps") => FrontendCommand::ShowApps,
        Some("quit") | Some("exit") => FrontendCommand::Quit,
        Some(other) => return Err(anyhow!("unknown command '{other}'")),
        None => return Err(anyhow!("empty command")),
    };
    match words.next() {
        Some(extra) => Err(anyhow!("unexpected argument '{extra}'")),
        None => Ok(command),
    }
}
