use std::time::Duration;

use clap::ValueEnum;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_TERMINATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Decides what happens to a watched application that quit and was started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RelaunchPolicy {
    /// Entries are bound to a process id forever. A relaunch shows up as a new, unwatched process.
    #[value(name = "pid")]
    ProcessIdOnly,
    /// A removed entry is rebound to a new process with the same bundle identifier.
    #[default]
    #[value(name = "bundle")]
    BundleIdentifier,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub tick_interval: Duration,
    /// How often the system process table is diffed for terminations.
    pub termination_poll_interval: Duration,
    pub relaunch_policy: RelaunchPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            termination_poll_interval: DEFAULT_TERMINATION_POLL_INTERVAL,
            relaunch_policy: RelaunchPolicy::default(),
        }
    }
}
