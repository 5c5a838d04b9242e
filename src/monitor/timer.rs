/// Second counters for a monitoring session.
///
/// `productive_seconds` only grows for a second during which the user played the session and a
/// watched application stayed in the foreground from one reconciliation to the next. `total_seconds` grows on every tick from the
/// first [TimerEngine::play] until [TimerEngine::reset].
#[derive(Debug, Default)]
pub struct TimerEngine {
    productive_seconds: u64,
    total_seconds: u64,
    started: bool,
    armed: bool,
    focused: bool,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when this call started the session.
    pub fn play(&mut self) -> bool {
        self.armed = true;
        !std::mem::replace(&mut self.started, true)
    }

    pub fn pause(&mut self) {
        self.armed = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records the reconciler's verdict. It only gates counting, it never arms a paused timer.
    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// Accounts one elapsed second. It is productive only if the gate was open during it and a
    /// watched application is still focused at its end.
    pub fn advance(&mut self, still_focused: bool) {
        if !self.started {
            return;
        }
        self.total_seconds += 1;
        if self.is_counting() && still_focused {
            self.productive_seconds += 1;
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_counting(&self) -> bool {
        self.started && self.armed && self.focused
    }

    pub fn productive_seconds(&self) -> u64 {
        self.productive_seconds
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }
}

/// Renders `MM:SS`. There is no hour field, an hour is `60:00`.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Renders `HH:MM:SS` for long summaries.
pub fn format_elapsed_long(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    )
}
