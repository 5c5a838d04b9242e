use std::{fmt::Write, path::PathBuf};

use ansi_term::Colour;

use crate::{
    monitor::{
        entities::{MonitorSnapshot, MonitorStatus, ViewStatus, WatchedApp},
        timer::{format_elapsed, format_elapsed_long},
    },
    process_api::ProcessSnapshot,
};

fn status_colour(status: MonitorStatus) -> Colour {
    match status {
        MonitorStatus::Active => Colour::Green,
        MonitorStatus::NotActive => Colour::Yellow,
        MonitorStatus::RemovedFromSystem => Colour::Red,
    }
}

fn view_colour(status: ViewStatus) -> Colour {
    match status {
        ViewStatus::Inactive => Colour::White,
        ViewStatus::Active => Colour::Green,
        ViewStatus::NotActive => Colour::Yellow,
        ViewStatus::NothingApp => Colour::Red,
    }
}

/// Only the file name of an executable path, '/usr/lib/firefox/firefox' becomes 'firefox'.
fn short_identity(value: &str) -> String {
    PathBuf::from(value)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| value.to_string())
}

fn app_label(app: &WatchedApp) -> String {
    let name = app
        .display_name
        .as_deref()
        .map(str::to_string)
        .or_else(|| app.bundle_identifier.as_deref().map(short_identity))
        .unwrap_or_else(|| "<unnamed>".into());
    format!("{name}({})", app.process_id)
}

/// One line summary of the session.
pub fn status_line(snapshot: &MonitorSnapshot) -> String {
    let mut line = format!(
        "{}\tproductive {}\ttotal {}",
        view_colour(snapshot.view_status).paint(snapshot.view_status.to_string()),
        format_elapsed(snapshot.productive_seconds),
        format_elapsed(snapshot.total_seconds),
    );
    for app in &snapshot.watched_apps {
        let _ = write!(
            line,
            "\t{}",
            status_colour(app.status).paint(app_label(app))
        );
    }
    if let Some(error) = &snapshot.last_error {
        let _ = write!(line, "\t{}", Colour::Red.bold().paint(error.as_str()));
    }
    line
}

/// Printed once the session ends.
pub fn summary(snapshot: &MonitorSnapshot) -> String {
    let share = if snapshot.total_seconds == 0 {
        0
    } else {
        snapshot.productive_seconds * 100 / snapshot.total_seconds
    };
    format!(
        "Productive {} of {} ({share}%)",
        format_elapsed_long(snapshot.productive_seconds),
        format_elapsed_long(snapshot.total_seconds),
    )
}

pub fn app_table(apps: &[ProcessSnapshot]) -> String {
    let mut table = String::new();
    for app in apps {
        let _ = writeln!(
            table,
            "{}\t{}\t{}\t{}",
            app.process_id,
            if app.is_foreground { "*" } else { " " },
            app.display_name.as_deref().unwrap_or("<unnamed>"),
            app.bundle_identifier.as_deref().unwrap_or("")
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_api::test_snapshot;

    fn watched(process_id: u32, name: &str, status: MonitorStatus) -> WatchedApp {
        WatchedApp {
            status,
            ..WatchedApp::from(test_snapshot(process_id, name, false))
        }
    }

    #[test]
    fn status_line_contains_counters_and_apps() {
        let snapshot = MonitorSnapshot {
            view_status: ViewStatus::Active,
            productive_seconds: 65,
            total_seconds: 3600,
            watched_apps: vec![
                watched(1, "editor", MonitorStatus::Active),
                watched(2, "browser", MonitorStatus::RemovedFromSystem),
            ],
            ..Default::default()
        };

        let line = status_line(&snapshot);

        assert!(line.contains("productive 01:05"));
        assert!(line.contains("total 60:00"));
        assert!(line.contains("editor(1)"));
        assert!(line.contains(&Colour::Red.paint("browser(2)").to_string()));
    }

    #[test]
    fn label_falls_back_to_executable_name() {
        let mut app = watched(7, "ignored", MonitorStatus::NotActive);
        app.display_name = None;

        assert_eq!(app_label(&app), "ignored(7)");
    }

    #[test]
    fn summary_reports_share() {
        let snapshot = MonitorSnapshot {
            productive_seconds: 1800,
            total_seconds: 3600,
            ..Default::default()
        };

        assert_eq!(summary(&snapshot), "Productive 00:30:00 of 01:00:00 (50%)");
    }

    #[test]
    fn table_marks_foreground() {
        let table = app_table(&[test_snapshot(3, "term", true)]);

        assert_eq!(table, "3\t*\tterm\t/usr/bin/term\n");
    }
}
