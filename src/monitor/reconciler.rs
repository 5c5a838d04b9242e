//! Brings watch-list statuses in line with a fresh process listing and turns the result into a
//! run/pause decision for the timer.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::process_api::{ProcessId, ProcessSnapshot};

use super::{
    config::RelaunchPolicy,
    entities::MonitorStatus,
    watch_list::WatchList,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// At least one watched application is in the foreground.
    Run,
    Pause,
    /// There is nothing to watch.
    NothingApp,
}

fn status_of(snapshot: &ProcessSnapshot) -> MonitorStatus {
    if snapshot.is_foreground {
        MonitorStatus::Active
    } else {
        MonitorStatus::NotActive
    }
}

pub fn reconcile(
    list: &mut WatchList,
    live: &[ProcessSnapshot],
    policy: RelaunchPolicy,
) -> Decision {
    let by_id = live
        .iter()
        .filter(|v| !v.is_terminated)
        .map(|v| (v.process_id, v))
        .collect::<HashMap<_, _>>();

    for app in list.entries_mut() {
        let status = by_id
            .get(&app.process_id)
            .map_or(MonitorStatus::RemovedFromSystem, |v| status_of(v));
        if status != app.status {
            debug!("{} changed {} -> {}", app.process_id, app.status, status);
            app.status = status;
        }
    }

    if policy == RelaunchPolicy::BundleIdentifier {
        resurrect(list, &by_id);
    }

    if list.is_empty() {
        Decision::NothingApp
    } else if list.any_active() {
        Decision::Run
    } else {
        Decision::Pause
    }
}

/// Rebinds removed entries to a live process with the same bundle identifier. Foreground
/// candidates win, then the lowest process id.
fn resurrect(list: &mut WatchList, by_id: &HashMap<ProcessId, &ProcessSnapshot>) {
    let removed = list
        .all()
        .into_iter()
        .filter(|app| app.status == MonitorStatus::RemovedFromSystem)
        .filter_map(|app| app.bundle_identifier.map(|bundle| (app.process_id, bundle)))
        .collect::<Vec<_>>();
    if removed.is_empty() {
        return;
    }

    let mut claimed = HashSet::new();
    for (process_id, bundle) in removed {
        let candidate = by_id
            .values()
            .filter(|v| v.bundle_identifier.as_ref() == Some(&bundle))
            .filter(|v| !list.contains(v.process_id) && !claimed.contains(&v.process_id))
            .min_by_key(|v| (!v.is_foreground, v.process_id));
        let Some(candidate) = candidate else {
            continue;
        };

        if let Some(app) = list.rebind(process_id, candidate.process_id) {
            info!("{bundle} relaunched as {}", candidate.process_id);
            app.status = status_of(candidate);
            app.display_name = candidate.display_name.clone();
            app.icon = candidate.icon.clone();
            claimed.insert(candidate.process_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_api::test_snapshot;

    fn watch(items: &[ProcessSnapshot]) -> WatchList {
        let mut list = WatchList::new();
        for item in items {
            list.select(item.clone()).unwrap();
        }
        list
    }

    #[test]
    fn background_apps_pause() {
        let live = [test_snapshot(1, "a", false), test_snapshot(2, "b", false)];
        let mut list = watch(&live);

        let decision = reconcile(&mut list, &live, RelaunchPolicy::default());

        assert_eq!(decision, Decision::Pause);
        assert!(list.all().iter().all(|v| v.status == MonitorStatus::NotActive));
    }

    #[test]
    fn foreground_app_runs() {
        let mut list = watch(&[test_snapshot(1, "a", false), test_snapshot(2, "b", false)]);
        let live = [test_snapshot(1, "a", true), test_snapshot(2, "b", false)];

        let decision = reconcile(&mut list, &live, RelaunchPolicy::default());

        assert_eq!(decision, Decision::Run);
        assert_eq!(list.get(1).unwrap().status, MonitorStatus::Active);
        assert_eq!(list.get(2).unwrap().status, MonitorStatus::NotActive);
    }

    #[test]
    fn missing_process_is_removed() {
        let mut list = watch(&[test_snapshot(1, "a", true), test_snapshot(2, "b", false)]);
        let live = [test_snapshot(2, "b", false)];

        let decision = reconcile(&mut list, &live, RelaunchPolicy::default());

        assert_eq!(decision, Decision::Pause);
        assert_eq!(list.get(1).unwrap().status, MonitorStatus::RemovedFromSystem);
    }

    #[test]
    fn terminated_snapshot_counts_as_missing() {
        let mut list = watch(&[test_snapshot(1, "a", false)]);
        let mut zombie = test_snapshot(1, "a", true);
        zombie.is_terminated = true;

        reconcile(&mut list, &[zombie], RelaunchPolicy::default());

        assert_eq!(list.get(1).unwrap().status, MonitorStatus::RemovedFromSystem);
    }

    #[test]
    fn empty_list_is_nothing_app() {
        let mut list = WatchList::new();

        let decision = reconcile(&mut list, &[test_snapshot(1, "a", true)], RelaunchPolicy::default());

        assert_eq!(decision, Decision::NothingApp);
    }

    #[test]
    fn relaunch_resurrects_by_bundle() {
        let mut list = watch(&[test_snapshot(1, "a", false)]);
        reconcile(&mut list, &[], RelaunchPolicy::BundleIdentifier);
        assert_eq!(list.get(1).unwrap().status, MonitorStatus::RemovedFromSystem);

        let live = [test_snapshot(5, "a", true)];
        let decision = reconcile(&mut list, &live, RelaunchPolicy::BundleIdentifier);

        assert_eq!(decision, Decision::Run);
        assert!(!list.contains(1));
        assert_eq!(list.get(5).unwrap().status, MonitorStatus::Active);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn relaunch_prefers_foreground_candidate() {
        let mut list = watch(&[test_snapshot(1, "a", false)]);
        let live = [
            test_snapshot(3, "a", false),
            test_snapshot(7, "a", true),
            test_snapshot(9, "b", false),
        ];

        reconcile(&mut list, &live, RelaunchPolicy::BundleIdentifier);

        assert_eq!(list.get(7).unwrap().status, MonitorStatus::Active);
    }

    #[test]
    fn relaunch_ignored_with_process_id_policy() {
        let mut list = watch(&[test_snapshot(1, "a", false)]);
        let live = [test_snapshot(5, "a", true)];

        let decision = reconcile(&mut list, &live, RelaunchPolicy::ProcessIdOnly);

        assert_eq!(decision, Decision::Pause);
        assert_eq!(list.get(1).unwrap().status, MonitorStatus::RemovedFromSystem);
        assert!(!list.contains(5));
    }

    #[test]
    fn relaunch_does_not_steal_watched_process() {
        let mut list = watch(&[test_snapshot(1, "a", false), test_snapshot(2, "a", false)]);
        let live = [test_snapshot(2, "a", false)];

        reconcile(&mut list, &live, RelaunchPolicy::BundleIdentifier);

        assert_eq!(list.get(1).unwrap().status, MonitorStatus::RemovedFromSystem);
        assert_eq!(list.get(2).unwrap().status, MonitorStatus::NotActive);
    }
}
