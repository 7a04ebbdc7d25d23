// SPDX-License-Identifier: MIT

//! Reconciliation Loop: admit → advance → cleanup → sleep.

use crate::state_machine::{dispatch_pseudo_stage, dispatch_stage, recover_from_handler_error};
use apsviz_adapters::{AdmittedRun, ClusterDriverAdapter, NotifyAdapter, StateStoreAdapter};
use apsviz_config::Config;
use apsviz_core::{Clock, Run, RunContext, RunId, Stage};
use indexmap::IndexMap;
use std::time::Instant;

/// Consecutive idle ticks before the loop switches to the long poll interval.
const IDLE_TICKS_BEFORE_LONG_POLL: u32 = 10;
/// Value the idle counter is pinned at once the long interval is active, so
/// the next idle tick re-crosses the threshold and re-triggers the long
/// interval rather than free-running upward.
const IDLE_COUNTER_PIN: u32 = 9;

/// Drives the active run table. Owns no state itself beyond the table and
/// the idle counter; every external effect goes through the adapters.
pub struct ReconciliationLoop<C, S, N, K> {
    cluster: C,
    store: S,
    notify: N,
    clock: K,
    config: Config,
    active: IndexMap<RunId, Run>,
    idle_ticks: u32,
    backed_off: bool,
    last_activity_at: Instant,
}

impl<C, S, N, K> ReconciliationLoop<C, S, N, K>
where
    C: ClusterDriverAdapter,
    S: StateStoreAdapter,
    N: NotifyAdapter,
    K: Clock,
{
    pub fn new(cluster: C, store: S, notify: N, clock: K, config: Config) -> Self {
        let last_activity_at = clock.now();
        Self {
            cluster,
            store,
            notify,
            clock,
            config,
            active: IndexMap::new(),
            idle_ticks: 0,
            backed_off: false,
            last_activity_at,
        }
    }

    #[cfg(test)]
    pub fn active_runs(&self) -> &IndexMap<RunId, Run> {
        &self.active
    }

    #[cfg(test)]
    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Run forever, sleeping between ticks according to the idle-backoff
    /// policy. Exits only if the process is terminated.
    pub async fn run_forever(&mut self) -> ! {
        loop {
            self.tick().await;
            let sleep_for = if self.backed_off {
                self.config.poll_long_sleep()
            } else {
                self.config.poll_short_sleep()
            };
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// One full tick: admit new runs, advance every active run, and update
    /// the idle-backoff counter. Returns whether any run was active this
    /// tick (exposed for tests; `run_forever` only uses it to drive sleep).
    pub async fn tick(&mut self) -> bool {
        self.admit().await;

        let mut activity = false;
        let ids: Vec<RunId> = self.active.keys().cloned().collect();
        let mut to_remove = Vec::new();

        for id in ids {
            let Some(run) = self.active.get_mut(&id) else { continue };

            if matches!(run.stage, Stage::Complete | Stage::Error) {
                match dispatch_pseudo_stage(run, &self.store, &self.notify).await {
                    Ok(outcome) => {
                        activity |= outcome.activity;
                        if outcome.remove {
                            to_remove.push(id);
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            run_id = %id,
                            stage = ?run.stage,
                            error = %e,
                            "pseudo-stage dispatch failed; leaving run in place"
                        );
                    }
                }
                continue;
            }

            match dispatch_stage(run, &self.cluster, &self.store, &self.notify, &self.config)
                .await
            {
                Ok(outcome) => activity |= outcome.activity,
                Err(e) => {
                    tracing::error!(
                        run_id = %id,
                        stage = ?run.stage,
                        error = %e,
                        "stage handler failed; routing run to guaranteed cleanup"
                    );
                    recover_from_handler_error(run, &self.cluster).await;
                    if let Err(persist_err) =
                        self.store.update_status(&id, &run.provenance).await
                    {
                        tracing::error!(
                            run_id = %id,
                            error = %persist_err,
                            "failed to persist handler-error recovery status"
                        );
                    }
                    activity = true;
                }
            }
        }

        for id in to_remove {
            self.active.shift_remove(&id);
        }

        if activity {
            self.idle_ticks = 0;
            self.last_activity_at = self.clock.now();
        } else {
            self.idle_ticks += 1;
        }
        // Decide on the pre-pin value: crossing the threshold picks the long
        // interval, then the counter is pinned back down so the *next* idle
        // tick crosses it again rather than free-running upward.
        self.backed_off = self.idle_ticks >= IDLE_TICKS_BEFORE_LONG_POLL;
        if self.backed_off {
            self.idle_ticks = IDLE_COUNTER_PIN;
        }

        activity
    }

    /// Whether the loop is currently on the long poll interval.
    pub fn is_idle_backed_off(&self) -> bool {
        self.backed_off
    }

    /// Pull admitted runs from the state store, deduping by id against the
    /// active table (the store is not assumed idempotent across ticks), and
    /// seed or reject each one.
    async fn admit(&mut self) {
        let admitted = match self.store.list_admitted().await {
            Ok(runs) => runs,
            Err(e) => {
                tracing::error!(error = %e, "admission: list_admitted failed; retrying next tick");
                return;
            }
        };

        for AdmittedRun { run_id, run_data } in admitted {
            if self.active.contains_key(&run_id) {
                continue;
            }

            if !run_data_has_required_keys(&run_data) {
                let provenance = "Error - Lacks the required run properties.".to_string();
                if let Err(e) = self.store.update_status(&run_id, &provenance).await {
                    tracing::error!(run_id = %run_id, error = %e, "failed to persist admission rejection");
                }
                let _ = self
                    .notify
                    .notify(run_id.as_str(), "lacked the required run properties.", None)
                    .await;
                continue;
            }

            let context = RunContext {
                download_url: run_data["downloadurl"].clone(),
                grid_name: run_data["adcirc.gridname"].clone(),
                instance_name: run_data["instancename"].clone(),
            };
            let run = Run::admit(run_id.clone(), context);

            if let Err(e) = self.store.update_status(&run_id, &run.provenance).await {
                tracing::error!(run_id = %run_id, error = %e, "failed to persist admission acceptance");
            }
            let _ = self
                .notify
                .notify(run_id.as_str(), "accepted.", Some(&run.context.instance_name))
                .await;

            self.active.insert(run_id, run);
        }
    }
}

fn run_data_has_required_keys(run_data: &std::collections::HashMap<String, String>) -> bool {
    const REQUIRED: [&str; 3] = ["downloadurl", "adcirc.gridname", "instancename"];
    REQUIRED.iter().all(|k| run_data.contains_key(*k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apsviz_core::{FakeClock, StageStatus};
    use apsviz_adapters::{FakeClusterDriver, FakeNotifyAdapter, FakeStateStore};
    use std::collections::HashMap;

    fn config() -> Config {
        Config::from_toml_str(
            r#"
            poll_short_sleep_secs = 1
            poll_long_sleep_secs = 2

            [stages.staging]
            job_name = "staging-job-"
            data_volume_name = "staging-data-"
            ssh_volume_name = "staging-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/staging"
            additional_path = ""
            image = "apsviz/staging:latest"

            [stages.obs-mod]
            job_name = "obs-mod-job-"
            data_volume_name = "obs-mod-data-"
            ssh_volume_name = "obs-mod-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/obs-mod"
            additional_path = ""
            image = "apsviz/obs-mod:latest"

            [stages.run-geo-tiff]
            job_name = "geo-tiff-job-"
            data_volume_name = "geo-tiff-data-"
            ssh_volume_name = "geo-tiff-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/geo-tiff"
            additional_path = ""
            image = "apsviz/geo-tiff:latest"

            [stages.compute-mbtiles-0-9]
            job_name = "mbtiles-job-"
            data_volume_name = "mbtiles-data-"
            ssh_volume_name = "mbtiles-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/mbtiles"
            additional_path = ""
            image = "apsviz/mbtiles:latest"

            [stages.load-geo-server]
            job_name = "load-geo-server-job-"
            data_volume_name = "load-geo-server-data-"
            ssh_volume_name = "load-geo-server-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/load-geo-server"
            additional_path = ""
            image = "apsviz/load-geo-server:latest"

            [stages.final-staging]
            job_name = "final-staging-job-"
            data_volume_name = "final-staging-data-"
            ssh_volume_name = "final-staging-ssh-"
            command_line = ["python"]
            data_mount_path = "/data"
            sub_path = "/final-staging"
            additional_path = ""
            image = "apsviz/final-staging:latest"
            "#,
        )
        .unwrap()
    }

    fn good_run_data() -> HashMap<String, String> {
        [
            ("downloadurl", "http://x/f"),
            ("adcirc.gridname", "g1"),
            ("instancename", "nowcast"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    type TestLoop = ReconciliationLoop<FakeClusterDriver, FakeStateStore, FakeNotifyAdapter, FakeClock>;

    fn test_loop() -> (TestLoop, FakeClusterDriver, FakeStateStore, FakeNotifyAdapter, FakeClock) {
        let cluster = FakeClusterDriver::new();
        let store = FakeStateStore::new();
        let notify = FakeNotifyAdapter::new();
        let clock = FakeClock::new();
        let l = ReconciliationLoop::new(
            cluster.clone(),
            store.clone(),
            notify.clone(),
            clock.clone(),
            config(),
        );
        (l, cluster, store, notify, clock)
    }

    #[tokio::test]
    async fn admits_new_run_and_rejects_missing_keys() {
        let (mut l, _cluster, store, notify, _clock) = test_loop();
        store.seed_admitted(AdmittedRun { run_id: RunId::new("1"), run_data: good_run_data() });
        store.seed_admitted(AdmittedRun {
            run_id: RunId::new("2"),
            run_data: HashMap::new(),
        });

        l.tick().await;

        assert!(l.active_runs().contains_key(&RunId::new("1")));
        assert!(!l.active_runs().contains_key(&RunId::new("2")));
        let updates = store.updates();
        assert!(updates.iter().any(|u| u.run_id == RunId::new("2")
            && u.provenance_text.contains("Lacks the required run properties")));
        let calls = notify.calls();
        assert!(calls.iter().any(|c| c.line.contains("lacked the required run properties")));
    }

    #[tokio::test]
    async fn admission_dedupes_against_active_table() {
        let (mut l, _cluster, store, _notify, _clock) = test_loop();
        store.seed_admitted(AdmittedRun { run_id: RunId::new("1"), run_data: good_run_data() });
        l.tick().await;
        assert_eq!(l.active_runs().len(), 1);

        // Store returns the same run again (not assumed idempotent); admission
        // must be a no-op since "1" is already active.
        store.seed_admitted(AdmittedRun { run_id: RunId::new("1"), run_data: good_run_data() });
        l.tick().await;
        assert_eq!(l.active_runs().len(), 1);
    }

    #[tokio::test]
    async fn happy_path_drives_a_run_to_completion_and_removes_it() {
        let (mut l, cluster, store, notify, _clock) = test_loop();
        store.seed_admitted(AdmittedRun { run_id: RunId::new("1"), run_data: good_run_data() });
        l.tick().await; // admit

        for stage_job in [
            "staging-job-1",
            "obs-mod-job-1",
            "geo-tiff-job-1",
            "mbtiles-job-1",
            "load-geo-server-job-1",
            "final-staging-job-1",
        ] {
            l.tick().await; // New -> Running (creates job)
            cluster.set_job_active(stage_job, false);
            l.tick().await; // Running -> successor (New)
        }
        l.tick().await; // finalize Complete

        assert!(l.active_runs().is_empty());
        let calls = notify.calls();
        assert!(calls.iter().any(|c| c.line.contains("completed successfully")));
    }

    #[tokio::test]
    async fn pod_failure_mid_pipeline_routes_through_error_to_final_staging() {
        let (mut l, cluster, store, notify, _clock) = test_loop();
        store.seed_admitted(AdmittedRun { run_id: RunId::new("1"), run_data: good_run_data() });
        l.tick().await; // admit
        l.tick().await; // Staging New -> Running
        cluster.set_pod_condition("staging-job-1", "Failed: OOMKilled");
        l.tick().await; // Staging Running -> Error/Failed

        let run = l.active_runs().get(&RunId::new("1")).unwrap();
        assert_eq!(run.stage, Stage::Error);
        assert_eq!(run.stage_status, StageStatus::Failed);

        l.tick().await; // Error -> FinalStaging/New
        let run = l.active_runs().get(&RunId::new("1")).unwrap();
        assert_eq!(run.stage, Stage::FinalStaging);
        assert_eq!(run.stage_status, StageStatus::New);

        l.tick().await; // FinalStaging New -> Running
        cluster.set_job_active("final-staging-job-1", false);
        l.tick().await; // FinalStaging Running -> Complete
        l.tick().await; // finalize

        assert!(l.active_runs().is_empty());
        let calls = notify.calls();
        assert!(calls.iter().any(|c| c.line.contains("failed in staging.")));
        assert!(calls.iter().any(|c| c.line.contains("completed unsuccessfully")));
    }

    #[tokio::test]
    async fn idle_backoff_switches_to_long_interval_after_ten_quiet_ticks() {
        let (mut l, _cluster, _store, _notify, _clock) = test_loop();
        for _ in 0..9 {
            l.tick().await;
            assert!(!l.is_idle_backed_off());
        }
        l.tick().await;
        assert!(l.is_idle_backed_off());
    }

    #[tokio::test]
    async fn idle_backoff_stays_latched_across_further_quiet_ticks() {
        let (mut l, _cluster, _store, _notify, clock) = test_loop();
        for _ in 0..10 {
            l.tick().await;
        }
        assert!(l.is_idle_backed_off());
        let activity_before = l.last_activity_at();

        for _ in 0..5 {
            clock.advance(std::time::Duration::from_secs(300));
            l.tick().await;
            assert!(l.is_idle_backed_off());
        }
        // No activity occurred, so the recorded last-activity instant never moved.
        assert_eq!(l.last_activity_at(), activity_before);
    }

    #[tokio::test]
    async fn activity_resets_idle_counter() {
        let (mut l, _cluster, store, _notify, _clock) = test_loop();
        for _ in 0..9 {
            l.tick().await;
        }
        assert!(!l.is_idle_backed_off());
        store.seed_admitted(AdmittedRun { run_id: RunId::new("1"), run_data: good_run_data() });
        l.tick().await; // activity: admission
        assert!(!l.is_idle_backed_off());
    }

    #[tokio::test]
    async fn submission_failure_routes_run_to_guaranteed_cleanup() {
        let (mut l, cluster, store, _notify, _clock) = test_loop();
        store.seed_admitted(AdmittedRun { run_id: RunId::new("1"), run_data: good_run_data() });
        l.tick().await; // admit
        cluster.fail_next_create_for("staging-job-1");

        l.tick().await; // Staging New dispatch fails -> recovered to Error/Failed

        let run = l.active_runs().get(&RunId::new("1")).unwrap();
        assert_eq!(run.stage, Stage::Error);
        assert_eq!(run.stage_status, StageStatus::Failed);
        assert!(run.provenance.contains("Run handler error detected"));
    }
}
