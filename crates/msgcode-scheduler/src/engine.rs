use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use msgcode_route::JsonTable;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use msgcode_core::error::{Result, RuntimeError};

use crate::schedule::next_run_after;
use crate::types::{FiredJob, Job};

/// Jobs persisted as a single JSON file (`<configDir>/schedules.json`),
/// reusing the Route Store's `JsonTable` abstraction — same atomic
/// temp-write-fsync-rename discipline, keyed by job id instead of chat id.
/// `nextRunAt` is never persisted: it's always recomputed from `cron` + tz
/// + "now" on load and after every fire, per the misfire policy that a job
/// skipped while the process was down is simply not caught up.
#[derive(Clone)]
pub struct SchedulerHandle {
    jobs: Arc<JsonTable<Job>>,
}

impl SchedulerHandle {
    pub fn open(path: std::path::PathBuf) -> Result<Self> {
        Ok(Self {
            jobs: Arc::new(JsonTable::open(path)?),
        })
    }

    pub fn add_job(&self, job: Job) -> Result<()> {
        crate::schedule::validate(&job.cron, &job.tz)?;
        info!(job_id = %job.id, chat_id = %job.chat_id, "job added");
        self.jobs.put(job.id.clone(), job)
    }

    pub fn remove_job(&self, id: &str) -> Result<()> {
        self.jobs.delete(id)?;
        info!(job_id = id, "job removed");
        Ok(())
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.list()?.into_iter().map(|(_, v)| v).collect())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut job = self
            .jobs
            .get(id)?
            .ok_or_else(|| RuntimeError::Internal(format!("no such job: {id}")))?;
        job.enabled = enabled;
        self.jobs.put(id.to_string(), job)
    }

    /// `/reload`: replace every job whose `source` starts with
    /// `schedule:<id>` with the freshly parsed set, leaving user-created
    /// jobs (any other source) untouched.
    pub fn reload(&self, schedule_sourced: Vec<Job>) -> Result<()> {
        for (id, existing) in self.jobs.list()? {
            if existing.is_schedule_sourced() {
                self.jobs.delete(&id)?;
            }
        }
        for job in schedule_sourced {
            crate::schedule::validate(&job.cron, &job.tz)?;
            self.jobs.put(job.id.clone(), job)?;
        }
        Ok(())
    }
}

/// Drives the 1-minute wall-clock-aligned tick and forwards fired jobs.
pub struct SchedulerEngine {
    handle: SchedulerHandle,
    fired_tx: mpsc::Sender<FiredJob>,
}

impl SchedulerEngine {
    pub fn new(handle: SchedulerHandle, fired_tx: mpsc::Sender<FiredJob>) -> Self {
        Self { handle, fired_tx }
    }

    /// Main loop: sleeps until the next whole minute, evaluates every
    /// enabled job's cron against its timezone, and sends a `FiredJob` for
    /// every match. Runs until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        loop {
            let sleep_until = next_minute_boundary();
            tokio::select! {
                _ = tokio::time::sleep_until(sleep_until) => {
                    if let Err(e) = self.tick() {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn tick(&self) -> Result<()> {
        let now = Utc::now();
        for job in self.handle.list_jobs()? {
            if !job.enabled {
                continue;
            }
            let next = match next_run_after(&job.cron, &job.tz, now - ChronoDuration::minutes(1)) {
                Ok(n) => n,
                Err(e) => {
                    warn!(job_id = %job.id, "skipping job with bad cron/tz: {e}");
                    continue;
                }
            };
            let Some(fire_at) = next else { continue };
            if fire_at > now {
                continue;
            }

            info!(job_id = %job.id, chat_id = %job.chat_id, "job fired");
            let fired = FiredJob {
                job_id: job.id.clone(),
                chat_id: job.chat_id.clone(),
                message: job.message.clone(),
                delivery: job.delivery.clone(),
            };
            if self.fired_tx.try_send(fired).is_err() {
                warn!(job_id = %job.id, "fired-job channel full or closed — job dropped");
            }
        }
        Ok(())
    }
}

fn next_minute_boundary() -> tokio::time::Instant {
    let now = Utc::now();
    let secs_into_minute = now.second() as u64;
    let nanos = now.timestamp_subsec_nanos() as u64;
    let elapsed_ns = secs_into_minute * 1_000_000_000 + nanos;
    let remaining_ns = 60_000_000_000u64.saturating_sub(elapsed_ns).max(1);
    tokio::time::Instant::now() + std::time::Duration::from_nanos(remaining_ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Delivery;

    fn sample_job(id: &str, chat_id: &str, cron: &str) -> Job {
        Job {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            cron: cron.to_string(),
            tz: "UTC".to_string(),
            message: "hello".to_string(),
            delivery: Delivery::default(),
            enabled: true,
            source: "manual".to_string(),
        }
    }

    #[test]
    fn add_then_list_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SchedulerHandle::open(dir.path().join("schedules.json")).unwrap();
        handle.add_job(sample_job("j1", "chat-1", "0 0 9 * * *")).unwrap();
        let jobs = handle.list_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].chat_id, "chat-1");
    }

    #[test]
    fn add_job_with_bad_cron_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SchedulerHandle::open(dir.path().join("schedules.json")).unwrap();
        assert!(handle.add_job(sample_job("j1", "chat-1", "nonsense")).is_err());
    }

    #[test]
    fn reload_replaces_only_schedule_sourced_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SchedulerHandle::open(dir.path().join("schedules.json")).unwrap();

        let mut manual = sample_job("manual-1", "chat-1", "0 0 9 * * *");
        manual.source = "manual".to_string();
        handle.add_job(manual).unwrap();

        let mut auto = sample_job("auto-1", "chat-1", "0 0 9 * * *");
        auto.source = "schedule:auto-1".to_string();
        handle.add_job(auto).unwrap();

        let mut replacement = sample_job("auto-2", "chat-1", "0 0 10 * * *");
        replacement.source = "schedule:auto-2".to_string();
        handle.reload(vec![replacement]).unwrap();

        let jobs = handle.list_jobs().unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert!(ids.contains(&"manual-1"));
        assert!(ids.contains(&"auto-2"));
        assert!(!ids.contains(&"auto-1"));
    }

    #[test]
    fn set_enabled_toggles_flag() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SchedulerHandle::open(dir.path().join("schedules.json")).unwrap();
        handle.add_job(sample_job("j1", "chat-1", "0 0 9 * * *")).unwrap();
        handle.set_enabled("j1", false).unwrap();
        assert!(!handle.list_jobs().unwrap()[0].enabled);
    }

    #[tokio::test]
    async fn tick_fires_due_job_and_skips_future_one() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SchedulerHandle::open(dir.path().join("schedules.json")).unwrap();

        // Every-minute cron always fires; a far-future daily cron never does
        // within this test's tick window.
        handle.add_job(sample_job("due", "chat-1", "0 * * * * *")).unwrap();
        handle.add_job(sample_job("not-due", "chat-2", "0 0 9 31 12 *")).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let engine = SchedulerEngine::new(handle, tx);
        engine.tick().unwrap();

        let fired = rx.try_recv().unwrap();
        assert_eq!(fired.job_id, "due");
        assert!(rx.try_recv().is_err());
    }
}
