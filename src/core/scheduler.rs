//! Recurring jobs.
//!
//! Each job runs on its own task with its own interval, so a slow job never
//! delays another and a job never overlaps itself: the next tick is only
//! awaited after the current run has finished. Shutdown is observed between
//! runs; a run in progress always completes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use super::orchestrator::Orchestrator;
use crate::config::SchedulerSettings;
use crate::domain::ContentStatus;
use crate::error::IntegrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    /// Publish scheduled items whose time has come
    PublishDue,
    /// Reply to unreplied reviews where enabled
    AutoReply,
    /// Full sync of every linked location
    ProfileResync,
    /// Drop expired OAuth connect states
    StateEviction,
}

impl Job {
    pub const ALL: [Job; 4] = [
        Job::PublishDue,
        Job::AutoReply,
        Job::ProfileResync,
        Job::StateEviction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublishDue => "publish_due",
            Self::AutoReply => "auto_reply",
            Self::ProfileResync => "profile_resync",
            Self::StateEviction => "state_eviction",
        }
    }

    pub fn period(&self, settings: &SchedulerSettings) -> Duration {
        let seconds = match self {
            Self::PublishDue => settings.publish_due_seconds,
            Self::AutoReply => settings.auto_reply_seconds,
            Self::ProfileResync => settings.profile_resync_seconds,
            Self::StateEviction => settings.state_eviction_seconds,
        };
        Duration::from_secs(seconds.max(1))
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Job {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Job::ALL
            .into_iter()
            .find(|j| j.as_str() == s.replace('-', "_"))
            .ok_or_else(|| format!("Unknown job: {}", s))
    }
}

/// Items a job run touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub processed: usize,
    pub failed: usize,
}

impl Orchestrator {
    /// Execute one run of a job to completion
    #[instrument(skip(self), fields(job = %job))]
    pub async fn run_job(&self, job: Job) -> Result<JobSummary, IntegrationError> {
        match job {
            Job::PublishDue => self.publish_due().await,
            Job::AutoReply => {
                let report = self.auto_reply().run().await?;
                Ok(JobSummary {
                    processed: report.replied + report.failed,
                    failed: report.failed,
                })
            }
            Job::ProfileResync => self.profile_resync().await,
            Job::StateEviction => {
                let evicted = self.connect().evict_expired()?;
                Ok(JobSummary {
                    processed: evicted,
                    failed: 0,
                })
            }
        }
    }

    async fn publish_due(&self) -> Result<JobSummary, IntegrationError> {
        let due = self.store().due_scheduled_items(Utc::now())?;
        let mut summary = JobSummary::default();

        for item in due {
            summary.processed += 1;
            match self.publisher().publish(&item.id).await {
                Ok(ContentStatus::Published) => {}
                Ok(status) => {
                    warn!(item_id = %item.id, %status, "Scheduled publish incomplete");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(item_id = %item.id, error = %e, "Scheduled publish failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn profile_resync(&self) -> Result<JobSummary, IntegrationError> {
        let mut summary = JobSummary::default();

        for location in self.store().linked_locations()? {
            summary.processed += 1;
            match self.sync().sync_all(&location.id).await {
                Ok(report) => {
                    let failed: Vec<_> = report
                        .iter()
                        .filter(|(_, outcome)| outcome.is_failed())
                        .map(|(resource, _)| resource.as_str())
                        .collect();
                    if !failed.is_empty() {
                        warn!(location_id = %location.id, ?failed, "Partial resync");
                        summary.failed += 1;
                    }
                }
                Err(e) => {
                    error!(location_id = %location.id, error = %e, "Resync failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

/// Runs every job on its own interval until shutdown is signalled
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, settings: SchedulerSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    /// Spawn one task per job and wait for all of them to stop
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let handles: Vec<_> = Job::ALL
            .into_iter()
            .map(|job| {
                let period = job.period(&self.settings);
                info!(%job, period_secs = period.as_secs(), "Scheduling job");
                tokio::spawn(job_loop(
                    Arc::clone(&self.orchestrator),
                    job,
                    period,
                    shutdown.clone(),
                ))
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Job task panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn job_loop(
    orchestrator: Arc<Orchestrator>,
    job: Job,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match orchestrator.run_job(job).await {
            Ok(summary) => info!(%job, processed = summary.processed, failed = summary.failed, "Job finished"),
            Err(e) => error!(%job, error = %e, "Job failed"),
        }
    }

    info!(%job, "Job stopped");
}
