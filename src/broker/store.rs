use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::broker::job::{Job, JobStatus};
use crate::broker::router;
use crate::error::{BrokerError, Result};

/// The store as shared by concurrent request handlers. All mutations go
/// through the write lock, which is the single-writer discipline that makes
/// `claim_one` linearizable: two simultaneous claims serialize on the lock
/// and can never select the same job.
pub type SharedStore = Arc<RwLock<JobStore>>;

/// Outcome of a terminal report (`complete`/`fail`).
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    /// The job was running; the transition was applied.
    Applied(Job),
    /// The job was already done or failed; nothing changed. Duplicate
    /// deliveries and late retries land here and are not errors.
    AlreadyTerminal(Job),
}

impl ReportOutcome {
    pub fn job(&self) -> &Job {
        match self {
            ReportOutcome::Applied(job) | ReportOutcome::AlreadyTerminal(job) => job,
        }
    }
}

/// Keyed storage for job records and the broker's one synchronization point.
///
/// Terminal transitions are idempotent, and the claim path treats a running
/// job with an expired lease the same as a queued one, so no background task
/// is required for crash recovery.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<Uuid, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created job and return the stored record.
    pub fn create(&mut self, command: String, payload: String, requires: HashSet<String>) -> Job {
        let job = Job::new(command, payload, requires);
        tracing::info!(job_id = %job.id, command = %job.command, "job created");
        self.jobs.insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: &Uuid) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Atomically claim the oldest eligible job for a worker.
    ///
    /// Eligible means queued, or running with an expired lease, and with
    /// `requires` covered by the worker's capabilities. The claimed job
    /// becomes running with `lease_until = now + lease`; `started_at` is set
    /// only on the first claim so requeues keep the original value. Returns
    /// `None` when nothing is eligible, which is a normal outcome; the
    /// caller polls again later.
    pub fn claim_one(
        &mut self,
        capabilities: &HashSet<String>,
        worker_id: Option<&str>,
        lease: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Option<Job> {
        let candidate = self
            .jobs
            .values()
            .filter(|job| job.claimable(now) && router::eligible(&job.requires, capabilities))
            .min_by_key(|job| job.created_at)
            .map(|job| job.id)?;

        let job = self.jobs.get_mut(&candidate)?;
        // Conditional transition: re-check under the same borrow so the
        // update only applies to a still-claimable record.
        if !job.claimable(now) {
            return None;
        }

        if job.status == JobStatus::Running {
            tracing::info!(
                job_id = %job.id,
                previous_worker = ?job.worker_id,
                "reclaiming orphaned job with expired lease"
            );
        }

        job.status = JobStatus::Running;
        job.worker_id = worker_id.map(str::to_owned);
        if job.started_at.is_none() {
            job.started_at = Some(now);
        }
        job.lease_until = Some(now + lease);

        tracing::info!(job_id = %job.id, worker_id = ?job.worker_id, "job claimed");
        Some(job.clone())
    }

    /// Record a successful result. Running jobs transition to done; already
    /// terminal jobs are left untouched (idempotent). A queued job means the
    /// lease was reclaimed before this report arrived: the report is stale
    /// and rejected so the caller knows its result was not recorded.
    pub fn complete(&mut self, id: &Uuid, result: String, now: DateTime<Utc>) -> Result<ReportOutcome> {
        let job = self.jobs.get_mut(id).ok_or(BrokerError::JobNotFound(*id))?;
        match job.status {
            JobStatus::Done | JobStatus::Failed => Ok(ReportOutcome::AlreadyTerminal(job.clone())),
            JobStatus::Queued => Err(BrokerError::StaleReport {
                id: *id,
                status: job.status,
            }),
            JobStatus::Running => {
                job.status = JobStatus::Done;
                job.result = Some(result);
                job.finished_at = Some(now);
                job.lease_until = None;
                tracing::info!(job_id = %job.id, worker_id = ?job.worker_id, "job done");
                Ok(ReportOutcome::Applied(job.clone()))
            }
        }
    }

    /// Record a failure. Same transition rules as [`complete`](Self::complete).
    pub fn fail(&mut self, id: &Uuid, error: String, now: DateTime<Utc>) -> Result<ReportOutcome> {
        let job = self.jobs.get_mut(id).ok_or(BrokerError::JobNotFound(*id))?;
        match job.status {
            JobStatus::Done | JobStatus::Failed => Ok(ReportOutcome::AlreadyTerminal(job.clone())),
            JobStatus::Queued => Err(BrokerError::StaleReport {
                id: *id,
                status: job.status,
            }),
            JobStatus::Running => {
                job.status = JobStatus::Failed;
                job.error = Some(error);
                job.finished_at = Some(now);
                job.lease_until = None;
                tracing::info!(job_id = %job.id, worker_id = ?job.worker_id, "job failed");
                Ok(ReportOutcome::Applied(job.clone()))
            }
        }
    }

    /// Revert every running job with an expired lease to queued. The active
    /// sweep calls this so `get` reflects the requeue promptly rather than
    /// only at the next claim attempt. `created_at` and `started_at` are
    /// preserved; `worker_id` is cleared until the next claimant arrives.
    /// Returns the number of jobs requeued.
    pub fn reclaim_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut requeued = 0;
        for job in self.jobs.values_mut() {
            if job.lease_expired(now) {
                job.status = JobStatus::Queued;
                job.lease_until = None;
                job.worker_id = None;
                requeued += 1;
                tracing::info!(job_id = %job.id, "requeued job with expired lease");
            }
        }
        requeued
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
