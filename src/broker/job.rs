use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A unit of work brokered between producers and workers.
///
/// `command` and `payload` are opaque to the broker; their structure is the
/// worker's private concern. `requires` lists capability tags a worker must
/// declare to claim this job; an empty set means any worker may claim it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub lease_until: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub command: String,
    pub payload: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub worker_id: Option<String>,
    #[serde(default)]
    pub requires: HashSet<String>,
}

impl Job {
    pub fn new(command: String, payload: String, requires: HashSet<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            lease_until: None,
            status: JobStatus::Queued,
            command,
            payload,
            result: None,
            error: None,
            worker_id: None,
            requires,
        }
    }

    /// Whether the job can be handed to a worker at `now`: either queued, or
    /// running with an expired lease (an orphan left by a crashed worker).
    pub fn claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Queued => true,
            JobStatus::Running => self.lease_expired(now),
            JobStatus::Done | JobStatus::Failed => false,
        }
    }

    /// True for a running job whose lease ran out without a terminal report.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Running && self.lease_until.is_some_and(|until| until < now)
    }
}
