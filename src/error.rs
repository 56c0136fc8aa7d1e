use thiserror::Error;
use uuid::Uuid;

use crate::broker::JobStatus;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("job {id} not in running state: {status}")]
    StaleReport { id: Uuid, status: JobStatus },
}

pub type Result<T> = std::result::Result<T, BrokerError>;
