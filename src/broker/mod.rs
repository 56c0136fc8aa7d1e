pub mod job;
pub mod lease;
pub mod router;
pub mod store;

pub use job::{Job, JobStatus};
pub use lease::LeaseSweeper;
pub use store::{JobStore, ReportOutcome, SharedStore};
