//! Durable job queue backed by coordination store lists.

pub mod dispatcher;
pub mod job;

pub use dispatcher::{dead_key, delay_key, done_key, pending_key, JobQueue, QueueStats};
pub use job::{job_fn, DelayedJob, JobHandler, JobOutcome, QueueJob};
