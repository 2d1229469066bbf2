//! ReportStore port - the persistence layer behind `/logs` and `/report`.
//!
//! The core only reads and appends; retention and durability belong to the
//! adapter. See `impls::InMemoryReportStore` for the bundled one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{A2wError, Envelope, LogPage, TaskId, TaskReport};

/// ReportStore keeps the emitted log and the reports of finished tasks.
///
/// # Design principles
/// - sequence numbers are assigned by the store and never reused
/// - a report written for a task id replaces the previous one
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Appends one emitted envelope and returns its sequence number.
    async fn append_log(&self, envelope: Envelope, at: DateTime<Utc>) -> Result<u64, A2wError>;

    /// Entries with `seq > cursor`, oldest first, at most `limit`.
    async fn read_logs(&self, cursor: u64, limit: usize) -> Result<LogPage, A2wError>;

    async fn put_report(&self, report: TaskReport) -> Result<(), A2wError>;

    async fn get_report(&self, task_id: &TaskId) -> Result<Option<TaskReport>, A2wError>;

    /// Drops the stored report, used when a task id starts another run.
    async fn remove_report(&self, task_id: &TaskId) -> Result<(), A2wError>;
}
