//! InMemoryReportStore - bounded log ring plus a report map.
//!
//! Keeps the newest `capacity` log entries; sequence numbers keep increasing
//! after old entries are evicted, so cursors stay valid (they just skip what
//! was dropped).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::domain::{A2wError, Envelope, LogEntry, LogPage, TaskId, TaskReport};
use crate::ports::ReportStore;

struct StoreState {
    logs: VecDeque<LogEntry>,
    last_seq: u64,
    reports: HashMap<TaskId, TaskReport>,
}

pub struct InMemoryReportStore {
    capacity: usize,
    state: Mutex<StoreState>,
}

impl InMemoryReportStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(StoreState {
                logs: VecDeque::new(),
                last_seq: 0,
                reports: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn append_log(&self, envelope: Envelope, at: DateTime<Utc>) -> Result<u64, A2wError> {
        let mut state = self.state.lock().await;
        state.last_seq += 1;
        let seq = state.last_seq;
        state.logs.push_back(LogEntry {
            seq,
            recorded_at: at,
            envelope,
        });
        while state.logs.len() > self.capacity {
            state.logs.pop_front();
        }
        Ok(seq)
    }

    async fn read_logs(&self, cursor: u64, limit: usize) -> Result<LogPage, A2wError> {
        let state = self.state.lock().await;
        let entries: Vec<LogEntry> = state
            .logs
            .iter()
            .filter(|entry| entry.seq > cursor)
            .take(limit)
            .cloned()
            .collect();
        let next_cursor = entries.last().map_or(cursor, |entry| entry.seq);
        Ok(LogPage {
            entries,
            next_cursor,
        })
    }

    async fn put_report(&self, report: TaskReport) -> Result<(), A2wError> {
        let mut state = self.state.lock().await;
        state.reports.insert(report.task_id.clone(), report);
        Ok(())
    }

    async fn get_report(&self, task_id: &TaskId) -> Result<Option<TaskReport>, A2wError> {
        let state = self.state.lock().await;
        Ok(state.reports.get(task_id).cloned())
    }

    async fn remove_report(&self, task_id: &TaskId) -> Result<(), A2wError> {
        let mut state = self.state.lock().await;
        state.reports.remove(task_id);
        Ok(())
    }
}
