//! Weighted Scheduler and the admission queue.
//!
//! The scheduler is an ordering policy only: it decides which pending task is
//! admitted to an execution slot next and never preempts a running task.
//! Interrupts go through [`WeightedScheduler::authorize_interrupt`].

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::{Mutex, Notify};

use crate::domain::{A2wError, Priority, TaskId, Weight};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScheduler {
    alpha: f64,
    beta: f64,
    interrupt_threshold: u8,
}

impl Default for WeightedScheduler {
    fn default() -> Self {
        Self::new(1.0, 1.0, 20)
    }
}

impl WeightedScheduler {
    pub fn new(alpha: f64, beta: f64, interrupt_threshold: u8) -> Self {
        Self {
            alpha,
            beta,
            interrupt_threshold,
        }
    }

    pub fn interrupt_threshold(&self) -> u8 {
        self.interrupt_threshold
    }

    /// `alpha * weight + beta * priority`
    pub fn score(&self, weight: Weight, priority: Priority) -> f64 {
        self.alpha * f64::from(weight.value()) + self.beta * f64::from(priority.value())
    }

    /// Orders candidates by score descending; ties go to the earlier
    /// submission.
    pub fn admit(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| b.cmp(a));
        candidates
    }

    /// Refuses to interrupt a task whose caller outweighs the requester by
    /// at least the threshold, unless `override_flag` is set.
    pub fn authorize_interrupt(
        &self,
        caller_weight: Weight,
        requester_weight: Weight,
        override_flag: bool,
    ) -> Result<(), A2wError> {
        let gap = i16::from(caller_weight.value()) - i16::from(requester_weight.value());
        if !override_flag && gap >= i16::from(self.interrupt_threshold) {
            return Err(A2wError::LowWeightInterrupt {
                caller_weight,
                requester_weight,
                threshold: self.interrupt_threshold,
            });
        }
        Ok(())
    }
}

/// A pending admission.
///
/// `Ord` puts the candidate to admit first at the top of a max-heap: higher
/// score, then earlier submission, then lower sequence number.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub task_id: TaskId,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
    pub seq: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending admissions, highest [`Candidate`] first.
#[derive(Default)]
pub struct AdmissionQueue {
    heap: Mutex<BinaryHeap<Candidate>>,
    notify: Notify,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, candidate: Candidate) {
        self.heap.lock().await.push(candidate);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> Option<Candidate> {
        self.heap.lock().await.pop()
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Waits for the next candidate.
    pub async fn next(&self) -> Candidate {
        loop {
            let notified = self.notify.notified();
            if let Some(candidate) = self.pop().await {
                return candidate;
            }
            notified.await;
        }
    }
}
