//! Dispatcher - admits queued tasks as execution slots free up.
//!
//! A single loop: take the best candidate, take a slot, launch it. Both waits
//! race against the shutdown signal; a candidate popped before shutdown goes
//! back into the queue.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::app::runtime::AgentRuntime;

/// Dispatcher handle.
/// - dropping the handle (or `request_shutdown`) stops admission
/// - executors already launched keep running
///
/// # Flow
/// 1. `AdmissionQueue::next` yields the highest-scored candidate
/// 2. a slot permit is taken from the runtime's semaphore
/// 3. `AgentRuntime::launch` moves the task to `initializing` and spawns its executor
/// 4. on shutdown between 1 and 2, the candidate is pushed back
pub struct Dispatcher {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Dispatcher {
    pub fn spawn(runtime: AgentRuntime) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(dispatch_loop(runtime, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn dispatch_loop(runtime: AgentRuntime, mut shutdown_rx: watch::Receiver<bool>) {
    info!(agent_id = %runtime.agent_id(), "dispatcher started");
    let slots = runtime.slots();
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let candidate = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            candidate = runtime.next_admission() => candidate,
        };

        // a slot is only reserved once a task is ready to use it
        let permit = tokio::select! {
            changed = shutdown_rx.changed() => {
                runtime.requeue(candidate).await;
                if changed.is_err() {
                    break;
                }
                continue;
            }
            permit = slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    runtime.requeue(candidate).await;
                    break;
                }
            },
        };

        debug!(task_id = %candidate.task_id, score = candidate.score, "admitting");
        runtime.launch(&candidate.task_id, permit).await;
    }
    info!("dispatcher stopped");
}
