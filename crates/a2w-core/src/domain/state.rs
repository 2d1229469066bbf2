//! FSM state of a task and its transition table.
//!
//! # Transition table
//! - idle → initializing
//! - initializing → idle, running, terminated
//! - running → waiting, blocked, delegating, finishing, terminated
//! - waiting → running, blocked, terminated
//! - blocked → waiting, terminated
//! - delegating → running, waiting, terminated
//! - finishing → finished, terminated
//! - finished → idle
//!
//! `stopped` and `terminated` have no outgoing edges. They are reached
//! through the stop / terminate requests, which bypass the table
//! (see [`FsmState::can_stop`] and [`FsmState::can_terminate`]).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsmState {
    Idle,
    Initializing,
    Running,
    Waiting,
    Blocked,
    Delegating,
    Finishing,
    Finished,
    Stopped,
    Terminated,
}

impl FsmState {
    pub const ALL: [FsmState; 10] = [
        FsmState::Idle,
        FsmState::Initializing,
        FsmState::Running,
        FsmState::Waiting,
        FsmState::Blocked,
        FsmState::Delegating,
        FsmState::Finishing,
        FsmState::Finished,
        FsmState::Stopped,
        FsmState::Terminated,
    ];

    /// Destinations reachable through an ordinary transition request.
    pub fn allowed_targets(self) -> &'static [FsmState] {
        use FsmState::*;
        match self {
            Idle => &[Initializing],
            Initializing => &[Idle, Running, Terminated],
            Running => &[Waiting, Blocked, Delegating, Finishing, Terminated],
            Waiting => &[Running, Blocked, Terminated],
            Blocked => &[Waiting, Terminated],
            Delegating => &[Running, Waiting, Terminated],
            Finishing => &[Finished, Terminated],
            Finished => &[Idle],
            Stopped | Terminated => &[],
        }
    }

    pub fn can_transition_to(self, target: FsmState) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// End of the current lifecycle; the task may be removed from the registry.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FsmState::Finished | FsmState::Stopped | FsmState::Terminated
        )
    }

    /// Graceful stop is accepted from any non-terminal state.
    pub fn can_stop(self) -> bool {
        !self.is_terminal()
    }

    /// Immediate terminate is accepted from any state.
    pub fn can_terminate(self) -> bool {
        true
    }

    /// States in which `progress` must not decrease.
    pub fn tracks_progress(self) -> bool {
        matches!(self, FsmState::Running | FsmState::Finishing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FsmState::Idle => "idle",
            FsmState::Initializing => "initializing",
            FsmState::Running => "running",
            FsmState::Waiting => "waiting",
            FsmState::Blocked => "blocked",
            FsmState::Delegating => "delegating",
            FsmState::Finishing => "finishing",
            FsmState::Finished => "finished",
            FsmState::Stopped => "stopped",
            FsmState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
