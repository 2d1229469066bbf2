//! Domain model (ids, task context, FSM states, envelopes, errors, ...).
//!
//! Everything here is plain data plus pure rules; nothing in this module
//! touches locks, channels or the clock.

pub mod agent;
pub mod delegation;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod need;
pub mod report;
pub mod state;
pub mod task;

pub use self::agent::{AgentRecord, Manifest, Permissions};
pub use self::delegation::{DelegationChain, DelegationOutcome, DelegationRequest};
pub use self::envelope::{A2W_VERSION, Envelope, Message, MessageType, StatusUpdate};
pub use self::errors::{A2wError, ErrorCode, ErrorPayload, Severity};
pub use self::events::AgentEvent;
pub use self::ids::{AgentId, DelegationId, SubscriberId, TaskId};
pub use self::need::{Continuation, InsightAck, NeedSignal, PartialInsightPolicy, Urgency};
pub use self::report::{Artifact, LogEntry, LogPage, TaskReport, TransitionCause, TransitionRecord};
pub use self::state::FsmState;
pub use self::task::{Priority, TaskContext, Weight};
