//! App - the runtime core.
//!
//! - **TaskRegistry**: execution state per `task_id`
//! - **FsmEngine**: the only writer of FSM state
//! - **NeedInsightExchange**: suspension on missing data, resumption on insight
//! - **WeightedScheduler / AdmissionQueue**: admission order and interrupt rules
//! - **DelegationManager**: outbound handoffs and cycle detection
//! - **StatusBroadcaster / ErrorReporter**: everything pushed to subscribers
//! - **AgentRuntime**: the facade wiring them, built by `RuntimeBuilder`

pub mod broadcaster;
pub mod builder;
pub mod context;
pub mod delegation;
pub mod dispatcher;
pub mod exchange;
pub mod fsm;
pub mod registry;
pub mod reporter;
pub mod runtime;
pub mod scheduler;

pub use self::broadcaster::{Channel, StatusBroadcaster};
pub use self::builder::{BuildError, RuntimeBuilder};
pub use self::context::ExecutionContext;
pub use self::delegation::DelegationManager;
pub use self::exchange::{InsightDelivery, NeedInsightExchange};
pub use self::fsm::{FsmEngine, StopOutcome, Transition};
pub use self::registry::{ExecutionSnapshot, Submission, TaskEntry, TaskHandle, TaskRegistry};
pub use self::reporter::ErrorReporter;
pub use self::runtime::{
    AgentRuntime, InterruptRequest, RuntimeWorkers, StopAck, WeightChange, WeightUpdate,
};
pub use self::scheduler::{AdmissionQueue, Candidate, WeightedScheduler};
