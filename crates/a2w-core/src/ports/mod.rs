//! Ports - the seams between the runtime and its external collaborators.
//!
//! Hexagonal layout: the runtime only sees these traits; adapters live in
//! `impls` (or in the embedding application).

pub mod ability_registry;
pub mod clock;
pub mod delegation_transport;
pub mod id_generator;
pub mod report_store;

pub use self::ability_registry::{Ability, AbilityRegistry};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delegation_transport::DelegationTransport;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::report_store::ReportStore;
