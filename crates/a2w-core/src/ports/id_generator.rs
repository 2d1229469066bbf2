//! IdGenerator port - identifiers minted by this process.
//!
//! Task and agent ids come from callers; only delegation and subscriber ids
//! are generated locally. They are ULIDs, sortable by creation time.

use crate::domain::ids::{DelegationId, SubscriberId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_delegation_id(&self) -> DelegationId;

    fn generate_subscriber_id(&self) -> SubscriberId;
}

/// UlidGenerator builds ULIDs from the injected clock plus random bits, so a
/// `FixedClock` pins the timestamp part.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_delegation_id(&self) -> DelegationId {
        DelegationId::from_ulid(self.next_ulid())
    }

    fn generate_subscriber_id(&self) -> SubscriberId {
        SubscriberId::from_ulid(self.next_ulid())
    }
}
