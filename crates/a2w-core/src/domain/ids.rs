//! Domain identifiers (strongly-typed IDs).
//!
//! Task and agent identifiers are chosen by callers and travel between agent
//! processes, so `Id<T>` wraps a validated string instead of a ULID.
//! Identifiers this process mints itself (delegations, WebSocket subscribers)
//! are ULIDs rendered through the same wrapper, see `IdGenerator`.
//!
//! ## Phantom Type pattern
//! `Id<T>` shares one implementation, while the zero-sized marker `T` keeps a
//! `TaskId` from being passed where an `AgentId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use ulid::Ulid;

/// Upper bound on identifier length, in bytes.
pub const MAX_ID_LEN: usize = 256;

/// IdMarker is implemented by each identifier kind.
///
/// The derives on `Id<T>` bound `T` as well, so every marker must carry them.
pub trait IdMarker:
    Clone + fmt::Debug + PartialEq + Eq + Hash + PartialOrd + Ord + Send + Sync + 'static
{
    /// Kind name used in validation messages ("task", "agent", ...).
    fn kind() -> &'static str;

    /// Prefix for identifiers minted locally from a ULID.
    fn prefix() -> &'static str {
        ""
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {reason}")]
pub struct IdError {
    pub kind: &'static str,
    pub reason: String,
}

/// Generic identifier.
///
/// Serialized as a bare JSON string; deserialization runs the same validation
/// as [`Id::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Validates and wraps a caller-supplied identifier.
    ///
    /// Rejects empty (or all-whitespace) values, values longer than
    /// [`MAX_ID_LEN`] and values containing control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        let invalid = |reason: &str| IdError {
            kind: T::kind(),
            reason: reason.to_string(),
        };
        if value.trim().is_empty() {
            return Err(invalid("must not be empty"));
        }
        if value.len() > MAX_ID_LEN {
            return Err(invalid("longer than 256 bytes"));
        }
        if value.chars().any(char::is_control) {
            return Err(invalid("contains control characters"));
        }
        Ok(Self {
            value,
            _marker: PhantomData,
        })
    }

    /// Builds an identifier from a freshly generated ULID.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            value: format!("{}{}", T::prefix(), ulid),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> TryFrom<String> for Id<T> {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<T: IdMarker> TryFrom<&str> for Id<T> {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<T: IdMarker> From<Id<T>> for String {
    fn from(id: Id<T>) -> Self {
        id.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> PartialEq<str> for Id<T> {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}

impl<T: IdMarker> PartialEq<&str> for Id<T> {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}

// ========================================
// Markers
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn kind() -> &'static str {
        "task"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Agent {}

impl IdMarker for Agent {
    fn kind() -> &'static str {
        "agent"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Delegation {}

impl IdMarker for Delegation {
    fn kind() -> &'static str {
        "delegation"
    }

    fn prefix() -> &'static str {
        "dlg-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subscriber {}

impl IdMarker for Subscriber {
    fn kind() -> &'static str {
        "subscriber"
    }

    fn prefix() -> &'static str {
        "sub-"
    }
}

// ========================================
// Type aliases
// ========================================

/// Caller-supplied task identifier; the idempotency key of `start`.
pub type TaskId = Id<Task>;

/// Agent identity, unique per deployment.
pub type AgentId = Id<Agent>;

/// Identifier of one outbound delegation request.
pub type DelegationId = Id<Delegation>;

/// Identifier of one WebSocket subscription.
pub type SubscriberId = Id<Subscriber>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn ids_round_trip_as_bare_strings() {
        let task = TaskId::new("T1").unwrap();
        let json = serde_json::to_string(&task).unwrap();
        assert_eq!(json, "\"T1\"");

        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
        assert_eq!(back, "T1");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("bad\nid")]
    fn invalid_ids_are_rejected(#[case] raw: &str) {
        let err = AgentId::new(raw).unwrap_err();
        assert_eq!(err.kind, "agent");
    }

    #[test]
    fn overlong_id_is_rejected() {
        let raw = "x".repeat(MAX_ID_LEN + 1);
        assert!(TaskId::new(raw).is_err());
        assert!(TaskId::new("x".repeat(MAX_ID_LEN)).is_ok());
    }

    #[test]
    fn deserialization_validates() {
        let result: Result<TaskId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    fn encode_any<T: IdMarker>(id: &Id<T>) -> String {
        serde_json::to_string(id).unwrap()
    }

    #[test]
    fn generic_callers_can_clone_and_encode() {
        let task = TaskId::new("T1").unwrap();
        let copy = task.clone();
        assert_eq!(encode_any(&copy), "\"T1\"");

        let ids: std::collections::BTreeSet<AgentId> = ["b", "a"]
            .into_iter()
            .map(|raw| AgentId::new(raw).unwrap())
            .collect();
        assert_eq!(ids.iter().next().unwrap(), "a");
    }

    #[test]
    fn minted_ids_carry_prefix() {
        let ulid = Ulid::new();
        let id = DelegationId::from_ulid(ulid);
        assert_eq!(id.to_string(), format!("dlg-{ulid}"));

        let sub = SubscriberId::from_ulid(ulid);
        assert!(sub.as_str().starts_with("sub-"));
    }
}
