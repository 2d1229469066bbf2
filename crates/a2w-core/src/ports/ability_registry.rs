//! AbilityRegistry port - source of the `/capabilities` listing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One externally defined ability this agent exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

pub trait AbilityRegistry: Send + Sync {
    fn abilities(&self) -> Vec<Ability>;
}
