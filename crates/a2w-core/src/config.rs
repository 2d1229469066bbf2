//! RuntimeConfig - every tunable of an agent process.
//!
//! Deserialized from TOML by the CLI; every field has a default so an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::domain::{AgentId, PartialInsightPolicy, Weight};
use crate::ports::Ability;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub agent_id: String,
    pub weight: Weight,
    /// Empty accepts every caller.
    pub allowed_callers: BTreeSet<AgentId>,
    /// Empty means this agent delegates to nobody.
    pub allowed_callees: BTreeSet<AgentId>,
    pub alpha: f64,
    pub beta: f64,
    pub interrupt_threshold: u8,
    pub max_concurrent: usize,
    pub broadcast_capacity: usize,
    pub log_capacity: usize,
    pub stop_grace_ms: u64,
    pub partial_insight: PartialInsightPolicy,
    pub weight_update_token: Option<String>,
    /// Base URL of every peer this agent may delegate to.
    pub peers: BTreeMap<AgentId, String>,
    pub delegation_timeout_ms: u64,
    pub abilities: Vec<Ability>,
    pub host: String,
    pub port: u16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            agent_id: "a2w-agent".to_string(),
            weight: Weight::default(),
            allowed_callers: BTreeSet::new(),
            allowed_callees: BTreeSet::new(),
            alpha: 1.0,
            beta: 1.0,
            interrupt_threshold: 20,
            max_concurrent: 4,
            broadcast_capacity: 256,
            log_capacity: 10_000,
            stop_grace_ms: 5_000,
            partial_insight: PartialInsightPolicy::default(),
            weight_update_token: None,
            peers: BTreeMap::new(),
            delegation_timeout_ms: 30_000,
            abilities: Vec::new(),
            host: "127.0.0.1".to_string(),
            port: 8700,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("agent_id: {0}")]
    AgentId(String),

    #[error("{field} must be a finite, non-negative number (got {value})")]
    Coefficient { field: &'static str, value: f64 },

    #[error("interrupt_threshold must be within [0, 100], got {0}")]
    Threshold(u8),

    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        AgentId::new(self.agent_id.clone()).map_err(|e| ConfigError::AgentId(e.to_string()))?;
        for (field, value) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Coefficient { field, value });
            }
        }
        if self.interrupt_threshold > 100 {
            return Err(ConfigError::Threshold(self.interrupt_threshold));
        }
        for (field, value) in [
            ("max_concurrent", self.max_concurrent),
            ("broadcast_capacity", self.broadcast_capacity),
            ("log_capacity", self.log_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(field));
            }
        }
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn delegation_timeout(&self) -> Duration {
        Duration::from_millis(self.delegation_timeout_ms)
    }
}
