//! RuntimeBuilder - wires an [`AgentRuntime`] together.
//!
//! Fail-fast: configuration and the executor set are checked in `build`, so
//! a misconfigured agent never starts serving.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::app::broadcaster::StatusBroadcaster;
use crate::app::delegation::DelegationManager;
use crate::app::exchange::NeedInsightExchange;
use crate::app::fsm::FsmEngine;
use crate::app::registry::TaskRegistry;
use crate::app::reporter::ErrorReporter;
use crate::app::runtime::{AgentRuntime, RuntimeInner};
use crate::app::scheduler::{AdmissionQueue, WeightedScheduler};
use crate::config::{ConfigError, RuntimeConfig};
use crate::domain::{AgentId, AgentRecord};
use crate::exec::{DynExecutor, Executor, ExecutorRegistry, RegistryError, Task};
use crate::impls::{HttpDelegationTransport, InMemoryReportStore, StaticAbilities};
use crate::ports::{
    AbilityRegistry, Clock, DelegationTransport, IdGenerator, ReportStore, SystemClock,
    UlidGenerator,
};

/// RuntimeBuilder builds an [`AgentRuntime`].
///
/// # Example
/// ```ignore
/// let runtime = RuntimeBuilder::new(config)
///     .register::<MarketScan, _>(MarketScanner)?
///     .expect_task_types(&[MarketScan::TYPE])
///     .build()?;
/// ```
///
/// Every port has a default: `SystemClock`, ULID ids, the in-memory report
/// store, abilities from the config and, when `peers` is set, the HTTP
/// delegation transport.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    executors: ExecutorRegistry,
    expected_task_types: Option<Vec<String>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    store: Option<Arc<dyn ReportStore>>,
    abilities: Option<Arc<dyn AbilityRegistry>>,
    transport: Option<Arc<dyn DelegationTransport>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These task types were expected but have no executor.")]
    MissingTaskTypes(Vec<String>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("delegation transport: {0}")]
    Transport(String),
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            executors: ExecutorRegistry::new(),
            expected_task_types: None,
            clock: None,
            ids: None,
            store: None,
            abilities: None,
            transport: None,
        }
    }

    pub fn register<T: Task, E: Executor<T> + 'static>(
        mut self,
        executor: E,
    ) -> Result<Self, RegistryError> {
        self.executors.register::<T, E>(executor)?;
        Ok(self)
    }

    pub fn register_dyn(mut self, executor: Arc<dyn DynExecutor>) -> Result<Self, RegistryError> {
        self.executors.register_dyn(executor)?;
        Ok(self)
    }

    /// `build` fails unless every listed task type has an executor.
    pub fn expect_task_types(mut self, task_types: &[&str]) -> Self {
        self.expected_task_types = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_report_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_abilities(mut self, abilities: Arc<dyn AbilityRegistry>) -> Self {
        self.abilities = Some(abilities);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn DelegationTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<AgentRuntime, BuildError> {
        self.config.validate()?;
        if let Some(expected) = &self.expected_task_types {
            let registered = self.executors.registered_types();
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !registered.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing));
            }
        }

        let config = self.config;
        let agent_id = AgentId::new(config.agent_id.clone())
            .map_err(|e| BuildError::InvalidConfig(ConfigError::AgentId(e.to_string())))?;
        let agent = Arc::new(AgentRecord::new(
            agent_id,
            config.weight,
            config.allowed_callers.clone(),
            config.allowed_callees.clone(),
        ));

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryReportStore::new(config.log_capacity)));
        let abilities = self
            .abilities
            .unwrap_or_else(|| Arc::new(StaticAbilities::new(config.abilities.clone())));
        let transport = match self.transport {
            Some(transport) => Some(transport),
            None if !config.peers.is_empty() => {
                let peers: HashMap<AgentId, String> = config
                    .peers
                    .iter()
                    .map(|(agent, url)| (agent.clone(), url.clone()))
                    .collect();
                let transport = HttpDelegationTransport::new(peers, config.delegation_timeout())
                    .map_err(|e| BuildError::Transport(e.to_string()))?;
                Some(Arc::new(transport) as Arc<dyn DelegationTransport>)
            }
            None => None,
        };

        let broadcaster = Arc::new(StatusBroadcaster::new(
            Arc::clone(&agent),
            Arc::clone(&clock),
            config.broadcast_capacity,
        ));
        let registry = Arc::new(TaskRegistry::new());
        let fsm = Arc::new(FsmEngine::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
            Arc::clone(&store),
            Arc::clone(&clock),
        ));
        let exchange = NeedInsightExchange::new(
            Arc::clone(&registry),
            Arc::clone(&fsm),
            Arc::clone(&broadcaster),
            Arc::clone(&clock),
            config.partial_insight,
        );
        let scheduler = WeightedScheduler::new(config.alpha, config.beta, config.interrupt_threshold);
        let delegation =
            DelegationManager::new(Arc::clone(&agent), Arc::clone(&ids), Arc::clone(&clock));
        let reporter = ErrorReporter::new(Arc::clone(&broadcaster), Arc::clone(&clock));
        let slots = Arc::new(Semaphore::new(config.max_concurrent));

        Ok(AgentRuntime::from_inner(RuntimeInner {
            config,
            agent,
            registry,
            fsm,
            exchange,
            scheduler,
            admission: AdmissionQueue::new(),
            delegation,
            broadcaster,
            reporter,
            executors: self.executors,
            abilities,
            store,
            transport,
            ids,
            clock,
            slots,
        }))
    }
}
