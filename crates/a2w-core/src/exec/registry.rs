//! ExecutorRegistry - one executor per `task_type`.

use std::collections::HashMap;
use std::sync::Arc;

use super::executor::{DynExecutor, Executor, TypedExecutor};
use super::task::Task;
use crate::ports::Ability;

/// ExecutorRegistry maps `task_type` to a type-erased executor.
///
/// # Example
/// ```ignore
/// let mut registry = ExecutorRegistry::new();
/// registry.register::<MarketScan, _>(MarketScanner)?;
/// let executor = registry.get("research.market_scan.v1");
/// ```
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn DynExecutor>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Executor for task type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, E: Executor<T> + 'static>(
        &mut self,
        executor: E,
    ) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedExecutor::new(executor)))
    }

    /// Registers an already type-erased executor.
    pub fn register_dyn(&mut self, executor: Arc<dyn DynExecutor>) -> Result<(), RegistryError> {
        let task_type = executor.task_type().to_string();
        if self.executors.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        self.executors.insert(task_type, executor);
        Ok(())
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn DynExecutor>> {
        self.executors.get(task_type).cloned()
    }

    /// Registered task types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }

    /// One ability per registered task type.
    pub fn abilities(&self) -> Vec<Ability> {
        self.registered_types()
            .into_iter()
            .filter_map(|task_type| {
                self.executors.get(&task_type).map(|executor| Ability {
                    description: executor.description().to_string(),
                    name: task_type,
                    input_schema: None,
                })
            })
            .collect()
    }
}
