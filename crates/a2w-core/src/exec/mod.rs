//! Exec - typed executor API.
//!
//! - **Surface (typed)**: `Task`, `Executor<T>`
//! - **Inside (dyn)**: `DynExecutor`, stored in `ExecutorRegistry`

pub mod executor;
pub mod registry;
pub mod task;

pub use self::executor::{DynExecutor, Executor, TypedExecutor};
pub use self::registry::{ExecutorRegistry, RegistryError};
pub use self::task::Task;
