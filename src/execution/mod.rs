//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod poll;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::StepExecutor;
pub use poll::{poll_until, RetryBudget};
