//! `engine` crate — workflow models, graph validation, trigger matching,
//! condition evaluation, the execution scheduler and its resumption worker.

pub mod clock;
pub mod condition;
pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod models;
pub mod resumption;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod trigger;
pub mod versions;

pub use clock::{Clock, ManualClock, SystemClock};
pub use condition::{ConditionEvaluator, Evaluation};
pub use config::EngineConfig;
pub use error::{EngineError, Violation};
pub use filter::{Filter, FilterEvaluationError, Operator};
pub use graph::{validate_integrity, validate_structure, Graph};
pub use models::{
    Edge, EdgeLabel, Event, ExecutionStatus, LogEntry, LogLevel, Node, NodeKind, Workflow,
    WorkflowExecution, WorkflowVersion,
};
pub use resumption::{spawn_resumption, ResumptionService};
pub use scheduler::ExecutionScheduler;
pub use stats::{aggregate, StatsAggregator, StatsWindow, WorkflowStats};
pub use store::{MemoryStore, Store, StoreError};
pub use trigger::{TriggerMatch, TriggerMatcher};
pub use versions::VersionStore;

#[cfg(test)]
mod scheduler_tests;
