//! `nodes` crate — the Action Dispatcher contract and built-in dispatchers.
//!
//! The engine never performs side effects itself. Every Action node is handed
//! to an [`ActionDispatcher`]; the most common one is an [`ActionRegistry`]
//! mapping `action_type` strings to [`ActionHandler`] implementations.

pub mod action;
pub mod dry_run;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use action::ActionType;
pub use dry_run::DryRunDispatcher;
pub use error::DispatchError;
pub use registry::ActionRegistry;
pub use traits::{ActionBranch, ActionDispatcher, ActionHandler, ActionOutcome, DispatchContext};
