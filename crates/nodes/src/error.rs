//! Dispatch-level error type.

use thiserror::Error;

/// Errors returned by an [`ActionDispatcher`](crate::ActionDispatcher).
///
/// The engine does not retry on any variant: a dispatch error moves the
/// execution straight to `failed`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler is registered for the requested action type.
    #[error("unknown action type '{0}'")]
    UnknownAction(String),

    /// The node's `params` could not be used by the handler.
    #[error("invalid parameters for '{action_type}': {message}")]
    InvalidParams {
        action_type: String,
        message: String,
    },

    /// The external side effect failed.
    #[error("action failed: {0}")]
    Failed(String),
}
