//! Error types for layout operations.

use thiserror::Error;

/// Errors that can occur while configuring or running a layout.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// A parameter failed validation before any iteration ran.
    #[error("invalid layout parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The run was canceled cooperatively; no converged result exists.
    #[error("layout canceled after {steps} steps")]
    Canceled { steps: usize },

    /// A graph node had no recorded position when forces were computed.
    /// Sync seeds every graph node first, so this means a missed sync.
    #[error("no position recorded for node {node}")]
    MissingPosition { node: String },

    /// The layout reached a state that should be unreachable.
    #[error("layout inconsistency: {message}")]
    InconsistentState { message: String },

    /// No algorithm is registered under the requested name.
    #[error("unknown layout algorithm: {name}")]
    UnknownAlgorithm { name: String },

    /// The periodic layout service failed to start or stopped abnormally.
    #[error("layout service error: {0}")]
    Service(String),
}

impl LayoutError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        LayoutError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Whether this error is a cooperative cancellation rather than a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, LayoutError::Canceled { .. })
    }
}
