//! Error types for the node address agent
//!
//! Every collaborator failure aborts the current reconciliation cycle. The
//! variants separate what the driver should retry on the next interval from
//! what needs an operator to fix configuration or cluster state.

use thiserror::Error;

/// Main error type for node address agent operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed configuration value
    #[error("invalid {field}: {message}")]
    InvalidInput {
        /// Name of the offending setting (e.g., "external-ip-target")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// The kernel has no usable route (or source address) for a target
    #[error("no route to {target}: {message}")]
    NoRoute {
        /// Destination address that was looked up
        target: String,
        /// Description of what failed
        message: String,
    },

    /// The Node does not exist
    #[error("node {node} not found")]
    NotFound {
        /// Name of the missing Node
        node: String,
    },

    /// Kubernetes API failure (network, auth, conflict, failed patch test)
    #[error("kubernetes error during {operation}: {source}")]
    Api {
        /// Operation that failed (e.g., "patch node status")
        operation: String,
        /// The underlying kube-rs error
        #[source]
        source: kube::Error,
    },

    /// Failed to encode a patch body
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Aborted by a cancellation token or cycle deadline
    #[error("cancelled: {reason}")]
    Cancelled {
        /// Why the operation was aborted
        reason: String,
    },
}

impl Error {
    /// Create an invalid input error for the named setting
    pub fn invalid_input(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a no-route error for the given target
    pub fn no_route(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NoRoute {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for the given Node
    pub fn not_found(node: impl Into<String>) -> Self {
        Self::NotFound { node: node.into() }
    }

    /// Wrap a kube-rs error with the operation that produced it
    pub fn api(operation: impl Into<String>, source: kube::Error) -> Self {
        Self::Api {
            operation: operation.into(),
            source,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Whether the next reconciliation cycle may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoRoute { .. } | Self::Api { .. } => true,
            Self::InvalidInput { .. }
            | Self::NotFound { .. }
            | Self::Serialization { .. }
            | Self::Cancelled { .. } => false,
        }
    }

    /// Whether this error is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
