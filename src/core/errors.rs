use thiserror::Error;

/// Unified error type for the analysis engine
#[derive(Debug, Error)]
pub enum DepwallError {
    /// A task state was asked to make a transition its current state does not allow
    #[error("Illegal transition: cannot {transition} a task that is {from}")]
    IllegalTransition {
        from: &'static str,
        transition: &'static str,
    },

    /// A task's result or error was requested in the wrong state
    #[error("Task is {state}, it has no {requested}")]
    NotAvailable {
        state: &'static str,
        requested: &'static str,
    },

    /// A coordinate was referenced that the graph or closure engine does not know
    #[error("Node not found: {coordinates}")]
    NodeNotFound { coordinates: String },

    /// An internal bookkeeping invariant of the closure engine broke
    #[error("Invariant violated for {coordinates}: {message}")]
    Invariant {
        coordinates: String,
        message: String,
    },

    /// Channel/messaging errors
    #[error("Channel error: {channel} - {message}")]
    Channel { channel: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Persistence errors
    #[error("Persistence failed: {operation}")]
    Persistence {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed input, e.g. unparsable coordinates
    #[error("Invalid input: {message}")]
    Invalid { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation} (timeout: {timeout_ms}ms)")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Cancellation errors
    #[error("Operation was cancelled: {operation}")]
    Cancelled { operation: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DepwallError {
    pub fn illegal_transition(from: &'static str, transition: &'static str) -> Self {
        Self::IllegalTransition { from, transition }
    }

    pub fn not_available(state: &'static str, requested: &'static str) -> Self {
        Self::NotAvailable { state, requested }
    }

    pub fn node_not_found(coordinates: impl ToString) -> Self {
        Self::NodeNotFound {
            coordinates: coordinates.to_string(),
        }
    }

    pub fn invariant<M: Into<String>>(coordinates: impl ToString, message: M) -> Self {
        Self::Invariant {
            coordinates: coordinates.to_string(),
            message: message.into(),
        }
    }

    /// Create a channel error
    pub fn channel<S: Into<String>, M: Into<String>>(channel: S, message: M) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn persistence<S: Into<String>>(operation: S) -> Self {
        Self::Persistence {
            operation: operation.into(),
            source: None,
        }
    }

    pub fn persistence_with_source<S, E>(operation: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Persistence {
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Logic bugs in the orchestrator rather than data conditions. These must not be retried.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::IllegalTransition { .. }
                | Self::NotAvailable { .. }
                | Self::NodeNotFound { .. }
                | Self::Invariant { .. }
        )
    }

    /// Conditions that end a loop cooperatively without corrupting state
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Channel { .. } | Self::Cancelled { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::IllegalTransition { .. } | Self::NotAvailable { .. } => "task_state",
            Self::NodeNotFound { .. } | Self::Invariant { .. } => "graph",
            Self::Channel { .. } => "channel",
            Self::Configuration { .. } => "configuration",
            Self::Persistence { .. } => "persistence",
            Self::Serialization { .. } => "serialization",
            Self::Io { .. } => "io",
            Self::Invalid { .. } => "validation",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DepwallError>;

impl From<std::io::Error> for DepwallError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_yaml::Error> for DepwallError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<serde_json::Error> for DepwallError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<anyhow::Error> for DepwallError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_classification() {
        assert!(DepwallError::illegal_transition("QUEUED", "queue").is_invariant_violation());
        assert!(DepwallError::node_not_found("g:a:1").is_invariant_violation());
        assert!(!DepwallError::channel("download", "closed").is_invariant_violation());
        assert!(!DepwallError::configuration("bad").is_invariant_violation());
    }

    #[test]
    fn test_shutdown_classification() {
        assert!(DepwallError::channel("analysis", "closed").is_shutdown());
        assert!(DepwallError::cancelled("bookkeeping").is_shutdown());
        assert!(!DepwallError::internal("boom").is_shutdown());
    }

    #[test]
    fn test_display() {
        let err = DepwallError::illegal_transition("STARTED", "start");
        assert_eq!(
            err.to_string(),
            "Illegal transition: cannot start a task that is STARTED"
        );
        assert_eq!(err.category(), "task_state");
    }

    #[test]
    fn test_anyhow_conversion_keeps_chain() {
        let err = anyhow::anyhow!("root cause").context("resolving g:a");
        let converted: DepwallError = err.into();
        let display = converted.to_string();
        assert!(display.contains("resolving g:a"));
        assert!(display.contains("root cause"));
    }
}
