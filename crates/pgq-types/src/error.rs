//! Error types for pgq
//!
//! Separates a call the engine rejected from a call whose result broke the
//! operation's row contract. Empty results are never errors.

use thiserror::Error;

/// SQLSTATE reported when a queue's backing relation does not exist
pub const UNDEFINED_TABLE: &str = "42P01";

/// SQLSTATE reported when a queue is created twice
pub const DUPLICATE_TABLE: &str = "42P07";

/// SQLSTATE reported for an invalid queue name or argument
pub const INVALID_PARAMETER: &str = "22023";

/// SQLSTATE reported for statements issued after a failed one in the same transaction
pub const IN_FAILED_TRANSACTION: &str = "25P02";

/// SQLSTATE reported when a commit loses a race with a concurrent transaction
pub const SERIALIZATION_FAILURE: &str = "40001";

/// Main error type for pgq operations
#[derive(Error, Debug)]
pub enum Error {
    /// The engine rejected the call
    #[error("Engine error{}: {message}", sqlstate_suffix(.code))]
    Engine {
        /// SQLSTATE, when the engine reports one
        code: Option<String>,
        message: String,
    },

    /// The engine returned no row (or the wrong kind of row) where exactly one was required
    #[error("Protocol error in {operation}: {message}")]
    Protocol {
        operation: &'static str,
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

fn sqlstate_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

impl Error {
    /// Engine rejection carrying a SQLSTATE
    pub fn engine(code: &str, message: impl Into<String>) -> Self {
        Self::Engine {
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    /// Engine rejection without a SQLSTATE (transport failures, aborted connections)
    pub fn engine_uncoded(message: impl Into<String>) -> Self {
        Self::Engine {
            code: None,
            message: message.into(),
        }
    }

    pub fn protocol(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Protocol {
            operation,
            message: message.into(),
        }
    }

    pub fn is_engine(&self) -> bool {
        matches!(self, Self::Engine { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// SQLSTATE of an engine error
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Engine { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// The call targeted a queue that does not exist
    pub fn is_undefined_queue(&self) -> bool {
        self.code() == Some(UNDEFINED_TABLE)
    }

    /// A create call targeted a queue that already exists.
    ///
    /// Callers wanting idempotent creation ignore exactly this error.
    pub fn is_duplicate_queue(&self) -> bool {
        self.code() == Some(DUPLICATE_TABLE)
    }
}

/// Result type alias for pgq operations
pub type Result<T> = std::result::Result<T, Error>;
