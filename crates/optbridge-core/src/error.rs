//! Error types for the purchase-option bridge
//!
//! This module defines all error types used throughout the crate.
//! None of them ever reach host code: the session converts every failure
//! into a log line and a monitoring event.

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the bridge
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Discovery budget exhausted without locating the widget boundary
    #[error("Discovery timed out after {attempts} attempt(s)")]
    DiscoveryTimeout {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// State extraction failed for the current mutation cycle
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Embedded variant snapshot present but unparsable
    #[error("Malformed variant snapshot: {0}")]
    MalformedSnapshot(String),

    /// Product form could not be located for a host
    #[error("Product form not found for host {0}")]
    FormNotFound(String),

    /// Event dispatcher rejected an event
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// DOM access errors (unknown node, detached node)
    #[error("DOM error: {0}")]
    Dom(String),

    /// Filesystem errors while loading configs or fixtures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed snapshot error
    pub fn malformed_snapshot(msg: impl Into<String>) -> Self {
        Self::MalformedSnapshot(msg.into())
    }

    /// Create a dispatch error
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Create a DOM error
    pub fn dom(msg: impl Into<String>) -> Self {
        Self::Dom(msg.into())
    }
}

/// Why a selected node could not be turned into a `SelectionState`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// No node inside the selected option carries a usable price marker
    #[error("no price node under selected option")]
    NoPriceNode,

    /// The price node's text matched none of the price patterns
    #[error("no price pattern matched {text:?}")]
    Unparsable {
        /// Text content of the price node
        text: String,
    },

    /// A pattern matched but the value was zero or negative
    #[error("non-positive price {value} parsed from {text:?}")]
    NonPositive {
        /// Text content of the price node
        text: String,
        /// Parsed value
        value: f64,
    },
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
