//! Error taxonomy shared by the core and every provider adapter.
//!
//! Provider failures carry a `transient` flag: rate limiting, server
//! errors and network failures are transient and retried by
//! [`retry::with_backoff`](crate::retry::with_backoff); everything else
//! surfaces immediately.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CensusError>;

#[derive(Debug, Clone, Error)]
pub enum CensusError {
    /// Missing or invalid configuration or credentials. Fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The document batch could not be assembled (unreadable input,
    /// duplicate ids). Fatal.
    #[error("corpus error: {0}")]
    Corpus(String),

    #[error("index error: {message}")]
    Index { message: String, transient: bool },

    #[error("extraction error: {message}")]
    Extraction { message: String, transient: bool },

    /// `malformed` marks a reply that arrived but held no usable count.
    #[error("generation error: {message}")]
    Generation {
        message: String,
        transient: bool,
        malformed: bool,
    },

    /// A capability was requested but no provider is configured for it.
    #[error("{0} provider is not configured")]
    Unavailable(&'static str),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },
}

impl CensusError {
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
            transient: false,
        }
    }

    pub fn index_transient(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
            transient: true,
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            transient: false,
        }
    }

    pub fn extraction_transient(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            transient: true,
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            transient: false,
            malformed: false,
        }
    }

    pub fn generation_transient(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            transient: true,
            malformed: false,
        }
    }

    /// The model replied, but the reply could not be read as a count.
    pub fn malformed_answer(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            transient: false,
            malformed: true,
        }
    }

    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Index { transient, .. }
            | Self::Extraction { transient, .. }
            | Self::Generation { transient, .. } => *transient,
            Self::Timeout { .. } => true,
            Self::Configuration(_) | Self::Corpus(_) | Self::Unavailable(_) => false,
        }
    }

    /// Configuration and corpus errors abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Corpus(_))
    }

    /// Model output could not be parsed. Triggers the strict-format retry.
    pub fn is_malformed_output(&self) -> bool {
        matches!(
            self,
            Self::Generation {
                malformed: true,
                ..
            }
        )
    }
}
