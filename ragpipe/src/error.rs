//! Error types for the `ragpipe` crate.

use std::fmt;

use thiserror::Error;

use crate::pipeline::PipelineState;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An invalid parameter or parameter combination. Raised before any
    /// collaborator is called.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An embedder or generator could not be reached or failed transiently.
    #[error("Collaborator unavailable ({provider}): {message}")]
    CollaboratorUnavailable {
        /// The collaborator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An embedder or generator call exceeded its deadline.
    #[error("Collaborator timed out ({provider}) after {timeout_ms}ms")]
    CollaboratorTimeout {
        /// The collaborator that timed out.
        provider: String,
        /// The deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// An embedder or generator rejected the call due to rate limits or quota.
    #[error("Collaborator quota exceeded ({provider}): {message}")]
    CollaboratorQuota {
        /// The collaborator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A collaborator rejected its input as malformed.
    #[error("Invalid input ({provider}): {message}")]
    InvalidInput {
        /// The component that rejected the input.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generator's output does not conform to the required schema.
    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    /// A vector does not fit the index (wrong dimension or non-finite values).
    #[error("Index inconsistency: {0}")]
    IndexInconsistency(String),

    /// A query step failed. Carries the state the pipeline was in and the
    /// originating error.
    #[error("Pipeline failed in state {state}: {source}")]
    Pipeline {
        /// The state in which the failure occurred.
        state: PipelineState,
        /// The originating error.
        #[source]
        source: Box<RagError>,
    },

    /// A JSON encoding or decoding failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// The category of a [`RagError`], independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`RagError::ConfigError`].
    Configuration,
    /// See [`RagError::CollaboratorUnavailable`] and [`RagError::CollaboratorTimeout`].
    CollaboratorUnavailable,
    /// See [`RagError::CollaboratorQuota`].
    CollaboratorQuota,
    /// See [`RagError::InvalidInput`].
    InvalidInput,
    /// See [`RagError::SchemaValidation`].
    SchemaValidation,
    /// See [`RagError::IndexInconsistency`].
    IndexInconsistency,
    /// See [`RagError::Serialization`].
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "ConfigurationError",
            Self::CollaboratorUnavailable => "CollaboratorUnavailableError",
            Self::CollaboratorQuota => "CollaboratorQuotaError",
            Self::InvalidInput => "InvalidInputError",
            Self::SchemaValidation => "SchemaValidationError",
            Self::IndexInconsistency => "IndexInconsistencyError",
            Self::Serialization => "SerializationError",
        };
        f.write_str(name)
    }
}

impl RagError {
    /// The kind of the originating error, looking through any
    /// [`RagError::Pipeline`] wrapper.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError(_) => ErrorKind::Configuration,
            Self::CollaboratorUnavailable { .. } | Self::CollaboratorTimeout { .. } => {
                ErrorKind::CollaboratorUnavailable
            }
            Self::CollaboratorQuota { .. } => ErrorKind::CollaboratorQuota,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::SchemaValidation(_) => ErrorKind::SchemaValidation,
            Self::IndexInconsistency(_) => ErrorKind::IndexInconsistency,
            Self::Pipeline { source, .. } => source.kind(),
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// The pipeline state in which this error was raised, if it came out of
    /// a query run.
    pub fn failed_state(&self) -> Option<PipelineState> {
        match self {
            Self::Pipeline { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Whether the originating error was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::CollaboratorTimeout { .. } => true,
            Self::Pipeline { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Whether a collaborator call that failed with this error may be
    /// attempted again. Quota errors are retryable only when `retry_on_quota`
    /// is set.
    pub fn is_retryable(&self, retry_on_quota: bool) -> bool {
        match self.kind() {
            ErrorKind::CollaboratorUnavailable => true,
            ErrorKind::CollaboratorQuota => retry_on_quota,
            _ => false,
        }
    }

    pub(crate) fn in_state(self, state: PipelineState) -> Self {
        Self::Pipeline { state, source: Box::new(self) }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
