//! Error types for the npcflow pipeline.
//!
//! Two families live here. [`ProviderError`] is what an external
//! collaborator returns from a single call; the orchestrator captures it,
//! persists it as a [`FailureRecord`] and never lets it escape a run.
//! [`NpcflowError`] is what the crate returns to its callers, and the only
//! runtime variant that aborts a run is [`NpcflowError::Storage`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::{EntityId, Stage};

/// The persisted failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or parse failure while fetching external content.
    Fetch,
    /// The entity has no corresponding external page.
    NotFound,
    /// The inference provider failed or timed out.
    Inference,
    /// The record store was unavailable or returned inconsistent data.
    Storage,
    /// Advisory only: a result was produced with low confidence.
    LowConfidence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "FetchError"),
            Self::NotFound => write!(f, "NotFoundError"),
            Self::Inference => write!(f, "InferenceError"),
            Self::Storage => write!(f, "StorageError"),
            Self::LowConfidence => write!(f, "LowConfidenceError"),
        }
    }
}

impl ErrorKind {
    /// Returns true if this kind never halts a stage.
    #[must_use]
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::LowConfidence)
    }
}

/// Failure returned by an external collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network, timeout or parse failure while fetching.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// No external page exists for the entity.
    #[error("no external page for entity {0}")]
    NotFound(EntityId),

    /// The inference provider failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ProviderError {
    /// Creates a fetch error.
    #[must_use]
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    /// Creates an inference error.
    #[must_use]
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Returns the persisted kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Inference(_) => ErrorKind::Inference,
        }
    }

    /// Returns true if repeating the call could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

/// Persisted record of a failed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Failure classification.
    pub error_kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// When the failure happened.
    pub occurred_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a failure record stamped with the current time.
    #[must_use]
    pub fn new(error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_kind,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl From<&ProviderError> for FailureRecord {
    fn from(err: &ProviderError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_kind, self.message)
    }
}

/// Errors raised by a record store backend.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The backend could not be reached or locked.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("corrupt record for entity {entity_id}: {message}")]
    Corrupt {
        /// The affected entity.
        entity_id: EntityId,
        /// What was wrong with the row.
        message: String,
    },

    /// The backend rejected a statement.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// The main error type for npcflow operations.
#[derive(Debug, Error)]
pub enum NpcflowError {
    /// The record store failed; the entity's run was aborted.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Force refresh was requested for a stage that has no slot.
    #[error("cannot force refresh from stage '{0}'")]
    InvalidRefreshTarget(Stage),

    /// A stage transition skipped or reversed the stage order.
    #[error("illegal stage transition: {from} -> {to}")]
    IllegalTransition {
        /// The current stage.
        from: Stage,
        /// The requested stage.
        to: Stage,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for NpcflowError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl NpcflowError {
    /// Returns the persisted kind if this error maps onto the taxonomy.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Storage(_) => Some(ErrorKind::Storage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display_uses_taxonomy_names() {
        assert_eq!(ErrorKind::Fetch.to_string(), "FetchError");
        assert_eq!(ErrorKind::NotFound.to_string(), "NotFoundError");
        assert_eq!(ErrorKind::Inference.to_string(), "InferenceError");
        assert_eq!(ErrorKind::Storage.to_string(), "StorageError");
        assert_eq!(ErrorKind::LowConfidence.to_string(), "LowConfidenceError");
    }

    #[test]
    fn test_error_kind_serialize() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, r#""not_found""#);
    }

    #[test]
    fn test_only_low_confidence_is_advisory() {
        assert!(ErrorKind::LowConfidence.is_advisory());
        assert!(!ErrorKind::Inference.is_advisory());
        assert!(!ErrorKind::Storage.is_advisory());
    }

    #[test]
    fn test_provider_error_kind_and_transience() {
        let fetch = ProviderError::fetch("connection reset");
        assert_eq!(fetch.kind(), ErrorKind::Fetch);
        assert!(fetch.is_transient());

        let missing = ProviderError::NotFound(EntityId::new(9));
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(!missing.is_transient());
        assert!(missing.to_string().contains('9'));
    }

    #[test]
    fn test_failure_record_from_provider_error() {
        let err = ProviderError::inference("quota exceeded");
        let record = FailureRecord::from(&err);

        assert_eq!(record.error_kind, ErrorKind::Inference);
        assert!(record.message.contains("quota exceeded"));
        assert!(record.to_string().starts_with("InferenceError"));
    }

    #[test]
    fn test_storage_error_maps_to_kind() {
        let err = NpcflowError::from(StorageError::Unavailable("disk gone".into()));
        assert_eq!(err.kind(), Some(ErrorKind::Storage));
        assert!(err.to_string().contains("disk gone"));

        let err = NpcflowError::InvalidRefreshTarget(Stage::Complete);
        assert_eq!(err.kind(), None);
    }
}
