//! Storage-layer error types.
//!
//! Covers the `StorageError`, `SchemaError`, `NotFound`, `ValidationError`,
//! `JobConflict`, and `Cancelled` members of the workspace error taxonomy.
//! `ConfigError`, `EmbeddingError`, and `ParseError` live in
//! `remembrances-config` and `remembrances-core`/`remembrances-search`
//! respectively and are wrapped here via `#[from]` at call sites that need
//! to surface them through the storage layer's `Result`.

use thiserror::Error;

/// Errors that can occur during storage, schema, or memory-store operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The underlying SurrealDB engine returned an error not otherwise
    /// classified below (connection loss, query failure, serialization
    /// mismatch).
    #[error("storage query failed: {0}")]
    Query(#[from] surrealdb::Error),

    /// A schema migration failed and was not an "already exists" case.
    #[error("schema migration {version} failed: {message}")]
    Schema { version: u32, message: String },

    /// A referenced record does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Input failed a typed-schema or invariant constraint.
    #[error("validation failed: {0}")]
    ValidationError(String),

    /// Indexing is already in progress for this project.
    #[error("indexing already in progress for project '{project_id}'")]
    JobConflict { project_id: String },

    /// The operation's cancellation context was cancelled.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// JSON (de)serialization of a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn schema(version: u32, message: impl Into<String>) -> Self {
        Self::Schema {
            version,
            message: message.into(),
        }
    }

    pub fn job_conflict(project_id: impl Into<String>) -> Self {
        Self::JobConflict {
            project_id: project_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// True when the underlying engine error is an idempotent
    /// "already exists" condition — the schema manager treats this the
    /// same as success (spec: "An 'already exists' error from the engine
    /// is also caught and treated as success").
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Query(e) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("already exists")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StorageError::not_found("entity", "entities:alice");
        assert_eq!(err.to_string(), "entity 'entities:alice' not found");
    }

    #[test]
    fn test_job_conflict_display() {
        let err = StorageError::job_conflict("proj_1");
        assert!(err.to_string().contains("proj_1"));
        assert!(err.to_string().contains("already in progress"));
    }
}
