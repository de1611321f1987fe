//! MCP-facing error type: wraps every domain error Remembrances-MCP can
//! raise and converts it to an `rmcp::ErrorData` for tool handlers.
//!
//! Per the error handling design (spec.md §7): a tool call that fails
//! returns `isError=true` with a human-readable message, never a raw
//! Rust `Debug` dump and never a leaked secret.

use rmcp::ErrorData;
use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Errors that can occur in the MCP server.
#[derive(Error, Debug)]
pub enum McpError {
    #[error(transparent)]
    Storage(#[from] remembrances_storage::StorageError),

    #[error(transparent)]
    Search(#[from] remembrances_search::SearchError),

    #[error(transparent)]
    Indexer(#[from] remembrances_core::IndexerError),

    #[error(transparent)]
    Watcher(#[from] remembrances_core::WatcherError),

    /// Invalid parameters provided
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// A requested resource (symbol, project, document...) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error (`last_to_remember`'s plain-YAML response)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl McpError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        McpError::InvalidParams(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        McpError::NotFound(message.into())
    }
}

/// Converted at the tool-handler boundary so every `#[tool]` function can
/// return `Result<CallToolResult, ErrorData>` directly via `?`.
impl From<McpError> for ErrorData {
    fn from(err: McpError) -> Self {
        match &err {
            McpError::InvalidParams(_) | McpError::NotFound(_) => {
                ErrorData::invalid_params(err.to_string(), None)
            }
            McpError::Storage(remembrances_storage::StorageError::NotFound { .. }) => {
                ErrorData::invalid_params(err.to_string(), None)
            }
            McpError::Storage(remembrances_storage::StorageError::ValidationError(_)) => {
                ErrorData::invalid_params(err.to_string(), None)
            }
            McpError::Indexer(remembrances_core::IndexerError::AlreadyInProgress { .. }) => {
                ErrorData::invalid_params(err.to_string(), None)
            }
            _ => ErrorData::internal_error(err.to_string(), None),
        }
    }
}
