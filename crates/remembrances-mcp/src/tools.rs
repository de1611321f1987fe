//! MCP tool parameter definitions.
//!
//! These structs define the JSON Schema for tool parameters using
//! schemars. Every field is a primitive, an array of primitives, or a
//! string-keyed map of strings — no richer nesting is exposed across the
//! MCP boundary; handlers that need structured data accept it as a
//! string-to-string map and parse it internally.

use std::collections::HashMap;

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SaveFactParams {
    #[schemars(description = "Owning user id; omit for the global scope")]
    pub user_id: Option<String>,
    #[schemars(description = "Fact key")]
    pub key: String,
    #[schemars(description = "Fact value")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetFactParams {
    pub user_id: Option<String>,
    #[schemars(description = "Fact key to look up")]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListFactsParams {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteFactParams {
    pub user_id: Option<String>,
    pub key: String,
}

// ---------------------------------------------------------------------
// Vectors
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddVectorParams {
    pub user_id: Option<String>,
    #[schemars(description = "Text content to embed and store")]
    pub content: String,
    #[schemars(description = "Arbitrary string-keyed metadata")]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchVectorsParams {
    #[schemars(description = "Natural language query")]
    pub query: String,
    pub user_id: Option<String>,
    #[schemars(description = "Maximum results (default 10)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateVectorParams {
    #[schemars(description = "Vector record id, e.g. vectors:abc123")]
    pub id: String,
    pub content: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteVectorParams {
    pub id: String,
}

// ---------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateEntityParams {
    pub name: String,
    #[schemars(description = "Entity labels, e.g. [\"Person\", \"Employee\"]")]
    pub labels: Option<Vec<String>>,
    #[schemars(description = "Arbitrary string-keyed properties")]
    pub properties: Option<HashMap<String, String>>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateRelationshipParams {
    #[schemars(description = "Record id or entity name of the source")]
    pub from_entity: String,
    #[schemars(description = "Record id or entity name of the target")]
    pub to_entity: String,
    #[schemars(description = "Relationship type; also the table it is filed under")]
    pub relationship_type: String,
    pub properties: Option<HashMap<String, String>>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TraverseGraphParams {
    #[schemars(description = "Record id or entity name to start from")]
    pub start_entity: String,
    #[schemars(description = "Restrict traversal to a single relationship type")]
    pub relationship_type: Option<String>,
    #[schemars(description = "Maximum hop count (default 1)")]
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetEntityParams {
    #[schemars(description = "Record id or entity name; both forms are accepted")]
    pub entity_id_or_name: String,
}

// ---------------------------------------------------------------------
// Knowledge base documents
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddDocumentParams {
    #[schemars(description = "Path identifying the document, e.g. notes/today.md")]
    pub file_path: String,
    pub content: String,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchDocumentsParams {
    pub query: String,
    #[schemars(description = "Maximum results (default 10)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetDocumentParams {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteDocumentParams {
    pub file_path: String,
}

// ---------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HybridSearchParams {
    pub query: String,
    pub user_id: Option<String>,
    #[schemars(description = "Maximum results (default 10)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetStatsParams {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LastToRememberParams {
    pub user_id: Option<String>,
}

// ---------------------------------------------------------------------
// Code
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexProjectParams {
    #[schemars(description = "Absolute or relative path to the project root")]
    pub project_path: String,
    #[schemars(description = "Display name; defaults to the root directory's name")]
    pub project_name: Option<String>,
    #[schemars(description = "Restrict indexing to these languages (by extension family); omit for all supported")]
    pub languages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexStatusParams {
    #[schemars(description = "Job id returned by code_index_project; omit to report the most recent job overall")]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListProjectsParams {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteProjectParams {
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReindexFileParams {
    pub project_id: String,
    #[schemars(description = "Path relative to the project root")]
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectStatsParams {
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileSymbolsParams {
    pub project_id: String,
    #[schemars(description = "Path relative to the project root")]
    pub relative_path: String,
    #[schemars(description = "Include each symbol's full source text (default false)")]
    pub include_body: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FindSymbolParams {
    pub project_id: String,
    #[schemars(
        description = "Name-path pattern. Bare name matches anywhere; 'A/B' matches as a suffix; '/A/B' matches from the root; a trailing '*' is a prefix wildcard"
    )]
    pub name_path_pattern: String,
    pub languages: Option<Vec<String>>,
    pub symbol_types: Option<Vec<String>>,
    #[schemars(description = "Maximum results (default 20)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchSymbolsSemanticParams {
    pub project_id: String,
    pub query: String,
    #[schemars(description = "Maximum results (default 10)")]
    pub limit: Option<usize>,
    pub languages: Option<Vec<String>>,
    pub symbol_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchPatternParams {
    pub project_id: String,
    #[schemars(description = "Literal substring or, if is_regex, a regular expression")]
    pub pattern: String,
    pub is_regex: Option<bool>,
    #[schemars(description = "Restrict to files under this relative path prefix")]
    pub path_prefix: Option<String>,
    #[schemars(description = "Maximum matching lines to return (default 50)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FindReferencesParams {
    pub project_id: String,
    #[schemars(description = "Record id of the symbol to find references to")]
    pub symbol_id: Option<String>,
    #[schemars(description = "Name to search for when symbol_id is not known")]
    pub symbol_name: Option<String>,
    #[schemars(description = "Maximum results (default 20)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CodeHybridSearchParams {
    pub project_id: String,
    pub query: String,
    #[schemars(description = "Also search oversized-symbol chunk bodies (default true)")]
    pub include_chunks: Option<bool>,
    #[schemars(description = "Maximum results (default 10)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReplaceSymbolParams {
    pub project_id: String,
    #[schemars(description = "Record id of the symbol to replace, from code_find_symbol or code_search_symbols_semantic")]
    pub symbol_id: String,
    #[schemars(description = "Source text to replace the symbol's current byte range with")]
    pub new_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InsertAfterSymbolParams {
    pub project_id: String,
    pub symbol_id: String,
    #[schemars(description = "Source text inserted immediately after the symbol's closing byte")]
    pub new_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InsertBeforeSymbolParams {
    pub project_id: String,
    pub symbol_id: String,
    #[schemars(description = "Source text inserted immediately before the symbol's opening byte")]
    pub new_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteSymbolParams {
    pub project_id: String,
    pub symbol_id: String,
}

// ---------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HowToUseParams {
    #[schemars(description = "Tool group ('remembrance', 'kb', 'code') or a specific tool name; omit for the overview")]
    pub topic: Option<String>,
}
