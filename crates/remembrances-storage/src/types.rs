//! Data model records shared by the storage driver and memory store.
//!
//! All entities are addressed by a string id of the form `table:local_id`.
//! `metadata`/`properties` fields are `serde_json::Value` so arbitrary
//! nested shapes round-trip verbatim — the Rust-side counterpart of the
//! engine's "flexible object" schema fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// A per-user string→string association. `(user_id, key)` is unique;
/// upsert is the only write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    pub id: String,
    pub user_id: Option<String>,
    pub key: String,
    pub value: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A semantic memory: free text plus its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryVector {
    pub id: String,
    pub user_id: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// A graph node. `name` is unique per user scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default = "empty_object")]
    pub properties: Value,
    pub created_at: String,
}

/// A directed, typed edge between two entities, stored in a table named by
/// `relationship_type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub id: String,
    #[serde(rename = "in")]
    pub from: String,
    #[serde(rename = "out")]
    pub to: String,
    pub user_id: Option<String>,
    pub relationship_type: String,
    #[serde(default = "empty_object")]
    pub properties: Value,
    pub created_at: String,
}

/// One chunk of a knowledge-base document. Every source file produces one
/// or more contiguous chunk records sharing `source_file`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub id: String,
    pub user_id: Option<String>,
    pub file_path: String,
    pub source_file: String,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// A time-stamped item for recency queries. No uniqueness constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub user_id: Option<String>,
    pub source: String,
    pub event_type: String,
    pub content: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    pub timestamp: String,
}

/// Indexing status of a code project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A discovered code repository/directory root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeProject {
    pub project_id: String,
    pub name: String,
    pub root_path: String,
    #[serde(default)]
    pub languages: std::collections::HashMap<String, u64>,
    pub indexing_status: IndexingStatus,
    #[serde(default)]
    pub language_stats: std::collections::HashMap<String, u64>,
    pub last_indexed_at: Option<String>,
    #[serde(default = "empty_object")]
    pub settings: Value,
}

/// One source file tracked within a project. `(project_id, path)` unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeFile {
    pub project_id: String,
    pub path: String,
    pub language: String,
    pub hash: String,
    pub last_indexed: String,
    pub size: u64,
}

/// Closed enumeration of code symbol kinds (spec.md §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Function,
    Method,
    Interface,
    Struct,
    Enum,
    Constant,
    Variable,
    Property,
    Type,
    Import,
    Namespace,
    Module,
}

/// A parsed code symbol with byte/line span and signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSymbol {
    pub id: String,
    pub project_id: String,
    pub file_path: String,
    pub language: String,
    pub name: String,
    pub name_path: String,
    pub symbol_type: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: u32,
    pub end_byte: u32,
    pub signature: String,
    pub source_code: String,
    pub parent_id: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
}

/// One chunk of an oversized symbol body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChunk {
    pub id: String,
    pub symbol_id: String,
    pub project_id: String,
    pub file_path: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// Lifecycle state of an indexing job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Server-side record tracking progress of an asynchronous indexing run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexingJob {
    pub job_id: String,
    pub project_id: String,
    pub status: JobStatus,
    pub progress: f32,
    pub files_total: u64,
    pub files_indexed: u64,
    pub symbols_found: u64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error: Option<String>,
}

/// Per-user aggregate of counts per data type plus total byte size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserStats {
    pub user_id: String,
    pub key_value_count: i64,
    pub vector_count: i64,
    pub entity_count: i64,
    pub relationship_count: i64,
    pub document_count: i64,
    pub total_size_bytes: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// A single source for a hybrid-search hit — used to tie-break and tag
/// results per spec.md §4.7.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Vector,
    Document,
    Graph,
    Fact,
}

/// One ranked, tagged result from [`crate::store::MemoryStore`] searches or
/// hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub source: MatchSource,
    pub content: String,
    pub score: f32,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}
