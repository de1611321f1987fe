//! Code-aware indexing pipeline for Remembrances-MCP: tree-sitter parsing,
//! symbol extraction, chunking, content-hash change detection, the
//! indexing worker pool, and the knowledge-base filesystem watcher.

pub mod chunker;
pub mod extractor;
pub mod indexer;
pub mod merkle;
pub mod parser;
pub mod watcher;

pub use chunker::{chunk_text, compose_symbol_text, Chunk, DEFAULT_CHUNK_THRESHOLD, DEFAULT_OVERLAP};
pub use extractor::{extract_symbols, ExtractedSymbol};
pub use indexer::{Indexer, IndexerConfig, IndexerError};
pub use merkle::{compute_file_hash, ChangeSet, ExclusionFilter, MerkleTreeManager, TreeStats};
pub use parser::{CodeParser, ParserError, SupportedLanguage};
pub use watcher::{KbWatcher, WatcherError, DEFAULT_DEBOUNCE};
