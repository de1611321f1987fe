//! Embedding providers and hybrid search for Remembrances-MCP.
//!
//! - [`embeddings`]: the [`embeddings::EmbeddingProvider`] trait and its
//!   three backends (local GGUF, Ollama-compatible HTTP, OpenAI-compatible
//!   HTTP), resolved through an [`embeddings::EmbedderFactory`].
//! - [`hybrid`]: the source-precedence merge across vector, document,
//!   graph, and fact results (spec.md §4.7).
//!
//! # Example
//!
//! ```ignore
//! use remembrances_search::{embeddings::EmbedderFactory, hybrid::HybridSearcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let embedders = EmbedderFactory::from_config(&config)?;
//!     let searcher = HybridSearcher::new(store);
//!     let hits = searcher.search(&embedders, "how auth works", None, 10).await?;
//!     Ok(())
//! }
//! ```

pub mod embeddings;
pub mod error;
pub mod hybrid;

pub use error::{Result, SearchError};
pub use hybrid::{HybridSearcher, DEFAULT_LIMIT};
