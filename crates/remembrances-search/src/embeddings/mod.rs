//! Embedding providers for Remembrances-MCP (spec.md §4.1).
//!
//! Three backends behind one trait:
//!
//! ```text
//! EmbeddingProvider (trait)
//!     ├── GgufProvider   - local model via llama.cpp bindings
//!     └── HttpProvider   - Ollama-compatible or OpenAI-compatible HTTP
//! ```
//!
//! Callers never construct a provider directly; they ask an
//! [`EmbedderFactory`] for "default" or "code" and get back whichever
//! instance configuration resolved to, per the selection priority local
//! GGUF > local HTTP > remote HTTP.

mod factory;
mod gguf;
mod http;
mod provider;

pub use factory::{validate_dimension, EmbedderFactory};
pub use gguf::{GgufConfig, GgufProvider};
pub use http::{HttpConfig, HttpFlavor, HttpProvider};
pub use provider::{
    EmbeddingProvider, EmbeddingProviderKind, DEFAULT_CHARS_PER_TOKEN, MAX_CHARS_CEILING,
    UBATCH_SAFETY_MARGIN,
};
