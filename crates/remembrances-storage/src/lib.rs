//! Storage driver, schema manager, and memory store for Remembrances-MCP.
//!
//! This crate provides a unified interface over a single SurrealDB
//! instance, embedded or remote depending on the connection URL scheme:
//!
//! - [`StorageDriver`]: connects via `surrealdb::engine::any`, dispatching
//!   embedded (`mem://`, `rocksdb://`, `surrealkv://`) vs. remote
//!   (`ws://`, `wss://`) backends by scheme.
//! - [`SchemaManager`]: applies ordered, idempotent migrations bringing a
//!   fresh or existing database up to the current schema version.
//! - [`MemoryStore`]: typed CRUD and per-type search across every data
//!   entity — facts, vectors, entities/relationships, knowledge-base
//!   documents, events, and code indexing state.
//!
//! ## Example
//!
//! ```ignore
//! use remembrances_storage::{ConnectConfig, StorageDriver, SchemaManager, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = StorageDriver::connect(&ConnectConfig::default()).await?;
//!     SchemaManager::migrate(&driver).await?;
//!     let store = MemoryStore::new(driver);
//!     store.save_fact(Some("alice"), "timezone", "Europe/Madrid").await?;
//!     Ok(())
//! }
//! ```

mod driver;
mod error;
mod schema;
mod store;
mod types;

pub use driver::{ConnectConfig, StorageDriver};
pub use error::StorageError;
pub use schema::{SchemaManager, TARGET_VERSION};
pub use store::{MemoryStore, COUNTED_FIELDS};
pub use types::*;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
