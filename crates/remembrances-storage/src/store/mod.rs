//! Memory Store (C6): typed CRUD + per-type search for every data entity
//! in the data model, plus `user_stats` maintenance.

mod code;
mod documents;
mod events;
mod facts;
mod graph;
mod stats;
mod vectors;

use std::sync::Arc;

use crate::driver::StorageDriver;

pub use code::*;
pub use documents::*;
pub use events::*;
pub use facts::*;
pub use graph::*;
pub use stats::*;
pub use vectors::*;

/// Facade over every typed CRUD surface, sharing one [`StorageDriver`]
/// connection. Cheap to clone (the driver itself wraps `Surreal<Any>`,
/// which is already reference-counted internally).
#[derive(Clone)]
pub struct MemoryStore {
    pub(crate) driver: Arc<StorageDriver>,
}

impl MemoryStore {
    pub fn new(driver: StorageDriver) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    pub fn driver(&self) -> &StorageDriver {
        &self.driver
    }
}

/// RFC3339 timestamp string produced by the SurrealDB engine itself
/// (`time::now()`), never constructed client-side and marshalled in — see
/// spec.md §9 "Newlines in content" / "Time precision" notes. This helper
/// is used only where a value is needed *before* a query executes (e.g. to
/// compare against a stored mtime); writes always use `time::now()`
/// inside the SurrealQL statement.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
