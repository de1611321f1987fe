//! Storage Driver (C4): a uniform API over the embedded and remote variants
//! of a single database engine.
//!
//! SurrealDB's `engine::any` connector already dispatches on URL scheme, so
//! the driver is a thin wrapper around `Surreal<Any>` that (a) normalizes
//! the spec's `memory://` alias to the engine's native `mem://`, (b) owns
//! namespace/database selection, and (c) exposes the narrow `query`/
//! `create`/`update`/`delete` surface the rest of the system is written
//! against — never the raw SurrealDB client — so callers cannot bypass
//! parameterized statements (spec.md §4.4, §9 "Newlines in content").

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{debug, instrument};

use crate::error::StorageError;

/// Connection parameters for [`StorageDriver::connect`].
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// `memory://`, `rocksdb://path`, `surrealkv://path` (embedded) or
    /// `ws://host:port` / `wss://host:port` (remote).
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub namespace: String,
    pub database: String,
    pub query_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            username: None,
            password: None,
            namespace: "test".to_string(),
            database: "test".to_string(),
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// `memory://` is the spec's spelling; the SurrealDB `any` engine spells
/// the same embedded in-memory KV store `mem://`.
fn normalize_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("memory://") {
        format!("mem://{rest}")
    } else {
        url.to_string()
    }
}

/// Uniform handle over an embedded or remote SurrealDB connection.
#[derive(Clone)]
pub struct StorageDriver {
    db: Surreal<Any>,
    query_timeout: Duration,
}

impl StorageDriver {
    /// Connect, selecting embedded vs. remote by URL scheme, then select
    /// the namespace/database scope.
    #[instrument(skip(cfg), fields(url = %cfg.url))]
    pub async fn connect(cfg: &ConnectConfig) -> Result<Self, StorageError> {
        let url = normalize_scheme(&cfg.url);
        debug!(url = %url, "connecting to storage engine");
        let db = any::connect(url).await?;

        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            db.signin(Root {
                username,
                password,
            })
            .await?;
        }

        db.use_ns(&cfg.namespace).use_db(&cfg.database).await?;

        Ok(Self {
            db,
            query_timeout: cfg.query_timeout,
        })
    }

    /// Select namespace/database scope (defaults `test`/`test` per
    /// spec.md §4.4).
    pub async fn use_ns_db(&self, namespace: &str, database: &str) -> Result<(), StorageError> {
        self.db.use_ns(namespace).use_db(database).await?;
        Ok(())
    }

    /// Execute a parameterized multi-statement query and return the raw
    /// response for the caller to `.take(n)` per statement.
    ///
    /// Callers MUST bind parameters rather than interpolate values into
    /// `sql` — this is the only path through which user content (which may
    /// contain newlines or arbitrary bytes) reaches the engine.
    #[instrument(skip(self, sql, params))]
    pub async fn query(
        &self,
        sql: &str,
        params: Vec<(&'static str, Value)>,
    ) -> Result<surrealdb::Response, StorageError> {
        let mut q = self.db.query(sql);
        for (k, v) in params {
            q = q.bind((k, v));
        }
        let fut = q;
        let response = tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| StorageError::Cancelled("storage query timed out".to_string()))??;
        Ok(response)
    }

    /// Create a record in `table`, returning the created row deserialized
    /// as `T`.
    pub async fn create<T>(&self, table: &str, data: impl Serialize) -> Result<T, StorageError>
    where
        T: serde::de::DeserializeOwned,
    {
        let created: Option<T> = self.db.create(table).content(data).await?;
        created.ok_or_else(|| StorageError::validation(format!("create on '{table}' returned no row")))
    }

    /// Update a record by id, merging `data` into the existing content.
    pub async fn update<T>(&self, id: (&str, &str), data: impl Serialize) -> Result<T, StorageError>
    where
        T: serde::de::DeserializeOwned,
    {
        let updated: Option<T> = self.db.update(id).merge(data).await?;
        updated.ok_or_else(|| StorageError::not_found("record", format!("{}:{}", id.0, id.1)))
    }

    /// Delete a record by id. Missing records are not an error (mirrors
    /// the engine's own delete semantics).
    pub async fn delete<T>(&self, id: (&str, &str)) -> Result<Option<T>, StorageError>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(self.db.delete(id).await?)
    }

    /// Flush and release. SurrealDB connections close on drop; this is a
    /// named hook so callers have an explicit lifecycle point to await, per
    /// C4's `close()` contract.
    pub async fn close(self) -> Result<(), StorageError> {
        drop(self.db);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_scheme_memory_alias() {
        assert_eq!(normalize_scheme("memory://"), "mem://");
    }

    #[test]
    fn test_normalize_scheme_passthrough() {
        assert_eq!(normalize_scheme("rocksdb:///tmp/db"), "rocksdb:///tmp/db");
        assert_eq!(normalize_scheme("ws://localhost:8000"), "ws://localhost:8000");
    }

    #[tokio::test]
    async fn test_connect_embedded_memory() {
        let cfg = ConnectConfig::default();
        let driver = StorageDriver::connect(&cfg).await.unwrap();
        driver.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_selects_scope() {
        let cfg = ConnectConfig {
            namespace: "scratch".to_string(),
            database: "scratch".to_string(),
            ..Default::default()
        };
        let driver = StorageDriver::connect(&cfg).await.unwrap();
        let mut resp = driver
            .query("RETURN 1 + 1;", vec![])
            .await
            .unwrap();
        let value: Option<i64> = resp.take(0).unwrap();
        assert_eq!(value, Some(2));
    }
}
