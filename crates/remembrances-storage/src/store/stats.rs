//! User stats maintenance: every create/delete path of a counted entity
//! performs an atomic update on the user's stats row — initializing it on
//! first increment, clamping to ≥0 on decrement.

use serde::Deserialize;
use serde_json::json;

use crate::error::StorageError;
use crate::types::UserStats;

use super::graph::validate_table_name;
use super::MemoryStore;

/// Fields counted in `user_stats`, matching spec.md §3's "User stats"
/// entity.
pub const COUNTED_FIELDS: &[&str] = &[
    "key_value_count",
    "vector_count",
    "entity_count",
    "relationship_count",
    "document_count",
];

impl MemoryStore {
    /// Increment a counter on the per-user stats row, or the `_global`
    /// row when `user_id` is `None` (writes made without a user scope).
    /// Initializes the row on first write. This maintained row is used
    /// as-is for per-user reads; the cross-user global view in
    /// `get_stats(None)` does not read it (see that method).
    pub async fn increment_stat(
        &self,
        user_id: Option<&str>,
        field: &str,
        by: i64,
    ) -> Result<(), StorageError> {
        self.bump_stat(user_id, field, by).await
    }

    /// Decrement a counter, clamped so it never goes below zero.
    pub async fn decrement_stat(
        &self,
        user_id: Option<&str>,
        field: &str,
        by: i64,
    ) -> Result<(), StorageError> {
        self.bump_stat(user_id, field, -by).await
    }

    async fn bump_stat(&self, user_id: Option<&str>, field: &str, delta: i64) -> Result<(), StorageError> {
        debug_assert!(
            COUNTED_FIELDS.contains(&field),
            "unknown user_stats field '{field}'"
        );
        let scope = user_id.unwrap_or("_global");
        let sql = format!(
            r#"
            UPDATE user_stats SET
                {field} = math::max([0, (user_stats.{field} ?? 0) + $delta]),
                updated_at = time::now()
            WHERE user_id = $user_id;
            "#
        );
        let mut resp = self
            .driver
            .query(&sql, vec![("user_id", json!(scope)), ("delta", json!(delta))])
            .await?;
        let rows: Vec<serde_json::Value> = resp.take(0)?;
        if rows.is_empty() {
            // No row yet for this scope: create it with the delta clamped
            // at zero as the initial value.
            let initial = delta.max(0);
            self.driver
                .query(
                    &format!(
                        "CREATE user_stats CONTENT {{ user_id: $user_id, {field}: $initial, created_at: time::now(), updated_at: time::now() }};"
                    ),
                    vec![("user_id", json!(scope)), ("initial", json!(initial))],
                )
                .await?;
        }
        Ok(())
    }

    /// Fetch the stats row for `user_id`, or the cross-user global view
    /// when `None`.
    ///
    /// The per-user row is the maintained `user_stats` counter, updated
    /// incrementally by `increment_stat`/`decrement_stat` on every write.
    /// The global view cannot reuse that mechanism: a maintained `_global`
    /// counter only advances on writes made with `user_id: None`, so it
    /// would never reflect alice's or bob's per-user vectors. Per spec.md
    /// §4.6 ("Global counts are computed separately by aggregating across
    /// the relevant tables"), the global view instead runs a `count()`
    /// aggregate directly against facts/vectors/entities/relationship
    /// tables/knowledge_base.
    pub async fn get_stats(&self, user_id: Option<&str>) -> Result<UserStats, StorageError> {
        match user_id {
            Some(scope) => {
                let mut resp = self
                    .driver
                    .query(
                        "SELECT * FROM user_stats WHERE user_id = $user_id LIMIT 1;",
                        vec![("user_id", json!(scope))],
                    )
                    .await?;
                let rows: Vec<UserStats> = resp.take(0)?;
                Ok(rows.into_iter().next().unwrap_or(UserStats {
                    user_id: scope.to_string(),
                    ..Default::default()
                }))
            }
            None => self.aggregate_global_stats().await,
        }
    }

    /// Count rows across every relevant table rather than trust a
    /// maintained counter, so the global view stays correct regardless of
    /// which user_id scope wrote each record.
    async fn aggregate_global_stats(&self) -> Result<UserStats, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT count() FROM facts GROUP ALL;
                SELECT count() FROM vectors GROUP ALL;
                SELECT count() FROM entities GROUP ALL;
                SELECT count() FROM knowledge_base GROUP ALL;
                "#,
                vec![],
            )
            .await?;
        let key_value_count = take_count(&mut resp, 0)?;
        let vector_count = take_count(&mut resp, 1)?;
        let entity_count = take_count(&mut resp, 2)?;
        let document_count = take_count(&mut resp, 3)?;
        let relationship_count = self.count_all_relationships().await?;

        Ok(UserStats {
            user_id: "_global".to_string(),
            key_value_count,
            vector_count,
            entity_count,
            relationship_count,
            document_count,
            total_size_bytes: 0,
            created_at: None,
            updated_at: None,
        })
    }

    /// Sum `count()` across every relationship table discovered at
    /// runtime (see `graph::list_relationship_tables`), since relationship
    /// edges are spread across one table per `relationship_type` rather
    /// than a single table this query could group over directly.
    async fn count_all_relationships(&self) -> Result<i64, StorageError> {
        let tables = self.list_relationship_tables().await?;
        let mut total = 0i64;
        for table in &tables {
            if validate_table_name(table).is_err() {
                continue;
            }
            let sql = format!("SELECT count() FROM {table} GROUP ALL;");
            let mut resp = self.driver.query(&sql, vec![]).await?;
            total += take_count(&mut resp, 0)?;
        }
        Ok(total)
    }
}

#[derive(Deserialize)]
struct CountRow {
    count: i64,
}

fn take_count(resp: &mut surrealdb::Response, index: usize) -> Result<i64, StorageError> {
    let rows: Vec<CountRow> = resp.take(index)?;
    Ok(rows.into_iter().next().map(|r| r.count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use crate::driver::{ConnectConfig, StorageDriver};
    use crate::schema::SchemaManager;
    use crate::store::MemoryStore;

    async fn test_store() -> MemoryStore {
        let driver = StorageDriver::connect(&ConnectConfig::default()).await.unwrap();
        SchemaManager::migrate(&driver).await.unwrap();
        MemoryStore::new(driver)
    }

    #[tokio::test]
    async fn test_increment_initializes_row() {
        let store = test_store().await;
        store.increment_stat(Some("alice"), "vector_count", 3).await.unwrap();
        let stats = store.get_stats(Some("alice")).await.unwrap();
        assert_eq!(stats.vector_count, 3);
    }

    #[tokio::test]
    async fn test_decrement_clamps_at_zero() {
        let store = test_store().await;
        store.increment_stat(Some("alice"), "vector_count", 1).await.unwrap();
        store.decrement_stat(Some("alice"), "vector_count", 5).await.unwrap();
        let stats = store.get_stats(Some("alice")).await.unwrap();
        assert_eq!(stats.vector_count, 0);
    }

    #[tokio::test]
    async fn test_global_stats_aggregate_across_users() {
        // spec.md §4.6: global counts are a cross-user aggregate, not the
        // `_global`-scoped counter row (which only advances on writes made
        // with user_id: None).
        let store = test_store().await;
        for _ in 0..5 {
            store
                .add_vector(Some("alice"), "alice memory", vec![0.0f32; 4], serde_json::json!({}))
                .await
                .unwrap();
        }
        for _ in 0..3 {
            store
                .add_vector(Some("bob"), "bob memory", vec![0.0f32; 4], serde_json::json!({}))
                .await
                .unwrap();
        }

        let global = store.get_stats(None).await.unwrap();
        assert_eq!(global.vector_count, 8);

        // Per-user scoped counters are unaffected and stay independent.
        let alice = store.get_stats(Some("alice")).await.unwrap();
        assert_eq!(alice.vector_count, 5);
    }

    #[tokio::test]
    async fn test_global_stats_include_relationships_in_custom_tables() {
        let store = test_store().await;
        store
            .create_entity("Alice", None, vec![], serde_json::json!({}))
            .await
            .unwrap();
        store
            .create_entity("Acme", None, vec![], serde_json::json!({}))
            .await
            .unwrap();
        store
            .create_relationship("Alice", "Acme", "works_at", None, serde_json::json!({}))
            .await
            .unwrap();

        let global = store.get_stats(None).await.unwrap();
        assert_eq!(global.entity_count, 2);
        assert_eq!(global.relationship_count, 1);
    }
}
