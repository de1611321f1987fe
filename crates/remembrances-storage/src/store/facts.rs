//! Fact CRUD: a per-user string→string association. `(user_id, key)` is
//! unique; upsert is the only write.

use serde_json::json;

use crate::error::StorageError;
use crate::types::{Fact, MatchSource, SearchHit};

use super::MemoryStore;

impl MemoryStore {
    /// Upsert a fact keyed by `(user_id, key)`.
    ///
    /// Looks up the existing record id first rather than relying on
    /// engine-version-specific `UPSERT ... WHERE` matching semantics, then
    /// issues an explicit `UPDATE`/`CREATE` — the same "update if found,
    /// else create" shape as every other upsert in this store.
    pub async fn save_fact(
        &self,
        user_id: Option<&str>,
        key: &str,
        value: &str,
    ) -> Result<Fact, StorageError> {
        let mut existing = self
            .driver
            .query(
                "SELECT VALUE id FROM facts WHERE user_id = $user_id AND key = $key LIMIT 1;",
                vec![("user_id", json!(user_id)), ("key", json!(key))],
            )
            .await?;
        let existing_id: Option<surrealdb::RecordId> = existing.take(0)?;

        let sql = if existing_id.is_some() {
            r#"
            UPDATE facts SET value = $value, updated_at = time::now()
            WHERE user_id = $user_id AND key = $key
            RETURN AFTER;
            "#
        } else {
            r#"
            CREATE facts CONTENT {
                user_id: $user_id,
                key: $key,
                value: $value,
                created_at: time::now(),
                updated_at: time::now(),
            };
            "#
        };

        let mut resp = self
            .driver
            .query(
                sql,
                vec![
                    ("user_id", json!(user_id)),
                    ("key", json!(key)),
                    ("value", json!(value)),
                ],
            )
            .await?;
        let rows: Vec<Fact> = resp.take(0)?;
        let fact = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("fact upsert returned no row"))?;

        if existing_id.is_none() {
            self.increment_stat(user_id, "key_value_count", 1).await?;
        }
        Ok(fact)
    }

    pub async fn get_fact(&self, user_id: Option<&str>, key: &str) -> Result<Option<String>, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT VALUE value FROM facts WHERE user_id = $user_id AND key = $key LIMIT 1;",
                vec![("user_id", json!(user_id)), ("key", json!(key))],
            )
            .await?;
        let values: Vec<String> = resp.take(0)?;
        Ok(values.into_iter().next())
    }

    pub async fn list_facts(&self, user_id: Option<&str>) -> Result<Vec<Fact>, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT * FROM facts WHERE user_id = $user_id ORDER BY key;",
                vec![("user_id", json!(user_id))],
            )
            .await?;
        Ok(resp.take(0)?)
    }

    /// Exact and prefix matches on `key`, plus substring matches on
    /// `value`, scoped to one `query` term (spec.md §4.7 fact branch).
    /// Exact key matches score 1.0, prefix matches 0.8, value substring
    /// matches 0.5 — distinct enough that they never tie with a genuine
    /// vector/document cosine score, only with each other.
    pub async fn search_facts(
        &self,
        query: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT *,
                    IF key = $query THEN 1.0
                    ELSE IF string::starts_with(key, $query) THEN 0.8
                    ELSE 0.5 END END AS score
                FROM facts
                WHERE ($user_id IS NONE OR user_id = $user_id)
                  AND (key = $query OR string::starts_with(key, $query) OR string::contains(value, $query))
                ORDER BY score DESC
                LIMIT $limit;
                "#,
                vec![
                    ("query", json!(query)),
                    ("user_id", json!(user_id)),
                    ("limit", json!(limit as i64)),
                ],
            )
            .await?;

        #[derive(serde::Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
            key: String,
            value: String,
            score: f32,
        }
        let rows: Vec<Row> = resp.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| SearchHit {
                id: r.id.to_string(),
                source: MatchSource::Fact,
                content: format!("{}: {}", r.key, r.value),
                score: r.score,
                metadata: json!({ "key": r.key }),
            })
            .collect())
    }

    pub async fn delete_fact(&self, user_id: Option<&str>, key: &str) -> Result<bool, StorageError> {
        let mut resp = self
            .driver
            .query(
                "DELETE facts WHERE user_id = $user_id AND key = $key RETURN BEFORE;",
                vec![("user_id", json!(user_id)), ("key", json!(key))],
            )
            .await?;
        let deleted: Vec<Fact> = resp.take(0)?;
        let did_delete = !deleted.is_empty();
        if did_delete {
            self.decrement_stat(user_id, "key_value_count", 1).await?;
        }
        Ok(did_delete)
    }
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
    async fn test_fact_round_trip() {
        let store = test_store().await;
        store
            .save_fact(Some("alice"), "timezone", "Europe/Madrid")
            .await
            .unwrap();
        let value = store.get_fact(Some("alice"), "timezone").await.unwrap();
        assert_eq!(value.as_deref(), Some("Europe/Madrid"));

        let facts = store.list_facts(Some("alice")).await.unwrap();
        assert!(facts.iter().any(|f| f.key == "timezone" && f.value == "Europe/Madrid"));
    }

    #[tokio::test]
    async fn test_fact_overwrite_on_second_save() {
        let store = test_store().await;
        store.save_fact(Some("u1"), "k", "v1").await.unwrap();
        store.save_fact(Some("u1"), "k", "v2").await.unwrap();
        let value = store.get_fact(Some("u1"), "k").await.unwrap();
        assert_eq!(value.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_multiline_fact_round_trips_byte_for_byte() {
        let store = test_store().await;
        store.save_fact(Some("u1"), "notes", "line1\nline2").await.unwrap();
        let value = store.get_fact(Some("u1"), "notes").await.unwrap();
        assert_eq!(value.as_deref(), Some("line1\nline2"));
    }

    #[tokio::test]
    async fn test_delete_fact() {
        let store = test_store().await;
        store.save_fact(Some("u1"), "k", "v").await.unwrap();
        let deleted = store.delete_fact(Some("u1"), "k").await.unwrap();
        assert!(deleted);
        assert_eq!(store.get_fact(Some("u1"), "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_search_facts_ranks_exact_over_prefix_over_substring() {
        let store = test_store().await;
        store.save_fact(Some("u1"), "timezone", "Europe/Madrid").await.unwrap();
        store.save_fact(Some("u1"), "timezone_offset", "+1").await.unwrap();
        store.save_fact(Some("u1"), "home", "lives in timezone-aware city").await.unwrap();

        let hits = store.search_facts("timezone", Some("u1"), 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].content, "timezone: Europe/Madrid");
        assert_eq!(hits[1].content, "timezone_offset: +1");
    }
}
