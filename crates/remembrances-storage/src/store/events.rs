//! Append-only event log: no uniqueness constraint, recency-ordered reads.

use serde_json::json;

use crate::error::StorageError;
use crate::types::Event;

use super::MemoryStore;

impl MemoryStore {
    pub async fn record_event(
        &self,
        user_id: Option<&str>,
        source: &str,
        event_type: &str,
        content: &str,
        embedding: Vec<f32>,
        metadata: serde_json::Value,
    ) -> Result<Event, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                CREATE events CONTENT {
                    user_id: $user_id,
                    source: $source,
                    event_type: $event_type,
                    content: $content,
                    embedding: $embedding,
                    metadata: $metadata,
                    timestamp: time::now(),
                };
                "#,
                vec![
                    ("user_id", json!(user_id)),
                    ("source", json!(source)),
                    ("event_type", json!(event_type)),
                    ("content", json!(content)),
                    ("embedding", json!(embedding)),
                    ("metadata", metadata),
                ],
            )
            .await?;
        let rows: Vec<Event> = resp.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("event create returned no row"))
    }

    /// Most recent `limit` events, newest first, optionally filtered by
    /// `event_type`.
    pub async fn list_recent_events(
        &self,
        user_id: Option<&str>,
        event_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Event>, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT * FROM events
                WHERE ($user_id IS NONE OR user_id = $user_id)
                  AND ($event_type IS NONE OR event_type = $event_type)
                ORDER BY timestamp DESC
                LIMIT $limit;
                "#,
                vec![
                    ("user_id", json!(user_id)),
                    ("event_type", json!(event_type)),
                    ("limit", json!(limit as i64)),
                ],
            )
            .await?;
        Ok(resp.take(0)?)
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
    async fn test_record_and_list_recent_events() {
        let store = test_store().await;
        store
            .record_event(Some("u1"), "cli", "login", "user logged in", vec![], serde_json::json!({}))
            .await
            .unwrap();
        store
            .record_event(Some("u1"), "cli", "logout", "user logged out", vec![], serde_json::json!({}))
            .await
            .unwrap();

        let events = store.list_recent_events(Some("u1"), None, 10).await.unwrap();
        assert_eq!(events.len(), 2);

        let logins = store
            .list_recent_events(Some("u1"), Some("login"), 10)
            .await
            .unwrap();
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].event_type, "login");
    }
}
