//! Knowledge-base document chunks. A document's chunk set is replaced
//! atomically on re-save: delete every chunk sharing `file_path`, then
//! insert the new set, keyed by `file_path` (spec.md §4.5/§4.9).

use serde_json::json;

use crate::error::StorageError;
use crate::types::{DocumentChunk, MatchSource, SearchHit};

use super::{now_rfc3339, MemoryStore};

impl MemoryStore {
    /// Replace all chunks for `file_path` with `chunks`, each paired with
    /// its embedding. `chunks[i].0` is content, `.1` is the embedding.
    pub async fn save_document(
        &self,
        user_id: Option<&str>,
        file_path: &str,
        chunks: Vec<(String, Vec<f32>)>,
        metadata: serde_json::Value,
    ) -> Result<Vec<DocumentChunk>, StorageError> {
        let metadata = with_last_modified(metadata);
        let previous_count = self.count_document_chunks(file_path).await?;

        self.driver
            .query(
                "DELETE knowledge_base WHERE file_path = $file_path;",
                vec![("file_path", json!(file_path))],
            )
            .await?;

        let chunk_count = chunks.len();
        let mut saved = Vec::with_capacity(chunk_count);
        for (chunk_index, (content, embedding)) in chunks.into_iter().enumerate() {
            let mut resp = self
                .driver
                .query(
                    r#"
                    CREATE knowledge_base CONTENT {
                        user_id: $user_id,
                        file_path: $file_path,
                        source_file: $file_path,
                        chunk_index: $chunk_index,
                        chunk_count: $chunk_count,
                        content: $content,
                        embedding: $embedding,
                        metadata: $metadata,
                        created_at: time::now(),
                        updated_at: time::now(),
                    };
                    "#,
                    vec![
                        ("user_id", json!(user_id)),
                        ("file_path", json!(file_path)),
                        ("chunk_index", json!(chunk_index)),
                        ("chunk_count", json!(chunk_count)),
                        ("content", json!(content)),
                        ("embedding", json!(embedding)),
                        ("metadata", metadata.clone()),
                    ],
                )
                .await?;
            let rows: Vec<DocumentChunk> = resp.take(0)?;
            saved.push(
                rows.into_iter()
                    .next()
                    .ok_or_else(|| StorageError::validation("document chunk create returned no row"))?,
            );
        }

        if previous_count == 0 && !saved.is_empty() {
            self.increment_stat(user_id, "document_count", 1).await?;
        } else if previous_count > 0 && saved.is_empty() {
            self.decrement_stat(user_id, "document_count", 1).await?;
        }

        Ok(saved)
    }

    /// The first chunk of the `limit` most recently touched documents, for
    /// `last_to_remember`'s "most recent documents" half (spec.md §6).
    pub async fn recent_documents(&self, limit: usize) -> Result<Vec<DocumentChunk>, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT * FROM knowledge_base
                WHERE chunk_index = 0
                ORDER BY updated_at DESC
                LIMIT $limit;
                "#,
                vec![("limit", json!(limit as i64))],
            )
            .await?;
        Ok(resp.take(0)?)
    }

    pub async fn get_document(&self, file_path: &str) -> Result<Vec<DocumentChunk>, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT * FROM knowledge_base WHERE file_path = $file_path ORDER BY chunk_index ASC;",
                vec![("file_path", json!(file_path))],
            )
            .await?;
        Ok(resp.take(0)?)
    }

    pub async fn search_documents(
        &self,
        query_embedding: &[f32],
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT *, vector::similarity::cosine(embedding, $q) AS score
                FROM knowledge_base
                WHERE embedding <|$limit|> $q
                  AND ($user_id IS NONE OR user_id = $user_id)
                ORDER BY score DESC
                LIMIT $limit;
                "#,
                vec![
                    ("q", json!(query_embedding)),
                    ("user_id", json!(user_id)),
                    ("limit", json!(limit as i64)),
                ],
            )
            .await?;

        #[derive(serde::Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
            content: String,
            score: f32,
            #[serde(default)]
            metadata: serde_json::Value,
        }
        let rows: Vec<Row> = resp.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| SearchHit {
                id: r.id.to_string(),
                source: MatchSource::Document,
                content: r.content,
                score: r.score,
                metadata: r.metadata,
            })
            .collect())
    }

    pub async fn delete_document(&self, user_id: Option<&str>, file_path: &str) -> Result<bool, StorageError> {
        let previous_count = self.count_document_chunks(file_path).await?;
        self.driver
            .query(
                "DELETE knowledge_base WHERE file_path = $file_path;",
                vec![("file_path", json!(file_path))],
            )
            .await?;
        if previous_count > 0 {
            self.decrement_stat(user_id, "document_count", 1).await?;
        }
        Ok(previous_count > 0)
    }

    async fn count_document_chunks(&self, file_path: &str) -> Result<usize, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT VALUE id FROM knowledge_base WHERE file_path = $file_path;",
                vec![("file_path", json!(file_path))],
            )
            .await?;
        let ids: Vec<surrealdb::RecordId> = resp.take(0)?;
        Ok(ids.len())
    }
}

/// Ensure `metadata.last_modified` is set (spec.md §3 "metadata.last_modified
/// is set on every save"). Callers that track a real filesystem mtime (the
/// KB watcher) pass it in already and it is left untouched; callers with no
/// mtime of their own (`kb_add_document`) get the save time instead.
fn with_last_modified(metadata: serde_json::Value) -> serde_json::Value {
    let mut metadata = match metadata {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            if !other.is_null() {
                map.insert("value".to_string(), other);
            }
            map
        }
    };
    metadata
        .entry("last_modified")
        .or_insert_with(|| json!(now_rfc3339()));
    serde_json::Value::Object(metadata)
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

    fn unit_embedding(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_resave_replaces_previous_chunk_set() {
        let store = test_store().await;
        store
            .save_document(
                None,
                "docs/guide.md",
                vec![("first version".to_string(), unit_embedding(4, 0))],
                serde_json::json!({}),
            )
            .await
            .unwrap();
        store
            .save_document(
                None,
                "docs/guide.md",
                vec![
                    ("second version part 1".to_string(), unit_embedding(4, 1)),
                    ("second version part 2".to_string(), unit_embedding(4, 2)),
                ],
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let chunks = store.get_document("docs/guide.md").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
    }

    #[tokio::test]
    async fn test_delete_document_removes_all_chunks() {
        let store = test_store().await;
        store
            .save_document(
                None,
                "docs/a.md",
                vec![("hello".to_string(), unit_embedding(4, 0))],
                serde_json::json!({}),
            )
            .await
            .unwrap();
        let deleted = store.delete_document(None, "docs/a.md").await.unwrap();
        assert!(deleted);
        assert!(store.get_document("docs/a.md").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_document_fills_in_last_modified_when_absent() {
        let store = test_store().await;
        store
            .save_document(
                None,
                "docs/a.md",
                vec![("hello".to_string(), unit_embedding(4, 0))],
                serde_json::json!({ "source": "t" }),
            )
            .await
            .unwrap();

        let chunks = store.get_document("docs/a.md").await.unwrap();
        assert_eq!(chunks[0].metadata["source"], "t");
        assert!(chunks[0].metadata["last_modified"].is_string());
    }

    #[tokio::test]
    async fn test_save_document_preserves_caller_supplied_last_modified() {
        let store = test_store().await;
        store
            .save_document(
                None,
                "docs/a.md",
                vec![("hello".to_string(), unit_embedding(4, 0))],
                serde_json::json!({ "last_modified": "2020-01-01T00:00:00+00:00" }),
            )
            .await
            .unwrap();

        let chunks = store.get_document("docs/a.md").await.unwrap();
        assert_eq!(chunks[0].metadata["last_modified"], "2020-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_nested_metadata_round_trips_under_value_equality() {
        let store = test_store().await;
        let metadata = serde_json::json!({
            "source": "t",
            "nested": { "l1": "v1", "l2": { "deep": "v2" } },
            "array": ["a", "b"],
        });
        store
            .save_document(
                None,
                "README.md",
                vec![("hello".to_string(), unit_embedding(4, 0))],
                metadata.clone(),
            )
            .await
            .unwrap();

        let chunks = store.get_document("README.md").await.unwrap();
        assert_eq!(chunks[0].metadata["source"], metadata["source"]);
        assert_eq!(chunks[0].metadata["nested"], metadata["nested"]);
        assert_eq!(chunks[0].metadata["array"], metadata["array"]);
        assert!(chunks[0].metadata["last_modified"].is_string());
    }

    #[tokio::test]
    async fn test_recent_documents_returns_first_chunk_only() {
        let store = test_store().await;
        store
            .save_document(
                None,
                "docs/a.md",
                vec![
                    ("a part 1".to_string(), unit_embedding(4, 0)),
                    ("a part 2".to_string(), unit_embedding(4, 1)),
                ],
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let recent = store.recent_documents(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].chunk_index, 0);
    }
}
