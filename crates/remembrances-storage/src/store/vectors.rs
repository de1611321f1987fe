//! Vector memory CRUD + cosine similarity search.

use serde_json::json;

use crate::error::StorageError;
use crate::types::{MatchSource, MemoryVector, SearchHit};

use super::MemoryStore;

impl MemoryStore {
    pub async fn add_vector(
        &self,
        user_id: Option<&str>,
        content: &str,
        embedding: Vec<f32>,
        metadata: serde_json::Value,
    ) -> Result<MemoryVector, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                CREATE vectors CONTENT {
                    user_id: $user_id,
                    content: $content,
                    embedding: $embedding,
                    metadata: $metadata,
                    created_at: time::now(),
                    updated_at: time::now(),
                };
                "#,
                vec![
                    ("user_id", json!(user_id)),
                    ("content", json!(content)),
                    ("embedding", json!(embedding)),
                    ("metadata", metadata),
                ],
            )
            .await?;
        let rows: Vec<MemoryVector> = resp.take(0)?;
        let vector = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("vector create returned no row"))?;
        self.increment_stat(user_id, "vector_count", 1).await?;
        Ok(vector)
    }

    /// Given `query_embedding` and `limit`, return the closest vectors by
    /// cosine similarity. Conceptual form per spec.md §4.6:
    /// `SELECT * FROM vectors WHERE embedding <|limit|> $q ORDER BY
    /// vector::similarity::cosine(embedding, $q) DESC LIMIT $limit`.
    pub async fn search_vectors(
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
                FROM vectors
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
                source: MatchSource::Vector,
                content: r.content,
                score: r.score,
                metadata: r.metadata,
            })
            .collect())
    }

    pub async fn update_vector(
        &self,
        id: &str,
        content: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<MemoryVector, StorageError> {
        // Only set fields the caller actually supplied; a bare content
        // merge with an explicit `null` would otherwise clear the field.
        // `time::now()` is the engine's native clock, never a client-side
        // timestamp marshalled in (spec.md §9 "Newlines in content" note).
        let mut clauses = vec!["updated_at = time::now()".to_string()];
        if content.is_some() {
            clauses.push("content = $content".to_string());
        }
        if metadata.is_some() {
            clauses.push("metadata = $metadata".to_string());
        }
        let sql = format!("UPDATE $id SET {} RETURN AFTER;", clauses.join(", "));

        let mut resp = self
            .driver
            .query(
                &sql,
                vec![
                    ("id", json!(id)),
                    ("content", json!(content)),
                    ("metadata", json!(metadata)),
                ],
            )
            .await?;
        let rows: Vec<MemoryVector> = resp.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("vector", id))
    }

    pub async fn delete_vector(&self, id: &str) -> Result<bool, StorageError> {
        let (table, local) = split_record_id(id)?;
        let user_id = {
            let mut resp = self
                .driver
                .query(
                    "SELECT VALUE user_id FROM ONLY $id;",
                    vec![("id", json!(id))],
                )
                .await?;
            resp.take::<Option<Option<String>>>(0)?.flatten()
        };
        let deleted: Option<MemoryVector> = self.driver.delete((table.as_str(), local.as_str())).await?;
        if deleted.is_some() {
            self.decrement_stat(user_id.as_deref(), "vector_count", 1).await?;
        }
        Ok(deleted.is_some())
    }
}

fn split_record_id(id: &str) -> Result<(String, String), StorageError> {
    id.split_once(':')
        .map(|(t, l)| (t.to_string(), l.to_string()))
        .ok_or_else(|| StorageError::validation(format!("'{id}' is not a valid record id (expected table:local_id)")))
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
    async fn test_add_and_search_vectors_ranks_exact_match_first() {
        let store = test_store().await;
        store
            .add_vector(None, "Authenticate handles JWT tokens", unit_embedding(8, 0), serde_json::json!({}))
            .await
            .unwrap();
        store
            .add_vector(None, "unrelated content", unit_embedding(8, 4), serde_json::json!({}))
            .await
            .unwrap();

        let hits = store
            .search_vectors(&unit_embedding(8, 0), None, 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Authenticate handles JWT tokens");
    }
}
