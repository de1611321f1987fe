//! Graph (entities + relationships): creation, name-or-id resolution, and
//! iterative BFS traversal.

use std::collections::{HashSet, VecDeque};

use serde_json::json;

use crate::error::StorageError;
use crate::types::{Entity, Relationship};

use super::MemoryStore;

/// Tables that are never relationship tables, regardless of what
/// `INFO FOR DB` reports. `create_relationship` files an edge under a table
/// named by the caller's arbitrary `relationship_type` (schema.rs only
/// seeds `wrote`/`mentioned_in`/`related_to` up front), so an untyped
/// `traverse_graph` must discover relationship tables at runtime rather
/// than assume the seeded set is exhaustive; everything `INFO FOR DB`
/// reports that isn't one of these fixed entity/fact/document/code tables
/// is treated as a relationship table.
const NON_RELATIONSHIP_TABLES: &[&str] = &[
    "facts",
    "vectors",
    "knowledge_base",
    "entities",
    "user_stats",
    "code_projects",
    "code_files",
    "code_symbols",
    "code_chunks",
    "events",
    "indexing_jobs",
    "schema_version",
];

impl MemoryStore {
    pub async fn create_entity(
        &self,
        name: &str,
        user_id: Option<&str>,
        labels: Vec<String>,
        properties: serde_json::Value,
    ) -> Result<Entity, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                CREATE entities CONTENT {
                    user_id: $user_id,
                    name: $name,
                    labels: $labels,
                    properties: $properties,
                    created_at: time::now(),
                };
                "#,
                vec![
                    ("user_id", json!(user_id)),
                    ("name", json!(name)),
                    ("labels", json!(labels)),
                    ("properties", properties),
                ],
            )
            .await?;
        let rows: Vec<Entity> = resp.take(0)?;
        let entity = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("entity create returned no row"))?;
        self.increment_stat(user_id, "entity_count", 1).await?;
        Ok(entity)
    }

    /// Resolve a raw record id (`table:local_id`) or an entity name to an
    /// [`Entity`]. Per spec.md §4.6: if input contains a colon, try as id;
    /// else query by name; else error stating both forms are accepted.
    pub async fn get_entity(&self, entity_id_or_name: &str) -> Result<Entity, StorageError> {
        if entity_id_or_name.contains(':') {
            let mut resp = self
                .driver
                .query("SELECT * FROM $id;", vec![("id", json!(entity_id_or_name))])
                .await?;
            let rows: Vec<Entity> = resp.take(0)?;
            if let Some(entity) = rows.into_iter().next() {
                return Ok(entity);
            }
        }

        let mut resp = self
            .driver
            .query(
                "SELECT * FROM entities WHERE name = $name LIMIT 1;",
                vec![("name", json!(entity_id_or_name))],
            )
            .await?;
        let rows: Vec<Entity> = resp.take(0)?;
        rows.into_iter().next().ok_or_else(|| {
            StorageError::validation(format!(
                "'{entity_id_or_name}' did not resolve as a record id or an entity name \
                 (both forms are accepted)"
            ))
        })
    }

    /// Create a directed relationship, filed in a table named by
    /// `relationship_type`. Both endpoints may be record ids or entity
    /// names; both must resolve to existing entities.
    pub async fn create_relationship(
        &self,
        from_entity: &str,
        to_entity: &str,
        relationship_type: &str,
        user_id: Option<&str>,
        properties: serde_json::Value,
    ) -> Result<Relationship, StorageError> {
        let from = self.get_entity(from_entity).await?;
        let to = self.get_entity(to_entity).await?;
        validate_table_name(relationship_type)?;

        let sql = format!(
            r#"
            DEFINE TABLE IF NOT EXISTS {relationship_type} SCHEMALESS PERMISSIONS FULL;
            DEFINE FIELD IF NOT EXISTS properties ON {relationship_type} FLEXIBLE TYPE object DEFAULT {{}} PERMISSIONS FULL;
            DEFINE FIELD IF NOT EXISTS user_id ON {relationship_type} TYPE option<string> PERMISSIONS FULL;
            RELATE $from->{relationship_type}->$to CONTENT {{
                user_id: $user_id,
                properties: $properties,
                created_at: time::now(),
            }};
            "#
        );

        let mut resp = self
            .driver
            .query(
                &sql,
                vec![
                    ("from", json!(from.id)),
                    ("to", json!(to.id)),
                    ("user_id", json!(user_id)),
                    ("properties", properties),
                ],
            )
            .await?;
        let rows: Vec<Relationship> = resp.take(3)?;
        let rel = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("relationship create returned no row"))?;
        self.increment_stat(user_id, "relationship_count", 1).await?;
        Ok(rel)
    }

    /// Enumerate every relationship table currently defined on the
    /// database by asking the engine directly, rather than trusting a
    /// fixed list, since `create_relationship` defines new tables on
    /// demand for arbitrary caller-supplied types.
    pub(crate) async fn list_relationship_tables(&self) -> Result<Vec<String>, StorageError> {
        let mut resp = self.driver.query("INFO FOR DB;", vec![]).await?;
        let info: Option<serde_json::Value> = resp.take(0)?;
        let tables = info
            .as_ref()
            .and_then(|v| v.get("tables"))
            .and_then(|v| v.as_object())
            .map(|obj| obj.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(tables
            .into_iter()
            .filter(|t| !NON_RELATIONSHIP_TABLES.contains(&t.as_str()))
            .collect())
    }

    /// Iterative, cycle-safe BFS from `start_entity`, optionally filtered
    /// by `relationship_type`, to `depth` hops. Deterministic order by
    /// edge insertion time (the store orders each hop's edge query by
    /// `created_at`).
    pub async fn traverse_graph(
        &self,
        start_entity: &str,
        relationship_type: Option<&str>,
        depth: u32,
    ) -> Result<(Vec<Entity>, Vec<Relationship>), StorageError> {
        let start = self.get_entity(start_entity).await?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.id.clone());
        let mut frontier = VecDeque::new();
        frontier.push_back((start.id.clone(), 0u32));

        let mut nodes = vec![start.clone()];
        let mut edges = Vec::new();

        let tables: Vec<String> = match relationship_type {
            Some(t) => vec![t.to_string()],
            None => self.list_relationship_tables().await?,
        };

        while let Some((current_id, current_depth)) = frontier.pop_front() {
            if current_depth >= depth {
                continue;
            }
            for table in &tables {
                if validate_table_name(table).is_err() {
                    continue;
                }
                let sql = format!(
                    "SELECT * FROM {table} WHERE in = $id ORDER BY created_at ASC;"
                );
                let mut resp = match self
                    .driver
                    .query(&sql, vec![("id", json!(current_id))])
                    .await
                {
                    Ok(r) => r,
                    Err(_) => continue, // table doesn't exist yet: no edges of this type
                };
                let rows: Vec<Relationship> = resp.take(0).unwrap_or_default();
                for rel in rows {
                    edges.push(rel.clone());
                    if visited.insert(rel.to.clone()) {
                        let node = self.get_entity(&rel.to).await?;
                        nodes.push(node);
                        frontier.push_back((rel.to.clone(), current_depth + 1));
                    }
                }
            }
        }

        Ok((nodes, edges))
    }
}

/// Relationship-type table names come from caller input (spec.md's
/// `relationship_type` parameter); guard against SurrealQL injection via
/// the table-name position, which cannot be parameter-bound.
pub(crate) fn validate_table_name(name: &str) -> Result<(), StorageError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().next().is_some_and(|c| !c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(StorageError::validation(format!(
            "'{name}' is not a valid relationship_type (expected identifier: letters, digits, underscore)"
        )))
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
    async fn test_create_entity_and_relationship_traversal() {
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

        let (nodes, _edges) = store
            .traverse_graph("Alice", Some("works_at"), 1)
            .await
            .unwrap();
        assert!(nodes.iter().any(|n| n.name == "Acme"));
    }

    #[tokio::test]
    async fn test_untyped_traversal_discovers_custom_relationship_table() {
        // spec.md §4.6: "matching edges" for an untyped traversal must
        // include tables created on the fly by create_relationship, not
        // just the three tables the schema manager seeds up front.
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

        let (nodes, _edges) = store.traverse_graph("Alice", None, 1).await.unwrap();
        assert!(nodes.iter().any(|n| n.name == "Acme"));
    }

    #[tokio::test]
    async fn test_two_cycle_traversal_terminates() {
        let store = test_store().await;
        store.create_entity("A", None, vec![], serde_json::json!({})).await.unwrap();
        store.create_entity("B", None, vec![], serde_json::json!({})).await.unwrap();
        store.create_relationship("A", "B", "related_to", None, serde_json::json!({})).await.unwrap();
        store.create_relationship("B", "A", "related_to", None, serde_json::json!({})).await.unwrap();

        let (nodes, _edges) = store
            .traverse_graph("A", Some("related_to"), 3)
            .await
            .unwrap();
        // A 2-cycle visited once each, not infinitely.
        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_get_entity_rejects_unresolved_input() {
        let store = test_store().await;
        let err = store.get_entity("nonexistent").await.unwrap_err();
        assert!(err.to_string().contains("both forms are accepted"));
    }
}
