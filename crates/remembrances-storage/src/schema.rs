//! Schema Manager (C5): ordered, idempotent migrations guarded by a
//! persisted version counter.
//!
//! Each migration is one `DEFINE ...` statement batch. Every `DEFINE`
//! carries `IF NOT EXISTS` so re-running a migration against an
//! already-migrated database is a no-op at the statement level; as a
//! second line of defense, an "already exists" error surfaced by the
//! engine anyway (e.g. on engines/versions that don't honor the clause for
//! a particular element) is still caught and treated as success, per
//! spec.md §4.5.

use tracing::{debug, info};

use crate::driver::StorageDriver;
use crate::error::StorageError;

/// Target schema version this build expects. Bumping this adds an entry to
/// `MIGRATIONS` and nothing else; `migrate` walks forward from whatever
/// `schema_version` currently holds.
pub const TARGET_VERSION: u32 = 9;

const DIM: u32 = 768;

fn migrations() -> Vec<&'static str> {
    vec![
        // 1. Baseline tables: facts, vectors, knowledge_base, entities, and
        //    three initial relationship tables; MTREE vector index on
        //    vectors.embedding and knowledge_base.embedding.
        r#"
        DEFINE TABLE IF NOT EXISTS facts SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS key ON facts TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS value ON facts TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS created_at ON facts TYPE datetime DEFAULT time::now() PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS updated_at ON facts TYPE datetime DEFAULT time::now() PERMISSIONS FULL;

        DEFINE TABLE IF NOT EXISTS vectors SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS content ON vectors TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS embedding ON vectors TYPE array<float> PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_vectors_embedding ON vectors FIELDS embedding MTREE DIMENSION $dim DIST COSINE;

        DEFINE TABLE IF NOT EXISTS knowledge_base SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS content ON knowledge_base TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS embedding ON knowledge_base TYPE array<float> PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_kb_embedding ON knowledge_base FIELDS embedding MTREE DIMENSION $dim DIST COSINE;

        DEFINE TABLE IF NOT EXISTS entities SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS name ON entities TYPE string PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_entities_name ON entities FIELDS name;

        DEFINE TABLE IF NOT EXISTS wrote SCHEMALESS PERMISSIONS FULL;
        DEFINE TABLE IF NOT EXISTS mentioned_in SCHEMALESS PERMISSIONS FULL;
        DEFINE TABLE IF NOT EXISTS related_to SCHEMALESS PERMISSIONS FULL;
        "#,
        // 2. user_stats table with per-user counters and unique index.
        r#"
        DEFINE TABLE IF NOT EXISTS user_stats SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS user_id ON user_stats TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS key_value_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS vector_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS entity_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS relationship_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS document_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS total_size_bytes ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_user_stats_user_id ON user_stats FIELDS user_id UNIQUE;
        "#,
        // 3. Type corrections: counters drop the VALUE constraint so
        //    clamping on decrement (handled in the store layer) is legal.
        r#"
        DEFINE FIELD IF NOT EXISTS key_value_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS vector_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS entity_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS relationship_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS document_count ON user_stats TYPE int DEFAULT 0 PERMISSIONS FULL;
        "#,
        // 4. Introduce optional user_id on tables that lacked it.
        r#"
        DEFINE FIELD IF NOT EXISTS user_id ON facts TYPE option<string> PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS user_id ON vectors TYPE option<string> PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS user_id ON knowledge_base TYPE option<string> PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS user_id ON entities TYPE option<string> PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS user_id ON wrote TYPE option<string> PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS user_id ON mentioned_in TYPE option<string> PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS user_id ON related_to TYPE option<string> PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_facts_user_key ON facts FIELDS user_id, key UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_entities_user_name ON entities FIELDS user_id, name UNIQUE;
        "#,
        // 5. Make every metadata/properties field flexible. Before this
        //    migration, nested object fields under a strict `object` type
        //    were silently dropped — this is the bug being fixed.
        r#"
        DEFINE FIELD IF NOT EXISTS metadata ON vectors FLEXIBLE TYPE object DEFAULT {} PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS metadata ON knowledge_base FLEXIBLE TYPE object DEFAULT {} PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS properties ON entities FLEXIBLE TYPE object DEFAULT {} PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS properties ON wrote FLEXIBLE TYPE object DEFAULT {} PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS properties ON mentioned_in FLEXIBLE TYPE object DEFAULT {} PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS properties ON related_to FLEXIBLE TYPE object DEFAULT {} PERMISSIONS FULL;
        "#,
        // 6. Code indexing: projects, files, symbols tables with MTREE on
        //    code_symbols.embedding, unique indexes.
        r#"
        DEFINE TABLE IF NOT EXISTS code_projects SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS project_id ON code_projects TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS settings ON code_projects FLEXIBLE TYPE object DEFAULT {} PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_code_projects_id ON code_projects FIELDS project_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS code_files SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS project_id ON code_files TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS path ON code_files TYPE string PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_code_files_project_path ON code_files FIELDS project_id, path UNIQUE;

        DEFINE TABLE IF NOT EXISTS code_symbols SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS project_id ON code_symbols TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS file_path ON code_symbols TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS name_path ON code_symbols TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS embedding ON code_symbols TYPE option<array<float>> PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_code_symbols_path ON code_symbols FIELDS project_id, file_path, name_path UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_code_symbols_embedding ON code_symbols FIELDS embedding MTREE DIMENSION $dim DIST COSINE;
        "#,
        // 7. Code chunks table with MTREE on code_chunks.embedding; add
        //    full-text search indexes on symbol name and content.
        r#"
        DEFINE TABLE IF NOT EXISTS code_chunks SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS symbol_id ON code_chunks TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS project_id ON code_chunks TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS embedding ON code_chunks TYPE option<array<float>> PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_code_chunks_embedding ON code_chunks FIELDS embedding MTREE DIMENSION $dim DIST COSINE;

        DEFINE ANALYZER IF NOT EXISTS code_analyzer TOKENIZERS BLANK,CLASS FILTERS LOWERCASE,SNOWBALL(ENGLISH);
        DEFINE INDEX IF NOT EXISTS idx_code_symbols_name_search ON code_symbols FIELDS name SEARCH ANALYZER code_analyzer BM25;
        DEFINE INDEX IF NOT EXISTS idx_code_symbols_content_search ON code_symbols FIELDS source_code SEARCH ANALYZER code_analyzer BM25;
        "#,
        // 8. Events table with vector and full-text indexes.
        r#"
        DEFINE TABLE IF NOT EXISTS events SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS content ON events TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS embedding ON events TYPE option<array<float>> PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS timestamp ON events TYPE datetime DEFAULT time::now() PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_events_embedding ON events FIELDS embedding MTREE DIMENSION $dim DIST COSINE;
        DEFINE INDEX IF NOT EXISTS idx_events_content_search ON events FIELDS content SEARCH ANALYZER code_analyzer BM25;
        "#,
        // 9. Indexing jobs: one row per run, with project_id carrying the
        //    single-owner constraint (a project may have at most one
        //    non-terminal job at a time, enforced by the store layer).
        r#"
        DEFINE TABLE IF NOT EXISTS indexing_jobs SCHEMALESS PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS project_id ON indexing_jobs TYPE string PERMISSIONS FULL;
        DEFINE FIELD IF NOT EXISTS status ON indexing_jobs TYPE string PERMISSIONS FULL;
        DEFINE INDEX IF NOT EXISTS idx_indexing_jobs_project ON indexing_jobs FIELDS project_id;
        "#,
    ]
}

/// Applies the migration chain to a connected [`StorageDriver`].
pub struct SchemaManager;

impl SchemaManager {
    /// Bring the store to [`TARGET_VERSION`].
    ///
    /// On connect: ensure a `schema_version` record exists (create with
    /// version 0). Read `current`; while `current < target`, apply
    /// migration `current+1` then set `current = current+1`.
    pub async fn migrate(driver: &StorageDriver) -> Result<u32, StorageError> {
        Self::ensure_version_row(driver).await?;
        let mut current = Self::read_version(driver).await?;
        let all = migrations();

        while current < TARGET_VERSION {
            let next = current + 1;
            let sql = all[(next - 1) as usize];
            debug!(version = next, "applying schema migration");

            match driver
                .query(sql, vec![("dim", serde_json::json!(DIM))])
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_already_exists() => {
                    debug!(version = next, "migration already applied, continuing");
                }
                Err(e) => return Err(StorageError::schema(next, e.to_string())),
            }

            Self::set_version(driver, next).await?;
            current = next;
            info!(version = current, "schema migration applied");
        }

        Ok(current)
    }

    async fn ensure_version_row(driver: &StorageDriver) -> Result<(), StorageError> {
        driver
            .query(
                "DEFINE TABLE IF NOT EXISTS schema_version SCHEMALESS PERMISSIONS FULL; \
                 UPSERT schema_version:singleton SET version = (schema_version:singleton.version ?? 0);",
                vec![],
            )
            .await?;
        Ok(())
    }

    async fn read_version(driver: &StorageDriver) -> Result<u32, StorageError> {
        let mut resp = driver
            .query(
                "SELECT VALUE version FROM ONLY schema_version:singleton;",
                vec![],
            )
            .await?;
        let version: Option<u32> = resp.take(0)?;
        Ok(version.unwrap_or(0))
    }

    async fn set_version(driver: &StorageDriver, version: u32) -> Result<(), StorageError> {
        driver
            .query(
                "UPDATE schema_version:singleton SET version = $version;",
                vec![("version", serde_json::json!(version))],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ConnectConfig;

    #[tokio::test]
    async fn test_migrate_from_scratch_reaches_target() {
        let driver = StorageDriver::connect(&ConnectConfig::default())
            .await
            .unwrap();
        let version = SchemaManager::migrate(&driver).await.unwrap();
        assert_eq!(version, TARGET_VERSION);
    }

    #[tokio::test]
    async fn test_migrate_twice_is_idempotent() {
        let driver = StorageDriver::connect(&ConnectConfig::default())
            .await
            .unwrap();
        SchemaManager::migrate(&driver).await.unwrap();
        let version_before = SchemaManager::read_version(&driver).await.unwrap();
        let version_after = SchemaManager::migrate(&driver).await.unwrap();
        assert_eq!(version_before, TARGET_VERSION);
        assert_eq!(version_after, TARGET_VERSION);
    }
}
