//! Code indexing: projects, files, symbols, oversized-symbol chunks, and
//! the indexing job lifecycle. A project has at most one non-terminal job
//! at a time (spec.md §4.8) — requesting a second while one is pending or
//! in progress is a [`StorageError::JobConflict`].

use std::collections::HashMap;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::StorageError;
use crate::types::{
    CodeChunk, CodeFile, CodeProject, CodeSymbol, IndexingJob, IndexingStatus, JobStatus,
    MatchSource, SearchHit, SymbolKind,
};

use super::MemoryStore;

/// Deterministic id derived from the project root path, so re-discovering
/// the same root always resolves to the same project row.
fn project_id_for(root_path: &str) -> String {
    let digest = Sha256::digest(root_path.as_bytes());
    format!("proj_{:x}", digest)[..21].to_string()
}

impl MemoryStore {
    /// Find the project for `root_path`, creating it (status `pending`)
    /// if it doesn't exist yet.
    pub async fn upsert_project(
        &self,
        name: &str,
        root_path: &str,
        settings: serde_json::Value,
    ) -> Result<CodeProject, StorageError> {
        if let Some(existing) = self.get_project_by_root(root_path).await? {
            return Ok(existing);
        }
        let project_id = project_id_for(root_path);
        let mut resp = self
            .driver
            .query(
                r#"
                CREATE code_projects CONTENT {
                    project_id: $project_id,
                    name: $name,
                    root_path: $root_path,
                    languages: {},
                    indexing_status: 'pending',
                    language_stats: {},
                    last_indexed_at: NONE,
                    settings: $settings,
                };
                "#,
                vec![
                    ("project_id", json!(project_id)),
                    ("name", json!(name)),
                    ("root_path", json!(root_path)),
                    ("settings", settings),
                ],
            )
            .await?;
        let rows: Vec<CodeProject> = resp.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("code project create returned no row"))
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Option<CodeProject>, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT * FROM code_projects WHERE project_id = $project_id LIMIT 1;",
                vec![("project_id", json!(project_id))],
            )
            .await?;
        let rows: Vec<CodeProject> = resp.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_projects(&self) -> Result<Vec<CodeProject>, StorageError> {
        let mut resp = self
            .driver
            .query("SELECT * FROM code_projects ORDER BY name ASC;", vec![])
            .await?;
        Ok(resp.take(0)?)
    }

    /// Remove a project and every file, symbol, and chunk row that
    /// belongs to it. Past indexing jobs are left in place as history.
    pub async fn delete_project(&self, project_id: &str) -> Result<bool, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                DELETE code_projects WHERE project_id = $project_id RETURN BEFORE;
                DELETE code_files WHERE project_id = $project_id;
                DELETE code_symbols WHERE project_id = $project_id;
                DELETE code_chunks WHERE project_id = $project_id;
                "#,
                vec![("project_id", json!(project_id))],
            )
            .await?;
        let deleted: Vec<CodeProject> = resp.take(0)?;
        Ok(!deleted.is_empty())
    }

    /// File, symbol, and chunk counts for one project (backs
    /// `code_get_project_stats`).
    pub async fn project_stats(&self, project_id: &str) -> Result<(u64, u64, u64), StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT VALUE count() FROM code_files WHERE project_id = $project_id GROUP ALL;
                SELECT VALUE count() FROM code_symbols WHERE project_id = $project_id GROUP ALL;
                SELECT VALUE count() FROM code_chunks WHERE project_id = $project_id GROUP ALL;
                "#,
                vec![("project_id", json!(project_id))],
            )
            .await?;
        let files: Vec<u64> = resp.take(0)?;
        let symbols: Vec<u64> = resp.take(1)?;
        let chunks: Vec<u64> = resp.take(2)?;
        Ok((
            files.into_iter().next().unwrap_or(0),
            symbols.into_iter().next().unwrap_or(0),
            chunks.into_iter().next().unwrap_or(0),
        ))
    }

    async fn get_project_by_root(&self, root_path: &str) -> Result<Option<CodeProject>, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT * FROM code_projects WHERE root_path = $root_path LIMIT 1;",
                vec![("root_path", json!(root_path))],
            )
            .await?;
        let rows: Vec<CodeProject> = resp.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Explicit post-upsert status update (spec.md §4.8 step 9): called
    /// after a job transitions, separately from the job row itself, so a
    /// reader of `code_projects` alone sees current status without
    /// joining against `indexing_jobs`.
    pub async fn update_project_status(
        &self,
        project_id: &str,
        status: IndexingStatus,
        language_stats: Option<HashMap<String, u64>>,
    ) -> Result<CodeProject, StorageError> {
        let mut clauses = vec!["indexing_status = $status".to_string()];
        if matches!(status, IndexingStatus::Completed) {
            clauses.push("last_indexed_at = time::now()".to_string());
        }
        if language_stats.is_some() {
            clauses.push("language_stats = $language_stats".to_string());
        }
        let sql = format!(
            "UPDATE code_projects SET {} WHERE project_id = $project_id RETURN AFTER;",
            clauses.join(", ")
        );
        let mut resp = self
            .driver
            .query(
                &sql,
                vec![
                    ("project_id", json!(project_id)),
                    ("status", json!(status)),
                    ("language_stats", json!(language_stats)),
                ],
            )
            .await?;
        let rows: Vec<CodeProject> = resp.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("code_project", project_id))
    }

    /// Upsert a tracked file. Returns `None` when `hash` matches the
    /// stored hash — the caller's incremental-indexing skip signal.
    pub async fn upsert_file(
        &self,
        project_id: &str,
        path: &str,
        language: &str,
        hash: &str,
        size: u64,
    ) -> Result<Option<CodeFile>, StorageError> {
        if let Some(existing) = self.get_file(project_id, path).await? {
            if existing.hash == hash {
                return Ok(None);
            }
        }
        let mut resp = self
            .driver
            .query(
                r#"
                UPSERT code_files CONTENT {
                    project_id: $project_id,
                    path: $path,
                    language: $language,
                    hash: $hash,
                    last_indexed: time::now(),
                    size: $size,
                }
                WHERE project_id = $project_id AND path = $path
                RETURN AFTER;
                "#,
                vec![
                    ("project_id", json!(project_id)),
                    ("path", json!(path)),
                    ("language", json!(language)),
                    ("hash", json!(hash)),
                    ("size", json!(size)),
                ],
            )
            .await?;
        let rows: Vec<CodeFile> = resp.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_file(&self, project_id: &str, path: &str) -> Result<Option<CodeFile>, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT * FROM code_files WHERE project_id = $project_id AND path = $path LIMIT 1;",
                vec![("project_id", json!(project_id)), ("path", json!(path))],
            )
            .await?;
        let rows: Vec<CodeFile> = resp.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Remove a file's tracking row along with every symbol and chunk
    /// that belongs to it (the file was deleted or moved out of scope).
    pub async fn delete_file(&self, project_id: &str, path: &str) -> Result<bool, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                DELETE code_files WHERE project_id = $project_id AND path = $path RETURN BEFORE;
                DELETE code_symbols WHERE project_id = $project_id AND file_path = $path;
                DELETE code_chunks WHERE project_id = $project_id AND file_path = $path;
                "#,
                vec![("project_id", json!(project_id)), ("path", json!(path))],
            )
            .await?;
        let deleted: Vec<CodeFile> = resp.take(0)?;
        Ok(!deleted.is_empty())
    }

    /// Delete every symbol and chunk recorded for `file_path`, in
    /// preparation for re-inserting a freshly parsed set (spec.md §9
    /// "symbol persistence strictly follows a DELETE of prior symbols for
    /// that file path"). Idempotent: deleting an already-empty set is a
    /// no-op.
    pub async fn delete_symbols_for_file(&self, project_id: &str, file_path: &str) -> Result<(), StorageError> {
        self.driver
            .query(
                r#"
                DELETE code_symbols WHERE project_id = $project_id AND file_path = $file_path;
                DELETE code_chunks WHERE project_id = $project_id AND file_path = $file_path;
                "#,
                vec![("project_id", json!(project_id)), ("file_path", json!(file_path))],
            )
            .await?;
        Ok(())
    }

    pub async fn save_symbol(
        &self,
        project_id: &str,
        file_path: &str,
        language: &str,
        name: &str,
        name_path: &str,
        symbol_type: SymbolKind,
        start_line: u32,
        end_line: u32,
        start_byte: u32,
        end_byte: u32,
        signature: &str,
        source_code: &str,
        parent_id: Option<&str>,
        embedding: Option<Vec<f32>>,
    ) -> Result<CodeSymbol, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                UPSERT code_symbols CONTENT {
                    project_id: $project_id,
                    file_path: $file_path,
                    language: $language,
                    name: $name,
                    name_path: $name_path,
                    symbol_type: $symbol_type,
                    start_line: $start_line,
                    end_line: $end_line,
                    start_byte: $start_byte,
                    end_byte: $end_byte,
                    signature: $signature,
                    source_code: $source_code,
                    parent_id: $parent_id,
                    embedding: $embedding,
                    created_at: time::now(),
                }
                WHERE project_id = $project_id AND file_path = $file_path AND name_path = $name_path
                RETURN AFTER;
                "#,
                vec![
                    ("project_id", json!(project_id)),
                    ("file_path", json!(file_path)),
                    ("language", json!(language)),
                    ("name", json!(name)),
                    ("name_path", json!(name_path)),
                    ("symbol_type", json!(symbol_type)),
                    ("start_line", json!(start_line)),
                    ("end_line", json!(end_line)),
                    ("start_byte", json!(start_byte)),
                    ("end_byte", json!(end_byte)),
                    ("signature", json!(signature)),
                    ("source_code", json!(source_code)),
                    ("parent_id", json!(parent_id)),
                    ("embedding", json!(embedding)),
                ],
            )
            .await?;
        let rows: Vec<CodeSymbol> = resp.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("code symbol upsert returned no row"))
    }

    pub async fn list_symbols_for_file(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT * FROM code_symbols WHERE project_id = $project_id AND file_path = $file_path ORDER BY start_line ASC;",
                vec![("project_id", json!(project_id)), ("file_path", json!(file_path))],
            )
            .await?;
        Ok(resp.take(0)?)
    }

    /// Every symbol in a project, optionally scoped to one file, for the
    /// name-path matching `code_find_symbol` performs client-side (spec.md
    /// §6 name-path convention: bare name matches anywhere, `A/B` matches
    /// as a suffix, `/A/B` matches from the root, `*` suffix is a prefix
    /// wildcard).
    pub async fn list_symbols_for_project(
        &self,
        project_id: &str,
        file_path: Option<&str>,
    ) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT * FROM code_symbols
                WHERE project_id = $project_id
                  AND ($file_path IS NONE OR file_path = $file_path)
                ORDER BY file_path ASC, start_line ASC;
                "#,
                vec![("project_id", json!(project_id)), ("file_path", json!(file_path))],
            )
            .await?;
        Ok(resp.take(0)?)
    }

    /// Symbols in a project whose `source_code` contains `needle`, the
    /// substring scan `code_find_references` uses to locate call sites by
    /// name (spec.md §6).
    pub async fn find_symbols_referencing(
        &self,
        project_id: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<CodeSymbol>, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT * FROM code_symbols
                WHERE project_id = $project_id AND string::contains(source_code, $needle)
                ORDER BY file_path ASC, start_line ASC
                LIMIT $limit;
                "#,
                vec![
                    ("project_id", json!(project_id)),
                    ("needle", json!(needle)),
                    ("limit", json!(limit as i64)),
                ],
            )
            .await?;
        Ok(resp.take(0)?)
    }

    pub async fn get_symbol(&self, symbol_id: &str) -> Result<Option<CodeSymbol>, StorageError> {
        let mut resp = self
            .driver
            .query("SELECT * FROM ONLY $id;", vec![("id", json!(symbol_id))])
            .await?;
        Ok(resp.take(0)?)
    }

    /// Semantic search over symbol embeddings, scoped to one project.
    pub async fn search_symbols(
        &self,
        project_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT *, vector::similarity::cosine(embedding, $q) AS score
                FROM code_symbols
                WHERE project_id = $project_id
                  AND embedding <|$limit|> $q
                ORDER BY score DESC
                LIMIT $limit;
                "#,
                vec![
                    ("project_id", json!(project_id)),
                    ("q", json!(query_embedding)),
                    ("limit", json!(limit as i64)),
                ],
            )
            .await?;

        #[derive(serde::Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
            signature: String,
            score: f32,
        }
        let rows: Vec<Row> = resp.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| SearchHit {
                id: r.id.to_string(),
                source: MatchSource::Vector,
                content: r.signature,
                score: r.score,
                metadata: serde_json::json!({}),
            })
            .collect())
    }

    pub async fn save_chunk(
        &self,
        symbol_id: &str,
        project_id: &str,
        file_path: &str,
        chunk_index: usize,
        content: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<CodeChunk, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                CREATE code_chunks CONTENT {
                    symbol_id: $symbol_id,
                    project_id: $project_id,
                    file_path: $file_path,
                    chunk_index: $chunk_index,
                    content: $content,
                    embedding: $embedding,
                };
                "#,
                vec![
                    ("symbol_id", json!(symbol_id)),
                    ("project_id", json!(project_id)),
                    ("file_path", json!(file_path)),
                    ("chunk_index", json!(chunk_index)),
                    ("content", json!(content)),
                    ("embedding", json!(embedding)),
                ],
            )
            .await?;
        let rows: Vec<CodeChunk> = resp.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("code chunk create returned no row"))
    }

    /// Semantic search over oversized-symbol chunk embeddings, scoped to
    /// one project. Used alongside [`Self::search_symbols`] by
    /// `code_hybrid_search` when the caller asks to include chunk bodies.
    pub async fn search_chunks(
        &self,
        project_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StorageError> {
        let mut resp = self
            .driver
            .query(
                r#"
                SELECT *, vector::similarity::cosine(embedding, $q) AS score
                FROM code_chunks
                WHERE project_id = $project_id
                  AND embedding <|$limit|> $q
                ORDER BY score DESC
                LIMIT $limit;
                "#,
                vec![
                    ("project_id", json!(project_id)),
                    ("q", json!(query_embedding)),
                    ("limit", json!(limit as i64)),
                ],
            )
            .await?;

        #[derive(serde::Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
            content: String,
            score: f32,
        }
        let rows: Vec<Row> = resp.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| SearchHit {
                id: r.id.to_string(),
                source: MatchSource::Vector,
                content: r.content,
                score: r.score,
                metadata: serde_json::json!({}),
            })
            .collect())
    }

    /// Start a new indexing run. Refuses with [`StorageError::JobConflict`]
    /// if the project already has a pending or in-progress job — single
    /// owner per `project_id` (spec.md §4.8).
    pub async fn start_indexing_job(&self, project_id: &str) -> Result<IndexingJob, StorageError> {
        let mut active = self
            .driver
            .query(
                "SELECT VALUE id FROM indexing_jobs WHERE project_id = $project_id AND status IN ['pending', 'in_progress'] LIMIT 1;",
                vec![("project_id", json!(project_id))],
            )
            .await?;
        let active_ids: Vec<surrealdb::RecordId> = active.take(0)?;
        if !active_ids.is_empty() {
            return Err(StorageError::job_conflict(project_id));
        }

        #[derive(serde::Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
            project_id: String,
            status: JobStatus,
            progress: f32,
            files_total: u64,
            files_indexed: u64,
            symbols_found: u64,
            started_at: String,
            completed_at: Option<String>,
            error: Option<String>,
        }

        let mut resp = self
            .driver
            .query(
                r#"
                CREATE indexing_jobs CONTENT {
                    project_id: $project_id,
                    status: 'in_progress',
                    progress: 0.0,
                    files_total: 0,
                    files_indexed: 0,
                    symbols_found: 0,
                    started_at: time::now(),
                    completed_at: NONE,
                    error: NONE,
                };
                "#,
                vec![("project_id", json!(project_id))],
            )
            .await?;
        let rows: Vec<Row> = resp.take(0)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::validation("indexing job create returned no row"))?;

        self.update_project_status(project_id, IndexingStatus::InProgress, None)
            .await?;

        Ok(IndexingJob {
            job_id: row.id.to_string(),
            project_id: row.project_id,
            status: row.status,
            progress: row.progress,
            files_total: row.files_total,
            files_indexed: row.files_indexed,
            symbols_found: row.symbols_found,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
        })
    }

    pub async fn update_job_progress(
        &self,
        job_id: &str,
        files_total: u64,
        files_indexed: u64,
        symbols_found: u64,
    ) -> Result<(), StorageError> {
        let progress = if files_total == 0 {
            0.0
        } else {
            files_indexed as f32 / files_total as f32
        };
        self.driver
            .query(
                r#"
                UPDATE $id SET
                    files_total = $files_total,
                    files_indexed = $files_indexed,
                    symbols_found = $symbols_found,
                    progress = $progress;
                "#,
                vec![
                    ("id", json!(job_id)),
                    ("files_total", json!(files_total)),
                    ("files_indexed", json!(files_indexed)),
                    ("symbols_found", json!(symbols_found)),
                    ("progress", json!(progress)),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn complete_job(&self, job_id: &str, project_id: &str) -> Result<(), StorageError> {
        self.driver
            .query(
                "UPDATE $id SET status = 'completed', progress = 1.0, completed_at = time::now();",
                vec![("id", json!(job_id))],
            )
            .await?;
        self.update_project_status(project_id, IndexingStatus::Completed, None)
            .await?;
        Ok(())
    }

    pub async fn fail_job(&self, job_id: &str, project_id: &str, error: &str) -> Result<(), StorageError> {
        self.driver
            .query(
                "UPDATE $id SET status = 'failed', completed_at = time::now(), error = $error;",
                vec![("id", json!(job_id)), ("error", json!(error))],
            )
            .await?;
        self.update_project_status(project_id, IndexingStatus::Failed, None)
            .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<IndexingJob>, StorageError> {
        let mut resp = self
            .driver
            .query("SELECT * FROM ONLY $id;", vec![("id", json!(job_id))])
            .await?;

        #[derive(serde::Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
            project_id: String,
            status: JobStatus,
            progress: f32,
            files_total: u64,
            files_indexed: u64,
            symbols_found: u64,
            started_at: String,
            completed_at: Option<String>,
            error: Option<String>,
        }
        let row: Option<Row> = resp.take(0)?;
        Ok(row.map(|row| IndexingJob {
            job_id: row.id.to_string(),
            project_id: row.project_id,
            status: row.status,
            progress: row.progress,
            files_total: row.files_total,
            files_indexed: row.files_indexed,
            symbols_found: row.symbols_found,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
        }))
    }

    /// Most recently started job across every project, for
    /// `code_index_status` when the caller omits `job_id` (spec.md §6).
    pub async fn get_latest_job(&self) -> Result<Option<IndexingJob>, StorageError> {
        let mut resp = self
            .driver
            .query(
                "SELECT * FROM ONLY (SELECT * FROM indexing_jobs ORDER BY started_at DESC LIMIT 1)[0];",
                vec![],
            )
            .await?;

        #[derive(serde::Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
            project_id: String,
            status: JobStatus,
            progress: f32,
            files_total: u64,
            files_indexed: u64,
            symbols_found: u64,
            started_at: String,
            completed_at: Option<String>,
            error: Option<String>,
        }
        let row: Option<Row> = resp.take(0)?;
        Ok(row.map(|row| IndexingJob {
            job_id: row.id.to_string(),
            project_id: row.project_id,
            status: row.status,
            progress: row.progress,
            files_total: row.files_total,
            files_indexed: row.files_indexed,
            symbols_found: row.symbols_found,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::{ConnectConfig, StorageDriver};
    use crate::schema::SchemaManager;
    use crate::store::MemoryStore;
    use crate::types::SymbolKind;

    async fn test_store() -> MemoryStore {
        let driver = StorageDriver::connect(&ConnectConfig::default()).await.unwrap();
        SchemaManager::migrate(&driver).await.unwrap();
        MemoryStore::new(driver)
    }

    #[tokio::test]
    async fn test_upsert_project_is_idempotent_by_root_path() {
        let store = test_store().await;
        let a = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        let b = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        assert_eq!(a.project_id, b.project_id);
    }

    #[tokio::test]
    async fn test_upsert_file_skips_unchanged_hash() {
        let store = test_store().await;
        let project = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        store
            .upsert_file(&project.project_id, "src/lib.rs", "rust", "hash1", 100)
            .await
            .unwrap();
        let second = store
            .upsert_file(&project.project_id, "src/lib.rs", "rust", "hash1", 100)
            .await
            .unwrap();
        assert!(second.is_none());

        let changed = store
            .upsert_file(&project.project_id, "src/lib.rs", "rust", "hash2", 120)
            .await
            .unwrap();
        assert!(changed.is_some());
    }

    #[tokio::test]
    async fn test_save_and_list_symbols() {
        let store = test_store().await;
        let project = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        store
            .save_symbol(
                &project.project_id,
                "src/lib.rs",
                "rust",
                "run",
                "crate::run",
                SymbolKind::Function,
                1,
                10,
                0,
                200,
                "fn run()",
                "fn run() {}",
                None,
                None,
            )
            .await
            .unwrap();
        let symbols = store.list_symbols_for_file(&project.project_id, "src/lib.rs").await.unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "run");
    }

    #[tokio::test]
    async fn test_delete_symbols_for_file_clears_prior_set() {
        let store = test_store().await;
        let project = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        store
            .save_symbol(
                &project.project_id, "src/lib.rs", "rust", "run", "crate::run",
                SymbolKind::Function, 1, 10, 0, 200, "fn run()", "fn run() {}", None, None,
            )
            .await
            .unwrap();
        store.delete_symbols_for_file(&project.project_id, "src/lib.rs").await.unwrap();
        let symbols = store.list_symbols_for_file(&project.project_id, "src/lib.rs").await.unwrap();
        assert!(symbols.is_empty());
    }

    #[tokio::test]
    async fn test_second_job_conflicts_while_first_active() {
        let store = test_store().await;
        let project = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        store.start_indexing_job(&project.project_id).await.unwrap();
        let second = store.start_indexing_job(&project.project_id).await;
        assert!(matches!(second, Err(crate::error::StorageError::JobConflict { .. })));
    }

    #[tokio::test]
    async fn test_completing_job_frees_project_for_next_run() {
        let store = test_store().await;
        let project = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        let job = store.start_indexing_job(&project.project_id).await.unwrap();
        store.complete_job(&job.job_id, &project.project_id).await.unwrap();
        let next = store.start_indexing_job(&project.project_id).await;
        assert!(next.is_ok());
    }

    #[tokio::test]
    async fn test_delete_project_cascades_files_and_symbols() {
        let store = test_store().await;
        let project = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        store.upsert_file(&project.project_id, "src/lib.rs", "rust", "hash1", 100).await.unwrap();
        store
            .save_symbol(
                &project.project_id, "src/lib.rs", "rust", "run", "crate::run",
                SymbolKind::Function, 1, 10, 0, 200, "fn run()", "fn run() {}", None, None,
            )
            .await
            .unwrap();

        let deleted = store.delete_project(&project.project_id).await.unwrap();
        assert!(deleted);
        assert!(store.get_project(&project.project_id).await.unwrap().is_none());
        assert!(store.list_symbols_for_file(&project.project_id, "src/lib.rs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_project_stats_counts_files_and_symbols() {
        let store = test_store().await;
        let project = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        store.upsert_file(&project.project_id, "src/lib.rs", "rust", "hash1", 100).await.unwrap();
        store
            .save_symbol(
                &project.project_id, "src/lib.rs", "rust", "run", "crate::run",
                SymbolKind::Function, 1, 10, 0, 200, "fn run()", "fn run() {}", None, None,
            )
            .await
            .unwrap();

        let (files, symbols, chunks) = store.project_stats(&project.project_id).await.unwrap();
        assert_eq!(files, 1);
        assert_eq!(symbols, 1);
        assert_eq!(chunks, 0);
    }

    #[tokio::test]
    async fn test_find_symbols_referencing_matches_substring() {
        let store = test_store().await;
        let project = store.upsert_project("demo", "/repo/demo", serde_json::json!({})).await.unwrap();
        store
            .save_symbol(
                &project.project_id, "src/lib.rs", "rust", "run", "crate::run",
                SymbolKind::Function, 1, 10, 0, 200, "fn run()", "fn run() { helper(); }", None, None,
            )
            .await
            .unwrap();

        let hits = store.find_symbols_referencing(&project.project_id, "helper(", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "run");
    }

    #[tokio::test]
    async fn test_list_projects_orders_by_name() {
        let store = test_store().await;
        store.upsert_project("zeta", "/repo/zeta", serde_json::json!({})).await.unwrap();
        store.upsert_project("alpha", "/repo/alpha", serde_json::json!({})).await.unwrap();

        let projects = store.list_projects().await.unwrap();
        assert_eq!(projects.first().unwrap().name, "alpha");
    }
}
