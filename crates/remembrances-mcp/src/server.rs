//! The `RemembrancesServer` MCP tool surface (C10, spec.md §4.10 / §6):
//! facts, vectors, graph, knowledge-base documents, aggregate search, and
//! code indexing/navigation/editing, wired to one [`MemoryStore`] and one
//! [`EmbedderFactory`].
//!
//! Every `#[tool]` handler is a thin translation layer: validate/resolve
//! parameters, call the storage or search layer, and fold the result into
//! a `CallToolResult`. Domain logic (ranking, chunking, parsing) lives in
//! `remembrances-core`/`remembrances-search`; handlers here never
//! duplicate it.

use std::path::PathBuf;
use std::sync::Arc;

use ignore::WalkBuilder;
use regex::Regex;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpSdkError};
use serde_json::json;
use tracing::info;

use remembrances_core::compute_file_hash;
use remembrances_core::Indexer;
use remembrances_search::embeddings::EmbedderFactory;
use remembrances_search::HybridSearcher;
use remembrances_storage::{CodeSymbol, MemoryStore, SymbolKind};

use crate::error::McpError;
use crate::tools::*;

/// The live MCP server: holds the storage/search/indexing handles every
/// tool handler delegates to, plus the generated [`ToolRouter`].
#[derive(Clone)]
pub struct RemembrancesServer {
    store: MemoryStore,
    embedders: Arc<EmbedderFactory>,
    searcher: Arc<HybridSearcher>,
    indexer: Arc<Indexer>,
    tool_router: ToolRouter<Self>,
}

fn ok_json(value: impl serde::Serialize) -> Result<CallToolResult, McpSdkError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn metadata_to_value(metadata: Option<std::collections::HashMap<String, String>>) -> serde_json::Value {
    match metadata {
        Some(m) => serde_json::to_value(m).unwrap_or_else(|_| json!({})),
        None => json!({}),
    }
}

#[tool_router]
impl RemembrancesServer {
    pub async fn new(
        store: MemoryStore,
        embedders: Arc<EmbedderFactory>,
        searcher: Arc<HybridSearcher>,
        indexer: Arc<Indexer>,
    ) -> Result<Self, McpError> {
        info!("initializing Remembrances-MCP server");
        Ok(Self {
            store,
            embedders,
            searcher,
            indexer,
            tool_router: Self::tool_router(),
        })
    }

    // -----------------------------------------------------------------
    // Facts
    // -----------------------------------------------------------------

    #[tool(
        name = "remembrance_save_fact",
        description = "Save a key/value fact, scoped to a user id or global if omitted. Overwrites any existing fact with the same key."
    )]
    async fn remembrance_save_fact(
        &self,
        Parameters(params): Parameters<SaveFactParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let fact = self
            .store
            .save_fact(params.user_id.as_deref(), &params.key, &params.value)
            .await
            .map_err(McpError::from)?;
        ok_json(fact)
    }

    #[tool(
        name = "remembrance_get_fact",
        description = "Look up a single fact's value by key."
    )]
    async fn remembrance_get_fact(
        &self,
        Parameters(params): Parameters<GetFactParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let value = self
            .store
            .get_fact(params.user_id.as_deref(), &params.key)
            .await
            .map_err(McpError::from)?;
        ok_json(json!({ "key": params.key, "value": value }))
    }

    #[tool(
        name = "remembrance_list_facts",
        description = "List every fact for a user id (or global facts if omitted)."
    )]
    async fn remembrance_list_facts(
        &self,
        Parameters(params): Parameters<ListFactsParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let facts = self
            .store
            .list_facts(params.user_id.as_deref())
            .await
            .map_err(McpError::from)?;
        ok_json(facts)
    }

    #[tool(
        name = "remembrance_delete_fact",
        description = "Delete a fact by key. Returns whether a row was actually removed."
    )]
    async fn remembrance_delete_fact(
        &self,
        Parameters(params): Parameters<DeleteFactParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let deleted = self
            .store
            .delete_fact(params.user_id.as_deref(), &params.key)
            .await
            .map_err(McpError::from)?;
        ok_json(json!({ "deleted": deleted }))
    }

    // -----------------------------------------------------------------
    // Vectors
    // -----------------------------------------------------------------

    #[tool(
        name = "remembrance_add_vector",
        description = "Embed and store a piece of text content as a searchable memory vector."
    )]
    async fn remembrance_add_vector(
        &self,
        Parameters(params): Parameters<AddVectorParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let provider = self.embedders.default();
        let embedding = provider
            .embed_query(&params.content)
            .await
            .map_err(McpError::from)?;
        let metadata = metadata_to_value(params.metadata);
        let vector = self
            .store
            .add_vector(params.user_id.as_deref(), &params.content, embedding, metadata)
            .await
            .map_err(McpError::from)?;
        ok_json(vector)
    }

    #[tool(
        name = "remembrance_search_vectors",
        description = "Semantic search over stored memory vectors."
    )]
    async fn remembrance_search_vectors(
        &self,
        Parameters(params): Parameters<SearchVectorsParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let provider = self.embedders.default();
        let embedding = provider
            .embed_query(&params.query)
            .await
            .map_err(McpError::from)?;
        let limit = params.limit.unwrap_or(remembrances_search::DEFAULT_LIMIT);
        let hits = self
            .store
            .search_vectors(&embedding, params.user_id.as_deref(), limit)
            .await
            .map_err(McpError::from)?;
        ok_json(hits)
    }

    #[tool(
        name = "remembrance_update_vector",
        description = "Update a memory vector's content and/or metadata. The stored embedding is left as-is; re-add the vector if the content's meaning changed enough to need re-embedding."
    )]
    async fn remembrance_update_vector(
        &self,
        Parameters(params): Parameters<UpdateVectorParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let metadata = params.metadata.map(metadata_to_value_some);
        let vector = self
            .store
            .update_vector(&params.id, params.content.as_deref(), metadata)
            .await
            .map_err(McpError::from)?;
        ok_json(vector)
    }

    #[tool(
        name = "remembrance_delete_vector",
        description = "Delete a memory vector by id."
    )]
    async fn remembrance_delete_vector(
        &self,
        Parameters(params): Parameters<DeleteVectorParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let deleted = self.store.delete_vector(&params.id).await.map_err(McpError::from)?;
        ok_json(json!({ "deleted": deleted }))
    }

    // -----------------------------------------------------------------
    // Graph
    // -----------------------------------------------------------------

    #[tool(
        name = "remembrance_create_entity",
        description = "Create a named graph entity with optional labels and properties."
    )]
    async fn remembrance_create_entity(
        &self,
        Parameters(params): Parameters<CreateEntityParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let labels = params.labels.unwrap_or_default();
        let properties = metadata_to_value(params.properties);
        let entity = self
            .store
            .create_entity(&params.name, params.user_id.as_deref(), labels, properties)
            .await
            .map_err(McpError::from)?;
        ok_json(entity)
    }

    #[tool(
        name = "remembrance_create_relationship",
        description = "Link two entities (by record id or name) with a typed relationship."
    )]
    async fn remembrance_create_relationship(
        &self,
        Parameters(params): Parameters<CreateRelationshipParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let properties = metadata_to_value(params.properties);
        let relationship = self
            .store
            .create_relationship(
                &params.from_entity,
                &params.to_entity,
                &params.relationship_type,
                params.user_id.as_deref(),
                properties,
            )
            .await
            .map_err(McpError::from)?;
        ok_json(relationship)
    }

    #[tool(
        name = "remembrance_traverse_graph",
        description = "Breadth-first traversal from an entity, optionally restricted to one relationship type."
    )]
    async fn remembrance_traverse_graph(
        &self,
        Parameters(params): Parameters<TraverseGraphParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let depth = params.depth.unwrap_or(1);
        let (nodes, edges) = self
            .store
            .traverse_graph(&params.start_entity, params.relationship_type.as_deref(), depth)
            .await
            .map_err(McpError::from)?;
        ok_json(json!({ "nodes": nodes, "edges": edges }))
    }

    #[tool(
        name = "remembrance_get_entity",
        description = "Look up a single entity by record id or by name."
    )]
    async fn remembrance_get_entity(
        &self,
        Parameters(params): Parameters<GetEntityParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let entity = self
            .store
            .get_entity(&params.entity_id_or_name)
            .await
            .map_err(McpError::from)?;
        ok_json(entity)
    }

    // -----------------------------------------------------------------
    // Knowledge base documents
    // -----------------------------------------------------------------

    #[tool(
        name = "kb_add_document",
        description = "Chunk, embed, and store a document's content under a file path, replacing any existing chunks for that path."
    )]
    async fn kb_add_document(
        &self,
        Parameters(params): Parameters<AddDocumentParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let provider = self.embedders.default();
        let windows = remembrances_core::chunk_text(
            &params.content,
            provider.max_chars(),
            remembrances_core::DEFAULT_OVERLAP,
        );
        let texts: Vec<String> = windows.into_iter().map(|w| w.text).collect();
        let embeddings = provider
            .embed_documents(&texts)
            .await
            .map_err(McpError::from)?;

        let mut chunks = Vec::with_capacity(texts.len());
        let mut failed = 0usize;
        for (text, embedding) in texts.into_iter().zip(embeddings.into_iter()) {
            match embedding {
                Some(e) => chunks.push((text, e)),
                None => failed += 1,
            }
        }

        let metadata = metadata_to_value(params.metadata);
        let saved = self
            .store
            .save_document(None, &params.file_path, chunks, metadata)
            .await
            .map_err(McpError::from)?;

        ok_json(json!({
            "file_path": params.file_path,
            "chunks_saved": saved.len(),
            "chunks_failed_to_embed": failed,
        }))
    }

    #[tool(
        name = "kb_search_documents",
        description = "Semantic search over knowledge-base document chunks."
    )]
    async fn kb_search_documents(
        &self,
        Parameters(params): Parameters<SearchDocumentsParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let provider = self.embedders.default();
        let embedding = provider
            .embed_query(&params.query)
            .await
            .map_err(McpError::from)?;
        let limit = params.limit.unwrap_or(remembrances_search::DEFAULT_LIMIT);
        let hits = self
            .store
            .search_documents(&embedding, None, limit)
            .await
            .map_err(McpError::from)?;
        ok_json(hits)
    }

    #[tool(
        name = "kb_get_document",
        description = "Fetch every stored chunk for a document path, in chunk order."
    )]
    async fn kb_get_document(
        &self,
        Parameters(params): Parameters<GetDocumentParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let chunks = self.store.get_document(&params.file_path).await.map_err(McpError::from)?;
        ok_json(chunks)
    }

    #[tool(
        name = "kb_delete_document",
        description = "Delete every chunk stored for a document path."
    )]
    async fn kb_delete_document(
        &self,
        Parameters(params): Parameters<DeleteDocumentParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let deleted = self
            .store
            .delete_document(None, &params.file_path)
            .await
            .map_err(McpError::from)?;
        ok_json(json!({ "deleted": deleted }))
    }

    // -----------------------------------------------------------------
    // Aggregate
    // -----------------------------------------------------------------

    #[tool(
        name = "remembrance_hybrid_search",
        description = "Search vectors, documents, graph entities, and facts in one call, merged by source precedence (vector > document > graph > fact) and deduplicated by id."
    )]
    async fn remembrance_hybrid_search(
        &self,
        Parameters(params): Parameters<HybridSearchParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let limit = params.limit.unwrap_or(remembrances_search::DEFAULT_LIMIT);
        let hits = self
            .searcher
            .search(&self.embedders, &params.query, params.user_id.as_deref(), limit)
            .await
            .map_err(McpError::from)?;
        ok_json(hits)
    }

    #[tool(
        name = "remembrance_get_stats",
        description = "Per-user counts of facts, vectors, entities, relationships, and documents."
    )]
    async fn remembrance_get_stats(
        &self,
        Parameters(params): Parameters<GetStatsParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let stats = self.store.get_stats(params.user_id.as_deref()).await.map_err(McpError::from)?;
        ok_json(stats)
    }

    #[tool(
        name = "last_to_remember",
        description = "Compact recent-context snapshot (plain YAML) combining the most recently updated knowledge-base documents with the last saved 'to_remember' fact."
    )]
    async fn last_to_remember(
        &self,
        Parameters(params): Parameters<LastToRememberParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let recent = self.store.recent_documents(5).await.map_err(McpError::from)?;
        let to_remember = self
            .store
            .get_fact(params.user_id.as_deref(), "to_remember")
            .await
            .map_err(McpError::from)?;

        let snapshot = json!({
            "to_remember": to_remember,
            "recent_documents": recent,
        });
        let yaml = serde_yaml::to_string(&snapshot).map_err(McpError::from)?;
        Ok(CallToolResult::success(vec![Content::text(yaml)]))
    }

    // -----------------------------------------------------------------
    // Code
    // -----------------------------------------------------------------

    #[tool(
        name = "code_index_project",
        description = "Index (or re-index) a project directory: parse every supported source file, extract symbols, chunk and embed them. Fails if the project already has a pending or in-progress indexing job."
    )]
    async fn code_index_project(
        &self,
        Parameters(params): Parameters<IndexProjectParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let root_path = PathBuf::from(&params.project_path);
        let name = params.project_name.clone().unwrap_or_else(|| {
            root_path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| params.project_path.clone())
        });
        let job = self
            .indexer
            .index_project(&root_path, &name, params.languages.as_deref())
            .await
            .map_err(McpError::from)?;
        ok_json(job)
    }

    #[tool(
        name = "code_index_status",
        description = "Report an indexing job's status by job id, or the most recently started job if omitted."
    )]
    async fn code_index_status(
        &self,
        Parameters(params): Parameters<IndexStatusParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let job = match params.job_id {
            Some(id) => self.store.get_job(&id).await.map_err(McpError::from)?,
            None => self.store.get_latest_job().await.map_err(McpError::from)?,
        };
        match job {
            Some(job) => ok_json(job),
            None => Err(McpError::not_found("no indexing jobs recorded yet").into()),
        }
    }

    #[tool(name = "code_list_projects", description = "List every indexed project.")]
    async fn code_list_projects(
        &self,
        Parameters(_params): Parameters<ListProjectsParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let projects = self.store.list_projects().await.map_err(McpError::from)?;
        ok_json(projects)
    }

    #[tool(
        name = "code_delete_project",
        description = "Remove a project along with every file, symbol, and chunk indexed under it."
    )]
    async fn code_delete_project(
        &self,
        Parameters(params): Parameters<DeleteProjectParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let deleted = self
            .store
            .delete_project(&params.project_id)
            .await
            .map_err(McpError::from)?;
        ok_json(json!({ "deleted": deleted }))
    }

    #[tool(
        name = "code_reindex_file",
        description = "Re-parse, re-chunk, and re-embed a single file within an already-indexed project, outside of a full project job."
    )]
    async fn code_reindex_file(
        &self,
        Parameters(params): Parameters<ReindexFileParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let project = self
            .store
            .get_project(&params.project_id)
            .await
            .map_err(McpError::from)?
            .ok_or_else(|| McpError::not_found(format!("project '{}'", params.project_id)))?;
        let root = PathBuf::from(&project.root_path);
        let symbols = self
            .indexer
            .reindex_file(&root, &params.project_id, &params.file_path)
            .await
            .map_err(McpError::from)?;
        ok_json(json!({ "file_path": params.file_path, "symbols_indexed": symbols }))
    }

    #[tool(
        name = "code_get_project_stats",
        description = "File, symbol, and chunk counts for a project."
    )]
    async fn code_get_project_stats(
        &self,
        Parameters(params): Parameters<ProjectStatsParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let (files, symbols, chunks) = self
            .store
            .project_stats(&params.project_id)
            .await
            .map_err(McpError::from)?;
        ok_json(json!({ "files": files, "symbols": symbols, "chunks": chunks }))
    }

    #[tool(
        name = "code_get_file_symbols",
        description = "List every symbol extracted from one file, in source order."
    )]
    async fn code_get_file_symbols(
        &self,
        Parameters(params): Parameters<FileSymbolsParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let include_body = params.include_body.unwrap_or(false);
        let symbols = self
            .store
            .list_symbols_for_file(&params.project_id, &params.relative_path)
            .await
            .map_err(McpError::from)?;
        ok_json(symbols.into_iter().map(|s| symbol_summary(s, include_body)).collect::<Vec<_>>())
    }

    #[tool(
        name = "code_find_symbol",
        description = "Find symbols by name-path pattern. A bare name matches anywhere; 'A/B' matches as a suffix of the full name path; '/A/B' anchors the match at the root; a trailing '*' is a prefix wildcard on the last segment."
    )]
    async fn code_find_symbol(
        &self,
        Parameters(params): Parameters<FindSymbolParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let limit = params.limit.unwrap_or(20);
        let symbol_types = params
            .symbol_types
            .map(|kinds| kinds.iter().filter_map(|k| parse_symbol_kind(k)).collect::<Vec<_>>());

        let all = self
            .store
            .list_symbols_for_project(&params.project_id, None)
            .await
            .map_err(McpError::from)?;

        let matches: Vec<_> = all
            .into_iter()
            .filter(|s| matches_name_path(&s.name_path, &params.name_path_pattern))
            .filter(|s| {
                params
                    .languages
                    .as_ref()
                    .is_none_or(|langs| langs.iter().any(|l| l.eq_ignore_ascii_case(&s.language)))
            })
            .filter(|s| symbol_types.as_ref().is_none_or(|kinds| kinds.contains(&s.symbol_type)))
            .take(limit)
            .map(|s| symbol_summary(s, false))
            .collect();

        ok_json(matches)
    }

    #[tool(
        name = "code_search_symbols_semantic",
        description = "Semantic search over symbol signatures/bodies within a project, via the symbol embeddings computed during indexing."
    )]
    async fn code_search_symbols_semantic(
        &self,
        Parameters(params): Parameters<SearchSymbolsSemanticParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let provider = self.embedders.code();
        let embedding = provider
            .embed_query(&params.query)
            .await
            .map_err(McpError::from)?;
        let limit = params.limit.unwrap_or(remembrances_search::DEFAULT_LIMIT);
        let mut hits = self
            .store
            .search_symbols(&params.project_id, &embedding, limit * 3)
            .await
            .map_err(McpError::from)?;

        if params.languages.is_some() || params.symbol_types.is_some() {
            let symbol_types = params
                .symbol_types
                .map(|kinds| kinds.iter().filter_map(|k| parse_symbol_kind(k)).collect::<Vec<_>>());
            let mut ids_to_keep = std::collections::HashSet::new();
            for symbol in self
                .store
                .list_symbols_for_project(&params.project_id, None)
                .await
                .map_err(McpError::from)?
            {
                let lang_ok = params
                    .languages
                    .as_ref()
                    .is_none_or(|langs| langs.iter().any(|l| l.eq_ignore_ascii_case(&symbol.language)));
                let type_ok = symbol_types.as_ref().is_none_or(|kinds| kinds.contains(&symbol.symbol_type));
                if lang_ok && type_ok {
                    ids_to_keep.insert(symbol.id);
                }
            }
            hits.retain(|h| ids_to_keep.contains(&h.id));
        }
        hits.truncate(limit);
        ok_json(hits)
    }

    #[tool(
        name = "code_search_pattern",
        description = "Grep a project's tracked source tree for a literal substring or (if is_regex) a regular expression, optionally scoped under a relative path prefix."
    )]
    async fn code_search_pattern(
        &self,
        Parameters(params): Parameters<SearchPatternParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let project = self
            .store
            .get_project(&params.project_id)
            .await
            .map_err(McpError::from)?
            .ok_or_else(|| McpError::not_found(format!("project '{}'", params.project_id)))?;

        let root = PathBuf::from(&project.root_path);
        let search_root = match &params.path_prefix {
            Some(prefix) => root.join(prefix),
            None => root.clone(),
        };
        let is_regex = params.is_regex.unwrap_or(false);
        let limit = params.limit.unwrap_or(50);
        let regex = if is_regex {
            Some(Regex::new(&params.pattern).map_err(|e| McpError::invalid_params(format!("invalid regex: {e}")))?)
        } else {
            None
        };

        let mut matches = Vec::new();
        'walk: for entry in WalkBuilder::new(&search_root).hidden(false).build() {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let abs_path = entry.path();
            let content = match std::fs::read_to_string(abs_path) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let rel_path = abs_path.strip_prefix(&root).unwrap_or(abs_path).to_string_lossy().to_string();

            for (line_no, line) in content.lines().enumerate() {
                let found = match &regex {
                    Some(re) => re.is_match(line),
                    None => line.contains(&params.pattern),
                };
                if found {
                    matches.push(json!({
                        "file_path": rel_path,
                        "line": line_no + 1,
                        "text": line,
                    }));
                    if matches.len() >= limit {
                        break 'walk;
                    }
                }
            }
        }

        ok_json(matches)
    }

    #[tool(
        name = "code_find_references",
        description = "Find symbols whose source text references a given symbol (by id) or name, via a substring scan."
    )]
    async fn code_find_references(
        &self,
        Parameters(params): Parameters<FindReferencesParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let limit = params.limit.unwrap_or(20);
        let needle = match (&params.symbol_id, &params.symbol_name) {
            (Some(id), _) => {
                let symbol = self
                    .store
                    .get_symbol(id)
                    .await
                    .map_err(McpError::from)?
                    .ok_or_else(|| McpError::not_found(format!("symbol '{id}'")))?;
                symbol.name
            }
            (None, Some(name)) => name.clone(),
            (None, None) => {
                return Err(McpError::invalid_params("one of symbol_id or symbol_name is required").into())
            }
        };

        let refs = self
            .store
            .find_symbols_referencing(&params.project_id, &needle, limit)
            .await
            .map_err(McpError::from)?;
        ok_json(refs.into_iter().map(|s| symbol_summary(s, false)).collect::<Vec<_>>())
    }

    #[tool(
        name = "code_hybrid_search",
        description = "Semantic search over both symbols and (optionally) oversized-symbol chunk bodies within a project, merged by score."
    )]
    async fn code_hybrid_search(
        &self,
        Parameters(params): Parameters<CodeHybridSearchParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let provider = self.embedders.code();
        let embedding = provider
            .embed_query(&params.query)
            .await
            .map_err(McpError::from)?;
        let limit = params.limit.unwrap_or(remembrances_search::DEFAULT_LIMIT);
        let include_chunks = params.include_chunks.unwrap_or(true);

        let mut hits = self
            .store
            .search_symbols(&params.project_id, &embedding, limit)
            .await
            .map_err(McpError::from)?;
        if include_chunks {
            let chunk_hits = self
                .store
                .search_chunks(&params.project_id, &embedding, limit)
                .await
                .map_err(McpError::from)?;
            hits.extend(chunk_hits);
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        ok_json(hits)
    }

    #[tool(
        name = "code_replace_symbol",
        description = "Replace a symbol's source text in place on disk (by its recorded byte range), then re-index the containing file. Fails if the file has changed on disk since it was last indexed."
    )]
    async fn code_replace_symbol(
        &self,
        Parameters(params): Parameters<ReplaceSymbolParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let result = self
            .splice_symbol(&params.project_id, &params.symbol_id, SpliceMode::Replace, &params.new_source)
            .await?;
        ok_json(result)
    }

    #[tool(
        name = "code_insert_after_symbol",
        description = "Insert source text immediately after a symbol's closing byte, then re-index the containing file."
    )]
    async fn code_insert_after_symbol(
        &self,
        Parameters(params): Parameters<InsertAfterSymbolParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let result = self
            .splice_symbol(&params.project_id, &params.symbol_id, SpliceMode::InsertAfter, &params.new_source)
            .await?;
        ok_json(result)
    }

    #[tool(
        name = "code_insert_before_symbol",
        description = "Insert source text immediately before a symbol's opening byte, then re-index the containing file."
    )]
    async fn code_insert_before_symbol(
        &self,
        Parameters(params): Parameters<InsertBeforeSymbolParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let result = self
            .splice_symbol(&params.project_id, &params.symbol_id, SpliceMode::InsertBefore, &params.new_source)
            .await?;
        ok_json(result)
    }

    #[tool(
        name = "code_delete_symbol",
        description = "Delete a symbol's source text from disk (by its recorded byte range), then re-index the containing file."
    )]
    async fn code_delete_symbol(
        &self,
        Parameters(params): Parameters<DeleteSymbolParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        let result = self
            .splice_symbol(&params.project_id, &params.symbol_id, SpliceMode::Delete, "")
            .await?;
        ok_json(result)
    }

    // -----------------------------------------------------------------
    // Meta
    // -----------------------------------------------------------------

    #[tool(
        name = "how_to_use",
        description = "On-demand usage guide: an overview of tool groups, or detail for one group/tool when 'topic' is given."
    )]
    async fn how_to_use(
        &self,
        Parameters(params): Parameters<HowToUseParams>,
    ) -> Result<CallToolResult, McpSdkError> {
        Ok(CallToolResult::success(vec![Content::text(how_to_use_text(params.topic.as_deref()))]))
    }
}

enum SpliceMode {
    Replace,
    InsertBefore,
    InsertAfter,
    Delete,
}

impl RemembrancesServer {
    /// Shared implementation behind the four code-editing tools: resolve
    /// the symbol and its owning project, verify the file on disk still
    /// matches what was last indexed, splice `new_source` into its byte
    /// range, write the file back, and re-index it.
    async fn splice_symbol(
        &self,
        project_id: &str,
        symbol_id: &str,
        mode: SpliceMode,
        new_source: &str,
    ) -> Result<serde_json::Value, McpSdkError> {
        let symbol = self
            .store
            .get_symbol(symbol_id)
            .await
            .map_err(McpError::from)?
            .ok_or_else(|| McpError::not_found(format!("symbol '{symbol_id}'")))?;
        if symbol.project_id != project_id {
            return Err(McpError::invalid_params("symbol does not belong to project_id").into());
        }

        let project = self
            .store
            .get_project(project_id)
            .await
            .map_err(McpError::from)?
            .ok_or_else(|| McpError::not_found(format!("project '{project_id}'")))?;
        let file_row = self
            .store
            .get_file(project_id, &symbol.file_path)
            .await
            .map_err(McpError::from)?
            .ok_or_else(|| McpError::not_found(format!("file '{}'", symbol.file_path)))?;

        let root = PathBuf::from(&project.root_path);
        let abs_path = root.join(&symbol.file_path);

        let current_hash = compute_file_hash(&abs_path).map_err(McpError::from)?;
        if current_hash != file_row.hash {
            return Err(McpError::invalid_params(format!(
                "{} has changed on disk since it was last indexed; run code_reindex_file first",
                symbol.file_path
            ))
            .into());
        }

        let bytes = tokio::fs::read(&abs_path).await.map_err(McpError::from)?;
        let (start, end) = (symbol.start_byte as usize, symbol.end_byte as usize);
        if start > end || end > bytes.len() {
            return Err(McpError::invalid_params("symbol's recorded byte range no longer fits the file").into());
        }

        let mut out = Vec::with_capacity(bytes.len() + new_source.len());
        match mode {
            SpliceMode::Replace => {
                out.extend_from_slice(&bytes[..start]);
                out.extend_from_slice(new_source.as_bytes());
                out.extend_from_slice(&bytes[end..]);
            }
            SpliceMode::InsertBefore => {
                out.extend_from_slice(&bytes[..start]);
                out.extend_from_slice(new_source.as_bytes());
                out.extend_from_slice(&bytes[start..]);
            }
            SpliceMode::InsertAfter => {
                out.extend_from_slice(&bytes[..end]);
                out.extend_from_slice(new_source.as_bytes());
                out.extend_from_slice(&bytes[end..]);
            }
            SpliceMode::Delete => {
                out.extend_from_slice(&bytes[..start]);
                out.extend_from_slice(&bytes[end..]);
            }
        }

        tokio::fs::write(&abs_path, &out).await.map_err(McpError::from)?;

        let symbols_indexed = self
            .indexer
            .reindex_file(&root, project_id, &symbol.file_path)
            .await
            .map_err(McpError::from)?;

        Ok(json!({
            "file_path": symbol.file_path,
            "symbols_indexed": symbols_indexed,
        }))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for RemembrancesServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Remembrances-MCP: persistent memory and code-aware search for AI agents. \
                 Tool groups: remembrance_* (facts, vectors, graph, hybrid search, stats), \
                 kb_* (knowledge-base documents), code_* (project indexing, symbol search and \
                 navigation, in-place symbol edits), plus last_to_remember for a quick recent-\
                 context snapshot and how_to_use for on-demand documentation."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// `UpdateVectorParams.metadata` carries `Some(map)` to mean "replace the
/// metadata object"; an absent field means "leave it untouched" and is
/// handled by the `None` branch at the call site, so this only runs on
/// `Some`.
fn metadata_to_value_some(map: std::collections::HashMap<String, String>) -> serde_json::Value {
    serde_json::to_value(map).unwrap_or_else(|_| json!({}))
}

fn symbol_summary(symbol: CodeSymbol, include_body: bool) -> serde_json::Value {
    let mut value = json!({
        "id": symbol.id,
        "file_path": symbol.file_path,
        "language": symbol.language,
        "name": symbol.name,
        "name_path": symbol.name_path,
        "symbol_type": symbol.symbol_type,
        "start_line": symbol.start_line,
        "end_line": symbol.end_line,
        "signature": symbol.signature,
        "parent_id": symbol.parent_id,
    });
    if include_body {
        value["source_code"] = json!(symbol.source_code);
    }
    value
}

fn parse_symbol_kind(raw: &str) -> Option<SymbolKind> {
    match raw.to_ascii_lowercase().as_str() {
        "class" => Some(SymbolKind::Class),
        "function" => Some(SymbolKind::Function),
        "method" => Some(SymbolKind::Method),
        "interface" => Some(SymbolKind::Interface),
        "struct" => Some(SymbolKind::Struct),
        "enum" => Some(SymbolKind::Enum),
        "constant" => Some(SymbolKind::Constant),
        "variable" => Some(SymbolKind::Variable),
        "property" => Some(SymbolKind::Property),
        "type" => Some(SymbolKind::Type),
        "import" => Some(SymbolKind::Import),
        "namespace" => Some(SymbolKind::Namespace),
        "module" => Some(SymbolKind::Module),
        _ => None,
    }
}

/// Name-path matching for `code_find_symbol` (spec.md §6): a pattern
/// starting with `/` is anchored at the root and must match the whole
/// path; otherwise a single-segment pattern matches any one segment
/// anywhere in the path, and a multi-segment pattern matches as a suffix
/// of the trailing segments. A trailing `*` makes the matched segment a
/// prefix match instead of exact.
fn matches_name_path(name_path: &str, pattern: &str) -> bool {
    let anchored = pattern.starts_with('/');
    let pattern = pattern.trim_start_matches('/');
    let (prefix_wildcard, pattern) = match pattern.strip_suffix('*') {
        Some(stripped) => (true, stripped),
        None => (false, pattern),
    };

    let path_segs: Vec<&str> = name_path.split('/').collect();
    let pat_segs: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    if pat_segs.is_empty() {
        return false;
    }

    let segment_matches = |path_seg: &str, pat_seg: &str, wildcard_here: bool| -> bool {
        if wildcard_here {
            path_seg.starts_with(pat_seg)
        } else {
            path_seg == pat_seg
        }
    };

    if anchored {
        if path_segs.len() != pat_segs.len() {
            return false;
        }
        let last = pat_segs.len() - 1;
        return path_segs
            .iter()
            .zip(pat_segs.iter())
            .enumerate()
            .all(|(i, (p, pat))| segment_matches(p, pat, prefix_wildcard && i == last));
    }

    if pat_segs.len() == 1 {
        return path_segs.iter().any(|seg| segment_matches(seg, pat_segs[0], prefix_wildcard));
    }

    if pat_segs.len() > path_segs.len() {
        return false;
    }
    let start = path_segs.len() - pat_segs.len();
    let last = pat_segs.len() - 1;
    path_segs[start..]
        .iter()
        .zip(pat_segs.iter())
        .enumerate()
        .all(|(i, (p, pat))| segment_matches(p, pat, prefix_wildcard && i == last))
}

/// Static usage guide content for the `how_to_use` meta tool.
fn how_to_use_text(topic: Option<&str>) -> String {
    match topic.map(|t| t.to_ascii_lowercase()) {
        None => OVERVIEW.to_string(),
        Some(ref t) if t == "remembrance" => REMEMBRANCE_GROUP.to_string(),
        Some(ref t) if t == "kb" => KB_GROUP.to_string(),
        Some(ref t) if t == "code" => CODE_GROUP.to_string(),
        Some(t) => format!(
            "Unknown topic '{t}'. Known topics: 'remembrance', 'kb', 'code', or omit for the overview.\n\n{OVERVIEW}"
        ),
    }
}

const OVERVIEW: &str = "\
Remembrances-MCP exposes four tool groups:
  remembrance_* - facts, memory vectors, graph entities/relationships, hybrid search, stats
  kb_*          - knowledge-base documents (chunked and embedded by file path)
  code_*        - project indexing, symbol search and navigation, in-place symbol edits
  last_to_remember / how_to_use - meta tools

Call how_to_use with topic='remembrance', 'kb', or 'code' for detail on a group.";

const REMEMBRANCE_GROUP: &str = "\
remembrance_save_fact(user_id?, key, value) - upsert a fact
remembrance_get_fact(user_id?, key) - read a fact's value
remembrance_list_facts(user_id?) - list facts in scope
remembrance_delete_fact(user_id?, key) - remove a fact
remembrance_add_vector(user_id?, content, metadata?) - embed and store text
remembrance_search_vectors(query, user_id?, limit?) - semantic search over vectors
remembrance_update_vector(id, content?, metadata?) - edit a vector's content/metadata (no re-embed)
remembrance_delete_vector(id) - remove a vector
remembrance_create_entity(name, labels?, properties?, user_id?) - create a graph node
remembrance_create_relationship(from_entity, to_entity, relationship_type, properties?, user_id?)
remembrance_traverse_graph(start_entity, relationship_type?, depth?) - BFS from an entity
remembrance_get_entity(entity_id_or_name) - look up one entity
remembrance_hybrid_search(query, user_id?, limit?) - merged vector/document/graph/fact search
remembrance_get_stats(user_id?) - per-user counts";

const KB_GROUP: &str = "\
kb_add_document(file_path, content, metadata?) - chunk, embed, and store a document
kb_search_documents(query, limit?) - semantic search over document chunks
kb_get_document(file_path) - fetch all chunks for a path
kb_delete_document(file_path) - remove all chunks for a path";

const CODE_GROUP: &str = "\
code_index_project(project_path, project_name?, languages?) - full pipeline over a directory
code_index_status(job_id?) - poll a job, or the latest one
code_list_projects() - list indexed projects
code_delete_project(project_id) - remove a project and everything under it
code_reindex_file(project_id, file_path) - re-index one file outside a full job
code_get_project_stats(project_id) - file/symbol/chunk counts
code_get_file_symbols(project_id, relative_path, include_body?) - symbols in one file
code_find_symbol(project_id, name_path_pattern, languages?, symbol_types?, limit?)
  - bare name matches anywhere, 'A/B' matches as a suffix, '/A/B' matches from the root,
    a trailing '*' is a prefix wildcard
code_search_symbols_semantic(project_id, query, limit?, languages?, symbol_types?)
code_search_pattern(project_id, pattern, is_regex?, path_prefix?, limit?) - grep the tree
code_find_references(project_id, symbol_id?, symbol_name?, limit?) - substring reference scan
code_hybrid_search(project_id, query, include_chunks?, limit?) - symbols plus chunk bodies
code_replace_symbol(project_id, symbol_id, new_source) - replace on disk, then re-index
code_insert_after_symbol(project_id, symbol_id, new_source)
code_insert_before_symbol(project_id, symbol_id, new_source)
code_delete_symbol(project_id, symbol_id) - delete on disk, then re-index";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_matches_anywhere_in_path() {
        assert!(matches_name_path("UserService/Authenticate", "Authenticate"));
        assert!(matches_name_path("UserService/Authenticate", "UserService"));
        assert!(!matches_name_path("UserService/Authenticate", "Missing"));
    }

    #[test]
    fn suffix_pattern_matches_trailing_segments() {
        assert!(matches_name_path("pkg/UserService/Authenticate", "UserService/Authenticate"));
        assert!(!matches_name_path("pkg/UserService/Authenticate", "pkg/Authenticate"));
    }

    #[test]
    fn anchored_pattern_matches_only_from_root() {
        assert!(matches_name_path("UserService/Authenticate", "/UserService/Authenticate"));
        assert!(!matches_name_path("pkg/UserService/Authenticate", "/UserService/Authenticate"));
    }

    #[test]
    fn trailing_wildcard_is_a_prefix_match_on_last_segment() {
        assert!(matches_name_path("UserService/AuthenticateUser", "Authenticate*"));
        assert!(matches_name_path("UserService/AuthenticateUser", "/UserService/Auth*"));
    }

    #[test]
    fn parses_known_symbol_kinds_case_insensitively() {
        assert_eq!(parse_symbol_kind("Function"), Some(SymbolKind::Function));
        assert_eq!(parse_symbol_kind("STRUCT"), Some(SymbolKind::Struct));
        assert_eq!(parse_symbol_kind("nonsense"), None);
    }
}
