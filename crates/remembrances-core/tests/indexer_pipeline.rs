//! End-to-end coverage of the Indexer pipeline (spec.md §4.8, §8 scenarios
//! 6 and 7): a real `MemoryStore` against an in-memory SurrealDB instance,
//! a deterministic fake embedder standing in for a GGUF/HTTP provider, and
//! a synthetic Go source file on disk.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use remembrances_core::indexer::{Indexer, IndexerConfig};
use remembrances_search::embeddings::{EmbedderFactory, EmbeddingProvider, EmbeddingProviderKind};
use remembrances_search::error::{Result as SearchResult, SearchError};
use remembrances_storage::{ConnectConfig, IndexingStatus, JobStatus, MemoryStore, SchemaManager, StorageDriver};

const DIM: usize = 8;

/// Deterministic embedder: hashes the input text to a fixed-dimension
/// vector, so repeated runs over the same source produce the same
/// embeddings without any real model. When `fail_every` is set, every
/// Nth call to `embed_documents` returns `None` at that position instead
/// of a vector, exercising the "never abort the whole batch" contract
/// (spec.md §4.1).
struct FakeProvider {
    fail_every: Option<usize>,
    calls: AtomicUsize,
}

impl FakeProvider {
    fn new() -> Self {
        Self {
            fail_every: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_every(n: usize) -> Self {
        Self {
            fail_every: Some(n),
            calls: AtomicUsize::new(0),
        }
    }

    fn hash_embed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for (i, byte) in text.bytes().enumerate() {
            v[i % DIM] += byte as f32;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    async fn embed_query(&self, text: &str) -> SearchResult<Vec<f32>> {
        if text.is_empty() {
            return Err(SearchError::EmptyText);
        }
        Ok(Self::hash_embed(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> SearchResult<Vec<Option<Vec<f32>>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let call_index = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            match self.fail_every {
                Some(n) if call_index % n == 0 => out.push(None),
                _ => out.push(Some(Self::hash_embed(text))),
            }
        }
        if out.iter().all(Option::is_none) {
            return Err(SearchError::BatchFailed { count: out.len() });
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn max_chars(&self) -> usize {
        900
    }

    fn max_tokens(&self) -> usize {
        450
    }

    fn chars_per_token(&self) -> usize {
        2
    }

    fn kind(&self) -> EmbeddingProviderKind {
        EmbeddingProviderKind::Gguf
    }

    async fn close(&self) -> SearchResult<()> {
        Ok(())
    }
}

async fn test_store() -> MemoryStore {
    let driver = StorageDriver::connect(&ConnectConfig::default()).await.unwrap();
    SchemaManager::migrate(&driver).await.unwrap();
    MemoryStore::new(driver)
}

fn indexer_with(store: MemoryStore, provider: FakeProvider) -> Indexer {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(provider);
    let embedders = Arc::new(EmbedderFactory::from_providers(provider.clone(), provider));
    Indexer::new(store, embedders, IndexerConfig::default())
}

const USER_SERVICE_GO: &str = r#"package users

type UserService struct {
	db string
}

func (s *UserService) Authenticate(token string) bool {
	return token != ""
}
"#;

/// spec.md §8 scenario 6: "Code indexing happy path".
#[tokio::test]
async fn indexes_go_file_and_nests_method_under_its_receiver() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("user.go"), USER_SERVICE_GO).unwrap();

    let store = test_store().await;
    let indexer = indexer_with(store.clone(), FakeProvider::new());

    let job = indexer
        .index_project(dir.path(), "users-service", None)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.files_indexed, 1);

    let project = store.get_project(&job.project_id).await.unwrap().unwrap();
    assert_eq!(project.indexing_status, IndexingStatus::Completed);

    let projects = store.list_projects().await.unwrap();
    assert!(projects
        .iter()
        .any(|p| p.project_id == project.project_id && p.indexing_status == IndexingStatus::Completed));

    let symbols = store
        .list_symbols_for_file(&project.project_id, "user.go")
        .await
        .unwrap();
    let name_paths: Vec<_> = symbols.iter().map(|s| s.name_path.as_str()).collect();
    assert!(name_paths.contains(&"UserService"));
    assert!(name_paths.contains(&"UserService/Authenticate"));

    let service = symbols.iter().find(|s| s.name_path == "UserService").unwrap();
    let authenticate = symbols
        .iter()
        .find(|s| s.name_path == "UserService/Authenticate")
        .unwrap();
    assert_eq!(authenticate.parent_id.as_deref(), Some(service.id.as_str()));

    let hits = store
        .search_symbols(&project.project_id, &FakeProvider::hash_embed("user authentication"), 3)
        .await
        .unwrap();
    assert!(hits.iter().any(|h| h.content.contains("Authenticate")));
}

/// Builds a Go file with `total` top-level functions, none sharing a
/// receiver, so every function becomes its own independent symbol —
/// the shape needed to exercise per-symbol embedding failures in
/// isolation from the receiver-nesting behavior above.
fn many_functions_go(total: usize) -> String {
    let mut src = String::from("package batch\n\n");
    for i in 0..total {
        src.push_str(&format!("func Fn{i}() int {{\n\treturn {i}\n}}\n\n"));
    }
    src
}

/// spec.md §8 scenario 7: "Partial embedding failure".
#[tokio::test]
async fn partial_embedding_failure_still_completes_the_job() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("batch.go"), many_functions_go(20)).unwrap();

    let store = test_store().await;
    let indexer = indexer_with(store.clone(), FakeProvider::failing_every(5));

    let job = indexer.index_project(dir.path(), "batch-project", None).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let project = store.get_project(&job.project_id).await.unwrap().unwrap();
    let symbols = store
        .list_symbols_for_file(&project.project_id, "batch.go")
        .await
        .unwrap();
    assert_eq!(symbols.len(), 20);

    let embedded = symbols.iter().filter(|s| s.embedding.is_some()).count();
    let missing = symbols.len() - embedded;
    assert_eq!(missing, 4);
    assert_eq!(embedded, 16);
}

/// Re-running over unchanged content is a no-op: the merkle hash matches
/// and the file is skipped (spec.md §4.9 "incremental re-indexing").
#[tokio::test]
async fn reindexing_unchanged_project_skips_every_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("user.go"), USER_SERVICE_GO).unwrap();

    let store = test_store().await;
    let indexer = indexer_with(store.clone(), FakeProvider::new());

    let first = indexer.index_project(dir.path(), "users-service", None).await.unwrap();
    assert_eq!(first.files_indexed, 1);

    let second = indexer.index_project(dir.path(), "users-service", None).await.unwrap();
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(second.files_indexed, 0);
}
