use super::{test_config, CountingProvider, UnreachableStore};
use crate::chunker::Chunker;
use crate::document::Document;
use crate::embeddings::Embedder;
use crate::ingest::Ingestor;
use crate::memory_index::MemoryStore;
use crate::vector_index::{VectorIndexClient, VectorStore};
use crate::KnowledgeBase;
use docent_core::AppError;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn handbook(paragraphs: usize) -> Document {
    let text = (0..paragraphs)
        .map(|i| format!("Section {}: employees accrue vacation days monthly and file expenses quarterly.", i))
        .collect::<Vec<_>>()
        .join("\n");
    Document::from_text("handbook", text).unwrap()
}

fn ingestor_with(provider: Arc<CountingProvider>, store: Arc<dyn VectorStore>) -> Ingestor {
    let config = test_config();
    let embedder = Embedder::new(provider, &config.embedding).unwrap();
    let index = VectorIndexClient::new(
        store,
        config.index.collection.clone(),
        config.retrieval.metric,
        config.embedding.dimensions,
        config.index.retry.clone(),
    );
    Ingestor::new(Chunker::from_config(&config.chunking).unwrap(), embedder, index)
}

#[tokio::test]
async fn reingesting_replaces_previous_chunks() {
    let kb = KnowledgeBase::with_store(&test_config(), Arc::new(MemoryStore::new())).unwrap();

    let first = kb.ingestor.ingest(&handbook(20)).await.unwrap();
    assert!(first.chunks_indexed > 3);
    assert_eq!(first.chunks_replaced, 0);

    let second = kb.ingestor.ingest(&handbook(2)).await.unwrap();
    assert_eq!(second.chunks_replaced, first.chunks_indexed);
    assert_eq!(kb.index().count().await.unwrap(), second.chunks_indexed);

    let docs = kb.index().documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].chunk_count, second.chunks_indexed);
}

#[tokio::test]
async fn failed_reingest_keeps_previous_version() {
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());

    let working = ingestor_with(Arc::new(CountingProvider::new(256)), store.clone());
    let indexed = working.ingest(&handbook(10)).await.unwrap().chunks_indexed;

    let failing_provider = Arc::new(CountingProvider::failing(256));
    let failing = ingestor_with(failing_provider.clone(), store.clone());
    let result = failing.ingest(&handbook(3)).await;

    assert!(matches!(result, Err(AppError::EmbeddingService(_))));
    // One attempt plus one retry
    assert_eq!(failing_provider.calls(), 2);

    // The ten-section version is still the one indexed
    let docs = working.index().documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].document_id, "handbook");
    assert_eq!(docs[0].chunk_count, indexed);
    assert_eq!(working.index().count().await.unwrap(), indexed);

    // A later successful ingest replaces it as usual
    let retried = working.ingest(&handbook(3)).await.unwrap();
    assert_eq!(retried.chunks_replaced, indexed);
}

#[tokio::test]
async fn unreachable_store_surfaces_after_bounded_retries() {
    let store = Arc::new(UnreachableStore::default());
    let ingestor = ingestor_with(Arc::new(CountingProvider::new(256)), store.clone());

    let result = ingestor.ingest(&handbook(2)).await;

    assert!(matches!(result, Err(AppError::IndexUnavailable(_))));
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn blank_chunks_are_skipped() {
    let config = test_config();
    let text = format!("{}{}{}", "a".repeat(200), " ".repeat(500), "b".repeat(200));
    let doc = Document::from_text("padded", text).unwrap();
    let kb = KnowledgeBase::with_store(&config, Arc::new(MemoryStore::new())).unwrap();

    // Windows start every 160 characters; 320..520 and 480..680 are all padding
    let report = kb.ingestor.ingest(&doc).await.unwrap();

    assert_eq!(report.chunks_skipped, 2);
    assert_eq!(kb.index().count().await.unwrap(), report.chunks_indexed);
}

#[tokio::test]
async fn remove_deletes_every_chunk() {
    let kb = KnowledgeBase::with_store(&test_config(), Arc::new(MemoryStore::new())).unwrap();
    let report = kb.ingestor.ingest(&handbook(8)).await.unwrap();

    assert_eq!(kb.ingestor.remove("handbook").await.unwrap(), report.chunks_indexed);
    assert_eq!(kb.ingestor.remove("handbook").await.unwrap(), 0);
    assert_eq!(kb.index().count().await.unwrap(), 0);
}

#[tokio::test]
async fn content_hash_is_reported() {
    let kb = KnowledgeBase::with_store(&test_config(), Arc::new(MemoryStore::new())).unwrap();
    let doc = handbook(1);
    let report = kb.ingestor.ingest(&doc).await.unwrap();
    assert_eq!(report.content_hash, doc.metadata.content_hash);
}
