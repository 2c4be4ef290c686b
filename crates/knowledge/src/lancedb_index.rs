//! LanceDB-backed vector store.
//!
//! One table per collection. Rows carry the chunk payload, the insertion
//! timestamp (for stable tie-breaking) and a fixed-size embedding column.

use crate::types::{DocumentSummary, IndexedChunk, ScoredChunk, VectorRecord};
use crate::vector_index::VectorStore;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use docent_core::{AppError, AppResult, SimilarityMetric};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// LanceDB-backed vector store.
pub struct LanceDbStore {
    conn: Connection,
    dimensions: usize,
    tables: Mutex<HashMap<String, Table>>,
}

impl LanceDbStore {
    /// Connect to (or create) the database directory at `db_path`.
    ///
    /// Tables are opened lazily; an existing table whose embedding width
    /// differs from `dimensions` is rejected on first use.
    pub async fn open(db_path: &Path, dimensions: usize) -> AppResult<Self> {
        std::fs::create_dir_all(db_path).map_err(|e| {
            AppError::IndexUnavailable(format!(
                "Failed to create index directory {:?}: {}",
                db_path, e
            ))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri).execute().await.map_err(|e| {
            AppError::IndexUnavailable(format!("Failed to connect to LanceDB at {}: {}", uri, e))
        })?;

        tracing::debug!("Connected to LanceDB at {:?}", db_path);

        Ok(Self {
            conn,
            dimensions,
            tables: Mutex::new(HashMap::new()),
        })
    }

    fn create_schema(dimensions: usize) -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("start", DataType::UInt64, false),
            Field::new("end", DataType::UInt64, false),
            Field::new("text", DataType::Utf8, false),
            // Microseconds since the Unix epoch
            Field::new("inserted_at", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimensions as i32,
                ),
                false,
            ),
        ]))
    }

    /// Open or create the table backing `collection`.
    async fn table(&self, collection: &str) -> AppResult<Table> {
        let mut tables = self.tables.lock().await;
        if let Some(table) = tables.get(collection) {
            return Ok(table.clone());
        }

        let names = self
            .conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to list tables: {}", e)))?;

        let table = if names.iter().any(|n| n == collection) {
            let table = self
                .conn
                .open_table(collection)
                .execute()
                .await
                .map_err(|e| {
                    AppError::IndexUnavailable(format!("Failed to open table {}: {}", collection, e))
                })?;
            let schema = table.schema().await.map_err(|e| {
                AppError::IndexUnavailable(format!("Failed to read schema of {}: {}", collection, e))
            })?;
            self.check_schema(collection, &schema)?;
            table
        } else {
            tracing::info!(
                "Creating LanceDB table '{}' ({} dimensions)",
                collection,
                self.dimensions
            );
            self.conn
                .create_empty_table(collection, Self::create_schema(self.dimensions))
                .execute()
                .await
                .map_err(|e| {
                    AppError::IndexUnavailable(format!(
                        "Failed to create table {}: {}",
                        collection, e
                    ))
                })?
        };

        tables.insert(collection.to_string(), table.clone());
        Ok(table)
    }

    fn check_schema(&self, collection: &str, schema: &Schema) -> AppResult<()> {
        let field = schema.field_with_name("embedding").map_err(|_| {
            AppError::Config(format!("Table {} has no embedding column", collection))
        })?;

        match field.data_type() {
            DataType::FixedSizeList(_, width) if *width as usize == self.dimensions => Ok(()),
            DataType::FixedSizeList(_, width) => Err(AppError::Config(format!(
                "Table {} stores {}-dimensional embeddings, configured for {}",
                collection, width, self.dimensions
            ))),
            other => Err(AppError::Config(format!(
                "Table {} has unexpected embedding type {:?}",
                collection, other
            ))),
        }
    }

    fn records_to_batch(&self, records: &[VectorRecord]) -> AppResult<RecordBatch> {
        let inserted_at = chrono::Utc::now().timestamp_micros();
        let chunks = || records.iter().map(|r| &r.chunk);

        let ids = StringArray::from_iter_values(chunks().map(|c| c.chunk_id.as_str()));
        let document_ids = StringArray::from_iter_values(chunks().map(|c| c.document_id.as_str()));
        let chunk_indexes = UInt32Array::from_iter_values(chunks().map(|c| c.chunk_index));
        let starts = UInt64Array::from_iter_values(chunks().map(|c| c.start as u64));
        let ends = UInt64Array::from_iter_values(chunks().map(|c| c.end as u64));
        let texts = StringArray::from_iter_values(chunks().map(|c| c.text.as_str()));
        let inserted = Int64Array::from(vec![inserted_at; records.len()]);

        let values =
            Float32Array::from_iter_values(records.iter().flat_map(|r| r.vector.iter().copied()));
        let embeddings = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimensions as i32,
            Arc::new(values),
            None,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to build embedding column: {}", e)))?;

        RecordBatch::try_new(
            Self::create_schema(self.dimensions),
            vec![
                Arc::new(ids),
                Arc::new(document_ids),
                Arc::new(chunk_indexes),
                Arc::new(starts),
                Arc::new(ends),
                Arc::new(texts),
                Arc::new(inserted),
                Arc::new(embeddings),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create RecordBatch: {}", e)))
    }

    async fn count_document(&self, table: &Table, document_id: &str) -> AppResult<usize> {
        table
            .count_rows(Some(document_filter(document_id)))
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to count rows: {}", e)))
    }
}

fn document_filter(document_id: &str) -> String {
    format!("document_id = '{}'", document_id.replace('\'', "''"))
}

fn distance_type(metric: SimilarityMetric) -> DistanceType {
    match metric {
        SimilarityMetric::Cosine => DistanceType::Cosine,
        SimilarityMetric::Dot => DistanceType::Dot,
        SimilarityMetric::Euclidean => DistanceType::L2,
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| AppError::Knowledge(format!("Invalid {} column", name)))
}

/// A decoded search row before ranking.
struct Hit {
    chunk: IndexedChunk,
    score: f32,
    inserted_at: i64,
}

fn decode_hits(batch: &RecordBatch, query: &[f32], metric: SimilarityMetric) -> AppResult<Vec<Hit>> {
    let ids = column::<StringArray>(batch, "id")?;
    let document_ids = column::<StringArray>(batch, "document_id")?;
    let chunk_indexes = column::<UInt32Array>(batch, "chunk_index")?;
    let starts = column::<UInt64Array>(batch, "start")?;
    let ends = column::<UInt64Array>(batch, "end")?;
    let texts = column::<StringArray>(batch, "text")?;
    let inserted = column::<Int64Array>(batch, "inserted_at")?;
    let embeddings = column::<FixedSizeListArray>(batch, "embedding")?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let embedding_ref = embeddings.value(row);
        let embedding = embedding_ref
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AppError::Knowledge("Invalid embedding values".to_string()))?;

        hits.push(Hit {
            chunk: IndexedChunk {
                chunk_id: ids.value(row).to_string(),
                document_id: document_ids.value(row).to_string(),
                chunk_index: chunk_indexes.value(row),
                start: starts.value(row) as usize,
                end: ends.value(row) as usize,
                text: texts.value(row).to_string(),
            },
            score: metric.score(query, embedding.values()),
            inserted_at: inserted.value(row),
        });
    }

    Ok(hits)
}

#[async_trait::async_trait]
impl VectorStore for LanceDbStore {
    fn backend_name(&self) -> &str {
        "lancedb"
    }

    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: Vec<VectorRecord>,
    ) -> AppResult<usize> {
        let table = self.table(collection).await?;
        let previous = self.count_document(&table, document_id).await?;

        if records.is_empty() {
            if previous > 0 {
                table
                    .delete(&document_filter(document_id))
                    .await
                    .map_err(|e| {
                        AppError::IndexUnavailable(format!("Failed to delete rows: {}", e))
                    })?;
            }
            return Ok(previous);
        }

        let batch = self.records_to_batch(&records)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        // Upsert by chunk id and drop the document's leftover rows in one commit
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all()
            .when_not_matched_by_source_delete(Some(document_filter(document_id)));
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to merge chunks: {}", e)))?;

        tracing::debug!(
            "Merged {} rows for {} into LanceDB table '{}'",
            records.len(),
            document_id,
            collection
        );

        Ok(previous)
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> AppResult<usize> {
        let table = self.table(collection).await?;
        let previous = self.count_document(&table, document_id).await?;

        if previous > 0 {
            table
                .delete(&document_filter(document_id))
                .await
                .map_err(|e| AppError::IndexUnavailable(format!("Failed to delete rows: {}", e)))?;
        }

        Ok(previous)
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        metric: SimilarityMetric,
    ) -> AppResult<Vec<ScoredChunk>> {
        let table = self.table(collection).await?;

        let batches: Vec<RecordBatch> = table
            .query()
            .nearest_to(vector)
            .map_err(|e| AppError::Knowledge(format!("Failed to create query: {}", e)))?
            .distance_type(distance_type(metric))
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to collect results: {}", e)))?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(decode_hits(batch, vector, metric)?);
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.inserted_at.cmp(&b.inserted_at))
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .map(|hit| ScoredChunk {
                chunk: hit.chunk,
                score: hit.score,
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> AppResult<usize> {
        let table = self.table(collection).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to count rows: {}", e)))
    }

    async fn documents(&self, collection: &str) -> AppResult<Vec<DocumentSummary>> {
        let table = self.table(collection).await?;

        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::Columns(vec!["document_id".to_string()]))
            .execute()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to scan table: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to collect rows: {}", e)))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for batch in &batches {
            let document_ids = column::<StringArray>(batch, "document_id")?;
            for row in 0..document_ids.len() {
                *counts.entry(document_ids.value(row).to_string()).or_insert(0) += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(document_id, chunk_count)| DocumentSummary {
                document_id,
                chunk_count,
            })
            .collect())
    }
}
