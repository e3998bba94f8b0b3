//! LanceDB Vector Store - 디스크 영속 벡터 검색
//!
//! 코사인 거리로 검색하며 `_distance` 컬럼 값을 그대로 반환합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use crate::error::{RagError, Result};

use super::vector::{
    sort_chunks, sort_hits, Chunk, ChunkMetadata, DistanceHit, VectorEntry, VectorStore,
};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunks";

fn lance_err<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> RagError {
    move |e| RagError::VectorStore(format!("{}: {}", context, e))
}

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 임베딩 차원은 인덱스마다 고정이며 매니페스트에 기록된 값으로 엽니다.
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        let dimension = i32::try_from(dimension)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                RagError::InvalidConfig(format!("invalid embedding dimension: {}", dimension))
            })?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::VectorStore(format!("Invalid path encoding: {:?}", path)))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(lance_err("Failed to connect to LanceDB"))?;

        Ok(Self { db, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("page", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != self.dimension())
        {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension(),
                actual: bad.embedding.len(),
            });
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let sources: Vec<&str> = entries
            .iter()
            .map(|e| e.chunk.metadata.source.as_str())
            .collect();
        let pages: Vec<u32> = entries.iter().map(|e| e.chunk.metadata.page).collect();
        let chunk_indices: Vec<u32> = entries
            .iter()
            .map(|e| e.chunk.metadata.chunk_index)
            .collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(lance_err("Failed to create embedding array"))?;

        RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(UInt32Array::from(pages)),
                Arc::new(UInt32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings_list),
            ],
        )
        .map_err(lance_err("Failed to create RecordBatch"))
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(lance_err("Failed to list tables"))?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<Option<lancedb::table::Table>> {
        if !self.table_exists().await? {
            return Ok(None);
        }
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(lance_err("Failed to open table"))?;
        Ok(Some(table))
    }
}

/// RecordBatch에서 청크 컬럼 읽기
fn batch_chunks(batch: &RecordBatch) -> Result<Vec<(String, Chunk)>> {
    let ids = string_column(batch, "id")?;
    let sources = string_column(batch, "source")?;
    let texts = string_column(batch, "text")?;
    let pages = u32_column(batch, "page")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;

    Ok((0..batch.num_rows())
        .map(|i| {
            (
                ids.value(i).to_string(),
                Chunk {
                    text: texts.value(i).to_string(),
                    metadata: ChunkMetadata {
                        source: sources.value(i).to_string(),
                        page: pages.value(i),
                        chunk_index: chunk_indices.value(i),
                    },
                },
            )
        })
        .collect())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::VectorStore(format!("Missing {} column", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| RagError::VectorStore(format!("Missing {} column", name)))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table().await? {
            Some(table) => {
                // 기존 테이블에 추가
                table
                    .add(batches)
                    .execute()
                    .await
                    .map_err(lance_err("Failed to add vectors to table"))?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .map_err(lance_err("Failed to create table"))?;
            }
        }

        tracing::debug!("Inserted {} vectors", entries.len());
        Ok(entries.len())
    }

    async fn similarity_search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<DistanceHit>> {
        if query_embedding.len() != self.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension(),
                actual: query_embedding.len(),
            });
        }
        if k == 0 {
            return Ok(vec![]);
        }

        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let stream = table
            .vector_search(query_embedding.to_vec())
            .map_err(lance_err("Failed to create vector search"))?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(lance_err("Failed to execute vector search"))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(lance_err("Failed to read search results"))?;

        let mut hits = Vec::new();
        for batch in &batches {
            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| RagError::VectorStore("Missing _distance column".into()))?;

            for (i, (id, chunk)) in batch_chunks(batch)?.into_iter().enumerate() {
                hits.push(DistanceHit {
                    id,
                    chunk,
                    distance: distances.value(i),
                });
            }
        }

        sort_hits(&mut hits);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        match self.open_table().await? {
            Some(table) => table
                .count_rows(None)
                .await
                .map_err(lance_err("Failed to count rows")),
            None => Ok(0),
        }
    }

    async fn get_all(&self) -> Result<Vec<Chunk>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let total = table
            .count_rows(None)
            .await
            .map_err(lance_err("Failed to count rows"))?;
        if total == 0 {
            return Ok(vec![]);
        }

        let batches: Vec<RecordBatch> = table
            .query()
            .limit(total)
            .execute()
            .await
            .map_err(lance_err("Failed to scan table"))?
            .try_collect()
            .await
            .map_err(lance_err("Failed to read rows"))?;

        let mut chunks = Vec::with_capacity(total);
        for batch in &batches {
            chunks.extend(batch_chunks(batch)?.into_iter().map(|(_, chunk)| chunk));
        }

        sort_chunks(&mut chunks);
        Ok(chunks)
    }
}

// ============================================================================
// Tests
// ============================================================================
