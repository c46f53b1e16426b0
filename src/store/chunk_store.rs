//! 分块存储接口
//!
//! 生产环境由 `AstraClient` 实现；未配置 AstraDB 或测试时使用内存实现。

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AppResult;
use crate::models::{DocumentChunk, MetadataFilter, ScoredChunk};

/// 分块存储能力
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// 按向量相似度排序检索，结果按相似度降序
    async fn vector_search(
        &self,
        filter: &MetadataFilter,
        vector: &[f32],
        limit: usize,
    ) -> AppResult<Vec<ScoredChunk>>;

    /// 读取满足过滤条件的全部分块（不含向量）
    async fn find_all(&self, filter: &MetadataFilter) -> AppResult<Vec<DocumentChunk>>;

    /// 批量写入，返回写入数量
    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> AppResult<usize>;

    /// 删除某文档的全部分块，返回删除数量
    async fn delete_document(&self, document_id: &str) -> AppResult<u64>;
}

/// 内存分块存储
#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<Vec<DocumentChunk>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunks(chunks: Vec<DocumentChunk>) -> Self {
        Self {
            chunks: RwLock::new(chunks),
        }
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }
}

/// 余弦相似度映射到 [0, 1]，与 AstraDB cosine 度量的 `$similarity` 一致
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    Some((1.0 + cosine) / 2.0)
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn vector_search(
        &self,
        filter: &MetadataFilter,
        vector: &[f32],
        limit: usize,
    ) -> AppResult<Vec<ScoredChunk>> {
        let chunks = self.chunks.read().await;

        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|chunk| filter.matches(chunk))
            .filter_map(|chunk| {
                cosine_similarity(&chunk.vector, vector).map(|similarity| ScoredChunk {
                    chunk: DocumentChunk {
                        vector: Vec::new(),
                        ..chunk.clone()
                    },
                    similarity: Some(similarity),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        debug!("内存向量检索命中 {} 条", scored.len());
        Ok(scored)
    }

    async fn find_all(&self, filter: &MetadataFilter) -> AppResult<Vec<DocumentChunk>> {
        let chunks = self.chunks.read().await;
        Ok(chunks
            .iter()
            .filter(|chunk| filter.matches(chunk))
            .map(|chunk| DocumentChunk {
                vector: Vec::new(),
                ..chunk.clone()
            })
            .collect())
    }

    async fn insert_chunks(&self, new_chunks: Vec<DocumentChunk>) -> AppResult<usize> {
        let count = new_chunks.len();
        self.chunks.write().await.extend(new_chunks);
        Ok(count)
    }

    async fn delete_document(&self, document_id: &str) -> AppResult<u64> {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|chunk| chunk.document_id != document_id);
        Ok((before - chunks.len()) as u64)
    }
}
