//! 文档入库流程 - 流程层
//!
//! 流程顺序：
//! 1. 读取文本（请求体或存储目录中的文件）
//! 2. 按空行切分段落
//! 3. 批量向量化
//! 4. 删除旧分块，写入新分块
//! 5. 登记文档记录

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::clients::Embedder;
use crate::error::{AppError, FileError};
use crate::models::{ChunkMetadata, DocumentChunk, DocumentRecord};
use crate::store::{ChunkStore, DocumentRepo};

/// 入库请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestRequest {
    pub document_id: Option<String>,
    pub file_key: Option<String>,
    /// 直接提交的正文，优先于 fileKey
    pub text: Option<String>,
    pub metadata: ChunkMetadata,
}

/// 入库失败原因
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("没有可提取的文本")]
    NoText,
    #[error("读取文件失败: {0}")]
    File(#[source] AppError),
    #[error("向量化失败: {0}")]
    Embedding(#[source] AppError),
    #[error("分块写入失败: {0}")]
    Storage(#[source] AppError),
}

/// 入库结果
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_count: usize,
}

/// 按空行切分，去掉首尾空白和空段
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs.retain(|p| !p.is_empty());
    paragraphs
}

/// 解析存储目录下的相对路径，拒绝绝对路径和 `..`
pub fn resolve_storage_path(storage_dir: &Path, file_key: &str) -> Result<PathBuf, AppError> {
    let relative = Path::new(file_key);
    let safe = !file_key.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

    if !safe {
        return Err(AppError::File(FileError::InvalidPath {
            path: file_key.to_string(),
        }));
    }
    Ok(storage_dir.join(relative))
}

/// 分块元数据：在原始元数据上补充作者、来源、年级
pub fn enrich_metadata(metadata: &ChunkMetadata) -> ChunkMetadata {
    let professor = metadata.get_str("professorName").unwrap_or("").to_string();
    let topic = metadata.get_str("topic").unwrap_or("");
    let course = metadata
        .get_str("course")
        .or_else(|| metadata.get_str("courseCode"))
        .unwrap_or("");
    let level = metadata.get_str("level").unwrap_or("").to_string();

    let mut enriched = metadata.clone();
    enriched.insert("author", professor.clone());
    enriched.insert("source", format!("{}'s notes", professor));
    enriched.insert(
        "fullSource",
        format!("{}'s notes on {} ({})", professor, topic, course),
    );
    enriched.insert("level", level);
    enriched
}

fn build_chunks(
    document_id: &str,
    paragraphs: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    metadata: &ChunkMetadata,
    now: DateTime<Utc>,
) -> Vec<DocumentChunk> {
    let millis = now.timestamp_millis();
    let created_at = now.to_rfc3339();

    paragraphs
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(index, (text, vector))| DocumentChunk {
            id: format!("{}_{}_chunk_{}", document_id, millis, index),
            document_id: document_id.to_string(),
            chunk_index: index,
            chunk_text: text,
            vector,
            created_at: Some(created_at.clone()),
            metadata: metadata.clone(),
        })
        .collect()
}

/// 入库流程
pub struct IngestFlow {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    documents: DocumentRepo,
    storage_dir: PathBuf,
}

impl IngestFlow {
    /// 创建新的入库流程
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        documents: DocumentRepo,
        storage_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            embedder,
            documents,
            storage_dir,
        }
    }

    async fn load_text(&self, request: &IngestRequest) -> Result<String, IngestError> {
        if let Some(text) = request.text.as_deref() {
            return Ok(text.to_string());
        }

        let file_key = request.file_key.as_deref().unwrap_or("");
        let path = resolve_storage_path(&self.storage_dir, file_key).map_err(IngestError::File)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(IngestError::File(AppError::File(FileError::NotFound {
                path: file_key.to_string(),
            })));
        }

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| IngestError::File(AppError::file_read_failed(path.display().to_string(), e)))
    }

    pub async fn run(&self, document_id: &str, request: &IngestRequest) -> Result<IngestReport, IngestError> {
        info!("📄 开始处理文档 {}", document_id);

        let text = self.load_text(request).await?;
        let paragraphs = split_paragraphs(&text);
        if paragraphs.is_empty() {
            warn!("⚠️ 文档 {} 没有可提取的文本", document_id);
            return Err(IngestError::NoText);
        }
        info!("✓ 切分为 {} 个段落", paragraphs.len());

        let embeddings = self
            .embedder
            .embed(&paragraphs)
            .await
            .map_err(IngestError::Embedding)?;

        let removed = self
            .store
            .delete_document(document_id)
            .await
            .map_err(IngestError::Storage)?;
        if removed > 0 {
            info!("🗑️ 已删除文档 {} 的 {} 个旧分块", document_id, removed);
        }

        let metadata = enrich_metadata(&request.metadata);
        let now = Utc::now();
        let chunks = build_chunks(document_id, paragraphs, embeddings, &metadata, now);
        let chunks_count = chunks.len();
        self.store
            .insert_chunks(chunks)
            .await
            .map_err(IngestError::Storage)?;

        let raw = &request.metadata;
        let owned = |key: &str| raw.get_str(key).map(str::to_string);
        self.documents
            .upsert(&DocumentRecord {
                document_id: document_id.to_string(),
                title: owned("title"),
                file_name: request.file_key.clone(),
                course_code: owned("courseCode"),
                course_title: owned("courseTitle"),
                professor_name: owned("professorName"),
                topic: owned("topic"),
                level: owned("level"),
                chunks_count,
                uploaded_at: now,
            })
            .await
            .map_err(IngestError::Storage)?;

        info!("✅ 文档 {} 入库完成，共 {} 个分块", document_id, chunks_count);
        Ok(IngestReport {
            document_id: document_id.to_string(),
            chunks_count,
        })
    }

    /// 删除文档记录及其全部分块，返回删除的分块数量
    pub async fn remove(&self, document_id: &str) -> Result<u64, IngestError> {
        self.documents
            .remove(document_id)
            .await
            .map_err(IngestError::Storage)?;
        let removed = self
            .store
            .delete_document(document_id)
            .await
            .map_err(IngestError::Storage)?;
        info!("🗑️ 已删除文档 {}（{} 个分块）", document_id, removed);
        Ok(removed)
    }
}
