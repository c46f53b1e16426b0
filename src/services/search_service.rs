/// 文档检索服务
///
/// 负责把查询转成向量、按元数据过滤检索分块，并在向量检索不可用时退回文本匹配
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clients::Embedder;
use crate::models::{ChunkMetadata, DocumentChunk, MetadataFilter, ScoredChunk};
use crate::store::ChunkStore;
use crate::utils::truncate_text;

const DEFAULT_MAX_CHUNKS: usize = 5;

/// 检索请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    /// 最近几轮对话内容，目前只记录日志，不参与向量计算
    pub context: Option<String>,
    pub filters: SearchFilters,
}

/// 检索过滤条件
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub author: Option<String>,
    pub topic: Option<String>,
    pub level: Option<String>,
    pub max_chunks: Option<usize>,
    pub min_relevance: Option<f64>,
    pub source_filters: SourceFilters,
    pub course_filters: CourseFilters,
}

/// 来源提示：只在硬过滤未设置对应字段时生效
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceFilters {
    pub author: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub topic: Option<String>,
}

impl SourceFilters {
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.doc_type.is_none() && self.topic.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourseFilters {
    #[serde(rename = "courseCode")]
    pub course_code: Option<String>,
    pub level: Option<String>,
}

/// 检索方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseInfo {
    pub code: Option<String>,
    pub title: Option<String>,
}

/// 附加在每个分块上的上下文摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkContext {
    pub section: String,
    pub topic_area: String,
    pub document_type: String,
    pub course_info: CourseInfo,
    pub professor: Option<String>,
    pub date: Option<String>,
    pub related_concepts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitMetadata {
    /// 分块原始元数据
    #[serde(flatten)]
    pub fields: ChunkMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    pub context: ChunkContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk_text: String,
    pub metadata: HitMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub course: CourseInfo,
    pub professor: Option<String>,
    pub document_type: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedResult {
    pub source_info: SourceInfo,
    pub chunks: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchSummary {
    /// 分组键，按首次出现顺序
    pub sources: Vec<String>,
    pub topic_areas: Vec<String>,
    pub document_types: Vec<String>,
}

/// 检索响应
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub chunks: Vec<SearchHit>,
    pub grouped_results: BTreeMap<String, GroupedResult>,
    pub total: usize,
    pub query: String,
    pub search_mode: SearchMode,
    pub metadata: SearchSummary,
}

/// 检索服务
pub struct SearchService {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
}

impl SearchService {
    /// 创建新的检索服务
    pub fn new(store: Arc<dyn ChunkStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// 执行检索
    ///
    /// 向量检索失败或结果为空时退回文本匹配
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let filters = &request.filters;
        let limit = filters.max_chunks.unwrap_or(DEFAULT_MAX_CHUNKS);
        let hard_filter = hard_filter(filters);

        info!(
            "🔍 检索: '{}' (limit={}, 过滤条件={:?})",
            truncate_text(&request.query, 60),
            limit,
            hard_filter.0
        );
        if let Some(context) = request.context.as_deref().filter(|c| !c.is_empty()) {
            debug!("对话上下文: {}", truncate_text(context, 100));
        }

        let vector_hits = match self.vector_search(request, &hard_filter, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("⚠️ 向量检索失败，改用文本匹配: {:#}", e);
                Vec::new()
            }
        };

        if !vector_hits.is_empty() {
            return Ok(shape_response(&request.query, vector_hits, SearchMode::Vector));
        }

        let text_hits = self
            .text_search(&request.query, &hard_filter, limit)
            .await
            .context("文本匹配检索失败")?;
        info!("📝 文本匹配命中 {} 条", text_hits.len());
        Ok(shape_response(&request.query, text_hits, SearchMode::Text))
    }

    async fn vector_search(
        &self,
        request: &SearchRequest,
        hard_filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = self
            .embedder
            .embed_one(&request.query)
            .await
            .context("查询向量化失败")?;

        let (hinted_filter, hints_applied) =
            apply_source_hints(hard_filter, &request.filters.source_filters);

        let mut hits = self
            .store
            .vector_search(&hinted_filter, &vector, limit)
            .await
            .context("向量检索失败")?;

        if hits.is_empty() && hints_applied {
            debug!("来源提示过滤后无结果，仅按硬过滤条件重试");
            hits = self
                .store
                .vector_search(hard_filter, &vector, limit)
                .await
                .context("向量检索失败")?;
        }

        if let Some(min) = request.filters.min_relevance {
            let before = hits.len();
            hits.retain(|hit| hit.similarity.map_or(true, |s| s >= min));
            debug!("相关度阈值 {} 过滤: {} -> {}", min, before, hits.len());
        }

        info!("✓ 向量检索命中 {} 条", hits.len());
        Ok(hits)
    }

    async fn text_search(
        &self,
        query: &str,
        hard_filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let needle = query.to_lowercase();
        let chunks = self.store.find_all(hard_filter).await?;

        Ok(chunks
            .into_iter()
            .filter(|chunk| chunk.chunk_text.to_lowercase().contains(&needle))
            .take(limit)
            .map(|chunk| ScoredChunk {
                chunk,
                similarity: None,
            })
            .collect())
    }
}

/// 硬过滤条件：顶层 level 优先于 course_filters.level
pub fn hard_filter(filters: &SearchFilters) -> MetadataFilter {
    let mut filter = MetadataFilter::new();

    let pairs = [
        ("metadata.professorName", filters.author.as_deref()),
        ("metadata.topic", filters.topic.as_deref()),
        ("metadata.courseCode", filters.course_filters.course_code.as_deref()),
        (
            "metadata.level",
            filters
                .level
                .as_deref()
                .or(filters.course_filters.level.as_deref()),
        ),
    ];
    for (key, value) in pairs {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            filter.set(key, value);
        }
    }

    filter
}

/// 叠加来源提示，返回新过滤条件以及是否有提示生效
pub fn apply_source_hints(hard: &MetadataFilter, hints: &SourceFilters) -> (MetadataFilter, bool) {
    let mut filter = hard.clone();
    let mut applied = false;

    let pairs = [
        ("metadata.professorName", hints.author.as_deref()),
        ("metadata.type", hints.doc_type.as_deref()),
        ("metadata.topic", hints.topic.as_deref()),
    ];
    for (key, value) in pairs {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            applied |= filter.set_if_absent(key, value);
        }
    }

    (filter, applied)
}

fn chunk_context(metadata: &ChunkMetadata) -> ChunkContext {
    let owned = |key: &str| metadata.get_str(key).map(str::to_string);
    ChunkContext {
        section: owned("section").unwrap_or_else(|| "main".to_string()),
        topic_area: owned("topic").unwrap_or_else(|| "general".to_string()),
        document_type: owned("type").unwrap_or_else(|| "unknown".to_string()),
        course_info: CourseInfo {
            code: owned("courseCode"),
            title: owned("courseTitle"),
        },
        professor: owned("professorName"),
        date: owned("date"),
        related_concepts: metadata.get_str_list("relatedConcepts"),
    }
}

fn to_hit(scored: ScoredChunk) -> SearchHit {
    let DocumentChunk {
        chunk_text,
        mut metadata,
        ..
    } = scored.chunk;

    let context = chunk_context(&metadata);
    metadata.0.remove("relevance_score");
    metadata.0.remove("context");

    SearchHit {
        chunk_text,
        metadata: HitMetadata {
            fields: metadata,
            relevance_score: scored.similarity,
            context,
        },
    }
}

fn push_distinct(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// 组装响应：每个分块恰好属于一个分组，顺序保持检索顺序
fn shape_response(query: &str, scored: Vec<ScoredChunk>, mode: SearchMode) -> SearchResponse {
    let chunks: Vec<SearchHit> = scored.into_iter().map(to_hit).collect();

    let mut grouped_results: BTreeMap<String, GroupedResult> = BTreeMap::new();
    let mut summary = SearchSummary::default();

    for hit in &chunks {
        let context = &hit.metadata.context;
        let key = format!(
            "{} - {}",
            context.course_info.code.as_deref().unwrap_or(""),
            context.professor.as_deref().unwrap_or("Unknown")
        );

        push_distinct(&mut summary.sources, &key);
        push_distinct(&mut summary.topic_areas, &context.topic_area);
        push_distinct(&mut summary.document_types, &context.document_type);

        grouped_results
            .entry(key)
            .or_insert_with(|| GroupedResult {
                source_info: SourceInfo {
                    course: context.course_info.clone(),
                    professor: context.professor.clone(),
                    document_type: context.document_type.clone(),
                    date: context.date.clone(),
                },
                chunks: Vec::new(),
            })
            .chunks
            .push(hit.clone());
    }

    SearchResponse {
        total: chunks.len(),
        chunks,
        grouped_results,
        query: query.to_string(),
        search_mode: mode,
        metadata: summary,
    }
}

impl SearchHit {
    /// 读取原始元数据中的字符串字段
    pub fn field(&self, key: &str) -> Option<&str> {
        self.metadata.fields.get_str(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::store::InMemoryChunkStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// 按关键词生成二维向量：含 "buffer" 的文本靠近 [1, 0]
    struct KeywordEmbedder;

    fn keyword_vector(text: &str) -> Vec<f32> {
        if text.to_lowercase().contains("buffer") {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            Err(AppError::Other("embedding service down".to_string()))
        }
    }

    fn chunk(id: &str, text: &str, metadata: Value) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            document_id: "doc1".to_string(),
            chunk_index: 0,
            chunk_text: text.to_string(),
            vector: keyword_vector(text),
            created_at: None,
            metadata: serde_json::from_value(metadata).unwrap(),
        }
    }

    fn service(embedder: Arc<dyn Embedder>) -> SearchService {
        let store = InMemoryChunkStore::with_chunks(vec![
            chunk(
                "c1",
                "Buffer solutions resist pH change",
                json!({"professorName": "Odumosu", "courseCode": "PCH201", "topic": "Buffers", "type": "notes", "level": "200"}),
            ),
            chunk(
                "c2",
                "Titration curves of weak acids",
                json!({"professorName": "Adeyemi", "courseCode": "PCH201", "level": "200"}),
            ),
            chunk(
                "c3",
                "Buffer capacity in blood",
                json!({"professorName": "Adeyemi", "courseCode": "PHY301", "level": "300"}),
            ),
        ]);
        SearchService::new(Arc::new(store), embedder)
    }

    fn request(query: &str, filters: Value) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            context: None,
            filters: serde_json::from_value(filters).unwrap(),
        }
    }

    #[test]
    fn test_hard_filter_top_level_level_wins() {
        let filters: SearchFilters = serde_json::from_value(json!({
            "author": "Odumosu",
            "level": "300",
            "course_filters": {"courseCode": "PCH201", "level": "200"}
        }))
        .unwrap();

        let filter = hard_filter(&filters);
        assert_eq!(
            filter.to_json(),
            json!({
                "metadata.professorName": "Odumosu",
                "metadata.courseCode": "PCH201",
                "metadata.level": "300"
            })
        );
    }

    #[test]
    fn test_source_hints_do_not_override_hard_filters() {
        let mut hard = MetadataFilter::new();
        hard.set("metadata.topic", "Buffers");
        let hints = SourceFilters {
            author: Some("Odumosu".to_string()),
            doc_type: None,
            topic: Some("Titration".to_string()),
        };

        let (filter, applied) = apply_source_hints(&hard, &hints);
        assert!(applied);
        assert_eq!(filter.0.get("metadata.topic").map(String::as_str), Some("Buffers"));
        assert_eq!(filter.0.get("metadata.professorName").map(String::as_str), Some("Odumosu"));
    }

    #[tokio::test]
    async fn test_vector_search_groups_and_summarises() {
        let service = service(Arc::new(KeywordEmbedder));
        let response = service
            .search(&request("buffer", json!({"max_chunks": 2})))
            .await
            .unwrap();

        assert_eq!(response.search_mode, SearchMode::Vector);
        assert_eq!(response.total, response.chunks.len());
        assert_eq!(response.total, 2);

        let grouped: usize = response.grouped_results.values().map(|g| g.chunks.len()).sum();
        assert_eq!(grouped, response.total);

        let first = &response.chunks[0].metadata;
        assert_eq!(first.context.section, "main");
        assert!(first.relevance_score.is_some());
        assert!(response.metadata.sources.contains(&"PCH201 - Odumosu".to_string()));
    }

    #[tokio::test]
    async fn test_min_relevance_drops_weak_hits() {
        let service = service(Arc::new(KeywordEmbedder));
        let response = service
            .search(&request("buffer", json!({"max_chunks": 5, "min_relevance": 0.9})))
            .await
            .unwrap();

        assert_eq!(response.search_mode, SearchMode::Vector);
        assert!(response
            .chunks
            .iter()
            .all(|hit| hit.metadata.relevance_score.unwrap_or(0.0) >= 0.9));
        assert_eq!(response.total, 2);
    }

    #[tokio::test]
    async fn test_unmatched_hint_retries_with_hard_filters() {
        let service = service(Arc::new(KeywordEmbedder));
        let response = service
            .search(&request(
                "buffer",
                json!({"level": "300", "source_filters": {"author": "Nobody"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.search_mode, SearchMode::Vector);
        assert_eq!(response.total, 1);
        assert_eq!(response.chunks[0].field("professorName"), Some("Adeyemi"));
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back_to_text_match() {
        let service = service(Arc::new(BrokenEmbedder));
        let response = service
            .search(&request("TITRATION", json!({"level": "200"})))
            .await
            .unwrap();

        assert_eq!(response.search_mode, SearchMode::Text);
        assert_eq!(response.total, 1);
        assert!(response.chunks[0].metadata.relevance_score.is_none());

        let json = serde_json::to_value(&response.chunks[0]).unwrap();
        assert!(json["metadata"].get("relevance_score").is_none());
        assert_eq!(json["metadata"]["context"]["document_type"], "unknown");
        assert_eq!(json["metadata"]["professorName"], "Adeyemi");
    }
}
