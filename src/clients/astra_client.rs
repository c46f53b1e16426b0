/// AstraDB Data API 客户端
///
/// 通过 JSON 命令（find / insertMany / deleteMany）操作分块集合，
/// 向量字段为 `$vector`，相似度由 `includeSimilarity` 返回到 `$similarity`。
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult, StoreError};
use crate::models::{DocumentChunk, MetadataFilter, ScoredChunk};
use crate::store::ChunkStore;

/// insertMany 单次最多 100 条，带向量的文档体积较大，取小一些
const INSERT_BATCH_SIZE: usize = 20;
/// 分页读取上限，防止异常的 nextPageState 导致死循环
const MAX_PAGES: usize = 500;

/// AstraDB 客户端
pub struct AstraClient {
    http: reqwest::Client,
    collection_url: String,
    token: String,
}

#[derive(Deserialize)]
struct CommandError {
    #[serde(default)]
    message: String,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

#[derive(Deserialize)]
struct FindData {
    #[serde(default)]
    documents: Vec<Value>,
    #[serde(rename = "nextPageState", default)]
    next_page_state: Option<String>,
}

/// 带 `$similarity` 的文档
#[derive(Deserialize)]
struct ScoredDocument {
    #[serde(flatten)]
    chunk: DocumentChunk,
    #[serde(rename = "$similarity", default)]
    similarity: Option<f64>,
}

impl AstraClient {
    /// 创建新的 AstraDB 客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        Self::with_parts(
            &config.astra_endpoint,
            &config.astra_token,
            &config.astra_keyspace,
            &config.astra_collection,
        )
    }

    pub fn with_parts(endpoint: &str, token: &str, keyspace: &str, collection: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::api_request_failed(endpoint, e))?;

        Ok(Self {
            http,
            collection_url: format!(
                "{}/api/json/v1/{}/{}",
                endpoint.trim_end_matches('/'),
                keyspace,
                collection
            ),
            token: token.to_string(),
        })
    }

    /// 发送一条 Data API 命令
    ///
    /// 响应中的 `errors` 数组转换为 `StoreError::CommandFailed`
    async fn command(&self, name: &str, body: Value) -> AppResult<Value> {
        let response = self
            .http
            .post(&self.collection_url)
            .header("Token", &self.token)
            .json(&json!({ name: body }))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&self.collection_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::api_bad_response(
                &self.collection_url,
                status.as_u16(),
                Some(text).filter(|t| !t.is_empty()),
            ));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| AppError::Api(ApiError::JsonParseFailed { source: Box::new(e) }))?;

        if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .filter_map(|e| serde_json::from_value::<CommandError>(e.clone()).ok())
                    .map(|e| match e.error_code {
                        Some(code) => format!("{}: {}", code, e.message),
                        None => e.message,
                    })
                    .collect();
                warn!("AstraDB 命令 {} 返回错误: {:?}", name, messages);
                return Err(AppError::Store(StoreError::CommandFailed {
                    command: name.to_string(),
                    message: messages.join("; "),
                }));
            }
        }

        Ok(value)
    }

    fn parse_find_data(value: Value) -> AppResult<FindData> {
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        if data.is_null() {
            return Ok(FindData {
                documents: Vec::new(),
                next_page_state: None,
            });
        }
        Ok(serde_json::from_value(data)?)
    }
}

#[async_trait]
impl ChunkStore for AstraClient {
    async fn vector_search(
        &self,
        filter: &MetadataFilter,
        vector: &[f32],
        limit: usize,
    ) -> AppResult<Vec<ScoredChunk>> {
        let body = json!({
            "filter": filter.to_json(),
            "sort": { "$vector": vector },
            "projection": { "$vector": 0 },
            "options": { "limit": limit, "includeSimilarity": true }
        });

        let data = Self::parse_find_data(self.command("find", body).await?)?;
        debug!("AstraDB 向量检索返回 {} 条", data.documents.len());

        data.documents
            .into_iter()
            .map(|doc| -> AppResult<ScoredChunk> {
                let scored: ScoredDocument = serde_json::from_value(doc)?;
                Ok(ScoredChunk {
                    chunk: scored.chunk,
                    similarity: scored.similarity,
                })
            })
            .collect()
    }

    async fn find_all(&self, filter: &MetadataFilter) -> AppResult<Vec<DocumentChunk>> {
        let mut chunks = Vec::new();
        let mut page_state: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut options = json!({});
            if let Some(state) = &page_state {
                options["pageState"] = json!(state);
            }
            let body = json!({
                "filter": filter.to_json(),
                "projection": { "$vector": 0 },
                "options": options
            });

            let data = Self::parse_find_data(self.command("find", body).await?)?;
            for doc in data.documents {
                chunks.push(serde_json::from_value::<DocumentChunk>(doc)?);
            }

            match data.next_page_state {
                Some(state) if !state.is_empty() => page_state = Some(state),
                _ => return Ok(chunks),
            }
        }

        warn!("AstraDB 分页读取超过 {} 页，结果已截断", MAX_PAGES);
        Ok(chunks)
    }

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> AppResult<usize> {
        let mut inserted = 0;
        for batch in chunks.chunks(INSERT_BATCH_SIZE) {
            let body = json!({
                "documents": batch,
                "options": { "ordered": false }
            });
            let value = self.command("insertMany", body).await?;
            inserted += value
                .pointer("/status/insertedIds")
                .and_then(|ids| ids.as_array())
                .map(Vec::len)
                .unwrap_or(batch.len());
        }
        debug!("AstraDB 写入 {} 条分块", inserted);
        Ok(inserted)
    }

    async fn delete_document(&self, document_id: &str) -> AppResult<u64> {
        let filter = MetadataFilter::document(document_id).to_json();
        let mut deleted = 0u64;

        // deleteMany 每次最多删除一批，moreData 为 true 时继续
        for _ in 0..MAX_PAGES {
            let value = self
                .command("deleteMany", json!({ "filter": filter.clone() }))
                .await?;
            let count = value
                .pointer("/status/deletedCount")
                .and_then(|c| c.as_i64())
                .unwrap_or(0);
            deleted += count.max(0) as u64;

            let more = value
                .pointer("/status/moreData")
                .and_then(|m| m.as_bool())
                .unwrap_or(false);
            if !more {
                break;
            }
        }

        debug!("AstraDB 删除文档 {} 的 {} 条分块", document_id, deleted);
        Ok(deleted)
    }
}
