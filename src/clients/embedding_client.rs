/// 向量服务客户端
///
/// 调用外部 embedding 微服务（`POST /embed`，body `{"texts": [...]}`）
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};

/// 文本向量化能力
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 批量向量化，返回顺序与输入一致
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// 单条文本向量化
    async fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut embeddings = self.embed(&[text.to_string()]).await?;
        embeddings.pop().ok_or_else(|| {
            AppError::Api(ApiError::EmptyResponse {
                endpoint: "/embed".to_string(),
            })
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    model_name: Option<String>,
}

/// 向量服务 HTTP 客户端
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
}

impl EmbeddingClient {
    /// 创建新的向量服务客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        Self::with_base_url(&config.embedding_service_url)
    }

    pub fn with_base_url(base_url: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::api_request_failed(base_url, e))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let endpoint = format!("{}/embed", self.base_url);
        debug!("请求向量服务: {} 条文本", texts.len());

        let response = self
            .http
            .post(&endpoint)
            .json(&EmbedRequest { texts })
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("向量服务返回错误: {} {}", status, body);
            return Err(AppError::api_bad_response(
                &endpoint,
                status.as_u16(),
                Some(body).filter(|b| !b.is_empty()),
            ));
        }

        let data: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AppError::Api(ApiError::JsonParseFailed { source: Box::new(e) }))?;

        if data.embeddings.len() != texts.len() {
            warn!(
                "向量数量与输入不一致: 期望 {}，实际 {}",
                texts.len(),
                data.embeddings.len()
            );
            return Err(AppError::Api(ApiError::EmptyResponse { endpoint }));
        }

        debug!(
            "向量服务返回 {} 条向量，维度 {}，模型 {:?}",
            data.embeddings.len(),
            data.embeddings.first().map(Vec::len).unwrap_or(0),
            data.model_name
        );

        Ok(data.embeddings)
    }
}
