//! 集成测试公共工具：假向量服务、假模型、测试服务器

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use study_tutor::api::{serve_on, AppState, USER_EMAIL_HEADER};
use study_tutor::clients::Embedder;
use study_tutor::error::AppResult;
use study_tutor::services::{ChatMessage, ChatModel, GenerationParams};
use study_tutor::store::{db, InMemoryChunkStore};
use study_tutor::Config;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const KEYWORDS: [&str; 3] = ["buffer", "titration", "quantum"];

/// 按关键词是否出现生成向量，最后一维为常数，避免零向量
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = KEYWORDS
        .iter()
        .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
        .collect();
    vector.push(0.1);
    vector
}

pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

type Responder = dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync;

/// 按消息内容决定回复的假模型，记录每次调用收到的消息
pub struct FakeModel {
    respond: Box<Responder>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeModel {
    pub fn new(respond: impl Fn(&[ChatMessage]) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete(&self, messages: &[ChatMessage], _params: GenerationParams) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        (self.respond)(messages)
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let reply = self.complete(messages, params).await?;
        let deltas: Vec<Result<String>> = reply
            .split_inclusive(' ')
            .map(|piece| Ok(piece.to_string()))
            .collect();
        Ok(stream::iter(deltas).boxed())
    }
}

/// 运行在随机端口上的测试服务
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub model: Arc<FakeModel>,
    pub storage: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestApp {
    pub async fn spawn(model: FakeModel) -> Self {
        let storage = tempfile::tempdir().unwrap();
        let config = Config {
            storage_dir: storage.path().display().to_string(),
            ..Config::default()
        };
        let model = Arc::new(model);
        let state = AppState::from_parts(
            config,
            Arc::new(InMemoryChunkStore::new()),
            Arc::new(KeywordEmbedder),
            model.clone(),
            db::connect_memory().await.unwrap(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();
        tokio::spawn(serve_on(listener, state, async {
            let _ = signal.await;
        }));

        Self {
            base_url: format!("http://{}", address),
            client: reqwest::Client::new(),
            model,
            storage,
            shutdown: Some(shutdown),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path))
    }

    pub fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.put(self.url(path))
    }

    pub fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.delete(self.url(path))
    }

    /// 入库一份两段的化学笔记（PCH201 / 200 级）
    pub async fn ingest_notes(&self) -> Value {
        let response = self
            .post("/api/process-document")
            .json(&json!({
                "documentId": "doc-buffers",
                "text": "Buffers resist pH change when small amounts of acid are added.\n\n\
                         Titration curves show the equivalence point.",
                "metadata": {
                    "title": "Acid-base notes",
                    "professorName": "Odumosu",
                    "courseCode": "PCH201",
                    "courseTitle": "Physical Chemistry",
                    "topic": "Buffers",
                    "level": "200",
                    "type": "notes"
                }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// 给请求加上身份头
pub fn as_user(builder: reqwest::RequestBuilder, email: &str) -> reqwest::RequestBuilder {
    builder.header(USER_EMAIL_HEADER, email)
}

/// 出题回复
pub fn questions_reply(questions: Value) -> String {
    format!(
        "Here you go:\n```json\n{}\n```",
        json!({ "questions": questions })
    )
}
