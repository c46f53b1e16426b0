//! LLM 服务 - 业务能力层
//!
//! 只负责"调用大模型"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 默认走 Google 的 OpenAI 兼容端点（Gemma 模型）
//! - 支持一次性补全与流式输出
//!
//! Gemma 不接受 system 角色，发送前会把系统消息并入第一条对话消息。

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, LlmError};

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    /// 模型回复，兼容 `assistant` 写法
    #[serde(alias = "assistant")]
    Model,
}

/// 对话消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// 生成参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// 聊天回复
    pub const CHAT: Self = Self {
        temperature: 0.3,
        top_p: 0.95,
        max_output_tokens: 4096,
    };

    /// 出题
    pub const QUIZ: Self = Self {
        temperature: 0.3,
        top_p: 0.95,
        max_output_tokens: 3072,
    };

    /// 简答题批改
    pub const GRADING: Self = Self {
        temperature: 0.1,
        top_p: 0.95,
        max_output_tokens: 512,
    };
}

/// 大模型调用能力
///
/// 工作流只依赖这个 trait，测试时可替换为脚本化的假模型
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 一次性返回完整回复
    async fn complete(&self, messages: &[ChatMessage], params: GenerationParams) -> Result<String>;

    /// 流式返回文本增量
    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<BoxStream<'static, Result<String>>>;
}

/// 合并系统消息
///
/// - 系统消息（取第一条）并入第一条非系统消息：`<system>\n\nUser: <content>`
/// - 合并后的第一条消息一律作为用户消息
/// - 没有任何非系统消息时返回 `LlmError::NoUserMessage`
pub fn prepare_messages(messages: &[ChatMessage]) -> Result<Vec<ChatMessage>, AppError> {
    let system = messages.iter().find(|m| m.role == ChatRole::System);
    let mut conversation: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .cloned()
        .collect();

    let Some(first) = conversation.first_mut() else {
        return Err(AppError::Llm(LlmError::NoUserMessage));
    };

    if let Some(system) = system {
        first.content = format!("{}\n\nUser: {}", system.content, first.content);
        first.role = ChatRole::User;
    }

    Ok(conversation)
}

/// LLM 服务
///
/// 职责：
/// - 把对话消息转换为 OpenAI 兼容请求
/// - 调用 API 并返回文本（完整或流式）
/// - 不拼 prompt，不解析业务 JSON
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 构建请求
    fn build_request(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<CreateChatCompletionRequest, AppError> {
        let prepared = prepare_messages(messages)?;

        let mut request_messages = Vec::with_capacity(prepared.len());
        for message in prepared {
            let converted = match message.role {
                ChatRole::Model => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(message.content)
                        .build()?,
                ),
                ChatRole::User | ChatRole::System => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(message.content)
                        .build()?,
                ),
            };
            request_messages.push(converted);
        }

        Ok(CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(request_messages)
            .temperature(params.temperature)
            .top_p(params.top_p)
            .max_tokens(params.max_output_tokens)
            .build()?)
    }
}

#[async_trait]
impl ChatModel for LlmService {
    async fn complete(&self, messages: &[ChatMessage], params: GenerationParams) -> Result<String> {
        debug!("调用 LLM API，模型: {}，消息数: {}", self.model_name, messages.len());
        let request = self.build_request(messages, params)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(&self.model_name, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                AppError::Llm(LlmError::EmptyContent {
                    model: self.model_name.clone(),
                })
            })?;

        debug!("LLM API 调用成功，回复长度: {} 字符", content.len());
        Ok(content)
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<BoxStream<'static, Result<String>>> {
        debug!("调用 LLM 流式 API，模型: {}", self.model_name);
        let request = self.build_request(messages, params)?;

        let stream = self.client.chat().create_stream(request).await.map_err(|e| {
            warn!("LLM 流式调用失败: {}", e);
            AppError::llm_api_failed(&self.model_name, e)
        })?;

        let model = self.model_name.clone();
        let deltas = stream.filter_map(move |item| {
            let model = model.clone();
            async move {
                match item {
                    Ok(response) => response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .filter(|text| !text.is_empty())
                        .map(Ok),
                    Err(e) => {
                        warn!("LLM 流式输出中断: {}", e);
                        Some(Err(AppError::llm_api_failed(model, e).into()))
                    }
                }
            }
        });

        Ok(deltas.boxed())
    }
}
