//! 聊天流程 - 流程层
//!
//! 流程顺序：
//! 1. 从消息中提取来源提示
//! 2. 检索相关分块（失败时按"无相关内容"处理）
//! 3. 构建上下文与系统提示词
//! 4. 流式调用模型

use std::sync::Arc;

use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::services::context_builder::{
    build_context, extract_source_filters, system_prompt, truncate_context, ChatContext,
};
use crate::services::search_service::SearchFilters;
use crate::services::{ChatMessage, ChatModel, GenerationParams, SearchRequest, SearchService};
use crate::utils::truncate_text;

const CHAT_MAX_CHUNKS: usize = 8;
const CHAT_MIN_RELEVANCE: f64 = 0.7;
/// 检索时附带的历史条数
const SEARCH_HISTORY_TURNS: usize = 3;
/// 发送给模型的历史条数
const PROMPT_HISTORY_TURNS: usize = 6;

/// 聊天请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_history: Vec<ChatMessage>,
    pub user_level: Option<String>,
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// 聊天流程
pub struct ChatFlow {
    search: Arc<SearchService>,
    model: Arc<dyn ChatModel>,
    max_context_chars: usize,
}

impl ChatFlow {
    /// 创建新的聊天流程
    pub fn new(search: Arc<SearchService>, model: Arc<dyn ChatModel>, max_context_chars: usize) -> Self {
        Self {
            search,
            model,
            max_context_chars,
        }
    }

    /// 检索并整理上下文
    async fn gather_context(&self, request: &ChatRequest) -> ChatContext {
        let history_context = tail(&request.conversation_history, SEARCH_HISTORY_TURNS)
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let search_request = SearchRequest {
            query: request.message.clone(),
            context: Some(history_context),
            filters: SearchFilters {
                max_chunks: Some(CHAT_MAX_CHUNKS),
                min_relevance: Some(CHAT_MIN_RELEVANCE),
                source_filters: extract_source_filters(&request.message),
                ..Default::default()
            },
        };

        match self.search.search(&search_request).await {
            Ok(response) => {
                let mut context = build_context(&response.chunks);
                context.text = truncate_context(&context.text, self.max_context_chars);
                context
            }
            Err(e) => {
                warn!("⚠️ 聊天检索失败，按无相关内容处理: {:#}", e);
                ChatContext::default()
            }
        }
    }

    /// 组装发送给模型的消息：系统提示词 + 最近历史 + 当前消息
    pub async fn build_messages(&self, request: &ChatRequest) -> Vec<ChatMessage> {
        let context = self.gather_context(request).await;
        info!(
            "💬 聊天: '{}'，上下文来源 {} 个",
            truncate_text(&request.message, 60),
            context.sources.len()
        );

        let mut messages = Vec::with_capacity(PROMPT_HISTORY_TURNS + 2);
        messages.push(ChatMessage::system(system_prompt(
            request.user_level.as_deref(),
            &context,
        )));
        messages.extend(tail(&request.conversation_history, PROMPT_HISTORY_TURNS).iter().cloned());
        messages.push(ChatMessage::user(request.message.clone()));
        messages
    }

    /// 执行聊天，返回模型文本增量流
    pub async fn run(&self, request: &ChatRequest) -> Result<BoxStream<'static, Result<String>>> {
        let messages = self.build_messages(request).await;
        self.model.stream(&messages, GenerationParams::CHAT).await
    }
}

/// 把文本增量编码为 NDJSON：每行 `{"chunk": "..."}`，行间以 `\n` 分隔，末尾无换行
pub fn ndjson_lines(deltas: BoxStream<'static, Result<String>>) -> BoxStream<'static, Result<String>> {
    deltas
        .enumerate()
        .map(|(index, delta)| {
            delta.map(|text| {
                let line = json!({ "chunk": text }).to_string();
                if index == 0 {
                    line
                } else {
                    format!("\n{}", line)
                }
            })
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ChatRole;
    use futures::stream;

    #[test]
    fn test_tail_returns_last_items() {
        assert_eq!(tail(&[1, 2, 3, 4], 3), &[2, 3, 4]);
        assert_eq!(tail(&[1], 3), &[1]);
        assert!(tail::<i32>(&[], 6).is_empty());
    }

    #[test]
    fn test_chat_request_accepts_history_roles() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"message": "hi", "conversationHistory": [
                {"role": "user", "content": "a"},
                {"role": "assistant", "content": "b"},
                {"role": "model", "content": "c"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(request.conversation_history[1].role, ChatRole::Model);
        assert_eq!(request.conversation_history[2].role, ChatRole::Model);
        assert!(request.user_level.is_none());
    }

    #[tokio::test]
    async fn test_ndjson_lines_have_no_trailing_newline() {
        let deltas = stream::iter(vec![Ok("Hel".to_string()), Ok("lo \"x\"".to_string())]).boxed();
        let lines: Vec<String> = ndjson_lines(deltas)
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines.concat(), "{\"chunk\":\"Hel\"}\n{\"chunk\":\"lo \\\"x\\\"\"}");
    }
}
