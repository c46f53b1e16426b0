//! 业务能力层
//!
//! 每个服务只提供一种能力，不关心调用顺序：
//! - `llm_service` - 大模型调用（补全 / 流式）
//! - `search_service` - 文档检索（向量 + 文本兜底）
//! - `context_builder` - 聊天上下文与系统提示词
//! - `quiz_parser` - 出题结果解析、校验、去重
//! - `grading` - 判分与简答题裁决解析
//! - `quiz_history` - 成绩历史与分析

pub mod context_builder;
pub mod grading;
pub mod llm_service;
pub mod quiz_history;
pub mod quiz_parser;
pub mod search_service;

pub use llm_service::{ChatMessage, ChatModel, ChatRole, GenerationParams, LlmService};
pub use search_service::{SearchRequest, SearchResponse, SearchService};
