//! # Study Tutor
//!
//! 课程资料检索、AI 辅导聊天、自动出题与批改的后端服务
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Clients / Store）
//! - `clients/` - 向量服务、AstraDB 的 HTTP 客户端
//! - `store/` - `ChunkStore` 向量检索接口；SQLite 仓储保存用户、测验、成绩、课表、会话
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心调用顺序
//! - `LlmService` - 大模型补全 / 流式输出
//! - `SearchService` - 向量检索 + 文本兜底
//! - `quiz_parser` / `grading` - 出题解析与判分
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次请求"的完整处理流程
//! - `ChatFlow` - 检索 → 上下文 → 流式回复
//! - `QuizFlow` - 检索 → 分批出题 → 校验去重 → 保存
//! - `GradingFlow` - 逐题判分 → 简答题模型裁决 → 保存成绩
//! - `IngestFlow` - 切分 → 向量化 → 入库
//!
//! ### ④ 接口层（API）
//! - `api/` - axum 路由、身份提取、错误映射
//!
//! ## 模块结构

pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use api::{router, serve, AppState};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use workflow::{ChatFlow, GradingFlow, IngestFlow, QuizFlow};
