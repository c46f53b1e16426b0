//! 日志工具模块
//!
//! 提供日志初始化和输出的辅助函数

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// 初始化 tracing 日志
///
/// `RUST_LOG` 优先；未设置时 verbose 模式使用 `debug`，否则 `info`。
/// 重复调用（例如测试中）不会 panic。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 服务启动 - 学习助手后端");
    info!("🌐 监听地址: {}", config.bind_addr);
    info!("🧮 向量服务: {}", config.embedding_service_url);
    if config.has_astra() {
        info!(
            "🗄️ 向量库: AstraDB {} ({}/{})",
            config.astra_endpoint, config.astra_keyspace, config.astra_collection
        );
    } else {
        info!("🗄️ 向量库: 内存模式（未配置 AstraDB）");
    }
    info!("🤖 LLM 模型: {} @ {}", config.llm_model_name, config.llm_api_base_url);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
