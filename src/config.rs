//! 程序配置
//!
//! 加载顺序：默认值 → TOML 配置文件（可选）→ 环境变量

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, ConfigError};

/// 配置文件路径的环境变量名
pub const CONFIG_PATH_ENV: &str = "STUDY_TUTOR_CONFIG";

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 监听地址
    pub bind_addr: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 向量服务配置 ---
    pub embedding_service_url: String,
    /// AstraDB Data API 端点，为空时使用内存向量库
    pub astra_endpoint: String,
    pub astra_token: String,
    pub astra_keyspace: String,
    pub astra_collection: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 本地存储 ---
    /// 记录快照目录（测验、成绩、课表、用户）
    pub data_dir: String,
    /// 上传文件目录，`fileKey` 相对于此目录解析
    pub storage_dir: String,
    /// 聊天上下文最大字符数
    pub max_context_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            verbose_logging: false,
            embedding_service_url: "http://localhost:8000".to_string(),
            astra_endpoint: String::new(),
            astra_token: String::new(),
            astra_keyspace: "default_keyspace".to_string(),
            astra_collection: "document_chunks".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemma-3-27b-it".to_string(),
            data_dir: "data".to_string(),
            storage_dir: "uploads".to_string(),
            max_context_chars: 2000,
        }
    }
}

impl Config {
    /// 加载配置
    ///
    /// 如果设置了 `STUDY_TUTOR_CONFIG`，该文件必须存在；
    /// 否则仅在当前目录存在 `config.toml` 时读取。
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = PathBuf::from("config.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    debug!("未找到 config.toml，使用默认配置");
                    Self::default()
                }
            }
        };

        base.with_env_overrides()
    }

    /// 从 TOML 文件读取配置，缺失字段取默认值
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            AppError::Config(ConfigError::FileParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;
        info!("已加载配置文件: {}", path.display());
        Ok(config)
    }

    /// 仅使用默认值 + 环境变量
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 用环境变量覆盖当前配置
    pub fn with_env_overrides(self) -> AppResult<Self> {
        Ok(Self {
            bind_addr: env_string("BIND_ADDR").unwrap_or(self.bind_addr),
            verbose_logging: env_parsed("VERBOSE_LOGGING", "bool")?.unwrap_or(self.verbose_logging),
            embedding_service_url: env_string("EMBEDDING_SERVICE_URL").unwrap_or(self.embedding_service_url),
            astra_endpoint: env_string("ASTRA_DB_ENDPOINT").unwrap_or(self.astra_endpoint),
            astra_token: env_string("ASTRA_DB_APPLICATION_TOKEN").unwrap_or(self.astra_token),
            astra_keyspace: env_string("ASTRA_DB_KEYSPACE").unwrap_or(self.astra_keyspace),
            astra_collection: env_string("ASTRA_DB_COLLECTION").unwrap_or(self.astra_collection),
            llm_api_key: env_string("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            data_dir: env_string("DATA_DIR").unwrap_or(self.data_dir),
            storage_dir: env_string("STORAGE_DIR").unwrap_or(self.storage_dir),
            max_context_chars: env_parsed("MAX_CONTEXT_CHARS", "usize")?.unwrap_or(self.max_context_chars),
        })
    }

    /// 是否配置了 AstraDB
    pub fn has_astra(&self) -> bool {
        !self.astra_endpoint.is_empty() && !self.astra_token.is_empty()
    }
}

fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(var_name: &str, expected_type: &str) -> AppResult<Option<T>> {
    match env_string(var_name) {
        None => Ok(None),
        Some(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            AppError::Config(ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            })
        }),
    }
}
