use std::fmt;

/// 应用程序错误类型
///
/// 基础设施层（clients / store / config）返回此类型，
/// 业务层通过 `anyhow` 向上传递，HTTP 层再映射为状态码。
#[derive(Debug)]
pub enum AppError {
    /// 上游 HTTP 服务错误（向量服务、AstraDB）
    Api(ApiError),
    /// 文件操作错误
    File(FileError),
    /// LLM 服务错误
    Llm(LlmError),
    /// 存储错误
    Store(StoreError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Api(e) => write!(f, "API错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Llm(e) => write!(f, "LLM错误: {}", e),
            AppError::Store(e) => write!(f, "存储错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Api(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Llm(e) => Some(e),
            AppError::Store(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 上游 API 调用错误
#[derive(Debug)]
pub enum ApiError {
    /// 网络请求失败
    RequestFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回非 2xx 状态码
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    /// 返回结果为空
    EmptyResponse { endpoint: String },
    /// JSON 解析失败
    JsonParseFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RequestFailed { endpoint, source } => {
                write!(f, "API请求失败 ({}): {}", endpoint, source)
            }
            ApiError::BadResponse {
                endpoint,
                status,
                message,
            } => {
                write!(
                    f,
                    "API返回错误响应 ({}): status={}, message={:?}",
                    endpoint, status, message
                )
            }
            ApiError::EmptyResponse { endpoint } => write!(f, "API返回空结果: {}", endpoint),
            ApiError::JsonParseFailed { source } => write!(f, "JSON解析失败: {}", source),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::RequestFailed { source, .. } | ApiError::JsonParseFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 文件不存在
    NotFound { path: String },
    /// 路径越界（如 `../`）
    InvalidPath { path: String },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { path } => write!(f, "文件不存在: {}", path),
            FileError::InvalidPath { path } => write!(f, "非法文件路径: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// LLM 服务错误
#[derive(Debug)]
pub enum LlmError {
    /// API 调用失败
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求构建失败
    RequestBuildFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    EmptyContent { model: String },
    /// 消息列表中没有用户消息
    NoUserMessage,
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ApiCallFailed { model, source } => {
                write!(f, "LLM API调用失败 (模型: {}): {}", model, source)
            }
            LlmError::RequestBuildFailed { source } => write!(f, "LLM请求构建失败: {}", source),
            LlmError::EmptyContent { model } => write!(f, "LLM返回内容为空 (模型: {})", model),
            LlmError::NoUserMessage => write!(f, "至少需要一条用户消息"),
        }
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LlmError::ApiCallFailed { source, .. } | LlmError::RequestBuildFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 存储错误
#[derive(Debug)]
pub enum StoreError {
    /// AstraDB 命令返回 errors 字段
    CommandFailed { command: String, message: String },
    /// 数据库文件无法打开或初始化
    OpenFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// SQL 执行失败
    QueryFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 行数据无法还原为记录
    CorruptRow { table: String, message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::CommandFailed { command, message } => {
                write!(f, "AstraDB 命令 {} 失败: {}", command, message)
            }
            StoreError::OpenFailed { path, source } => {
                write!(f, "数据库打开失败 ({}): {}", path, source)
            }
            StoreError::QueryFailed { source } => write!(f, "SQL 执行失败: {}", source),
            StoreError::CorruptRow { table, message } => {
                write!(f, "表 {} 中的数据无效: {}", table, message)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::OpenFailed { source, .. } | StoreError::QueryFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    FileParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::FileParseFailed { path, source } => {
                write!(f, "配置文件解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Store(StoreError::QueryFailed {
            source: Box::new(err),
        })
    }
}

impl From<async_openai::error::OpenAIError> for AppError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        AppError::Llm(LlmError::RequestBuildFailed {
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建API请求失败错误
    pub fn api_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建上游非 2xx 响应错误
    pub fn api_bad_response(endpoint: impl Into<String>, status: u16, message: Option<String>) -> Self {
        AppError::Api(ApiError::BadResponse {
            endpoint: endpoint.into(),
            status,
            message,
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建数据行解析错误
    pub fn corrupt_row(table: impl Into<String>, message: impl fmt::Display) -> Self {
        AppError::Store(StoreError::CorruptRow {
            table: table.into(),
            message: message.to_string(),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
