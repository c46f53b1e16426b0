//! SQLite 连接
//!
//! 生产环境写入 `<data_dir>/study_tutor.db`，测试使用内存库。
//! 两种方式连接后都会执行建表。

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::schema;
use crate::error::{AppError, AppResult, StoreError};

/// 共享连接池
pub type Database = Arc<SqlitePool>;

const DATABASE_FILE: &str = "study_tutor.db";

/// 打开数据目录下的数据库文件，目录或文件不存在时创建
pub async fn connect(data_dir: &Path) -> AppResult<Database> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|e| open_error(data_dir, e))?;

    let path = data_dir.join(DATABASE_FILE);
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| open_error(&path, e))?;

    schema::bootstrap_schema(&pool).await?;
    info!("🗄️ 数据库已就绪: {}", path.display());
    Ok(Arc::new(pool))
}

/// 内存数据库
///
/// 每个内存连接都是独立的库，所以池中只保留一条且永不回收。
pub async fn connect_memory() -> AppResult<Database> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| open_error(Path::new(":memory:"), e))?;

    schema::bootstrap_schema(&pool).await?;
    Ok(Arc::new(pool))
}

fn open_error(path: &Path, err: impl std::error::Error + Send + Sync + 'static) -> AppError {
    AppError::Store(StoreError::OpenFailed {
        path: path.display().to_string(),
        source: Box::new(err),
    })
}

/// 时间统一存为定宽 RFC 3339 文本，按字符串排序即按时间排序
pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(table: &str, value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| AppError::corrupt_row(table, format!("时间格式无效 '{}': {}", value, e)))
}

/// 计数列在库中为 INTEGER
pub(crate) fn to_count(table: &str, value: i64) -> AppResult<u32> {
    u32::try_from(value).map_err(|_| AppError::corrupt_row(table, format!("计数越界: {}", value)))
}
