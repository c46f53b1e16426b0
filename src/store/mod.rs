//! 存储层
//!
//! - `chunk_store` - 文档分块（向量检索）接口及内存实现
//! - `db` / `schema` - SQLite 连接池与建表
//! - `*_repo` - 用户、测验与成绩、课表、文档记录、聊天会话，每类一个仓储

pub mod chunk_store;
pub mod conversation_repo;
pub mod db;
pub mod document_repo;
pub mod quiz_repo;
pub mod schema;
pub mod timetable_repo;
pub mod user_repo;

pub use chunk_store::{ChunkStore, InMemoryChunkStore};
pub use conversation_repo::ConversationRepo;
pub use db::Database;
pub use document_repo::DocumentRepo;
pub use quiz_repo::QuizRepo;
pub use timetable_repo::{SlotOutcome, TimetableRepo};
pub use user_repo::UserRepo;
