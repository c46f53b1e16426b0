use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::clients::{AstraClient, Embedder, EmbeddingClient};
use crate::config::Config;
use crate::error::AppResult;
use crate::services::{ChatModel, LlmService, SearchService};
use crate::store::{
    db, ChunkStore, ConversationRepo, Database, DocumentRepo, InMemoryChunkStore, QuizRepo,
    TimetableRepo, UserRepo,
};
use crate::workflow::{ChatFlow, GradingFlow, IngestFlow, QuizFlow};

/// 所有处理函数共享的状态
pub struct AppState {
    pub config: Config,
    pub users: UserRepo,
    pub quizzes: QuizRepo,
    pub timetable: TimetableRepo,
    pub documents: DocumentRepo,
    pub conversations: ConversationRepo,
    pub search: Arc<SearchService>,
    pub chat: ChatFlow,
    pub quiz: QuizFlow,
    pub grading: GradingFlow,
    pub ingest: IngestFlow,
}

impl AppState {
    /// 按配置连接外部服务
    ///
    /// 未配置 AstraDB 时使用内存向量库
    pub async fn from_config(config: Config) -> AppResult<Arc<Self>> {
        let store: Arc<dyn ChunkStore> = if config.has_astra() {
            info!("✓ 使用 AstraDB 集合 {}", config.astra_collection);
            Arc::new(AstraClient::new(&config)?)
        } else {
            info!("⚠️ 未配置 AstraDB，使用内存向量库");
            Arc::new(InMemoryChunkStore::new())
        };
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(&config)?);
        let model: Arc<dyn ChatModel> = Arc::new(LlmService::new(&config));
        let database = db::connect(&PathBuf::from(&config.data_dir)).await?;

        Ok(Self::from_parts(config, store, embedder, model, database))
    }

    /// 由已构建好的组件组装状态
    pub fn from_parts(
        config: Config,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        database: Database,
    ) -> Arc<Self> {
        let search = Arc::new(SearchService::new(store.clone(), embedder.clone()));
        let quizzes = QuizRepo::new(database.clone());
        let documents = DocumentRepo::new(database.clone());

        Arc::new(Self {
            chat: ChatFlow::new(search.clone(), model.clone(), config.max_context_chars),
            quiz: QuizFlow::new(search.clone(), model.clone(), quizzes.clone()),
            grading: GradingFlow::new(model, quizzes.clone()),
            ingest: IngestFlow::new(
                store,
                embedder,
                documents.clone(),
                PathBuf::from(&config.storage_dir),
            ),
            users: UserRepo::new(database.clone()),
            timetable: TimetableRepo::new(database.clone()),
            conversations: ConversationRepo::new(database),
            quizzes,
            documents,
            search,
            config,
        })
    }
}
