//! API 模块
//!
//! 负责 HTTP 路由、身份提取和错误映射，业务逻辑全部交给 workflow / services

pub mod auth;
pub mod chat;
pub mod conversations;
pub mod documents;
pub mod error;
pub mod quiz;
pub mod search;
pub mod state;
pub mod timetable;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    http::{
        header::{CONTENT_TYPE, HeaderName},
        Method,
    },
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub use auth::{CurrentUser, USER_EMAIL_HEADER};
pub use error::{HttpError, HttpResult};
pub use state::AppState;

/// 构建路由
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(USER_EMAIL_HEADER)])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route(
            "/api/search",
            get(search::hello_handler).post(search::search_handler),
        )
        .route("/api/chat", post(chat::chat_handler))
        .route(
            "/api/conversations",
            get(conversations::list_handler)
                .post(conversations::save_handler)
                .delete(conversations::delete_handler),
        )
        .route("/api/conversations/cleanup", post(conversations::cleanup_handler))
        // 测验
        .route("/api/quiz/generate", post(quiz::generate_handler))
        .route("/api/quiz/submit", post(quiz::submit_handler))
        .route("/api/quiz/history", get(quiz::history_handler))
        .route("/api/quiz/results/{id}", get(quiz::result_handler))
        .route("/api/quiz/{id}", get(quiz::quiz_handler))
        // 文档
        .route("/api/process-document", post(documents::process_handler))
        .route(
            "/api/documents",
            get(documents::list_handler).delete(documents::delete_handler),
        )
        .route("/api/documents/courses", get(documents::courses_handler))
        // 课表与用户
        .route(
            "/api/admin/timetable",
            get(timetable::list_handler)
                .post(timetable::create_handler)
                .put(timetable::update_handler)
                .delete(timetable::delete_handler),
        )
        .route("/api/timetable", get(timetable::user_timetable_handler))
        .route(
            "/api/user",
            get(user::profile_handler)
                .put(user::update_handler)
                .post(user::update_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// 在已绑定的监听器上运行服务，直到 `shutdown` 完成
pub async fn serve_on<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP 服务异常退出")
}

/// 绑定配置中的地址并运行，收到 Ctrl+C / SIGTERM 后优雅退出
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let address = state.config.bind_addr.clone();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("无法绑定地址 {}", address))?;
    info!("🚀 服务已启动: http://{}", address);

    serve_on(listener, state, shutdown_signal()).await?;

    info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("收到 Ctrl+C，正在停止"),
            Err(e) => {
                warn!("⚠️ 无法监听 Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("收到终止信号，正在停止");
            }
            Err(e) => {
                warn!("⚠️ 无法监听终止信号: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
