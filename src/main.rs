use anyhow::Result;
use study_tutor::utils::logging;
use study_tutor::{serve, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    // 初始化状态并启动服务
    let state = AppState::from_config(config).await?;
    serve(state).await?;

    Ok(())
}
