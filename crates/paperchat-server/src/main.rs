//! HTTP entry point for the paperchat service.

mod routes;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use paperchat_config::{ChatConfig, StoreBackendKind};
use paperchat_core::{
    ChatService, CompletionClient, FileCatalog, MessageLog, NoopMessageLog, OpenAiCompletionClient,
    SqliteMessageLog, spawn_cleanup_task,
};
use paperchat_store::{ChatStore, MemoryChatStore, RedisChatStore};
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;

/// Command-line options for the server.
#[derive(Parser)]
#[command(name = "paperchat-server", version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    let config = ChatConfig::from_env().context("failed to load config")?;
    info!(
        "starting paperchat-server (backend={:?}, rate_limit_per_hour={}, completion_configured={})",
        config.storage.backend,
        config.limits.rate_limit_per_hour,
        config.completion.api_key.is_some(),
    );

    let store: Arc<dyn ChatStore> = match config.storage.backend {
        StoreBackendKind::Memory => Arc::new(MemoryChatStore::new(
            config.limits.rate_limit_per_hour,
            config.limits.inactivity_timeout_minutes,
        )),
        StoreBackendKind::Redis => {
            // Validation guarantees the URL is set for this backend.
            let url = config
                .storage
                .redis_url
                .as_deref()
                .context("redis backend selected without REDIS_URL")?;
            let store = RedisChatStore::connect(
                url,
                config.limits.rate_limit_per_hour,
                config.limits.inactivity_timeout_minutes * 60,
            )
            .await
            .context("failed to connect to redis")?;
            Arc::new(store)
        }
    };

    // Redis expires entries on its own; only the memory backend needs the
    // periodic sweep.
    if config.storage.backend == StoreBackendKind::Memory {
        spawn_cleanup_task(store.clone(), config.limits.cleanup_interval_minutes);
    }

    let catalog = FileCatalog::load(&config.catalog.metadata_path, config.catalog.text_dir.clone())
        .context("failed to load paper catalog")?;

    let completion: Option<Arc<dyn CompletionClient>> = match config.completion.api_key.as_deref() {
        Some(api_key) => Some(Arc::new(OpenAiCompletionClient::new(
            config.completion.base_url.clone(),
            api_key,
            config.completion.model.clone(),
        ))),
        None => {
            warn!("OPENAI_API_KEY not set; chat requests will be rejected as unavailable");
            None
        }
    };

    let analytics: Arc<dyn MessageLog> = match config.analytics.db_path.as_ref() {
        Some(path) => Arc::new(
            SqliteMessageLog::open(path).context("failed to open analytics database")?,
        ),
        None => Arc::new(NoopMessageLog),
    };

    let service = ChatService::new(
        store,
        Arc::new(catalog),
        completion,
        analytics,
        config.limits.clone(),
    );
    let app = routes::router(AppState {
        service: Arc::new(service),
    });

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!("listening on {}", cli.listen);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
