use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use upload_server::{
    config::{AppConfig, StorageKind},
    create_app,
    errors::StartupError,
    pipeline::UploadPipeline,
    storage::{InMemoryStorage, LocalFileStorage, Storage},
};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("upload_server=debug,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let storage: Arc<dyn Storage> = match config.storage_type {
        StorageKind::Memory => Arc::new(InMemoryStorage::new()),
        StorageKind::Local => Arc::new(LocalFileStorage::new(&config.storage_path)),
    };

    let dir = storage.ensure_dir().await?;
    let existing = storage.list().await?.len();
    tracing::info!(dir = %dir.display(), existing, "upload storage ready");

    let pipeline = Arc::new(UploadPipeline::new(storage, config.policy.clone()));
    let app = create_app(pipeline);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server running on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
