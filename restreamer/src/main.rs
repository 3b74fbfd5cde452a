use std::sync::Arc;

use restreamer::api::{ApiServer, ApiServerConfig, AppState};
use restreamer::config::AppConfig;
use restreamer::database;
use restreamer::logging::{LogSettings, init_logging};
use restreamer::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let (logging_config, _log_guard) = init_logging(&LogSettings::from_env())?;

    let config = AppConfig::from_env()?;
    tracing::info!(
        "Starting restreamer v{} (project {})",
        env!("CARGO_PKG_VERSION"),
        config.project_name
    );

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let container = ServiceContainer::new(pool, config.clone())?;
    let cancel_token = container.cancellation_token();

    logging_config.start_retention_cleanup(cancel_token.child_token());

    let poll_handle = container.start_polling();

    let state =
        AppState::from_container(&container).with_logging_config(Arc::clone(&logging_config));
    let server = ApiServer::with_state(ApiServerConfig::from(&config), state)
        .with_cancel_token(cancel_token.child_token());
    let mut server_handle = tokio::spawn(async move { server.run().await });

    let mut server_exit = None;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        }
        _ = cancel_token.cancelled() => {}
        result = &mut server_handle => {
            tracing::error!("API server exited, shutting down");
            server_exit = Some(result);
        }
    }

    container.shutdown();

    if let Err(e) = poll_handle.await {
        tracing::warn!("Poll scheduler task ended abnormally: {}", e);
    }
    let server_result = match server_exit {
        Some(result) => result,
        None => server_handle.await,
    };
    let server_error = match server_result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            tracing::error!("API server error: {}", e);
            Some(e)
        }
        Err(e) => {
            tracing::warn!("API server task ended abnormally: {}", e);
            None
        }
    };

    container.pool.close().await;
    tracing::info!("restreamer stopped");

    match server_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
