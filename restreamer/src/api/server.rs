//! API server setup and configuration.

use axum::{Router, extract::Request};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::config::AppConfig;
use crate::database::repositories::DestinationRepository;
use crate::error::Result;
use crate::logging::LoggingConfig;
use crate::reconciler::Reconciler;
use crate::services::ServiceContainer;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Maximum request body size in bytes.
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: crate::config::DEFAULT_BIND_ADDRESS.to_string(),
            port: crate::config::DEFAULT_PORT,
            enable_cors: true,
            body_limit: 1024 * 1024,
        }
    }
}

impl From<&AppConfig> for ApiServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            port: config.port,
            ..Self::default()
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub destinations: Option<Arc<dyn DestinationRepository>>,
    pub reconciler: Option<Arc<Reconciler>>,
    pub logging_config: Option<Arc<LoggingConfig>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            destinations: None,
            reconciler: None,
            logging_config: None,
        }
    }

    /// State backed by the services of a container.
    pub fn from_container(container: &ServiceContainer) -> Self {
        Self::new()
            .with_destination_repository(container.destinations.clone())
            .with_reconciler(container.reconciler.clone())
    }

    pub fn with_destination_repository(mut self, repo: Arc<dyn DestinationRepository>) -> Self {
        self.destinations = Some(repo);
        self
    }

    pub fn with_reconciler(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn with_logging_config(mut self, config: Arc<LoggingConfig>) -> Self {
        self.logging_config = Some(config);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// The HTTP server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self::with_state(config, AppState::new())
    }

    pub fn with_state(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Shut the server down when `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Router with the middleware stack applied.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone())
            .layer(axum::extract::DefaultBodyLimit::max(self.config.body_limit));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    // Health probes are too chatty to trace.
                    if req.uri().path().starts_with("/api/health") {
                        Span::none()
                    } else {
                        use tower_http::trace::MakeSpan;
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        make_span.make_span(req)
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        use tower_http::trace::OnResponse;
                        tower_http::trace::DefaultOnResponse::new()
                            .level(tracing::Level::INFO)
                            .on_response(res, latency, span);
                    },
                ),
        )
    }

    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| crate::Error::config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await?;

        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
