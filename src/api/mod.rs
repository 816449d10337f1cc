//! HTTP API server
//!
//! Thin axum layer over [`VoicePipeline`]: multipart upload endpoints for
//! voice turns, session history, direct synthesis, a health probe, and
//! static serving of persisted fallback audio.

mod health;
mod voice;

pub use health::HealthResponse;
pub use voice::{GenerateAudioRequest, GenerateAudioResponse, HistoryResponse, VoiceError};

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::pipeline::VoicePipeline;

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared state for API handlers
pub struct ApiState {
    pub pipeline: Arc<VoicePipeline>,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(pipeline: Arc<VoicePipeline>, host: impl Into<String>, port: u16) -> Self {
        Self {
            state: Arc::new(ApiState { pipeline }),
            host: host.into(),
            port,
        }
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(health::router(self.state.clone()))
            .merge(voice::router(self.state.clone()))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

        // Persisted fallback audio is referenced by URL path
        let fallback = self.state.pipeline.fallback();
        let prefix = fallback.url_prefix();
        if prefix.starts_with('/') && prefix.len() > 1 {
            router = router.nest_service(prefix, ServeDir::new(fallback.dir()));
            tracing::info!(
                path = %fallback.dir().display(),
                prefix,
                "serving fallback audio"
            );
        }

        // CORS layer for cross-origin requests from browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind
    pub async fn run(self) -> Result<()> {
        let pipeline = &self.state.pipeline;

        tokio::fs::create_dir_all(pipeline.fallback().dir()).await?;
        let sweeper = pipeline.sessions().spawn_sweeper();

        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            addr = %addr,
            providers = ?pipeline.readiness(),
            "API server listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        tracing::info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
