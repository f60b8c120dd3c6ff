use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{execute, health_check, run, schema, stats, translate, AppState};
use crate::llm::{LlmConfig, OpenAiGenerator};
use crate::query::{Orchestrator, OrchestratorConfig, TranslationCache};
use crate::store::PgExecutor;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub query_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            query_timeout: Duration::from_secs(120),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 500,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables
    ///
    /// SQLMEND_HOST=0.0.0.0
    /// SQLMEND_PORT=3001
    /// SQLMEND_QUERY_TIMEOUT_SECS=120
    /// SQLMEND_CACHE_TTL_SECS=300
    /// SQLMEND_CACHE_CAPACITY=500
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            host: std::env::var("SQLMEND_HOST").unwrap_or(defaults.host),
            port: std::env::var("SQLMEND_PORT")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            query_timeout: secs("SQLMEND_QUERY_TIMEOUT_SECS", defaults.query_timeout),
            cache_ttl: secs("SQLMEND_CACHE_TTL_SECS", defaults.cache_ttl),
            cache_capacity: std::env::var("SQLMEND_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.cache_capacity),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Natural language
        .route("/query/nl-to-sql", post(translate))
        .route("/query/run", post(run))
        // Raw SQL
        .route("/query/execute", post(execute))
        // Metadata
        .route("/schema", get(schema))
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let llm = LlmConfig::from_env();
    if !llm.is_configured() {
        tracing::warn!("OPENAI_API_KEY and OPENAI_BASE_URL are unset; natural-language endpoints will return 503");
    }
    let generator = Arc::new(OpenAiGenerator::new(llm)?);

    let executor = Arc::new(PgExecutor::from_env()?);
    if !executor.is_configured() {
        tracing::warn!("DATABASE_URL is unset; execution endpoints will return 503");
    }

    let orchestrator_config = OrchestratorConfig::from_env();
    tracing::info!(
        max_attempts = orchestrator_config.max_attempts,
        compact_schema = orchestrator_config.compact_schema,
        "Orchestrator configured"
    );

    let state = Arc::new(AppState {
        orchestrator: Arc::new(Orchestrator::new(generator, executor, orchestrator_config)),
        cache: TranslationCache::with_config(config.cache_capacity, config.cache_ttl),
        query_timeout: config.query_timeout,
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting sqlmend server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("sqlmend server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
