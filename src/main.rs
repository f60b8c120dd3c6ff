//! sqlmend Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - SQLMEND_HOST: Bind address (default: 0.0.0.0)
//! - SQLMEND_PORT: Port number (default: 3001)
//! - SQLMEND_QUERY_TIMEOUT_SECS: Budget for one /query/run request (default: 120)
//! - SQLMEND_CACHE_TTL_SECS / SQLMEND_CACHE_CAPACITY: Translation cache (default: 300 / 500)
//! - SQLMEND_MAX_ATTEMPTS: Attempts per question (default: 5)
//! - SQLMEND_COMPACT_SCHEMA: Send the short schema to the model (default: false)
//! - OPENAI_API_KEY, OPENAI_BASE_URL, OPENAI_MODEL: Chat-completions endpoint
//! - DATABASE_URL: PostgreSQL connection string
//! - RUST_LOG: Log level (default: info)

use sqlmend::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlmend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("sqlmend configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Query timeout: {} seconds", config.query_timeout.as_secs());
    tracing::info!(
        "  Translation cache: {} entries, {} seconds TTL",
        config.cache_capacity,
        config.cache_ttl.as_secs()
    );

    println!(
        r#"
           _                           _
  ___  __ _| |_ __ ___   ___ _ __   __| |
 / __|/ _` | | '_ ` _ \ / _ \ '_ \ / _` |
 \__ \ (_| | | | | | | |  __/ | | | (_| |
 |___/\__, |_|_| |_| |_|\___|_| |_|\__,_|
         |_|

 Natural-Language SQL with Repair and Retry
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
