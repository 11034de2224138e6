//! Crosscheck REST API Server
//!
//! HTTP server over the conflict review engine: value writes, conflict
//! detection and caching, the resolution workflow, and the downstream gate.

use clap::Parser;
use crosscheck_api::create_router_with_config;
use crosscheck_engine::EngineConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crosscheck conflict review REST API server
#[derive(Parser, Debug)]
#[command(
    name = "crosscheck-server",
    about = "REST API server for the crosscheck conflict review system",
    version
)]
struct Args {
    /// Server host address
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "CROSSCHECK_HOST")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "3000", env = "CROSSCHECK_PORT")]
    port: u16,

    /// Trigger mode: immediate, deferred, or mixed
    #[arg(long, default_value = "immediate", env = "CROSSCHECK_TRIGGER_MODE")]
    trigger_mode: String,

    /// Fields detected synchronously in mixed mode (comma separated)
    #[arg(long, value_delimiter = ',', env = "CROSSCHECK_IMMEDIATE_FIELDS")]
    immediate_fields: Vec<String>,

    /// Conflict cache freshness window in seconds
    #[arg(long, default_value = "300", env = "CROSSCHECK_CACHE_TTL_SECS")]
    cache_ttl_secs: u64,

    /// Logging level
    #[arg(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Enable JSON formatted logs
    #[arg(long, default_value = "false", env = "CROSSCHECK_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&args);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid host or port: {}", e))?;

    let config = EngineConfig::default()
        .with_trigger_mode(args.trigger_mode.clone())
        .with_immediate_fields(args.immediate_fields.clone())
        .with_cache_ttl(Duration::from_secs(args.cache_ttl_secs));

    let app = create_router_with_config(config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!("Server starting on http://{}", addr);
    info!("Health check available at http://{}/health", addr);
    info!(trigger_mode = %args.trigger_mode, cache_ttl_secs = args.cache_ttl_secs, "engine configured");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

/// Initialize tracing subscriber with appropriate configuration
fn init_tracing(args: &Args) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
