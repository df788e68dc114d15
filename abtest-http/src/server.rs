use abtest::AnalysisParams;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handlers::{health, significance, significance_csv, AppState};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7800";
pub const DEFAULT_MAX_BODY_MB: usize = 10;

/// Runtime settings for the HTTP service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub defaults: AnalysisParams,
    pub max_body_mb: usize,
}

pub fn build_router(state: Arc<AppState>, max_body_mb: usize) -> Router {
    let health_route = Router::new()
        .route("/health", get(health))
        .with_state(state.clone());

    let api = Router::new()
        .route("/2/significance", post(significance))
        .route("/2/significance/csv", post(significance_csv))
        .with_state(state);

    Router::new()
        .merge(health_route)
        .merge(api)
        .layer(DefaultBodyLimit::max(max_body_mb * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive().max_age(std::time::Duration::from_secs(86400)))
}

pub async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let startup_start = std::time::Instant::now();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    config.defaults.validate()?;

    tracing::info!(
        hypothesis = %config.defaults.hypothesis,
        alpha = config.defaults.alpha,
        max_body_mb = config.max_body_mb,
        "Analysis defaults loaded"
    );

    let state = Arc::new(AppState::new(config.defaults));
    let app = build_router(state, config.max_body_mb);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?.to_string();

    print_startup_banner(&local_addr, &config.defaults, startup_start.elapsed().as_millis());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn print_startup_banner(bind_addr: &str, defaults: &AnalysisParams, startup_ms: u128) {
    use colored::Colorize;

    let url = format!("http://{}", bind_addr);
    let version = format!("v{}", env!("CARGO_PKG_VERSION"));
    let timing = format!("ready in {}ms", startup_ms);
    let params = format!("{} test, alpha = {}", defaults.hypothesis, defaults.alpha);

    println!();
    println!(
        "  {} {}  {}",
        "A/B significance".bold().bright_green(),
        version.as_str().dimmed(),
        timing.as_str().dimmed(),
    );
    println!();
    println!("  {}  Local:      {}", "➜".green(), url.as_str().cyan());
    println!(
        "  {}  Endpoints:  {} {}",
        "➜".green(),
        "POST /2/significance".cyan(),
        "POST /2/significance/csv".cyan()
    );
    println!("  {}  Defaults:   {}", "➜".green(), params.as_str().dimmed());
    println!();
}
