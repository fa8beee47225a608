use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;

use actions_exporter::api;
use actions_exporter::cache::{ActionsCache, RecheckPolicy};
use actions_exporter::cli::Cli;
use actions_exporter::clock::{Clock, SystemClock};
use actions_exporter::config::Config;
use actions_exporter::error::AppError;
use actions_exporter::fetcher::wait_for_quota;
use actions_exporter::logging::init_logging;
use actions_exporter::metrics::AppMetrics;
use actions_exporter::producers;
use actions_exporter::scheduler;
use actions_exporter::services::github::{resolve_api_base, GithubApi, GithubClient};

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(err) = run(cli).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::from_env_with(&cli.overrides()).map_err(AppError::Config)?;
    tracing::info!("Service started with config: {:?}", config);

    let base_url = resolve_api_base(&config.api_url)?;
    let token = config.github_token.as_ref().map(|t| t.0.as_str());
    let client: Arc<dyn GithubApi> = Arc::new(GithubClient::new(base_url, token)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(AppMetrics::new(&config.export_fields)?);

    wait_for_quota(client.as_ref(), clock.as_ref()).await;

    let cache = Arc::new(ActionsCache::new(
        client,
        clock,
        config.scope.clone(),
        RecheckPolicy::from_config(&config),
    ));
    cache.pre_seed().await;

    let cache_jobs = scheduler::start(
        cache.clone(),
        config.repo_refresh_interval,
        config.workflow_refresh_interval,
    );
    let producer_jobs = producers::start(cache, metrics.clone(), config.refresh_interval);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Startup(format!("bind {addr}: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let served = axum::serve(listener, api::router(metrics))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Startup(format!("server: {e}")));

    tracing::info!("Shutting down background jobs");
    producer_jobs.shutdown().await;
    cache_jobs.shutdown().await;

    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        return;
    }
    tracing::info!("Shutdown signal received");
}
