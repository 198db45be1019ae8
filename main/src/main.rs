use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, store::ContentStore},
    utils::config::{get_config, AppConfig},
};
use ingestion_pipeline::{pipeline::IngestionPipeline, run_worker_loop, IngestionConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let api_state = ApiState::new(&config).await?;
    let app = build_app(&api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    // The worker shares the server's database handle and store
    let worker = tokio::spawn(run_worker(
        Arc::clone(&api_state.db),
        config.clone(),
        api_state.store.clone(),
    ));

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
    worker.abort();

    Ok(())
}

fn build_app(api_state: &ApiState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes_v1(api_state))
        .with_state(api_state.clone())
}

async fn run_worker(db: Arc<SurrealDbClient>, config: AppConfig, store: ContentStore) {
    let ingestion_pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        IngestionConfig::from_app_config(&config),
    ));

    info!("Starting worker process");
    if let Err(e) = run_worker_loop(db, ingestion_pipeline, store).await {
        error!("Worker process error: {}", e);
    }
}
