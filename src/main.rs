use std::sync::Arc;
use water_quality_monitor::{
    api::{build_router, AppState},
    config::Config,
    ml::InferenceService,
    state::create_record_store,
    telemetry,
    AppError,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });
    config.validate()?;

    telemetry::init_tracing(&config.observability);

    tracing::info!(
        service = %config.observability.service_name,
        "Starting water quality monitor v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize record store
    tracing::info!("Record backend: {:?}", config.records.backend);
    let records = create_record_store(&config.records)?;

    // Initialize inference service
    let inference = Arc::new(InferenceService::new(&config.ml.artifact_path));
    if config.ml.load_on_startup {
        match inference.bundle() {
            Ok(bundle) => tracing::info!(
                trained_at = %bundle.metadata().trained_at,
                n_trees = bundle.metadata().n_trees,
                "Model bundle warmed"
            ),
            Err(AppError::ArtifactNotFound(path)) => {
                tracing::warn!(path = %path, "No model bundle yet; predictions fail until `wq-cli train` runs")
            }
            Err(e) => tracing::warn!(error = %e, "Model bundle could not be loaded at startup"),
        }
    }

    let app = build_router(AppState::new(inference, records));

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Readings: http://{}/v1/readings", http_addr);
    tracing::info!("   Predictions: http://{}/v1/predict", http_addr);

    axum::serve(http_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
