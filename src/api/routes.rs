use crate::api::{handlers, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        // Sensor readings
        .route("/v1/readings", post(handlers::submit_reading))
        .route("/v1/readings/latest", get(handlers::latest_reading))
        .route("/v1/readings/export", get(handlers::export_readings))
        // Predictions
        .route("/v1/predict", post(handlers::predict))
        .route("/v1/predict/latest", get(handlers::predict_latest))
        // Model lifecycle
        .route("/v1/model", get(handlers::model_info))
        .route("/v1/model/reload", post(handlers::reload_model))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
