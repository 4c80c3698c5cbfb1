use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::ml::{InferenceService, LatestPrediction, ModelInfo, Prediction};
use crate::models::{FeatureInput, SensorReading};
use crate::state::readings_to_csv;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Run `f` on the blocking pool; bundle loads do file I/O and decoding under a mutex.
async fn with_inference<T, F>(state: &AppState, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&InferenceService) -> Result<T> + Send + 'static,
{
    let inference = Arc::clone(&state.inference);
    tokio::task::spawn_blocking(move || f(&inference))
        .await
        .map_err(|e| AppError::Internal(format!("Inference task failed: {}", e)))?
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_state: state.inference.state().to_string(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_state: String,
}

/// Store a reading pushed by the field device
pub async fn submit_reading(
    State(state): State<AppState>,
    Json(request): Json<SubmitReadingRequest>,
) -> Result<(StatusCode, Json<ReadingResponse>)> {
    request.validate()?;
    let reading = request.into_reading()?;

    state.records.append(reading.clone()).await?;
    tracing::info!(
        ph = reading.ph_value,
        turbidity = reading.turbidity,
        temperature = reading.temperature,
        flow = reading.flow_value,
        "Reading received"
    );

    Ok((
        StatusCode::CREATED,
        Json(ReadingResponse {
            status: "stored".to_string(),
            reading,
        }),
    ))
}

/// Body of `POST /v1/readings`; every field is required
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SubmitReadingRequest {
    #[validate(required)]
    pub ph_value: Option<f64>,
    #[validate(required)]
    pub turbidity: Option<f64>,
    #[validate(required)]
    pub temperature: Option<f64>,
    #[validate(required)]
    pub flow_value: Option<f64>,
}

impl SubmitReadingRequest {
    fn into_reading(self) -> Result<SensorReading> {
        let field = |value: Option<f64>, name: &str| {
            value.ok_or_else(|| AppError::Validation(format!("{} is required", name)))
        };
        Ok(SensorReading::new(
            field(self.ph_value, "ph_value")?,
            field(self.turbidity, "turbidity")?,
            field(self.temperature, "temperature")?,
            field(self.flow_value, "flow_value")?,
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadingResponse {
    pub status: String,
    pub reading: SensorReading,
}

/// Most recent stored reading
pub async fn latest_reading(State(state): State<AppState>) -> Result<Json<SensorReading>> {
    let reading = state
        .records
        .latest()
        .await?
        .ok_or(AppError::NoRecordsAvailable)?;
    Ok(Json(reading))
}

/// Download the whole reading log as CSV
pub async fn export_readings(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let readings = state.records.all().await?;
    let body = readings_to_csv(&readings)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"readings.csv\""),
        ],
        body,
    ))
}

/// Predict every target for the posted feature mapping
pub async fn predict(
    State(state): State<AppState>,
    Json(input): Json<FeatureInput>,
) -> Result<Json<PredictResponse>> {
    let prediction = with_inference(&state, move |inference| inference.predict(&input)).await?;
    Ok(Json(PredictResponse { prediction }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Prediction,
}

/// Predict from the newest stored reading
pub async fn predict_latest(State(state): State<AppState>) -> Result<Json<LatestPrediction>> {
    let reading = state
        .records
        .latest()
        .await?
        .ok_or(AppError::NoRecordsAvailable)?;
    let features = reading.to_features();
    let prediction =
        with_inference(&state, move |inference| inference.predict(&features)).await?;

    Ok(Json(LatestPrediction {
        reading,
        prediction,
    }))
}

/// Inference state and bundle details
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.inference.info())
}

/// Drop the cached bundle and load the current one from disk
pub async fn reload_model(State(state): State<AppState>) -> Result<Json<ModelInfo>> {
    let info = with_inference(&state, |inference| {
        inference.reload()?;
        Ok(inference.info())
    })
    .await?;
    Ok(Json(info))
}
