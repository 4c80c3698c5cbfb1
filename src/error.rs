use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Training dataset is missing
    #[error("Dataset not found: {0}")]
    DataNotFound(String),

    /// Training dataset lacks expected columns
    #[error("Schema mismatch: missing columns [{}]", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    /// Malformed values in an otherwise well-formed dataset
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Label outside an encoder's fitted vocabulary
    #[error("Unknown label '{label}' for target '{target}'")]
    UnknownLabel { target: String, label: String },

    /// Numeric code outside an encoder's fitted vocabulary
    #[error("Unknown label code {code} for target '{target}'")]
    UnknownLabelCode { target: String, code: i64 },

    /// No artifact bundle has been written yet
    #[error("Artifact bundle not found at {0}; run `wq-cli train` first")]
    ArtifactNotFound(String),

    /// Artifact bundle exists but does not match this build's schema
    #[error("Incompatible artifact bundle: {0}")]
    ArtifactIncompatible(String),

    /// Record store holds no sensor readings
    #[error("No sensor records available")]
    NoRecordsAvailable,

    /// Classifier fit or predict failure
    #[error("Training error: {0}")]
    Training(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DataNotFound(_) => StatusCode::NOT_FOUND,
            AppError::SchemaMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UnknownLabel { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UnknownLabelCode { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ArtifactNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ArtifactIncompatible(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NoRecordsAvailable => StatusCode::NOT_FOUND,
            AppError::Training(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::DataNotFound(_) => "DATA_NOT_FOUND",
            AppError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            AppError::InvalidData(_) => "INVALID_DATA",
            AppError::UnknownLabel { .. } => "UNKNOWN_LABEL",
            AppError::UnknownLabelCode { .. } => "UNKNOWN_LABEL_CODE",
            AppError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            AppError::ArtifactIncompatible(_) => "ARTIFACT_INCOMPATIBLE",
            AppError::NoRecordsAvailable => "NO_RECORDS_AVAILABLE",
            AppError::Training(_) => "TRAINING_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from csv::Error
impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::InvalidData(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
