//! Error types for the CAV engine

use thiserror::Error;

/// Errors that can occur during scoring and ingestion
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Feature schema mismatch: overlap {overlap:.1}% < {required:.1}% (missing={missing}, unexpected={unexpected})")]
    SchemaMismatch {
        overlap: f64,
        required: f64,
        missing: usize,
        unexpected: usize,
    },

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Model artifact error: {0}")]
    ArtifactError(String),

    #[error("Feature extraction error: {0}")]
    FeatureError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
