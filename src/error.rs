//! Error types for AGATA

use thiserror::Error;

/// Errors that can occur while reading, validating or analyzing glucose data
#[derive(Debug, Error)]
pub enum AgataError {
    #[error("Invalid glucose data: {0}")]
    Validation(String),

    #[error("Unsupported glycemic target: {0} (expected `diabetes` or `pregnancy`)")]
    UnsupportedGlycemicTarget(String),

    #[error("Failed to parse CGM export: {0}")]
    Parse(String),

    #[error("Date parse error: {0}")]
    DateParse(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid workbook: {0}")]
    Xlsx(#[from] calamine::XlsxError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Insufficient data for computation: {0}")]
    InsufficientData(String),
}
