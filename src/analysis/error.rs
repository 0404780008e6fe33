//! Error types for the analysis pipeline

use crate::analysis::types::CanonicalField;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Required column for {field} could not be resolved (headers: {headers})")]
    MissingColumn {
        field: CanonicalField,
        headers: String,
    },

    #[error("Missing required configuration field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {details}")]
    InvalidConfig { field: &'static str, details: String },

    #[error("Unknown canonical field in column overrides: {0}")]
    UnknownField(String),

    #[error("Column override for {field} names a header that is not in the input: {header}")]
    OverrideNotFound {
        field: CanonicalField,
        header: String,
    },

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("No CSV file found in ZIP archive")]
    NoCsvInArchive,

    #[error("No sheets found in workbook")]
    EmptyWorkbook,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
