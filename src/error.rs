use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("No input files match '{pattern}' in {directory}")]
    NoInputFiles { directory: String, pattern: String },

    #[error("Normalization produced no canonical rows ({skipped} rows skipped, see diagnostics)")]
    EmptyResult { skipped: usize },

    #[error("Malformed file {file}: {details}")]
    MalformedFile { file: String, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid simulation adjustment for {platform}: {details}")]
    InvalidAdjustment { platform: String, details: String },

    #[error("Rollup mismatch for campaign '{campaign}' on {field}: aggregate {aggregate} != sum of leaves {leaves}")]
    RollupMismatch {
        campaign: String,
        field: &'static str,
        aggregate: i64,
        leaves: i64,
    },

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BudgetError>;
