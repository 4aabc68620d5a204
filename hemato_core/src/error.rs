//! Error types for the hemato_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for hemato_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Feature family name is not one of the fixed families
    #[error("Unknown feature family: {0}")]
    UnknownFamily(String),

    /// Filter called without any subject ids
    #[error("Selection contains no subject ids")]
    EmptySelection,

    /// Aggregation called without any grouping column
    #[error("At least one grouping column is required")]
    NoGroupingColumn,

    /// No subject in the filtered subset has a metadata row
    #[error("No selected subject has imported metadata")]
    InsufficientMetadata,

    /// Record rejected at ingestion
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Analyte schema violation (unknown code or column)
    #[error("Schema error: {0}")]
    Schema(String),

    /// Metadata import or join error
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error stems from user input the caller can correct
    /// (as opposed to an IO or format failure).
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Error::UnknownFamily(_)
                | Error::EmptySelection
                | Error::NoGroupingColumn
                | Error::InsufficientMetadata
        )
    }
}
