use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum CertgenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value for environment variable {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
}

/// The operating system could not supply random bytes.
#[derive(Error, Debug)]
#[error("Entropy source unavailable: {0}")]
pub struct EntropyUnavailable(pub String);

/// Rejections raised while admitting a batch, before anything is persisted.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Invalid batch request: {0}")]
    InvalidBatchRequest(String),

    #[error("Batch size {size} exceeds maximum of {max} students")]
    BatchTooLarge { size: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("Batch job not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Entropy(#[from] EntropyUnavailable),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Failures that abort a whole batch job rather than a single roster entry.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Batch job disappeared: {0}")]
    JobMissing(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Entropy(#[from] EntropyUnavailable),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(String),

    #[error("Unsupported language '{0}' and no usable fallback")]
    UnsupportedLanguage(String),

    #[error("QR code encoding failed: {0}")]
    QrEncoding(String),

    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("Failed to load font '{family}': {reason}")]
    Font { family: String, reason: String },

    #[error("No configured font for '{family}' can draw '{text}'")]
    MissingGlyphs { family: String, text: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Blob store unavailable while handling '{name}': {reason}")]
    Unavailable { name: String, reason: String },

    #[error("Storing '{name}' ({size} bytes) would exceed the quota of {quota} bytes")]
    QuotaExceeded { name: String, size: u64, quota: u64 },

    #[error("Invalid blob name '{0}'")]
    InvalidName(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Certificate not found: {0}")]
    NotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown share platform: {0}")]
    UnknownPlatform(String),

    #[error("Failed to build share URL: {0}")]
    ShareUrl(#[from] url::ParseError),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Entropy(#[from] EntropyUnavailable),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker pool is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, CertgenError>;
