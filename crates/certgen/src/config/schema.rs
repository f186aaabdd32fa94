use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::BatchSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_storage_directory")]
    pub storage_directory: PathBuf,
    #[serde(default = "default_base_url")]
    pub public_base_url: String,
    /// Base of the URL encoded in each QR code. Defaults to `public_base_url`.
    #[serde(default)]
    pub verification_base_url: Option<String>,
    #[serde(default = "default_platform_name")]
    pub platform_name: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub rendering: RenderingConfig,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".certgen")
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path()
        .unwrap_or_else(|| default_data_dir().join("data").join("certgen.db"))
}

fn default_storage_directory() -> PathBuf {
    default_data_dir().join("storage")
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_platform_name() -> String {
    "Learning Platform".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Config {
    pub fn verification_base_url(&self) -> &str {
        self.verification_base_url
            .as_deref()
            .unwrap_or(&self.public_base_url)
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            max_batch_size: self.batch.max_batch_size,
            item_concurrency: self.batch.item_concurrency,
            item_timeout: Duration::from_secs(self.batch.item_timeout_secs),
            estimate_per_student_ms: self.batch.estimate_per_student_ms,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: default_database_path(),
            storage_directory: default_storage_directory(),
            public_base_url: default_base_url(),
            verification_base_url: None,
            platform_name: default_platform_name(),
            worker_count: default_worker_count(),
            batch: BatchConfig::default(),
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            rendering: RenderingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_item_concurrency")]
    pub item_concurrency: usize,
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,
    #[serde(default = "default_estimate_per_student_ms")]
    pub estimate_per_student_ms: u64,
}

fn default_max_batch_size() -> usize {
    100
}

fn default_item_concurrency() -> usize {
    5
}

fn default_item_timeout_secs() -> u64 {
    300
}

fn default_estimate_per_student_ms() -> u64 {
    3000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            item_concurrency: default_item_concurrency(),
            item_timeout_secs: default_item_timeout_secs(),
            estimate_per_student_ms: default_estimate_per_student_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Maximum total bytes under the certificate directory. Unlimited when absent.
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quota_bytes: None,
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_job_retention_days")]
    pub job_retention_days: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_job_retention_days() -> u32 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_retention_days: default_job_retention_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderingConfig {
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_template_version")]
    pub template_version: String,
    /// TrueType font per template font family, e.g. `NotoNaskhArabic`.
    #[serde(default)]
    pub fonts: BTreeMap<String, PathBuf>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_template_version() -> String {
    "1.0".to_string()
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            template_version: default_template_version(),
            fonts: BTreeMap::new(),
        }
    }
}
