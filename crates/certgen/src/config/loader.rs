use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::renderer::Language;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub const ENV_DATABASE_PATH: &str = "CERTGEN_DATABASE_PATH";
pub const ENV_STORAGE_DIR: &str = "CERTGEN_STORAGE_DIR";
pub const ENV_BASE_URL: &str = "CERTGEN_BASE_URL";
pub const ENV_MAX_BATCH_SIZE: &str = "CERTGEN_MAX_BATCH_SIZE";
pub const ENV_ITEM_TIMEOUT_SECS: &str = "CERTGEN_ITEM_TIMEOUT_SECS";
pub const ENV_PLATFORM_NAME: &str = "CERTGEN_PLATFORM_NAME";

/// Loads, validates and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Applies `CERTGEN_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

fn apply_overrides_from<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(path) = lookup(ENV_DATABASE_PATH) {
        config.database_path = PathBuf::from(path);
    }
    if let Some(dir) = lookup(ENV_STORAGE_DIR) {
        config.storage_directory = PathBuf::from(dir);
    }
    if let Some(url) = lookup(ENV_BASE_URL) {
        config.public_base_url = url;
    }
    if let Some(name) = lookup(ENV_PLATFORM_NAME) {
        config.platform_name = name;
    }
    if let Some(raw) = lookup(ENV_MAX_BATCH_SIZE) {
        config.batch.max_batch_size = parse_positive(ENV_MAX_BATCH_SIZE, &raw)?;
    }
    if let Some(raw) = lookup(ENV_ITEM_TIMEOUT_SECS) {
        config.batch.item_timeout_secs = parse_positive(ENV_ITEM_TIMEOUT_SECS, &raw)?;
    }
    Ok(())
}

fn parse_positive<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        name,
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::InvalidEnv {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks that go beyond the schema. Runs again after environment overrides.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    for (field, value) in [
        ("public_base_url", config.public_base_url.as_str()),
        ("verification_base_url", config.verification_base_url()),
    ] {
        let parsed = url::Url::parse(value).map_err(|e| ConfigError::Validation {
            message: format!("{} '{}' is not a valid URL: {}", field, value, e),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                message: format!("{} must use http or https", field),
            });
        }
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }
    if config.batch.max_batch_size == 0 || config.batch.item_concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "batch.max_batch_size and batch.item_concurrency must be at least 1"
                .to_string(),
        });
    }
    if config.batch.item_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "batch.item_timeout_secs must be at least 1".to_string(),
        });
    }
    if config.storage.retry_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "storage.retry_attempts must be at least 1".to_string(),
        });
    }
    if config.retention.job_retention_days == 0 || config.retention.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "retention.job_retention_days and retention.sweep_interval_secs must be at least 1"
                .to_string(),
        });
    }

    if let Err(reason) = Language::from_str(&config.rendering.default_language) {
        return Err(ConfigError::Validation {
            message: format!("rendering.default_language: {}", reason),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.batch.max_batch_size, 100);
        assert_eq!(config.batch.item_concurrency, 5);
        assert_eq!(config.batch.item_timeout_secs, 300);
        assert_eq!(config.batch.estimate_per_student_ms, 3000);
        assert_eq!(config.retention.job_retention_days, 30);
        assert_eq!(config.rendering.default_language, "en");
        assert!(config.worker_count >= 1);
        assert_eq!(config.verification_base_url(), config.public_base_url);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/var/lib/certgen/certgen.db",
            "storage_directory": "/var/lib/certgen/storage",
            "public_base_url": "https://learn.example.com",
            "verification_base_url": "https://verify.example.com",
            "platform_name": "Example Academy",
            "worker_count": 4,
            "batch": { "max_batch_size": 250, "item_concurrency": 8 },
            "storage": { "quota_bytes": 1048576 },
            "rendering": {
                "default_language": "ar",
                "fonts": { "NotoNaskhArabic": "/usr/share/fonts/NotoNaskhArabic-Regular.ttf" }
            }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.batch.max_batch_size, 250);
        assert_eq!(config.batch.item_timeout_secs, 300);
        assert_eq!(config.storage.quota_bytes, Some(1_048_576));
        assert_eq!(config.verification_base_url(), "https://verify.example.com");
        assert_eq!(config.batch_settings().item_concurrency, 8);
        assert_eq!(
            config.rendering.fonts.get("NotoNaskhArabic"),
            Some(&PathBuf::from("/usr/share/fonts/NotoNaskhArabic-Regular.ttf"))
        );
    }

    #[test]
    fn test_schema_rejects_non_string_font_path() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "rendering": { "fonts": { "NotoNaskhArabic": 7 } } }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_unknown_fields() {
        let result = load_config_from_str(r#"{ "version": "1.0", "input_directory": "/in" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_missing_version() {
        let result = load_config_from_str(r#"{ "worker_count": 2 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_zero_batch_size() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "batch": { "max_batch_size": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_base_url() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "public_base_url": "not a url" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));

        let result =
            load_config_from_str(r#"{ "version": "1.0", "public_base_url": "ftp://files.example.com" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_DATABASE_PATH, "/tmp/override.db"),
            (ENV_BASE_URL, "https://override.example.com"),
            (ENV_MAX_BATCH_SIZE, "20"),
            (ENV_ITEM_TIMEOUT_SECS, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_overrides_from(&mut config, |name| env.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.public_base_url, "https://override.example.com");
        assert_eq!(config.batch.max_batch_size, 20);
        assert_eq!(config.batch.item_timeout_secs, 300);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = Config::default();
        let result = apply_overrides_from(&mut config, |name| {
            (name == ENV_MAX_BATCH_SIZE).then(|| "lots".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv {
                name: ENV_MAX_BATCH_SIZE,
                ..
            })
        ));

        let result = apply_overrides_from(&mut config, |name| {
            (name == ENV_ITEM_TIMEOUT_SECS).then(|| "0".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    #[serial]
    fn test_load_config_reads_file_and_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "version": "1.0", "platform_name": "File Academy" }}"#).unwrap();

        std::env::set_var(ENV_PLATFORM_NAME, "Env Academy");
        let config = load_config(file.path());
        std::env::remove_var(ENV_PLATFORM_NAME);

        assert_eq!(config.unwrap().platform_name, "Env Academy");
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/certgen.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
