//! Application configuration for the asset build pipeline.
//!
//! User config lives at `~/.geoasset/geoasset.toml`.
//! CLI flags override config file values, which override defaults.
//! The file only ever names environment variables; secrets themselves are
//! read from the environment at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GeoAssetError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "geoasset.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".geoasset";

// ---------------------------------------------------------------------------
// Config structs (matching geoasset.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Status callback settings.
    #[serde(default)]
    pub callback: CallbackConfig,

    /// Step Runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Object storage settings.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Tile set reconciliation settings.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Spatial database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// `[callback]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Env var holding the callback base URL.
    #[serde(default = "default_status_url_env")]
    pub status_url_env: String,

    /// Env var holding the bearer token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Env var holding the job identifier.
    #[serde(default = "default_job_id_env")]
    pub job_id_env: String,

    /// Request timeout for the single callback attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            status_url_env: default_status_url_env(),
            token_env: default_token_env(),
            job_id_env: default_job_id_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_status_url_env() -> String {
    "STATUS_URL".into()
}
fn default_token_env() -> String {
    "SERVICE_ACCOUNT_TOKEN".into()
}
fn default_job_id_env() -> String {
    "AWS_BATCH_JOB_ID".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[runner]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Bytes of redacted output kept for the callback detail.
    #[serde(default = "default_detail_limit")]
    pub detail_limit_bytes: usize,

    /// Directory for full, unredacted job logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Parent directory for per-job working directories.
    #[serde(default = "default_work_root")]
    pub work_root: String,

    /// Variable names whose `NAME=value` lines are masked.
    #[serde(default = "default_redact_variables")]
    pub redact_variables: Vec<String>,

    /// Extra whole-line rules, tried after the variable names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redact_patterns: Vec<RedactPattern>,
}

/// A `[[runner.redact_patterns]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactPattern {
    /// Regex anchored at line start.
    pub pattern: String,
    /// Text that replaces the whole line.
    pub replacement: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            detail_limit_bytes: default_detail_limit(),
            log_dir: default_log_dir(),
            work_root: default_work_root(),
            redact_variables: default_redact_variables(),
            redact_patterns: Vec::new(),
        }
    }
}

fn default_detail_limit() -> usize {
    1000
}
fn default_log_dir() -> String {
    "~/.geoasset/logs".into()
}
fn default_work_root() -> String {
    "/tmp/geoasset".into()
}

/// Credential-bearing variables masked in captured output.
pub fn default_redact_variables() -> Vec<String> {
    [
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_SESSION_TOKEN",
        "PGPASSWORD",
        "PGUSER",
        "SERVICE_ACCOUNT_TOKEN",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[object_store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Env var holding the S3 region.
    #[serde(default = "default_region_env")]
    pub region_env: String,

    /// Env var holding an alternative S3 endpoint (e.g. a local test server).
    #[serde(default = "default_endpoint_env")]
    pub endpoint_env: String,

    /// Serve every bucket from `<local_root>/<bucket>` instead of S3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_root: Option<String>,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            region_env: default_region_env(),
            endpoint_env: default_endpoint_env(),
            local_root: None,
        }
    }
}

fn default_region_env() -> String {
    "AWS_REGION".into()
}
fn default_endpoint_env() -> String {
    "AWS_S3_ENDPOINT".into()
}

/// `[reconcile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Concurrent tile copies.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// File extension identifying tile objects.
    #[serde(default = "default_tile_extension")]
    pub tile_extension: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            tile_extension: default_tile_extension(),
        }
    }
}

fn default_concurrency() -> usize {
    32
}
fn default_tile_extension() -> String {
    ".tif".into()
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the libSQL database holding spatial tables.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.geoasset/geoasset.db".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.geoasset/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GeoAssetError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.geoasset/geoasset.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GeoAssetError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| GeoAssetError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GeoAssetError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GeoAssetError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GeoAssetError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Read a non-empty environment variable by name.
pub fn env_value(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("STATUS_URL"));
        assert!(toml_str.contains("SERVICE_ACCOUNT_TOKEN"));
        assert!(toml_str.contains("detail_limit_bytes = 1000"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.reconcile.concurrency, 32);
        assert_eq!(parsed.reconcile.tile_extension, ".tif");
        assert_eq!(parsed.callback.job_id_env, "AWS_BATCH_JOB_ID");
        assert!(parsed.object_store.local_root.is_none());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[reconcile]
concurrency = 8

[object_store]
local_root = "/srv/buckets"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.reconcile.concurrency, 8);
        assert_eq!(config.reconcile.tile_extension, ".tif");
        assert_eq!(config.object_store.local_root.as_deref(), Some("/srv/buckets"));
        assert_eq!(config.object_store.endpoint_env, "AWS_S3_ENDPOINT");
        assert_eq!(config.runner.redact_variables, default_redact_variables());
        assert!(config.runner.redact_patterns.is_empty());
    }

    #[test]
    fn redact_patterns_parse() {
        let toml_str = r#"
[[runner.redact_patterns]]
pattern = "postgres(ql)?://"
replacement = "DATABASE_URL=***"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.runner.redact_patterns.len(), 1);
        assert_eq!(config.runner.redact_patterns[0].replacement, "DATABASE_URL=***");
        assert_eq!(config.runner.detail_limit_bytes, 1000);
    }

    #[test]
    fn redact_defaults_cover_credentials() {
        let names = default_redact_variables();
        assert!(names.iter().any(|n| n == "AWS_SECRET_ACCESS_KEY"));
        assert!(names.iter().any(|n| n == "PGPASSWORD"));
        assert!(names.iter().any(|n| n == "AWS_SESSION_TOKEN"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/log/x"), PathBuf::from("/var/log/x"));
        let expanded = expand_home("~/logs");
        assert!(expanded.ends_with("logs"));
    }

    #[test]
    fn env_value_ignores_unset() {
        // Use a unique env var name to avoid interfering with other tests
        assert!(env_value("GEOASSET_TEST_NONEXISTENT_VAR_12345").is_none());
    }
}
