//! Shared types, error model, and configuration for the asset build pipeline.
//!
//! This crate is the foundation depended on by all other geoasset crates.
//! It provides:
//! - [`GeoAssetError`], the unified error type
//! - Domain types ([`JobId`], [`ChangeLog`], [`StatusUpdate`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CallbackConfig, DatabaseConfig, ObjectStoreConfig, ReconcileConfig, RedactPattern,
    RunnerConfig,
    config_dir, config_file_path, default_redact_variables, env_value, expand_home, init_config,
    load_config, load_config_from,
};
pub use error::{GeoAssetError, Result};
pub use types::{ChangeLog, ChangeLogStatus, JobId, StatusUpdate};
