//! Configuration loading.

pub mod toml_config;

pub use toml_config::{ConfigError, TrendConfig, DEFAULT_CONFIG_FILE};
