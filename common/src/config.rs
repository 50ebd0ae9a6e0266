// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use config::{Config as ConfigFile, File, Environment};

use crate::embed::paths::DEFAULT_REWRITE_APPS;

/// Central configuration for the embed gateway
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the gateway binds to
    pub gateway_addr: String,
    /// Origin the browser sees, e.g. `http://localhost:8080`
    pub public_origin: String,
    /// Base URL of the platform router the gateway forwards to
    pub upstream_url: String,
    /// Apps that hard-code absolute URLs and need path rewriting
    pub rewrite_apps: Vec<String>,
    pub log_level: String,
    /// Largest request body buffered for forwarding
    pub max_body_bytes: usize,

    pub registry: RegistryConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Tracked clients idle longer than this are evicted
    pub idle_ttl_secs: i64,
    pub cleanup_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 86400,
            cleanup_interval_secs: 3600,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_addr: "127.0.0.1:8080".to_string(),
            public_origin: "http://localhost:8080".to_string(),
            upstream_url: "http://127.0.0.1:8081".to_string(),
            rewrite_apps: DEFAULT_REWRITE_APPS.iter().map(|s| s.to_string()).collect(),
            log_level: "info".to_string(),
            max_body_bytes: 64 * 1024 * 1024,
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Environment variables with prefix "APP", e.g. APP__PUBLIC_ORIGIN
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rewrite_apps")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from files, falling back to plain environment variables
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let defaults = Self::default();

                let gateway_addr = env::var("GATEWAY_ADDR")
                    .unwrap_or(defaults.gateway_addr);

                let public_origin = env::var("PUBLIC_ORIGIN")
                    .unwrap_or(defaults.public_origin);

                let upstream_url = env::var("UPSTREAM_URL")
                    .unwrap_or(defaults.upstream_url);

                let rewrite_apps = env::var("REWRITE_APPS")
                    .map(|v| parse_list(&v))
                    .unwrap_or(defaults.rewrite_apps);

                let log_level = env::var("LOG_LEVEL")
                    .unwrap_or(defaults.log_level);

                let max_body_bytes = env::var("MAX_BODY_BYTES")
                    .ok()
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(defaults.max_body_bytes);

                let idle_ttl_secs = env::var("REGISTRY_IDLE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(defaults.registry.idle_ttl_secs);

                let cleanup_interval_secs = env::var("REGISTRY_CLEANUP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.registry.cleanup_interval_secs);

                Self {
                    gateway_addr,
                    public_origin,
                    upstream_url,
                    rewrite_apps,
                    log_level,
                    max_body_bytes,
                    registry: RegistryConfig {
                        idle_ttl_secs,
                        cleanup_interval_secs,
                    },
                }
            }
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
