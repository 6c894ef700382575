//! Configuration Management
//!
//! Handles persistent configuration storage for osvol and the `OS_*`
//! environment overrides.

use crate::openstack::client::BlockStorageClient;
use crate::resource::WaitTimings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Region to use when nothing else is configured
pub const DEFAULT_REGION: &str = "RegionOne";

const ENV_REGION: &str = "OS_REGION_NAME";
const ENV_TOKEN: &str = "OS_AUTH_TOKEN";
const ENV_VOLUME_URL: &str = "OS_VOLUME_API_URL";

/// Wait timing overrides, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TimingsConfig {
    #[serde(default)]
    pub create_timeout_secs: Option<u64>,
    #[serde(default)]
    pub delete_timeout_secs: Option<u64>,
    #[serde(default)]
    pub delay_secs: Option<u64>,
    #[serde(default)]
    pub min_poll_interval_secs: Option<u64>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Last used region
    #[serde(default)]
    pub region: Option<String>,
    /// Volume API endpoint per region
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    /// Pre-issued Keystone token
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub timings: TimingsConfig,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("osvol").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective region (CLI > OS_REGION_NAME > config > RegionOne)
    pub fn effective_region(&self, cli: Option<&str>) -> String {
        self.resolve_region(cli, env_var)
    }

    fn resolve_region(&self, cli: Option<&str>, env: impl Fn(&str) -> Option<String>) -> String {
        cli.map(str::to_string)
            .or_else(|| env(ENV_REGION))
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    fn resolve_endpoint(
        &self,
        region: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String> {
        env(ENV_VOLUME_URL)
            .or_else(|| self.endpoints.get(region).cloned())
            .with_context(|| {
                format!(
                    "No volume endpoint for region '{}'. Set {} or add it to the config file",
                    region, ENV_VOLUME_URL
                )
            })
    }

    fn resolve_token(&self, env: impl Fn(&str) -> Option<String>) -> Result<String> {
        env(ENV_TOKEN)
            .or_else(|| self.token.clone())
            .with_context(|| format!("No auth token configured. Set {}", ENV_TOKEN))
    }

    /// Build a block storage client for a region
    pub fn block_storage_client(&self, region: &str) -> Result<BlockStorageClient> {
        let build = || -> Result<BlockStorageClient> {
            let endpoint = self.resolve_endpoint(region, env_var)?;
            let token = self.resolve_token(env_var)?;
            BlockStorageClient::new(&endpoint, &token, region)
        };
        build().context("Error creating OpenStack block storage client")
    }

    /// Wait timings with config overrides applied
    pub fn timings(&self) -> WaitTimings {
        let defaults = WaitTimings::default();
        let secs = |v: Option<u64>, default: Duration| {
            v.map(Duration::from_secs).unwrap_or(default)
        };
        let t = &self.timings;

        WaitTimings {
            create_timeout: secs(t.create_timeout_secs, defaults.create_timeout),
            delete_timeout: secs(t.delete_timeout_secs, defaults.delete_timeout),
            delay: secs(t.delay_secs, defaults.delay),
            min_poll_interval: secs(t.min_poll_interval_secs, defaults.min_poll_interval),
        }
    }

    /// Set region and save
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        self.region = Some(region.to_string());
        self.save()
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
