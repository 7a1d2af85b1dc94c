//! Shim configuration loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;
use tokio::fs;

use crate::pool::PoolConfig;

fn default_max_idle() -> usize {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShimConfig {
    /// Backend address, `host:port`.
    pub server_addr: String,
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
    /// 0 means unbounded.
    #[serde(default)]
    pub max_active: usize,
    /// Cap on primary-pool connections reserved for internal resolver
    /// traffic; 0 means no cap.
    #[serde(default)]
    pub internal_max_active: usize,
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_conn_lifetime_secs: Option<u64>,
}

impl ShimConfig {
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ShimConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.ensure_valid()?;
        Ok(config)
    }

    pub fn ensure_valid(&self) -> anyhow::Result<()> {
        if self.server_addr.is_empty() {
            bail!("server_addr must not be empty");
        }
        if self.max_active > 0 && self.internal_max_active > self.max_active {
            bail!(
                "internal_max_active ({}) exceeds max_active ({})",
                self.internal_max_active,
                self.max_active
            );
        }
        Ok(())
    }

    /// The pool configuration this shim configuration describes, dialling
    /// `server_addr` over TCP.
    pub fn pool_config(&self) -> PoolConfig {
        let mut config = PoolConfig::for_addr(self.server_addr.clone());
        config.max_idle = self.max_idle;
        config.max_active = self.max_active;
        config.wait = self.wait;
        config.idle_timeout = self.idle_timeout_secs.map(Duration::from_secs);
        config.max_conn_lifetime = self.max_conn_lifetime_secs.map(Duration::from_secs);
        config
    }
}
