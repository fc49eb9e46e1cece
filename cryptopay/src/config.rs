//! Configuration for the watcher service.
//!
//! Values come from a YAML file (`-f`, default `config.yaml`) and are overridden by
//! `CRYPTOPAY_`-prefixed environment variables, with `__` separating nested keys:
//!
//! ```bash
//! export CRYPTOPAY_API_TOKEN="1234:AA..."
//! export CRYPTOPAY_NETWORK=testnet
//! export CRYPTOPAY_POLLING__PERIOD=10s
//! export CRYPTOPAY_WEBHOOK__PATH=/hooks/crypto-pay
//! ```

use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::Network;
use crate::errors::{Error, Result};
use crate::notify::PollerSettings;

/// `getInvoices` refuses larger pages
const MAX_BATCH_SIZE: usize = 1000;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CRYPTOPAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Crypto Pay app token; also the webhook signing secret
    pub api_token: Option<String>,
    pub network: Network,
    /// Overrides the network's base URL, e.g. for a local proxy
    pub api_url: Option<Url>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub polling: PollingConfig,
    pub webhook: WebhookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_token: None,
            network: Network::default(),
            api_url: None,
            request_timeout: Duration::from_secs(5),
            polling: PollingConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    #[serde(with = "humantime_serde")]
    pub failure_cooldown: Duration,
    pub batch_size: usize,
    /// Invoice ids to track from startup, e.g. invoices created by another process
    pub watch_invoice_ids: Vec<i64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let settings = PollerSettings::default();
        Self {
            enabled: true,
            period: settings.period,
            failure_cooldown: settings.failure_cooldown,
            batch_size: settings.batch_size,
            watch_invoice_ids: Vec::new(),
        }
    }
}

impl PollingConfig {
    pub fn settings(&self) -> PollerSettings {
        PollerSettings {
            period: self.period,
            failure_cooldown: self.failure_cooldown,
            batch_size: self.batch_size,
        }
    }
}

/// Inbound webhook endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/webhooks/crypto-pay".to_string(),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> std::result::Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<()> {
        if self.api_token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(Error::Config {
                message: "api_token is not configured. Set CRYPTOPAY_API_TOKEN or add api_token to the config file.".to_string(),
            });
        }

        if self.polling.batch_size == 0 || self.polling.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config {
                message: format!(
                    "polling.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                    self.polling.batch_size
                ),
            });
        }

        if self.polling.period.is_zero() {
            return Err(Error::Config {
                message: "polling.period must be greater than zero".to_string(),
            });
        }

        if self.webhook.enabled && !self.webhook.path.starts_with('/') {
            return Err(Error::Config {
                message: format!("webhook.path must start with '/', got {:?}", self.webhook.path),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables override specific values; the config path itself is a CLI concern
            .merge(Env::prefixed("CRYPTOPAY_").ignore(&["config"]).split("__"))
    }

    /// Token after validation; empty when unset.
    pub fn api_token(&self) -> &str {
        self.api_token.as_deref().unwrap_or_default()
    }

    /// Base URL of the Crypto Pay API: the explicit override, or the network's.
    pub fn base_url(&self) -> Result<Url> {
        match &self.api_url {
            Some(url) => Ok(url.clone()),
            None => Ok(Url::parse(self.network.base_url())?),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
