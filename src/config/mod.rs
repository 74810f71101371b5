//! Configuration module
//!
//! Handles loading and validation of the application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fees: Option<FeesConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_yaml(&content)?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.rpc.endpoints.is_empty(),
            "at least one rpc endpoint must be configured"
        );
        for endpoint in &self.rpc.endpoints {
            url::Url::parse(&endpoint.url)
                .with_context(|| format!("Invalid rpc endpoint url: {}", endpoint.url))?;
            anyhow::ensure!(
                endpoint.timeout_ms > 0,
                "timeout_ms for endpoint {} must be positive",
                endpoint.name
            );
        }
        anyhow::ensure!(
            self.rpc.probe_timeout_ms > 0,
            "probe_timeout_ms must be positive"
        );
        url::Url::parse(&self.aggregator.api_url)
            .with_context(|| format!("Invalid aggregator url: {}", self.aggregator.api_url))?;
        anyhow::ensure!(self.cache.capacity > 0, "cache capacity must be positive");
        anyhow::ensure!(self.cache.ttl_ms > 0, "cache ttl_ms must be positive");
        if let Some(fees) = &self.fees {
            anyhow::ensure!(
                fees.fee_bps <= 10_000,
                "fee_bps must be between 0 and 10000"
            );
        }
        anyhow::ensure!(
            self.execution.confirm_timeout_ms > self.execution.poll_interval_ms,
            "confirm_timeout_ms must exceed poll_interval_ms"
        );
        Ok(())
    }

    /// Create a default config for testing
    #[cfg(test)]
    pub fn default_for_test() -> Self {
        Self {
            rpc: RpcConfig {
                endpoints: vec![
                    EndpointConfig {
                        name: "primary".to_string(),
                        url: "https://api.mainnet-beta.solana.com".to_string(),
                        priority: 0,
                        timeout_ms: 10_000,
                    },
                    EndpointConfig {
                        name: "backup".to_string(),
                        url: "https://solana-rpc.publicnode.com".to_string(),
                        priority: 1,
                        timeout_ms: 10_000,
                    },
                ],
                probe_timeout_ms: default_probe_timeout(),
                cooldown_ms: default_cooldown(),
                health_cache_ms: 0,
                max_retries: default_max_retries(),
                retry_base_delay_ms: default_retry_base_delay(),
            },
            wallet: WalletConfig {
                keypair_path: "./wallet.json".to_string(),
            },
            aggregator: AggregatorConfig::default(),
            cache: CacheConfig::default(),
            fees: None,
            execution: ExecutionConfig::default(),
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                json_logs: false,
                log_file: None,
                metrics_port: 9090,
                enable_metrics: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
    /// Skip the liveness probe for endpoints that answered within this window (0 = always probe)
    #[serde(default)]
    pub health_cache_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_probe_timeout() -> u64 { 2000 }
fn default_cooldown() -> u64 { 30_000 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_delay() -> u64 { 250 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_request_timeout")]
    pub timeout_ms: u64,
}

fn default_request_timeout() -> u64 { 10_000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_url")]
    pub api_url: String,
    #[serde(default = "default_aggregator_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_aggregator_retries")]
    pub max_retries: u32,
    #[serde(default = "default_aggregator_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub only_direct_routes: bool,
    #[serde(default = "default_true")]
    pub restrict_intermediate_tokens: bool,
}

fn default_aggregator_url() -> String {
    "https://quote-api.jup.ag/v6".to_string()
}
fn default_aggregator_timeout() -> u64 { 10_000 }
fn default_aggregator_retries() -> u32 { 2 }
fn default_aggregator_retry_delay() -> u64 { 300 }
fn default_true() -> bool { true }

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            api_url: default_aggregator_url(),
            timeout_ms: default_aggregator_timeout(),
            max_retries: default_aggregator_retries(),
            retry_delay_ms: default_aggregator_retry_delay(),
            only_direct_routes: false,
            restrict_intermediate_tokens: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_ttl() -> u64 { 10_000 }
fn default_cache_capacity() -> usize { 500 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl(),
            capacity: default_cache_capacity(),
        }
    }
}

/// Platform fee routing: input mint -> fee token account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesConfig {
    pub fee_bps: u16,
    #[serde(default)]
    pub accounts: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Network fee per signature
    #[serde(default = "default_base_fee")]
    pub base_fee_lamports: u64,
    #[serde(default = "default_max_priority_fee")]
    pub max_priority_fee_lamports: u64,
    #[serde(default = "default_priority_level")]
    pub priority_level: String,
    #[serde(default = "default_setup_compute_units")]
    pub setup_compute_units: u32,
    /// Micro-lamports per compute unit for the account-creation transaction
    #[serde(default = "default_setup_compute_unit_price")]
    pub setup_compute_unit_price: u64,
}

fn default_confirm_timeout() -> u64 { 60_000 }
fn default_poll_interval() -> u64 { 500 }
fn default_base_fee() -> u64 { 5000 }
fn default_max_priority_fee() -> u64 { 1_000_000 }
fn default_priority_level() -> String { "veryHigh".to_string() }
fn default_setup_compute_units() -> u32 { 60_000 }
fn default_setup_compute_unit_price() -> u64 { 10_000 }

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            confirm_timeout_ms: default_confirm_timeout(),
            poll_interval_ms: default_poll_interval(),
            base_fee_lamports: default_base_fee(),
            max_priority_fee_lamports: default_max_priority_fee(),
            priority_level: default_priority_level(),
            setup_compute_units: default_setup_compute_units(),
            setup_compute_unit_price: default_setup_compute_unit_price(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    pub log_file: Option<String>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub enable_metrics: bool,
}

fn default_metrics_port() -> u16 { 9090 }
