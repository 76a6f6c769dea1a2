use crate::{deepbook::ExchangeVersion, error::ProxyError};
use clap::Parser;
use dex_common::crypto::{ObjectId, SuiAddress};
use serde::Deserialize;
use std::{fmt, path::Path, time::Duration};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8090";

// Interval between epoch polls used to release skip-epoch resources
pub const EPOCH_POLL_INTERVAL: Duration = Duration::from_secs(300);

// Delay before an event subscription reconnect attempt
pub const EVENT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

// Trades lookback window; requests beyond it are rejected
pub const TRADES_LOOKBACK_LIMIT_MS: u64 = 40 * 60 * 1000;

// Upper bound of orders accepted in one batched insert transaction
pub const MAX_ORDERS_PER_BATCH: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

#[derive(Parser)]
#[clap(
    version = VERSION,
    about = "dex-proxy - order-flow and treasury gateway for DeepBook on Sui"
)]
pub struct Config {
    /// HTTP/WebSocket bind address
    #[clap(long, default_value_t = String::from(DEFAULT_BIND_ADDRESS))]
    pub bind_address: String,
    /// Set log level
    #[clap(long, value_enum, default_value_t)]
    pub log_level: LogLevel,
    /// JSON file holding the `dex` configuration section
    #[clap(long, default_value_t = String::from("config.json"))]
    pub config_file: String,
}

// Functions Helpers
fn default_true() -> bool {
    true
}

fn default_sync_interval_s() -> u64 {
    10
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_call_timeout_s() -> u64 {
    30
}

fn default_reconnect_timeout_s() -> u64 {
    5
}

fn default_poll_interval_s() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub dex: DexConfig,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProxyError> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ProxyError::Startup(format!(
                "cannot read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: FileConfig = serde_json::from_str(&content)
            .map_err(|e| ProxyError::Startup(format!("invalid config file: {}", e)))?;
        config.dex.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexConfig {
    // Chain name used as the key into the withdrawal whitelist file
    pub chain_name: String,
    #[serde(default)]
    pub env: Network,
    pub version: ExchangeVersion,
    // Derived from the keypair when absent
    #[serde(default)]
    pub wallet_address: Option<SuiAddress>,
    // Path to the base64 ed25519 secret key, read once at startup
    pub key_path: String,
    #[serde(default = "default_true")]
    pub subscribe_to_events: bool,
    #[serde(default)]
    pub log_responses: bool,
    // Override of the exchange package id for the selected env
    #[serde(default)]
    pub deepbook_package: Option<ObjectId>,
    // v3 shared balance manager
    #[serde(default)]
    pub balance_manager_id: Option<ObjectId>,
    // v2 account capabilities
    #[serde(default)]
    pub account_cap_ids: Option<AccountCapIds>,
    #[serde(default)]
    pub withdraw_whitelist_path: Option<String>,
    pub gas_manager: GasManagerConfig,
    #[serde(default)]
    pub order_cache: OrderCacheConfig,
    pub exchange_connectors: ExchangeConnectors,
    #[serde(default = "default_poll_interval_s")]
    pub track_leading_client_poll_interval_s: u64,
    // v3 only: settle maker proceeds back to the balance manager periodically
    #[serde(default)]
    pub withdraw_settled_amounts_interval_s: Option<u64>,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

impl DexConfig {
    pub fn validate(&self) -> Result<(), ProxyError> {
        match self.version {
            ExchangeVersion::V2 => {
                if self.account_cap_ids.is_none() {
                    return Err(ProxyError::Startup(
                        "account_cap_ids must be configured for DeepBook v2".to_string(),
                    ));
                }
            }
            ExchangeVersion::V3 => {
                if self.balance_manager_id.is_none() {
                    return Err(ProxyError::Startup(
                        "balance_manager_id must be configured for DeepBook v3".to_string(),
                    ));
                }
            }
        }
        if self.exchange_connectors.rest.is_empty() {
            return Err(ProxyError::Startup(
                "exchange_connectors.rest must list at least one endpoint".to_string(),
            ));
        }
        if self.gas_manager.min_balance_per_instance_mist
            > self.gas_manager.max_balance_per_instance_mist
        {
            return Err(ProxyError::Startup(
                "gas_manager: min balance above max balance".to_string(),
            ));
        }
        if self.gas_manager.gas_coin_expected_count == 0 {
            return Err(ProxyError::Startup(
                "gas_manager: gas_coin_expected_count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountCapIds {
    pub main: ObjectId,
    #[serde(default)]
    pub children: Vec<ObjectId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GasManagerConfig {
    pub max_balance_per_instance_mist: u64,
    pub min_balance_per_instance_mist: u64,
    #[serde(default = "default_sync_interval_s")]
    pub sync_interval_s: u64,
    pub gas_budget_mist: u64,
    pub gas_coin_expected_count: usize,
}

impl GasManagerConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_s)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderCacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for OrderCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConnectors {
    pub rest: Vec<RestEndpointConfig>,
    pub ws: WsConfig,
    #[serde(default = "default_call_timeout_s")]
    pub rest_call_timeout_s: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestEndpointConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsConfig {
    pub url: String,
    #[serde(default = "default_call_timeout_s")]
    pub call_timeout_s: u64,
    #[serde(default = "default_reconnect_timeout_s")]
    pub reconnect_timeout_s: u64,
    // 0 means retry forever
    #[serde(default)]
    pub max_reconnects: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    // Symbol form BASE_QUOTE, e.g. DEEP_SUI
    pub symbol: String,
    pub pool_id: ObjectId,
    pub base_coin_type: String,
    pub quote_coin_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(version: &str, extra: &str) -> String {
        format!(
            r#"{{
                "dex": {{
                    "chain_name": "sui",
                    "version": "{}",
                    "key_path": "/tmp/key.b64",
                    {}
                    "gas_manager": {{
                        "max_balance_per_instance_mist": 1000000000,
                        "min_balance_per_instance_mist": 100000000,
                        "gas_budget_mist": 250000000,
                        "gas_coin_expected_count": 4
                    }},
                    "exchange_connectors": {{
                        "rest": [{{ "name": "internal_main", "url": "http://127.0.0.1:9000" }}],
                        "ws": {{ "url": "ws://127.0.0.1:9000" }}
                    }}
                }}
            }}"#,
            version, extra
        )
    }

    #[test]
    fn test_v3_requires_balance_manager() {
        let config: FileConfig =
            serde_json::from_str(&minimal_config("v3", "")).unwrap();
        assert!(matches!(
            config.dex.validate(),
            Err(ProxyError::Startup(_))
        ));

        let config: FileConfig = serde_json::from_str(&minimal_config(
            "v3",
            r#""balance_manager_id": "0xabc","#,
        ))
        .unwrap();
        assert!(config.dex.validate().is_ok());
    }

    #[test]
    fn test_v2_requires_account_caps() {
        let config: FileConfig =
            serde_json::from_str(&minimal_config("v2", "")).unwrap();
        assert!(matches!(
            config.dex.validate(),
            Err(ProxyError::Startup(_))
        ));

        let config: FileConfig = serde_json::from_str(&minimal_config(
            "v2",
            r#""account_cap_ids": { "main": "0x1", "children": ["0x2", "0x3"] },"#,
        ))
        .unwrap();
        assert!(config.dex.validate().is_ok());
        let caps = config.dex.account_cap_ids.unwrap();
        assert_eq!(caps.children.len(), 2);
    }

    #[test]
    fn test_defaults_applied() {
        let config: FileConfig = serde_json::from_str(&minimal_config(
            "v3",
            r#""balance_manager_id": "0xabc","#,
        ))
        .unwrap();
        assert!(config.dex.subscribe_to_events);
        assert_eq!(config.dex.order_cache.capacity, 1024);
        assert_eq!(config.dex.gas_manager.sync_interval_s, 10);
        assert_eq!(config.dex.exchange_connectors.ws.reconnect_timeout_s, 5);
        assert_eq!(config.dex.track_leading_client_poll_interval_s, 10);
    }
}
