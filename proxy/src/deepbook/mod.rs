mod error;
mod order_id;
pub mod tx;

pub use error::*;
pub use order_id::*;

use crate::{
    config::{Network, PoolConfig},
    error::{ProxyError, ProxyResult},
};
use dex_common::crypto::ObjectId;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeVersion {
    V2,
    V3,
}

// Shared clock object passed to every order entry function
pub const CLOCK_OBJECT_ID: ObjectId = ObjectId::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    6,
]);

// Expiration sentinel used for every v3 order (2050-01-01 in ms)
pub const V3_EXPIRATION_SENTINEL_MS: u64 = 2_524_608_000_000;

// v2 restriction codes
pub const RESTRICTION_NO_RESTRICTION: u8 = 0;
pub const RESTRICTION_IMMEDIATE_OR_CANCEL: u8 = 1;
pub const RESTRICTION_POST_OR_ABORT: u8 = 3;

// Self-matching prevention: cancel our oldest order (v2), cancel the
// resting maker order (v3)
pub const V2_SELF_MATCHING_CANCEL_OLDEST: u8 = 0;
pub const V3_SELF_MATCHING_CANCEL_MAKER: u8 = 2;

lazy_static! {
    static ref V2_PACKAGE: ObjectId = ObjectId::from_str("0xdee9").unwrap();
    static ref V3_PACKAGE_MAINNET: ObjectId = ObjectId::from_str(
        "0x2c8d603bc51326b8c13cef9dd07031a408a48dddb541963357661df5d3204809"
    )
    .unwrap();
    static ref V3_PACKAGE_TESTNET: ObjectId = ObjectId::from_str(
        "0x984757fc7c0e6dd5f15c2c66e881dd6e5aca98b725f3dbd83c445e057ebb790a"
    )
    .unwrap();
}

pub fn default_package(version: ExchangeVersion, network: Network) -> ObjectId {
    match (version, network) {
        (ExchangeVersion::V2, _) => *V2_PACKAGE,
        (ExchangeVersion::V3, Network::Mainnet) => *V3_PACKAGE_MAINNET,
        (ExchangeVersion::V3, Network::Testnet) => *V3_PACKAGE_TESTNET,
    }
}

#[derive(Debug, Clone)]
pub struct PoolInfo {
    pub symbol: String,
    pub pool_id: ObjectId,
    pub base_coin_type: String,
    pub quote_coin_type: String,
}

impl PoolInfo {
    pub fn type_args(&self) -> Vec<String> {
        vec![self.base_coin_type.clone(), self.quote_coin_type.clone()]
    }
}

// Static view of the exchange: version, package, configured pools and the
// authority object used as our maker/taker identity in trade events
pub struct DeepBook {
    pub version: ExchangeVersion,
    pub package: ObjectId,
    // Our balance manager (v3) or main account cap (v2)
    pub identity: ObjectId,
    pools: IndexMap<String, PoolInfo>,
    by_id: HashMap<ObjectId, String>,
}

impl DeepBook {
    pub fn new(
        version: ExchangeVersion,
        package: ObjectId,
        identity: ObjectId,
        pool_configs: &[PoolConfig],
    ) -> Self {
        let mut pools = IndexMap::new();
        let mut by_id = HashMap::new();
        for config in pool_configs {
            by_id.insert(config.pool_id, config.symbol.clone());
            pools.insert(
                config.symbol.clone(),
                PoolInfo {
                    symbol: config.symbol.clone(),
                    pool_id: config.pool_id,
                    base_coin_type: config.base_coin_type.clone(),
                    quote_coin_type: config.quote_coin_type.clone(),
                },
            );
        }
        Self {
            version,
            package,
            identity,
            pools,
            by_id,
        }
    }

    // Accepts the BASE_QUOTE symbol or the raw 0x pool object id
    pub fn resolve_pool(&self, key: &str) -> ProxyResult<&PoolInfo> {
        if let Some(pool) = self.pools.get(key) {
            return Ok(pool);
        }
        if let Ok(id) = ObjectId::from_str(key) {
            if let Some(symbol) = self.by_id.get(&id) {
                if let Some(pool) = self.pools.get(symbol) {
                    return Ok(pool);
                }
            }
        }
        Err(ProxyError::UnknownPool(key.to_string()))
    }

    pub fn pool_symbols(&self) -> Vec<&str> {
        self.pools.keys().map(|s| s.as_str()).collect()
    }

    pub fn pools(&self) -> impl Iterator<Item = &PoolInfo> {
        self.pools.values()
    }

    // Validate an order expiration against the version rules; returns the
    // timestamp to submit
    pub fn effective_expiration(&self, requested: Option<u64>) -> ProxyResult<u64> {
        match self.version {
            ExchangeVersion::V2 => Ok(requested.unwrap_or(V3_EXPIRATION_SENTINEL_MS)),
            ExchangeVersion::V3 => match requested {
                None => Ok(V3_EXPIRATION_SENTINEL_MS),
                Some(V3_EXPIRATION_SENTINEL_MS) => Ok(V3_EXPIRATION_SENTINEL_MS),
                Some(other) => Err(ProxyError::BadRequest(format!(
                    "per-order expiration {} is not supported on DeepBook v3; orders expire at {}",
                    other, V3_EXPIRATION_SENTINEL_MS
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_config() -> PoolConfig {
        PoolConfig {
            symbol: "DEEP_SUI".to_string(),
            pool_id: ObjectId::from_str("0xabc").unwrap(),
            base_coin_type: "0xdeep::deep::DEEP".to_string(),
            quote_coin_type: "0x2::sui::SUI".to_string(),
        }
    }

    fn deepbook(version: ExchangeVersion) -> DeepBook {
        DeepBook::new(
            version,
            default_package(version, Network::Mainnet),
            ObjectId::from_str("0xcafe").unwrap(),
            &[pool_config()],
        )
    }

    #[test]
    fn test_resolve_pool_by_symbol_and_id() {
        let book = deepbook(ExchangeVersion::V3);
        assert_eq!(book.resolve_pool("DEEP_SUI").unwrap().symbol, "DEEP_SUI");
        assert_eq!(book.resolve_pool("0xabc").unwrap().symbol, "DEEP_SUI");
        assert!(matches!(
            book.resolve_pool("FOO_BAR"),
            Err(ProxyError::UnknownPool(_))
        ));
    }

    #[test]
    fn test_v3_rejects_per_order_expiration() {
        let book = deepbook(ExchangeVersion::V3);
        assert_eq!(
            book.effective_expiration(None).unwrap(),
            V3_EXPIRATION_SENTINEL_MS
        );
        assert_eq!(
            book.effective_expiration(Some(V3_EXPIRATION_SENTINEL_MS))
                .unwrap(),
            V3_EXPIRATION_SENTINEL_MS
        );
        assert!(matches!(
            book.effective_expiration(Some(1_700_000_000_000)),
            Err(ProxyError::BadRequest(_))
        ));
    }

    #[test]
    fn test_v2_accepts_per_order_expiration() {
        let book = deepbook(ExchangeVersion::V2);
        assert_eq!(
            book.effective_expiration(Some(1_700_000_000_000)).unwrap(),
            1_700_000_000_000
        );
    }
}
