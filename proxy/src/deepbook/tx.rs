// Move-call recipes for the exchange entry points. Argument layouts differ
// between the two contract generations; everything above this module works
// with the version-neutral `MoveCall` shape.

use super::{
    DeepBook, ExchangeVersion, PoolInfo, CLOCK_OBJECT_ID, RESTRICTION_IMMEDIATE_OR_CANCEL,
    RESTRICTION_NO_RESTRICTION, RESTRICTION_POST_OR_ABORT, V2_SELF_MATCHING_CANCEL_OLDEST,
    V3_SELF_MATCHING_CANCEL_MAKER,
};
use crate::{
    chain::MoveCall,
    error::{ProxyError, ProxyResult},
    orders::{OrderSide, OrderType},
};
use dex_common::crypto::ObjectId;
use serde_json::json;

// The chain-side order key is numeric; client order ids must parse
pub fn parse_client_order_id(client_order_id: &str) -> ProxyResult<u64> {
    client_order_id.parse().map_err(|_| {
        ProxyError::BadRequest(format!(
            "client_order_id '{}' must be an unsigned integer",
            client_order_id
        ))
    })
}

#[derive(Debug, Clone)]
pub struct LimitOrderSpec {
    pub client_order_id: u64,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: u64,
    pub quantity: u64,
    pub expiration_ts: u64,
}

fn v2_restriction(order_type: OrderType) -> u8 {
    match order_type {
        OrderType::GoodTilCancelled => RESTRICTION_NO_RESTRICTION,
        OrderType::ImmediateOrCancel => RESTRICTION_IMMEDIATE_OR_CANCEL,
        OrderType::PostOnly => RESTRICTION_POST_OR_ABORT,
    }
}

fn v3_order_type(order_type: OrderType) -> u8 {
    match order_type {
        OrderType::GoodTilCancelled => 0,
        OrderType::ImmediateOrCancel => 1,
        OrderType::PostOnly => 3,
    }
}

impl DeepBook {
    // authority: the account cap (v2) or balance manager (v3) to trade under
    pub fn place_limit_order_call(
        &self,
        pool: &PoolInfo,
        authority: ObjectId,
        spec: &LimitOrderSpec,
    ) -> MoveCall {
        match self.version {
            ExchangeVersion::V2 => MoveCall {
                package: self.package,
                module: "clob_v2",
                function: "place_limit_order",
                type_args: pool.type_args(),
                args: vec![
                    json!(pool.pool_id),
                    json!(spec.client_order_id.to_string()),
                    json!(spec.price.to_string()),
                    json!(spec.quantity.to_string()),
                    json!(V2_SELF_MATCHING_CANCEL_OLDEST),
                    json!(spec.side.is_bid()),
                    json!(spec.expiration_ts.to_string()),
                    json!(v2_restriction(spec.order_type)),
                    json!(CLOCK_OBJECT_ID),
                    json!(authority),
                ],
            },
            ExchangeVersion::V3 => MoveCall {
                package: self.package,
                module: "pool",
                function: "place_limit_order",
                type_args: pool.type_args(),
                args: vec![
                    json!(pool.pool_id),
                    json!(authority),
                    json!(spec.client_order_id.to_string()),
                    json!(v3_order_type(spec.order_type)),
                    json!(V3_SELF_MATCHING_CANCEL_MAKER),
                    json!(spec.price.to_string()),
                    json!(spec.quantity.to_string()),
                    json!(spec.side.is_bid()),
                    // fees are paid in DEEP from the balance manager
                    json!(true),
                    json!(spec.expiration_ts.to_string()),
                    json!(CLOCK_OBJECT_ID),
                ],
            },
        }
    }

    pub fn cancel_order_call(
        &self,
        pool: &PoolInfo,
        authority: ObjectId,
        exchange_order_id: u128,
    ) -> MoveCall {
        match self.version {
            ExchangeVersion::V2 => MoveCall {
                package: self.package,
                module: "clob_v2",
                function: "cancel_order",
                type_args: pool.type_args(),
                args: vec![
                    json!(pool.pool_id),
                    json!(exchange_order_id.to_string()),
                    json!(authority),
                ],
            },
            ExchangeVersion::V3 => MoveCall {
                package: self.package,
                module: "pool",
                function: "cancel_order",
                type_args: pool.type_args(),
                args: vec![
                    json!(pool.pool_id),
                    json!(authority),
                    json!(exchange_order_id.to_string()),
                    json!(CLOCK_OBJECT_ID),
                ],
            },
        }
    }

    pub fn cancel_all_orders_call(&self, pool: &PoolInfo, authority: ObjectId) -> MoveCall {
        match self.version {
            ExchangeVersion::V2 => MoveCall {
                package: self.package,
                module: "clob_v2",
                function: "cancel_all_orders",
                type_args: pool.type_args(),
                args: vec![json!(pool.pool_id), json!(authority)],
            },
            ExchangeVersion::V3 => MoveCall {
                package: self.package,
                module: "pool",
                function: "cancel_all_orders",
                type_args: pool.type_args(),
                args: vec![
                    json!(pool.pool_id),
                    json!(authority),
                    json!(CLOCK_OBJECT_ID),
                ],
            },
        }
    }

    // Deposit a coin object into the pool custodian (v2) or the balance
    // manager (v3). `is_base` selects the v2 entry point.
    pub fn deposit_call(
        &self,
        pool: &PoolInfo,
        authority: ObjectId,
        coin: ObjectId,
        is_base: bool,
    ) -> MoveCall {
        match self.version {
            ExchangeVersion::V2 => MoveCall {
                package: self.package,
                module: "clob_v2",
                function: if is_base {
                    "deposit_base"
                } else {
                    "deposit_quote"
                },
                type_args: pool.type_args(),
                args: vec![json!(pool.pool_id), json!(coin), json!(authority)],
            },
            ExchangeVersion::V3 => MoveCall {
                package: self.package,
                module: "balance_manager",
                function: "deposit",
                type_args: vec![if is_base {
                    pool.base_coin_type.clone()
                } else {
                    pool.quote_coin_type.clone()
                }],
                args: vec![json!(authority), json!(coin)],
            },
        }
    }

    pub fn withdraw_call(
        &self,
        pool: &PoolInfo,
        authority: ObjectId,
        amount: u64,
        is_base: bool,
    ) -> MoveCall {
        match self.version {
            ExchangeVersion::V2 => MoveCall {
                package: self.package,
                module: "clob_v2",
                function: if is_base {
                    "withdraw_base"
                } else {
                    "withdraw_quote"
                },
                type_args: pool.type_args(),
                args: vec![
                    json!(pool.pool_id),
                    json!(amount.to_string()),
                    json!(authority),
                ],
            },
            ExchangeVersion::V3 => MoveCall {
                package: self.package,
                module: "balance_manager",
                function: "withdraw",
                type_args: vec![if is_base {
                    pool.base_coin_type.clone()
                } else {
                    pool.quote_coin_type.clone()
                }],
                args: vec![json!(authority), json!(amount.to_string())],
            },
        }
    }

    // v3 maker proceeds accumulate in the pool until settled back
    pub fn withdraw_settled_amounts_call(
        &self,
        pool: &PoolInfo,
        authority: ObjectId,
    ) -> MoveCall {
        MoveCall {
            package: self.package,
            module: "pool",
            function: "withdraw_settled_amounts",
            type_args: pool.type_args(),
            args: vec![json!(pool.pool_id), json!(authority)],
        }
    }

    pub fn mint_account_cap_call(&self) -> MoveCall {
        MoveCall {
            package: self.package,
            module: "clob_v2",
            function: "create_account",
            type_args: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn mint_child_account_cap_call(&self, main_cap: ObjectId) -> MoveCall {
        MoveCall {
            package: self.package,
            module: "custodian_v2",
            function: "create_child_account_cap",
            type_args: Vec::new(),
            args: vec![json!(main_cap)],
        }
    }

    pub fn create_balance_manager_call(&self) -> MoveCall {
        MoveCall {
            package: self.package,
            module: "balance_manager",
            function: "new",
            type_args: Vec::new(),
            args: Vec::new(),
        }
    }
}
