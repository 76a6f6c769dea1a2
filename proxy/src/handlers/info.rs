use crate::{
    api::{
        types::{BalanceManagerBalanceQuery, PoolQuery},
        AppState,
    },
    error::ProxyError,
};
use actix_web::{
    web::{Data, Query},
    HttpResponse,
};
use dex_common::api::sui::DynamicFieldName;
use serde_json::{json, Value};

pub async fn status() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn wallet_address(state: Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "wallet_address": state.signer.address() }))
}

pub async fn balance_manager_id(state: Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "balance_manager_id": state.identity.authority }))
}

pub async fn wallet_balance_info(state: Data<AppState>) -> Result<HttpResponse, ProxyError> {
    let balances = state.chain.get_all_balances(state.signer.address()).await?;
    Ok(HttpResponse::Ok().json(json!({ "balances": balances })))
}

// Per-coin balances live as dynamic fields keyed by coin type on the
// balance manager (the v2 custodian uses the same layout per account cap)
pub async fn balance_manager_balance_info(
    state: Data<AppState>,
    query: Query<BalanceManagerBalanceQuery>,
) -> Result<HttpResponse, ProxyError> {
    let coin = query.into_inner().coin;
    let name = DynamicFieldName {
        type_: format!(
            "{}::balance_manager::BalanceKey<{}>",
            state.deepbook.package, coin
        ),
        value: json!({ "dummy_field": false }),
    };
    let response = state
        .chain
        .get_dynamic_field_object(state.identity.authority, name)
        .await?;

    let balance = response
        .data
        .as_ref()
        .and_then(|data| data.content.as_ref())
        .and_then(|content| content.get("fields"))
        .and_then(|fields| fields.get("value").or_else(|| fields.get("balance")))
        .and_then(value_as_u64)
        .unwrap_or(0);

    Ok(HttpResponse::Ok().json(json!({ "coin": coin, "balance": balance.to_string() })))
}

pub async fn pool(
    state: Data<AppState>,
    query: Query<PoolQuery>,
) -> Result<HttpResponse, ProxyError> {
    let query = query.into_inner();
    let pool = state.deepbook.resolve_pool(query.key()?)?.clone();

    // Tick/lot sizes and fee rates come from the live pool object
    let response = state.chain.get_object(pool.pool_id).await?;
    let fields = response
        .data
        .as_ref()
        .and_then(|data| data.content.as_ref())
        .and_then(|content| content.get("fields"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(HttpResponse::Ok().json(json!({
        "pool": pool.symbol,
        "pool_id": pool.pool_id,
        "base_coin_type": pool.base_coin_type,
        "quote_coin_type": pool.quote_coin_type,
        "tick_size": field_string(&fields, "tick_size"),
        "lot_size": field_string(&fields, "lot_size"),
        "taker_fee_rate": field_string(&fields, "taker_fee_rate"),
        "maker_fee_rate": field_string(&fields, "maker_rebate_rate"),
    })))
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_string(fields: &Value, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
