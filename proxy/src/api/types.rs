// Typed projections of the dynamic request bodies. Unknown fields are
// rejected at the boundary; amounts cross the wire as decimal strings in
// minimal units.

use crate::{
    error::{ProxyError, ProxyResult},
    events::DexEvent,
    orders::{OrderSide, OrderType},
};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn parse_amount(value: &str, field: &'static str) -> ProxyResult<u64> {
    value
        .parse()
        .map_err(|_| ProxyError::BadRequest(format!("{} must be an unsigned decimal string", field)))
}

pub fn parse_optional_amount(
    value: Option<&str>,
    field: &'static str,
) -> ProxyResult<Option<u64>> {
    value.map(|v| parse_amount(v, field)).transpose()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertOrderRequest {
    pub client_order_id: String,
    pub pool: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: String,
    pub price: String,
    #[serde(default)]
    pub expiration_ts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkOrderItem {
    pub client_order_id: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: String,
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkInsertRequest {
    pub pool: String,
    pub orders: Vec<BulkOrderItem>,
    #[serde(default)]
    pub expiration_ts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolQuery {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
}

impl PoolQuery {
    pub fn key(&self) -> ProxyResult<&str> {
        self.id
            .as_deref()
            .or(self.pool.as_deref())
            .ok_or_else(|| ProxyError::BadRequest("either 'id' or 'pool' is required".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrdersQuery {
    pub pool: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQuery {
    pub pool: String,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelOrdersQuery {
    pub pool: String,
    // Comma-separated list; absent means cancel-all
    #[serde(default)]
    pub client_order_ids: Option<String>,
}

impl CancelOrdersQuery {
    pub fn ids(&self) -> Option<Vec<String>> {
        self.client_order_ids.as_ref().map(|csv| {
            csv.split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradesQuery {
    #[serde(default)]
    pub start_ts: Option<String>,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub tx_digests: Option<String>,
}

impl TradesQuery {
    pub fn digests(&self) -> Option<Vec<String>> {
        self.tx_digests.as_ref().map(|csv| {
            csv.split(',')
                .map(|digest| digest.trim().to_string())
                .filter(|digest| !digest.is_empty())
                .collect()
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalanceManagerBalanceQuery {
    pub coin: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepositRequest {
    pub pool: String,
    // Coin type; must be the pool's base or quote asset
    pub coin: String,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawFromPoolRequest {
    pub pool: String,
    pub coin: String,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawSuiRequest {
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawRequest {
    pub coin: String,
    pub recipient: String,
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChildAccountCapRequest {
    #[serde(default)]
    pub count: Option<usize>,
}

// Shape shared by HTTP responses and WebSocket notifications
pub fn event_json(event: &DexEvent) -> Value {
    json!({
        "channel": event.channel().as_str(),
        "type": event.type_name(),
        "data": event.data(),
    })
}
