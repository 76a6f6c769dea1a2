mod subscriber;

pub use subscriber::*;

use crate::orders::{OrderCache, OrderSide};
use dex_common::{
    api::sui::SuiEvent,
    crypto::{ObjectId, SuiAddress},
    time::TimestampMillis,
};
use log::{debug, log_enabled, Level};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Order,
    Trade,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Order => "ORDER",
            Channel::Trade => "TRADE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Liquidity {
    Maker,
    Taker,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPlacedData {
    pub pool_id: ObjectId,
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub side: OrderSide,
    pub price: u64,
    pub original_quantity: u64,
    pub placed_quantity: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_ts: Option<TimestampMillis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCancelledData {
    pub pool_id: ObjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    pub exchange_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<OrderSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderFilledData {
    pub pool_id: ObjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    pub exchange_order_id: String,
    pub side: OrderSide,
    pub price: u64,
    pub quantity: u64,
    pub liquidity: Liquidity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<TimestampMillis>,
}

#[derive(Debug, Clone)]
pub enum DexEvent {
    OrderPlaced(OrderPlacedData),
    OrderCancelled(OrderCancelledData),
    OrderFilled(OrderFilledData),
}

impl DexEvent {
    pub fn channel(&self) -> Channel {
        match self {
            DexEvent::OrderPlaced(_) | DexEvent::OrderCancelled(_) => Channel::Order,
            DexEvent::OrderFilled(_) => Channel::Trade,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DexEvent::OrderPlaced(_) => "order_placed",
            DexEvent::OrderCancelled(_) => "order_cancelled",
            DexEvent::OrderFilled(_) => "order_filled",
        }
    }

    pub fn data(&self) -> Value {
        match self {
            DexEvent::OrderPlaced(data) => serde_json::to_value(data).unwrap_or(Value::Null),
            DexEvent::OrderCancelled(data) => serde_json::to_value(data).unwrap_or(Value::Null),
            DexEvent::OrderFilled(data) => serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }
}

// Our trading identity across both contract generations: the wallet address
// and the authority object (account cap on v2, balance manager on v3)
#[derive(Debug, Clone)]
pub struct TradeIdentity {
    pub wallet: SuiAddress,
    pub authority: ObjectId,
}

impl TradeIdentity {
    fn matches(&self, id: ObjectId) -> bool {
        id == self.wallet || id == self.authority
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    OrderPlaced,
    OrderCancelled,
    AllOrdersCancelled,
    OrderFilled,
}

// Discriminator table keyed by the module::name tail of the event type.
// The package prefix varies with upgrades, the tail does not.
const EVENT_DISCRIMINATORS: &[(&str, &str, EventKind)] = &[
    ("clob_v2", "OrderPlaced", EventKind::OrderPlaced),
    ("clob_v2", "OrderCanceled", EventKind::OrderCancelled),
    ("clob_v2", "AllOrdersCanceled", EventKind::AllOrdersCancelled),
    ("clob_v2", "OrderFilled", EventKind::OrderFilled),
    ("order_info", "OrderInfo", EventKind::OrderPlaced),
    ("order_info", "OrderPlaced", EventKind::OrderPlaced),
    ("order_info", "OrderFilled", EventKind::OrderFilled),
    ("order", "OrderCanceled", EventKind::OrderCancelled),
    ("order", "AllOrdersCanceled", EventKind::AllOrdersCancelled),
];

fn split_event_type(event_type: &str) -> Option<(&str, &str)> {
    // Drop any generic parameters, then take the last two :: segments
    let stripped = event_type.split('<').next()?;
    let mut parts = stripped.rsplit("::");
    let name = parts.next()?;
    let module = parts.next()?;
    Some((module, name))
}

pub fn classify_event(event_type: &str) -> Option<EventKind> {
    let (module, name) = split_event_type(event_type)?;
    EVENT_DISCRIMINATORS
        .iter()
        .find(|(m, n, _)| *m == module && *n == name)
        .map(|(_, _, kind)| *kind)
}

// ---- field access over the dynamic event payloads; the two contract
// generations use different names for the same quantities ----

fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(key))
}

fn field_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    match field(value, keys)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_u128(value: &Value, keys: &[&str]) -> Option<u128> {
    match field(value, keys)? {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_bool(value: &Value, keys: &[&str]) -> Option<bool> {
    field(value, keys)?.as_bool()
}

fn field_string(value: &Value, keys: &[&str]) -> Option<String> {
    match field(value, keys)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn field_object_id(value: &Value, keys: &[&str]) -> Option<ObjectId> {
    field(value, keys)?
        .as_str()
        .and_then(|s| s.parse().ok())
}

// Project a raw chain event into zero or more typed dex events.
// AllOrdersCanceled expands into one cancellation per listed order.
pub fn parse_events(raw: &SuiEvent, identity: &TradeIdentity) -> Vec<DexEvent> {
    let Some(kind) = classify_event(&raw.event_type) else {
        return Vec::new();
    };
    let payload = &raw.parsed_json;
    match kind {
        EventKind::OrderPlaced => parse_order_placed(payload)
            .map(DexEvent::OrderPlaced)
            .into_iter()
            .collect(),
        EventKind::OrderCancelled => parse_order_cancelled(payload)
            .map(DexEvent::OrderCancelled)
            .into_iter()
            .collect(),
        EventKind::AllOrdersCancelled => {
            let Some(pool_id) = field_object_id(payload, &["pool_id"]) else {
                return Vec::new();
            };
            let Some(orders) = payload.get("orders_canceled").and_then(Value::as_array) else {
                return Vec::new();
            };
            orders
                .iter()
                .filter_map(|entry| {
                    Some(DexEvent::OrderCancelled(OrderCancelledData {
                        pool_id,
                        client_order_id: field_string(entry, &["client_order_id"]),
                        exchange_order_id: field_u128(entry, &["order_id"])?.to_string(),
                        side: field_bool(entry, &["is_bid"]).map(side_from_is_bid),
                        price: field_u64(entry, &["price"]),
                    }))
                })
                .collect()
        }
        EventKind::OrderFilled => parse_order_filled(payload, raw.timestamp_ms, identity)
            .map(DexEvent::OrderFilled)
            .into_iter()
            .collect(),
    }
}

fn side_from_is_bid(is_bid: bool) -> OrderSide {
    if is_bid {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    }
}

fn parse_order_placed(payload: &Value) -> Option<OrderPlacedData> {
    let original_quantity = field_u64(payload, &["original_quantity", "placed_quantity"])?;
    let placed_quantity =
        field_u64(payload, &["base_asset_quantity_placed", "placed_quantity"])
            .unwrap_or(original_quantity);
    Some(OrderPlacedData {
        pool_id: field_object_id(payload, &["pool_id"])?,
        client_order_id: field_string(payload, &["client_order_id"])?,
        exchange_order_id: field_u128(payload, &["order_id"])?.to_string(),
        side: side_from_is_bid(field_bool(payload, &["is_bid"])?),
        price: field_u64(payload, &["price"])?,
        original_quantity,
        placed_quantity,
        expiration_ts: field_u64(payload, &["expire_timestamp"]),
    })
}

fn parse_order_cancelled(payload: &Value) -> Option<OrderCancelledData> {
    Some(OrderCancelledData {
        pool_id: field_object_id(payload, &["pool_id"])?,
        client_order_id: field_string(payload, &["client_order_id"]),
        exchange_order_id: field_u128(payload, &["order_id"])?.to_string(),
        side: field_bool(payload, &["is_bid"]).map(side_from_is_bid),
        price: field_u64(payload, &["price"]),
    })
}

fn parse_order_filled(
    payload: &Value,
    timestamp: Option<u64>,
    identity: &TradeIdentity,
) -> Option<OrderFilledData> {
    let pool_id = field_object_id(payload, &["pool_id"])?;
    let maker_identity =
        field_object_id(payload, &["maker_balance_manager_id", "maker_address", "owner"]);
    let liquidity = match maker_identity {
        Some(id) if identity.matches(id) => Liquidity::Maker,
        _ => Liquidity::Taker,
    };

    // The reported side is the book (maker) side; a taker fill is the
    // opposite of the resting order
    let book_side = match field_bool(payload, &["is_bid"]) {
        Some(is_bid) => side_from_is_bid(is_bid),
        None => side_from_is_bid(!field_bool(payload, &["taker_is_bid"])?),
    };
    let side = match liquidity {
        Liquidity::Maker => book_side,
        Liquidity::Taker => book_side.opposite(),
    };

    let client_order_id = match liquidity {
        Liquidity::Maker => {
            field_string(payload, &["maker_client_order_id", "client_order_id"])
        }
        Liquidity::Taker => {
            field_string(payload, &["taker_client_order_id", "client_order_id"])
        }
    };
    let exchange_order_id = match liquidity {
        Liquidity::Maker => field_u128(payload, &["maker_order_id", "order_id"])?,
        Liquidity::Taker => field_u128(payload, &["taker_order_id", "order_id"])?,
    };

    Some(OrderFilledData {
        pool_id,
        client_order_id,
        exchange_order_id: exchange_order_id.to_string(),
        side,
        price: field_u64(payload, &["price"])?,
        quantity: field_u64(payload, &["base_asset_quantity_filled", "base_quantity"])?,
        liquidity,
        timestamp_ms: field_u64(payload, &["timestamp"]).or(timestamp),
    })
}

// Whether a raw fill event involves us on either side; used when scanning
// time-range queries that also return other traders' events
pub fn involves_identity(raw: &SuiEvent, identity: &TradeIdentity) -> bool {
    if raw.sender == identity.wallet {
        return true;
    }
    let payload = &raw.parsed_json;
    [
        "maker_balance_manager_id",
        "taker_balance_manager_id",
        "maker_address",
        "taker_address",
        "owner",
    ]
    .iter()
    .filter_map(|key| field_object_id(payload, &[*key]))
    .any(|id| identity.matches(id))
}

// Reconcile one typed event with the order cache. Each source only writes
// the fields it owns; the status machine refuses downgrades, so replays and
// out-of-order deliveries are harmless.
pub fn apply_to_cache(event: &DexEvent, cache: &OrderCache) {
    match event {
        DexEvent::OrderPlaced(data) => {
            let exchange_id = data.exchange_order_id.parse().ok();
            let executed = data.original_quantity.saturating_sub(data.placed_quantity);
            cache.apply_placed(
                &data.client_order_id,
                exchange_id,
                Some(data.placed_quantity),
                Some(executed),
            );
        }
        DexEvent::OrderFilled(data) => {
            if let Some(client_order_id) = data.client_order_id.as_deref() {
                if cache.contains(client_order_id) {
                    cache.apply_fill(client_order_id, data.quantity);
                    return;
                }
            }
            if let Ok(exchange_id) = data.exchange_order_id.parse::<u128>() {
                if let Some(order) = cache.find_by_exchange_id(exchange_id) {
                    cache.apply_fill(&order.client_order_id, data.quantity);
                }
            }
        }
        DexEvent::OrderCancelled(data) => {
            if let Some(client_order_id) = data.client_order_id.as_deref() {
                if cache.apply_cancelled(client_order_id).is_some() {
                    return;
                }
            }
            if let Ok(exchange_id) = data.exchange_order_id.parse::<u128>() {
                if let Some(order) = cache.find_by_exchange_id(exchange_id) {
                    cache.apply_cancelled(&order.client_order_id);
                }
            }
        }
    }
}

// Fan-out of typed events to the WebSocket push surface
pub struct EventRouter {
    orders: broadcast::Sender<DexEvent>,
    trades: broadcast::Sender<DexEvent>,
}

impl EventRouter {
    pub fn new(capacity: usize) -> Self {
        let (orders, _) = broadcast::channel(capacity);
        let (trades, _) = broadcast::channel(capacity);
        Self { orders, trades }
    }

    pub fn publish(&self, event: DexEvent) {
        let sender = match event.channel() {
            Channel::Order => &self.orders,
            Channel::Trade => &self.trades,
        };
        // Send only fails with no live subscriber, which is fine
        let _ = sender.send(event);
    }

    pub fn subscribe_orders(&self) -> broadcast::Receiver<DexEvent> {
        self.orders.subscribe()
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<DexEvent> {
        self.trades.subscribe()
    }
}

// Shared by the insert handler (inline response events) and the subscriber:
// classify, reconcile with the cache, push to the router, and hand back the
// typed events for the HTTP response body.
pub fn process_chain_events(
    raw_events: &[SuiEvent],
    identity: &TradeIdentity,
    cache: &OrderCache,
    router: &EventRouter,
) -> Vec<DexEvent> {
    let mut processed = Vec::new();
    for raw in raw_events {
        for event in parse_events(raw, identity) {
            if log_enabled!(Level::Debug) {
                debug!("processing {} event", event.type_name());
            }
            apply_to_cache(&event, cache);
            router.publish(event.clone());
            processed.push(event);
        }
    }
    processed
}
