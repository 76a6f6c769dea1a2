mod cache;

pub use cache::*;

use dex_common::{crypto::ObjectId, crypto::TransactionDigest, time::TimestampMillis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum OrderSide {
    #[serde(rename = "BUY")]
    #[strum(serialize = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    #[strum(serialize = "SELL")]
    Sell,
}

impl OrderSide {
    pub fn is_bid(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum OrderType {
    #[serde(rename = "GTC")]
    #[strum(serialize = "GTC")]
    GoodTilCancelled,
    #[serde(rename = "IOC")]
    #[strum(serialize = "IOC")]
    ImmediateOrCancel,
    #[serde(rename = "POST_ONLY", alias = "GPO")]
    #[strum(serialize = "POST_ONLY")]
    PostOnly,
}

// Local lifecycle machine. Transitions only move forward along
// Unknown -> PendingInsert -> Open -> {Cancelled, Finalised}; concurrent
// writers may retry a transition but can never roll one back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Unknown,
    PendingInsert,
    Open,
    Cancelled,
    Finalised,
}

impl OrderStatus {
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Unknown => 0,
            OrderStatus::PendingInsert => 1,
            OrderStatus::Open => 2,
            OrderStatus::Cancelled | OrderStatus::Finalised => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Finalised)
    }

    // Whether moving to `next` respects the partial order
    pub fn can_upgrade_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() > self.rank() || *self == next
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub client_order_id: String,
    pub pool_id: ObjectId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: u64,
    // Total quantity requested at insertion
    pub quantity: u64,
    pub remaining: u64,
    pub executed: u64,
    pub expiration_ts: Option<TimestampMillis>,
    pub status: OrderStatus,
    pub exchange_order_id: Option<u128>,
    // Every transaction observed to touch this order, in observation order
    pub tx_digests: Vec<TransactionDigest>,
    pub created_at: TimestampMillis,
}

impl Order {
    pub fn new(
        client_order_id: String,
        pool_id: ObjectId,
        side: OrderSide,
        order_type: OrderType,
        price: u64,
        quantity: u64,
        expiration_ts: Option<TimestampMillis>,
    ) -> Self {
        Self {
            client_order_id,
            pool_id,
            side,
            order_type,
            price,
            quantity,
            remaining: quantity,
            executed: 0,
            expiration_ts,
            status: OrderStatus::PendingInsert,
            exchange_order_id: None,
            tx_digests: Vec::new(),
            created_at: dex_common::time::current_millis(),
        }
    }

    pub fn push_digest(&mut self, digest: TransactionDigest) {
        if !self.tx_digests.contains(&digest) {
            self.tx_digests.push(digest);
        }
    }

    // Monotonic upgrade; returns whether the status changed
    pub fn upgrade_status(&mut self, next: OrderStatus) -> bool {
        if self.status != next && self.status.can_upgrade_to(next) {
            self.status = next;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(
            "1".to_string(),
            ObjectId::zero(),
            OrderSide::Buy,
            OrderType::GoodTilCancelled,
            100,
            1000,
            None,
        )
    }

    #[test]
    fn test_status_partial_order() {
        assert!(OrderStatus::Unknown.can_upgrade_to(OrderStatus::PendingInsert));
        assert!(OrderStatus::PendingInsert.can_upgrade_to(OrderStatus::Open));
        assert!(OrderStatus::Open.can_upgrade_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Open.can_upgrade_to(OrderStatus::Finalised));
        assert!(OrderStatus::PendingInsert.can_upgrade_to(OrderStatus::Finalised));

        // no downgrades
        assert!(!OrderStatus::Open.can_upgrade_to(OrderStatus::PendingInsert));
        assert!(!OrderStatus::Cancelled.can_upgrade_to(OrderStatus::Open));
        assert!(!OrderStatus::Finalised.can_upgrade_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_upgrade_to(OrderStatus::Finalised));
    }

    #[test]
    fn test_upgrade_status_is_sticky_at_terminal() {
        let mut order = order();
        assert!(order.upgrade_status(OrderStatus::Open));
        assert!(order.upgrade_status(OrderStatus::Cancelled));
        assert!(!order.upgrade_status(OrderStatus::Open));
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_push_digest_dedupes() {
        let mut order = order();
        order.push_digest(TransactionDigest::new("a"));
        order.push_digest(TransactionDigest::new("a"));
        order.push_digest(TransactionDigest::new("b"));
        assert_eq!(order.tx_digests.len(), 2);
    }

    #[test]
    fn test_order_type_accepts_gpo_alias() {
        let parsed: OrderType = serde_json::from_str("\"GPO\"").unwrap();
        assert_eq!(parsed, OrderType::PostOnly);
        let parsed: OrderType = serde_json::from_str("\"POST_ONLY\"").unwrap();
        assert_eq!(parsed, OrderType::PostOnly);
    }
}
