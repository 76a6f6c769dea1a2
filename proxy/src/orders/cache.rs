use super::{Order, OrderStatus};
use crate::error::{ProxyError, ProxyResult};
use dex_common::crypto::ObjectId;
use indexmap::IndexMap;
use log::{debug, log_enabled, Level};
use std::sync::{Mutex, MutexGuard, PoisonError};

// Bounded client_order_id -> Order map shared by the request handlers and
// the event subscriber. Insertion order doubles as age for eviction: when
// full, the oldest terminal entry is dropped; with nothing evictable the
// insertion fails and the caller surfaces a retryable error.
pub struct OrderCache {
    inner: Mutex<IndexMap<String, Order>>,
    capacity: usize,
}

impl OrderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(IndexMap::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn add(&self, order: Order) -> ProxyResult<()> {
        let mut inner = self.lock_inner();
        if inner.contains_key(&order.client_order_id) {
            return Err(ProxyError::BadRequest(format!(
                "client_order_id {} already exists",
                order.client_order_id
            )));
        }
        if inner.len() >= self.capacity {
            let evictable = inner
                .iter()
                .find(|(_, entry)| entry.status.is_terminal())
                .map(|(id, _)| id.clone());
            match evictable {
                Some(id) => {
                    if log_enabled!(Level::Debug) {
                        debug!("order cache full, evicting terminal order {}", id);
                    }
                    inner.shift_remove(&id);
                }
                None => return Err(ProxyError::CacheFull),
            }
        }
        inner.insert(order.client_order_id.clone(), order);
        Ok(())
    }

    pub fn get(&self, client_order_id: &str) -> Option<Order> {
        self.lock_inner().get(client_order_id).cloned()
    }

    pub fn contains(&self, client_order_id: &str) -> bool {
        self.lock_inner().contains_key(client_order_id)
    }

    pub fn remove(&self, client_order_id: &str) -> Option<Order> {
        self.lock_inner().shift_remove(client_order_id)
    }

    pub fn len(&self) -> usize {
        self.lock_inner().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().is_empty()
    }

    // Mutate one order in place; true when it existed
    pub fn update<F: FnOnce(&mut Order)>(&self, client_order_id: &str, f: F) -> bool {
        let mut inner = self.lock_inner();
        match inner.get_mut(client_order_id) {
            Some(order) => {
                f(order);
                true
            }
            None => false,
        }
    }

    pub fn open_orders(&self, pool_id: ObjectId) -> Vec<Order> {
        self.lock_inner()
            .values()
            .filter(|order| order.pool_id == pool_id && !order.status.is_terminal())
            .cloned()
            .collect()
    }

    pub fn client_ids_for_pool(&self, pool_id: ObjectId) -> Vec<String> {
        self.lock_inner()
            .values()
            .filter(|order| order.pool_id == pool_id)
            .map(|order| order.client_order_id.clone())
            .collect()
    }

    // Find an order by the exchange-assigned id
    pub fn find_by_exchange_id(&self, exchange_order_id: u128) -> Option<Order> {
        self.lock_inner()
            .values()
            .find(|order| order.exchange_order_id == Some(exchange_order_id))
            .cloned()
    }

    // ---- event application; each writer owns only its fields and the
    // status only ever moves forward ----

    // OrderPlaced from either the response events or the subscription
    pub fn apply_placed(
        &self,
        client_order_id: &str,
        exchange_order_id: Option<u128>,
        remaining: Option<u64>,
        executed: Option<u64>,
    ) -> bool {
        self.update(client_order_id, |order| {
            if order.exchange_order_id.is_none() {
                order.exchange_order_id = exchange_order_id;
            }
            if let Some(remaining) = remaining {
                order.remaining = remaining;
            }
            if let Some(executed) = executed {
                order.executed = executed;
            }
            order.upgrade_status(OrderStatus::Open);
        })
    }

    // A fill reduces the remaining quantity; it never deletes the order,
    // removal belongs to the cancellation/finalisation paths
    pub fn apply_fill(&self, client_order_id: &str, filled: u64) -> bool {
        self.update(client_order_id, |order| {
            order.executed = order.executed.saturating_add(filled);
            order.remaining = order.remaining.saturating_sub(filled);
            order.upgrade_status(OrderStatus::Open);
        })
    }

    // Cancellation is terminal: mark and drop the entry
    pub fn apply_cancelled(&self, client_order_id: &str) -> Option<Order> {
        let mut inner = self.lock_inner();
        let order = inner.get_mut(client_order_id)?;
        order.upgrade_status(OrderStatus::Cancelled);
        inner.shift_remove(client_order_id)
    }

    fn lock_inner(&self) -> MutexGuard<'_, IndexMap<String, Order>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{OrderSide, OrderType};

    fn order(id: &str) -> Order {
        Order::new(
            id.to_string(),
            ObjectId::zero(),
            OrderSide::Buy,
            OrderType::GoodTilCancelled,
            100,
            1000,
            None,
        )
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let cache = OrderCache::new(2);
        cache.add(order("1")).unwrap();
        cache.add(order("2")).unwrap();
        assert!(matches!(cache.add(order("3")), Err(ProxyError::CacheFull)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_oldest_terminal_entry_is_evicted() {
        let cache = OrderCache::new(2);
        cache.add(order("1")).unwrap();
        cache.add(order("2")).unwrap();
        cache.update("1", |order| {
            order.status = OrderStatus::Finalised;
        });
        cache.update("2", |order| {
            order.status = OrderStatus::Cancelled;
        });

        cache.add(order("3")).unwrap();
        // "1" was oldest and terminal
        assert!(cache.get("1").is_none());
        assert!(cache.get("2").is_some());
        assert!(cache.get("3").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let cache = OrderCache::new(4);
        cache.add(order("1")).unwrap();
        assert!(matches!(
            cache.add(order("1")),
            Err(ProxyError::BadRequest(_))
        ));
    }

    #[test]
    fn test_apply_placed_is_idempotent() {
        let cache = OrderCache::new(4);
        cache.add(order("1")).unwrap();

        assert!(cache.apply_placed("1", Some(42), Some(600), Some(400)));
        let first = cache.get("1").unwrap();
        assert!(cache.apply_placed("1", Some(42), Some(600), Some(400)));
        let second = cache.get("1").unwrap();

        assert_eq!(first.status, OrderStatus::Open);
        assert_eq!(second.status, OrderStatus::Open);
        assert_eq!(second.exchange_order_id, Some(42));
        assert_eq!(second.remaining, 600);
        assert_eq!(second.executed, 400);
    }

    #[test]
    fn test_apply_placed_never_overwrites_exchange_id() {
        let cache = OrderCache::new(4);
        cache.add(order("1")).unwrap();
        cache.apply_placed("1", Some(42), None, None);
        cache.apply_placed("1", Some(43), None, None);
        assert_eq!(cache.get("1").unwrap().exchange_order_id, Some(42));
    }

    #[test]
    fn test_fill_keeps_order_until_cancelled() {
        let cache = OrderCache::new(4);
        cache.add(order("1")).unwrap();
        cache.apply_placed("1", Some(42), Some(1000), Some(0));

        assert!(cache.apply_fill("1", 300));
        let entry = cache.get("1").unwrap();
        assert_eq!(entry.remaining, 700);
        assert_eq!(entry.executed, 300);

        let removed = cache.apply_cancelled("1").unwrap();
        assert_eq!(removed.status, OrderStatus::Cancelled);
        assert!(cache.get("1").is_none());
    }

    #[test]
    fn test_status_never_rolls_back() {
        let cache = OrderCache::new(4);
        cache.add(order("1")).unwrap();
        cache.update("1", |order| {
            order.upgrade_status(OrderStatus::Finalised);
        });
        // A late OrderPlaced event must not reopen the order
        cache.apply_placed("1", Some(42), None, None);
        assert_eq!(cache.get("1").unwrap().status, OrderStatus::Finalised);
    }

    #[test]
    fn test_open_orders_filters_by_pool_and_liveness() {
        let cache = OrderCache::new(8);
        cache.add(order("1")).unwrap();
        cache.add(order("2")).unwrap();
        cache.update("2", |order| {
            order.status = OrderStatus::Cancelled;
        });
        let open = cache.open_orders(ObjectId::zero());
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].client_order_id, "1");
    }
}
