// Pool of on-chain authority objects (account caps on v2, balance-manager
// slots on v3) paired with gas coins by the executor. Unlike gas coins these
// are by-reference inputs: the chain does not mutate them, so no version
// tracking is required. The pool owns an indexed arena; guards are
// index-backed so the same object may fill several slots (a v3 balance
// manager is a shared object and supports concurrent transactions).

use crate::error::{ProxyError, ProxyResult};
use dex_common::crypto::ObjectId;
use indexmap::IndexSet;
use log::info;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AccountCapStatus {
    Free,
    InUse,
    SkipForRemainderOfEpoch,
}

struct CapSlot {
    id: ObjectId,
    status: AccountCapStatus,
}

struct CapState {
    slots: Vec<CapSlot>,
    cursor: usize,
}

pub struct AccountCapPool {
    state: Mutex<CapState>,
}

impl AccountCapPool {
    pub fn new(caps: Vec<ObjectId>) -> ProxyResult<Arc<Self>> {
        if caps.is_empty() {
            return Err(ProxyError::Startup(
                "at least one account cap must be configured".to_string(),
            ));
        }
        let distinct: IndexSet<ObjectId> = caps.iter().copied().collect();
        info!(
            "account cap pool started with {} slots ({} distinct caps)",
            caps.len(),
            distinct.len()
        );
        Ok(Arc::new(Self {
            state: Mutex::new(CapState {
                slots: caps
                    .into_iter()
                    .map(|id| CapSlot {
                        id,
                        status: AccountCapStatus::Free,
                    })
                    .collect(),
                cursor: 0,
            }),
        }))
    }

    // Non-blocking round-robin acquisition
    pub fn get_free_account_cap(self: &Arc<Self>) -> ProxyResult<AccountCapGuard> {
        let mut state = self.lock_state();
        let count = state.slots.len();
        for offset in 0..count {
            let idx = (state.cursor + offset) % count;
            if state.slots[idx].status == AccountCapStatus::Free {
                state.slots[idx].status = AccountCapStatus::InUse;
                let id = state.slots[idx].id;
                state.cursor = (idx + 1) % count;
                drop(state);
                return Ok(AccountCapGuard {
                    pool: Arc::clone(self),
                    index: idx,
                    id,
                    released: false,
                });
            }
        }
        Err(ProxyError::PoolExhausted("account cap"))
    }

    // A cap minted at runtime joins the rotation
    pub fn register(&self, id: ObjectId) {
        self.lock_state().slots.push(CapSlot {
            id,
            status: AccountCapStatus::Free,
        });
    }

    pub fn slot_count(&self) -> usize {
        self.lock_state().slots.len()
    }

    pub fn free_slot_count(&self) -> usize {
        self.lock_state()
            .slots
            .iter()
            .filter(|slot| slot.status == AccountCapStatus::Free)
            .count()
    }

    pub fn status_of(&self, id: ObjectId) -> Option<AccountCapStatus> {
        self.lock_state()
            .slots
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| slot.status)
    }

    // Caps poisoned by a finality timeout become usable again once the
    // epoch boundary has passed
    pub fn on_epoch_change(&self) {
        let mut state = self.lock_state();
        for slot in &mut state.slots {
            if slot.status == AccountCapStatus::SkipForRemainderOfEpoch {
                slot.status = AccountCapStatus::Free;
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, index: usize, status: AccountCapStatus) {
        let mut state = self.lock_state();
        if let Some(slot) = state.slots.get_mut(index) {
            slot.status = status;
        }
    }
}

// Scoped acquisition; dropping without an explicit release frees the slot
// (there is no version state to resynchronise)
pub struct AccountCapGuard {
    pool: Arc<AccountCapPool>,
    index: usize,
    id: ObjectId,
    released: bool,
}

impl AccountCapGuard {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn release(mut self) {
        self.released = true;
        self.pool.set_status(self.index, AccountCapStatus::Free);
    }

    pub fn release_skip_epoch(mut self) {
        self.released = true;
        self.pool
            .set_status(self.index, AccountCapStatus::SkipForRemainderOfEpoch);
    }
}

impl Drop for AccountCapGuard {
    fn drop(&mut self) {
        if !self.released {
            self.pool.set_status(self.index, AccountCapStatus::Free);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ObjectId {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        ObjectId::new(bytes)
    }

    #[test]
    fn test_empty_pool_is_a_startup_error() {
        assert!(matches!(
            AccountCapPool::new(Vec::new()),
            Err(ProxyError::Startup(_))
        ));
    }

    #[test]
    fn test_round_robin_and_exhaustion() {
        let pool = AccountCapPool::new(vec![id(1), id(2)]).unwrap();
        let a = pool.get_free_account_cap().unwrap();
        let b = pool.get_free_account_cap().unwrap();
        assert_ne!(a.id(), b.id());
        assert!(matches!(
            pool.get_free_account_cap(),
            Err(ProxyError::PoolExhausted(_))
        ));
        a.release();
        let c = pool.get_free_account_cap().unwrap();
        assert_eq!(c.id(), id(1));
        c.release();
        b.release();
    }

    #[test]
    fn test_duplicate_slots_allow_concurrent_use_of_one_object() {
        // A v3 balance manager fills several slots
        let pool = AccountCapPool::new(vec![id(9), id(9), id(9)]).unwrap();
        let a = pool.get_free_account_cap().unwrap();
        let b = pool.get_free_account_cap().unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(pool.free_slot_count(), 1);
        a.release();
        b.release();
        assert_eq!(pool.free_slot_count(), 3);
    }

    #[test]
    fn test_skip_epoch_released_on_epoch_change() {
        let pool = AccountCapPool::new(vec![id(1)]).unwrap();
        let guard = pool.get_free_account_cap().unwrap();
        guard.release_skip_epoch();
        assert_eq!(
            pool.status_of(id(1)),
            Some(AccountCapStatus::SkipForRemainderOfEpoch)
        );
        assert!(pool.get_free_account_cap().is_err());

        pool.on_epoch_change();
        assert_eq!(pool.status_of(id(1)), Some(AccountCapStatus::Free));
        pool.get_free_account_cap().unwrap().release();
    }

    #[test]
    fn test_dropped_guard_frees_slot() {
        let pool = AccountCapPool::new(vec![id(1)]).unwrap();
        {
            let _guard = pool.get_free_account_cap().unwrap();
        }
        assert_eq!(pool.status_of(id(1)), Some(AccountCapStatus::Free));
    }

    #[test]
    fn test_register_extends_rotation() {
        let pool = AccountCapPool::new(vec![id(1)]).unwrap();
        pool.register(id(2));
        assert_eq!(pool.slot_count(), 2);
        let a = pool.get_free_account_cap().unwrap();
        let b = pool.get_free_account_cap().unwrap();
        assert_ne!(a.id(), b.id());
        a.release();
        b.release();
    }
}
