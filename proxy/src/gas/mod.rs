mod manager;

pub use manager::*;

use dex_common::{
    api::sui::{Coin, SequenceNumber, TransactionBlockResponse},
    crypto::{Digest, ObjectId},
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum GasCoinStatus {
    Free,
    InUse,
    NeedsVersionUpdate,
    SkipForRemainderOfEpoch,
}

// One fee-payment coin tracked by the manager. The (version, digest) pair
// must match the latest on-chain state before the coin backs a transaction.
#[derive(Debug, Clone)]
pub struct GasCoin {
    pub id: ObjectId,
    pub version: SequenceNumber,
    pub digest: Digest,
    pub balance: u64,
    pub status: GasCoinStatus,
}

impl GasCoin {
    pub fn from_coin(coin: &Coin) -> Self {
        Self {
            id: coin.coin_object_id,
            version: coin.version,
            digest: coin.digest.clone(),
            balance: coin.balance,
            status: GasCoinStatus::Free,
        }
    }

    // Balance exactly at either bound counts as in-band
    pub fn is_out_of_band(&self, min: u64, max: u64) -> bool {
        self.balance < min || self.balance > max
    }
}

// Snapshot handed to callers while they hold the coin
#[derive(Debug, Clone)]
pub struct GasCoinHandle {
    pub id: ObjectId,
    pub version: SequenceNumber,
    pub digest: Digest,
    pub balance: u64,
}

// What the borrower learned about the transaction that used the coin
pub enum ReleaseOutcome<'a> {
    // Landed on chain (even if it aborted); effects carry the new gas state.
    // balance_delta covers funds moved in or out besides the gas charge.
    Success {
        response: &'a TransactionBlockResponse,
        balance_delta: i128,
    },
    // Submission failed in an unknown state; verify by re-reading
    Unknown,
    // The coin was never attached to a submission
    Untouched,
    // The chain may still apply the transaction later this epoch
    FinalityTimeout,
}

impl<'a> ReleaseOutcome<'a> {
    // The common case: the transaction only charged gas
    pub fn success(response: &'a TransactionBlockResponse) -> Self {
        ReleaseOutcome::Success {
            response,
            balance_delta: 0,
        }
    }
}

// Scoped acquisition of a pooled gas coin. Every exit path must go through
// `release`; dropping the guard without releasing parks the coin in
// NeedsVersionUpdate so the periodic reconciler re-synchronises it.
pub struct GasCoinGuard {
    manager: Arc<GasCoinManager>,
    handle: GasCoinHandle,
    is_main: bool,
    released: bool,
}

impl GasCoinGuard {
    pub(crate) fn new(manager: Arc<GasCoinManager>, handle: GasCoinHandle, is_main: bool) -> Self {
        Self {
            manager,
            handle,
            is_main,
            released: false,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.handle.id
    }

    pub fn balance(&self) -> u64 {
        self.handle.balance
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }

    pub fn handle(&self) -> &GasCoinHandle {
        &self.handle
    }

    pub(crate) fn refresh_handle(&mut self, handle: GasCoinHandle) {
        self.handle = handle;
    }

    // Run the version-update protocol and restore the coin's status.
    // Consumes the guard; the status transition always completes before the
    // coin becomes acquirable again.
    pub async fn release(mut self, outcome: ReleaseOutcome<'_>) {
        self.released = true;
        let manager = Arc::clone(&self.manager);
        manager.release_coin(&self.handle, outcome).await;
    }
}

impl Drop for GasCoinGuard {
    fn drop(&mut self) {
        if !self.released {
            self.manager.park_coin(self.handle.id);
        }
    }
}
