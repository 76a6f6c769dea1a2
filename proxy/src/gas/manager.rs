use super::{GasCoin, GasCoinGuard, GasCoinHandle, GasCoinStatus, ReleaseOutcome};
use crate::{
    chain::{ChainClient, TxSigner},
    config::GasManagerConfig,
    error::{ProxyError, ProxyResult},
};
use dex_common::{
    api::sui::{Coin, ObjectData, TransactionBlockResponse, SUI_COIN_TYPE},
    crypto::ObjectId,
    task::spawn_task,
};
use indexmap::IndexMap;
use log::{debug, info, log_enabled, warn, Level};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::sleep};

// Pause between the fallback object reads of the version-update protocol
const VERSION_REFRESH_PAUSE: Duration = Duration::from_millis(500);

struct PoolState {
    main: GasCoin,
    children: IndexMap<ObjectId, GasCoin>,
    // Round-robin position for child acquisition
    cursor: usize,
}

impl PoolState {
    fn coin_mut(&mut self, id: ObjectId) -> Option<&mut GasCoin> {
        if self.main.id == id {
            Some(&mut self.main)
        } else {
            self.children.get_mut(&id)
        }
    }

    fn handle_of(coin: &GasCoin) -> GasCoinHandle {
        GasCoinHandle {
            id: coin.id,
            version: coin.version,
            digest: coin.digest.clone(),
            balance: coin.balance,
        }
    }
}

// Owns the fee-payment coin set: one large main coin plus a band-bounded set
// of children served round-robin to concurrent transactions. All state lives
// behind a plain mutex that is never held across a suspension point, so the
// acquisition paths are synchronous and the status transitions atomic.
pub struct GasCoinManager {
    chain: Arc<dyn ChainClient>,
    signer: Arc<TxSigner>,
    config: GasManagerConfig,
    state: Mutex<PoolState>,
}

impl GasCoinManager {
    // Observe the wallet's SUI coins, elect the richest as main, consolidate
    // out-of-band children and replenish up to the configured count.
    pub async fn start(
        chain: Arc<dyn ChainClient>,
        signer: Arc<TxSigner>,
        config: GasManagerConfig,
    ) -> ProxyResult<Arc<Self>> {
        let coins = fetch_all_coins(chain.as_ref(), &signer, SUI_COIN_TYPE).await?;
        if coins.is_empty() {
            return Err(ProxyError::Startup(format!(
                "no SUI coin owned by wallet {}",
                signer.address()
            )));
        }

        let main_idx = coins
            .iter()
            .enumerate()
            .max_by_key(|(_, coin)| coin.balance)
            .map(|(idx, _)| idx)
            .ok_or_else(|| ProxyError::Startup("cannot establish main gas coin".to_string()))?;
        let main = GasCoin::from_coin(&coins[main_idx]);
        let children: IndexMap<ObjectId, GasCoin> = coins
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != main_idx)
            .map(|(_, coin)| (coin.coin_object_id, GasCoin::from_coin(coin)))
            .collect();

        info!(
            "gas manager: main coin {} (balance {}), {} tracked children",
            main.id,
            main.balance,
            children.len()
        );

        let manager = Arc::new(Self {
            chain,
            signer,
            config,
            state: Mutex::new(PoolState {
                main,
                children,
                cursor: 0,
            }),
        });

        // Consolidation failures here are not fatal; the reconciler retries
        if let Err(e) = manager.rebalance().await {
            warn!("initial gas pool rebalance failed: {}", e);
        }
        Ok(manager)
    }

    pub fn start_reconciler(self: &Arc<Self>) -> JoinHandle<()> {
        let zelf = Arc::clone(self);
        spawn_task("gas-reconciler", async move {
            loop {
                sleep(zelf.config.sync_interval()).await;
                zelf.reconcile().await;
            }
        })
    }

    // Non-blocking: serves the next Free child round-robin or fails
    pub fn get_free_gas_coin(self: &Arc<Self>) -> ProxyResult<GasCoinGuard> {
        let mut state = self.lock_state();
        let count = state.children.len();
        for offset in 0..count {
            let idx = (state.cursor + offset) % count;
            let Some((_, coin)) = state.children.get_index_mut(idx) else {
                continue;
            };
            if coin.status == GasCoinStatus::Free {
                coin.status = GasCoinStatus::InUse;
                let handle = PoolState::handle_of(coin);
                state.cursor = (idx + 1) % count;
                drop(state);
                return Ok(GasCoinGuard::new(Arc::clone(self), handle, false));
            }
        }
        Err(ProxyError::PoolExhausted("gas coin"))
    }

    // Main is reserved for large-balance operations. Returns None while a
    // concurrent operation holds it; the request layer retries.
    pub async fn get_main_gas_coin(self: &Arc<Self>) -> Option<GasCoinGuard> {
        let (id, status) = {
            let state = self.lock_state();
            (state.main.id, state.main.status)
        };
        if status == GasCoinStatus::NeedsVersionUpdate {
            if self.refresh_from_chain(id, 1).await {
                self.set_status(id, GasCoinStatus::Free);
            } else {
                return None;
            }
        }
        let handle = self.try_take_main()?;
        Some(GasCoinGuard::new(Arc::clone(self), handle, true))
    }

    // Recovery path for funds that arrived out of band: sweep wallet coins we
    // have never registered into main. Caller must hold the main guard.
    pub async fn merge_untracked_into_main(&self, guard: &mut GasCoinGuard) -> ProxyResult<()> {
        let owned = fetch_all_coins(self.chain.as_ref(), &self.signer, SUI_COIN_TYPE).await?;
        let (untracked, gained) = {
            let state = self.lock_state();
            let mut untracked = Vec::new();
            let mut gained = 0u64;
            for coin in &owned {
                let id = coin.coin_object_id;
                if id != state.main.id && !state.children.contains_key(&id) {
                    untracked.push(id);
                    gained += coin.balance;
                }
            }
            (untracked, gained)
        };
        if untracked.is_empty() {
            return Ok(());
        }
        if log_enabled!(Level::Info) {
            info!(
                "merging {} untracked coins ({} MIST) into main {}",
                untracked.len(),
                gained,
                guard.id()
            );
        }

        let mut inputs = vec![guard.id()];
        inputs.extend(untracked);
        let tx = self
            .chain
            .build_pay_all_sui(
                self.signer.address(),
                inputs,
                self.signer.address(),
                self.config.gas_budget_mist,
            )
            .await?;
        let response = self.signer.sign_and_execute(self.chain.as_ref(), &tx).await?;
        if !self.finish_main_tx(guard.id(), &response, gained as i128).await {
            return Err(ProxyError::Execution(
                "main gas coin version update failed after merge".to_string(),
            ));
        }

        let handle = {
            let state = self.lock_state();
            PoolState::handle_of(&state.main)
        };
        guard.refresh_handle(handle);
        Ok(())
    }

    // Periodic tick: refresh parked coins, then consolidate and replenish
    pub async fn reconcile(&self) {
        let stale: Vec<ObjectId> = {
            let state = self.lock_state();
            let mut stale: Vec<ObjectId> = state
                .children
                .values()
                .filter(|coin| coin.status == GasCoinStatus::NeedsVersionUpdate)
                .map(|coin| coin.id)
                .collect();
            if state.main.status == GasCoinStatus::NeedsVersionUpdate {
                stale.push(state.main.id);
            }
            stale
        };
        for id in stale {
            if self.refresh_from_chain(id, 1).await {
                self.set_status(id, GasCoinStatus::Free);
            }
        }

        if let Err(e) = self.rebalance().await {
            warn!("gas pool rebalance failed: {}", e);
        }
    }

    // Re-read every coin poisoned by a finality timeout; the epoch boundary
    // has passed so their fate is settled either way
    pub async fn on_epoch_change(&self) {
        let skipped: Vec<ObjectId> = {
            let state = self.lock_state();
            let mut skipped: Vec<ObjectId> = state
                .children
                .values()
                .filter(|coin| coin.status == GasCoinStatus::SkipForRemainderOfEpoch)
                .map(|coin| coin.id)
                .collect();
            if state.main.status == GasCoinStatus::SkipForRemainderOfEpoch {
                skipped.push(state.main.id);
            }
            skipped
        };
        for id in skipped {
            let status = if self.refresh_from_chain(id, 1).await {
                GasCoinStatus::Free
            } else {
                GasCoinStatus::NeedsVersionUpdate
            };
            self.set_status(id, status);
        }
    }

    // ---- introspection ----

    pub fn main_coin(&self) -> GasCoin {
        self.lock_state().main.clone()
    }

    pub fn child_count(&self) -> usize {
        self.lock_state().children.len()
    }

    pub fn free_child_count(&self) -> usize {
        self.lock_state()
            .children
            .values()
            .filter(|coin| coin.status == GasCoinStatus::Free)
            .count()
    }

    pub fn coin_status(&self, id: ObjectId) -> Option<GasCoinStatus> {
        let state = self.lock_state();
        if state.main.id == id {
            Some(state.main.status)
        } else {
            state.children.get(&id).map(|coin| coin.status)
        }
    }

    pub fn child_ids(&self) -> Vec<ObjectId> {
        self.lock_state().children.keys().copied().collect()
    }

    // ---- release protocol ----

    pub(crate) async fn release_coin(&self, handle: &GasCoinHandle, outcome: ReleaseOutcome<'_>) {
        let id = handle.id;
        let status = match outcome {
            ReleaseOutcome::Success {
                response,
                balance_delta,
            } => {
                if self.apply_response(id, response, balance_delta) {
                    GasCoinStatus::Free
                } else if self.refresh_from_chain(id, 2).await {
                    GasCoinStatus::Free
                } else {
                    GasCoinStatus::NeedsVersionUpdate
                }
            }
            ReleaseOutcome::Unknown => {
                if self.refresh_from_chain(id, 2).await {
                    GasCoinStatus::Free
                } else {
                    GasCoinStatus::NeedsVersionUpdate
                }
            }
            ReleaseOutcome::Untouched => GasCoinStatus::Free,
            ReleaseOutcome::FinalityTimeout => GasCoinStatus::SkipForRemainderOfEpoch,
        };
        self.set_status(id, status);
    }

    // Drop backstop: a guard that was never released leaves its coin parked
    // for the reconciler instead of leaking an InUse entry
    pub(crate) fn park_coin(&self, id: ObjectId) {
        self.set_status(id, GasCoinStatus::NeedsVersionUpdate);
    }

    // ---- internals ----

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, id: ObjectId, status: GasCoinStatus) {
        let mut state = self.lock_state();
        if let Some(coin) = state.coin_mut(id) {
            coin.status = status;
        }
    }

    fn try_take_main(&self) -> Option<GasCoinHandle> {
        let mut state = self.lock_state();
        if state.main.status == GasCoinStatus::Free {
            state.main.status = GasCoinStatus::InUse;
            Some(PoolState::handle_of(&state.main))
        } else {
            None
        }
    }

    // Update version/digest/balance from the transaction's own effects.
    // Cheap and authoritative; fails when the response lacks effects or the
    // reported version did not advance past our tracked one.
    fn apply_response(
        &self,
        id: ObjectId,
        response: &TransactionBlockResponse,
        balance_delta: i128,
    ) -> bool {
        let Some(effects) = response.effects.as_ref() else {
            return false;
        };
        let reference = &effects.gas_object.reference;
        if reference.object_id != id {
            return false;
        }
        let net_gas = effects.gas_used.net_gas_usage();
        let mut state = self.lock_state();
        let Some(coin) = state.coin_mut(id) else {
            return false;
        };
        if reference.version <= coin.version {
            return false;
        }
        coin.version = reference.version;
        coin.digest = reference.digest.clone();
        let balance = coin.balance as i128 - net_gas + balance_delta;
        coin.balance = balance.max(0) as u64;
        true
    }

    // Authoritative object re-read. True iff the on-chain version advanced
    // past our tracked one or already matches it; false when the object is
    // gone or every read failed or lagged behind.
    async fn refresh_from_chain(&self, id: ObjectId, attempts: usize) -> bool {
        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(VERSION_REFRESH_PAUSE).await;
            }
            let response = match self.chain.get_object(id).await {
                Ok(response) => response,
                Err(e) => {
                    if log_enabled!(Level::Debug) {
                        debug!("object read failed for {}: {}", id, e);
                    }
                    continue;
                }
            };
            let Some(data) = response.data else {
                // Object no longer exists (merged away or never ours)
                return false;
            };
            let balance = coin_balance_from_content(&data);
            let mut state = self.lock_state();
            let Some(coin) = state.coin_mut(id) else {
                return false;
            };
            if data.version >= coin.version {
                coin.version = data.version;
                coin.digest = data.digest;
                if let Some(balance) = balance {
                    coin.balance = balance;
                }
                return true;
            }
            // A replica served us an older version than we tracked; retry
            drop(state);
        }
        false
    }

    // Post-transaction bookkeeping for main during manager-driven operations.
    // Returns false when main had to be parked in NeedsVersionUpdate.
    async fn finish_main_tx(
        &self,
        id: ObjectId,
        response: &TransactionBlockResponse,
        balance_delta: i128,
    ) -> bool {
        if self.apply_response(id, response, balance_delta) {
            return true;
        }
        if self.refresh_from_chain(id, 1).await {
            return true;
        }
        self.set_status(id, GasCoinStatus::NeedsVersionUpdate);
        false
    }

    // Consolidate out-of-band children and untracked wallet coins into main,
    // then split main to restore the configured child count
    async fn rebalance(&self) -> ProxyResult<()> {
        let Some(main) = self.try_take_main() else {
            debug!("main gas coin busy, skipping rebalance tick");
            return Ok(());
        };

        match self.merge_step(&main).await {
            Ok(true) => {}
            Ok(false) => return Ok(()), // main parked by the version protocol
            Err(e) => {
                self.restore_main_after_error(&main, &e).await;
                return Err(e);
            }
        }

        match self.split_step(&main).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                self.restore_main_after_error(&main, &e).await;
                return Err(e);
            }
        }

        self.set_status(main.id, GasCoinStatus::Free);
        Ok(())
    }

    async fn restore_main_after_error(&self, main: &GasCoinHandle, error: &ProxyError) {
        let status = if error.is_finality_timeout() {
            GasCoinStatus::SkipForRemainderOfEpoch
        } else if self.refresh_from_chain(main.id, 1).await {
            GasCoinStatus::Free
        } else {
            GasCoinStatus::NeedsVersionUpdate
        };
        self.set_status(main.id, status);
    }

    async fn merge_step(&self, main: &GasCoinHandle) -> ProxyResult<bool> {
        let min = self.config.min_balance_per_instance_mist;
        let max = self.config.max_balance_per_instance_mist;

        let (mut merge_ids, mut gained) = {
            let state = self.lock_state();
            let mut ids = Vec::new();
            let mut gained = 0u64;
            for coin in state.children.values() {
                if coin.status == GasCoinStatus::Free && coin.is_out_of_band(min, max) {
                    ids.push(coin.id);
                    gained += coin.balance;
                }
            }
            (ids, gained)
        };
        let merged_children = merge_ids.len();

        let owned = fetch_all_coins(self.chain.as_ref(), &self.signer, SUI_COIN_TYPE).await?;
        {
            let state = self.lock_state();
            for coin in &owned {
                let id = coin.coin_object_id;
                if id != state.main.id && !state.children.contains_key(&id) {
                    merge_ids.push(id);
                    gained += coin.balance;
                }
            }
        }

        if merge_ids.is_empty() {
            return Ok(true);
        }
        if log_enabled!(Level::Info) {
            info!(
                "merging {} coins ({} from pool) into main {}",
                merge_ids.len(),
                merged_children,
                main.id
            );
        }

        // Children leaving the pool must not be served while the merge flies
        {
            let mut state = self.lock_state();
            for id in &merge_ids {
                if let Some(coin) = state.children.get_mut(id) {
                    coin.status = GasCoinStatus::InUse;
                }
            }
        }

        let mut inputs = vec![main.id];
        inputs.extend(merge_ids.iter().copied());
        let result = async {
            let tx = self
                .chain
                .build_pay_all_sui(
                    self.signer.address(),
                    inputs,
                    self.signer.address(),
                    self.config.gas_budget_mist,
                )
                .await?;
            self.signer.sign_and_execute(self.chain.as_ref(), &tx).await
        }
        .await;

        match result {
            Ok(response) => {
                {
                    let mut state = self.lock_state();
                    for id in &merge_ids {
                        state.children.shift_remove(id);
                    }
                }
                Ok(self.finish_main_tx(main.id, &response, gained as i128).await)
            }
            Err(e) => {
                // The merge never landed; the children remain valid
                let mut state = self.lock_state();
                for id in &merge_ids {
                    if let Some(coin) = state.children.get_mut(id) {
                        coin.status = GasCoinStatus::Free;
                    }
                }
                Err(e)
            }
        }
    }

    async fn split_step(&self, main: &GasCoinHandle) -> ProxyResult<bool> {
        let max = self.config.max_balance_per_instance_mist;
        let target = self.config.gas_coin_expected_count;
        let (missing, main_balance) = {
            let state = self.lock_state();
            (
                target.saturating_sub(state.children.len()),
                state.main.balance,
            )
        };
        if missing == 0 {
            return Ok(true);
        }

        let required = missing as u64 * max + self.config.gas_budget_mist;
        if main_balance < required {
            warn!(
                "main balance {} below the {} required to replenish {} children",
                main_balance, required, missing
            );
            return Ok(true);
        }
        if log_enabled!(Level::Info) {
            info!("splitting main {} into {} new children of {}", main.id, missing, max);
        }

        let wallet = self.signer.address();
        let tx = self
            .chain
            .build_pay_sui(
                wallet,
                vec![main.id],
                vec![wallet; missing],
                vec![max; missing],
                self.config.gas_budget_mist,
            )
            .await?;
        let response = self.signer.sign_and_execute(self.chain.as_ref(), &tx).await?;

        if let Some(effects) = response.effects.as_ref() {
            let mut state = self.lock_state();
            for created in &effects.created {
                let reference = &created.reference;
                state.children.insert(
                    reference.object_id,
                    GasCoin {
                        id: reference.object_id,
                        version: reference.version,
                        digest: reference.digest.clone(),
                        balance: max,
                        status: GasCoinStatus::Free,
                    },
                );
            }
        }

        let spent = missing as i128 * max as i128;
        Ok(self.finish_main_tx(main.id, &response, -spent).await)
    }
}

fn coin_balance_from_content(data: &ObjectData) -> Option<u64> {
    let balance = data.content.as_ref()?.get("fields")?.get("balance")?;
    match balance {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

pub(crate) async fn fetch_all_coins(
    chain: &dyn ChainClient,
    signer: &TxSigner,
    coin_type: &str,
) -> ProxyResult<Vec<Coin>> {
    let mut coins = Vec::new();
    let mut cursor = None;
    loop {
        let page = chain
            .get_coins(signer.address(), Some(coin_type), cursor)
            .await?;
        coins.extend(page.data);
        if page.has_next_page {
            cursor = page.next_cursor;
        } else {
            break;
        }
    }
    Ok(coins)
}
