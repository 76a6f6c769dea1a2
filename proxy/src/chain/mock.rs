// Scripted in-memory chain used by unit tests. The unsafe_* builders encode
// the requested operation as JSON into `tx_bytes`; execute decodes it and
// applies the coin mutations, so the pool/executor code under test runs the
// same build -> sign -> submit -> reconcile path as production.

use super::{ChainClient, MoveCall};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use dex_common::{
    api::sui::{
        BalanceInfo, Coin, CoinPage, DynamicFieldName, EventFilter, EventId, EventPage,
        ExecutionStatus, ExecutionStatusKind, GasCostSummary, ObjectData, ObjectResponse,
        OwnedObjectRef, SequenceNumber, SuiEvent, SuiObjectRef, TransactionBlockBytes,
        TransactionBlockResponse, TransactionBlockResponseOptions, SUI_COIN_TYPE,
    },
    crypto::{Digest, ObjectId, SuiAddress, TransactionDigest},
    rpc::{RpcError, RpcResult},
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
    sync::Mutex,
};

const COINS_PAGE_SIZE: usize = 5;

#[derive(Debug, Clone)]
struct MockCoin {
    coin_type: String,
    version: SequenceNumber,
    balance: u64,
}

#[derive(Default)]
struct MockState {
    coins: IndexMap<ObjectId, MockCoin>,
    epoch: u64,
    checkpoint: u64,
    // Gas charged per executed transaction
    computation_cost: u64,
    // Coins whose effects report a stale (non-advanced) gas object version
    version_drift: HashSet<ObjectId>,
    // Remaining number of failing reads per object
    read_failures: IndexMap<ObjectId, usize>,
    // Error message injected into the next execute call
    next_execute_error: Option<String>,
    // Move-abort style failure injected into the next execute call
    next_execution_failure: Option<String>,
    // Events attached to the next successful execute response
    next_response_events: Vec<SuiEvent>,
    // Stored events served by query_events
    event_log: Vec<SuiEvent>,
    executed: Vec<Value>,
}

pub struct MockChain {
    state: Mutex<MockState>,
    next_id: AtomicU64,
    next_version: AtomicU64,
    next_digest: AtomicU64,
}

fn lock_state(state: &Mutex<MockState>) -> std::sync::MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.computation_cost = 1_000_000;
        Self {
            state: Mutex::new(state),
            next_id: AtomicU64::new(1),
            next_version: AtomicU64::new(100),
            next_digest: AtomicU64::new(1),
        }
    }

    fn fresh_id(&self) -> ObjectId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        bytes[0] = 0xCC;
        ObjectId::new(bytes)
    }

    fn fresh_version(&self) -> SequenceNumber {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    fn fresh_digest(&self) -> Digest {
        Digest::new(format!(
            "MockDigest{}",
            self.next_digest.fetch_add(1, Ordering::Relaxed)
        ))
    }

    // ---- scripting helpers ----

    pub fn add_sui_coin(&self, balance: u64) -> ObjectId {
        self.add_coin(SUI_COIN_TYPE, balance)
    }

    pub fn add_coin(&self, coin_type: &str, balance: u64) -> ObjectId {
        let id = self.fresh_id();
        let version = self.fresh_version();
        lock_state(&self.state).coins.insert(
            id,
            MockCoin {
                coin_type: coin_type.to_string(),
                version,
                balance,
            },
        );
        id
    }

    pub fn coin_balance(&self, id: ObjectId) -> Option<u64> {
        lock_state(&self.state).coins.get(&id).map(|c| c.balance)
    }

    pub fn coin_version(&self, id: ObjectId) -> Option<SequenceNumber> {
        lock_state(&self.state).coins.get(&id).map(|c| c.version)
    }

    pub fn coin_count(&self) -> usize {
        lock_state(&self.state).coins.len()
    }

    pub fn set_epoch(&self, epoch: u64) {
        lock_state(&self.state).epoch = epoch;
    }

    pub fn set_checkpoint(&self, checkpoint: u64) {
        lock_state(&self.state).checkpoint = checkpoint;
    }

    pub fn set_computation_cost(&self, cost: u64) {
        lock_state(&self.state).computation_cost = cost;
    }

    // Make the next effects for this gas coin report a non-advanced version
    pub fn hold_back_version(&self, id: ObjectId) {
        lock_state(&self.state).version_drift.insert(id);
    }

    pub fn fail_reads(&self, id: ObjectId, times: usize) {
        lock_state(&self.state).read_failures.insert(id, times);
    }

    pub fn fail_next_execute(&self, message: &str) {
        lock_state(&self.state).next_execute_error = Some(message.to_string());
    }

    pub fn fail_next_execution_on_chain(&self, message: &str) {
        lock_state(&self.state).next_execution_failure = Some(message.to_string());
    }

    pub fn push_response_events(&self, events: Vec<SuiEvent>) {
        lock_state(&self.state).next_response_events = events;
    }

    pub fn push_event_log(&self, event: SuiEvent) {
        lock_state(&self.state).event_log.push(event);
    }

    pub fn executed_transactions(&self) -> Vec<Value> {
        lock_state(&self.state).executed.clone()
    }

    fn build(&self, payload: Value) -> TransactionBlockBytes {
        TransactionBlockBytes {
            tx_bytes: BASE64.encode(payload.to_string()),
            gas: Vec::new(),
        }
    }

    fn object_ref(id: ObjectId, coin: &MockCoin) -> SuiObjectRef {
        SuiObjectRef {
            object_id: id,
            version: coin.version,
            digest: Digest::new(format!("MockObj{}v{}", id, coin.version)),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_coins(
        &self,
        _owner: SuiAddress,
        coin_type: Option<&str>,
        cursor: Option<ObjectId>,
    ) -> RpcResult<CoinPage> {
        let state = lock_state(&self.state);
        let wanted = coin_type.unwrap_or(SUI_COIN_TYPE);
        let all: Vec<(ObjectId, &MockCoin)> = state
            .coins
            .iter()
            .filter(|(_, coin)| coin.coin_type == wanted)
            .map(|(id, coin)| (*id, coin))
            .collect();
        let start = match cursor {
            Some(cursor) => all
                .iter()
                .position(|(id, _)| *id == cursor)
                .map(|p| p + 1)
                .unwrap_or(all.len()),
            None => 0,
        };
        let page: Vec<Coin> = all
            .iter()
            .skip(start)
            .take(COINS_PAGE_SIZE)
            .map(|(id, coin)| Coin {
                coin_type: coin.coin_type.clone(),
                coin_object_id: *id,
                version: coin.version,
                digest: Digest::new(format!("MockObj{}v{}", id, coin.version)),
                balance: coin.balance,
            })
            .collect();
        let has_next_page = start + page.len() < all.len();
        let next_cursor = page.last().map(|coin| coin.coin_object_id);
        Ok(CoinPage {
            data: page,
            next_cursor,
            has_next_page,
        })
    }

    async fn get_all_balances(&self, _owner: SuiAddress) -> RpcResult<Vec<BalanceInfo>> {
        let state = lock_state(&self.state);
        let mut totals: IndexMap<String, (usize, u64)> = IndexMap::new();
        for coin in state.coins.values() {
            let entry = totals.entry(coin.coin_type.clone()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += coin.balance;
        }
        Ok(totals
            .into_iter()
            .map(|(coin_type, (count, total))| BalanceInfo {
                coin_type,
                coin_object_count: count,
                total_balance: total,
            })
            .collect())
    }

    async fn get_object(&self, id: ObjectId) -> RpcResult<ObjectResponse> {
        let mut state = lock_state(&self.state);
        if let Some(remaining) = state.read_failures.get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RpcError::Server {
                    code: -32000,
                    message: "mock read failure".to_string(),
                });
            }
        }
        match state.coins.get(&id) {
            Some(coin) => Ok(ObjectResponse {
                data: Some(ObjectData {
                    object_id: id,
                    version: coin.version,
                    digest: Digest::new(format!("MockObj{}v{}", id, coin.version)),
                    content: Some(json!({
                        "dataType": "moveObject",
                        "type": format!("0x2::coin::Coin<{}>", coin.coin_type),
                        "fields": { "balance": coin.balance.to_string() }
                    })),
                }),
                error: None,
            }),
            None => Ok(ObjectResponse {
                data: None,
                error: Some(json!({ "code": "notExists" })),
            }),
        }
    }

    async fn get_dynamic_field_object(
        &self,
        _parent: ObjectId,
        _name: DynamicFieldName,
    ) -> RpcResult<ObjectResponse> {
        Ok(ObjectResponse {
            data: None,
            error: Some(json!({ "code": "dynamicFieldNotFound" })),
        })
    }

    async fn get_latest_checkpoint(&self) -> RpcResult<u64> {
        Ok(lock_state(&self.state).checkpoint)
    }

    async fn get_current_epoch(&self) -> RpcResult<u64> {
        Ok(lock_state(&self.state).epoch)
    }

    async fn query_events(
        &self,
        _filter: EventFilter,
        _cursor: Option<EventId>,
        _limit: Option<usize>,
        _descending: bool,
    ) -> RpcResult<EventPage> {
        let state = lock_state(&self.state);
        Ok(EventPage {
            data: state.event_log.clone(),
            next_cursor: None,
            has_next_page: false,
        })
    }

    async fn get_transaction_block(
        &self,
        digest: &TransactionDigest,
        _options: TransactionBlockResponseOptions,
    ) -> RpcResult<TransactionBlockResponse> {
        let state = lock_state(&self.state);
        let events: Vec<SuiEvent> = state
            .event_log
            .iter()
            .filter(|event| &event.id.tx_digest == digest)
            .cloned()
            .collect();
        Ok(TransactionBlockResponse {
            digest: digest.clone(),
            effects: None,
            events,
            confirmed_local_execution: Some(true),
            timestamp_ms: None,
        })
    }

    async fn build_move_call(
        &self,
        signer: SuiAddress,
        call: MoveCall,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        Ok(self.build(json!({
            "kind": "moveCall",
            "signer": signer,
            "module": call.module,
            "function": call.function,
            "args": call.args,
            "gas": gas,
            "gasBudget": gas_budget,
        })))
    }

    async fn build_batch_move_calls(
        &self,
        signer: SuiAddress,
        calls: Vec<MoveCall>,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        let calls: Vec<Value> = calls
            .iter()
            .map(|call| json!({ "module": call.module, "function": call.function }))
            .collect();
        Ok(self.build(json!({
            "kind": "batch",
            "signer": signer,
            "calls": calls,
            "gas": gas,
            "gasBudget": gas_budget,
        })))
    }

    async fn build_pay_sui(
        &self,
        signer: SuiAddress,
        input_coins: Vec<ObjectId>,
        recipients: Vec<SuiAddress>,
        amounts: Vec<u64>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        Ok(self.build(json!({
            "kind": "paySui",
            "signer": signer,
            "inputs": input_coins,
            "recipients": recipients,
            "amounts": amounts,
            "gasBudget": gas_budget,
        })))
    }

    async fn build_pay_all_sui(
        &self,
        signer: SuiAddress,
        input_coins: Vec<ObjectId>,
        recipient: SuiAddress,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        Ok(self.build(json!({
            "kind": "payAllSui",
            "signer": signer,
            "inputs": input_coins,
            "recipient": recipient,
            "gasBudget": gas_budget,
        })))
    }

    async fn build_pay(
        &self,
        signer: SuiAddress,
        input_coins: Vec<ObjectId>,
        recipients: Vec<SuiAddress>,
        amounts: Vec<u64>,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        Ok(self.build(json!({
            "kind": "pay",
            "signer": signer,
            "inputs": input_coins,
            "recipients": recipients,
            "amounts": amounts,
            "gas": gas,
            "gasBudget": gas_budget,
        })))
    }

    async fn build_transfer_object(
        &self,
        signer: SuiAddress,
        object: ObjectId,
        recipient: SuiAddress,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        Ok(self.build(json!({
            "kind": "transferObject",
            "signer": signer,
            "object": object,
            "recipient": recipient,
            "gas": gas,
            "gasBudget": gas_budget,
        })))
    }

    async fn execute_transaction_block(
        &self,
        tx_bytes: &str,
        _signature: &str,
        _options: TransactionBlockResponseOptions,
    ) -> RpcResult<TransactionBlockResponse> {
        let decoded = BASE64
            .decode(tx_bytes)
            .map_err(|_| RpcError::MissingResult)?;
        let payload: Value =
            serde_json::from_slice(&decoded).map_err(RpcError::UnexpectedResponse)?;

        let digest = self.fresh_digest();
        let new_version = self.fresh_version();
        let mut state = lock_state(&self.state);

        if let Some(message) = state.next_execute_error.take() {
            return Err(RpcError::Server {
                code: -32000,
                message,
            });
        }

        state.executed.push(payload.clone());
        let computation_cost = state.computation_cost;
        let gas_used = GasCostSummary {
            computation_cost,
            storage_cost: 0,
            storage_rebate: 0,
            non_refundable_storage_fee: 0,
        };
        let executed_epoch = state.epoch;
        let failure = state.next_execution_failure.take();
        let events = std::mem::take(&mut state.next_response_events);

        let kind = payload["kind"].as_str().unwrap_or_default().to_string();
        let mut created: Vec<OwnedObjectRef> = Vec::new();

        // The coin paying for gas: explicit gas field, else first input
        let gas_coin_id: ObjectId = payload
            .get("gas")
            .and_then(|gas| serde_json::from_value(gas.clone()).ok())
            .or_else(|| {
                payload
                    .get("inputs")
                    .and_then(|inputs| inputs.get(0))
                    .and_then(|input| serde_json::from_value(input.clone()).ok())
            })
            .ok_or(RpcError::MissingResult)?;
        let prior_gas_version = state.coins.get(&gas_coin_id).map(|coin| coin.version);

        if failure.is_none() {
            match kind.as_str() {
                "payAllSui" => {
                    let inputs: Vec<ObjectId> =
                        serde_json::from_value(payload["inputs"].clone())?;
                    let mut total = 0u64;
                    for input in &inputs {
                        if let Some(coin) = state.coins.get(input) {
                            total += coin.balance;
                        }
                    }
                    for input in inputs.iter().skip(1) {
                        state.coins.shift_remove(input);
                    }
                    if let Some(primary) = state.coins.get_mut(&inputs[0]) {
                        primary.balance = total.saturating_sub(computation_cost);
                        primary.version = new_version;
                    }
                }
                "paySui" => {
                    let inputs: Vec<ObjectId> =
                        serde_json::from_value(payload["inputs"].clone())?;
                    let amounts: Vec<u64> = serde_json::from_value(payload["amounts"].clone())?;
                    let spent: u64 = amounts.iter().sum();
                    if let Some(primary) = state.coins.get_mut(&inputs[0]) {
                        primary.balance =
                            primary.balance.saturating_sub(spent + computation_cost);
                        primary.version = new_version;
                    }
                    for amount in amounts {
                        let id = {
                            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
                            let mut bytes = [0u8; 32];
                            bytes[24..].copy_from_slice(&n.to_be_bytes());
                            bytes[0] = 0xCC;
                            ObjectId::new(bytes)
                        };
                        let coin = MockCoin {
                            coin_type: SUI_COIN_TYPE.to_string(),
                            version: new_version,
                            balance: amount,
                        };
                        created.push(OwnedObjectRef {
                            reference: MockChain::object_ref(id, &coin),
                            owner: None,
                        });
                        state.coins.insert(id, coin);
                    }
                }
                "pay" => {
                    let inputs: Vec<ObjectId> =
                        serde_json::from_value(payload["inputs"].clone())?;
                    let amounts: Vec<u64> = serde_json::from_value(payload["amounts"].clone())?;
                    let spent: u64 = amounts.iter().sum();
                    let coin_type = inputs
                        .first()
                        .and_then(|input| state.coins.get(input))
                        .map(|coin| coin.coin_type.clone())
                        .unwrap_or_else(|| SUI_COIN_TYPE.to_string());
                    if let Some(primary) = state.coins.get_mut(&inputs[0]) {
                        primary.balance = primary.balance.saturating_sub(spent);
                        primary.version = new_version;
                    }
                    for amount in amounts {
                        let id = {
                            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
                            let mut bytes = [0u8; 32];
                            bytes[24..].copy_from_slice(&n.to_be_bytes());
                            bytes[0] = 0xCC;
                            ObjectId::new(bytes)
                        };
                        let coin = MockCoin {
                            coin_type: coin_type.clone(),
                            version: new_version,
                            balance: amount,
                        };
                        created.push(OwnedObjectRef {
                            reference: MockChain::object_ref(id, &coin),
                            owner: None,
                        });
                        state.coins.insert(id, coin);
                    }
                    // gas comes from the separate gas coin
                    if let Some(coin) = state.coins.get_mut(&gas_coin_id) {
                        coin.balance = coin.balance.saturating_sub(computation_cost);
                        coin.version = new_version;
                    }
                }
                // moveCall / batch / transferObject only charge gas here
                _ => {
                    if let Some(coin) = state.coins.get_mut(&gas_coin_id) {
                        coin.balance = coin.balance.saturating_sub(computation_cost);
                        coin.version = new_version;
                    }
                }
            }
        } else if let Some(coin) = state.coins.get_mut(&gas_coin_id) {
            // Aborted transactions still charge gas and bump the version
            coin.balance = coin.balance.saturating_sub(computation_cost);
            coin.version = new_version;
        }

        // Effects report the post-execution gas object, unless drift is scripted
        let gas_ref = match state.coins.get(&gas_coin_id) {
            Some(coin) => {
                let mut reference = MockChain::object_ref(gas_coin_id, coin);
                if state.version_drift.remove(&gas_coin_id) {
                    // Report the pre-execution version so trackers see no advance
                    reference.version = prior_gas_version.unwrap_or(reference.version);
                }
                reference
            }
            None => SuiObjectRef {
                object_id: gas_coin_id,
                version: new_version,
                digest: self.fresh_digest(),
            },
        };

        let status = match failure {
            Some(error) => ExecutionStatus {
                status: ExecutionStatusKind::Failure,
                error: Some(error),
            },
            None => ExecutionStatus {
                status: ExecutionStatusKind::Success,
                error: None,
            },
        };

        Ok(TransactionBlockResponse {
            digest,
            effects: Some(dex_common::api::sui::TransactionEffects {
                status,
                gas_used,
                gas_object: OwnedObjectRef {
                    reference: gas_ref,
                    owner: None,
                },
                executed_epoch,
                created,
                mutated: Vec::new(),
            }),
            events,
            confirmed_local_execution: Some(true),
            timestamp_ms: None,
        })
    }
}
