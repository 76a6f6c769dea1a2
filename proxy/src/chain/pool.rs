use super::{ChainClient, MoveCall};
use crate::{config::RestEndpointConfig, error::ProxyError};
use async_trait::async_trait;
use dex_common::{
    api::sui::{
        string_u64, BalanceInfo, CoinPage, DynamicFieldName, EventFilter, EventId, EventPage,
        ObjectResponse, TransactionBlockBytes, TransactionBlockResponse,
        TransactionBlockResponseOptions,
    },
    crypto::{ObjectId, SuiAddress, TransactionDigest},
    rpc::{HttpJsonRpcClient, RpcResult},
    task::spawn_task,
};
use log::{debug, info, log_enabled, warn, Level};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::sleep};

// Endpoints managed by us are named with this prefix in the configuration
// and win ties during leader selection
const INTERNAL_ENDPOINT_PREFIX: &str = "internal_";

struct Endpoint {
    name: String,
    client: HttpJsonRpcClient,
    // Highest checkpoint sequence number this endpoint has reported
    last_seen_checkpoint: AtomicU64,
}

// Pool of fullnode RPC endpoints. All reads and writes are routed to the
// endpoint that has observed the highest checkpoint; a poller task keeps
// that choice current. A failed poll never demotes the current endpoint
// until a competitor strictly exceeds its sequence number.
pub struct RpcClientPool {
    endpoints: Vec<Endpoint>,
    current_idx: AtomicUsize,
    poll_interval: Duration,
}

impl RpcClientPool {
    pub fn new(
        configs: &[RestEndpointConfig],
        call_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, ProxyError> {
        if configs.is_empty() {
            return Err(ProxyError::Startup(
                "at least one REST endpoint must be configured".to_string(),
            ));
        }
        let endpoints = configs
            .iter()
            .map(|config| Endpoint {
                name: config.name.clone(),
                client: HttpJsonRpcClient::with_timeout(&config.url, call_timeout),
                last_seen_checkpoint: AtomicU64::new(0),
            })
            .collect();
        Ok(Self {
            endpoints,
            current_idx: AtomicUsize::new(0),
            poll_interval,
        })
    }

    pub fn current_name(&self) -> &str {
        &self.endpoints[self.current_idx.load(Ordering::Relaxed)].name
    }

    fn current(&self) -> &HttpJsonRpcClient {
        &self.endpoints[self.current_idx.load(Ordering::Relaxed)].client
    }

    // Query every endpoint for its latest checkpoint and re-elect the leader.
    // A failed poll keeps the endpoint's last observed value, so the current
    // leader is only demoted once a competitor strictly exceeds it.
    pub async fn poll_once(&self) {
        for endpoint in &self.endpoints {
            match endpoint
                .client
                .call::<CheckpointSequence>("sui_getLatestCheckpointSequenceNumber", vec![])
                .await
            {
                Ok(sequence) => {
                    endpoint
                        .last_seen_checkpoint
                        .store(sequence.0, Ordering::Relaxed);
                }
                Err(e) => {
                    if log_enabled!(Level::Warn) {
                        warn!("checkpoint poll failed for '{}': {}", endpoint.name, e);
                    }
                }
            }
        }
        self.elect_leader();
    }

    fn elect_leader(&self) {
        let current = self.current_idx.load(Ordering::Relaxed);
        let current_seq = self.endpoints[current]
            .last_seen_checkpoint
            .load(Ordering::Relaxed);

        let mut best = current;
        let mut best_seq = current_seq;
        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            let seq = endpoint.last_seen_checkpoint.load(Ordering::Relaxed);
            // Strict improvement, or an internal endpoint taking over a tie
            // held by an external one
            let wins = seq > best_seq
                || (seq == best_seq
                    && endpoint.name.starts_with(INTERNAL_ENDPOINT_PREFIX)
                    && !self.endpoints[best].name.starts_with(INTERNAL_ENDPOINT_PREFIX));
            if wins {
                best = idx;
                best_seq = seq;
            }
        }

        if best != current {
            if log_enabled!(Level::Info) {
                info!(
                    "leading RPC client changed: '{}' (checkpoint {}) -> '{}' (checkpoint {})",
                    self.endpoints[current].name, current_seq, self.endpoints[best].name, best_seq
                );
            }
            self.current_idx.store(best, Ordering::Relaxed);
        }
    }

    pub fn start_leader_tracking(self: &Arc<Self>) -> JoinHandle<()> {
        let zelf = Arc::clone(self);
        spawn_task("rpc-leader-tracking", async move {
            loop {
                zelf.poll_once().await;
                sleep(zelf.poll_interval).await;
            }
        })
    }
}

// The chain returns the checkpoint sequence as a decimal string
#[derive(Deserialize)]
struct CheckpointSequence(#[serde(with = "string_u64")] u64);

fn move_call_params(signer: SuiAddress, call: &MoveCall) -> Vec<Value> {
    vec![
        json!(signer),
        json!(call.package),
        json!(call.module),
        json!(call.function),
        json!(call.type_args),
        json!(call.args),
    ]
}

#[async_trait]
impl ChainClient for RpcClientPool {
    async fn get_coins(
        &self,
        owner: SuiAddress,
        coin_type: Option<&str>,
        cursor: Option<ObjectId>,
    ) -> RpcResult<CoinPage> {
        self.current()
            .call(
                "suix_getCoins",
                vec![json!(owner), json!(coin_type), json!(cursor), Value::Null],
            )
            .await
    }

    async fn get_all_balances(&self, owner: SuiAddress) -> RpcResult<Vec<BalanceInfo>> {
        self.current()
            .call("suix_getAllBalances", vec![json!(owner)])
            .await
    }

    async fn get_object(&self, id: ObjectId) -> RpcResult<ObjectResponse> {
        self.current()
            .call(
                "sui_getObject",
                vec![json!(id), json!({ "showContent": true })],
            )
            .await
    }

    async fn get_dynamic_field_object(
        &self,
        parent: ObjectId,
        name: DynamicFieldName,
    ) -> RpcResult<ObjectResponse> {
        self.current()
            .call(
                "suix_getDynamicFieldObject",
                vec![json!(parent), json!(name)],
            )
            .await
    }

    async fn get_latest_checkpoint(&self) -> RpcResult<u64> {
        let sequence: CheckpointSequence = self
            .current()
            .call("sui_getLatestCheckpointSequenceNumber", vec![])
            .await?;
        Ok(sequence.0)
    }

    async fn get_current_epoch(&self) -> RpcResult<u64> {
        #[derive(Deserialize)]
        struct SystemStateEpoch {
            #[serde(with = "string_u64")]
            epoch: u64,
        }
        let state: SystemStateEpoch = self
            .current()
            .call("suix_getLatestSuiSystemState", vec![])
            .await?;
        Ok(state.epoch)
    }

    async fn query_events(
        &self,
        filter: EventFilter,
        cursor: Option<EventId>,
        limit: Option<usize>,
        descending: bool,
    ) -> RpcResult<EventPage> {
        self.current()
            .call(
                "suix_queryEvents",
                vec![
                    json!(filter),
                    json!(cursor),
                    json!(limit),
                    json!(descending),
                ],
            )
            .await
    }

    async fn get_transaction_block(
        &self,
        digest: &TransactionDigest,
        options: TransactionBlockResponseOptions,
    ) -> RpcResult<TransactionBlockResponse> {
        self.current()
            .call("sui_getTransactionBlock", vec![json!(digest), json!(options)])
            .await
    }

    async fn build_move_call(
        &self,
        signer: SuiAddress,
        call: MoveCall,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        let mut params = move_call_params(signer, &call);
        params.push(json!(gas));
        params.push(json!(gas_budget.to_string()));
        self.current().call("unsafe_moveCall", params).await
    }

    async fn build_batch_move_calls(
        &self,
        signer: SuiAddress,
        calls: Vec<MoveCall>,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        let batched: Vec<Value> = calls
            .iter()
            .map(|call| {
                json!({
                    "moveCallRequestParams": {
                        "packageObjectId": call.package,
                        "module": call.module,
                        "function": call.function,
                        "typeArguments": call.type_args,
                        "arguments": call.args,
                    }
                })
            })
            .collect();
        self.current()
            .call(
                "unsafe_batchTransaction",
                vec![
                    json!(signer),
                    json!(batched),
                    json!(gas),
                    json!(gas_budget.to_string()),
                ],
            )
            .await
    }

    async fn build_pay_sui(
        &self,
        signer: SuiAddress,
        input_coins: Vec<ObjectId>,
        recipients: Vec<SuiAddress>,
        amounts: Vec<u64>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        let amounts: Vec<String> = amounts.iter().map(|a| a.to_string()).collect();
        self.current()
            .call(
                "unsafe_paySui",
                vec![
                    json!(signer),
                    json!(input_coins),
                    json!(recipients),
                    json!(amounts),
                    json!(gas_budget.to_string()),
                ],
            )
            .await
    }

    async fn build_pay_all_sui(
        &self,
        signer: SuiAddress,
        input_coins: Vec<ObjectId>,
        recipient: SuiAddress,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        self.current()
            .call(
                "unsafe_payAllSui",
                vec![
                    json!(signer),
                    json!(input_coins),
                    json!(recipient),
                    json!(gas_budget.to_string()),
                ],
            )
            .await
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
        let amounts: Vec<String> = amounts.iter().map(|a| a.to_string()).collect();
        self.current()
            .call(
                "unsafe_pay",
                vec![
                    json!(signer),
                    json!(input_coins),
                    json!(recipients),
                    json!(amounts),
                    json!(gas),
                    json!(gas_budget.to_string()),
                ],
            )
            .await
    }

    async fn build_transfer_object(
        &self,
        signer: SuiAddress,
        object: ObjectId,
        recipient: SuiAddress,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes> {
        self.current()
            .call(
                "unsafe_transferObject",
                vec![
                    json!(signer),
                    json!(object),
                    json!(gas),
                    json!(gas_budget.to_string()),
                    json!(recipient),
                ],
            )
            .await
    }

    async fn execute_transaction_block(
        &self,
        tx_bytes: &str,
        signature: &str,
        options: TransactionBlockResponseOptions,
    ) -> RpcResult<TransactionBlockResponse> {
        if log_enabled!(Level::Debug) {
            debug!("submitting transaction via '{}'", self.current_name());
        }
        self.current()
            .call(
                "sui_executeTransactionBlock",
                vec![
                    json!(tx_bytes),
                    json!([signature]),
                    json!(options),
                    json!("WaitForLocalExecution"),
                ],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(names: &[&str]) -> RpcClientPool {
        let configs: Vec<RestEndpointConfig> = names
            .iter()
            .map(|name| RestEndpointConfig {
                name: name.to_string(),
                url: format!("http://127.0.0.1:1/{}", name),
            })
            .collect();
        RpcClientPool::new(&configs, Duration::from_secs(1), Duration::from_secs(1)).unwrap()
    }

    fn store(pool: &RpcClientPool, checkpoints: &[u64]) {
        for (endpoint, checkpoint) in pool.endpoints.iter().zip(checkpoints) {
            endpoint
                .last_seen_checkpoint
                .store(*checkpoint, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_empty_endpoint_list_is_a_startup_error() {
        assert!(RpcClientPool::new(&[], Duration::from_secs(1), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_highest_checkpoint_wins() {
        let pool = pool(&["a", "b", "c"]);
        store(&pool, &[10, 30, 20]);
        pool.elect_leader();
        assert_eq!(pool.current_name(), "b");
    }

    #[test]
    fn test_current_keeps_leadership_on_tie() {
        let pool = pool(&["a", "b"]);
        store(&pool, &[10, 10]);
        pool.elect_leader();
        assert_eq!(pool.current_name(), "a");
    }

    #[test]
    fn test_internal_endpoint_wins_tie_against_external() {
        let pool = pool(&["external", "internal_main"]);
        store(&pool, &[10, 10]);
        pool.elect_leader();
        assert_eq!(pool.current_name(), "internal_main");
    }

    #[test]
    fn test_failed_poll_does_not_demote_without_strict_overtake() {
        let pool = pool(&["a", "b"]);
        store(&pool, &[30, 20]);
        pool.elect_leader();
        assert_eq!(pool.current_name(), "a");

        // "a" stops answering; its stored checkpoint stays at 30 and "b"
        // catching up to 30 is not enough
        store(&pool, &[30, 30]);
        pool.elect_leader();
        assert_eq!(pool.current_name(), "a");

        store(&pool, &[30, 31]);
        pool.elect_leader();
        assert_eq!(pool.current_name(), "b");
    }
}
