// Concurrent dispatch of exchange-side transactions. Each execution pairs
// one free account cap with one free gas coin, materialises the caller's
// recipe into transaction bytes, signs, submits, and reconciles both pooled
// objects on every exit path.

use crate::{
    account::AccountCapPool,
    chain::{ChainClient, TxSigner},
    deepbook::{refine_execution_error, ExchangeVersion},
    error::{ProxyError, ProxyResult},
    gas::{GasCoinManager, ReleaseOutcome},
};
use dex_common::{
    api::sui::{TransactionBlockBytes, TransactionBlockResponse},
    crypto::ObjectId,
};
use log::{debug, log_enabled, trace, Level};
use std::{future::Future, sync::Arc};

pub struct Executor {
    chain: Arc<dyn ChainClient>,
    signer: Arc<TxSigner>,
    gas: Arc<GasCoinManager>,
    caps: Arc<AccountCapPool>,
    version: ExchangeVersion,
    gas_budget: u64,
    log_responses: bool,
}

impl Executor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signer: Arc<TxSigner>,
        gas: Arc<GasCoinManager>,
        caps: Arc<AccountCapPool>,
        version: ExchangeVersion,
        gas_budget: u64,
        log_responses: bool,
    ) -> Self {
        Self {
            chain,
            signer,
            gas,
            caps,
            version,
            gas_budget,
            log_responses,
        }
    }

    pub fn gas_budget(&self) -> u64 {
        self.gas_budget
    }

    pub fn signer(&self) -> &Arc<TxSigner> {
        &self.signer
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    // The recipe receives (account_cap, gas_coin) object ids and yields a
    // fully built transaction; gas payment and budget were already attached
    // by the builder. `batch_client_order_ids` lets a Move abort in a bulk
    // insert name the offending order.
    pub async fn execute<F, Fut>(
        &self,
        request_id: &str,
        recipe: F,
        batch_client_order_ids: Option<&[String]>,
    ) -> ProxyResult<TransactionBlockResponse>
    where
        F: FnOnce(ObjectId, ObjectId) -> Fut,
        Fut: Future<Output = ProxyResult<TransactionBlockBytes>>,
    {
        trace!("execute request {}", request_id);
        let cap = self.caps.get_free_account_cap()?;
        let coin = match self.gas.get_free_gas_coin() {
            Ok(coin) => coin,
            Err(e) => {
                cap.release();
                return Err(e);
            }
        };
        if log_enabled!(Level::Debug) {
            debug!(
                "request {} using account cap {} and gas coin {}",
                request_id,
                cap.id(),
                coin.id()
            );
        }

        let tx = match recipe(cap.id(), coin.id()).await {
            Ok(tx) => tx,
            Err(e) => {
                // Nothing was submitted; both objects are untouched
                coin.release(ReleaseOutcome::Untouched).await;
                cap.release();
                return Err(e);
            }
        };

        match self.signer.sign_and_execute_raw(self.chain.as_ref(), &tx).await {
            Ok(response) => {
                // Gas was charged and the version advanced even on an abort
                coin.release(ReleaseOutcome::success(&response)).await;
                cap.release();
                if self.log_responses {
                    if let Ok(body) = serde_json::to_string(&response) {
                        debug!("request {} response: {}", request_id, body);
                    }
                }
                match response.execution_error() {
                    Some(error) if TxSigner::is_insufficient_gas(error) => {
                        Err(ProxyError::InsufficientGas(error.to_string()))
                    }
                    Some(error) => Err(refine_execution_error(
                        self.version,
                        error,
                        batch_client_order_ids,
                    )),
                    None => Ok(response),
                }
            }
            Err(e) if e.is_finality_timeout() => {
                // The chain may still apply this transaction later in the
                // epoch; neither object is safe to reuse until it rolls over
                coin.release(ReleaseOutcome::FinalityTimeout).await;
                cap.release_skip_epoch();
                Err(e)
            }
            Err(e) => {
                coin.release(ReleaseOutcome::Unknown).await;
                cap.release();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountCapStatus;
    use crate::chain::{mock::MockChain, MoveCall};
    use crate::config::GasManagerConfig;
    use crate::error::FINALITY_TIMEOUT_MARKER;
    use crate::gas::GasCoinStatus;
    use dex_common::crypto::KeyPair;

    const MAX: u64 = 1_000_000_000;
    const BUDGET: u64 = 50_000_000;

    fn cap_id(n: u8) -> ObjectId {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAC;
        bytes[31] = n;
        ObjectId::new(bytes)
    }

    async fn harness() -> (Arc<MockChain>, Executor, Arc<GasCoinManager>, Arc<AccountCapPool>) {
        let chain = Arc::new(MockChain::new());
        chain.add_sui_coin(100 * MAX);
        let signer = Arc::new(TxSigner::new(KeyPair::generate()));
        let gas = GasCoinManager::start(
            Arc::clone(&chain) as Arc<dyn ChainClient>,
            Arc::clone(&signer),
            GasManagerConfig {
                max_balance_per_instance_mist: MAX,
                min_balance_per_instance_mist: MAX / 10,
                sync_interval_s: 1,
                gas_budget_mist: BUDGET,
                gas_coin_expected_count: 2,
            },
        )
        .await
        .unwrap();
        let caps = AccountCapPool::new(vec![cap_id(1), cap_id(2)]).unwrap();
        let executor = Executor::new(
            Arc::clone(&chain) as Arc<dyn ChainClient>,
            signer,
            Arc::clone(&gas),
            Arc::clone(&caps),
            ExchangeVersion::V2,
            BUDGET,
            false,
        );
        (chain, executor, gas, caps)
    }

    fn order_call() -> MoveCall {
        MoveCall {
            package: ObjectId::zero(),
            module: "clob_v2",
            function: "place_limit_order",
            type_args: vec![],
            args: vec![],
        }
    }

    #[tokio::test]
    async fn test_execute_success_releases_resources() {
        let (chain, executor, gas, caps) = harness().await;
        let signer_address = executor.signer().address();
        let chain_ref = Arc::clone(executor.chain());

        let response = executor
            .execute(
                "req-1",
                |cap, coin| {
                    let chain = Arc::clone(&chain_ref);
                    async move {
                        assert_ne!(cap, coin);
                        Ok(chain
                            .build_move_call(signer_address, order_call(), Some(coin), BUDGET)
                            .await?)
                    }
                },
                None,
            )
            .await
            .unwrap();

        assert!(response.effects.unwrap().status.is_ok());
        assert_eq!(gas.free_child_count(), 2);
        assert_eq!(caps.status_of(cap_id(1)), Some(AccountCapStatus::Free));
        assert_eq!(chain.executed_transactions().len(), 2); // split + order
    }

    #[tokio::test]
    async fn test_recipe_failure_frees_untouched_resources() {
        let (chain, executor, gas, _caps) = harness().await;
        let before = chain.executed_transactions().len();

        let result = executor
            .execute(
                "req-2",
                |_cap, _coin| async move {
                    Err::<TransactionBlockBytes, _>(ProxyError::BadRequest("bad".to_string()))
                },
                None,
            )
            .await;

        assert!(matches!(result, Err(ProxyError::BadRequest(_))));
        assert_eq!(chain.executed_transactions().len(), before);
        assert_eq!(gas.free_child_count(), 2);
    }

    #[tokio::test]
    async fn test_move_abort_is_refined_and_coin_stays_usable() {
        let (chain, executor, gas, _caps) = harness().await;
        chain.fail_next_execution_on_chain(
            r#"MoveAbort(MoveLocation { module: ModuleId { address: dee9, name: Identifier("clob_v2") }, function: 22, instruction: 45, function_name: Some("place_limit_order") }, 7) in command 0"#,
        );
        let signer_address = executor.signer().address();
        let chain_ref = Arc::clone(executor.chain());

        let result = executor
            .execute(
                "req-3",
                |_cap, coin| {
                    let chain = Arc::clone(&chain_ref);
                    async move {
                        Ok(chain
                            .build_move_call(signer_address, order_call(), Some(coin), BUDGET)
                            .await?)
                    }
                },
                None,
            )
            .await;

        match result {
            Err(ProxyError::OnChainAbort { name, .. }) => {
                assert_eq!(name, "INSUFFICIENT_BASE_COIN");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // The abort still charged gas; the coin returned Free with the new version
        assert_eq!(gas.free_child_count(), 2);
    }

    #[tokio::test]
    async fn test_finality_timeout_poisons_both_resources() {
        let (chain, executor, gas, caps) = harness().await;
        chain.fail_next_execute(FINALITY_TIMEOUT_MARKER);
        let signer_address = executor.signer().address();
        let chain_ref = Arc::clone(executor.chain());

        let result = executor
            .execute(
                "req-4",
                |_cap, coin| {
                    let chain = Arc::clone(&chain_ref);
                    async move {
                        Ok(chain
                            .build_move_call(signer_address, order_call(), Some(coin), BUDGET)
                            .await?)
                    }
                },
                None,
            )
            .await;

        assert!(matches!(result, Err(ProxyError::FinalityTimeout)));
        // Exactly one coin and one cap are poisoned
        let poisoned_coins = gas
            .child_ids()
            .into_iter()
            .filter(|id| gas.coin_status(*id) == Some(GasCoinStatus::SkipForRemainderOfEpoch))
            .count();
        assert_eq!(poisoned_coins, 1);
        let poisoned_caps = [cap_id(1), cap_id(2)]
            .into_iter()
            .filter(|id| caps.status_of(*id) == Some(AccountCapStatus::SkipForRemainderOfEpoch))
            .count();
        assert_eq!(poisoned_caps, 1);
    }

    #[tokio::test]
    async fn test_transient_error_releases_after_reread() {
        let (chain, executor, gas, caps) = harness().await;
        chain.fail_next_execute("connection reset by peer");
        let signer_address = executor.signer().address();
        let chain_ref = Arc::clone(executor.chain());

        let result = executor
            .execute(
                "req-5",
                |_cap, coin| {
                    let chain = Arc::clone(&chain_ref);
                    async move {
                        Ok(chain
                            .build_move_call(signer_address, order_call(), Some(coin), BUDGET)
                            .await?)
                    }
                },
                None,
            )
            .await;

        assert!(matches!(result, Err(ProxyError::Rpc(_))));
        assert_eq!(gas.free_child_count(), 2);
        assert_eq!(caps.status_of(cap_id(1)), Some(AccountCapStatus::Free));
    }

    #[tokio::test]
    async fn test_concurrent_exhaustion_of_gas_pool() {
        let (_chain, executor, gas, _caps) = harness().await;
        // Hold both children outside the executor
        let g1 = gas.get_free_gas_coin().unwrap();
        let g2 = gas.get_free_gas_coin().unwrap();

        let result = executor
            .execute(
                "req-6",
                |_cap, _coin| async move {
                    // must not run without resources
                    Err::<TransactionBlockBytes, _>(ProxyError::BadRequest(
                        "recipe ran without resources".to_string(),
                    ))
                },
                None,
            )
            .await;
        assert!(matches!(result, Err(ProxyError::PoolExhausted(_))));

        g1.release(crate::gas::ReleaseOutcome::Untouched).await;
        g2.release(crate::gas::ReleaseOutcome::Untouched).await;
    }
}
