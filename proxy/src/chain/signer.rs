use super::ChainClient;
use crate::error::{ProxyError, ProxyResult, FINALITY_TIMEOUT_MARKER};
use dex_common::{
    api::sui::{TransactionBlockBytes, TransactionBlockResponse, TransactionBlockResponseOptions},
    crypto::{KeyPair, SuiAddress},
    rpc::RpcError,
};
use log::{debug, log_enabled, Level};

const INSUFFICIENT_GAS_MARKER: &str = "InsufficientGas";

// Owns the process keypair and drives sign-and-submit for every component
// that sends transactions (executor, gas manager, treasury handlers)
pub struct TxSigner {
    keypair: KeyPair,
    address: SuiAddress,
}

impl TxSigner {
    pub fn new(keypair: KeyPair) -> Self {
        let address = keypair.address();
        Self { keypair, address }
    }

    pub fn address(&self) -> SuiAddress {
        self.address
    }

    pub fn sign(&self, tx_bytes: &str) -> ProxyResult<String> {
        Ok(self.keypair.sign_transaction(tx_bytes)?)
    }

    // Sign and submit, waiting for local execution. Classifies the
    // transport-level outcomes every caller must distinguish. The response
    // is returned even when the transaction aborted on chain: gas was still
    // charged and the gas object version advanced, so callers need the
    // effects either way.
    pub async fn sign_and_execute_raw(
        &self,
        chain: &dyn ChainClient,
        tx: &TransactionBlockBytes,
    ) -> ProxyResult<TransactionBlockResponse> {
        let signature = self.sign(&tx.tx_bytes)?;
        let response = chain
            .execute_transaction_block(
                &tx.tx_bytes,
                &signature,
                TransactionBlockResponseOptions::effects_and_events(),
            )
            .await
            .map_err(classify_rpc_error)?;

        if log_enabled!(Level::Debug) {
            debug!("executed transaction {}", response.digest);
        }
        Ok(response)
    }

    // Variant that turns an on-chain failure into an error; Move aborts are
    // left in `Execution` for the exchange layer to refine
    pub async fn sign_and_execute(
        &self,
        chain: &dyn ChainClient,
        tx: &TransactionBlockBytes,
    ) -> ProxyResult<TransactionBlockResponse> {
        let response = self.sign_and_execute_raw(chain, tx).await?;
        if let Some(error) = response.execution_error() {
            if error.contains(INSUFFICIENT_GAS_MARKER) {
                return Err(ProxyError::InsufficientGas(error.to_string()));
            }
            return Err(ProxyError::Execution(error.to_string()));
        }
        Ok(response)
    }

    pub(crate) fn is_insufficient_gas(error: &str) -> bool {
        error.contains(INSUFFICIENT_GAS_MARKER)
    }
}

fn classify_rpc_error(error: RpcError) -> ProxyError {
    if let RpcError::Server { message, .. } = &error {
        if message.contains(FINALITY_TIMEOUT_MARKER) {
            return ProxyError::FinalityTimeout;
        }
        if message.contains(INSUFFICIENT_GAS_MARKER) {
            return ProxyError::InsufficientGas(message.clone());
        }
    }
    ProxyError::Rpc(error)
}
