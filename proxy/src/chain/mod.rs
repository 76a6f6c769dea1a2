mod pool;
mod signer;

#[cfg(test)]
pub mod mock;

pub use pool::*;
pub use signer::*;

use async_trait::async_trait;
use dex_common::{
    api::sui::{
        BalanceInfo, CoinPage, DynamicFieldName, EventFilter, EventId, EventPage, ObjectResponse,
        TransactionBlockBytes, TransactionBlockResponse, TransactionBlockResponseOptions,
    },
    crypto::{ObjectId, SuiAddress, TransactionDigest},
    rpc::RpcResult,
};
use serde_json::Value;

// One Move call inside a (possibly batched) transaction
#[derive(Debug, Clone)]
pub struct MoveCall {
    pub package: ObjectId,
    pub module: &'static str,
    pub function: &'static str,
    pub type_args: Vec<String>,
    pub args: Vec<Value>,
}

// Seam between the proxy and the fullnode transport. Production uses the
// leader-tracked endpoint pool; tests plug a scripted in-memory chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_coins(
        &self,
        owner: SuiAddress,
        coin_type: Option<&str>,
        cursor: Option<ObjectId>,
    ) -> RpcResult<CoinPage>;

    async fn get_all_balances(&self, owner: SuiAddress) -> RpcResult<Vec<BalanceInfo>>;

    async fn get_object(&self, id: ObjectId) -> RpcResult<ObjectResponse>;

    async fn get_dynamic_field_object(
        &self,
        parent: ObjectId,
        name: DynamicFieldName,
    ) -> RpcResult<ObjectResponse>;

    async fn get_latest_checkpoint(&self) -> RpcResult<u64>;

    async fn get_current_epoch(&self) -> RpcResult<u64>;

    async fn query_events(
        &self,
        filter: EventFilter,
        cursor: Option<EventId>,
        limit: Option<usize>,
        descending: bool,
    ) -> RpcResult<EventPage>;

    async fn get_transaction_block(
        &self,
        digest: &TransactionDigest,
        options: TransactionBlockResponseOptions,
    ) -> RpcResult<TransactionBlockResponse>;

    async fn build_move_call(
        &self,
        signer: SuiAddress,
        call: MoveCall,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes>;

    async fn build_batch_move_calls(
        &self,
        signer: SuiAddress,
        calls: Vec<MoveCall>,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes>;

    // Merge the inputs then split the outcome into one new coin per amount,
    // all owned by the matching recipient; gas is drawn from the inputs
    async fn build_pay_sui(
        &self,
        signer: SuiAddress,
        input_coins: Vec<ObjectId>,
        recipients: Vec<SuiAddress>,
        amounts: Vec<u64>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes>;

    // Merge every input into the first one and hand it to the recipient;
    // the resulting coin keeps the first input's object id
    async fn build_pay_all_sui(
        &self,
        signer: SuiAddress,
        input_coins: Vec<ObjectId>,
        recipient: SuiAddress,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes>;

    // Non-SUI token payment: inputs of one coin type, gas paid separately
    async fn build_pay(
        &self,
        signer: SuiAddress,
        input_coins: Vec<ObjectId>,
        recipients: Vec<SuiAddress>,
        amounts: Vec<u64>,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes>;

    async fn build_transfer_object(
        &self,
        signer: SuiAddress,
        object: ObjectId,
        recipient: SuiAddress,
        gas: Option<ObjectId>,
        gas_budget: u64,
    ) -> RpcResult<TransactionBlockBytes>;

    async fn execute_transaction_block(
        &self,
        tx_bytes: &str,
        signature: &str,
        options: TransactionBlockResponseOptions,
    ) -> RpcResult<TransactionBlockResponse>;
}
