pub mod info;
pub mod orders;
pub mod trades;
pub mod treasury;

use crate::error::{ProxyError, ProxyResult};
use dex_common::{api::sui::TransactionBlockResponse, crypto::ObjectId};

// The object minted by an admin transaction is its single created ref
pub(crate) fn first_created(response: &TransactionBlockResponse) -> ProxyResult<ObjectId> {
    response
        .effects
        .as_ref()
        .and_then(|effects| effects.created.first())
        .map(|created| created.reference.object_id)
        .ok_or_else(|| {
            ProxyError::Execution("transaction effects carry no created object".to_string())
        })
}
