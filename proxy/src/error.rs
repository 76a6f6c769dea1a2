use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use dex_common::{crypto::KeyError, rpc::RpcError};
use serde_json::json;
use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

// Error string the chain returns when a transaction may or may not have been
// applied; the objects it referenced cannot be reused until the next epoch
pub const FINALITY_TIMEOUT_MARKER: &str = "Transaction timed out before reaching finality";

#[derive(Debug, Error)]
pub enum ProxyError {
    // Fatal at startup, aborts the process
    #[error("startup error: {0}")]
    Startup(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    // Parsed Move abort with its mnemonic name from the error-code tables
    #[error("{name}: {message}")]
    OnChainAbort {
        name: String,
        message: String,
        client_order_id: Option<String>,
    },

    // On-chain failure we could not map to a known code
    #[error("transaction failed on chain: {0}")]
    Execution(String),

    #[error("insufficient gas: {0}")]
    InsufficientGas(String),

    #[error("{FINALITY_TIMEOUT_MARKER}")]
    FinalityTimeout,

    #[error("order cache is full, please retry")]
    CacheFull,

    #[error("no free {0} available, please retry")]
    PoolExhausted(&'static str),

    #[error("The mainGasCoin is being used by another operation, please retry")]
    MainCoinInUse,

    #[error("recipient is not whitelisted: {0}")]
    Unauthorised(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProxyError {
    // Stable tag surfaced in the {type, error} body
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Startup(_) => "STARTUP_ERROR",
            Self::Rpc(_) => "RPC_ERROR",
            Self::OnChainAbort { .. } => "MOVE_ABORT",
            Self::Execution(_) => "EXECUTION_FAILED",
            Self::InsufficientGas(_) => "INSUFFICIENT_GAS",
            Self::FinalityTimeout => "FINALITY_TIMEOUT",
            Self::CacheFull => "CACHE_FULL",
            Self::PoolExhausted(_) => "POOL_EXHAUSTED",
            Self::MainCoinInUse => "MAIN_GAS_COIN_IN_USE",
            Self::Unauthorised(_) => "UNAUTHORISED",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::UnknownPool(_) => "UNKNOWN_POOL",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Key(_) => "KEY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_finality_timeout(&self) -> bool {
        match self {
            Self::FinalityTimeout => true,
            Self::Rpc(RpcError::Server { message, .. }) => {
                message.contains(FINALITY_TIMEOUT_MARKER)
            }
            _ => false,
        }
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CacheFull
            | Self::PoolExhausted(_)
            | Self::MainCoinInUse
            | Self::Unauthorised(_)
            | Self::OrderNotFound(_)
            | Self::UnknownPool(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::OnChainAbort { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::OnChainAbort {
                name,
                message,
                client_order_id,
            } => {
                let mut body = json!({ "type": name, "error": message });
                if let Some(id) = client_order_id {
                    body["client_order_id"] = json!(id);
                }
                body
            }
            _ => json!({ "type": self.kind(), "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
