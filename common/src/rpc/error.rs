use std::time::Duration;
use thiserror::Error;

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite_wasm::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server returned error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("response carried neither result nor error")]
    MissingResult,

    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(#[from] serde_json::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,
}

impl RpcError {
    // Errors worth retrying at the poll/subscription layer
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_)
                | RpcError::WebSocket(_)
                | RpcError::Timeout(_)
                | RpcError::ConnectionClosed
        )
    }
}
