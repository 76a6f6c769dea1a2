use super::{Id, RpcError, RpcNotification, RpcRequest, RpcResponse, RpcResult};
use futures_util::{SinkExt, StreamExt};
use log::{log_enabled, trace, warn, Level};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite_wasm::{connect, Message, WebSocketStream};

// JSON-RPC 2.0 subscription client over WebSocket.
// One socket per subscriber task; the owning task is the only reader,
// so no demultiplexing registry is needed.
pub struct WsJsonRpcClient {
    stream: WebSocketStream,
    call_timeout: Duration,
    next_id: u64,
}

impl WsJsonRpcClient {
    pub async fn connect(url: &str, call_timeout: Duration) -> RpcResult<Self> {
        let stream = timeout(call_timeout, connect(url))
            .await
            .map_err(|_| RpcError::Timeout(call_timeout))??;
        Ok(Self {
            stream,
            call_timeout,
            next_id: 1,
        })
    }

    // Issue a subscription request and wait for its acknowledgement.
    // Returns the server-assigned subscription id.
    pub async fn subscribe(&mut self, method: &str, params: Vec<Value>) -> RpcResult<u64> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest::new(id, method, params);
        let payload = serde_json::to_string(&request)?;
        if log_enabled!(Level::Trace) {
            trace!("ws subscribe {} #{}", method, id);
        }
        self.stream.send(Message::text(payload)).await?;

        // Skip anything that is not our acknowledgement; no notification can
        // outrun the response of the subscription that creates it
        loop {
            let text = timeout(self.call_timeout, self.next_text())
                .await
                .map_err(|_| RpcError::Timeout(self.call_timeout))??;
            let response: RpcResponse = match serde_json::from_str(&text) {
                Ok(response) => response,
                Err(_) => continue,
            };
            if response.id != Some(Id::Number(id)) {
                continue;
            }
            if let Some(error) = response.error {
                return Err(RpcError::Server {
                    code: error.code,
                    message: error.message,
                });
            }
            let result = response.result.ok_or(RpcError::MissingResult)?;
            return Ok(serde_json::from_value(result)?);
        }
    }

    // Wait for the next server-pushed notification on any subscription
    // held by this socket. Errors when the connection drops.
    pub async fn next_notification(&mut self) -> RpcResult<RpcNotification> {
        loop {
            let text = self.next_text().await?;
            match serde_json::from_str::<RpcNotification>(&text) {
                Ok(notification) => return Ok(notification),
                Err(_) => {
                    if log_enabled!(Level::Warn) {
                        warn!("ignoring unexpected ws frame: {}", text);
                    }
                }
            }
        }
    }

    async fn next_text(&mut self) -> RpcResult<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(RpcError::ConnectionClosed),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}
