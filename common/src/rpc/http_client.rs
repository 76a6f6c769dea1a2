use super::{RpcError, RpcRequest, RpcResponse, RpcResult};
use log::{log_enabled, trace, Level};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// JSON-RPC 2.0 client over HTTP POST.
// One instance per configured fullnode endpoint; cheap to clone via Arc.
pub struct HttpJsonRpcClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpJsonRpcClient {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self::with_timeout(url, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout<S: Into<String>>(url: S, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> RpcResult<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        if log_enabled!(Level::Trace) {
            trace!("call {} #{} -> {}", method, id, self.url);
        }

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(self.timeout)
                } else {
                    RpcError::Transport(e)
                }
            })?;

        let body: RpcResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(RpcError::Server {
                code: error.code,
                message: error.message,
            });
        }
        let result = body.result.ok_or(RpcError::MissingResult)?;
        Ok(serde_json::from_value(result)?)
    }
}
