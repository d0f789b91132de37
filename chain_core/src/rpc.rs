use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::RpcError;

/// A JSON-RPC 2.0 endpoint. Returns the `result` member, which may be `null`.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// Invoke `method` and fail with `RpcError::Timeout` once `timeout` elapses
pub async fn call_with_timeout(
    transport: &dyn RpcTransport,
    method: &str,
    params: Value,
    timeout: Duration,
) -> Result<Value, RpcError> {
    match tokio::time::timeout(timeout, transport.call(method, params)).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout {
            method: method.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC over HTTP POST
#[derive(Debug, Clone)]
pub struct HttpRpcTransport {
    http_client: Client,
    url: String,
    request_id_counter: std::sync::Arc<AtomicU64>,
}

impl HttpRpcTransport {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, RpcError> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.to_string(),
            request_id_counter: std::sync::Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_request_id(&self) -> u64 {
        self.request_id_counter.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": self.next_request_id(),
            "method": method,
            "params": params
        });
        trace!("RPC -> {} {}", method, request_body);

        let response = self
            .http_client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!("RPC {} returned HTTP {}", method, status);
            return Err(RpcError::Http {
                status: status.as_u16(),
            });
        }

        let envelope: RpcEnvelope = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

/// In-process transport serving canned responses per method.
///
/// Each method has a queue of responses; the last one is repeated once the
/// queue drains, so a fixture can serve retries and repeated ingestion.
/// Used for replaying captured transactions and in tests.
#[derive(Debug, Default)]
pub struct FixtureTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, method: &str, result: Value) -> Self {
        self.push(method, Ok(result));
        self
    }

    pub fn with_error(self, method: &str, error: RpcError) -> Self {
        self.push(method, Err(error));
        self
    }

    /// Delay every response for `method`, to exercise timeouts
    pub fn with_delay(self, method: &str, delay: Duration) -> Self {
        if let Ok(mut delays) = self.delays.lock() {
            delays.insert(method.to_string(), delay);
        }
        self
    }

    pub fn push(&self, method: &str, response: Result<Value, RpcError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses
                .entry(method.to_string())
                .or_default()
                .push_back(response);
        }
    }

    /// Recorded `(method, params)` pairs in call order
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl RpcTransport for FixtureTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((method.to_string(), params));
        }

        let delay = self
            .delays
            .lock()
            .ok()
            .and_then(|d| d.get(method).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self
            .responses
            .lock()
            .map_err(|_| RpcError::Transport("fixture lock poisoned".to_string()))?;
        let queue = responses.get_mut(method).ok_or_else(|| RpcError::Rpc {
            code: -32601,
            message: format!("the method {} does not exist/is not available", method),
        })?;
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.unwrap_or(Ok(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_serves_queue_then_repeats_last() {
        let transport = FixtureTransport::new()
            .with_error("getTransaction", RpcError::Http { status: 503 })
            .with_result("getTransaction", json!({"slot": 1}));

        assert!(transport.call("getTransaction", json!([])).await.is_err());
        assert_eq!(transport.call("getTransaction", json!([])).await.unwrap()["slot"], 1);
        assert_eq!(transport.call("getTransaction", json!([])).await.unwrap()["slot"], 1);
        assert_eq!(transport.call_count("getTransaction"), 3);
    }

    #[tokio::test]
    async fn test_unknown_method_is_rpc_error() {
        let transport = FixtureTransport::new();
        let err = transport.call("debug_traceTransaction", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::Rpc { code: -32601, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_with_timeout_expires() {
        let transport = FixtureTransport::new()
            .with_result("eth_getTransactionReceipt", Value::Null)
            .with_delay("eth_getTransactionReceipt", Duration::from_secs(30));

        let err = call_with_timeout(
            &transport,
            "eth_getTransactionReceipt",
            json!([]),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            RpcError::Timeout {
                method: "eth_getTransactionReceipt".to_string()
            }
        );
    }
}
