use chain_core::{
    call_with_timeout, ChainSpec, DataWarning, EvmLog, EvmRawTransaction, EvmReceipt,
    EvmTransactionEnvelope, FetchedTransaction, RawTransaction, RpcError, RpcTransport,
    TransactionHash,
};
use retry_utils::{classify_rpc_error, retry_with_backoff, RetryConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::abi::{parse_quantity_big, parse_quantity_u64};
use crate::error::{EvmClientError, Result};
use crate::logs::decode_transfer_logs;
use crate::rpc_types::{CallFrame, RpcLog, RpcReceipt, RpcTransaction};
use crate::trace::{flatten_call_trace, FlattenedTrace};

/// Timeouts and trace handling for one EVM chain
#[derive(Debug, Clone)]
pub struct EvmFetchOptions {
    /// Deadline for the transaction and receipt lookups
    pub rpc_timeout: Duration,
    pub trace_timeout: Duration,
    pub fetch_traces: bool,
    pub max_trace_depth: u32,
    /// Backoff for the transaction and receipt lookups only
    pub retry: RetryConfig,
}

impl Default for EvmFetchOptions {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(15),
            trace_timeout: Duration::from_secs(10),
            fetch_traces: true,
            max_trace_depth: 64,
            retry: RetryConfig::default(),
        }
    }
}

/// Assembles an EVM transaction from `eth_getTransactionByHash`,
/// `eth_getTransactionReceipt` and `debug_traceTransaction`.
pub struct EvmFetcher {
    chain: ChainSpec,
    transport: Arc<dyn RpcTransport>,
    options: EvmFetchOptions,
}

impl EvmFetcher {
    pub fn new(chain: ChainSpec, transport: Arc<dyn RpcTransport>, options: EvmFetchOptions) -> Self {
        Self {
            chain,
            transport,
            options,
        }
    }

    pub fn chain(&self) -> &ChainSpec {
        &self.chain
    }

    /// Fetch and decode one transaction.
    ///
    /// Fails with `NotFound` when the node has no such transaction. A failed
    /// or disabled trace is reported as a warning, never as an error.
    pub async fn fetch(&self, tx_hash: &str) -> Result<FetchedTransaction> {
        let hash = TransactionHash::parse(tx_hash, &self.chain)?;
        let hash = hash.normalized();
        debug!("Fetching EVM transaction {} on {}", hash, self.chain.alias);

        let (tx_result, receipt_result, trace_result) = tokio::join!(
            self.primary_call("eth_getTransactionByHash", json!([hash])),
            self.primary_call("eth_getTransactionReceipt", json!([hash])),
            self.fetch_trace(hash),
        );

        let tx_value = tx_result?;
        if tx_value.is_null() {
            return Err(EvmClientError::NotFound {
                chain: self.chain.alias.clone(),
                hash: hash.to_string(),
            });
        }
        let rpc_tx: RpcTransaction = serde_json::from_value(tx_value)?;

        let receipt_value = receipt_result?;
        let rpc_receipt: Option<RpcReceipt> = if receipt_value.is_null() {
            None
        } else {
            Some(serde_json::from_value(receipt_value)?)
        };

        let mut warnings = Vec::new();
        let envelope = convert_envelope(&rpc_tx)?;
        let receipt = match rpc_receipt {
            Some(receipt) => Some(convert_receipt(&receipt, rpc_tx.gas_price.as_deref())?),
            None => {
                debug!("No receipt yet for {} on {}, treating as pending", hash, self.chain.alias);
                warnings.push(DataWarning::ReceiptPending);
                None
            }
        };

        let (trace, has_full_internal_data) = match trace_result {
            Ok(flattened) => {
                if flattened.truncated {
                    warnings.push(DataWarning::TraceTruncated {
                        max_depth: self.options.max_trace_depth,
                    });
                }
                let complete = !flattened.truncated;
                (Some(flattened.calls), complete)
            }
            Err(reason) => {
                warn!(
                    "Trace unavailable for {} on {}: {}",
                    hash, self.chain.alias, reason
                );
                warnings.push(DataWarning::TraceUnavailable { reason });
                (None, false)
            }
        };

        let token_transfers = receipt
            .as_ref()
            .map(|r| decode_transfer_logs(&r.logs))
            .unwrap_or_default();

        info!(
            "Fetched EVM tx {} on {}: {} token transfers, {} trace frames",
            hash,
            self.chain.alias,
            token_transfers.len(),
            trace.as_ref().map(Vec::len).unwrap_or(0)
        );

        Ok(FetchedTransaction {
            raw: RawTransaction::Evm(EvmRawTransaction {
                chain_alias: self.chain.alias.clone(),
                envelope,
                receipt,
                trace,
                token_transfers,
                has_full_internal_data,
            }),
            warnings,
        })
    }

    /// Transaction and receipt lookups: timed out per attempt, retried on transport failures
    async fn primary_call(&self, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
        let transport = self.transport.as_ref();
        let timeout = self.options.rpc_timeout;
        let label = format!("{} on {}", method, self.chain.alias);
        retry_with_backoff(
            &label,
            &self.options.retry,
            || call_with_timeout(transport, method, params.clone(), timeout),
            classify_rpc_error,
        )
        .await
    }

    /// Single attempt; the error string becomes a `TraceUnavailable` warning
    async fn fetch_trace(&self, hash: &str) -> std::result::Result<FlattenedTrace, String> {
        if !self.options.fetch_traces {
            return Err("tracing disabled".to_string());
        }

        let value = call_with_timeout(
            self.transport.as_ref(),
            "debug_traceTransaction",
            json!([hash, { "tracer": "callTracer" }]),
            self.options.trace_timeout,
        )
        .await
        .map_err(|e| e.to_string())?;

        if value.is_null() {
            return Err("node returned an empty trace".to_string());
        }
        let root: CallFrame =
            serde_json::from_value(value).map_err(|e| format!("malformed trace: {}", e))?;
        Ok(flatten_call_trace(&root, self.options.max_trace_depth))
    }
}

fn convert_envelope(tx: &RpcTransaction) -> Result<EvmTransactionEnvelope> {
    Ok(EvmTransactionEnvelope {
        hash: tx.hash.to_lowercase(),
        block_number: tx.block_number.as_deref().map(parse_quantity_u64).transpose()?,
        block_hash: tx.block_hash.as_ref().map(|h| h.to_lowercase()),
        from: tx.from.to_lowercase(),
        to: tx.to.as_ref().map(|t| t.to_lowercase()),
        value: tx
            .value
            .as_deref()
            .map(parse_quantity_big)
            .transpose()?
            .unwrap_or_default(),
        input: tx.input.clone().unwrap_or_else(|| "0x".to_string()),
        gas_price: tx.gas_price.clone(),
        nonce: tx.nonce.as_deref().map(parse_quantity_u64).transpose()?.unwrap_or(0),
    })
}

fn convert_receipt(receipt: &RpcReceipt, tx_gas_price: Option<&str>) -> Result<EvmReceipt> {
    let success = match receipt.status.as_deref() {
        Some(status) => Some(parse_quantity_u64(status)? == 1),
        None => None,
    };

    // Legacy receipts omit effectiveGasPrice; the envelope's gasPrice is what was paid
    let gas_price = receipt.effective_gas_price.as_deref().or(tx_gas_price);

    let block_timestamp = receipt
        .block_timestamp
        .as_deref()
        .or_else(|| receipt.logs.iter().find_map(|l| l.block_timestamp.as_deref()))
        .map(parse_quantity_u64)
        .transpose()?
        .and_then(|ts| i64::try_from(ts).ok());

    Ok(EvmReceipt {
        success,
        gas_used: receipt
            .gas_used
            .as_deref()
            .map(parse_quantity_big)
            .transpose()?
            .unwrap_or_default(),
        effective_gas_price: gas_price
            .map(parse_quantity_big)
            .transpose()?
            .unwrap_or_default(),
        contract_address: receipt.contract_address.as_ref().map(|a| a.to_lowercase()),
        block_number: receipt.block_number.as_deref().map(parse_quantity_u64).transpose()?,
        block_hash: receipt.block_hash.as_ref().map(|h| h.to_lowercase()),
        block_timestamp,
        logs: receipt.logs.iter().map(convert_log).collect::<Result<Vec<_>>>()?,
    })
}

fn convert_log(log: &RpcLog) -> Result<EvmLog> {
    Ok(EvmLog {
        address: log.address.to_lowercase(),
        topics: log.topics.iter().map(|t| t.to_lowercase()).collect(),
        data: log.data.clone(),
        log_index: log.log_index.as_deref().map(parse_quantity_u64).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::FixtureTransport;
    use num_bigint::BigUint;

    const HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    fn tx_json() -> Value {
        json!({
            "hash": HASH,
            "blockNumber": "0x10",
            "blockHash": "0xbb",
            "from": "0xAAAA000000000000000000000000000000000001",
            "to": "0xBBBB000000000000000000000000000000000002",
            "value": "0xde0b6b3a7640000",
            "input": "0x",
            "gasPrice": "0x3b9aca00",
            "nonce": "0x7"
        })
    }

    fn receipt_json() -> Value {
        json!({
            "status": "0x1",
            "gasUsed": "0x5208",
            "blockNumber": "0x10",
            "blockHash": "0xbb",
            "logs": []
        })
    }

    fn options() -> EvmFetchOptions {
        EvmFetchOptions {
            retry: RetryConfig {
                max_retries: 2,
                rate_limit_delays_ms: vec![1],
                unavailable_delays_ms: vec![1],
                timeout_delays_ms: vec![1],
            },
            ..EvmFetchOptions::default()
        }
    }

    fn fetcher(transport: FixtureTransport) -> (EvmFetcher, Arc<FixtureTransport>) {
        let transport = Arc::new(transport);
        let fetcher = EvmFetcher::new(ChainSpec::evm("eth"), transport.clone(), options());
        (fetcher, transport)
    }

    #[tokio::test]
    async fn test_invalid_hash_fails_before_any_rpc() {
        let (fetcher, transport) = fetcher(FixtureTransport::new());
        let err = fetcher.fetch("0x1234").await.unwrap_err();
        assert!(matches!(err, EvmClientError::InvalidInput(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_null_transaction_is_not_found() {
        let (fetcher, _) = fetcher(
            FixtureTransport::new()
                .with_result("eth_getTransactionByHash", Value::Null)
                .with_result("eth_getTransactionReceipt", Value::Null)
                .with_result("debug_traceTransaction", Value::Null),
        );
        let err = fetcher.fetch(HASH).await.unwrap_err();
        assert!(matches!(err, EvmClientError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_trace_failure_degrades() {
        let (fetcher, _) = fetcher(
            FixtureTransport::new()
                .with_result("eth_getTransactionByHash", tx_json())
                .with_result("eth_getTransactionReceipt", receipt_json())
                .with_error(
                    "debug_traceTransaction",
                    RpcError::Rpc {
                        code: -32601,
                        message: "the method debug_traceTransaction does not exist".into(),
                    },
                ),
        );

        let fetched = fetcher.fetch(&HASH.to_uppercase().replacen("0X", "0x", 1)).await.unwrap();
        let RawTransaction::Evm(raw) = fetched.raw else {
            panic!("expected EVM transaction");
        };
        assert!(!raw.has_full_internal_data);
        assert!(raw.trace.is_none());
        assert_eq!(raw.envelope.from, "0xaaaa000000000000000000000000000000000001");
        assert_eq!(raw.envelope.nonce, 7);
        // effectiveGasPrice absent, gasPrice used instead
        assert_eq!(raw.receipt.as_ref().unwrap().effective_gas_price, BigUint::from(1_000_000_000u64));
        assert!(matches!(fetched.warnings.as_slice(), [DataWarning::TraceUnavailable { .. }]));
    }

    #[tokio::test]
    async fn test_primary_call_retries_transient_errors() {
        let (fetcher, transport) = fetcher(
            FixtureTransport::new()
                .with_error("eth_getTransactionByHash", RpcError::Http { status: 503 })
                .with_result("eth_getTransactionByHash", tx_json())
                .with_result("eth_getTransactionReceipt", receipt_json())
                .with_result(
                    "debug_traceTransaction",
                    json!({ "type": "CALL", "from": "0xaaaa", "to": "0xbbbb", "value": "0x0" }),
                ),
        );

        let fetched = fetcher.fetch(HASH).await.unwrap();
        assert!(fetched.raw.has_full_internal_data());
        assert!(fetched.warnings.is_empty());
        assert_eq!(transport.call_count("eth_getTransactionByHash"), 2);
        assert_eq!(transport.call_count("debug_traceTransaction"), 1);
    }

    #[tokio::test]
    async fn test_pending_transaction_has_no_receipt() {
        let mut pending = tx_json();
        pending["blockNumber"] = Value::Null;
        pending["blockHash"] = Value::Null;
        let (fetcher, _) = fetcher(
            FixtureTransport::new()
                .with_result("eth_getTransactionByHash", pending)
                .with_result("eth_getTransactionReceipt", Value::Null)
                .with_result("debug_traceTransaction", Value::Null),
        );

        let fetched = fetcher.fetch(HASH).await.unwrap();
        let RawTransaction::Evm(raw) = &fetched.raw else {
            panic!("expected EVM transaction");
        };
        assert!(raw.receipt.is_none());
        assert!(raw.envelope.block_number.is_none());
        assert!(fetched.warnings.contains(&DataWarning::ReceiptPending));
    }

    #[tokio::test]
    async fn test_rpc_application_error_is_not_retried() {
        let (fetcher, transport) = fetcher(
            FixtureTransport::new()
                .with_error(
                    "eth_getTransactionByHash",
                    RpcError::Rpc { code: -32602, message: "invalid argument".into() },
                )
                .with_result("eth_getTransactionReceipt", Value::Null)
                .with_result("debug_traceTransaction", Value::Null),
        );
        let err = fetcher.fetch(HASH).await.unwrap_err();
        assert!(matches!(err, EvmClientError::Rpc(RpcError::Rpc { code: -32602, .. })));
        assert_eq!(transport.call_count("eth_getTransactionByHash"), 1);
    }
}
