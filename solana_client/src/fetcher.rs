use chain_core::{
    call_with_timeout, ChainSpec, DataWarning, FetchedTransaction, RawTransaction, RpcError,
    RpcTransport, SvmRawTransaction, SvmTokenBalance, TransactionHash,
};
use num_bigint::BigUint;
use retry_utils::{classify_rpc_error, retry_with_backoff, RetryConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::balance_diff::{infer_native_transfer, infer_token_transfers};
use crate::error::{Result, SolanaClientError};
use crate::instructions::flatten_instructions;
use crate::rpc_types::{EncodedTransaction, UiTokenBalance};

#[derive(Debug, Clone)]
pub struct SvmFetchOptions {
    pub rpc_timeout: Duration,
    pub max_trace_depth: u32,
    pub retry: RetryConfig,
}

impl Default for SvmFetchOptions {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(15),
            max_trace_depth: 64,
            retry: RetryConfig::default(),
        }
    }
}

/// Assembles a Solana transaction from a single `getTransaction` call
pub struct SvmFetcher {
    chain: ChainSpec,
    transport: Arc<dyn RpcTransport>,
    options: SvmFetchOptions,
}

impl SvmFetcher {
    pub fn new(chain: ChainSpec, transport: Arc<dyn RpcTransport>, options: SvmFetchOptions) -> Self {
        Self {
            chain,
            transport,
            options,
        }
    }

    pub fn chain(&self) -> &ChainSpec {
        &self.chain
    }

    pub async fn fetch(&self, signature: &str) -> Result<FetchedTransaction> {
        let hash = TransactionHash::parse(signature, &self.chain)?;
        let signature = hash.normalized();
        debug!("Fetching SVM transaction {} on {}", signature, self.chain.alias);

        let value = self.get_transaction(signature).await?;
        if value.is_null() {
            return Err(SolanaClientError::NotFound {
                chain: self.chain.alias.clone(),
                signature: signature.to_string(),
            });
        }

        let encoded: EncodedTransaction = serde_json::from_value(value)?;
        let raw = self.assemble(signature, encoded)?;

        let mut warnings = Vec::new();
        if !raw.has_full_internal_data {
            warnings.push(DataWarning::TraceUnavailable {
                reason: "inner instructions missing or truncated".to_string(),
            });
        }

        info!(
            "Fetched SVM tx {} on {}: {} instructions, {} token transfers, native transfer: {}",
            signature,
            self.chain.alias,
            raw.instructions.len(),
            raw.token_transfers.len(),
            raw.native_transfer.is_some()
        );

        Ok(FetchedTransaction {
            raw: RawTransaction::Svm(raw),
            warnings,
        })
    }

    async fn get_transaction(&self, signature: &str) -> std::result::Result<Value, RpcError> {
        let transport = self.transport.as_ref();
        let timeout = self.options.rpc_timeout;
        let params = json!([
            signature,
            { "encoding": "json", "maxSupportedTransactionVersion": 0 }
        ]);
        let label = format!("getTransaction on {}", self.chain.alias);
        retry_with_backoff(
            &label,
            &self.options.retry,
            || call_with_timeout(transport, "getTransaction", params.clone(), timeout),
            classify_rpc_error,
        )
        .await
    }

    fn assemble(&self, signature: &str, encoded: EncodedTransaction) -> Result<SvmRawTransaction> {
        let meta = encoded.meta.ok_or_else(|| {
            SolanaClientError::InvalidResponse(format!("transaction {} has no meta", signature))
        })?;

        // v0 transactions append lookup-table addresses after the static keys
        let mut account_keys = encoded.transaction.message.account_keys;
        if let Some(loaded) = &meta.loaded_addresses {
            account_keys.extend(loaded.writable.iter().cloned());
            account_keys.extend(loaded.readonly.iter().cloned());
        }

        if meta.pre_balances.len() != meta.post_balances.len() {
            warn!(
                "Balance snapshot length mismatch for {}: {} pre, {} post",
                signature,
                meta.pre_balances.len(),
                meta.post_balances.len()
            );
        }

        let pre_token_balances = convert_token_balances(meta.pre_token_balances.as_deref())?;
        let post_token_balances = convert_token_balances(meta.post_token_balances.as_deref())?;

        let inner_recorded = meta.inner_instructions.is_some();
        let flattened = flatten_instructions(
            &account_keys,
            &encoded.transaction.message.instructions,
            meta.inner_instructions.as_deref().unwrap_or_default(),
            self.options.max_trace_depth,
        );

        let native_transfer =
            infer_native_transfer(&account_keys, &meta.pre_balances, &meta.post_balances);
        let token_transfers = infer_token_transfers(&pre_token_balances, &post_token_balances);

        Ok(SvmRawTransaction {
            chain_alias: self.chain.alias.clone(),
            signature: signature.to_string(),
            slot: encoded.slot,
            block_time: encoded.block_time,
            fee: meta.fee,
            error: meta.err.as_ref().map(|e| e.to_string()),
            account_keys,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            pre_token_balances,
            post_token_balances,
            instructions: flattened.instructions,
            native_transfer,
            token_transfers,
            has_full_internal_data: inner_recorded && !flattened.truncated,
        })
    }
}

fn convert_token_balances(balances: Option<&[UiTokenBalance]>) -> Result<Vec<SvmTokenBalance>> {
    balances
        .unwrap_or_default()
        .iter()
        .map(|b| {
            let amount = BigUint::parse_bytes(b.ui_token_amount.amount.trim().as_bytes(), 10)
                .ok_or_else(|| {
                    SolanaClientError::InvalidResponse(format!(
                        "invalid token amount '{}' for mint {}",
                        b.ui_token_amount.amount, b.mint
                    ))
                })?;
            Ok(SvmTokenBalance {
                account_index: b.account_index,
                mint: b.mint.clone(),
                owner: b.owner.clone(),
                program_id: b.program_id.clone(),
                amount,
                decimals: b.ui_token_amount.decimals,
            })
        })
        .collect()
}
