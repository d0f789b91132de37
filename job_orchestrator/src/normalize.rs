//! Raw chain payloads to the chain-independent transaction record.

use chain_core::{
    BigInt, BigUint, EvmRawTransaction, NormalizedTransaction, RawTransaction, SvmRawTransaction,
    TxStatus,
};
use chrono::{DateTime, Utc};
use num_traits::{Signed, Zero};

pub fn normalize(raw: &RawTransaction) -> NormalizedTransaction {
    match raw {
        RawTransaction::Evm(tx) => normalize_evm(tx),
        RawTransaction::Svm(tx) => normalize_svm(tx),
    }
}

fn timestamp(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// fee = gasUsed × effectiveGasPrice; pending transactions have no fee yet
fn normalize_evm(tx: &EvmRawTransaction) -> NormalizedTransaction {
    let receipt = tx.receipt.as_ref();
    let status = match receipt {
        None => TxStatus::Pending,
        Some(r) if r.success == Some(false) => TxStatus::Failed,
        // Pre-Byzantium receipts carry no status field
        Some(_) => TxStatus::Success,
    };
    let fee = receipt
        .map(|r| &r.gas_used * &r.effective_gas_price)
        .unwrap_or_else(BigUint::zero);

    NormalizedTransaction {
        chain_alias: tx.chain_alias.clone(),
        hash: tx.envelope.hash.clone(),
        block_number: receipt
            .and_then(|r| r.block_number)
            .or(tx.envelope.block_number),
        block_hash: receipt
            .and_then(|r| r.block_hash.clone())
            .or_else(|| tx.envelope.block_hash.clone()),
        timestamp: timestamp(receipt.and_then(|r| r.block_timestamp)),
        from: tx.envelope.from.clone(),
        to: tx.envelope.to.clone(),
        value: tx.envelope.value.clone(),
        fee,
        status,
    }
}

/// Native value moved by the fee payer: |pre − post − fee| on its own account,
/// in arbitrary precision
pub fn svm_native_value(tx: &SvmRawTransaction) -> BigUint {
    let (Some(pre), Some(post)) = (tx.pre_balances.first(), tx.post_balances.first()) else {
        return BigUint::zero();
    };
    let delta = BigInt::from(*pre) - BigInt::from(*post) - BigInt::from(tx.fee);
    delta.abs().to_biguint().unwrap_or_else(BigUint::zero)
}

fn normalize_svm(tx: &SvmRawTransaction) -> NormalizedTransaction {
    NormalizedTransaction {
        chain_alias: tx.chain_alias.clone(),
        hash: tx.signature.clone(),
        block_number: Some(tx.slot),
        block_hash: None,
        timestamp: timestamp(tx.block_time),
        from: tx.fee_payer().unwrap_or_default().to_string(),
        to: tx.native_transfer.as_ref().map(|t| t.to.clone()),
        value: svm_native_value(tx),
        fee: BigUint::from(tx.fee),
        status: if tx.succeeded() {
            TxStatus::Success
        } else {
            TxStatus::Failed
        },
    }
}
