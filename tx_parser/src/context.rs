use chain_core::{
    ClassificationResult, ClassificationType, Confidence, ParsedTransfer, RawTransaction,
};
use serde::{Deserialize, Serialize};

use crate::direction::calculate_direction;

/// Whose viewpoint a classification is computed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyContext {
    pub chain_alias: String,
    pub perspective_address: String,
}

impl ClassifyContext {
    pub fn new(chain_alias: &str, perspective_address: &str) -> Self {
        Self {
            chain_alias: chain_alias.to_string(),
            perspective_address: perspective_address.trim().to_string(),
        }
    }

    /// Use `for_address` when given, otherwise the transaction's initiator
    /// (EVM `from`, SVM fee payer)
    pub fn for_transaction(raw: &RawTransaction, for_address: Option<&str>) -> Self {
        let perspective = for_address
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .or_else(|| initiator(raw))
            .unwrap_or_default();
        Self {
            chain_alias: raw.chain_alias().to_string(),
            perspective_address: perspective,
        }
    }
}

pub fn initiator(raw: &RawTransaction) -> Option<String> {
    match raw {
        RawTransaction::Evm(tx) => Some(tx.envelope.from.clone()),
        RawTransaction::Svm(tx) => tx.fee_payer().map(str::to_string),
    }
}

/// Build a result whose direction follows from its type and transfers
pub(crate) fn classified(
    classification_type: ClassificationType,
    confidence: Confidence,
    label: &str,
    transfers: Vec<ParsedTransfer>,
    ctx: &ClassifyContext,
) -> ClassificationResult {
    let direction = calculate_direction(classification_type, &transfers, &ctx.perspective_address);
    ClassificationResult {
        classification_type,
        direction,
        confidence,
        label: label.to_string(),
        transfers,
    }
}
