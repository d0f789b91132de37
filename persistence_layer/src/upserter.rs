use chain_core::{ClassificationResult, NormalizedTransaction, TokenInfo};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{Result, TransactionStore, UpsertOptions, UpsertOutcome, UpsertPlan};

/// Persistence boundary for the ingestion pipeline
#[derive(Clone)]
pub struct TransactionUpserter {
    store: Arc<dyn TransactionStore>,
}

impl TransactionUpserter {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Write tokens, the transaction, its transfers and address links as one unit
    pub async fn upsert(
        &self,
        normalized: &NormalizedTransaction,
        classification: &ClassificationResult,
        tokens: &[TokenInfo],
        options: &UpsertOptions,
    ) -> Result<UpsertOutcome> {
        let plan = UpsertPlan::build(normalized, classification, tokens, options);
        debug!(
            "Upsert plan for {} on {}: {} tokens, {} native + {} token transfers, {} links",
            plan.transaction.tx_hash,
            plan.transaction.chain_alias,
            plan.tokens.len(),
            plan.native_transfers.len(),
            plan.token_transfers.len(),
            plan.address_links.len()
        );

        let outcome = self.store.apply(&plan).await?;
        info!(
            "{} transaction {} on {} as {}",
            if outcome.created { "Inserted" } else { "Updated" },
            plan.transaction.tx_hash,
            plan.transaction.chain_alias,
            outcome.transaction_id
        );
        Ok(outcome)
    }
}
