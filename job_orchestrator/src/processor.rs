use chain_core::{
    ClassificationDirection, ClassificationType, Confidence, DataWarning, DomainError,
    IngestError, TokenInfo, TransactionHash,
};
use persistence_layer::{TransactionUpserter, UpsertOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tx_parser::{ClassifierRegistry, ClassifyContext};
use uuid::Uuid;

use crate::normalize::normalize;
use crate::registry::FetcherRegistry;
use crate::Result;

/// Summary of one successful ingestion. Missing enrichment shows up as
/// `has_full_internal_data = false`, `tokens_upserted < tokens_discovered`
/// and entries in `warnings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub transaction_id: Uuid,
    pub chain_alias: String,
    pub tx_hash: String,
    pub classification_type: ClassificationType,
    pub classification_direction: ClassificationDirection,
    pub confidence: Confidence,
    pub label: String,
    pub transfer_count: usize,
    pub tokens_discovered: usize,
    pub tokens_upserted: usize,
    pub has_full_internal_data: bool,
    /// False when the transaction had been ingested before
    pub created: bool,
    pub warnings: Vec<DataWarning>,
}

/// validate → fetch → classify → resolve tokens → normalize → upsert.
/// Holds no per-call state; concurrent calls are independent.
#[derive(Clone)]
pub struct TransactionProcessor {
    fetchers: Arc<FetcherRegistry>,
    classifiers: Arc<ClassifierRegistry>,
    upserter: TransactionUpserter,
}

impl TransactionProcessor {
    pub fn new(
        fetchers: Arc<FetcherRegistry>,
        classifiers: Arc<ClassifierRegistry>,
        upserter: TransactionUpserter,
    ) -> Self {
        Self {
            fetchers,
            classifiers,
            upserter,
        }
    }

    pub fn upserter(&self) -> &TransactionUpserter {
        &self.upserter
    }

    pub async fn process(
        &self,
        chain_alias: &str,
        tx_hash: &str,
        for_address: Option<&str>,
    ) -> Result<ProcessResult> {
        // 1. Validate, no I/O
        if chain_alias.trim().is_empty() {
            return Err(IngestError::Validation("chain alias is required".to_string()).into());
        }
        let clients = self.fetchers.get(chain_alias)?;
        let spec = clients.chain();
        let hash = TransactionHash::parse(tx_hash, spec).map_err(IngestError::from)?;
        let for_address = for_address.map(str::trim).filter(|a| !a.is_empty());
        if let Some(address) = for_address {
            if !spec.family.is_valid_address(address) {
                return Err(IngestError::from(DomainError::InvalidFormat {
                    kind: "address",
                    family: spec.family.as_str(),
                    value: address.to_string(),
                })
                .into());
            }
        }
        debug!("Processing {} on {}", hash.normalized(), spec.alias);

        // 2. Fetch
        let fetched = clients.fetcher.fetch(hash.original()).await?;
        let raw = fetched.raw;
        let mut warnings = fetched.warnings;
        for warning in &warnings {
            warn!("{} on {}: {}", hash.normalized(), spec.alias, warning);
        }

        // 3. Classify
        let ctx = ClassifyContext::for_transaction(&raw, for_address);
        let classification = self.classifiers.classify(&raw, &ctx);

        // 4. Token metadata, one token at a time, failures tolerated
        let token_addresses = classification.token_addresses();
        let mut tokens: Vec<TokenInfo> = Vec::with_capacity(token_addresses.len());
        for address in &token_addresses {
            match clients.metadata.fetch(address).await {
                Ok(token) => {
                    debug!("Resolved {} as {} ({} decimals)", address, token.symbol, token.decimals);
                    tokens.push(token);
                }
                Err(e) => {
                    warn!(
                        "Token metadata unavailable for {} on {} (tx {}): {}",
                        address,
                        spec.alias,
                        hash.normalized(),
                        e
                    );
                    warnings.push(DataWarning::TokenMetadataUnavailable {
                        token: address.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        // 5. Normalize
        let normalized = normalize(&raw);

        // 6. Upsert
        let has_full_internal_data = raw.has_full_internal_data();
        let options = UpsertOptions {
            family: spec.family,
            for_address: for_address.map(str::to_string),
            has_full_internal_data,
        };
        let outcome = self
            .upserter
            .upsert(&normalized, &classification, &tokens, &options)
            .await
            .map_err(IngestError::from)?;

        let result = ProcessResult {
            transaction_id: outcome.transaction_id,
            chain_alias: spec.alias.clone(),
            tx_hash: hash.normalized().to_string(),
            classification_type: classification.classification_type,
            classification_direction: classification.direction,
            confidence: classification.confidence,
            label: classification.label.clone(),
            transfer_count: classification.transfers.len(),
            tokens_discovered: token_addresses.len(),
            tokens_upserted: outcome.tokens_upserted,
            has_full_internal_data,
            created: outcome.created,
            warnings,
        };
        info!(
            "Processed {} on {}: {} '{}' ({}), {} transfers, tokens {}/{}, full data {}",
            result.tx_hash,
            result.chain_alias,
            result.classification_type.as_str(),
            result.label,
            result.classification_direction.as_str(),
            result.transfer_count,
            result.tokens_upserted,
            result.tokens_discovered,
            result.has_full_internal_data
        );
        Ok(result)
    }
}
