use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    AddressLinkRow, NativeTransferRow, PersistenceError, Result, StoredToken, StoredTransaction,
    StoredTransfers, TokenTransferRow, TransactionStore, UpsertOutcome, UpsertPlan,
};

/// Upsert stage, used to inject a failure part-way through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStep {
    Tokens,
    Transaction,
    Transfers,
    AddressLinks,
}

#[derive(Debug, Clone, Default)]
struct State {
    tokens: HashMap<(String, String), StoredToken>,
    transactions: HashMap<(String, String), StoredTransaction>,
    native_transfers: HashMap<Uuid, Vec<NativeTransferRow>>,
    token_transfers: HashMap<Uuid, Vec<TokenTransferRow>>,
    links: BTreeMap<(Uuid, String), AddressLinkRow>,
}

/// In-process store with the same conflict rules as the PostgreSQL schema.
/// Writes go to a copy of the state that replaces the original only once
/// every step succeeded.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_at: Mutex<Option<UpsertStep>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `apply` fail when it reaches `step`
    pub async fn fail_at(&self, step: Option<UpsertStep>) {
        *self.fail_at.lock().await = step;
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    pub async fn link_count(&self) -> usize {
        self.state.lock().await.links.len()
    }

    pub async fn transfer_row_count(&self) -> usize {
        let state = self.state.lock().await;
        state.native_transfers.values().map(Vec::len).sum::<usize>()
            + state.token_transfers.values().map(Vec::len).sum::<usize>()
    }
}

fn check(fail_at: Option<UpsertStep>, step: UpsertStep) -> Result<()> {
    if fail_at == Some(step) {
        return Err(PersistenceError::Unavailable(format!("injected failure at {:?}", step)));
    }
    Ok(())
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn apply(&self, plan: &UpsertPlan) -> Result<UpsertOutcome> {
        let fail_at = *self.fail_at.lock().await;
        let mut guard = self.state.lock().await;
        let mut staged = guard.clone();

        check(fail_at, UpsertStep::Tokens)?;
        for token in &plan.tokens {
            let key = (token.chain_alias.clone(), token.address.clone());
            staged
                .tokens
                .entry(key)
                .and_modify(|stored| stored.token = token.clone())
                .or_insert_with(|| StoredToken {
                    token: token.clone(),
                    needs_classification: true,
                });
        }

        check(fail_at, UpsertStep::Transaction)?;
        let row = &plan.transaction;
        let key = (row.chain_alias.clone(), row.tx_hash.clone());
        let (transaction_id, created) = match staged.transactions.get_mut(&key) {
            Some(existing) => {
                let current = &mut existing.transaction;
                current.block_number = current.block_number.or(row.block_number);
                if current.block_hash.is_none() {
                    current.block_hash = row.block_hash.clone();
                }
                current.block_timestamp = current.block_timestamp.or(row.block_timestamp);
                if current.status == "pending" {
                    current.status = row.status.clone();
                    current.fee = row.fee.clone();
                }
                current.classification_type = row.classification_type.clone();
                current.classification_direction = row.classification_direction.clone();
                current.classification_confidence = row.classification_confidence.clone();
                current.classification_label = row.classification_label.clone();
                current.has_full_internal_data = row.has_full_internal_data;
                (existing.id, false)
            }
            None => {
                let id = Uuid::new_v4();
                staged.transactions.insert(
                    key,
                    StoredTransaction {
                        id,
                        transaction: row.clone(),
                    },
                );
                (id, true)
            }
        };

        check(fail_at, UpsertStep::Transfers)?;
        staged
            .native_transfers
            .insert(transaction_id, plan.native_transfers.clone());
        staged
            .token_transfers
            .insert(transaction_id, plan.token_transfers.clone());

        check(fail_at, UpsertStep::AddressLinks)?;
        staged.links.retain(|(id, address), _| {
            *id != transaction_id || plan.address_links.iter().any(|l| &l.address == address)
        });
        for link in &plan.address_links {
            staged
                .links
                .insert((transaction_id, link.address.clone()), link.clone());
        }

        *guard = staged;
        debug!(
            "In-memory upsert of {} on {}: id {}, created {}",
            row.tx_hash, row.chain_alias, transaction_id, created
        );
        Ok(UpsertOutcome {
            transaction_id,
            tokens_upserted: plan.tokens.len(),
            created,
        })
    }

    async fn find_transaction(&self, chain_alias: &str, tx_hash: &str) -> Result<Option<StoredTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .get(&(chain_alias.to_string(), tx_hash.to_string()))
            .cloned())
    }

    async fn find_token(&self, chain_alias: &str, address: &str) -> Result<Option<StoredToken>> {
        let state = self.state.lock().await;
        Ok(state
            .tokens
            .get(&(chain_alias.to_string(), address.to_string()))
            .cloned())
    }

    async fn transfers_for(&self, transaction_id: Uuid) -> Result<StoredTransfers> {
        let state = self.state.lock().await;
        Ok(StoredTransfers {
            native: state
                .native_transfers
                .get(&transaction_id)
                .cloned()
                .unwrap_or_default(),
            token: state
                .token_transfers
                .get(&transaction_id)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn address_links(&self, transaction_id: Uuid) -> Result<Vec<AddressLinkRow>> {
        let state = self.state.lock().await;
        Ok(state
            .links
            .iter()
            .filter(|((id, _), _)| *id == transaction_id)
            .map(|(_, link)| link.clone())
            .collect())
    }
}
