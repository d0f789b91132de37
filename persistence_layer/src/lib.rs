//! Idempotent persistence of classified transactions.
//!
//! An [`UpsertPlan`] is computed up front and applied by a [`TransactionStore`]
//! in one atomic unit: tokens, then the transaction row, then a full
//! replacement of its transfer rows, then per-address links.

use async_trait::async_trait;
use chain_core::IngestError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod plan;
pub mod postgres_client;
pub mod upserter;

pub use memory::{InMemoryStore, UpsertStep};
pub use plan::{
    AddressLinkRow, NativeTransferRow, TokenRow, TokenTransferRow, TransactionRow, UpsertOptions,
    UpsertPlan,
};
pub use postgres_client::{PoolSettings, PostgresClient};
pub use upserter::TransactionUpserter;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Pool creation error: {0}")]
    PoolCreation(String),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid stored value: {0}")]
    InvalidData(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl From<PersistenceError> for IngestError {
    fn from(err: PersistenceError) -> Self {
        IngestError::Persistence(err.to_string())
    }
}

/// What an applied plan produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub transaction_id: Uuid,
    pub tokens_upserted: usize,
    /// False when the transaction row already existed
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: TokenRow,
    pub needs_classification: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: Uuid,
    pub transaction: TransactionRow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransfers {
    pub native: Vec<NativeTransferRow>,
    pub token: Vec<TokenTransferRow>,
}

impl StoredTransfers {
    pub fn len(&self) -> usize {
        self.native.len() + self.token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Backing store for classified transactions
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Apply every write in `plan` atomically; nothing is kept on error
    async fn apply(&self, plan: &UpsertPlan) -> Result<UpsertOutcome>;

    async fn find_transaction(&self, chain_alias: &str, tx_hash: &str) -> Result<Option<StoredTransaction>>;

    async fn find_token(&self, chain_alias: &str, address: &str) -> Result<Option<StoredToken>>;

    /// Transfer rows ordered by transfer index
    async fn transfers_for(&self, transaction_id: Uuid) -> Result<StoredTransfers>;

    /// Links ordered by address
    async fn address_links(&self, transaction_id: Uuid) -> Result<Vec<AddressLinkRow>>;
}
