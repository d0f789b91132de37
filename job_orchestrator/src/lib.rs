//! Ingestion pipeline wiring: per-chain fetcher registry, normalization and
//! the `TransactionProcessor` that runs one transaction end to end.

use chain_core::IngestError;
use persistence_layer::PersistenceError;
use thiserror::Error;

pub mod normalize;
pub mod processor;
pub mod registry;

pub use normalize::{normalize, svm_native_value};
pub use processor::{ProcessResult, TransactionProcessor};
pub use registry::{ChainClients, ChainFetcher, FetcherRegistry, IngestOptions, TokenMetadataSource};

#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<PersistenceError> for OrchestratorError {
    fn from(err: PersistenceError) -> Self {
        OrchestratorError::Ingest(err.into())
    }
}

impl OrchestratorError {
    /// Whether calling `process` again later can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::Ingest(err) => err.is_retryable(),
            OrchestratorError::Config(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Ingest(err) => err.kind(),
            OrchestratorError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
