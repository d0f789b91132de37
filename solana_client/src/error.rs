use chain_core::{DomainError, IngestError, RpcError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolanaClientError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] DomainError),
    #[error("Transaction {signature} not found on {chain}")]
    NotFound { chain: String, signature: String },
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Token metadata unavailable for {mint}: {reason}")]
    MetadataUnavailable { mint: String, reason: String },
}

impl From<serde_json::Error> for SolanaClientError {
    fn from(err: serde_json::Error) -> Self {
        SolanaClientError::InvalidResponse(err.to_string())
    }
}

impl From<SolanaClientError> for IngestError {
    fn from(err: SolanaClientError) -> Self {
        match err {
            SolanaClientError::InvalidInput(e) => e.into(),
            SolanaClientError::NotFound { chain, signature } => IngestError::NotFound {
                chain_alias: chain,
                hash: signature,
            },
            SolanaClientError::Rpc(e) => IngestError::Transport(e),
            SolanaClientError::InvalidResponse(message) => IngestError::Decode(message),
            SolanaClientError::MetadataUnavailable { mint, reason } => {
                IngestError::MetadataUnavailable {
                    token: mint,
                    reason,
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SolanaClientError>;
