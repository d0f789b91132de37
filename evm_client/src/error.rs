use chain_core::{DomainError, IngestError, RpcError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvmClientError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] DomainError),

    #[error("Transaction {hash} not found on {chain}")]
    NotFound { chain: String, hash: String },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Token metadata unavailable for {token}: {reason}")]
    MetadataUnavailable { token: String, reason: String },
}

impl EvmClientError {
    pub fn parse(message: impl Into<String>) -> Self {
        EvmClientError::ParseError {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EvmClientError {
    fn from(err: serde_json::Error) -> Self {
        EvmClientError::parse(err.to_string())
    }
}

impl From<EvmClientError> for IngestError {
    fn from(err: EvmClientError) -> Self {
        match err {
            EvmClientError::InvalidInput(e) => e.into(),
            EvmClientError::NotFound { chain, hash } => IngestError::NotFound {
                chain_alias: chain,
                hash,
            },
            EvmClientError::Rpc(e) => IngestError::Transport(e),
            EvmClientError::ParseError { message } => IngestError::Decode(message),
            EvmClientError::MetadataUnavailable { token, reason } => {
                IngestError::MetadataUnavailable { token, reason }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EvmClientError>;
