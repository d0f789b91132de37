use thiserror::Error;

/// Errors raised while constructing domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Empty value: {0}")]
    Empty(&'static str),

    #[error("Invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },

    #[error("Invalid {kind} for {family} chain: {value}")]
    InvalidFormat {
        kind: &'static str,
        family: &'static str,
        value: String,
    },

    #[error("Unknown chain family: {0}")]
    UnknownChainFamily(String),

    #[error("Unknown classification type: {0}")]
    UnknownClassification(String),
}

/// Errors raised by a JSON-RPC transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("RPC call {method} timed out")]
    Timeout { method: String },

    #[error("HTTP {status} from RPC endpoint")]
    Http { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

/// Failure taxonomy shared by every ingestion stage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Malformed input, unknown chain or missing argument. Retrying will not help.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Hash or address does not match the chain family's syntax
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Transaction {hash} not found on {chain_alias}")]
    NotFound { chain_alias: String, hash: String },

    #[error("Transport error: {0}")]
    Transport(#[from] RpcError),

    /// Node answered but the payload could not be decoded
    #[error("Malformed chain data: {0}")]
    Decode(String),

    #[error("Token metadata unavailable for {token}: {reason}")]
    MetadataUnavailable { token: String, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl IngestError {
    /// Whether running the whole ingestion again later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::Transport(_) | IngestError::NotFound { .. } | IngestError::Persistence(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation",
            IngestError::InvalidFormat(_) => "invalid_format",
            IngestError::NotFound { .. } => "not_found",
            IngestError::Transport(_) => "transport",
            IngestError::Decode(_) => "decode",
            IngestError::MetadataUnavailable { .. } => "metadata_unavailable",
            IngestError::Persistence(_) => "persistence",
        }
    }
}

impl From<DomainError> for IngestError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidFormat { .. } => IngestError::InvalidFormat(err.to_string()),
            other => IngestError::Validation(other.to_string()),
        }
    }
}

impl RpcError {
    /// Transient failures are worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Timeout { .. } | RpcError::Transport(_) => true,
            RpcError::Http { status } => *status == 429 || *status >= 500,
            RpcError::Rpc { .. } | RpcError::InvalidResponse(_) => false,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, RpcError::Http { status: 429 })
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpcError::Timeout {
                method: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            }
        } else if let Some(status) = err.status() {
            RpcError::Http {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            RpcError::InvalidResponse(err.to_string())
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::InvalidResponse(err.to_string())
    }
}
