//! Shared types for multi-chain transaction ingestion: chain families,
//! value objects, the raw and canonical data model, and the JSON-RPC seam
//! every chain client talks through.

pub mod chain;
pub mod error;
pub mod model;
pub mod rpc;
pub mod values;

pub use chain::{normalize_alias, ChainFamily, ChainSpec};
pub use error::{DomainError, IngestError, RpcError};
pub use model::*;
pub use rpc::{call_with_timeout, FixtureTransport, HttpRpcTransport, RpcTransport};
pub use values::{ChainAddress, TokenAmount, TransactionHash};

/// Re-exported so dependents share one big-integer type
pub use num_bigint::{BigInt, BigUint};

/// Sender of EVM mints and recipient of EVM burns
pub const EVM_ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
