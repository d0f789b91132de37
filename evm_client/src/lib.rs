//! EVM JSON-RPC client: transaction assembly, event-log decoding, call-trace
//! flattening and ERC20 metadata lookups.

pub mod abi;
pub mod error;
pub mod fetcher;
pub mod logs;
pub mod metadata;
pub mod rpc_types;
pub mod trace;

pub use error::{EvmClientError, Result};
pub use fetcher::{EvmFetchOptions, EvmFetcher};
pub use logs::{decode_transfer_logs, has_approval_log, has_erc20_transfer_log};
pub use metadata::EvmTokenMetadataFetcher;
pub use trace::{flatten_call_trace, FlattenedTrace};
