//! Solana JSON-RPC client: `getTransaction` assembly, transfer inference from
//! balance snapshots, instruction flattening and SPL mint metadata.

pub mod balance_diff;
pub mod error;
pub mod fetcher;
pub mod instructions;
pub mod metadata;
pub mod rpc_types;

pub use balance_diff::{infer_native_transfer, infer_token_transfers};
pub use error::{Result, SolanaClientError};
pub use fetcher::{SvmFetchOptions, SvmFetcher};
pub use instructions::{flatten_instructions, FlattenedInstructions};
pub use metadata::SvmTokenMetadataFetcher;

// =====================================
// Well-known program ids
// =====================================

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
pub const STAKE_PROGRAM_ID: &str = "Stake11111111111111111111111111111111111111";
/// SPL Token and Token-2022 share the instruction layout
pub const TOKEN_PROGRAM_IDS: &[&str] = &[TOKEN_PROGRAM_ID, TOKEN_2022_PROGRAM_ID];
