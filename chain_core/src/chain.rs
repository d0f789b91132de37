use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Base58 alphabet used by Solana (no `0`, `O`, `I`, `l`)
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Blockchain family. Every family-specific behaviour dispatches on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Account-model chains speaking the Ethereum JSON-RPC dialect
    Evm,
    /// Solana-style chains (balance snapshots + instruction lists)
    Svm,
}

impl ChainFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Svm => "svm",
        }
    }

    /// Check that `hash` matches this family's transaction hash syntax.
    ///
    /// EVM: `0x` followed by exactly 64 hex characters.
    /// SVM: base58 signature, 80 to 90 characters.
    pub fn is_valid_tx_hash(&self, hash: &str) -> bool {
        let hash = hash.trim();
        match self {
            ChainFamily::Evm => {
                let Some(body) = hash.strip_prefix("0x").or_else(|| hash.strip_prefix("0X")) else {
                    return false;
                };
                body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
            }
            ChainFamily::Svm => {
                (80..=90).contains(&hash.len()) && hash.chars().all(is_base58_char)
            }
        }
    }

    /// Check that `address` matches this family's account address syntax.
    pub fn is_valid_address(&self, address: &str) -> bool {
        let address = address.trim();
        match self {
            ChainFamily::Evm => {
                let Some(body) = address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) else {
                    return false;
                };
                body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit())
            }
            ChainFamily::Svm => {
                (32..=44).contains(&address.len()) && address.chars().all(is_base58_char)
            }
        }
    }

    /// Family-aware normalization: EVM identifiers are hex and compare
    /// case-insensitively, base58 identifiers are case-sensitive.
    pub fn normalize_identifier(&self, raw: &str) -> String {
        match self {
            ChainFamily::Evm => raw.trim().to_lowercase(),
            ChainFamily::Svm => raw.trim().to_string(),
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainFamily {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "evm" | "ethereum" | "account" => Ok(ChainFamily::Evm),
            "svm" | "solana" => Ok(ChainFamily::Svm),
            other => Err(DomainError::UnknownChainFamily(other.to_string())),
        }
    }
}

pub fn is_base58_char(c: char) -> bool {
    BASE58_ALPHABET.contains(c)
}

/// Static description of one configured chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Lowercased alias used for lookups and persistence (`eth`, `base`, `solana`)
    pub alias: String,
    pub family: ChainFamily,
    pub native_symbol: String,
    pub native_decimals: u8,
}

impl ChainSpec {
    pub fn new(alias: &str, family: ChainFamily, native_symbol: &str, native_decimals: u8) -> Self {
        Self {
            alias: normalize_alias(alias),
            family,
            native_symbol: native_symbol.to_string(),
            native_decimals,
        }
    }

    pub fn evm(alias: &str) -> Self {
        Self::new(alias, ChainFamily::Evm, "ETH", 18)
    }

    pub fn solana() -> Self {
        Self::new("solana", ChainFamily::Svm, "SOL", 9)
    }
}

pub fn normalize_alias(alias: &str) -> String {
    alias.trim().to_lowercase()
}
