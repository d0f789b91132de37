//! Immutable value objects shared by every ingestion stage.
//!
//! Fields are private; the only way to obtain a value is through a
//! validating constructor, so a value in hand is always well-formed.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::chain::{ChainFamily, ChainSpec};
use crate::error::DomainError;

/// A transaction hash (EVM) or signature (SVM) bound to one chain.
///
/// Equality and hashing use `(normalized, chain_alias)`: the same string on
/// two chains is two different hashes.
#[derive(Debug, Clone)]
pub struct TransactionHash {
    original: String,
    normalized: String,
    chain_alias: String,
    family: ChainFamily,
}

impl TransactionHash {
    /// Build a hash, rejecting empty or whitespace-only input
    pub fn create(raw: &str, chain: &ChainSpec) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Err(DomainError::Empty("transaction hash"));
        }
        Ok(Self {
            original: raw.to_string(),
            normalized: chain.family.normalize_identifier(raw),
            chain_alias: chain.alias.clone(),
            family: chain.family,
        })
    }

    /// Build a hash and additionally check the chain family's hash syntax
    pub fn parse(raw: &str, chain: &ChainSpec) -> Result<Self, DomainError> {
        let hash = Self::create(raw, chain)?;
        if !chain.family.is_valid_tx_hash(&hash.normalized) {
            return Err(DomainError::InvalidFormat {
                kind: "transaction hash",
                family: chain.family.as_str(),
                value: raw.trim().to_string(),
            });
        }
        Ok(hash)
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn chain_alias(&self) -> &str {
        &self.chain_alias
    }

    pub fn family(&self) -> ChainFamily {
        self.family
    }
}

impl PartialEq for TransactionHash {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized && self.chain_alias == other.chain_alias
    }
}

impl Eq for TransactionHash {}

impl Hash for TransactionHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
        self.chain_alias.hash(state);
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.original.trim())
    }
}

/// An account address bound to one chain.
///
/// Lookups and equality use the normalized form, display uses the original.
#[derive(Debug, Clone)]
pub struct ChainAddress {
    original: String,
    normalized: String,
    chain_alias: String,
}

impl ChainAddress {
    pub fn create(raw: &str, chain: &ChainSpec) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Err(DomainError::Empty("address"));
        }
        Ok(Self {
            original: raw.trim().to_string(),
            normalized: chain.family.normalize_identifier(raw),
            chain_alias: chain.alias.clone(),
        })
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn chain_alias(&self) -> &str {
        &self.chain_alias
    }

    /// Compare against a raw chain string, case-insensitively
    pub fn matches(&self, raw: &str) -> bool {
        self.normalized.eq_ignore_ascii_case(raw.trim())
    }
}

impl PartialEq for ChainAddress {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized && self.chain_alias == other.chain_alias
    }
}

impl Eq for ChainAddress {}

impl Hash for ChainAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
        self.chain_alias.hash(state);
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// An integer amount in a token's smallest unit plus its decimals.
///
/// Formatting is integer division and remainder on an arbitrary-precision
/// integer; floating point never touches the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    raw: BigUint,
    decimals: u8,
}

impl TokenAmount {
    /// Parse a non-negative base-10 integer string
    pub fn from_raw(raw: &str, decimals: u8) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidAmount {
                value: raw.to_string(),
                reason: "empty".to_string(),
            });
        }
        if trimmed.starts_with('-') {
            return Err(DomainError::InvalidAmount {
                value: raw.to_string(),
                reason: "negative".to_string(),
            });
        }
        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::InvalidAmount {
                value: raw.to_string(),
                reason: "not an integer".to_string(),
            });
        }
        let value = BigUint::parse_bytes(trimmed.as_bytes(), 10).ok_or_else(|| {
            DomainError::InvalidAmount {
                value: raw.to_string(),
                reason: "malformed".to_string(),
            }
        })?;
        Ok(Self {
            raw: value,
            decimals,
        })
    }

    pub fn from_units(raw: BigUint, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn raw(&self) -> &BigUint {
        &self.raw
    }

    pub fn raw_string(&self) -> String {
        self.raw.to_str_radix(10)
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Human-readable amount with trailing fractional zeros removed
    pub fn formatted(&self) -> String {
        if self.decimals == 0 {
            return self.raw_string();
        }
        let scale = BigUint::from(10u32).pow(u32::from(self.decimals));
        let whole = &self.raw / &scale;
        let fraction = &self.raw % &scale;
        if fraction.is_zero() {
            return whole.to_str_radix(10);
        }
        let padded = format!(
            "{:0>width$}",
            fraction.to_str_radix(10),
            width = usize::from(self.decimals)
        );
        format!("{}.{}", whole, padded.trim_end_matches('0'))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw_string())
    }
}
