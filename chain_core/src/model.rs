use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chain::ChainFamily;
use crate::error::DomainError;

/// Serde helpers that keep arbitrary-precision integers as decimal strings
pub mod bigint_string {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BigUint::parse_bytes(raw.trim().as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("invalid integer string: {}", raw)))
    }
}

// =====================================
// Raw chain data
// =====================================

/// Chain-native transaction data, one variant per chain family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum RawTransaction {
    Evm(EvmRawTransaction),
    Svm(SvmRawTransaction),
}

impl RawTransaction {
    pub fn family(&self) -> ChainFamily {
        match self {
            RawTransaction::Evm(_) => ChainFamily::Evm,
            RawTransaction::Svm(_) => ChainFamily::Svm,
        }
    }

    pub fn chain_alias(&self) -> &str {
        match self {
            RawTransaction::Evm(tx) => &tx.chain_alias,
            RawTransaction::Svm(tx) => &tx.chain_alias,
        }
    }

    pub fn hash(&self) -> &str {
        match self {
            RawTransaction::Evm(tx) => &tx.envelope.hash,
            RawTransaction::Svm(tx) => &tx.signature,
        }
    }

    /// False when internal call data (trace, inner instructions) is incomplete
    pub fn has_full_internal_data(&self) -> bool {
        match self {
            RawTransaction::Evm(tx) => tx.has_full_internal_data,
            RawTransaction::Svm(tx) => tx.has_full_internal_data,
        }
    }
}

/// A fetched transaction plus whatever enrichment could not be obtained
#[derive(Debug, Clone)]
pub struct FetchedTransaction {
    pub raw: RawTransaction,
    pub warnings: Vec<DataWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmRawTransaction {
    pub chain_alias: String,
    pub envelope: EvmTransactionEnvelope,
    /// None while the transaction is pending
    pub receipt: Option<EvmReceipt>,
    /// Flattened call trace; None when the node does not support tracing
    pub trace: Option<Vec<EvmInternalCall>>,
    /// Token movements decoded from receipt logs, in log order
    pub token_transfers: Vec<EvmTokenTransfer>,
    pub has_full_internal_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmTransactionEnvelope {
    pub hash: String,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub from: String,
    pub to: Option<String>,
    #[serde(with = "bigint_string")]
    pub value: BigUint,
    /// Hex calldata including `0x`
    pub input: String,
    pub gas_price: Option<String>,
    pub nonce: u64,
}

impl EvmTransactionEnvelope {
    /// First four calldata bytes as lowercase hex with `0x`, if present
    pub fn selector(&self) -> Option<String> {
        let body = self.input.trim_start_matches("0x");
        if body.len() < 8 {
            return None;
        }
        Some(format!("0x{}", body[..8].to_lowercase()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmReceipt {
    /// None on pre-Byzantium receipts that carry a state root instead
    pub success: Option<bool>,
    #[serde(with = "bigint_string")]
    pub gas_used: BigUint,
    #[serde(with = "bigint_string")]
    pub effective_gas_price: BigUint,
    pub contract_address: Option<String>,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub block_timestamp: Option<i64>,
    pub logs: Vec<EvmLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvmLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub log_index: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvmTokenTransfer {
    pub standard: TokenStandard,
    /// Emitting contract, lowercased
    pub contract: String,
    pub from: String,
    pub to: String,
    #[serde(with = "bigint_string")]
    pub value: BigUint,
    pub token_id: Option<String>,
    pub log_index: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Call,
    StaticCall,
    DelegateCall,
    Create,
    SelfDestruct,
}

impl CallType {
    /// Map a tracer frame type; unknown types fall back to `Call`
    pub fn from_trace_type(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "create" | "create2" => CallType::Create,
            "staticcall" => CallType::StaticCall,
            "delegatecall" => CallType::DelegateCall,
            "selfdestruct" | "suicide" => CallType::SelfDestruct,
            _ => CallType::Call,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvmInternalCall {
    /// Depth-first position, strictly increasing across the flattened list
    pub trace_index: u32,
    /// 0 for the top-level call
    pub depth: u32,
    pub call_type: CallType,
    pub from: String,
    pub to: Option<String>,
    #[serde(with = "bigint_string")]
    pub value: BigUint,
    pub input: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmRawTransaction {
    pub chain_alias: String,
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub fee: u64,
    pub error: Option<String>,
    /// Static keys followed by loaded writable then readonly addresses
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<SvmTokenBalance>,
    pub post_token_balances: Vec<SvmTokenBalance>,
    /// Outer and inner instructions flattened in execution order
    pub instructions: Vec<SvmInstruction>,
    pub native_transfer: Option<SvmNativeTransfer>,
    pub token_transfers: Vec<SvmTokenTransfer>,
    pub has_full_internal_data: bool,
}

impl SvmRawTransaction {
    pub fn fee_payer(&self) -> Option<&str> {
        self.account_keys.first().map(String::as_str)
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SvmTokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    pub program_id: Option<String>,
    #[serde(with = "bigint_string")]
    pub amount: BigUint,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SvmInstruction {
    pub trace_index: u32,
    /// 0 for top-level instructions, CPI depth otherwise
    pub depth: u32,
    /// Index of the top-level instruction this one belongs to
    pub outer_index: usize,
    pub program_id: String,
    pub accounts: Vec<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SvmNativeTransfer {
    pub from: String,
    pub to: String,
    #[serde(with = "bigint_string")]
    pub amount: BigUint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SvmTokenTransfer {
    pub mint: String,
    /// Owner wallet of the debited token account, if known
    pub from: Option<String>,
    /// Owner wallet of the credited token account
    pub to: Option<String>,
    #[serde(with = "bigint_string")]
    pub amount: BigUint,
    pub decimals: u8,
}

// =====================================
// Canonical model
// =====================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
    Pending,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
            TxStatus::Pending => "pending",
        }
    }
}

/// Chain-independent transaction record. `value` and `fee` are integers in
/// the chain's smallest unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedTransaction {
    pub chain_alias: String,
    pub hash: String,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub from: String,
    pub to: Option<String>,
    #[serde(with = "bigint_string")]
    pub value: BigUint,
    #[serde(with = "bigint_string")]
    pub fee: BigUint,
    pub status: TxStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TokenStandard {
    Erc20,
    Erc721,
    Erc1155,
    Spl,
    /// Calldata-only transfer whose token standard could not be confirmed
    Unknown,
}

impl TokenStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStandard::Erc20 => "erc20",
            TokenStandard::Erc721 => "erc721",
            TokenStandard::Erc1155 => "erc1155",
            TokenStandard::Spl => "spl",
            TokenStandard::Unknown => "unknown",
        }
    }

    pub fn is_nft(&self) -> bool {
        matches!(self, TokenStandard::Erc721 | TokenStandard::Erc1155)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRef {
    pub address: String,
    pub token_id: Option<String>,
    pub standard: TokenStandard,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    In,
    Out,
}

impl TransferDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::In => "in",
            TransferDirection::Out => "out",
        }
    }
}

/// One value movement, with direction relative to the perspective address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParsedTransfer {
    Native {
        from: Option<String>,
        to: Option<String>,
        #[serde(with = "bigint_string")]
        amount: BigUint,
        direction: TransferDirection,
    },
    Token {
        from: Option<String>,
        to: Option<String>,
        #[serde(with = "bigint_string")]
        amount: BigUint,
        direction: TransferDirection,
        token: TokenRef,
    },
    Nft {
        from: Option<String>,
        to: Option<String>,
        #[serde(with = "bigint_string")]
        amount: BigUint,
        direction: TransferDirection,
        token: TokenRef,
    },
}

impl ParsedTransfer {
    pub fn from(&self) -> Option<&str> {
        match self {
            ParsedTransfer::Native { from, .. }
            | ParsedTransfer::Token { from, .. }
            | ParsedTransfer::Nft { from, .. } => from.as_deref(),
        }
    }

    pub fn to(&self) -> Option<&str> {
        match self {
            ParsedTransfer::Native { to, .. }
            | ParsedTransfer::Token { to, .. }
            | ParsedTransfer::Nft { to, .. } => to.as_deref(),
        }
    }

    pub fn amount(&self) -> &BigUint {
        match self {
            ParsedTransfer::Native { amount, .. }
            | ParsedTransfer::Token { amount, .. }
            | ParsedTransfer::Nft { amount, .. } => amount,
        }
    }

    pub fn direction(&self) -> TransferDirection {
        match self {
            ParsedTransfer::Native { direction, .. }
            | ParsedTransfer::Token { direction, .. }
            | ParsedTransfer::Nft { direction, .. } => *direction,
        }
    }

    pub fn token(&self) -> Option<&TokenRef> {
        match self {
            ParsedTransfer::Native { .. } => None,
            ParsedTransfer::Token { token, .. } | ParsedTransfer::Nft { token, .. } => Some(token),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, ParsedTransfer::Native { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParsedTransfer::Native { .. } => "native",
            ParsedTransfer::Token { .. } => "token",
            ParsedTransfer::Nft { .. } => "nft",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationType {
    Transfer,
    Swap,
    Mint,
    Burn,
    Stake,
    Approve,
    ContractDeploy,
    NftTransfer,
    Unknown,
}

impl ClassificationType {
    pub const ALL: [ClassificationType; 9] = [
        ClassificationType::Transfer,
        ClassificationType::Swap,
        ClassificationType::Mint,
        ClassificationType::Burn,
        ClassificationType::Stake,
        ClassificationType::Approve,
        ClassificationType::ContractDeploy,
        ClassificationType::NftTransfer,
        ClassificationType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationType::Transfer => "transfer",
            ClassificationType::Swap => "swap",
            ClassificationType::Mint => "mint",
            ClassificationType::Burn => "burn",
            ClassificationType::Stake => "stake",
            ClassificationType::Approve => "approve",
            ClassificationType::ContractDeploy => "contract_deploy",
            ClassificationType::NftTransfer => "nft_transfer",
            ClassificationType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ClassificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClassificationType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| DomainError::UnknownClassification(s.to_string()))
    }
}

/// Perspective-relative direction of a whole transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationDirection {
    In,
    Out,
    Neutral,
}

impl ClassificationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationDirection::In => "in",
            ClassificationDirection::Out => "out",
            ClassificationDirection::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationResult {
    #[serde(rename = "type")]
    pub classification_type: ClassificationType,
    pub direction: ClassificationDirection,
    pub confidence: Confidence,
    pub label: String,
    pub transfers: Vec<ParsedTransfer>,
}

impl ClassificationResult {
    /// Fallback for shapes no rule recognises
    pub fn unknown(transfers: Vec<ParsedTransfer>) -> Self {
        Self {
            classification_type: ClassificationType::Unknown,
            direction: ClassificationDirection::Neutral,
            confidence: Confidence::Low,
            label: "Unknown".to_string(),
            transfers,
        }
    }

    /// Distinct token contract / mint addresses referenced by transfers,
    /// in first-seen order
    pub fn token_addresses(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for transfer in &self.transfers {
            if let Some(token) = transfer.token() {
                if !seen.iter().any(|a: &String| a == &token.address) {
                    seen.push(token.address.clone());
                }
            }
        }
        seen
    }
}

/// Token metadata resolved independently of classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Enrichment that was missing. Not an error: ingestion still succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum DataWarning {
    TraceUnavailable { reason: String },
    TraceTruncated { max_depth: u32 },
    ReceiptPending,
    TokenMetadataUnavailable { token: String, reason: String },
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataWarning::TraceUnavailable { reason } => write!(f, "trace unavailable: {}", reason),
            DataWarning::TraceTruncated { max_depth } => {
                write!(f, "trace truncated at depth {}", max_depth)
            }
            DataWarning::ReceiptPending => f.write_str("receipt pending"),
            DataWarning::TokenMetadataUnavailable { token, reason } => {
                write!(f, "metadata unavailable for {}: {}", token, reason)
            }
        }
    }
}
