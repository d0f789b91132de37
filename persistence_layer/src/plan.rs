//! Row-level description of one idempotent upsert, computed before any I/O so
//! every store applies exactly the same writes.

use chain_core::{
    ChainFamily, ClassificationResult, NormalizedTransaction, ParsedTransfer, TokenInfo,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tx_parser::{calculate_direction, AssetFlows};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRow {
    pub chain_alias: String,
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub chain_alias: String,
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub block_timestamp: Option<DateTime<Utc>>,
    pub from_address: String,
    pub to_address: Option<String>,
    /// Integer string in the chain's smallest unit
    pub value: String,
    pub fee: String,
    pub status: String,
    pub classification_type: String,
    pub classification_direction: String,
    pub classification_confidence: String,
    pub classification_label: String,
    pub has_full_internal_data: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTransferRow {
    pub transfer_index: u32,
    pub chain_alias: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransferRow {
    pub transfer_index: u32,
    pub chain_alias: String,
    pub token_address: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: String,
    /// `token` or `nft`
    pub transfer_type: String,
    /// Token standard and token id
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLinkRow {
    pub address: String,
    pub chain_alias: String,
    pub has_native_transfer: bool,
    pub has_token_transfer: bool,
    /// Signed net native amount received by `address`
    pub total_value: String,
    pub direction: String,
}

/// Caller-side options for an upsert
#[derive(Debug, Clone)]
pub struct UpsertOptions {
    pub family: ChainFamily,
    /// Always linked, even when it appears in no transfer
    pub for_address: Option<String>,
    pub has_full_internal_data: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPlan {
    pub tokens: Vec<TokenRow>,
    pub transaction: TransactionRow,
    pub native_transfers: Vec<NativeTransferRow>,
    pub token_transfers: Vec<TokenTransferRow>,
    pub address_links: Vec<AddressLinkRow>,
}

impl UpsertPlan {
    pub fn build(
        normalized: &NormalizedTransaction,
        classification: &ClassificationResult,
        tokens: &[TokenInfo],
        options: &UpsertOptions,
    ) -> Self {
        let family = options.family;
        let norm = |raw: &str| family.normalize_identifier(raw);
        let chain_alias = normalized.chain_alias.clone();

        let mut token_rows: Vec<TokenRow> = Vec::new();
        for token in tokens {
            let address = norm(&token.address);
            if token_rows.iter().any(|t| t.address == address) {
                continue;
            }
            token_rows.push(TokenRow {
                chain_alias: chain_alias.clone(),
                address,
                name: token.name.clone(),
                symbol: token.symbol.clone(),
                decimals: token.decimals,
            });
        }

        let transaction = TransactionRow {
            chain_alias: chain_alias.clone(),
            tx_hash: norm(&normalized.hash),
            block_number: normalized.block_number,
            block_hash: normalized.block_hash.clone(),
            block_timestamp: normalized.timestamp,
            from_address: norm(&normalized.from),
            to_address: normalized.to.as_deref().map(norm),
            value: normalized.value.to_string(),
            fee: normalized.fee.to_string(),
            status: normalized.status.as_str().to_string(),
            classification_type: classification.classification_type.as_str().to_string(),
            classification_direction: classification.direction.as_str().to_string(),
            classification_confidence: classification.confidence.as_str().to_string(),
            classification_label: classification.label.clone(),
            has_full_internal_data: options.has_full_internal_data,
        };

        let mut native_transfers = Vec::new();
        let mut token_transfers = Vec::new();
        for (index, transfer) in classification.transfers.iter().enumerate() {
            let transfer_index = index as u32;
            let from_address = transfer.from().map(norm);
            let to_address = transfer.to().map(norm);
            let amount = transfer.amount().to_string();
            match transfer.token() {
                None => native_transfers.push(NativeTransferRow {
                    transfer_index,
                    chain_alias: chain_alias.clone(),
                    from_address,
                    to_address,
                    amount,
                }),
                Some(token) => token_transfers.push(TokenTransferRow {
                    transfer_index,
                    chain_alias: chain_alias.clone(),
                    token_address: norm(&token.address),
                    from_address,
                    to_address,
                    amount,
                    transfer_type: transfer.kind().to_string(),
                    metadata: json!({
                        "standard": token.standard.as_str(),
                        "token_id": token.token_id,
                    }),
                }),
            }
        }

        let address_links = touched_addresses(normalized, &classification.transfers, options)
            .into_iter()
            .map(|address| link_for(&address, &chain_alias, classification, family))
            .collect();

        Self {
            tokens: token_rows,
            transaction,
            native_transfers,
            token_transfers,
            address_links,
        }
    }
}

/// `from`, `to`, every transfer endpoint and `for_address`, deduplicated on
/// the normalized form in first-seen order
fn touched_addresses(
    normalized: &NormalizedTransaction,
    transfers: &[ParsedTransfer],
    options: &UpsertOptions,
) -> Vec<String> {
    let candidates = std::iter::once(Some(normalized.from.as_str()))
        .chain(std::iter::once(normalized.to.as_deref()))
        .chain(transfers.iter().flat_map(|t| [t.from(), t.to()]))
        .chain(std::iter::once(options.for_address.as_deref()))
        .flatten();

    let mut addresses: Vec<String> = Vec::new();
    for candidate in candidates {
        let address = options.family.normalize_identifier(candidate);
        if !address.is_empty() && !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    addresses
}

fn link_for(
    address: &str,
    chain_alias: &str,
    classification: &ClassificationResult,
    family: ChainFamily,
) -> AddressLinkRow {
    let transfers = &classification.transfers;
    let touches = |t: &ParsedTransfer| {
        [t.from(), t.to()]
            .into_iter()
            .flatten()
            .any(|endpoint| family.normalize_identifier(endpoint) == address)
    };

    AddressLinkRow {
        address: address.to_string(),
        chain_alias: chain_alias.to_string(),
        has_native_transfer: transfers.iter().any(|t| t.is_native() && touches(t)),
        has_token_transfer: transfers.iter().any(|t| !t.is_native() && touches(t)),
        total_value: AssetFlows::for_address(transfers, address)
            .native_net()
            .to_string(),
        direction: calculate_direction(classification.classification_type, transfers, address)
            .as_str()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::{
        BigUint, ClassificationDirection, ClassificationType, Confidence, TokenRef,
        TokenStandard, TransferDirection, TxStatus,
    };

    const SENDER: &str = "0xAAAA000000000000000000000000000000000001";
    const RECEIVER: &str = "0xbbbb000000000000000000000000000000000002";
    const TOKEN: &str = "0xCCCC000000000000000000000000000000000003";
    const DEPLOYER_VIEW: &str = "0xdddd000000000000000000000000000000000004";

    fn normalized() -> NormalizedTransaction {
        NormalizedTransaction {
            chain_alias: "eth".into(),
            hash: "0xABCDEF".into(),
            block_number: Some(10),
            block_hash: Some("0xb10".into()),
            timestamp: None,
            from: SENDER.into(),
            to: Some(TOKEN.into()),
            value: BigUint::from(5u32),
            fee: BigUint::from(21_000u32),
            status: TxStatus::Success,
        }
    }

    fn classification() -> ClassificationResult {
        ClassificationResult {
            classification_type: ClassificationType::Transfer,
            direction: ClassificationDirection::Out,
            confidence: Confidence::High,
            label: "Token Transfer".into(),
            transfers: vec![
                ParsedTransfer::Native {
                    from: Some(SENDER.into()),
                    to: Some(TOKEN.into()),
                    amount: BigUint::from(5u32),
                    direction: TransferDirection::Out,
                },
                ParsedTransfer::Token {
                    from: Some(SENDER.into()),
                    to: Some(RECEIVER.into()),
                    amount: BigUint::from(1_000u32),
                    direction: TransferDirection::Out,
                    token: TokenRef {
                        address: TOKEN.to_lowercase(),
                        token_id: None,
                        standard: TokenStandard::Erc20,
                    },
                },
            ],
        }
    }

    fn options(for_address: Option<&str>) -> UpsertOptions {
        UpsertOptions {
            family: ChainFamily::Evm,
            for_address: for_address.map(str::to_string),
            has_full_internal_data: true,
        }
    }

    #[test]
    fn test_rows_are_normalized_and_split_by_kind() {
        let token = TokenInfo {
            address: TOKEN.into(),
            name: "Coin".into(),
            symbol: "C".into(),
            decimals: 6,
        };
        let plan = UpsertPlan::build(&normalized(), &classification(), &[token.clone(), token], &options(None));

        assert_eq!(plan.tokens.len(), 1);
        assert_eq!(plan.tokens[0].address, TOKEN.to_lowercase());
        assert_eq!(plan.transaction.tx_hash, "0xabcdef");
        assert_eq!(plan.transaction.from_address, SENDER.to_lowercase());
        assert_eq!(plan.transaction.status, "success");
        assert_eq!(plan.transaction.classification_type, "transfer");

        assert_eq!(plan.native_transfers.len(), 1);
        assert_eq!(plan.native_transfers[0].transfer_index, 0);
        assert_eq!(plan.token_transfers.len(), 1);
        assert_eq!(plan.token_transfers[0].transfer_index, 1);
        assert_eq!(plan.token_transfers[0].transfer_type, "token");
        assert_eq!(plan.token_transfers[0].metadata["standard"], "erc20");
    }

    #[test]
    fn test_links_cover_every_touched_address_once() {
        let plan = UpsertPlan::build(&normalized(), &classification(), &[], &options(Some(DEPLOYER_VIEW)));
        let addresses: Vec<&str> = plan.address_links.iter().map(|l| l.address.as_str()).collect();
        assert_eq!(
            addresses,
            vec![
                SENDER.to_lowercase().as_str(),
                TOKEN.to_lowercase().as_str(),
                RECEIVER,
                DEPLOYER_VIEW
            ]
        );

        let sender = &plan.address_links[0];
        assert_eq!(sender.direction, "out");
        assert!(sender.has_native_transfer);
        assert!(sender.has_token_transfer);
        assert_eq!(sender.total_value, "-5");

        let token_contract = &plan.address_links[1];
        assert_eq!(token_contract.direction, "in");
        assert!(token_contract.has_native_transfer);
        assert!(!token_contract.has_token_transfer);
        assert_eq!(token_contract.total_value, "5");

        let receiver = &plan.address_links[2];
        assert_eq!(receiver.direction, "in");
        assert!(!receiver.has_native_transfer);
        assert!(receiver.has_token_transfer);
        assert_eq!(receiver.total_value, "0");

        let bystander = &plan.address_links[3];
        assert_eq!(bystander.direction, "neutral");
        assert!(!bystander.has_native_transfer && !bystander.has_token_transfer);
    }

    #[test]
    fn test_svm_addresses_keep_case() {
        let mut tx = normalized();
        tx.chain_alias = "solana".into();
        tx.hash = "5VERv8NMvzbJ".into();
        tx.from = "9WzDXwBbmkg8".into();
        tx.to = None;
        let mut classification = classification();
        classification.transfers.truncate(0);
        let options = UpsertOptions {
            family: ChainFamily::Svm,
            for_address: None,
            has_full_internal_data: false,
        };
        let plan = UpsertPlan::build(&tx, &classification, &[], &options);
        assert_eq!(plan.transaction.tx_hash, "5VERv8NMvzbJ");
        assert_eq!(plan.address_links.len(), 1);
        assert_eq!(plan.address_links[0].address, "9WzDXwBbmkg8");
        assert!(!plan.transaction.has_full_internal_data);
    }
}
