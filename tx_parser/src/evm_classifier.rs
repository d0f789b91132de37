use chain_core::{
    BigUint, CallType, ClassificationResult, ClassificationType, Confidence, EvmRawTransaction,
    EvmTokenTransfer, ParsedTransfer, TokenRef, TokenStandard, EVM_ZERO_ADDRESS,
};
use evm_client::abi::{
    calldata_args, word, word_to_address, word_to_biguint, APPROVE_SELECTOR,
    SET_APPROVAL_FOR_ALL_SELECTOR, STAKE_AMOUNT_SELECTOR, STAKE_SELECTOR, SUBMIT_SELECTOR,
    TRANSFER_FROM_SELECTOR, TRANSFER_SELECTOR, UNSTAKE_SELECTOR,
};
use evm_client::{has_approval_log, has_erc20_transfer_log};
use num_traits::Zero;
use tracing::debug;

use crate::context::{classified, ClassifyContext};
use crate::direction::{transfer_direction, AssetFlows};

/// Pattern-matching classifier for EVM transactions.
///
/// Rules are tried in order; the first match wins and anything
/// unrecognised falls through to `unknown` with low confidence.
#[derive(Debug, Clone, Default)]
pub struct EvmClassifier;

impl EvmClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, tx: &EvmRawTransaction, ctx: &ClassifyContext) -> ClassificationResult {
        let perspective = ctx.perspective_address.as_str();
        let selector = tx.envelope.selector();
        let reverted = tx.receipt.as_ref().and_then(|r| r.success) == Some(false);
        let logs = tx.receipt.as_ref().map(|r| r.logs.as_slice()).unwrap_or_default();

        // A reverted transaction moved nothing
        let mut transfers = if reverted {
            Vec::new()
        } else {
            collect_transfers(tx, perspective)
        };

        let mut calldata_confidence = None;
        if transfers.iter().all(|t| t.is_native()) && !reverted {
            if let Some((transfer, confidence)) = calldata_transfer(tx, perspective) {
                transfers.push(transfer);
                calldata_confidence = Some(confidence);
            }
        }

        let fungible = transfers
            .iter()
            .filter(|t| matches!(t, ParsedTransfer::Token { .. }))
            .count();
        let nfts = transfers
            .iter()
            .filter(|t| matches!(t, ParsedTransfer::Nft { .. }))
            .count();
        let natives = transfers.len() - fungible - nfts;
        let token_moves: Vec<&ParsedTransfer> =
            transfers.iter().filter(|t| !t.is_native()).collect();

        debug!(
            "Classifying EVM tx {}: {} native, {} token, {} nft transfers, selector {:?}",
            tx.envelope.hash, natives, fungible, nfts, selector
        );

        if tx.envelope.to.is_none() {
            return classified(
                ClassificationType::ContractDeploy,
                Confidence::High,
                "Contract Deployment",
                transfers,
                ctx,
            );
        }

        match selector.as_deref() {
            Some(APPROVE_SELECTOR) => {
                return classified(ClassificationType::Approve, Confidence::High, "Token Approval", transfers, ctx);
            }
            Some(SET_APPROVAL_FOR_ALL_SELECTOR) => {
                return classified(ClassificationType::Approve, Confidence::High, "NFT Approval For All", transfers, ctx);
            }
            Some(STAKE_AMOUNT_SELECTOR) | Some(STAKE_SELECTOR) | Some(SUBMIT_SELECTOR) => {
                return classified(ClassificationType::Stake, Confidence::Medium, "Stake", transfers, ctx);
            }
            Some(UNSTAKE_SELECTOR) => {
                return classified(ClassificationType::Stake, Confidence::Medium, "Unstake", transfers, ctx);
            }
            _ => {}
        }

        if reverted {
            return classified(
                ClassificationType::Unknown,
                Confidence::Low,
                "Failed Transaction",
                transfers,
                ctx,
            );
        }

        if !token_moves.is_empty() && token_moves.iter().all(|t| is_zero(t.from())) {
            let label = if nfts > 0 { "NFT Mint" } else { "Token Mint" };
            return classified(ClassificationType::Mint, Confidence::High, label, transfers, ctx);
        }
        if !token_moves.is_empty() && token_moves.iter().all(|t| is_zero(t.to())) {
            let label = if nfts > 0 { "NFT Burn" } else { "Token Burn" };
            return classified(ClassificationType::Burn, Confidence::High, label, transfers, ctx);
        }

        if AssetFlows::for_address(&transfers, perspective).is_swap() {
            return classified(ClassificationType::Swap, Confidence::High, "Swap", transfers, ctx);
        }

        if nfts > 0 && fungible == 0 {
            return classified(ClassificationType::NftTransfer, Confidence::High, "NFT Transfer", transfers, ctx);
        }

        if fungible > 0 {
            let confidence = calldata_confidence.unwrap_or(Confidence::High);
            let label = if fungible == 1 { "Token Transfer" } else { "Token Transfers" };
            return classified(ClassificationType::Transfer, confidence, label, transfers, ctx);
        }

        if natives > 0 {
            return classified(ClassificationType::Transfer, Confidence::High, "Native Transfer", transfers, ctx);
        }

        if has_approval_log(logs) {
            return classified(ClassificationType::Approve, Confidence::Medium, "Token Approval", transfers, ctx);
        }

        ClassificationResult::unknown(transfers)
    }
}

fn is_zero(address: Option<&str>) -> bool {
    address.is_some_and(|a| a.eq_ignore_ascii_case(EVM_ZERO_ADDRESS))
}

/// Native value of the envelope, value-bearing internal calls, then decoded logs
fn collect_transfers(tx: &EvmRawTransaction, perspective: &str) -> Vec<ParsedTransfer> {
    let mut transfers = Vec::new();

    if !tx.envelope.value.is_zero() {
        let to = tx
            .envelope
            .to
            .clone()
            .or_else(|| tx.receipt.as_ref().and_then(|r| r.contract_address.clone()));
        transfers.push(native(Some(tx.envelope.from.clone()), to, tx.envelope.value.clone(), perspective));
    }

    if let Some(trace) = &tx.trace {
        // The root frame repeats the envelope's own value
        for call in trace.iter().filter(|c| c.depth > 0) {
            let moves_value = matches!(
                call.call_type,
                CallType::Call | CallType::Create | CallType::SelfDestruct
            );
            if moves_value && call.error.is_none() && !call.value.is_zero() {
                transfers.push(native(
                    Some(call.from.clone()),
                    call.to.clone(),
                    call.value.clone(),
                    perspective,
                ));
            }
        }
    }

    transfers.extend(tx.token_transfers.iter().map(|t| token_transfer(t, perspective)));
    transfers
}

fn native(from: Option<String>, to: Option<String>, amount: BigUint, perspective: &str) -> ParsedTransfer {
    ParsedTransfer::Native {
        direction: transfer_direction(to.as_deref(), perspective),
        from,
        to,
        amount,
    }
}

fn token_transfer(transfer: &EvmTokenTransfer, perspective: &str) -> ParsedTransfer {
    let token = TokenRef {
        address: transfer.contract.clone(),
        token_id: transfer.token_id.clone(),
        standard: transfer.standard,
    };
    let from = Some(transfer.from.clone());
    let to = Some(transfer.to.clone());
    let direction = transfer_direction(to.as_deref(), perspective);
    if transfer.standard.is_nft() {
        ParsedTransfer::Nft {
            from,
            to,
            amount: transfer.value.clone(),
            direction,
            token,
        }
    } else {
        ParsedTransfer::Token {
            from,
            to,
            amount: transfer.value.clone(),
            direction,
            token,
        }
    }
}

/// Decode `transfer` / `transferFrom` calldata when no log describes the movement.
///
/// `transferFrom` shares its selector between ERC20 and ERC721, so it is only
/// treated as ERC20 when the contract also emitted a 3-topic `Transfer` log;
/// otherwise the standard stays unknown and confidence drops to low.
fn calldata_transfer(tx: &EvmRawTransaction, perspective: &str) -> Option<(ParsedTransfer, Confidence)> {
    let contract = tx.envelope.to.clone()?;
    let selector = tx.envelope.selector()?;
    let args = calldata_args(&tx.envelope.input)?;
    let logs = tx.receipt.as_ref().map(|r| r.logs.as_slice()).unwrap_or_default();

    let (from, to, amount, standard, confidence) = match selector.as_str() {
        TRANSFER_SELECTOR => (
            tx.envelope.from.clone(),
            word_to_address(word(&args, 0)?)?,
            word_to_biguint(word(&args, 1)?),
            TokenStandard::Erc20,
            Confidence::Medium,
        ),
        TRANSFER_FROM_SELECTOR => {
            let confirmed = has_erc20_transfer_log(logs, &contract);
            (
                word_to_address(word(&args, 0)?)?,
                word_to_address(word(&args, 1)?)?,
                word_to_biguint(word(&args, 2)?),
                if confirmed { TokenStandard::Erc20 } else { TokenStandard::Unknown },
                if confirmed { Confidence::Medium } else { Confidence::Low },
            )
        }
        _ => return None,
    };

    debug!(
        "Decoded {} calldata on {} as {:?} transfer",
        selector, contract, standard
    );
    let direction = transfer_direction(Some(&to), perspective);
    Some((
        ParsedTransfer::Token {
            from: Some(from),
            to: Some(to),
            amount,
            direction,
            token: TokenRef {
                address: contract.to_lowercase(),
                token_id: None,
                standard,
            },
        },
        confidence,
    ))
}
