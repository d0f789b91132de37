use chain_core::{
    BigUint, ClassificationResult, ClassificationType, Confidence, ParsedTransfer,
    SvmInstruction, SvmRawTransaction, SvmTokenTransfer, TokenRef, TokenStandard,
};
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use solana_client::{STAKE_PROGRAM_ID, TOKEN_PROGRAM_IDS};
use tracing::{debug, trace};

use crate::context::{classified, ClassifyContext};
use crate::direction::{transfer_direction, AssetFlows};

/// Aggregator and AMM programs whose presence marks a swap
pub const DEX_PROGRAM_IDS: &[&str] = &[
    "JSW99DKmxNyREQM14SQLDykeBvEUG63TeohrvmofEiw",
    "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
    "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB",
    "DCA265Vj8a9CEuX1eb1LWRnDT7uK6q1xMipnNyatn23M",
    "j1o2qRpjcyUwEvwtcfhEQefh773ZgjxcVRry7LDqg5X",
    "6LtLpnUFNByNXLyCoK9wA2MykKAmQNZKBdY8s47dehDc",
    "2wT8Yq49kHgDzXuPxZSaeLaH1qbmGXtEyPy64bL7aD3c",
    "EewxydAPCCVuNEyrVN68PuSYdQ7wKn27V9Gjeoi8dy3S",
    "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo",
    "Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB",
    "opnb2LAfJYbRMAHHvqjCwQxanZn7ReEHp1k81EohpZb",
    "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
    "DjVE6JNiYqPL2QXyCUUh8rNjHrbz9hXHNYt99MQ59qw1",
    "9W959DqEETiGZocYWCQPaJ6sBmUzgfxXfqGeTEdp3aQP",
    "PhoeNiXZ8ByJGLkxNfZRnkUfjvmuYqLR89jjFHGqdXY",
    "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P",
    "pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA",
    "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8",
    "5quBtoiQqxF9Jv6KYKctB59NT3gtJD2Y65kdnB1Uev3h",
    "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK",
    "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C",
    "5ocnV1qiCgaQR8Jb8xWnVbApfaygJ8tNoZfgPwsgx9kx",
    "swapNyd8XiQwJ6ianp9snpu4brUqFxadzvHebnAXjJZ",
    "swapFpHWwjELNnjvThjajtiVmkz3yPQEHjLtka2fwHW",
];

/// Liquid staking pools (Marinade, Jito, Sanctum)
pub const LIQUID_STAKING_PROGRAM_IDS: &[&str] = &[
    "MarBmsSgKXdrN1egZf5sqe1TMai9K1rChYNDJgjq7aD",
    "SPoo1Ku8WFXoNDMHPsrGSTSG1Y47rzgn41SLUNakuHy",
    "stkitrT1Uoy18Dk1fTrgPw8W6MVzoCfYoAFT4MLsmhq",
];

// SPL token instruction tags (first data byte)
const IX_APPROVE: u8 = 4;
const IX_MINT_TO: u8 = 7;
const IX_BURN: u8 = 8;
const IX_APPROVE_CHECKED: u8 = 13;
const IX_MINT_TO_CHECKED: u8 = 14;
const IX_BURN_CHECKED: u8 = 15;

/// Program lists the SVM classifier matches against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub dex_programs: Vec<String>,
    pub liquid_staking_programs: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            dex_programs: DEX_PROGRAM_IDS.iter().map(|p| p.to_string()).collect(),
            liquid_staking_programs: LIQUID_STAKING_PROGRAM_IDS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// What the instruction list says about a transaction
#[derive(Debug, Default)]
struct InstructionSignals<'a> {
    approve: bool,
    stake: bool,
    dex: bool,
    /// Mints targeted by MintTo
    minted: Vec<&'a str>,
    /// Mints targeted by Burn
    burned: Vec<&'a str>,
}

/// Classifier for Solana-family transactions, driven by balance-inferred
/// transfers plus a handful of well-known programs.
#[derive(Debug, Clone, Default)]
pub struct SvmClassifier {
    config: ParserConfig,
}

impl SvmClassifier {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn classify(&self, tx: &SvmRawTransaction, ctx: &ClassifyContext) -> ClassificationResult {
        let perspective = ctx.perspective_address.as_str();

        if !tx.succeeded() {
            return classified(
                ClassificationType::Unknown,
                Confidence::Low,
                "Failed Transaction",
                Vec::new(),
                ctx,
            );
        }

        let signals = self.scan_instructions(&tx.instructions);
        let mut transfers = collect_transfers(tx, perspective);
        let burns = derive_burns(tx, &signals.burned, perspective);
        transfers.extend(burns.iter().cloned());

        let token_moves: Vec<&ParsedTransfer> =
            transfers.iter().filter(|t| !t.is_native()).collect();
        let nfts = token_moves
            .iter()
            .filter(|t| matches!(t, ParsedTransfer::Nft { .. }))
            .count();

        debug!(
            "Classifying SVM tx {}: {} transfers ({} nft), signals {:?}",
            tx.signature,
            transfers.len(),
            nfts,
            signals
        );

        if signals.stake {
            let received = transfers
                .iter()
                .any(|t| t.to().is_some_and(|to| to == perspective));
            let sent = transfers
                .iter()
                .any(|t| t.from().is_some_and(|from| from == perspective));
            let label = if received && !sent { "Unstake" } else { "Stake" };
            return classified(ClassificationType::Stake, Confidence::Medium, label, transfers, ctx);
        }

        if signals.approve && token_moves.is_empty() {
            return classified(ClassificationType::Approve, Confidence::High, "Token Approval", transfers, ctx);
        }

        let mints: Vec<&ParsedTransfer> = token_moves
            .iter()
            .copied()
            .filter(|t| {
                t.from().is_none()
                    && t.token()
                        .is_some_and(|token| signals.minted.contains(&token.address.as_str()))
            })
            .collect();
        if !mints.is_empty() {
            let label = if mints.iter().any(|t| matches!(t, ParsedTransfer::Nft { .. })) {
                "NFT Mint"
            } else {
                "Token Mint"
            };
            return classified(ClassificationType::Mint, Confidence::High, label, transfers, ctx);
        }

        if !burns.is_empty() {
            return classified(ClassificationType::Burn, Confidence::High, "Token Burn", transfers, ctx);
        }

        let flows = AssetFlows::for_address(&transfers, perspective);
        if flows.is_swap() {
            return classified(ClassificationType::Swap, Confidence::High, "Swap", transfers, ctx);
        }
        let moved_tokens = flows
            .net
            .iter()
            .any(|(asset, net)| asset != "native" && !net.is_zero());
        if signals.dex && moved_tokens {
            // One leg is likely hidden in an intermediate account
            return classified(ClassificationType::Swap, Confidence::Medium, "Swap", transfers, ctx);
        }

        if nfts > 0 && nfts == token_moves.len() {
            return classified(ClassificationType::NftTransfer, Confidence::High, "NFT Transfer", transfers, ctx);
        }

        if !token_moves.is_empty() {
            return classified(ClassificationType::Transfer, Confidence::High, "Token Transfer", transfers, ctx);
        }

        if !transfers.is_empty() {
            return classified(ClassificationType::Transfer, Confidence::High, "Native Transfer", transfers, ctx);
        }

        ClassificationResult::unknown(transfers)
    }

    fn scan_instructions<'a>(&self, instructions: &'a [SvmInstruction]) -> InstructionSignals<'a> {
        let mut signals = InstructionSignals::default();
        for ix in instructions {
            let program = ix.program_id.as_str();
            if program == STAKE_PROGRAM_ID
                || self.config.liquid_staking_programs.iter().any(|p| p == program)
            {
                signals.stake = true;
            }
            if self.config.dex_programs.iter().any(|p| p == program) {
                signals.dex = true;
            }
            if !TOKEN_PROGRAM_IDS.contains(&program) {
                continue;
            }
            match ix.data.first().copied() {
                Some(IX_APPROVE) | Some(IX_APPROVE_CHECKED) => signals.approve = true,
                Some(IX_MINT_TO) | Some(IX_MINT_TO_CHECKED) => {
                    if let Some(mint) = ix.accounts.first() {
                        signals.minted.push(mint.as_str());
                    }
                }
                Some(IX_BURN) | Some(IX_BURN_CHECKED) => {
                    if let Some(mint) = ix.accounts.get(1) {
                        signals.burned.push(mint.as_str());
                    }
                }
                Some(tag) => trace!("Token instruction tag {} at {}", tag, ix.trace_index),
                None => {}
            }
        }
        signals
    }
}

fn collect_transfers(tx: &SvmRawTransaction, perspective: &str) -> Vec<ParsedTransfer> {
    let mut transfers = Vec::new();
    if let Some(native) = &tx.native_transfer {
        transfers.push(ParsedTransfer::Native {
            from: Some(native.from.clone()),
            to: Some(native.to.clone()),
            amount: native.amount.clone(),
            direction: transfer_direction(Some(&native.to), perspective),
        });
    }
    transfers.extend(tx.token_transfers.iter().map(|t| token_transfer(tx, t, perspective)));
    transfers
}

/// Whole units of a zero-decimal mint count as NFTs
fn is_nft(tx: &SvmRawTransaction, transfer: &SvmTokenTransfer) -> bool {
    if transfer.decimals != 0 {
        return false;
    }
    let held_after = tx
        .post_token_balances
        .iter()
        .filter(|b| b.mint == transfer.mint && b.owner == transfer.to)
        .map(|b| b.amount.clone())
        .max()
        .unwrap_or_else(BigUint::zero);
    held_after <= BigUint::one()
}

fn token_transfer(tx: &SvmRawTransaction, transfer: &SvmTokenTransfer, perspective: &str) -> ParsedTransfer {
    let token = TokenRef {
        address: transfer.mint.clone(),
        token_id: None,
        standard: TokenStandard::Spl,
    };
    let direction = transfer_direction(transfer.to.as_deref(), perspective);
    if is_nft(tx, transfer) {
        ParsedTransfer::Nft {
            from: transfer.from.clone(),
            to: transfer.to.clone(),
            amount: transfer.amount.clone(),
            direction,
            token,
        }
    } else {
        ParsedTransfer::Token {
            from: transfer.from.clone(),
            to: transfer.to.clone(),
            amount: transfer.amount.clone(),
            direction,
            token,
        }
    }
}

/// Burns never show up as a receiving balance, so rebuild them from the
/// decrease on accounts of each burned mint
fn derive_burns(tx: &SvmRawTransaction, burned: &[&str], perspective: &str) -> Vec<ParsedTransfer> {
    let mut burns = Vec::new();
    for mint in burned {
        for before in tx.pre_token_balances.iter().filter(|b| b.mint == *mint) {
            let after = tx
                .post_token_balances
                .iter()
                .find(|b| b.account_index == before.account_index)
                .map(|b| b.amount.clone())
                .unwrap_or_else(BigUint::zero);
            if after >= before.amount {
                continue;
            }
            burns.push(ParsedTransfer::Token {
                from: before.owner.clone(),
                to: None,
                amount: &before.amount - &after,
                direction: transfer_direction(None, perspective),
                token: TokenRef {
                    address: before.mint.clone(),
                    token_id: None,
                    standard: TokenStandard::Spl,
                },
            });
        }
    }
    burns
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::{ClassificationDirection, SvmNativeTransfer, SvmTokenBalance};
    use solana_client::{SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};

    const WALLET: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const OTHER: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
    const JUPITER: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

    fn tx() -> SvmRawTransaction {
        SvmRawTransaction {
            chain_alias: "solana".into(),
            signature: "sig".into(),
            slot: 1,
            block_time: Some(1_700_000_000),
            fee: 5000,
            error: None,
            account_keys: vec![WALLET.into(), OTHER.into()],
            pre_balances: vec![],
            post_balances: vec![],
            pre_token_balances: vec![],
            post_token_balances: vec![],
            instructions: vec![],
            native_transfer: None,
            token_transfers: vec![],
            has_full_internal_data: true,
        }
    }

    fn ix(program: &str, accounts: &[&str], data: Vec<u8>) -> SvmInstruction {
        SvmInstruction {
            trace_index: 0,
            depth: 0,
            outer_index: 0,
            program_id: program.into(),
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            data,
        }
    }

    fn balance(index: usize, mint: &str, owner: &str, amount: u64, decimals: u8) -> SvmTokenBalance {
        SvmTokenBalance {
            account_index: index,
            mint: mint.into(),
            owner: Some(owner.into()),
            program_id: Some(TOKEN_PROGRAM_ID.into()),
            amount: BigUint::from(amount),
            decimals,
        }
    }

    fn spl(mint: &str, from: Option<&str>, to: &str, amount: u64, decimals: u8) -> SvmTokenTransfer {
        SvmTokenTransfer {
            mint: mint.into(),
            from: from.map(str::to_string),
            to: Some(to.into()),
            amount: BigUint::from(amount),
            decimals,
        }
    }

    fn ctx() -> ClassifyContext {
        ClassifyContext::new("solana", WALLET)
    }

    fn classify(tx: &SvmRawTransaction) -> ClassificationResult {
        SvmClassifier::default().classify(tx, &ctx())
    }

    #[test]
    fn test_native_transfer_out() {
        let mut sol = tx();
        sol.native_transfer = Some(SvmNativeTransfer {
            from: WALLET.into(),
            to: OTHER.into(),
            amount: BigUint::from(1_500_000_000u64),
        });
        sol.instructions = vec![ix(SYSTEM_PROGRAM_ID, &[WALLET, OTHER], vec![2, 0, 0, 0])];
        let result = classify(&sol);
        assert_eq!(result.classification_type, ClassificationType::Transfer);
        assert_eq!(result.label, "Native Transfer");
        assert_eq!(result.direction, ClassificationDirection::Out);
    }

    #[test]
    fn test_token_transfer_in() {
        let mut usdc = tx();
        usdc.token_transfers = vec![spl(USDC, Some(OTHER), WALLET, 100_000, 6)];
        usdc.post_token_balances = vec![balance(2, USDC, WALLET, 100_000, 6)];
        let result = classify(&usdc);
        assert_eq!(result.classification_type, ClassificationType::Transfer);
        assert_eq!(result.direction, ClassificationDirection::In);
        assert_eq!(result.transfers[0].token().unwrap().standard, TokenStandard::Spl);
    }

    #[test]
    fn test_swap_from_balance_flows() {
        let mut swap = tx();
        swap.native_transfer = Some(SvmNativeTransfer {
            from: WALLET.into(),
            to: OTHER.into(),
            amount: BigUint::from(1_000_000u64),
        });
        swap.token_transfers = vec![spl(BONK, Some(OTHER), WALLET, 5_000, 5)];
        let result = classify(&swap);
        assert_eq!(result.classification_type, ClassificationType::Swap);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.direction, ClassificationDirection::Neutral);
    }

    #[test]
    fn test_dex_program_with_single_visible_leg() {
        let mut swap = tx();
        swap.token_transfers = vec![spl(BONK, Some(OTHER), WALLET, 5_000, 5)];
        swap.instructions = vec![ix(JUPITER, &[WALLET], vec![0xe5])];
        let result = classify(&swap);
        assert_eq!(result.classification_type, ClassificationType::Swap);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn test_nft_transfer_for_zero_decimal_single_unit() {
        let mut nft = tx();
        nft.token_transfers = vec![spl(BONK, Some(WALLET), OTHER, 1, 0)];
        nft.post_token_balances = vec![balance(3, BONK, OTHER, 1, 0)];
        let result = classify(&nft);
        assert_eq!(result.classification_type, ClassificationType::NftTransfer);
        assert_eq!(result.direction, ClassificationDirection::Out);
        assert_eq!(result.transfers[0].kind(), "nft");
    }

    #[test]
    fn test_mint_to() {
        let mut mint = tx();
        mint.token_transfers = vec![spl(BONK, None, WALLET, 42, 5)];
        mint.instructions = vec![ix(TOKEN_PROGRAM_ID, &[BONK, OTHER, WALLET], vec![IX_MINT_TO, 42])];
        let result = classify(&mint);
        assert_eq!(result.classification_type, ClassificationType::Mint);
        assert_eq!(result.label, "Token Mint");
        assert_eq!(result.direction, ClassificationDirection::In);
    }

    #[test]
    fn test_burn_derived_from_balance_decrease() {
        let mut burn = tx();
        burn.pre_token_balances = vec![balance(1, BONK, WALLET, 10_000, 5)];
        burn.post_token_balances = vec![balance(1, BONK, WALLET, 5_000, 5)];
        burn.instructions = vec![ix(TOKEN_PROGRAM_ID, &[OTHER, BONK, WALLET], vec![IX_BURN_CHECKED, 1])];
        let result = classify(&burn);
        assert_eq!(result.classification_type, ClassificationType::Burn);
        assert_eq!(result.direction, ClassificationDirection::Out);
        assert_eq!(result.transfers.len(), 1);
        assert_eq!(result.transfers[0].amount(), &BigUint::from(5_000u32));
        assert!(result.transfers[0].to().is_none());
    }

    #[test]
    fn test_approve_without_movement() {
        let mut approve = tx();
        approve.instructions = vec![ix(TOKEN_PROGRAM_ID, &[OTHER, JUPITER, WALLET], vec![IX_APPROVE, 1])];
        let result = classify(&approve);
        assert_eq!(result.classification_type, ClassificationType::Approve);
        assert_eq!(result.direction, ClassificationDirection::Neutral);
    }

    #[test]
    fn test_stake_delegation() {
        let mut stake = tx();
        stake.native_transfer = Some(SvmNativeTransfer {
            from: WALLET.into(),
            to: OTHER.into(),
            amount: BigUint::from(2_000_000_000u64),
        });
        stake.instructions = vec![ix(STAKE_PROGRAM_ID, &[OTHER, WALLET], vec![2, 0, 0, 0])];
        let result = classify(&stake);
        assert_eq!(result.classification_type, ClassificationType::Stake);
        assert_eq!(result.label, "Stake");
        assert_eq!(result.direction, ClassificationDirection::Out);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn test_failed_transaction_has_no_transfers() {
        let mut failed = tx();
        failed.error = Some("InstructionError".into());
        failed.token_transfers = vec![spl(USDC, Some(OTHER), WALLET, 1, 6)];
        let result = classify(&failed);
        assert_eq!(result.classification_type, ClassificationType::Unknown);
        assert!(result.transfers.is_empty());
    }

    #[test]
    fn test_lone_transfer_instruction_is_unknown() {
        let mut lone = tx();
        lone.instructions = vec![ix(TOKEN_PROGRAM_ID, &[OTHER, OTHER, WALLET], vec![3, 1])];
        let result = classify(&lone);
        assert_eq!(result.classification_type, ClassificationType::Unknown);
        assert_eq!(result.confidence, Confidence::Low);
    }
}
