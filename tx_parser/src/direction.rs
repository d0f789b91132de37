//! Perspective-relative direction, shared by every classifier and by the
//! per-address links written at persistence time.

use chain_core::{
    BigInt, ClassificationDirection, ClassificationType, ParsedTransfer, TransferDirection,
};
use num_traits::Signed;
use std::collections::BTreeMap;

fn same_address(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn is_sender(transfer: &ParsedTransfer, address: &str) -> bool {
    transfer.from().is_some_and(|from| same_address(from, address))
}

fn is_recipient(transfer: &ParsedTransfer, address: &str) -> bool {
    transfer.to().is_some_and(|to| same_address(to, address))
}

/// Direction of a single transfer: `in` when the perspective receives it
pub fn transfer_direction(to: Option<&str>, perspective: &str) -> TransferDirection {
    match to {
        Some(to) if same_address(to, perspective) => TransferDirection::In,
        _ => TransferDirection::Out,
    }
}

/// Whole-transaction direction for `perspective`.
///
/// Type-level rules win over the transfer list: swaps, approvals and
/// deployments are neutral, mints are in, burns are out.
pub fn calculate_direction(
    classification_type: ClassificationType,
    transfers: &[ParsedTransfer],
    perspective: &str,
) -> ClassificationDirection {
    match classification_type {
        ClassificationType::Swap
        | ClassificationType::Approve
        | ClassificationType::ContractDeploy => ClassificationDirection::Neutral,
        ClassificationType::Mint => ClassificationDirection::In,
        ClassificationType::Burn => ClassificationDirection::Out,
        ClassificationType::Stake => {
            if transfers.iter().any(|t| is_sender(t, perspective)) {
                ClassificationDirection::Out
            } else if transfers.iter().any(|t| is_recipient(t, perspective)) {
                ClassificationDirection::In
            } else {
                ClassificationDirection::Neutral
            }
        }
        ClassificationType::Transfer
        | ClassificationType::NftTransfer
        | ClassificationType::Unknown => {
            let sent = transfers.iter().any(|t| is_sender(t, perspective));
            let received = transfers.iter().any(|t| is_recipient(t, perspective));
            match (sent, received) {
                (true, false) => ClassificationDirection::Out,
                (false, true) => ClassificationDirection::In,
                _ => ClassificationDirection::Neutral,
            }
        }
    }
}

/// Net movement per asset for one address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetFlows {
    /// Asset key (`native` or token address) to net received amount
    pub net: BTreeMap<String, BigInt>,
}

impl AssetFlows {
    pub fn for_address(transfers: &[ParsedTransfer], address: &str) -> Self {
        let mut net: BTreeMap<String, BigInt> = BTreeMap::new();
        for transfer in transfers {
            let key = match transfer.token() {
                Some(token) => token.address.to_lowercase(),
                None => "native".to_string(),
            };
            let amount = BigInt::from(transfer.amount().clone());
            // Self-transfers cancel out
            if is_recipient(transfer, address) {
                *net.entry(key.clone()).or_default() += &amount;
            }
            if is_sender(transfer, address) {
                *net.entry(key).or_default() -= &amount;
            }
        }
        Self { net }
    }

    pub fn assets_in(&self) -> usize {
        self.net.values().filter(|v| v.is_positive()).count()
    }

    pub fn assets_out(&self) -> usize {
        self.net.values().filter(|v| v.is_negative()).count()
    }

    /// At least one asset gained and a different one spent
    pub fn is_swap(&self) -> bool {
        self.assets_in() > 0 && self.assets_out() > 0
    }

    pub fn native_net(&self) -> BigInt {
        self.net.get("native").cloned().unwrap_or_default()
    }
}
