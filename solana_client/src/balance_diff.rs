//! Transfer inference from pre/post balance snapshots.

use chain_core::{SvmNativeTransfer, SvmTokenBalance, SvmTokenTransfer};
use num_bigint::BigUint;
use num_traits::Zero;
use tracing::trace;

/// Infer the native SOL movement of a transaction.
///
/// The fee payer (account 0) is the sender. The recipient is the first of
/// accounts 1..N whose post balance exceeds its pre balance.
pub fn infer_native_transfer(
    account_keys: &[String],
    pre_balances: &[u64],
    post_balances: &[u64],
) -> Option<SvmNativeTransfer> {
    let fee_payer = account_keys.first()?;
    let count = account_keys
        .len()
        .min(pre_balances.len())
        .min(post_balances.len());

    (1..count).find_map(|i| {
        let (pre, post) = (pre_balances[i], post_balances[i]);
        (post > pre).then(|| SvmNativeTransfer {
            from: fee_payer.clone(),
            to: account_keys[i].clone(),
            amount: BigUint::from(post - pre),
        })
    })
}

/// Infer SPL token movements from token balance snapshots.
///
/// Every account whose balance grew is a receiver. Its sender is an account of
/// the same mint whose balance shrank or, failing that, one that was fully
/// drained (present before, gone after, non-zero before).
pub fn infer_token_transfers(
    pre: &[SvmTokenBalance],
    post: &[SvmTokenBalance],
) -> Vec<SvmTokenTransfer> {
    let zero = BigUint::zero();
    let pre_amount = |index: usize| {
        pre.iter()
            .find(|b| b.account_index == index)
            .map(|b| &b.amount)
            .unwrap_or(&zero)
    };

    let mut transfers = Vec::new();
    for received in post {
        let before = pre_amount(received.account_index);
        if received.amount <= *before {
            continue;
        }
        let delta = &received.amount - before;

        let sender = find_sender(pre, post, received);
        trace!(
            "Token delta +{} on account {} ({}), sender {:?}",
            delta,
            received.account_index,
            received.mint,
            sender
        );

        transfers.push(SvmTokenTransfer {
            mint: received.mint.clone(),
            from: sender,
            to: received.owner.clone(),
            amount: delta,
            decimals: received.decimals,
        });
    }
    transfers
}

fn find_sender(
    pre: &[SvmTokenBalance],
    post: &[SvmTokenBalance],
    received: &SvmTokenBalance,
) -> Option<String> {
    let decreased = post.iter().find(|candidate| {
        candidate.mint == received.mint
            && candidate.account_index != received.account_index
            && pre
                .iter()
                .find(|p| p.account_index == candidate.account_index)
                .is_some_and(|p| candidate.amount < p.amount)
    });
    if let Some(account) = decreased {
        return account.owner.clone();
    }

    pre.iter()
        .find(|p| {
            p.mint == received.mint
                && !p.amount.is_zero()
                && !post.iter().any(|q| q.account_index == p.account_index)
        })
        .and_then(|drained| drained.owner.clone())
}
