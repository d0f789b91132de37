use chain_core::{EvmLog, EvmTokenTransfer, TokenStandard};
use num_bigint::BigUint;
use tracing::debug;

use crate::abi::{
    self, decode_hex, topic_to_address, topic_to_decimal, word, word_to_biguint,
    APPROVAL_FOR_ALL_TOPIC, APPROVAL_TOPIC, TRANSFER_BATCH_TOPIC, TRANSFER_SINGLE_TOPIC,
    TRANSFER_TOPIC,
};

fn topic0(log: &EvmLog) -> Option<String> {
    log.topics.first().map(|t| t.to_lowercase())
}

/// Decode every recognised token movement in `logs`, preserving log order.
///
/// Logs with an unknown signature or a malformed payload are skipped.
pub fn decode_transfer_logs(logs: &[EvmLog]) -> Vec<EvmTokenTransfer> {
    let mut transfers = Vec::new();
    for log in logs {
        let decoded = match topic0(log).as_deref() {
            Some(TRANSFER_TOPIC) => decode_transfer(log).map(|t| vec![t]),
            Some(TRANSFER_SINGLE_TOPIC) => decode_transfer_single(log).map(|t| vec![t]),
            Some(TRANSFER_BATCH_TOPIC) => decode_transfer_batch(log),
            _ => continue,
        };
        match decoded {
            Some(mut batch) => transfers.append(&mut batch),
            None => debug!(
                "Skipping malformed transfer log from {} (index {:?})",
                log.address, log.log_index
            ),
        }
    }
    transfers
}

/// Whether any log is an `Approval` / `ApprovalForAll` event
pub fn has_approval_log(logs: &[EvmLog]) -> bool {
    logs.iter().any(|log| {
        matches!(
            topic0(log).as_deref(),
            Some(APPROVAL_TOPIC) | Some(APPROVAL_FOR_ALL_TOPIC)
        )
    })
}

/// Whether `contract` emitted an ERC20-shaped (3 topic) `Transfer`
pub fn has_erc20_transfer_log(logs: &[EvmLog], contract: &str) -> bool {
    logs.iter().any(|log| {
        log.address.eq_ignore_ascii_case(contract)
            && log.topics.len() == 3
            && topic0(log).as_deref() == Some(TRANSFER_TOPIC)
    })
}

/// ERC20 when 3 topics (value in data), ERC721 when 4 (tokenId in topic 3)
fn decode_transfer(log: &EvmLog) -> Option<EvmTokenTransfer> {
    let from = topic_to_address(log.topics.get(1)?)?;
    let to = topic_to_address(log.topics.get(2)?)?;
    let contract = log.address.to_lowercase();

    match log.topics.len() {
        3 => {
            let data = decode_hex(&log.data).ok()?;
            // Some non-compliant tokens emit an empty data field
            let value = word(&data, 0).map(word_to_biguint).unwrap_or_default();
            Some(EvmTokenTransfer {
                standard: TokenStandard::Erc20,
                contract,
                from,
                to,
                value,
                token_id: None,
                log_index: log.log_index,
            })
        }
        4 => Some(EvmTokenTransfer {
            standard: TokenStandard::Erc721,
            contract,
            from,
            to,
            value: BigUint::from(1u32),
            token_id: Some(topic_to_decimal(&log.topics[3])?),
            log_index: log.log_index,
        }),
        _ => None,
    }
}

/// topics: [sig, operator, from, to]; data: (id, value)
fn decode_transfer_single(log: &EvmLog) -> Option<EvmTokenTransfer> {
    if log.topics.len() != 4 {
        return None;
    }
    let from = topic_to_address(&log.topics[2])?;
    let to = topic_to_address(&log.topics[3])?;
    let data = decode_hex(&log.data).ok()?;
    let id = word_to_biguint(word(&data, 0)?);
    let value = word_to_biguint(word(&data, 1)?);

    Some(EvmTokenTransfer {
        standard: TokenStandard::Erc1155,
        contract: log.address.to_lowercase(),
        from,
        to,
        value,
        token_id: Some(id.to_str_radix(10)),
        log_index: log.log_index,
    })
}

/// topics: [sig, operator, from, to]; data: (uint256[] ids, uint256[] values)
fn decode_transfer_batch(log: &EvmLog) -> Option<Vec<EvmTokenTransfer>> {
    if log.topics.len() != 4 {
        return None;
    }
    let from = topic_to_address(&log.topics[2])?;
    let to = topic_to_address(&log.topics[3])?;
    let data = decode_hex(&log.data).ok()?;
    let ids = abi::decode_uint_array(&data, 0)?;
    let values = abi::decode_uint_array(&data, 1)?;
    if ids.len() != values.len() {
        return None;
    }

    let contract = log.address.to_lowercase();
    Some(
        ids.into_iter()
            .zip(values)
            .map(|(id, value)| EvmTokenTransfer {
                standard: TokenStandard::Erc1155,
                contract: contract.clone(),
                from: from.clone(),
                to: to.clone(),
                value,
                token_id: Some(id.to_str_radix(10)),
                log_index: log.log_index,
            })
            .collect(),
    )
}
