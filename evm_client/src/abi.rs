//! Minimal ABI helpers: hex quantities, 32-byte words, topic addresses and
//! the string / bytes32 return values of ERC20 metadata calls.

use num_bigint::BigUint;

use crate::error::{EvmClientError, Result};

// =====================================
// Event topics
// =====================================

/// `Transfer(address,address,uint256)`, shared by ERC20 and ERC721
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
/// ERC1155 `TransferSingle(address,address,address,uint256,uint256)`
pub const TRANSFER_SINGLE_TOPIC: &str =
    "0xc3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62";
/// ERC1155 `TransferBatch(address,address,address,uint256[],uint256[])`
pub const TRANSFER_BATCH_TOPIC: &str =
    "0x4a39dc06d4c0dbc64b70af90fd698a233a518aa5d07e595d983b8c0526c8f7fb";
pub const APPROVAL_TOPIC: &str =
    "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925";
pub const APPROVAL_FOR_ALL_TOPIC: &str =
    "0x17307eab39ab6107e8899845ad3d59bd9653f200f220920489ca2b5937696c31";

// =====================================
// Function selectors
// =====================================

pub const APPROVE_SELECTOR: &str = "0x095ea7b3";
pub const SET_APPROVAL_FOR_ALL_SELECTOR: &str = "0xa22cb465";
pub const TRANSFER_SELECTOR: &str = "0xa9059cbb";
/// Identical for ERC20 and ERC721
pub const TRANSFER_FROM_SELECTOR: &str = "0x23b872dd";
pub const SAFE_TRANSFER_FROM_SELECTOR: &str = "0x42842e0e";
pub const SAFE_TRANSFER_FROM_DATA_SELECTOR: &str = "0xb88d4fde";
pub const ERC1155_SAFE_TRANSFER_FROM_SELECTOR: &str = "0xf242432a";
pub const ERC1155_SAFE_BATCH_TRANSFER_FROM_SELECTOR: &str = "0x2eb2c2d6";
pub const STAKE_AMOUNT_SELECTOR: &str = "0xa694fc3a";
pub const STAKE_SELECTOR: &str = "0x3a4b66f1";
/// Lido `submit(address)`
pub const SUBMIT_SELECTOR: &str = "0xa1903eab";
pub const UNSTAKE_SELECTOR: &str = "0x2e17de78";

pub const NAME_SELECTOR: &str = "0x06fdde03";
pub const SYMBOL_SELECTOR: &str = "0x95d89b41";
pub const DECIMALS_SELECTOR: &str = "0x313ce567";

const WORD: usize = 32;

/// Decode `0x`-prefixed (or bare) hex into bytes. An odd length is left-padded.
pub fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    let body = strip_0x(raw.trim());
    let padded;
    let body = if body.len() % 2 == 1 {
        padded = format!("0{}", body);
        padded.as_str()
    } else {
        body
    };
    hex::decode(body).map_err(|e| EvmClientError::parse(format!("invalid hex '{}': {}", raw, e)))
}

fn strip_0x(raw: &str) -> &str {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw)
}

/// Parse a JSON-RPC hex quantity (`0x1a`) into u64
pub fn parse_quantity_u64(raw: &str) -> Result<u64> {
    let body = strip_0x(raw.trim());
    if body.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(body, 16)
        .map_err(|e| EvmClientError::parse(format!("invalid quantity '{}': {}", raw, e)))
}

/// Parse a JSON-RPC hex quantity of any width
pub fn parse_quantity_big(raw: &str) -> Result<BigUint> {
    let body = strip_0x(raw.trim());
    if body.is_empty() {
        return Ok(BigUint::default());
    }
    BigUint::parse_bytes(body.as_bytes(), 16)
        .ok_or_else(|| EvmClientError::parse(format!("invalid quantity '{}'", raw)))
}

/// The `index`-th 32-byte word of `data`
pub fn word(data: &[u8], index: usize) -> Option<&[u8]> {
    let start = index.checked_mul(WORD)?;
    let end = index.checked_add(1)?.checked_mul(WORD)?;
    data.get(start..end)
}

pub fn word_to_biguint(word: &[u8]) -> BigUint {
    BigUint::from_bytes_be(word)
}

/// Low 20 bytes of a 32-byte word as a lowercase `0x` address
pub fn word_to_address(word: &[u8]) -> Option<String> {
    if word.len() != WORD {
        return None;
    }
    Some(format!("0x{}", hex::encode(&word[12..])))
}

fn word_to_usize(word: &[u8]) -> Option<usize> {
    // Offsets and lengths beyond u64 are never legitimate
    if word.len() != WORD || word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}

/// Recover an address from a 32-byte indexed topic
pub fn topic_to_address(topic: &str) -> Option<String> {
    let bytes = decode_hex(topic).ok()?;
    word_to_address(&bytes)
}

/// Decimal string of a 32-byte indexed topic (ERC721 tokenId)
pub fn topic_to_decimal(topic: &str) -> Option<String> {
    let bytes = decode_hex(topic).ok()?;
    if bytes.len() != WORD {
        return None;
    }
    Some(word_to_biguint(&bytes).to_str_radix(10))
}

/// Decode a dynamic `uint256[]` whose offset is stored in head word `head_index`
pub fn decode_uint_array(data: &[u8], head_index: usize) -> Option<Vec<BigUint>> {
    let offset = word_to_usize(word(data, head_index)?)?;
    if offset % WORD != 0 {
        return None;
    }
    let start = offset / WORD;
    let len = word_to_usize(word(data, start)?)?;
    (0..len)
        .map(|i| {
            let index = start.checked_add(1)?.checked_add(i)?;
            word(data, index).map(word_to_biguint)
        })
        .collect()
}

/// Calldata arguments after the 4-byte selector
pub fn calldata_args(input: &str) -> Option<Vec<u8>> {
    let bytes = decode_hex(input).ok()?;
    if bytes.len() < 4 {
        return None;
    }
    Some(bytes[4..].to_vec())
}

/// Decode an `eth_call` result that is either an ABI `string` or a `bytes32`
pub fn decode_string_result(raw: &str) -> Option<String> {
    let data = decode_hex(raw).ok()?;
    if data.is_empty() {
        return None;
    }

    if data.len() >= 2 * WORD {
        if let Some(offset) = word(&data, 0).and_then(word_to_usize) {
            let bytes = offset.checked_add(WORD).and_then(|start| {
                let len = data.get(offset..start).and_then(word_to_usize)?;
                data.get(start..start.checked_add(len)?)
            });
            if let Some(bytes) = bytes {
                return clean_string(bytes);
            }
        }
    }

    // Legacy tokens (MKR, SAI) return bytes32
    if data.len() == WORD {
        return clean_string(&data);
    }
    None
}

fn clean_string(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_matches(char::from(0)).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Decode a `uint8` return value
pub fn decode_u8_result(raw: &str) -> Option<u8> {
    let data = decode_hex(raw).ok()?;
    let word = word(&data, 0)?;
    if word[..31].iter().any(|b| *b != 0) {
        return None;
    }
    Some(word[31])
}
