//! Wire shapes of `getTransaction` with `encoding: "json"` and of
//! `getAccountInfo` with `encoding: "jsonParsed"`.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    pub meta: Option<TransactionMeta>,
    pub transaction: TransactionBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub pre_token_balances: Option<Vec<UiTokenBalance>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<UiTokenBalance>>,
    /// None when the node did not record CPI data
    #[serde(default)]
    pub inner_instructions: Option<Vec<InnerInstructionSet>>,
    #[serde(default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenBalance {
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    /// Raw integer amount as a decimal string
    pub amount: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InnerInstructionSet {
    /// Index of the outer instruction that issued these CPIs
    pub index: usize,
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
    pub program_id_index: usize,
    #[serde(default)]
    pub accounts: Vec<usize>,
    /// base58
    #[serde(default)]
    pub data: String,
    /// 1 for top-level, 2+ for CPIs; absent on older nodes
    #[serde(default)]
    pub stack_height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionBody {
    #[serde(default)]
    pub signatures: Vec<String>,
    pub message: Message,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub account_keys: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<CompiledInstruction>,
}

/// `getAccountInfo` result body
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfoResponse {
    pub value: Option<AccountInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub owner: Option<String>,
    pub data: Value,
}
