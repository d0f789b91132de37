use chain_core::{
    ChainSpec, ClassificationDirection, ClassificationType, Confidence, FixtureTransport,
};
use evm_client::abi::TRANSFER_TOPIC;
use evm_client::{EvmFetchOptions, EvmFetcher};
use serde_json::{json, Value};
use solana_client::{SvmFetchOptions, SvmFetcher, TOKEN_PROGRAM_ID};
use std::sync::Arc;
use tx_parser::{ClassifierRegistry, ClassifyContext};

const HASH: &str = "0x9f1c3d2a4b5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f8";
const ROUTER: &str = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";
const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
const USER: &str = "0x1111111111111111111111111111111111111111";
const POOL: &str = "0x2222222222222222222222222222222222222222";

const SIG: &str =
    "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW";
const WALLET_A: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
const WALLET_B: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
const ATA_A: &str = "7UX2i7SucgLMQcfZ75s3VXmZZY4YRUyJN9X1RgfMoDUi";
const ATA_B: &str = "Hx6LbkMHe69DYawhPyVNs8Apa6tyfogfzQV6a7XkwBUU";
const SPL_USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

fn topic(addr: &str) -> String {
    format!("0x{:0>64}", addr.trim_start_matches("0x"))
}

fn erc20_log(contract: &str, from: &str, to: &str, amount: u64, index: u64) -> Value {
    json!({
        "address": contract,
        "topics": [TRANSFER_TOPIC, topic(from), topic(to)],
        "data": format!("0x{:064x}", amount),
        "logIndex": format!("0x{:x}", index)
    })
}

fn evm_swap() -> FixtureTransport {
    FixtureTransport::new()
        .with_result(
            "eth_getTransactionByHash",
            json!({
                "hash": HASH,
                "blockNumber": "0x12d687",
                "blockHash": "0xabc1",
                "from": USER,
                "to": ROUTER,
                "value": "0x0",
                "input": "0x38ed1739",
                "nonce": "0x1"
            }),
        )
        .with_result(
            "eth_getTransactionReceipt",
            json!({
                "status": "0x1",
                "gasUsed": "0x2dc6c",
                "effectiveGasPrice": "0x3b9aca00",
                "blockNumber": "0x12d687",
                "blockHash": "0xabc1",
                "logs": [
                    erc20_log(USDC, USER, POOL, 2_500_000_000, 1),
                    erc20_log(WETH, POOL, USER, 1_000_000_000_000_000_000, 2)
                ]
            }),
        )
        .with_result(
            "debug_traceTransaction",
            json!({ "type": "CALL", "from": USER, "to": ROUTER, "value": "0x0" }),
        )
}

#[tokio::test]
async fn test_fetched_evm_swap_is_neutral_for_trader() {
    let fetcher = EvmFetcher::new(
        ChainSpec::evm("eth"),
        Arc::new(evm_swap()),
        EvmFetchOptions::default(),
    );
    let fetched = fetcher.fetch(HASH).await.unwrap();

    let registry = ClassifierRegistry::default();
    let ctx = ClassifyContext::for_transaction(&fetched.raw, None);
    let result = registry.classify(&fetched.raw, &ctx);

    assert_eq!(result.classification_type, ClassificationType::Swap);
    assert_eq!(result.direction, ClassificationDirection::Neutral);
    assert_eq!(result.confidence, Confidence::High);
    assert_eq!(result.transfers.len(), 2);
    assert_eq!(result.token_addresses(), vec![USDC.to_string(), WETH.to_string()]);

    // The pool only sees one asset in and one out as well
    let pool_view = registry.classify(&fetched.raw, &ClassifyContext::new("eth", POOL));
    assert_eq!(pool_view.classification_type, ClassificationType::Swap);
}

fn token_balance(index: usize, owner: &str, amount: &str) -> Value {
    json!({
        "accountIndex": index,
        "mint": SPL_USDC,
        "owner": owner,
        "programId": TOKEN_PROGRAM_ID,
        "uiTokenAmount": { "amount": amount, "decimals": 6 }
    })
}

fn svm_usdc_transfer() -> FixtureTransport {
    FixtureTransport::new().with_result(
        "getTransaction",
        json!({
            "slot": 245_000_000u64,
            "blockTime": 1_700_000_000i64,
            "meta": {
                "err": null,
                "fee": 5000,
                "preBalances": [1_000_000_000u64, 2_039_280, 2_039_280, 1_461_600, 934_087_680],
                "postBalances": [999_995_000u64, 2_039_280, 2_039_280, 1_461_600, 934_087_680],
                "preTokenBalances": [token_balance(1, WALLET_A, "1000000")],
                "postTokenBalances": [
                    token_balance(1, WALLET_A, "900000"),
                    token_balance(2, WALLET_B, "100000")
                ],
                "innerInstructions": []
            },
            "transaction": {
                "signatures": [SIG],
                "message": {
                    "accountKeys": [WALLET_A, ATA_A, ATA_B, SPL_USDC, TOKEN_PROGRAM_ID],
                    "instructions": [
                        { "programIdIndex": 4, "accounts": [1, 3, 2, 0], "data": "i9TTqffgKmDLh" }
                    ]
                }
            }
        }),
    )
}

#[tokio::test]
async fn test_fetched_spl_transfer_direction_per_party() {
    let fetcher = SvmFetcher::new(
        ChainSpec::solana(),
        Arc::new(svm_usdc_transfer()),
        SvmFetchOptions::default(),
    );
    let fetched = fetcher.fetch(SIG).await.unwrap();
    let registry = ClassifierRegistry::default();

    let sender = registry.classify(&fetched.raw, &ClassifyContext::for_transaction(&fetched.raw, None));
    assert_eq!(sender.classification_type, ClassificationType::Transfer);
    assert_eq!(sender.label, "Token Transfer");
    assert_eq!(sender.direction, ClassificationDirection::Out);

    let receiver = registry.classify(
        &fetched.raw,
        &ClassifyContext::for_transaction(&fetched.raw, Some(WALLET_B)),
    );
    assert_eq!(receiver.direction, ClassificationDirection::In);
    assert_eq!(receiver.token_addresses(), vec![SPL_USDC.to_string()]);
}
