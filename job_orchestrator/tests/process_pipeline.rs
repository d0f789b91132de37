use chain_core::{
    ChainSpec, ClassificationDirection, ClassificationType, DataWarning, FixtureTransport, RpcError,
};
use evm_client::abi::{TRANSFER_BATCH_TOPIC, TRANSFER_TOPIC};
use job_orchestrator::{FetcherRegistry, IngestOptions, TransactionProcessor};
use persistence_layer::{InMemoryStore, TransactionStore, TransactionUpserter, UpsertStep};
use retry_utils::RetryConfig;
use serde_json::{json, Value};
use solana_client::TOKEN_PROGRAM_ID;
use std::sync::Arc;
use tx_parser::ClassifierRegistry;

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

fn abi_string(s: &str) -> String {
    let mut body = hex_encode(s.as_bytes());
    while body.len() % 64 != 0 {
        body.push('0');
    }
    format!("0x{:064x}{:064x}{}", 32, s.len(), body)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn erc20_log(contract: &str, from: &str, to: &str, amount: u64, index: u64) -> Value {
    json!({
        "address": contract,
        "topics": [TRANSFER_TOPIC, topic(from), topic(to)],
        "data": format!("0x{:064x}", amount),
        "logIndex": format!("0x{:x}", index),
        "blockTimestamp": "0x6553f100"
    })
}

fn swap_tx() -> Value {
    json!({
        "hash": HASH,
        "blockNumber": "0x12d687",
        "blockHash": "0xabc1",
        "from": USER,
        "to": ROUTER,
        "value": "0x0",
        "input": "0x38ed1739",
        "gasPrice": "0x3b9aca00",
        "nonce": "0x2a"
    })
}

fn swap_receipt() -> Value {
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
    })
}

/// USER swaps USDC for WETH through ROUTER against POOL
fn evm_swap() -> FixtureTransport {
    FixtureTransport::new()
        .with_result("eth_getTransactionByHash", swap_tx())
        .with_result("eth_getTransactionReceipt", swap_receipt())
        .with_result(
            "debug_traceTransaction",
            json!({ "type": "CALL", "from": USER, "to": ROUTER, "value": "0x0" }),
        )
}

fn options() -> IngestOptions {
    IngestOptions {
        retry: RetryConfig::none(),
        ..IngestOptions::default()
    }
}

fn pipeline(
    spec: ChainSpec,
    transport: Arc<FixtureTransport>,
) -> (TransactionProcessor, Arc<InMemoryStore>) {
    let mut registry = FetcherRegistry::new();
    registry.register(spec, transport, &options());
    let store = Arc::new(InMemoryStore::new());
    let processor = TransactionProcessor::new(
        Arc::new(registry),
        Arc::new(ClassifierRegistry::default()),
        TransactionUpserter::new(store.clone()),
    );
    (processor, store)
}

#[tokio::test]
async fn test_reprocessing_is_idempotent() {
    let transport = Arc::new(evm_swap().with_error("eth_call", RpcError::Http { status: 503 }));
    let (processor, store) = pipeline(ChainSpec::evm("eth"), transport);

    let first = processor.process("eth", HASH, None).await.unwrap();
    let rows_after_first = (
        store.transaction_count().await,
        store.transfer_row_count().await,
        store.link_count().await,
    );
    let upper_hash = format!("0x{}", HASH[2..].to_uppercase());
    let second = processor.process("ETH", &upper_hash, None).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.transaction_id, second.transaction_id);
    assert_eq!(first.classification_type, ClassificationType::Swap);
    assert_eq!(first.classification_direction, ClassificationDirection::Neutral);
    assert_eq!(first.transfer_count, 2);
    assert_eq!(
        rows_after_first,
        (
            store.transaction_count().await,
            store.transfer_row_count().await,
            store.link_count().await
        )
    );
    assert_eq!(rows_after_first, (1, 2, 3));

    let stored = store.find_transaction("eth", HASH).await.unwrap().unwrap();
    assert_eq!(stored.transaction.fee, "187500000000000");
    assert_eq!(stored.transaction.status, "success");
    assert_eq!(
        stored.transaction.block_timestamp.map(|t| t.timestamp()),
        Some(1_700_000_000)
    );
}

#[tokio::test]
async fn test_metadata_failure_is_partial_not_fatal() {
    let transport = evm_swap();
    transport.push("eth_call", Ok(Value::String(abi_string("USD Coin"))));
    transport.push("eth_call", Ok(Value::String(abi_string("USDC"))));
    transport.push("eth_call", Ok(Value::String(format!("0x{:064x}", 6))));
    transport.push("eth_call", Err(RpcError::Timeout { method: "eth_call".into() }));
    let (processor, store) = pipeline(ChainSpec::evm("eth"), Arc::new(transport));

    let result = processor.process("eth", HASH, None).await.unwrap();
    assert_eq!(result.tokens_discovered, 2);
    assert_eq!(result.tokens_upserted, 1);
    assert!(result.has_full_internal_data);
    assert!(matches!(
        result.warnings.as_slice(),
        [DataWarning::TokenMetadataUnavailable { token, .. }] if token == WETH
    ));

    let usdc = store.find_token("eth", USDC).await.unwrap().unwrap();
    assert_eq!(usdc.token.symbol, "USDC");
    assert_eq!(usdc.token.decimals, 6);
    assert!(store.find_token("eth", WETH).await.unwrap().is_none());
    // Transfers of the unresolved token are still recorded
    let transfers = store.transfers_for(result.transaction_id).await.unwrap();
    assert!(transfers.token.iter().any(|t| t.token_address == WETH));
}

#[tokio::test]
async fn test_malformed_batch_log_and_metadata_are_tolerated() {
    const NFT: &str = "0x3333333333333333333333333333333333333333";
    // Head offset 0xffffffffffffffe0 points far outside the data
    let hostile_batch = json!({
        "address": NFT,
        "topics": [TRANSFER_BATCH_TOPIC, topic(ROUTER), topic(POOL), topic(USER)],
        "data": format!("0x{}{}e0{:064x}{:064x}", "00".repeat(24), "ff".repeat(7), 160, 0),
        "logIndex": "0x0",
        "blockTimestamp": "0x6553f100"
    });
    let receipt = json!({
        "status": "0x1",
        "gasUsed": "0x2dc6c",
        "effectiveGasPrice": "0x3b9aca00",
        "blockNumber": "0x12d687",
        "blockHash": "0xabc1",
        "logs": [hostile_batch, erc20_log(USDC, USER, POOL, 2_500_000_000, 1)]
    });
    let transport = FixtureTransport::new()
        .with_result("eth_getTransactionByHash", swap_tx())
        .with_result("eth_getTransactionReceipt", receipt)
        .with_result("debug_traceTransaction", json!({ "type": "CALL", "from": USER, "to": ROUTER }))
        // Neither an ABI string nor a bytes32
        .with_result("eth_call", Value::String("0xdeadbeef".into()));
    let (processor, store) = pipeline(ChainSpec::evm("eth"), Arc::new(transport));

    let result = processor.process("eth", HASH, None).await.unwrap();
    assert_eq!(result.transfer_count, 1);
    assert_eq!(result.classification_type, ClassificationType::Transfer);
    assert_eq!(result.classification_direction, ClassificationDirection::Out);
    assert_eq!(result.tokens_discovered, 1);
    assert_eq!(result.tokens_upserted, 0);
    assert!(matches!(
        result.warnings.as_slice(),
        [DataWarning::TokenMetadataUnavailable { token, .. }] if token == USDC
    ));
    assert!(store.find_token("eth", USDC).await.unwrap().is_none());
    assert_eq!(store.transaction_count().await, 1);
}

#[tokio::test]
async fn test_trace_failure_degrades_gracefully() {
    let transport = FixtureTransport::new()
        .with_result("eth_getTransactionByHash", swap_tx())
        .with_result("eth_getTransactionReceipt", swap_receipt())
        .with_error(
            "debug_traceTransaction",
            RpcError::Rpc {
                code: -32601,
                message: "the method debug_traceTransaction does not exist".into(),
            },
        )
        .with_error("eth_call", RpcError::Http { status: 503 });
    let (processor, store) = pipeline(ChainSpec::evm("eth"), Arc::new(transport));

    let result = processor.process("eth", HASH, Some(USER)).await.unwrap();
    assert!(!result.has_full_internal_data);
    assert_eq!(result.classification_type, ClassificationType::Swap);
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, DataWarning::TraceUnavailable { .. })));

    let stored = store.find_transaction("eth", HASH).await.unwrap().unwrap();
    assert!(!stored.transaction.has_full_internal_data);
}

#[tokio::test]
async fn test_not_found_and_invalid_input_surface_as_errors() {
    let transport = Arc::new(
        FixtureTransport::new()
            .with_result("eth_getTransactionByHash", Value::Null)
            .with_result("eth_getTransactionReceipt", Value::Null)
            .with_result("debug_traceTransaction", Value::Null),
    );
    let (processor, store) = pipeline(ChainSpec::evm("eth"), transport.clone());

    let err = processor.process("eth", HASH, None).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(err.is_retryable());
    assert_eq!(store.transaction_count().await, 0);

    let calls_before = transport.calls().len();
    let err = processor.process("eth", "0x1234", None).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_format");
    assert!(!err.is_retryable());

    let err = processor.process("polygon", HASH, None).await.unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = processor.process("eth", HASH, Some("not-an-address")).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_format");

    let err = processor.process("  ", HASH, None).await.unwrap_err();
    assert_eq!(err.kind(), "validation");

    // None of the rejected inputs reached the node
    assert_eq!(transport.calls().len(), calls_before);
}

#[tokio::test]
async fn test_primary_transport_failure_aborts() {
    let transport = FixtureTransport::new()
        .with_result("eth_getTransactionByHash", swap_tx())
        .with_error("eth_getTransactionReceipt", RpcError::Http { status: 503 })
        .with_result("debug_traceTransaction", json!({ "type": "CALL", "from": USER, "to": ROUTER }));
    let (processor, store) = pipeline(ChainSpec::evm("eth"), Arc::new(transport));

    let err = processor.process("eth", HASH, None).await.unwrap_err();
    assert_eq!(err.kind(), "transport");
    assert!(err.is_retryable());
    assert_eq!(store.transaction_count().await, 0);
}

#[tokio::test]
async fn test_persistence_failure_rolls_back_and_surfaces() {
    let transport = Arc::new(evm_swap().with_error("eth_call", RpcError::Http { status: 503 }));
    let (processor, store) = pipeline(ChainSpec::evm("eth"), transport);
    store.fail_at(Some(UpsertStep::Transfers)).await;

    let err = processor.process("eth", HASH, None).await.unwrap_err();
    assert_eq!(err.kind(), "persistence");
    assert!(err.is_retryable());
    assert_eq!(store.transaction_count().await, 0);

    store.fail_at(None).await;
    assert!(processor.process("eth", HASH, None).await.is_ok());
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
    FixtureTransport::new()
        .with_result(
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
        .with_result(
            "getAccountInfo",
            json!({
                "context": { "slot": 245_000_001u64 },
                "value": {
                    "owner": TOKEN_PROGRAM_ID,
                    "data": {
                        "program": "spl-token",
                        "parsed": {
                            "type": "mint",
                            "info": { "decimals": 6, "supply": "1000000000", "isInitialized": true }
                        }
                    }
                }
            }),
        )
}

#[tokio::test]
async fn test_svm_transfer_for_receiving_address() {
    let (processor, store) = pipeline(ChainSpec::solana(), Arc::new(svm_usdc_transfer()));

    let result = processor.process("solana", SIG, Some(WALLET_B)).await.unwrap();
    assert_eq!(result.tx_hash, SIG);
    assert_eq!(result.classification_type, ClassificationType::Transfer);
    assert_eq!(result.classification_direction, ClassificationDirection::In);
    assert_eq!(result.tokens_upserted, 1);
    assert!(result.warnings.is_empty());

    let stored = store.find_transaction("solana", SIG).await.unwrap().unwrap();
    assert_eq!(stored.transaction.from_address, WALLET_A);
    assert_eq!(stored.transaction.fee, "5000");
    assert_eq!(stored.transaction.value, "0");
    assert_eq!(stored.transaction.block_number, Some(245_000_000));

    let links = store.address_links(result.transaction_id).await.unwrap();
    let sender = links.iter().find(|l| l.address == WALLET_A).unwrap();
    let receiver = links.iter().find(|l| l.address == WALLET_B).unwrap();
    assert_eq!(sender.direction, "out");
    assert_eq!(receiver.direction, "in");
    assert!(receiver.has_token_transfer && !receiver.has_native_transfer);

    let token = store.find_token("solana", SPL_USDC).await.unwrap().unwrap();
    assert_eq!(token.token.decimals, 6);
}
