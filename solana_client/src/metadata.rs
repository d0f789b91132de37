use chain_core::{call_with_timeout, ChainSpec, RpcTransport, TokenInfo};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SolanaClientError};
use crate::rpc_types::AccountInfoResponse;

/// Resolves SPL mint metadata through `getAccountInfo` with `jsonParsed`.
///
/// Decimals come from the mint account. Name and symbol come from the
/// Token-2022 `tokenMetadata` extension when the mint carries one; otherwise
/// a shortened mint address stands in for both.
pub struct SvmTokenMetadataFetcher {
    chain: ChainSpec,
    transport: Arc<dyn RpcTransport>,
    timeout: Duration,
}

impl SvmTokenMetadataFetcher {
    pub fn new(chain: ChainSpec, transport: Arc<dyn RpcTransport>, timeout: Duration) -> Self {
        Self {
            chain,
            transport,
            timeout,
        }
    }

    pub async fn fetch(&self, mint: &str) -> Result<TokenInfo> {
        let mint = mint.trim();
        if !self.chain.family.is_valid_address(mint) {
            return Err(unavailable(mint, "invalid mint address"));
        }

        let value = call_with_timeout(
            self.transport.as_ref(),
            "getAccountInfo",
            json!([mint, { "encoding": "jsonParsed" }]),
            self.timeout,
        )
        .await
        .map_err(|e| unavailable(mint, &e.to_string()))?;

        let response: AccountInfoResponse = serde_json::from_value(value)
            .map_err(|e| unavailable(mint, &format!("malformed response: {}", e)))?;
        let account = response
            .value
            .ok_or_else(|| unavailable(mint, "account not found"))?;

        let parsed = &account.data["parsed"];
        if parsed["type"].as_str() != Some("mint") {
            return Err(unavailable(mint, "account is not a token mint"));
        }
        let info = &parsed["info"];
        let decimals = info["decimals"]
            .as_u64()
            .and_then(|d| u8::try_from(d).ok())
            .ok_or_else(|| unavailable(mint, "mint has no decimals"))?;

        let (name, symbol) = metadata_extension(info).unwrap_or_else(|| {
            debug!("Mint {} has no metadata extension, using address", mint);
            let short = short_address(mint);
            (short.clone(), short)
        });

        Ok(TokenInfo {
            address: mint.to_string(),
            name,
            symbol,
            decimals,
        })
    }
}

fn metadata_extension(info: &Value) -> Option<(String, String)> {
    info["extensions"].as_array()?.iter().find_map(|ext| {
        if ext["extension"].as_str() != Some("tokenMetadata") {
            return None;
        }
        let state = &ext["state"];
        let name = state["name"].as_str()?.trim().to_string();
        let symbol = state["symbol"].as_str()?.trim().to_string();
        (!name.is_empty() || !symbol.is_empty()).then(|| {
            let name = if name.is_empty() { symbol.clone() } else { name };
            let symbol = if symbol.is_empty() { name.clone() } else { symbol };
            (name, symbol)
        })
    })
}

fn short_address(address: &str) -> String {
    if address.len() <= 8 {
        return address.to_string();
    }
    format!("{}..{}", &address[..4], &address[address.len() - 4..])
}

fn unavailable(mint: &str, reason: &str) -> SolanaClientError {
    SolanaClientError::MetadataUnavailable {
        mint: mint.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::{FixtureTransport, RpcError};

    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn fetcher(transport: FixtureTransport) -> SvmTokenMetadataFetcher {
        SvmTokenMetadataFetcher::new(ChainSpec::solana(), Arc::new(transport), Duration::from_secs(1))
    }

    fn mint_account(info: Value) -> Value {
        json!({
            "context": { "slot": 1 },
            "value": {
                "owner": "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb",
                "data": { "program": "spl-token-2022", "parsed": { "type": "mint", "info": info } }
            }
        })
    }

    #[tokio::test]
    async fn test_token_2022_metadata_extension() {
        let transport = FixtureTransport::new().with_result(
            "getAccountInfo",
            mint_account(json!({
                "decimals": 6,
                "extensions": [
                    { "extension": "mintCloseAuthority", "state": {} },
                    { "extension": "tokenMetadata", "state": { "name": "PayPal USD", "symbol": "PYUSD" } }
                ]
            })),
        );
        let info = fetcher(transport).fetch(MINT).await.unwrap();
        assert_eq!(info.name, "PayPal USD");
        assert_eq!(info.symbol, "PYUSD");
        assert_eq!(info.decimals, 6);
    }

    #[tokio::test]
    async fn test_plain_mint_uses_short_address() {
        let transport =
            FixtureTransport::new().with_result("getAccountInfo", mint_account(json!({ "decimals": 9 })));
        let info = fetcher(transport).fetch(MINT).await.unwrap();
        assert_eq!(info.symbol, "EPjF..Dt1v");
        assert_eq!(info.decimals, 9);
    }

    #[tokio::test]
    async fn test_failures_are_metadata_unavailable() {
        let missing = FixtureTransport::new().with_result("getAccountInfo", json!({ "value": null }));
        assert!(matches!(
            fetcher(missing).fetch(MINT).await,
            Err(SolanaClientError::MetadataUnavailable { .. })
        ));

        let not_mint = FixtureTransport::new().with_result(
            "getAccountInfo",
            json!({ "value": { "data": { "parsed": { "type": "account", "info": {} } } } }),
        );
        assert!(fetcher(not_mint).fetch(MINT).await.is_err());

        let down = FixtureTransport::new().with_error("getAccountInfo", RpcError::Http { status: 503 });
        assert!(matches!(
            fetcher(down).fetch(MINT).await,
            Err(SolanaClientError::MetadataUnavailable { .. })
        ));
    }
}
