use chain_core::{call_with_timeout, ChainSpec, RpcError, RpcTransport, TokenInfo};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::abi::{decode_string_result, decode_u8_result, DECIMALS_SELECTOR, NAME_SELECTOR, SYMBOL_SELECTOR};
use crate::error::{EvmClientError, Result};

/// Resolves ERC20-style metadata with `eth_call` of `name()`, `symbol()` and `decimals()`
pub struct EvmTokenMetadataFetcher {
    chain: ChainSpec,
    transport: Arc<dyn RpcTransport>,
    timeout: Duration,
}

impl EvmTokenMetadataFetcher {
    pub fn new(chain: ChainSpec, transport: Arc<dyn RpcTransport>, timeout: Duration) -> Self {
        Self {
            chain,
            transport,
            timeout,
        }
    }

    /// Each of the three calls is a single attempt bounded by the timeout.
    ///
    /// Contracts without `decimals()` (ERC721, ERC1155) get 0 decimals as long as
    /// `name()` or `symbol()` answers; when neither does, the token is unavailable.
    pub async fn fetch(&self, token_address: &str) -> Result<TokenInfo> {
        let address = token_address.trim().to_lowercase();
        if !self.chain.family.is_valid_address(&address) {
            return Err(self.unavailable(token_address, "invalid contract address"));
        }

        let (name, symbol, decimals) = tokio::join!(
            self.eth_call(&address, NAME_SELECTOR),
            self.eth_call(&address, SYMBOL_SELECTOR),
            self.eth_call(&address, DECIMALS_SELECTOR),
        );

        let name = name.map(|raw| decode_string_result(&raw));
        let symbol = symbol.map(|raw| decode_string_result(&raw));

        let (name, symbol) = match (name, symbol) {
            (Ok(Some(name)), Ok(Some(symbol))) => (name, symbol),
            (Ok(Some(name)), _) => (name.clone(), name),
            (_, Ok(Some(symbol))) => (symbol.clone(), symbol),
            (Err(e), _) | (_, Err(e)) => {
                return Err(self.unavailable(&address, &e.to_string()));
            }
            _ => return Err(self.unavailable(&address, "name() and symbol() returned no data")),
        };

        let decimals = match decimals {
            Ok(raw) => decode_u8_result(&raw).unwrap_or(0),
            Err(e) => {
                debug!("decimals() failed for {} on {}: {}", address, self.chain.alias, e);
                0
            }
        };

        debug!(
            "Resolved token {} on {}: {} ({}), {} decimals",
            address, self.chain.alias, symbol, name, decimals
        );
        Ok(TokenInfo {
            address,
            name,
            symbol,
            decimals,
        })
    }

    async fn eth_call(&self, to: &str, selector: &str) -> std::result::Result<String, RpcError> {
        let value = call_with_timeout(
            self.transport.as_ref(),
            "eth_call",
            json!([{ "to": to, "data": selector }, "latest"]),
            self.timeout,
        )
        .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::InvalidResponse(format!("eth_call returned {}", value)))
    }

    fn unavailable(&self, token: &str, reason: &str) -> EvmClientError {
        EvmClientError::MetadataUnavailable {
            token: token.to_string(),
            reason: reason.to_string(),
        }
    }
}
