use chain_core::{
    normalize_alias, ChainFamily, ChainSpec, FetchedTransaction, HttpRpcTransport, IngestError,
    RpcTransport, TokenInfo,
};
use config_manager::{ChainConfig, SystemConfig};
use evm_client::{EvmFetchOptions, EvmFetcher, EvmTokenMetadataFetcher};
use retry_utils::RetryConfig;
use solana_client::{SvmFetchOptions, SvmFetcher, SvmTokenMetadataFetcher};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{OrchestratorError, Result};

/// Per-chain timeouts and trace handling
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub rpc_timeout: Duration,
    pub trace_timeout: Duration,
    pub metadata_timeout: Duration,
    pub fetch_traces: bool,
    pub max_trace_depth: u32,
    pub retry: RetryConfig,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(15),
            trace_timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(5),
            fetch_traces: true,
            max_trace_depth: 64,
            retry: RetryConfig::default(),
        }
    }
}

impl IngestOptions {
    pub fn from_config(config: &SystemConfig, chain: &ChainConfig) -> Self {
        Self {
            rpc_timeout: config.rpc_timeout_for(chain),
            trace_timeout: config.ingestion.trace_timeout(),
            metadata_timeout: config.ingestion.metadata_timeout(),
            fetch_traces: config.ingestion.fetch_traces,
            max_trace_depth: config.ingestion.max_trace_depth,
            retry: config.retry.to_retry_config(),
        }
    }
}

/// Transaction fetcher for one chain, one variant per family
pub enum ChainFetcher {
    Evm(EvmFetcher),
    Svm(SvmFetcher),
}

impl ChainFetcher {
    pub fn chain(&self) -> &ChainSpec {
        match self {
            ChainFetcher::Evm(fetcher) => fetcher.chain(),
            ChainFetcher::Svm(fetcher) => fetcher.chain(),
        }
    }

    pub async fn fetch(&self, tx_hash: &str) -> std::result::Result<FetchedTransaction, IngestError> {
        match self {
            ChainFetcher::Evm(fetcher) => fetcher.fetch(tx_hash).await.map_err(IngestError::from),
            ChainFetcher::Svm(fetcher) => fetcher.fetch(tx_hash).await.map_err(IngestError::from),
        }
    }
}

/// Token metadata resolver for one chain
pub enum TokenMetadataSource {
    Evm(EvmTokenMetadataFetcher),
    Svm(SvmTokenMetadataFetcher),
}

impl TokenMetadataSource {
    pub async fn fetch(&self, token_address: &str) -> std::result::Result<TokenInfo, IngestError> {
        match self {
            TokenMetadataSource::Evm(fetcher) => {
                fetcher.fetch(token_address).await.map_err(IngestError::from)
            }
            TokenMetadataSource::Svm(fetcher) => {
                fetcher.fetch(token_address).await.map_err(IngestError::from)
            }
        }
    }
}

pub struct ChainClients {
    pub fetcher: ChainFetcher,
    pub metadata: TokenMetadataSource,
}

impl ChainClients {
    pub fn new(spec: ChainSpec, transport: Arc<dyn RpcTransport>, options: &IngestOptions) -> Self {
        match spec.family {
            ChainFamily::Evm => {
                let fetch_options = EvmFetchOptions {
                    rpc_timeout: options.rpc_timeout,
                    trace_timeout: options.trace_timeout,
                    fetch_traces: options.fetch_traces,
                    max_trace_depth: options.max_trace_depth,
                    retry: options.retry.clone(),
                };
                Self {
                    metadata: TokenMetadataSource::Evm(EvmTokenMetadataFetcher::new(
                        spec.clone(),
                        transport.clone(),
                        options.metadata_timeout,
                    )),
                    fetcher: ChainFetcher::Evm(EvmFetcher::new(spec, transport, fetch_options)),
                }
            }
            ChainFamily::Svm => {
                let fetch_options = SvmFetchOptions {
                    rpc_timeout: options.rpc_timeout,
                    max_trace_depth: options.max_trace_depth,
                    retry: options.retry.clone(),
                };
                Self {
                    metadata: TokenMetadataSource::Svm(SvmTokenMetadataFetcher::new(
                        spec.clone(),
                        transport.clone(),
                        options.metadata_timeout,
                    )),
                    fetcher: ChainFetcher::Svm(SvmFetcher::new(spec, transport, fetch_options)),
                }
            }
        }
    }

    pub fn chain(&self) -> &ChainSpec {
        self.fetcher.chain()
    }
}

/// Chain alias to fetchers. Aliases are trimmed and lowercased on both
/// registration and lookup.
#[derive(Default)]
pub struct FetcherRegistry {
    chains: HashMap<String, ChainClients>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One HTTP transport per configured chain
    pub fn from_config(config: &SystemConfig) -> Result<Self> {
        Self::from_config_with(config, |chain, timeout| {
            let transport = HttpRpcTransport::new(&chain.rpc_url, timeout)
                .map_err(|e| OrchestratorError::Config(format!("chain '{}': {}", chain.alias, e)))?;
            Ok(Arc::new(transport) as Arc<dyn RpcTransport>)
        })
    }

    /// Build from configuration with a caller-supplied transport per chain
    pub fn from_config_with<F>(config: &SystemConfig, mut transport_for: F) -> Result<Self>
    where
        F: FnMut(&ChainConfig, Duration) -> Result<Arc<dyn RpcTransport>>,
    {
        let mut registry = Self::new();
        for chain in &config.chains {
            let spec = chain
                .spec()
                .map_err(|e| OrchestratorError::Config(e.to_string()))?;
            let options = IngestOptions::from_config(config, chain);
            // The HTTP client deadline must outlast the slowest call made through it
            let transport_timeout = options
                .rpc_timeout
                .max(options.trace_timeout)
                .max(options.metadata_timeout);
            let transport = transport_for(chain, transport_timeout)?;
            registry.register(spec, transport, &options);
        }
        info!("Registered {} chains: {:?}", registry.chains.len(), registry.aliases());
        Ok(registry)
    }

    pub fn register(&mut self, spec: ChainSpec, transport: Arc<dyn RpcTransport>, options: &IngestOptions) {
        let alias = normalize_alias(&spec.alias);
        debug!("Registering {} chain '{}'", spec.family, alias);
        self.chains
            .insert(alias, ChainClients::new(spec, transport, options));
    }

    pub fn get(&self, chain_alias: &str) -> std::result::Result<&ChainClients, IngestError> {
        let alias = normalize_alias(chain_alias);
        self.chains
            .get(&alias)
            .ok_or_else(|| IngestError::Validation(format!("Unknown chain alias '{}'", chain_alias)))
    }

    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }
}
