use anyhow::{bail, Context, Result};
use config_manager::{LoggingConfig, SystemConfig};
use job_orchestrator::{FetcherRegistry, TransactionProcessor};
use persistence_layer::{PoolSettings, PostgresClient, TransactionUpserter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tx_parser::ClassifierRegistry;

const USAGE: &str = "usage: chain_ingest <chain_alias> <tx_hash> [for_address]";

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.default_filter.as_str()));
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (chain_alias, tx_hash, for_address) = match args.as_slice() {
        [chain, hash] => (chain.as_str(), hash.as_str(), None),
        [chain, hash, address] => (chain.as_str(), hash.as_str(), Some(address.as_str())),
        _ => bail!(USAGE),
    };

    let logging = LoggingConfig::from_env().context("invalid logging configuration")?;
    init_tracing(&logging);
    let config = SystemConfig::load().context("failed to load configuration")?;

    let pool_settings = PoolSettings {
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        acquire_timeout: Duration::from_secs(config.database.acquire_timeout_seconds),
    };
    let postgres = PostgresClient::new(&config.database.postgres_url, &pool_settings)
        .await
        .context("failed to connect to PostgreSQL")?;
    if config.database.run_migrations {
        postgres.run_migrations().await.context("migrations failed")?;
    }

    let fetchers = FetcherRegistry::from_config(&config)?;
    let processor = TransactionProcessor::new(
        Arc::new(fetchers),
        Arc::new(ClassifierRegistry::default()),
        TransactionUpserter::new(Arc::new(postgres)),
    );

    match processor.process(chain_alias, tx_hash, for_address).await {
        Ok(result) => {
            info!("Ingested {} on {} as {}", result.tx_hash, result.chain_alias, result.transaction_id);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            error!(
                "Failed to ingest {} on {} ({}, retryable: {}): {}",
                tx_hash,
                chain_alias,
                e.kind(),
                e.is_retryable(),
                e
            );
            Err(e.into())
        }
    }
}
