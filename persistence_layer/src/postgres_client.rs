use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    AddressLinkRow, NativeTransferRow, PersistenceError, Result, StoredToken, StoredTransaction,
    StoredTransfers, TokenRow, TokenTransferRow, TransactionRow, TransactionStore, UpsertOutcome,
    UpsertPlan,
};

const MIGRATION_0001: &str = include_str!("../migrations/0001_transactions.sql");

/// Connection pool sizing
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// PostgreSQL store for classified transactions
#[derive(Debug, Clone)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    pub async fn new(database_url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| {
                PersistenceError::PoolCreation(format!("PostgreSQL connection error: {}", e))
            })?;

        info!(
            "PostgreSQL pool initialized: max_connections={}, min_connections={}, acquire_timeout={:?}",
            settings.max_connections, settings.min_connections, settings.acquire_timeout
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get connection pool metrics for monitoring
    pub fn get_pool_metrics(&self) -> (u32, u32) {
        (self.pool.size(), self.pool.num_idle() as u32)
    }

    /// Create the schema if it is missing. Every statement is `IF NOT EXISTS`.
    pub async fn run_migrations(&self) -> Result<()> {
        let statements = migration_statements(MIGRATION_0001);
        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PersistenceError::Migration(format!("{}: {}", first_line(statement), e)))?;
        }
        info!("Applied schema migration 0001 ({} statements)", statements.len());
        Ok(())
    }

    async fn upsert_token(tx: &mut Transaction<'_, Postgres>, token: &TokenRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens
            (id, chain_alias, address, name, symbol, decimals, needs_classification, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW(), NOW())
            ON CONFLICT (chain_alias, address)
            DO UPDATE SET
                name = EXCLUDED.name,
                symbol = EXCLUDED.symbol,
                decimals = EXCLUDED.decimals,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&token.chain_alias)
        .bind(&token.address)
        .bind(&token.name)
        .bind(&token.symbol)
        .bind(i16::from(token.decimals))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Chain facts are filled in only while missing; status and fee move on
    /// only from `pending`. Classification is always refreshed.
    async fn upsert_transaction(
        tx: &mut Transaction<'_, Postgres>,
        row: &TransactionRow,
    ) -> Result<(Uuid, bool)> {
        let block_number = row
            .block_number
            .map(i64::try_from)
            .transpose()
            .map_err(|_| PersistenceError::InvalidData(format!("block number {:?}", row.block_number)))?;

        let record = sqlx::query(
            r#"
            INSERT INTO transactions
            (id, chain_alias, tx_hash, block_number, block_hash, block_timestamp, from_address, to_address,
             value, fee, status, classification_type, classification_direction, classification_confidence,
             classification_label, has_full_internal_data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, CAST($9 AS NUMERIC), CAST($10 AS NUMERIC), $11, $12, $13,
                    $14, $15, $16, NOW(), NOW())
            ON CONFLICT (chain_alias, tx_hash)
            DO UPDATE SET
                block_number = COALESCE(transactions.block_number, EXCLUDED.block_number),
                block_hash = COALESCE(transactions.block_hash, EXCLUDED.block_hash),
                block_timestamp = COALESCE(transactions.block_timestamp, EXCLUDED.block_timestamp),
                fee = CASE WHEN transactions.status = 'pending' THEN EXCLUDED.fee ELSE transactions.fee END,
                status = CASE WHEN transactions.status = 'pending' THEN EXCLUDED.status ELSE transactions.status END,
                classification_type = EXCLUDED.classification_type,
                classification_direction = EXCLUDED.classification_direction,
                classification_confidence = EXCLUDED.classification_confidence,
                classification_label = EXCLUDED.classification_label,
                has_full_internal_data = EXCLUDED.has_full_internal_data,
                updated_at = NOW()
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.chain_alias)
        .bind(&row.tx_hash)
        .bind(block_number)
        .bind(&row.block_hash)
        .bind(row.block_timestamp)
        .bind(&row.from_address)
        .bind(&row.to_address)
        .bind(&row.value)
        .bind(&row.fee)
        .bind(&row.status)
        .bind(&row.classification_type)
        .bind(&row.classification_direction)
        .bind(&row.classification_confidence)
        .bind(&row.classification_label)
        .bind(row.has_full_internal_data)
        .fetch_one(&mut **tx)
        .await?;

        Ok((record.try_get("id")?, record.try_get("inserted")?))
    }

    async fn replace_transfers(
        tx: &mut Transaction<'_, Postgres>,
        transaction_id: Uuid,
        plan: &UpsertPlan,
    ) -> Result<()> {
        sqlx::query("DELETE FROM native_transfers WHERE tx_id = $1")
            .bind(transaction_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM token_transfers WHERE tx_id = $1")
            .bind(transaction_id)
            .execute(&mut **tx)
            .await?;

        for transfer in &plan.native_transfers {
            sqlx::query(
                r#"
                INSERT INTO native_transfers
                (tx_id, transfer_index, chain_alias, from_address, to_address, amount)
                VALUES ($1, $2, $3, $4, $5, CAST($6 AS NUMERIC))
                "#,
            )
            .bind(transaction_id)
            .bind(transfer.transfer_index as i32)
            .bind(&transfer.chain_alias)
            .bind(&transfer.from_address)
            .bind(&transfer.to_address)
            .bind(&transfer.amount)
            .execute(&mut **tx)
            .await?;
        }

        for transfer in &plan.token_transfers {
            let metadata_json = serde_json::to_string(&transfer.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO token_transfers
                (tx_id, transfer_index, chain_alias, token_address, from_address, to_address, amount,
                 transfer_type, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, CAST($7 AS NUMERIC), $8, CAST($9 AS JSONB))
                "#,
            )
            .bind(transaction_id)
            .bind(transfer.transfer_index as i32)
            .bind(&transfer.chain_alias)
            .bind(&transfer.token_address)
            .bind(&transfer.from_address)
            .bind(&transfer.to_address)
            .bind(&transfer.amount)
            .bind(&transfer.transfer_type)
            .bind(metadata_json)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Drop links of addresses the transaction no longer touches
    async fn prune_links(
        tx: &mut Transaction<'_, Postgres>,
        transaction_id: Uuid,
        plan: &UpsertPlan,
    ) -> Result<()> {
        let keep: Vec<String> = plan.address_links.iter().map(|l| l.address.clone()).collect();
        let removed = sqlx::query(
            "DELETE FROM address_transactions WHERE tx_id = $1 AND NOT (address = ANY($2))",
        )
        .bind(transaction_id)
        .bind(&keep)
        .execute(&mut **tx)
        .await?
        .rows_affected();
        if removed > 0 {
            debug!("Removed {} stale address links for {}", removed, transaction_id);
        }
        Ok(())
    }

    async fn upsert_link(
        tx: &mut Transaction<'_, Postgres>,
        transaction_id: Uuid,
        link: &AddressLinkRow,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO address_transactions
            (address, tx_id, chain_alias, has_native_transfer, has_token_transfer, total_value, direction,
             created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, CAST($6 AS NUMERIC), $7, NOW(), NOW())
            ON CONFLICT (address, tx_id)
            DO UPDATE SET
                has_native_transfer = EXCLUDED.has_native_transfer,
                has_token_transfer = EXCLUDED.has_token_transfer,
                total_value = EXCLUDED.total_value,
                direction = EXCLUDED.direction,
                updated_at = NOW()
            "#,
        )
        .bind(&link.address)
        .bind(transaction_id)
        .bind(&link.chain_alias)
        .bind(link.has_native_transfer)
        .bind(link.has_token_transfer)
        .bind(&link.total_value)
        .bind(&link.direction)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PostgresClient {
    async fn apply(&self, plan: &UpsertPlan) -> Result<UpsertOutcome> {
        // Dropping `tx` before commit rolls everything back
        let mut tx = self.pool.begin().await?;

        for token in &plan.tokens {
            Self::upsert_token(&mut tx, token).await?;
        }
        let (transaction_id, created) = Self::upsert_transaction(&mut tx, &plan.transaction).await?;
        Self::replace_transfers(&mut tx, transaction_id, plan).await?;
        Self::prune_links(&mut tx, transaction_id, plan).await?;
        for link in &plan.address_links {
            Self::upsert_link(&mut tx, transaction_id, link).await?;
        }

        tx.commit().await?;
        debug!(
            "Upserted {} on {}: id {}, {} tokens, {} transfers, {} links",
            plan.transaction.tx_hash,
            plan.transaction.chain_alias,
            transaction_id,
            plan.tokens.len(),
            plan.native_transfers.len() + plan.token_transfers.len(),
            plan.address_links.len()
        );
        Ok(UpsertOutcome {
            transaction_id,
            tokens_upserted: plan.tokens.len(),
            created,
        })
    }

    async fn find_transaction(&self, chain_alias: &str, tx_hash: &str) -> Result<Option<StoredTransaction>> {
        let row = sqlx::query(
            r#"
            SELECT id, chain_alias, tx_hash, block_number, block_hash, block_timestamp, from_address,
                   to_address, value::text AS value, fee::text AS fee, status, classification_type,
                   classification_direction, classification_confidence, classification_label,
                   has_full_internal_data
            FROM transactions
            WHERE chain_alias = $1 AND tx_hash = $2
            "#,
        )
        .bind(chain_alias)
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<StoredTransaction> {
            Ok(StoredTransaction {
                id: row.try_get("id")?,
                transaction: transaction_from_row(&row)?,
            })
        })
        .transpose()
    }

    async fn find_token(&self, chain_alias: &str, address: &str) -> Result<Option<StoredToken>> {
        let row = sqlx::query(
            r#"
            SELECT chain_alias, address, name, symbol, decimals, needs_classification
            FROM tokens
            WHERE chain_alias = $1 AND address = $2
            "#,
        )
        .bind(chain_alias)
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<StoredToken> {
            let decimals: i16 = row.try_get("decimals")?;
            Ok(StoredToken {
                token: TokenRow {
                    chain_alias: row.try_get("chain_alias")?,
                    address: row.try_get("address")?,
                    name: row.try_get("name")?,
                    symbol: row.try_get("symbol")?,
                    decimals: u8::try_from(decimals)
                        .map_err(|_| PersistenceError::InvalidData(format!("decimals {}", decimals)))?,
                },
                needs_classification: row.try_get("needs_classification")?,
            })
        })
        .transpose()
    }

    async fn transfers_for(&self, transaction_id: Uuid) -> Result<StoredTransfers> {
        let native_rows = sqlx::query(
            r#"
            SELECT transfer_index, chain_alias, from_address, to_address, amount::text AS amount
            FROM native_transfers
            WHERE tx_id = $1
            ORDER BY transfer_index
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        let token_rows = sqlx::query(
            r#"
            SELECT transfer_index, chain_alias, token_address, from_address, to_address,
                   amount::text AS amount, transfer_type, metadata::text AS metadata
            FROM token_transfers
            WHERE tx_id = $1
            ORDER BY transfer_index
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        let mut transfers = StoredTransfers::default();
        for row in native_rows {
            transfers.native.push(NativeTransferRow {
                transfer_index: transfer_index(&row)?,
                chain_alias: row.try_get("chain_alias")?,
                from_address: row.try_get("from_address")?,
                to_address: row.try_get("to_address")?,
                amount: row.try_get("amount")?,
            });
        }
        for row in token_rows {
            let metadata: String = row.try_get("metadata")?;
            transfers.token.push(TokenTransferRow {
                transfer_index: transfer_index(&row)?,
                chain_alias: row.try_get("chain_alias")?,
                token_address: row.try_get("token_address")?,
                from_address: row.try_get("from_address")?,
                to_address: row.try_get("to_address")?,
                amount: row.try_get("amount")?,
                transfer_type: row.try_get("transfer_type")?,
                metadata: serde_json::from_str(&metadata)?,
            });
        }
        Ok(transfers)
    }

    async fn address_links(&self, transaction_id: Uuid) -> Result<Vec<AddressLinkRow>> {
        let rows = sqlx::query(
            r#"
            SELECT address, chain_alias, has_native_transfer, has_token_transfer,
                   total_value::text AS total_value, direction
            FROM address_transactions
            WHERE tx_id = $1
            ORDER BY address
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AddressLinkRow> {
                Ok(AddressLinkRow {
                    address: row.try_get("address")?,
                    chain_alias: row.try_get("chain_alias")?,
                    has_native_transfer: row.try_get("has_native_transfer")?,
                    has_token_transfer: row.try_get("has_token_transfer")?,
                    total_value: row.try_get("total_value")?,
                    direction: row.try_get("direction")?,
                })
            })
            .collect()
    }
}

fn transaction_from_row(row: &PgRow) -> Result<TransactionRow> {
    let block_number: Option<i64> = row.try_get("block_number")?;
    let block_timestamp: Option<DateTime<Utc>> = row.try_get("block_timestamp")?;
    Ok(TransactionRow {
        chain_alias: row.try_get("chain_alias")?,
        tx_hash: row.try_get("tx_hash")?,
        block_number: block_number.and_then(|n| u64::try_from(n).ok()),
        block_hash: row.try_get("block_hash")?,
        block_timestamp,
        from_address: row.try_get("from_address")?,
        to_address: row.try_get("to_address")?,
        value: row.try_get("value")?,
        fee: row.try_get("fee")?,
        status: row.try_get("status")?,
        classification_type: row.try_get("classification_type")?,
        classification_direction: row.try_get("classification_direction")?,
        classification_confidence: row.try_get("classification_confidence")?,
        classification_label: row.try_get("classification_label")?,
        has_full_internal_data: row.try_get("has_full_internal_data")?,
    })
}

fn transfer_index(row: &PgRow) -> Result<u32> {
    let index: i32 = row.try_get("transfer_index")?;
    u32::try_from(index).map_err(|_| PersistenceError::InvalidData(format!("transfer index {}", index)))
}

/// Split a migration file into executable statements, dropping comment-only chunks
fn migration_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}
