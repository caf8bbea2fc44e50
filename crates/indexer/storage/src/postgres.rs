//! Postgres adapter for the storage contract.

use crate::{Storage, StorageError, StorageReader, StorageWriter};
use async_trait::async_trait;
use indexer_types::{Block, Transaction};
use sqlx::{
    PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};
use tracing::{debug, info};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS blocks (
        hash          TEXT PRIMARY KEY,
        number        BIGINT NOT NULL,
        gas_limit     BIGINT NOT NULL,
        gas_used      BIGINT NOT NULL,
        difficulty    NUMERIC NOT NULL,
        time          BIGINT NOT NULL,
        parent_hash   TEXT NOT NULL,
        nonce         TEXT NOT NULL,
        miner         TEXT NOT NULL,
        size          BIGINT NOT NULL,
        root_hash     TEXT NOT NULL,
        uncle_hash    TEXT NOT NULL,
        tx_hash       TEXT NOT NULL,
        receipt_hash  TEXT NOT NULL,
        extra_data    BYTEA NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS blocks_number_key ON blocks (number ASC)",
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        hash          TEXT PRIMARY KEY,
        from_address  TEXT NOT NULL,
        to_address    TEXT,
        contract      TEXT NOT NULL,
        value         NUMERIC NOT NULL,
        data          BYTEA NOT NULL,
        gas           BIGINT NOT NULL,
        gas_price     NUMERIC NOT NULL,
        cost          NUMERIC NOT NULL,
        nonce         BIGINT NOT NULL,
        status        BIGINT NOT NULL,
        block_hash    TEXT NOT NULL
    )
    "#,
];

const BLOCK_COLUMNS: &str = "hash, number, gas_limit, gas_used, difficulty::text AS difficulty, \
     time, parent_hash, nonce, miner, size, root_hash, uncle_hash, tx_hash, receipt_hash, \
     extra_data";

const TX_COLUMNS: &str = "hash, from_address, to_address, contract, value::text AS value, data, \
     gas, gas_price::text AS gas_price, cost::text AS cost, nonce, status, block_hash";

/// [`Storage`] backed by a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connects to the database at `url` and bootstraps the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        info!(target: "storage", "Connected to postgres");
        Ok(storage)
    }

    /// Wraps an existing pool. The schema is not touched.
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `blocks` and `transactions` tables and the unique block number index if missing.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(target: "storage", "Schema ready");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

fn to_bigint(column: &str, value: u64) -> Result<i64, StorageError> {
    i64::try_from(value)
        .map_err(|_| StorageError::Corrupt(format!("{column} {value} exceeds BIGINT range")))
}

fn from_bigint(row: &PgRow, column: &str) -> Result<u64, StorageError> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| StorageError::Corrupt(format!("negative {column}: {value}")))
}

fn block_from_row(row: &PgRow) -> Result<Block, StorageError> {
    Ok(Block {
        hash: row.try_get("hash")?,
        number: from_bigint(row, "number")?,
        gas_limit: from_bigint(row, "gas_limit")?,
        gas_used: from_bigint(row, "gas_used")?,
        difficulty: row.try_get("difficulty")?,
        time: from_bigint(row, "time")?,
        parent_hash: row.try_get("parent_hash")?,
        nonce: row.try_get("nonce")?,
        miner: row.try_get("miner")?,
        size: from_bigint(row, "size")?,
        root_hash: row.try_get("root_hash")?,
        uncle_hash: row.try_get("uncle_hash")?,
        tx_hash: row.try_get("tx_hash")?,
        receipt_hash: row.try_get("receipt_hash")?,
        extra_data: row.try_get::<Vec<u8>, _>("extra_data")?.into(),
    })
}

fn tx_from_row(row: &PgRow) -> Result<Transaction, StorageError> {
    Ok(Transaction {
        hash: row.try_get("hash")?,
        from: row.try_get("from_address")?,
        to: row.try_get("to_address")?,
        contract: row.try_get("contract")?,
        value: row.try_get("value")?,
        data: row.try_get::<Vec<u8>, _>("data")?.into(),
        gas: from_bigint(row, "gas")?,
        gas_price: row.try_get("gas_price")?,
        cost: row.try_get("cost")?,
        nonce: from_bigint(row, "nonce")?,
        status: from_bigint(row, "status")?,
        block_hash: row.try_get("block_hash")?,
    })
}

#[async_trait]
impl StorageWriter for PostgresStorage {
    async fn insert_block(&self, block: &Block) -> Result<(), StorageError> {
        self.ensure_open()?;
        let result = sqlx::query(
            r#"
            INSERT INTO blocks (hash, number, gas_limit, gas_used, difficulty, time, parent_hash,
                nonce, miner, size, root_hash, uncle_hash, tx_hash, receipt_hash, extra_data)
            VALUES ($1, $2, $3, $4, $5::numeric, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&block.hash)
        .bind(to_bigint("number", block.number)?)
        .bind(to_bigint("gas_limit", block.gas_limit)?)
        .bind(to_bigint("gas_used", block.gas_used)?)
        .bind(&block.difficulty)
        .bind(to_bigint("time", block.time)?)
        .bind(&block.parent_hash)
        .bind(&block.nonce)
        .bind(&block.miner)
        .bind(to_bigint("size", block.size)?)
        .bind(&block.root_hash)
        .bind(&block.uncle_hash)
        .bind(&block.tx_hash)
        .bind(&block.receipt_hash)
        .bind(&block.extra_data[..])
        .execute(&self.pool)
        .await?;

        // Either the hash or the number is already stored. First write wins.
        if result.rows_affected() == 0 {
            debug!(target: "storage", hash = %block.hash, number = block.number, "Block skipped");
        }
        Ok(())
    }

    async fn insert_tx(&self, tx: &Transaction) -> Result<(), StorageError> {
        self.ensure_open()?;
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (hash, from_address, to_address, contract, value, data, gas,
                gas_price, cost, nonce, status, block_hash)
            VALUES ($1, $2, $3, $4, $5::numeric, $6, $7, $8::numeric, $9::numeric, $10, $11, $12)
            ON CONFLICT (hash) DO NOTHING
            "#,
        )
        .bind(&tx.hash)
        .bind(&tx.from)
        .bind(tx.to.as_deref())
        .bind(&tx.contract)
        .bind(&tx.value)
        .bind(&tx.data[..])
        .bind(to_bigint("gas", tx.gas)?)
        .bind(&tx.gas_price)
        .bind(&tx.cost)
        .bind(to_bigint("nonce", tx.nonce)?)
        .bind(to_bigint("status", tx.status)?)
        .bind(&tx.block_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(target: "storage", hash = %tx.hash, "Transaction already stored");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageReader for PostgresStorage {
    async fn first_block(&self) -> Result<Block, StorageError> {
        self.ensure_open()?;
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY number ASC LIMIT 1");
        sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(block_from_row)
            .unwrap_or_else(|| Err(StorageError::NotFound("no blocks stored".to_string())))
    }

    async fn block_by_number(&self, number: u64) -> Result<Block, StorageError> {
        self.ensure_open()?;
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE number = $1 LIMIT 1");
        sqlx::query(&sql)
            .bind(to_bigint("number", number)?)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(block_from_row)
            .unwrap_or_else(|| Err(StorageError::NotFound(format!("block {number}"))))
    }

    async fn blocks(&self) -> Result<Vec<Block>, StorageError> {
        self.ensure_open()?;
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY number ASC");
        sqlx::query(&sql).fetch_all(&self.pool).await?.iter().map(block_from_row).collect()
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, StorageError> {
        self.ensure_open()?;
        let sql = format!("SELECT {TX_COLUMNS} FROM transactions WHERE hash = $1");
        sqlx::query(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(tx_from_row)
            .unwrap_or_else(|| Err(StorageError::NotFound(format!("transaction {hash}"))))
    }

    async fn txs(&self) -> Result<Vec<Transaction>, StorageError> {
        self.ensure_open()?;
        let sql = format!("SELECT {TX_COLUMNS} FROM transactions");
        sqlx::query(&sql).fetch_all(&self.pool).await?.iter().map(tx_from_row).collect()
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn clear(&self) -> Result<(), StorageError> {
        self.ensure_open()?;
        sqlx::query("TRUNCATE TABLE blocks, transactions").execute(&self.pool).await?;
        info!(target: "storage", "Cleared blocks and transactions");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}
