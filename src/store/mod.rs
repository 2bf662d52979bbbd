//! Persistence layer.
//!
//! Two SQLite tables: `positions` holds one row per symbol and is
//! replaced in full on every tick; `trades` is the append-only ledger
//! used for audit and for the "price at last fill" lookup that drives
//! drawdown decisions.
//!
//! The pool is capped at a single connection — the trading loop is
//! strictly sequential, and one connection also makes `sqlite::memory:`
//! behave in tests.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::debug;

use crate::types::{Position, PositionStatus, TradeAction, TradeRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS positions (
    symbol         TEXT PRIMARY KEY,
    holdings       REAL NOT NULL,
    buy_count      INTEGER NOT NULL,
    last_buy_price REAL NOT NULL,
    total_cost     REAL NOT NULL,
    avg_price      REAL NOT NULL,
    current_price  REAL NOT NULL,
    profit_ratio   REAL NOT NULL,
    status         TEXT NOT NULL,
    last_updated   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trades (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol         TEXT NOT NULL,
    action         TEXT NOT NULL,
    price          REAL NOT NULL,
    quantity       REAL NOT NULL,
    funding_amount REAL NOT NULL,
    profit_ratio   REAL NOT NULL,
    executed_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades (symbol, id);
"#;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Raw `positions` row; status is parsed into the enum on the way out.
#[derive(Debug, sqlx::FromRow)]
struct PositionRow {
    symbol: String,
    holdings: f64,
    buy_count: i64,
    last_buy_price: f64,
    total_cost: f64,
    avg_price: f64,
    current_price: f64,
    profit_ratio: f64,
    status: String,
    last_updated: DateTime<Utc>,
}

impl TryFrom<PositionRow> for Position {
    type Error = anyhow::Error;

    fn try_from(row: PositionRow) -> Result<Self> {
        Ok(Position {
            symbol: row.symbol,
            holdings: row.holdings,
            buy_count: row.buy_count as u32,
            last_buy_price: row.last_buy_price,
            current_price: row.current_price,
            total_cost: row.total_cost,
            avg_price: row.avg_price,
            profit_ratio: row.profit_ratio,
            status: PositionStatus::from_str(&row.status)?,
            last_updated: row.last_updated,
            wallet_id: 0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    id: i64,
    symbol: String,
    action: String,
    price: f64,
    quantity: f64,
    funding_amount: f64,
    profit_ratio: f64,
    executed_at: DateTime<Utc>,
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = anyhow::Error;

    fn try_from(row: TradeRow) -> Result<Self> {
        Ok(TradeRecord {
            id: row.id,
            symbol: row.symbol,
            action: TradeAction::from_str(&row.action)?,
            price: row.price,
            quantity: row.quantity,
            funding_amount: row.funding_amount,
            profit_ratio: row.profit_ratio,
            executed_at: row.executed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the SQLite database. Cheap to clone (pooled).
#[derive(Debug, Clone)]
pub struct PositionStore {
    pool: SqlitePool,
}

impl PositionStore {
    /// Open (creating if missing) the database and ensure the schema.
    ///
    /// Unreachable storage at startup is fatal to the process: the loop
    /// cannot establish initial state without it.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {url}"))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create schema")?;

        debug!(url, "Position store ready");
        Ok(Self { pool })
    }

    /// Load the persisted position for a symbol, None for first-timers.
    pub async fn load(&self, symbol: &str) -> Result<Option<Position>> {
        let row: Option<PositionRow> = sqlx::query_as(
            "SELECT symbol, holdings, buy_count, last_buy_price, total_cost, \
             avg_price, current_price, profit_ratio, status, last_updated \
             FROM positions WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load position for {symbol}"))?;

        row.map(Position::try_from).transpose()
    }

    /// Full-row replace keyed by symbol. Idempotent; last writer wins.
    pub async fn upsert(&self, position: &Position) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO positions \
             (symbol, holdings, buy_count, last_buy_price, total_cost, \
              avg_price, current_price, profit_ratio, status, last_updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&position.symbol)
        .bind(position.holdings)
        .bind(position.buy_count as i64)
        .bind(position.last_buy_price)
        .bind(position.total_cost)
        .bind(position.avg_price)
        .bind(position.current_price)
        .bind(position.profit_ratio)
        .bind(position.status.to_string())
        .bind(position.last_updated)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert position for {}", position.symbol))?;

        Ok(())
    }

    /// Append one immutable ledger row, timestamped at insertion.
    pub async fn append_trade(
        &self,
        symbol: &str,
        action: TradeAction,
        price: f64,
        quantity: f64,
        funding_amount: f64,
        profit_ratio: f64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO trades \
             (symbol, action, price, quantity, funding_amount, profit_ratio, executed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(symbol)
        .bind(action.to_string())
        .bind(price)
        .bind(quantity)
        .bind(funding_amount)
        .bind(profit_ratio)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record {action} trade for {symbol}"))?;

        Ok(())
    }

    /// Most recent ledger row for a symbol, by insertion order.
    pub async fn last_trade(&self, symbol: &str) -> Result<Option<TradeRecord>> {
        let row: Option<TradeRow> = sqlx::query_as(
            "SELECT id, symbol, action, price, quantity, funding_amount, \
             profit_ratio, executed_at \
             FROM trades WHERE symbol = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load last trade for {symbol}"))?;

        row.map(TradeRecord::try_from).transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
