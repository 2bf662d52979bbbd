//! Shared types for the DCA trader.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that gateway, store, and engine
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle of a per-symbol position.
///
/// `Tradable` is the resting state in which buy/sell evaluation runs.
/// A submitted order parks the position in a pending state until the
/// wallet confirms settlement and reconciliation flips it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Tradable,
    PendingBuy,
    PendingSell,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Tradable => write!(f, "TRADABLE"),
            PositionStatus::PendingBuy => write!(f, "PENDING_BUY"),
            PositionStatus::PendingSell => write!(f, "PENDING_SELL"),
        }
    }
}

impl std::str::FromStr for PositionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRADABLE" => Ok(PositionStatus::Tradable),
            "PENDING_BUY" => Ok(PositionStatus::PendingBuy),
            "PENDING_SELL" => Ok(PositionStatus::PendingSell),
            _ => Err(anyhow::anyhow!("Unknown position status: {s}")),
        }
    }
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for TradeAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            _ => Err(anyhow::anyhow!("Unknown trade action: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// Bid/ask pair for a tokenized equity, in its quote currency.
///
/// `0.0` is the sentinel for "price unavailable" — never a valid price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    /// Sentinel quote for a symbol the service could not price.
    pub fn unavailable() -> Self {
        Quote { bid: 0.0, ask: 0.0 }
    }

    pub fn has_bid(&self) -> bool {
        self.bid != 0.0
    }

    pub fn has_ask(&self) -> bool {
        self.ask != 0.0
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bid=${:.2} ask=${:.2}", self.bid, self.ask)
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Per-symbol trading state.
///
/// One row per symbol in the `positions` table. All mutation happens on
/// the trading loop's thread; the loop processes symbols one at a time,
/// so no position is ever touched concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Quantity of the tokenized equity currently owned.
    pub holdings: f64,
    /// Completed buy fills since the last full liquidation.
    pub buy_count: u32,
    pub last_buy_price: f64,
    pub current_price: f64,
    /// Cumulative funding-currency amount spent acquiring `holdings`.
    pub total_cost: f64,
    /// `total_cost / holdings` while holding, zero when flat.
    pub avg_price: f64,
    pub profit_ratio: f64,
    pub status: PositionStatus,
    pub last_updated: DateTime<Utc>,
    /// Wallet account for this instrument, assigned at registration.
    /// Runtime-only — not persisted.
    #[serde(skip)]
    pub wallet_id: u32,
}

impl Position {
    /// A fresh, flat position for a first-time symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            holdings: 0.0,
            buy_count: 0,
            last_buy_price: 0.0,
            current_price: 0.0,
            total_cost: 0.0,
            avg_price: 0.0,
            profit_ratio: 0.0,
            status: PositionStatus::Tradable,
            last_updated: Utc::now(),
            wallet_id: 0,
        }
    }

    /// Whether there is nothing held (eligible for an opening buy).
    pub fn is_flat(&self) -> bool {
        self.holdings == 0.0
    }

    /// Current market value in the instrument's quote currency.
    pub fn market_value(&self) -> f64 {
        self.holdings * self.current_price
    }

    /// Buy transfer confirmed on-chain: the position trades again.
    pub fn settle_buy(&mut self) {
        self.status = PositionStatus::Tradable;
        self.last_updated = Utc::now();
    }

    /// Sell transfer confirmed on-chain: the full liquidation lands,
    /// so holdings, cost basis and the buy counter all reset.
    pub fn settle_sell(&mut self) {
        self.holdings = 0.0;
        self.total_cost = 0.0;
        self.avg_price = 0.0;
        self.buy_count = 0;
        self.status = PositionStatus::Tradable;
        self.last_updated = Utc::now();
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: holdings={:.4} avg={:.6} cost={:.4} profit={:.2}% buys={} [{}]",
            self.symbol,
            self.holdings,
            self.avg_price,
            self.total_cost,
            self.profit_ratio * 100.0,
            self.buy_count,
            self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Trade ledger
// ---------------------------------------------------------------------------

/// One immutable row of the append-only trade ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,
    pub symbol: String,
    pub action: TradeAction,
    /// Fill price in the instrument's quote currency.
    pub price: f64,
    pub quantity: f64,
    /// Funding-currency amount: spent on buys, cost basis on sells.
    pub funding_amount: f64,
    /// Realized profit ratio. Zero for buys.
    pub profit_ratio: f64,
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    /// Funding-currency price per unit implied by this fill.
    /// Drives the drawdown computation against the previous trade.
    pub fn implied_price(&self) -> f64 {
        self.funding_amount / self.quantity
    }
}

impl fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} {:.4} @ ${:.2} ({:.4} funding, {:.2}%)",
            self.id,
            self.action,
            self.symbol,
            self.quantity,
            self.price,
            self.funding_amount,
            self.profit_ratio * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

/// Aggregate summary of one pass over all positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    /// None when the reference price could not be fetched and the whole
    /// tick degraded to a backoff no-op.
    pub reference_price: Option<f64>,
    pub market_open: bool,
    /// Sum of holdings × current price across symbols (quote currency).
    pub portfolio_value: f64,
    pub funding_balance: Option<f64>,
    /// balance + portfolio value converted into funding units.
    pub net_worth: Option<f64>,
    pub profit_vs_funding: Option<f64>,
    pub profit_vs_usd: Option<f64>,
}

impl TickReport {
    /// A tick that never got past the reference-price fetch.
    pub fn degraded(tick: u64) -> Self {
        Self {
            tick,
            reference_price: None,
            market_open: false,
            portfolio_value: 0.0,
            funding_balance: None,
            net_worth: None,
            profit_vs_funding: None,
            profit_vs_usd: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.reference_price.is_none()
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_degraded() {
            return write!(f, "Tick #{}: degraded (no reference price)", self.tick);
        }
        write!(
            f,
            "Tick #{}: market_open={} portfolio=${:.2} balance={} net={}",
            self.tick,
            self.market_open,
            self.portfolio_value,
            self.funding_balance
                .map_or_else(|| "n/a".to_string(), |b| format!("{b:.4}")),
            self.net_worth
                .map_or_else(|| "n/a".to_string(), |n| format!("{n:.4}")),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the trader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Quote service error ({symbol}): {message}")]
    QuoteService { symbol: String, message: String },

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
