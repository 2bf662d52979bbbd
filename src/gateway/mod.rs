//! Quote/wallet gateway.
//!
//! Defines the `Gateway` trait — the single seam between the trading
//! engine and the outside world — and provides the production
//! implementation composed from:
//! - the funding-chain wallet RPC (transfers, balances, settlement)
//! - the tokenized-equity quote service (bid/ask, market hours)

pub mod live;
pub mod quotes;
pub mod wallet;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Position, Quote};

/// Abstraction over external price lookup and asset transfer.
///
/// All engine decision logic goes through this trait, so tests can swap
/// in a deterministic double. Methods that submit orders return
/// `Ok(false)` on rejection — the caller must not mutate state in that
/// case.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Price of the funding currency in its settlement unit (USD).
    /// Errors are transient; the caller backs off and retries.
    async fn reference_price(&self) -> Result<f64>;

    /// Bid/ask for a tokenized equity. A `0.0` side means the service
    /// could not price it right now — never a valid price.
    async fn instrument_quote(&self, symbol: &str) -> Result<Quote>;

    /// Submit a buy: send `funding_amount` to the instrument's buy
    /// route, expecting `quantity` tokens back.
    async fn submit_buy(&self, symbol: &str, quantity: f64, funding_amount: f64) -> Result<bool>;

    /// Submit a sell: send `quantity` tokens from the instrument's
    /// wallet account, requesting `funding_requested` back.
    async fn submit_sell(
        &self,
        symbol: &str,
        wallet_id: u32,
        funding_requested: f64,
        quantity: f64,
    ) -> Result<bool>;

    /// Spendable funding-currency balance.
    async fn funding_balance(&self) -> Result<f64>;

    /// Flip settled PENDING_* positions back to TRADABLE. May fail as a
    /// whole; the loop catches, logs, and carries on.
    async fn reconcile_pending(&self, positions: &mut [Position]) -> Result<()>;

    /// Whether the equity market is currently in session. Gates order
    /// logic only — price refresh runs regardless.
    fn market_open(&self) -> bool;

    /// Ensure a wallet account exists for the instrument and return its
    /// id. Idempotent; called once per symbol at startup.
    async fn register_instrument(&self, symbol: &str) -> Result<u32>;
}
