//! Per-position decision logic: buy, sell, drawdown handling.
//!
//! Every operation here is all-or-nothing: a zero-price sentinel, a
//! gateway error, or an order rejection aborts the operation with no
//! state mutated, and the next tick retries. Only a successfully
//! submitted order mutates the position, and only storage failures
//! propagate to the caller.
//!
//! Amount conventions: `funding_amount` and `total_cost` are in the
//! funding currency; quotes and `current_price` are in the instrument's
//! quote currency (USD); `reference_price` converts between the two.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::StrategyConfig;
use crate::gateway::Gateway;
use crate::store::PositionStore;
use crate::types::{Position, PositionStatus, TradeAction};

impl Position {
    /// Attempt an opening or averaging-down buy of `funding_amount`.
    ///
    /// `quantity = funding_amount * reference_price / ask`. On an
    /// accepted order the position moves to `PendingBuy` and a BUY row
    /// is appended to the ledger.
    pub async fn buy(
        &mut self,
        funding_amount: f64,
        reference_price: f64,
        gateway: &dyn Gateway,
        store: &PositionStore,
        strategy: &StrategyConfig,
    ) -> Result<()> {
        if strategy.sell_only_symbols.iter().any(|s| s == &self.symbol) {
            info!(symbol = %self.symbol, "Sell-only symbol, skipping buy");
            return Ok(());
        }

        let quote = match gateway.instrument_quote(&self.symbol).await {
            Ok(q) => q,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Quote fetch failed, skipping buy");
                return Ok(());
            }
        };
        if !quote.has_ask() {
            warn!(symbol = %self.symbol, "Ask price unavailable, skipping buy");
            return Ok(());
        }
        let ask = quote.ask;
        let quantity = funding_amount * reference_price / ask;

        match gateway.submit_buy(&self.symbol, quantity, funding_amount).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(symbol = %self.symbol, "Buy order rejected");
                return Ok(());
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Buy submission failed");
                return Ok(());
            }
        }

        self.holdings += quantity;
        self.last_buy_price = ask;
        self.total_cost += funding_amount;
        self.avg_price = self.total_cost / self.holdings;
        self.current_price = ask;
        self.profit_ratio =
            self.holdings * self.current_price / reference_price / self.total_cost - 1.0;
        self.buy_count += 1;
        self.status = PositionStatus::PendingBuy;
        self.last_updated = Utc::now();

        store
            .append_trade(
                &self.symbol,
                TradeAction::Buy,
                ask,
                quantity,
                funding_amount,
                0.0,
            )
            .await?;

        info!(
            symbol = %self.symbol,
            quantity = format!("{quantity:.4}"),
            price = format!("${ask:.2}"),
            spent = format!("{funding_amount:.4}"),
            buys = self.buy_count,
            "Buy order submitted"
        );
        Ok(())
    }

    /// Attempt to liquidate the full holdings.
    ///
    /// Proceeds are `holdings * bid / reference_price`; the order is
    /// submitted only when the resulting profit clears the configured
    /// threshold or liquidation is forced. Holdings and cost basis stay
    /// in place until settlement confirms the transfer.
    pub async fn sell(
        &mut self,
        reference_price: f64,
        force: bool,
        gateway: &dyn Gateway,
        store: &PositionStore,
        strategy: &StrategyConfig,
    ) -> Result<()> {
        let quote = match gateway.instrument_quote(&self.symbol).await {
            Ok(q) => q,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Quote fetch failed, skipping sell");
                return Ok(());
            }
        };
        if !quote.has_bid() {
            warn!(symbol = %self.symbol, "Bid price unavailable, skipping sell");
            return Ok(());
        }

        self.current_price = quote.bid;
        let proceeds = self.holdings * self.current_price / reference_price;
        self.profit_ratio = proceeds / self.total_cost - 1.0;

        if self.profit_ratio < strategy.min_profit && !force {
            return Ok(());
        }

        match gateway
            .submit_sell(&self.symbol, self.wallet_id, proceeds, self.holdings)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(symbol = %self.symbol, "Sell order rejected");
                return Ok(());
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Sell submission failed");
                return Ok(());
            }
        }

        store
            .append_trade(
                &self.symbol,
                TradeAction::Sell,
                self.current_price,
                self.holdings,
                self.total_cost,
                self.profit_ratio,
            )
            .await?;

        self.status = PositionStatus::PendingSell;
        self.last_updated = Utc::now();

        info!(
            symbol = %self.symbol,
            quantity = format!("{:.4}", self.holdings),
            price = format!("${:.2}", self.current_price),
            profit = format!("{:.2}%", self.profit_ratio * 100.0),
            "Sell order submitted"
        );
        Ok(())
    }

    /// React to a price drop when the regular sell pass left the
    /// position tradable.
    ///
    /// Two mutually exclusive branches, checked in order:
    /// - stop-loss: the buy budget is exhausted AND the loss exceeds
    ///   the maximum → force a full liquidation at the current ask;
    /// - DCA: the price dropped at least `dca_threshold` below the last
    ///   fill and buys remain → repurchase `increment` more.
    pub async fn handle_drawdown(
        &mut self,
        reference_price: f64,
        increment: f64,
        gateway: &dyn Gateway,
        store: &PositionStore,
        strategy: &StrategyConfig,
    ) -> Result<()> {
        let quote = match gateway.instrument_quote(&self.symbol).await {
            Ok(q) => q,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Quote fetch failed, skipping drawdown check");
                return Ok(());
            }
        };
        if !quote.has_ask() {
            warn!(symbol = %self.symbol, "Ask price unavailable, skipping drawdown check");
            return Ok(());
        }

        self.current_price = quote.ask;
        self.profit_ratio =
            self.holdings * self.current_price / reference_price / self.total_cost - 1.0;

        let last = match store.last_trade(&self.symbol).await? {
            Some(t) => t,
            None => {
                debug!(symbol = %self.symbol, "No trade history, skipping drawdown check");
                return Ok(());
            }
        };
        let last_price = last.implied_price();
        let drop_pct = (last_price - self.current_price / reference_price) / last_price;
        debug!(
            symbol = %self.symbol,
            last_price = format!("{last_price:.6}"),
            current = format!("{:.6}", self.current_price / reference_price),
            drop = format!("{:.2}%", drop_pct * 100.0),
            "Drawdown check"
        );

        if self.buy_count == strategy.max_buy_times && self.profit_ratio < -strategy.max_loss {
            let proceeds = self.holdings * self.current_price / reference_price;
            match gateway
                .submit_sell(&self.symbol, self.wallet_id, proceeds, self.holdings)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(symbol = %self.symbol, "Stop-loss sell rejected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "Stop-loss submission failed");
                    return Ok(());
                }
            }

            store
                .append_trade(
                    &self.symbol,
                    TradeAction::Sell,
                    self.current_price,
                    self.holdings,
                    self.total_cost,
                    self.profit_ratio,
                )
                .await?;

            self.status = PositionStatus::PendingSell;
            self.last_updated = Utc::now();

            info!(
                symbol = %self.symbol,
                quantity = format!("{:.4}", self.holdings),
                price = format!("${:.2}", self.current_price),
                loss = format!("{:.2}%", self.profit_ratio * 100.0),
                "Stop-loss sell submitted, loss exceeded the maximum"
            );
            return Ok(());
        }

        if drop_pct >= strategy.dca_threshold && self.buy_count < strategy.max_buy_times {
            info!(
                symbol = %self.symbol,
                drop = format!("{:.2}%", drop_pct * 100.0),
                "Price drawdown reached threshold, repurchasing"
            );
            self.buy(increment, reference_price, gateway, store, strategy)
                .await?;
        }
        Ok(())
    }

    /// Passive quote refresh for closed-market and pending positions.
    ///
    /// Updates `current_price` and, while holding, `profit_ratio`.
    /// Returns false when no price was available so the loop can skip
    /// the symbol's status line and persistence for this tick.
    pub async fn refresh_quote(&mut self, reference_price: f64, gateway: &dyn Gateway) -> bool {
        let quote = match gateway.instrument_quote(&self.symbol).await {
            Ok(q) => q,
            Err(e) => {
                info!(symbol = %self.symbol, error = %e, "Quote refresh failed, skipping");
                return false;
            }
        };
        if !quote.has_ask() {
            info!(symbol = %self.symbol, "Quote refresh returned no price, skipping");
            return false;
        }
        self.current_price = quote.ask;
        if self.total_cost > 0.0 {
            self.profit_ratio =
                self.holdings * self.current_price / reference_price / self.total_cost - 1.0;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
