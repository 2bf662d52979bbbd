//! The polling trading loop.
//!
//! Owns every position and drives them through one tick at a time:
//! fetch the reference price, evaluate each symbol in its fixed config
//! order, persist, reconcile pending settlements, and report aggregate
//! totals. Strictly sequential — one symbol is fully processed before
//! the next begins, so positions are never aliased.
//!
//! `run_tick` is separated from `run` so tests can step through many
//! ticks without sleeping.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::gateway::Gateway;
use crate::store::PositionStore;
use crate::types::{Position, PositionStatus, TickReport};

pub struct TradingLoop {
    gateway: Arc<dyn Gateway>,
    store: PositionStore,
    positions: Vec<Position>,
    cfg: AppConfig,
    tick: u64,
}

impl TradingLoop {
    /// Restore (or create) one position per configured symbol and
    /// register each instrument with the wallet.
    ///
    /// Failures here are fatal: without the store and the wallet
    /// accounts there is no initial state to trade from.
    pub async fn new(
        cfg: AppConfig,
        gateway: Arc<dyn Gateway>,
        store: PositionStore,
    ) -> Result<Self> {
        let mut positions = Vec::with_capacity(cfg.trader.symbols.len());
        for symbol in &cfg.trader.symbols {
            let mut position = match store.load(symbol).await? {
                Some(p) => {
                    info!(
                        symbol = %symbol,
                        holdings = format!("{:.4}", p.holdings),
                        buys = p.buy_count,
                        status = %p.status,
                        "Restored position"
                    );
                    p
                }
                None => {
                    let p = Position::new(symbol.clone());
                    store.upsert(&p).await?;
                    info!(symbol = %symbol, "Created fresh position");
                    p
                }
            };
            position.wallet_id = gateway.register_instrument(symbol).await?;
            info!(symbol = %symbol, wallet_id = position.wallet_id, "Instrument registered");
            positions.push(position);
        }

        Ok(Self {
            gateway,
            store,
            positions,
            cfg,
            tick: 0,
        })
    }

    /// Positions in their fixed processing order (mainly for tests).
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Run one full pass over all positions.
    pub async fn run_tick(&mut self) -> Result<TickReport> {
        self.tick += 1;

        let reference_price = match self.gateway.reference_price().await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to fetch reference price, backing off");
                return Ok(TickReport::degraded(self.tick));
            }
        };

        let market_open = self.gateway.market_open();
        let increment = self.cfg.strategy.buy_fraction * self.cfg.funding.invested_funding;
        let mut portfolio_value = 0.0;

        for position in self.positions.iter_mut() {
            if position.status == PositionStatus::Tradable && market_open {
                let outcome = if position.is_flat() {
                    position
                        .buy(
                            increment,
                            reference_price,
                            self.gateway.as_ref(),
                            &self.store,
                            &self.cfg.strategy,
                        )
                        .await
                } else {
                    // Take profit if we can; otherwise see whether the
                    // drop warrants averaging down or cutting losses.
                    match position
                        .sell(
                            reference_price,
                            false,
                            self.gateway.as_ref(),
                            &self.store,
                            &self.cfg.strategy,
                        )
                        .await
                    {
                        Ok(()) if position.status == PositionStatus::Tradable => {
                            position
                                .handle_drawdown(
                                    reference_price,
                                    increment,
                                    self.gateway.as_ref(),
                                    &self.store,
                                    &self.cfg.strategy,
                                )
                                .await
                        }
                        other => other,
                    }
                };
                if let Err(e) = outcome {
                    error!(
                        symbol = %position.symbol,
                        error = %e,
                        "Trade bookkeeping failed, retrying next tick"
                    );
                }
            } else if !position
                .refresh_quote(reference_price, self.gateway.as_ref())
                .await
            {
                continue;
            }

            info!(
                symbol = %position.symbol,
                price = format!("{:.6}", position.current_price / reference_price),
                avg_price = format!("{:.6}", position.avg_price),
                profit = format!("{:.2}%", position.profit_ratio * 100.0),
                buys = position.buy_count,
                value = format!("${:.2}", position.market_value()),
                status = %position.status,
                "Position"
            );

            portfolio_value += position.market_value();

            if let Err(e) = self.store.upsert(position).await {
                error!(
                    symbol = %position.symbol,
                    error = %e,
                    "Failed to persist position, retrying next tick"
                );
            }
        }

        if let Err(e) = self.gateway.reconcile_pending(&mut self.positions).await {
            error!(error = %e, "Pending reconciliation failed, check the wallet");
        }

        let funding_balance = match self.gateway.funding_balance().await {
            Ok(b) => Some(b),
            Err(e) => {
                warn!(error = %e, "Failed to fetch funding balance");
                None
            }
        };

        let net_worth = funding_balance.map(|b| b + portfolio_value / reference_price);
        let profit_vs_funding = net_worth.map(|n| n / self.cfg.funding.invested_funding - 1.0);
        let profit_vs_usd = net_worth
            .map(|n| n * reference_price / self.cfg.funding.invested_usd - 1.0);

        if let (Some(balance), Some(net), Some(pf), Some(pu)) =
            (funding_balance, net_worth, profit_vs_funding, profit_vs_usd)
        {
            info!(
                portfolio_usd = format!("${portfolio_value:.2}"),
                balance = format!("{balance:.4}"),
                net_worth = format!("{net:.4}"),
                profit_funding = format!("{:.2}%", pf * 100.0),
                profit_usd = format!("{:.2}%", pu * 100.0),
                "Tick complete"
            );
        }

        Ok(TickReport {
            tick: self.tick,
            reference_price: Some(reference_price),
            market_open,
            portfolio_value,
            funding_balance,
            net_worth,
            profit_vs_funding,
            profit_vs_usd,
        })
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.cfg.trader.tick_interval_secs)
    }

    fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.cfg.trader.idle_interval_secs)
    }

    /// Loop forever: tick, sleep, repeat — until Ctrl+C.
    pub async fn run(&mut self) -> Result<()> {
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            symbols = self.positions.len(),
            "Entering trading loop. Press Ctrl+C to stop."
        );

        loop {
            let delay = match self.run_tick().await {
                Ok(report) if report.is_degraded() => self.idle_interval(),
                Ok(report) if report.market_open => self.tick_interval(),
                Ok(_) => self.idle_interval(),
                Err(e) => {
                    error!(error = %e, "Tick failed — continuing to next");
                    self.idle_interval()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }

        Ok(())
    }
}
