//! Production gateway: wallet RPC + quote service + instrument routing.
//!
//! Order submission is an on-chain transfer: buys send funding to the
//! venue's buy address, sells send tokens to its sell address with the
//! requested proceeds in the memo. Settlement reconciliation polls the
//! per-instrument wallet accounts for unconfirmed transactions.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use super::quotes::{MarketCalendar, QuoteClient};
use super::wallet::{WalletClient, FUNDING_WALLET_ID};
use super::Gateway;
use crate::config::InstrumentConfig;
use crate::types::{Position, PositionStatus, Quote, TraderError};

/// Transfer routing for one instrument, resolved from config.
#[derive(Debug, Clone)]
pub struct InstrumentRoute {
    pub asset_id: String,
    pub buy_address: String,
    pub sell_address: String,
}

impl From<&InstrumentConfig> for InstrumentRoute {
    fn from(cfg: &InstrumentConfig) -> Self {
        Self {
            asset_id: cfg.asset_id.clone(),
            buy_address: cfg.buy_address.clone(),
            sell_address: cfg.sell_address.clone(),
        }
    }
}

/// The real thing: composes the wallet node and the quote service.
pub struct LiveGateway {
    wallet: WalletClient,
    quotes: QuoteClient,
    calendar: MarketCalendar,
    routes: HashMap<String, InstrumentRoute>,
}

impl LiveGateway {
    pub fn new(
        wallet: WalletClient,
        quotes: QuoteClient,
        calendar: MarketCalendar,
        instruments: &[InstrumentConfig],
    ) -> Self {
        let routes = instruments
            .iter()
            .map(|i| (i.symbol.clone(), InstrumentRoute::from(i)))
            .collect();
        Self {
            wallet,
            quotes,
            calendar,
            routes,
        }
    }

    fn route(&self, symbol: &str) -> Result<&InstrumentRoute> {
        self.routes
            .get(symbol)
            .ok_or_else(|| TraderError::UnknownInstrument(symbol.to_string()).into())
    }
}

#[async_trait]
impl Gateway for LiveGateway {
    async fn reference_price(&self) -> Result<f64> {
        self.wallet.funding_price().await
    }

    async fn instrument_quote(&self, symbol: &str) -> Result<Quote> {
        self.quotes.quote(symbol).await
    }

    async fn submit_buy(&self, symbol: &str, quantity: f64, funding_amount: f64) -> Result<bool> {
        let route = self.route(symbol)?;
        debug!(symbol, quantity, funding_amount, "Submitting buy transfer");
        self.wallet
            .send_asset(
                FUNDING_WALLET_ID,
                &route.buy_address,
                funding_amount,
                vec![symbol.to_string(), format!("{quantity}")],
            )
            .await
    }

    async fn submit_sell(
        &self,
        symbol: &str,
        wallet_id: u32,
        funding_requested: f64,
        quantity: f64,
    ) -> Result<bool> {
        let route = self.route(symbol)?;
        debug!(symbol, quantity, funding_requested, "Submitting sell transfer");
        self.wallet
            .send_asset(
                wallet_id,
                &route.sell_address,
                quantity,
                vec![symbol.to_string(), format!("{funding_requested}")],
            )
            .await
    }

    async fn funding_balance(&self) -> Result<f64> {
        self.wallet.spendable_balance(FUNDING_WALLET_ID).await
    }

    async fn reconcile_pending(&self, positions: &mut [Position]) -> Result<()> {
        for pos in positions.iter_mut() {
            if pos.status == PositionStatus::Tradable {
                continue;
            }
            let pending = self.wallet.pending_transaction_count(pos.wallet_id).await?;
            if pending > 0 {
                debug!(
                    symbol = %pos.symbol,
                    pending,
                    status = %pos.status,
                    "Still awaiting settlement"
                );
                continue;
            }
            match pos.status {
                PositionStatus::PendingBuy => {
                    pos.settle_buy();
                    info!(symbol = %pos.symbol, "Buy settled, position tradable again");
                }
                PositionStatus::PendingSell => {
                    pos.settle_sell();
                    info!(symbol = %pos.symbol, "Sell settled, position liquidated");
                }
                PositionStatus::Tradable => unreachable!(),
            }
        }
        Ok(())
    }

    fn market_open(&self) -> bool {
        self.calendar.is_open_now()
    }

    async fn register_instrument(&self, symbol: &str) -> Result<u32> {
        let route = self.route(symbol)?;
        self.wallet.register_asset(symbol, &route.asset_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
