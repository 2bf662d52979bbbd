//! Mock gateway for integration testing.
//!
//! Provides a deterministic `Gateway` implementation with scripted
//! quotes, a controllable market clock, recorded order submissions,
//! and settlement that can be stepped from test code — all in-memory
//! with no wallet node or quote service.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use dca_trader::gateway::Gateway;
use dca_trader::types::{Position, PositionStatus, Quote};

/// An order the engine submitted to the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmittedOrder {
    Buy {
        symbol: String,
        quantity: f64,
        funding_amount: f64,
    },
    Sell {
        symbol: String,
        wallet_id: u32,
        funding_requested: f64,
        quantity: f64,
    },
}

/// A deterministic gateway for loop-level testing.
pub struct MockGateway {
    reference_price: Mutex<Option<f64>>,
    quotes: Mutex<HashMap<String, Quote>>,
    market_open: AtomicBool,
    accept_orders: AtomicBool,
    balance: Mutex<f64>,
    orders: Mutex<Vec<SubmittedOrder>>,
    /// When true, reconcile settles every pending position immediately.
    settle_on_reconcile: AtomicBool,
    /// When set, reconcile fails with this message.
    reconcile_error: Mutex<Option<String>>,
    next_wallet_id: AtomicU32,
}

impl MockGateway {
    pub fn new(reference_price: f64, balance: f64) -> Self {
        Self {
            reference_price: Mutex::new(Some(reference_price)),
            quotes: Mutex::new(HashMap::new()),
            market_open: AtomicBool::new(true),
            accept_orders: AtomicBool::new(true),
            balance: Mutex::new(balance),
            orders: Mutex::new(Vec::new()),
            settle_on_reconcile: AtomicBool::new(false),
            reconcile_error: Mutex::new(None),
            next_wallet_id: AtomicU32::new(2),
        }
    }

    pub fn set_quote(&self, symbol: &str, bid: f64, ask: f64) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Quote { bid, ask });
    }

    pub fn set_reference_price(&self, price: Option<f64>) {
        *self.reference_price.lock().unwrap() = price;
    }

    pub fn set_market_open(&self, open: bool) {
        self.market_open.store(open, Ordering::SeqCst);
    }

    pub fn set_accept_orders(&self, accept: bool) {
        self.accept_orders.store(accept, Ordering::SeqCst);
    }

    pub fn set_settle_on_reconcile(&self, settle: bool) {
        self.settle_on_reconcile.store(settle, Ordering::SeqCst);
    }

    pub fn fail_reconcile(&self, msg: &str) {
        *self.reconcile_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn orders(&self) -> Vec<SubmittedOrder> {
        self.orders.lock().unwrap().clone()
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn reference_price(&self) -> Result<f64> {
        self.reference_price
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("reference price feed down"))
    }

    async fn instrument_quote(&self, symbol: &str) -> Result<Quote> {
        Ok(self
            .quotes
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or_else(Quote::unavailable))
    }

    async fn submit_buy(&self, symbol: &str, quantity: f64, funding_amount: f64) -> Result<bool> {
        if !self.accept_orders.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.orders.lock().unwrap().push(SubmittedOrder::Buy {
            symbol: symbol.to_string(),
            quantity,
            funding_amount,
        });
        *self.balance.lock().unwrap() -= funding_amount;
        Ok(true)
    }

    async fn submit_sell(
        &self,
        symbol: &str,
        wallet_id: u32,
        funding_requested: f64,
        quantity: f64,
    ) -> Result<bool> {
        if !self.accept_orders.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.orders.lock().unwrap().push(SubmittedOrder::Sell {
            symbol: symbol.to_string(),
            wallet_id,
            funding_requested,
            quantity,
        });
        *self.balance.lock().unwrap() += funding_requested;
        Ok(true)
    }

    async fn funding_balance(&self) -> Result<f64> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn reconcile_pending(&self, positions: &mut [Position]) -> Result<()> {
        if let Some(msg) = self.reconcile_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{msg}"));
        }
        if !self.settle_on_reconcile.load(Ordering::SeqCst) {
            return Ok(());
        }
        for pos in positions.iter_mut() {
            match pos.status {
                PositionStatus::PendingBuy => pos.settle_buy(),
                PositionStatus::PendingSell => pos.settle_sell(),
                PositionStatus::Tradable => {}
            }
        }
        Ok(())
    }

    fn market_open(&self) -> bool {
        self.market_open.load(Ordering::SeqCst)
    }

    async fn register_instrument(&self, _symbol: &str) -> Result<u32> {
        Ok(self.next_wallet_id.fetch_add(1, Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_quotes_default_to_sentinel() {
        let gw = MockGateway::new(100.0, 50.0);
        let q = gw.instrument_quote("AAPL").await.unwrap();
        assert_eq!(q, Quote::unavailable());

        gw.set_quote("AAPL", 49.0, 50.0);
        let q = gw.instrument_quote("AAPL").await.unwrap();
        assert!((q.ask - 50.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_mock_reference_price_failure() {
        let gw = MockGateway::new(100.0, 50.0);
        assert!(gw.reference_price().await.is_ok());
        gw.set_reference_price(None);
        assert!(gw.reference_price().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_records_orders_and_balance() {
        let gw = MockGateway::new(100.0, 50.0);
        assert!(gw.submit_buy("AAPL", 20.0, 10.0).await.unwrap());
        assert!(gw.submit_sell("AAPL", 2, 12.0, 20.0).await.unwrap());

        let orders = gw.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(
            orders[0],
            SubmittedOrder::Buy {
                symbol: "AAPL".to_string(),
                quantity: 20.0,
                funding_amount: 10.0,
            }
        );
        // 50 - 10 + 12
        assert!((gw.funding_balance().await.unwrap() - 52.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_mock_rejects_when_told() {
        let gw = MockGateway::new(100.0, 50.0);
        gw.set_accept_orders(false);
        assert!(!gw.submit_buy("AAPL", 20.0, 10.0).await.unwrap());
        assert_eq!(gw.order_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_reconcile_settles_pending() {
        let gw = MockGateway::new(100.0, 50.0);
        gw.set_settle_on_reconcile(true);

        let mut buy = Position::new("AAPL");
        buy.holdings = 20.0;
        buy.total_cost = 10.0;
        buy.status = PositionStatus::PendingBuy;

        let mut sell = Position::new("TSLA");
        sell.holdings = 5.0;
        sell.total_cost = 4.0;
        sell.buy_count = 2;
        sell.status = PositionStatus::PendingSell;

        let mut positions = vec![buy, sell];
        gw.reconcile_pending(&mut positions).await.unwrap();

        assert_eq!(positions[0].status, PositionStatus::Tradable);
        assert!((positions[0].holdings - 20.0).abs() < 1e-10);

        assert_eq!(positions[1].status, PositionStatus::Tradable);
        assert!(positions[1].is_flat());
        assert_eq!(positions[1].buy_count, 0);
    }

    #[tokio::test]
    async fn test_mock_reconcile_forced_error() {
        let gw = MockGateway::new(100.0, 50.0);
        gw.fail_reconcile("wallet node offline");
        let mut positions = vec![Position::new("AAPL")];
        let err = gw.reconcile_pending(&mut positions).await.unwrap_err();
        assert!(err.to_string().contains("offline"));
    }
}
