//! End-to-end tick simulations.
//!
//! Drives `TradingLoop::run_tick` against the mock gateway and an
//! in-memory SQLite store, stepping through multi-tick scenarios
//! without sleeping.

use std::sync::Arc;

use dca_trader::config::{
    AppConfig, FundingConfig, InstrumentConfig, QuotesConfig, StrategyConfig, TraderConfig,
    WalletConfig,
};
use dca_trader::engine::trader::TradingLoop;
use dca_trader::store::PositionStore;
use dca_trader::types::{Position, PositionStatus, TradeAction};

use crate::mock_gateway::{MockGateway, SubmittedOrder};

fn config(symbols: &[&str]) -> AppConfig {
    AppConfig {
        trader: TraderConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            tick_interval_secs: 60,
            idle_interval_secs: 300,
            db_path: "unused".to_string(),
        },
        strategy: StrategyConfig {
            buy_fraction: 0.1,
            min_profit: 0.1,
            max_buy_times: 4,
            dca_threshold: 0.05,
            max_loss: 0.3,
            sell_only_symbols: Vec::new(),
        },
        funding: FundingConfig {
            invested_funding: 50.0,
            invested_usd: 1500.0,
        },
        wallet: WalletConfig {
            rpc_url: "https://localhost:9256".to_string(),
            api_key_env: "WALLET_API_KEY".to_string(),
        },
        quotes: QuotesConfig {
            base_url: "https://quotes.invalid/v1".to_string(),
            api_key_env: None,
            open_hour_utc: 13,
            open_minute_utc: 30,
            close_hour_utc: 20,
        },
        instruments: symbols
            .iter()
            .map(|s| InstrumentConfig {
                symbol: s.to_string(),
                asset_id: format!("asset-{s}"),
                buy_address: format!("buy-{s}"),
                sell_address: format!("sell-{s}"),
            })
            .collect(),
    }
}

async fn setup(symbols: &[&str]) -> (Arc<MockGateway>, PositionStore, TradingLoop) {
    let gateway = Arc::new(MockGateway::new(100.0, 50.0));
    let store = PositionStore::connect("sqlite::memory:").await.unwrap();
    let trader = TradingLoop::new(config(symbols), gateway.clone(), store.clone())
        .await
        .unwrap();
    (gateway, store, trader)
}

#[tokio::test]
async fn test_startup_creates_positions() {
    let (_gateway, store, trader) = setup(&["AAPL", "TSLA"]).await;

    assert_eq!(trader.positions().len(), 2);
    assert_eq!(trader.positions()[0].symbol, "AAPL");
    assert!(trader.positions()[0].is_flat());
    // Registration handed out distinct wallet accounts.
    assert_ne!(
        trader.positions()[0].wallet_id,
        trader.positions()[1].wallet_id
    );

    // Fresh rows were persisted immediately.
    assert!(store.load("AAPL").await.unwrap().is_some());
    assert!(store.load("TSLA").await.unwrap().is_some());
}

#[tokio::test]
async fn test_startup_restores_existing_position() {
    let gateway = Arc::new(MockGateway::new(100.0, 50.0));
    let store = PositionStore::connect("sqlite::memory:").await.unwrap();

    let mut seeded = Position::new("AAPL");
    seeded.holdings = 20.0;
    seeded.total_cost = 10.0;
    seeded.avg_price = 0.5;
    seeded.buy_count = 2;
    seeded.status = PositionStatus::PendingSell;
    store.upsert(&seeded).await.unwrap();

    let trader = TradingLoop::new(config(&["AAPL"]), gateway, store)
        .await
        .unwrap();

    let pos = &trader.positions()[0];
    assert!((pos.holdings - 20.0).abs() < 1e-10);
    assert_eq!(pos.buy_count, 2);
    assert_eq!(pos.status, PositionStatus::PendingSell);
}

#[tokio::test]
async fn test_opening_tick_buys_flat_positions() {
    let (gateway, store, mut trader) = setup(&["AAPL", "TSLA"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);
    gateway.set_quote("TSLA", 199.0, 200.0);

    let report = trader.run_tick().await.unwrap();

    // increment = 0.1 * 50 = 5 funding units each
    let orders = gateway.orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(
        orders[0],
        SubmittedOrder::Buy {
            symbol: "AAPL".to_string(),
            quantity: 10.0, // 5 * 100 / 50
            funding_amount: 5.0,
        }
    );

    for pos in trader.positions() {
        assert_eq!(pos.status, PositionStatus::PendingBuy);
        assert_eq!(pos.buy_count, 1);
        assert!((pos.total_cost - 5.0).abs() < 1e-10);
    }

    // Persisted state matches memory (upsert ran before reconcile).
    let persisted = store.load("AAPL").await.unwrap().unwrap();
    assert_eq!(persisted.status, PositionStatus::PendingBuy);
    assert!((persisted.holdings - 10.0).abs() < 1e-10);

    // Ledger has one BUY per symbol.
    let aapl = store.last_trade("AAPL").await.unwrap().unwrap();
    assert_eq!(aapl.action, TradeAction::Buy);
    assert!((aapl.price - 50.0).abs() < 1e-10);

    // portfolio = 10*50 + 2.5*200 = 1000 USD
    assert!(!report.is_degraded());
    assert!((report.portfolio_value - 1000.0).abs() < 1e-9);
    assert!(report.funding_balance.is_some());
}

#[tokio::test]
async fn test_degraded_tick_on_reference_failure() {
    let (gateway, _store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);
    gateway.set_reference_price(None);

    let report = trader.run_tick().await.unwrap();

    assert!(report.is_degraded());
    assert_eq!(gateway.order_count(), 0);
    assert_eq!(trader.positions()[0].status, PositionStatus::Tradable);
}

#[tokio::test]
async fn test_closed_market_only_refreshes() {
    let (gateway, store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);
    gateway.set_market_open(false);

    let report = trader.run_tick().await.unwrap();

    assert_eq!(gateway.order_count(), 0);
    let pos = &trader.positions()[0];
    assert_eq!(pos.status, PositionStatus::Tradable);
    assert!((pos.current_price - 50.0).abs() < 1e-10);
    assert!(!report.market_open);

    // Refreshed price still persisted.
    let persisted = store.load("AAPL").await.unwrap().unwrap();
    assert!((persisted.current_price - 50.0).abs() < 1e-10);
}

#[tokio::test]
async fn test_pending_position_excluded_from_trading() {
    let (gateway, store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);

    // Tick 1 opens the position and leaves it pending.
    trader.run_tick().await.unwrap();
    assert_eq!(trader.positions()[0].status, PositionStatus::PendingBuy);
    assert_eq!(gateway.order_count(), 1);

    // Tick 2 must not trade it again while pending; price still tracks.
    gateway.set_quote("AAPL", 54.0, 55.0);
    trader.run_tick().await.unwrap();
    assert_eq!(gateway.order_count(), 1);
    let pos = &trader.positions()[0];
    assert_eq!(pos.status, PositionStatus::PendingBuy);
    assert!((pos.current_price - 55.0).abs() < 1e-10);

    let persisted = store.load("AAPL").await.unwrap().unwrap();
    assert!((persisted.current_price - 55.0).abs() < 1e-10);
}

#[tokio::test]
async fn test_quote_outage_skips_symbol() {
    let (gateway, store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_market_open(false);
    // No quote scripted at all → sentinel → symbol skipped entirely.

    let report = trader.run_tick().await.unwrap();

    assert_eq!(gateway.order_count(), 0);
    assert!((report.portfolio_value - 0.0).abs() < 1e-10);
    // The skipped symbol was not re-persisted this tick; the row is
    // still the startup snapshot.
    let persisted = store.load("AAPL").await.unwrap().unwrap();
    assert!((persisted.current_price - 0.0).abs() < 1e-10);
}

#[tokio::test]
async fn test_full_buy_settle_sell_cycle() {
    let (gateway, store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);
    gateway.set_settle_on_reconcile(true);

    // Tick 1: opening buy, settled by reconciliation at tick end.
    trader.run_tick().await.unwrap();
    {
        let pos = &trader.positions()[0];
        assert_eq!(pos.status, PositionStatus::Tradable);
        assert!((pos.holdings - 10.0).abs() < 1e-10);
        assert_eq!(pos.buy_count, 1);
    }

    // Tick 2: price up, profit 6/5 - 1 = 0.2 clears the 0.1 threshold.
    gateway.set_quote("AAPL", 60.0, 61.0);
    trader.run_tick().await.unwrap();

    let orders = gateway.orders();
    assert_eq!(orders.len(), 2);
    match &orders[1] {
        SubmittedOrder::Sell {
            symbol,
            funding_requested,
            quantity,
            ..
        } => {
            assert_eq!(symbol, "AAPL");
            assert!((funding_requested - 6.0).abs() < 1e-10);
            assert!((quantity - 10.0).abs() < 1e-10);
        }
        other => panic!("expected sell, got {other:?}"),
    }

    // Settlement zeroed the position back to flat.
    let pos = &trader.positions()[0];
    assert!(pos.is_flat());
    assert_eq!(pos.total_cost, 0.0);
    assert_eq!(pos.buy_count, 0);
    assert_eq!(pos.status, PositionStatus::Tradable);

    // Ledger: BUY then SELL with the realized ratio.
    let last = store.last_trade("AAPL").await.unwrap().unwrap();
    assert_eq!(last.action, TradeAction::Sell);
    assert!((last.profit_ratio - 0.2).abs() < 1e-10);
}

#[tokio::test]
async fn test_drawdown_repurchase_through_loop() {
    let (gateway, store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);
    gateway.set_settle_on_reconcile(true);

    // Tick 1: opening buy at ask 50 — 5 funding units for 10 shares,
    // so the ledger implies 0.5 funding/share.
    trader.run_tick().await.unwrap();

    // Tick 2: bid too low to take profit, ask down 10% from the last
    // fill → DCA repurchase.
    gateway.set_quote("AAPL", 40.0, 45.0);
    trader.run_tick().await.unwrap();

    let orders = gateway.orders();
    assert_eq!(orders.len(), 2);
    match &orders[1] {
        SubmittedOrder::Buy {
            symbol,
            quantity,
            funding_amount,
        } => {
            assert_eq!(symbol, "AAPL");
            assert!((funding_amount - 5.0).abs() < 1e-10);
            assert!((quantity - 5.0 * 100.0 / 45.0).abs() < 1e-9);
        }
        other => panic!("expected DCA buy, got {other:?}"),
    }

    let pos = &trader.positions()[0];
    assert_eq!(pos.buy_count, 2);
    assert!((pos.total_cost - 10.0).abs() < 1e-10);

    let last = store.last_trade("AAPL").await.unwrap().unwrap();
    assert_eq!(last.action, TradeAction::Buy);
    assert!((last.price - 45.0).abs() < 1e-10);
}

#[tokio::test]
async fn test_reconcile_failure_does_not_abort_tick() {
    let (gateway, _store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);
    gateway.fail_reconcile("wallet node offline");

    let report = trader.run_tick().await.unwrap();

    // The buy still went through and the report still aggregates.
    assert_eq!(gateway.order_count(), 1);
    assert!(!report.is_degraded());
    assert!(report.funding_balance.is_some());
    assert_eq!(trader.positions()[0].status, PositionStatus::PendingBuy);
}

#[tokio::test]
async fn test_rejected_orders_leave_no_trace() {
    let (gateway, store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);
    gateway.set_accept_orders(false);

    trader.run_tick().await.unwrap();

    let pos = &trader.positions()[0];
    assert!(pos.is_flat());
    assert_eq!(pos.buy_count, 0);
    assert_eq!(pos.status, PositionStatus::Tradable);
    assert!(store.last_trade("AAPL").await.unwrap().is_none());
}

#[tokio::test]
async fn test_net_worth_aggregation() {
    let (gateway, _store, mut trader) = setup(&["AAPL"]).await;
    gateway.set_quote("AAPL", 49.0, 50.0);

    let report = trader.run_tick().await.unwrap();

    // Balance started at 50, buy spent 5 → 45; portfolio 10*50 = 500 USD
    // → 5 funding units at reference 100. Net worth 50, exactly the
    // invested_funding baseline.
    assert!((report.portfolio_value - 500.0).abs() < 1e-9);
    let balance = report.funding_balance.unwrap();
    assert!((balance - 45.0).abs() < 1e-10);
    let net = report.net_worth.unwrap();
    assert!((net - 50.0).abs() < 1e-10);
    assert!(report.profit_vs_funding.unwrap().abs() < 1e-10);
    // invested_usd baseline is 1500; 50 funding * $100 = $5000 → +233%
    assert!((report.profit_vs_usd.unwrap() - (5000.0 / 1500.0 - 1.0)).abs() < 1e-9);
}
