//! DCA trader — tokenized-equity accumulation daemon.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the position store (fatal if unreachable), wires the wallet
//! and quote clients into the live gateway, and runs the polling
//! trading loop with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use dca_trader::config::AppConfig;
use dca_trader::engine::trader::TradingLoop;
use dca_trader::gateway::live::LiveGateway;
use dca_trader::gateway::quotes::{MarketCalendar, QuoteClient};
use dca_trader::gateway::wallet::WalletClient;
use dca_trader::store::PositionStore;

const BANNER: &str = r#"
  ____   ____    _     _____ ____      _    ____  _____ ____
 |  _ \ / ___|  / \   |_   _|  _ \    / \  |  _ \| ____|  _ \
 | | | | |     / _ \    | | | |_) |  / _ \ | | | |  _| | |_) |
 | |_| | |___ / ___ \   | | |  _ <  / ___ \| |_| | |___|  _ <
 |____/ \____/_/   \_\  |_| |_| \_\/_/   \_\____/|_____|_| \_\

  Dollar-Cost Averaging for tokenized equities
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        symbols = cfg.trader.symbols.len(),
        tick_interval_secs = cfg.trader.tick_interval_secs,
        idle_interval_secs = cfg.trader.idle_interval_secs,
        invested_funding = cfg.funding.invested_funding,
        "DCA trader starting up"
    );

    // -- Persistence (fatal if unreachable: no initial state) ------------

    let store = PositionStore::connect(&cfg.trader.db_path).await?;

    // -- Gateway ---------------------------------------------------------

    let wallet_key = std::env::var(&cfg.wallet.api_key_env).ok();
    if wallet_key.is_none() {
        info!(env = %cfg.wallet.api_key_env, "No wallet API key set, using unauthenticated RPC");
    }
    let wallet = WalletClient::new(cfg.wallet.rpc_url.clone(), wallet_key)?;

    let quotes_key = cfg
        .quotes
        .api_key_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok());
    let quotes = QuoteClient::new(cfg.quotes.base_url.clone(), quotes_key)?;

    let calendar = MarketCalendar::new(
        cfg.quotes.open_hour_utc,
        cfg.quotes.open_minute_utc,
        cfg.quotes.close_hour_utc,
    );

    let gateway = Arc::new(LiveGateway::new(
        wallet,
        quotes,
        calendar,
        &cfg.instruments,
    ));

    // -- Trading loop ----------------------------------------------------

    let mut trader = TradingLoop::new(cfg, gateway, store).await?;
    trader.run().await?;

    info!("DCA trader shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dca_trader=info"));

    let json_logging = std::env::var("DCA_TRADER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
