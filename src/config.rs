//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::types::TraderError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub trader: TraderConfig,
    pub strategy: StrategyConfig,
    pub funding: FundingConfig,
    pub wallet: WalletConfig,
    pub quotes: QuotesConfig,
    pub instruments: Vec<InstrumentConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraderConfig {
    /// Symbol universe, in fixed processing order.
    pub symbols: Vec<String>,
    /// Sleep between ticks while the market is open.
    pub tick_interval_secs: u64,
    /// Sleep while the market is closed, and the backoff after a failed
    /// reference-price fetch.
    pub idle_interval_secs: u64,
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    /// Per-trade funding increment as a fraction of `invested_funding`.
    pub buy_fraction: f64,
    /// Minimum profit ratio before an un-forced sell is submitted.
    pub min_profit: f64,
    /// Maximum consecutive buy fills before DCA stops averaging down.
    pub max_buy_times: u32,
    /// Drawdown versus the last fill that triggers a repurchase.
    pub dca_threshold: f64,
    /// Loss ratio beyond which a maxed-out position is force-liquidated.
    pub max_loss: f64,
    /// Symbols we only ever unwind, never open or add to.
    #[serde(default)]
    pub sell_only_symbols: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FundingConfig {
    /// Total investment baseline in funding-currency units (reporting).
    pub invested_funding: f64,
    /// Same baseline in USD (secondary reporting reference).
    pub invested_usd: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    pub rpc_url: String,
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotesConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Trading session window, UTC. Weekends are always closed.
    pub open_hour_utc: u32,
    #[serde(default)]
    pub open_minute_utc: u32,
    pub close_hour_utc: u32,
}

/// Transfer routing for one tokenized equity.
#[derive(Debug, Deserialize, Clone)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// On-chain asset identifier, used for wallet registration.
    pub asset_id: String,
    /// Address funding is sent to when buying.
    pub buy_address: String,
    /// Address tokens are sent to when selling.
    pub sell_address: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check values that would otherwise fail deep inside a tick.
    pub fn validate(&self) -> Result<()> {
        if self.trader.symbols.is_empty() {
            return Err(TraderError::Config("trader.symbols is empty".into()).into());
        }
        let routes = self.instrument_routes();
        for symbol in &self.trader.symbols {
            if !routes.contains_key(symbol.as_str()) {
                return Err(TraderError::Config(format!(
                    "no [[instruments]] entry for trading symbol {symbol}"
                ))
                .into());
            }
        }
        if !(0.0..=1.0).contains(&self.strategy.buy_fraction) || self.strategy.buy_fraction == 0.0 {
            return Err(TraderError::Config(format!(
                "strategy.buy_fraction must be in (0, 1], got {}",
                self.strategy.buy_fraction
            ))
            .into());
        }
        if self.strategy.max_buy_times == 0 {
            return Err(TraderError::Config("strategy.max_buy_times must be >= 1".into()).into());
        }
        if self.strategy.dca_threshold <= 0.0 || self.strategy.max_loss <= 0.0 {
            return Err(TraderError::Config(
                "strategy.dca_threshold and strategy.max_loss must be positive".into(),
            )
            .into());
        }
        if self.funding.invested_funding <= 0.0 || self.funding.invested_usd <= 0.0 {
            return Err(TraderError::Config(
                "funding baselines must be positive".into(),
            )
            .into());
        }
        Ok(())
    }

    /// Instrument routing table keyed by symbol.
    pub fn instrument_routes(&self) -> HashMap<&str, &InstrumentConfig> {
        self.instruments
            .iter()
            .map(|i| (i.symbol.as_str(), i))
            .collect()
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
