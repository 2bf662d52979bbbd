//! Tokenized-equity quote service client.
//!
//! Fetches bid/ask per symbol over REST. An instrument the service
//! cannot price right now comes back as the zero-sentinel `Quote` so
//! the engine treats it as a soft, retryable condition rather than an
//! error. Transport failures still surface as errors.
//!
//! Market-hours gating is computed locally from a configured UTC
//! session window — the underlying equities only trade while the stock
//! exchange is open, even though the token venue never closes.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::types::Quote;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Quote payload; either side may be absent or zero when the venue has
/// no liquidity for it.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    bid: Option<f64>,
    #[serde(default)]
    ask: Option<f64>,
}

impl From<QuoteResponse> for Quote {
    fn from(resp: QuoteResponse) -> Self {
        Quote {
            bid: resp.bid.unwrap_or(0.0),
            ask: resp.ask.unwrap_or(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Market calendar
// ---------------------------------------------------------------------------

/// Weekday session window in UTC.
#[derive(Debug, Clone, Copy)]
pub struct MarketCalendar {
    pub open_hour: u32,
    pub open_minute: u32,
    pub close_hour: u32,
}

impl MarketCalendar {
    pub fn new(open_hour: u32, open_minute: u32, close_hour: u32) -> Self {
        Self {
            open_hour,
            open_minute,
            close_hour,
        }
    }

    /// Whether `now` falls inside the trading session.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        match now.weekday() {
            Weekday::Sat | Weekday::Sun => return false,
            _ => {}
        }
        let minutes = now.hour() * 60 + now.minute();
        let open = self.open_hour * 60 + self.open_minute;
        let close = self.close_hour * 60;
        minutes >= open && minutes < close
    }

    pub fn is_open_now(&self) -> bool {
        self.is_open_at(Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the quote service.
pub struct QuoteClient {
    http: Client,
    base_url: String,
    api_key: Option<Secret<String>>,
}

impl QuoteClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build quote HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.map(Secret::new),
        })
    }

    /// Current bid/ask for a symbol. A missing or unpriced side maps to
    /// the `0.0` sentinel; transport and HTTP errors propagate.
    pub async fn quote(&self, symbol: &str) -> Result<Quote> {
        let url = format!("{}/quotes/{symbol}", self.base_url.trim_end_matches('/'));
        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Quote service unreachable for {symbol}"))?;

        // The service answers 404 for symbols it does not track; that is
        // "unavailable", not a transport failure.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(symbol, "Quote service has no price for symbol");
            return Ok(Quote::unavailable());
        }

        let response = response
            .error_for_status()
            .with_context(|| format!("Quote service error for {symbol}"))?;

        let parsed: QuoteResponse = response
            .json()
            .await
            .with_context(|| format!("Malformed quote payload for {symbol}"))?;

        Ok(parsed.into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
