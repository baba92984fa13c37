//! Layered configuration.
//!
//! Sources, lowest priority first:
//! 1. Compiled-in defaults
//! 2. TOML file passed with `--config`
//! 3. Environment overrides with prefix `PERPBOT_`, nested with `__`
//!    (e.g. `PERPBOT_EXCHANGE__REST_URL=https://api-testnet.bybit.com`)

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::BookError;
use crate::models::Interval;

fn default_rest_url() -> String {
    "https://api.bybit.com".to_string()
}

fn default_category() -> String {
    "linear".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_stats_interval_minutes() -> u64 {
    10
}

fn default_evaluate_every_secs() -> u64 {
    60
}

fn default_history_limit() -> usize {
    200
}

fn default_init_limit() -> usize {
    200
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_poll_interval_ms() -> u64 {
    500
}

fn default_order_timeout_ms() -> u64 {
    5_000
}

fn default_price_tick_offset() -> u32 {
    2
}

fn default_max_position_value() -> f64 {
    10.0
}

fn default_indicator_max_size() -> usize {
    1_000
}

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    /// How often the position statistics are logged
    #[serde(default = "default_stats_interval_minutes")]
    pub stats_interval_minutes: u64,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

/// REST endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Product category: "linear", "inverse" or "spot"
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            category: default_category(),
            timeout_ms: default_timeout_ms(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Paper-trading loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    /// Seconds between entry-gate evaluations
    #[serde(default = "default_evaluate_every_secs")]
    pub evaluate_every_secs: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            evaluate_every_secs: default_evaluate_every_secs(),
        }
    }
}

/// Momentum oscillator periods
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MacdConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    /// Use simple instead of exponential averages
    #[serde(default)]
    pub simple_ma: bool,
    #[serde(default = "default_indicator_max_size")]
    pub max_size: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            simple_ma: false,
            max_size: default_indicator_max_size(),
        }
    }
}

/// Trend average period
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EmaConfig {
    pub period: usize,
    #[serde(default = "default_indicator_max_size")]
    pub max_size: usize,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self {
            period: 14,
            max_size: default_indicator_max_size(),
        }
    }
}

/// Crossover short/long periods
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MaCrossConfig {
    pub short_period: usize,
    pub long_period: usize,
    #[serde(default = "default_indicator_max_size")]
    pub max_size: usize,
}

impl Default for MaCrossConfig {
    fn default() -> Self {
        Self {
            short_period: 7,
            long_period: 21,
            max_size: default_indicator_max_size(),
        }
    }
}

/// Protective prices attached to entries, as fractions of the entry price
///
/// Everything is optional; an empty config places plain entries.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BracketConfig {
    #[serde(default)]
    pub stop_loss_percent: Option<f64>,
    #[serde(default)]
    pub trailing_stop_percent: Option<f64>,
    /// One take-profit level per entry, nearest first
    #[serde(default)]
    pub take_profit_percents: Vec<f64>,
    /// Share of the position closed at each take-profit level
    #[serde(default)]
    pub take_profit_portions: Vec<f64>,
}

impl BracketConfig {
    pub fn is_empty(&self) -> bool {
        self.stop_loss_percent.is_none()
            && self.trailing_stop_percent.is_none()
            && self.take_profit_percents.is_empty()
    }

    fn check(&self) -> Result<(), &'static str> {
        let in_range = |pct: f64| pct > 0.0 && pct < 1.0;

        if self.stop_loss_percent.is_some_and(|p| !in_range(p))
            || self.trailing_stop_percent.is_some_and(|p| !in_range(p))
            || !self.take_profit_percents.iter().all(|&p| in_range(p))
        {
            return Err("bracket percents must be between 0 and 1");
        }
        if self.take_profit_portions.len() != self.take_profit_percents.len() {
            return Err("take_profit_portions must match take_profit_percents");
        }
        if !self.take_profit_portions.iter().all(|&p| p > 0.0 && p <= 1.0)
            || self.take_profit_portions.iter().sum::<f64>() > 1.0 + 1e-9
        {
            return Err("take_profit_portions must be positive and sum to at most 1");
        }
        Ok(())
    }
}

/// Per-instrument configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Tracked intervals; the first one is the primary interval for entry decisions
    pub intervals: Vec<Interval>,
    #[serde(default = "default_history_limit")]
    pub candle_history_limit: usize,
    #[serde(default = "default_init_limit")]
    pub candle_init_limit: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_poll_interval_ms")]
    pub retry_poll_interval_ms: u64,
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,
    /// Ticks to step away from the reference price for post-only entries
    #[serde(default = "default_price_tick_offset")]
    pub price_tick_offset: u32,
    /// Notional cap used to size entries
    #[serde(default = "default_max_position_value")]
    pub max_position_value: f64,
    #[serde(default)]
    pub macd: MacdConfig,
    #[serde(default)]
    pub ema: EmaConfig,
    #[serde(default)]
    pub ma_cross: MaCrossConfig,
    #[serde(default)]
    pub bracket: BracketConfig,
}

impl InstrumentConfig {
    /// Config with default limits and periods for `symbol`
    pub fn with_intervals(symbol: impl Into<String>, intervals: Vec<Interval>) -> Self {
        Self {
            symbol: symbol.into(),
            intervals,
            candle_history_limit: default_history_limit(),
            candle_init_limit: default_init_limit(),
            max_retries: default_max_retries(),
            retry_poll_interval_ms: default_retry_poll_interval_ms(),
            order_timeout_ms: default_order_timeout_ms(),
            price_tick_offset: default_price_tick_offset(),
            max_position_value: default_max_position_value(),
            macd: MacdConfig::default(),
            ema: EmaConfig::default(),
            ma_cross: MaCrossConfig::default(),
            bracket: BracketConfig::default(),
        }
    }

    /// Check everything a book needs before it can run
    pub fn validate(&self) -> Result<(), BookError> {
        let fail = |reason: &str| Err(BookError::fatal_init(&self.symbol, reason));

        if self.symbol.trim().is_empty() {
            return fail("symbol is empty");
        }
        if self.intervals.is_empty() {
            return fail("interval list is empty");
        }
        let unique: HashSet<_> = self.intervals.iter().collect();
        if unique.len() != self.intervals.len() {
            return fail("interval list contains duplicates");
        }
        if self.candle_history_limit == 0 || self.candle_init_limit == 0 {
            return fail("candle limits must be positive");
        }
        if self.max_retries == 0 {
            return fail("max_retries must be positive");
        }
        if self.retry_poll_interval_ms == 0 {
            return fail("retry_poll_interval_ms must be positive");
        }

        let macd = &self.macd;
        if macd.fast_period == 0 || macd.signal_period == 0 || macd.max_size == 0 {
            return fail("macd periods and max_size must be positive");
        }
        if macd.fast_period >= macd.slow_period {
            return fail("macd fast_period must be below slow_period");
        }
        if self.ema.period == 0 || self.ema.max_size == 0 {
            return fail("ema period and max_size must be positive");
        }
        let cross = &self.ma_cross;
        if cross.short_period == 0 || cross.max_size == 0 {
            return fail("ma_cross periods and max_size must be positive");
        }
        if cross.short_period >= cross.long_period {
            return fail("ma_cross short_period must be below long_period");
        }
        if let Err(reason) = self.bracket.check() {
            return fail(reason);
        }

        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional TOML file and the environment
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .set_default("exchange.rest_url", default_rest_url())?
            .set_default("exchange.category", default_category())?
            .set_default("exchange.timeout_ms", default_timeout_ms() as i64)?
            .set_default(
                "exchange.requests_per_second",
                default_requests_per_second() as i64,
            )?
            .set_default(
                "stats_interval_minutes",
                default_stats_interval_minutes() as i64,
            )?;

        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PERPBOT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BookError> {
        if self.instruments.is_empty() {
            return Err(BookError::fatal_init("*", "no instruments configured"));
        }
        for instrument in &self.instruments {
            instrument.validate()?;
        }
        Ok(())
    }
}
