// Technical indicators module
// Each indicator keeps its own bounded price history and recomputes
// its output from the whole history on every update, so a corrected
// (still forming) bar is reflected exactly.

pub mod ema;
pub mod ma_cross;
pub mod macd;
pub mod moving_average;
pub mod registry;

pub use ema::TrendAverage;
pub use ma_cross::{cross_direction, CrossDirection, MaCrossIndicator};
pub use macd::MacdIndicator;
pub use moving_average::{ema_series, sma_series};
pub use registry::IndicatorRegistry;

use serde::{Deserialize, Serialize};

use crate::series::{BoundedSeries, Keyed};

/// Registry key of the momentum oscillator
pub const MACD_KEY: &str = "macd";
/// Registry key of the trend average
pub const EMA_KEY: &str = "ema";
/// Registry key of the crossover
pub const MA_CROSS_KEY: &str = "ma_cross";

/// Momentum oscillator output; each field stays `None` until enough history exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

/// Crossover output
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossValue {
    pub short: Option<f64>,
    pub long: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IndicatorValue {
    Scalar(Option<f64>),
    Macd(MacdValue),
    Cross(CrossValue),
}

impl IndicatorValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            IndicatorValue::Scalar(v) => *v,
            _ => None,
        }
    }

    pub fn as_macd(&self) -> Option<MacdValue> {
        match self {
            IndicatorValue::Macd(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_cross(&self) -> Option<CrossValue> {
        match self {
            IndicatorValue::Cross(v) => Some(*v),
            _ => None,
        }
    }
}

/// Shared update contract of every indicator
pub trait Indicator: Send + Sync {
    /// Incorporate one new or corrected price point keyed by `timestamp`
    fn update(&mut self, timestamp: i64, price: f64, confirmed: bool);

    /// Current output
    fn value(&self) -> IndicatorValue;

    /// Up to `count` most recent outputs, newest-first. `None` when unsupported.
    fn history(&self, _count: usize) -> Option<Vec<IndicatorValue>> {
        None
    }

    /// Output computed at the price point with this timestamp
    fn value_at(&self, _timestamp: i64) -> Option<IndicatorValue> {
        None
    }
}

/// One price point fed to an indicator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
    pub confirmed: bool,
}

impl Keyed for PricePoint {
    fn key(&self) -> i64 {
        self.timestamp
    }
}

/// Indicator input buffer, same upsert semantics as a candle series
#[derive(Debug, Clone)]
pub struct PriceHistory {
    points: BoundedSeries<PricePoint>,
}

impl PriceHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            points: BoundedSeries::new(max_size),
        }
    }

    pub fn upsert(&mut self, timestamp: i64, price: f64, confirmed: bool) {
        self.points.upsert(PricePoint {
            timestamp,
            price,
            confirmed,
        });
    }

    /// Prices oldest-first
    pub fn prices(&self) -> Vec<f64> {
        self.points.iter_chronological().map(|p| p.price).collect()
    }

    /// Timestamps oldest-first, aligned with [`PriceHistory::prices`]
    pub fn timestamps(&self) -> Vec<i64> {
        self.points
            .iter_chronological()
            .map(|p| p.timestamp)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Newest-first tail of an oldest-first output series
pub(crate) fn newest_first<T: Copy>(series: &[T], count: usize) -> Vec<T> {
    series.iter().rev().take(count).copied().collect()
}
