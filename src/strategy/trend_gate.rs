use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use super::{EntrySignal, EntryStrategy, Trend};
use crate::config::InstrumentConfig;
use crate::error::BookError;
use crate::execution::{floor_to_step, InstrumentBook};
use crate::indicators::MacdValue;
use crate::models::{Interval, Side};

/// Indicator directions on one interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTrends {
    pub interval: Interval,
    pub ema: Trend,
    pub macd: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdTrendChange {
    pub changed: bool,
    pub new_trend: Trend,
}

impl MacdTrendChange {
    /// Side to enter on; only a fresh turn up or down qualifies
    pub fn entry_side(&self) -> Option<Side> {
        if self.changed {
            self.new_trend.side()
        } else {
            None
        }
    }
}

/// Slope of the last two trend-average values
pub fn ema_trend(book: &InstrumentBook, interval: Interval) -> Trend {
    match book.ema_history(interval, 2).as_slice() {
        [Some(current), Some(previous)] => Trend::from_sign(current - previous),
        _ => Trend::Neutral,
    }
}

/// Histogram sign
pub fn macd_trend(value: MacdValue) -> Trend {
    value.histogram.map(Trend::from_sign).unwrap_or(Trend::Neutral)
}

pub fn interval_trends(book: &InstrumentBook, interval: Interval) -> IntervalTrends {
    IntervalTrends {
        interval,
        ema: ema_trend(book, interval),
        macd: book.macd(interval).map(macd_trend).unwrap_or(Trend::Neutral),
    }
}

/// Every interval shows the same EMA trend and the same MACD trend
pub fn all_intervals_agree(trends: &[IntervalTrends]) -> bool {
    trends
        .windows(2)
        .all(|pair| pair[0].ema == pair[1].ema && pair[0].macd == pair[1].macd)
}

/// MACD trend of the newest output compared with the one before
pub fn macd_trend_change(book: &InstrumentBook, interval: Interval) -> MacdTrendChange {
    match book.macd_history(interval, 2).as_slice() {
        [current, previous] => {
            let new_trend = macd_trend(*current);
            MacdTrendChange {
                changed: new_trend != macd_trend(*previous),
                new_trend,
            }
        }
        [current] => MacdTrendChange {
            changed: false,
            new_trend: macd_trend(*current),
        },
        _ => MacdTrendChange {
            changed: false,
            new_trend: Trend::Neutral,
        },
    }
}

/// Largest quantity worth at most `max_position_value` at `last_price`
pub fn compute_order_qty(
    max_position_value: f64,
    last_price: f64,
    qty_step: f64,
) -> Result<f64, BookError> {
    if max_position_value <= 0.0 {
        return Err(BookError::validation("max position value must be positive"));
    }
    if last_price <= 0.0 || !last_price.is_finite() {
        return Err(BookError::validation(format!(
            "cannot size an order at price {}",
            last_price
        )));
    }

    let qty = floor_to_step(max_position_value / last_price, qty_step);
    if qty <= 0.0 {
        return Err(BookError::validation(format!(
            "order qty rounds to zero ({} / {} with step {})",
            max_position_value, last_price, qty_step
        )));
    }
    Ok(qty)
}

/// Enters when all intervals agree and the primary interval's MACD just turned
///
/// Fires at most once per primary bar and symbol: after a signal, the gate
/// stays shut until a newer primary bar arrives.
#[derive(Debug)]
pub struct EntryGate {
    max_position_value: f64,
    /// Open time of the primary bar each symbol last signalled on
    last_signalled: Mutex<HashMap<String, i64>>,
}

impl EntryGate {
    pub fn new(max_position_value: f64) -> Self {
        Self {
            max_position_value,
            last_signalled: Mutex::new(HashMap::new()),
        }
    }

    /// Primary bar the gate last signalled on for `symbol`
    pub fn last_signalled(&self, symbol: &str) -> Option<i64> {
        self.last_signalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .copied()
    }

    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self::new(config.max_position_value)
    }

    /// Entry direction, if the gate is open
    pub fn evaluate(&self, book: &InstrumentBook) -> Option<Side> {
        let primary = *book.intervals().first()?;

        let trends: Vec<IntervalTrends> = book
            .intervals()
            .iter()
            .map(|&interval| interval_trends(book, interval))
            .collect();
        if !all_intervals_agree(&trends) {
            debug!(symbol = %book.symbol(), ?trends, "indicators differ between intervals");
            return None;
        }

        let change = macd_trend_change(book, primary);
        if change.entry_side().is_none() {
            debug!(symbol = %book.symbol(), interval = %primary, "MACD trend did not change");
        }
        change.entry_side()
    }
}

impl EntryStrategy for EntryGate {
    fn signal(&self, book: &InstrumentBook) -> Result<Option<EntrySignal>, BookError> {
        let Some(last) = book
            .intervals()
            .first()
            .and_then(|&primary| book.candles(primary))
            .and_then(|series| series.latest())
        else {
            return Ok(None);
        };

        let mut last_signalled = self
            .last_signalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(&acted) = last_signalled.get(book.symbol()) {
            if acted >= last.timestamp {
                debug!(symbol = %book.symbol(), bar = acted, "already signalled on this bar");
                return Ok(None);
            }
        }

        let Some(side) = self.evaluate(book) else {
            return Ok(None);
        };

        let qty = compute_order_qty(self.max_position_value, last.close, book.qty_step()?)?;
        last_signalled.insert(book.symbol().to_string(), last.timestamp);
        info!(
            symbol = %book.symbol(),
            side = %side,
            price = last.close,
            qty = qty,
            "MACD trend change detected"
        );

        Ok(Some(EntrySignal {
            side,
            reference_price: last.close,
            qty,
        }))
    }

    fn name(&self) -> &str {
        "trend_gate"
    }
}
