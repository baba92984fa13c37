// Entry decision module
pub mod trend_gate;

pub use trend_gate::{
    all_intervals_agree, compute_order_qty, ema_trend, interval_trends, macd_trend,
    macd_trend_change, EntryGate, IntervalTrends, MacdTrendChange,
};

use serde::{Deserialize, Serialize};

use crate::error::BookError;
use crate::execution::InstrumentBook;
use crate::models::Side;

/// Direction of an indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

impl Trend {
    /// Sign of `value`; zero is neutral
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Trend::Up
        } else if value < 0.0 {
            Trend::Down
        } else {
            Trend::Neutral
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            Trend::Up => Some(Side::Buy),
            Trend::Down => Some(Side::Sell),
            Trend::Neutral => None,
        }
    }
}

/// Entry the strategy wants to place
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub side: Side,
    pub reference_price: f64,
    pub qty: f64,
}

/// Base trait for entry strategies
pub trait EntryStrategy: Send + Sync {
    /// Entry for the current state of `book`, if any
    fn signal(&self, book: &InstrumentBook) -> Result<Option<EntrySignal>, BookError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_from_sign() {
        assert_eq!(Trend::from_sign(0.3), Trend::Up);
        assert_eq!(Trend::from_sign(-1e-9), Trend::Down);
        assert_eq!(Trend::from_sign(0.0), Trend::Neutral);
        assert_eq!(Trend::Neutral.side(), None);
        assert_eq!(Trend::Down.side(), Some(Side::Sell));
    }
}
