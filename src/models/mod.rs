// Market data, position and order records shared across the crate
pub mod interval;

pub use interval::Interval;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BookError;

/// One OHLCV bar keyed by its open timestamp (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
    /// Bar window has fully elapsed
    pub confirmed: bool,
    /// (close - open) / open
    pub rate: f64,
}

impl Candle {
    /// Build a candle, deriving `rate` from open and close
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        turnover: f64,
        confirmed: bool,
    ) -> Self {
        let rate = if open != 0.0 { (close - open) / open } else { 0.0 };
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            turnover,
            confirmed,
            rate,
        }
    }

    /// Reject bars with a missing (non-finite) field or a negative open time
    pub fn validate(&self) -> Result<(), BookError> {
        if self.timestamp < 0 {
            return Err(BookError::validation(format!(
                "candle timestamp {} is negative",
                self.timestamp
            )));
        }
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
            ("turnover", self.turnover),
            ("rate", self.rate),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(BookError::validation(format!(
                    "candle {} has no usable {}",
                    self.timestamp, name
                )));
            }
        }
        Ok(())
    }

    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    pub fn parse(s: &str) -> Result<Self, BookError> {
        match s {
            "Buy" => Ok(Side::Buy),
            "Sell" => Ok(Side::Sell),
            other => Err(BookError::validation(format!("unknown side '{}'", other))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side reported on a position record. `None` means the slot is flat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PositionSide {
    Buy,
    Sell,
    None,
}

impl PositionSide {
    /// Bybit sends an empty string for flat positions
    pub fn parse(s: &str) -> Result<Self, BookError> {
        match s {
            "Buy" => Ok(PositionSide::Buy),
            "Sell" => Ok(PositionSide::Sell),
            "None" | "" => Ok(PositionSide::None),
            other => Err(BookError::validation(format!(
                "unknown position side '{}'",
                other
            ))),
        }
    }
}

/// Hedge-mode slot index: 0 = merged (one-way mode), 1 = Buy, 2 = Sell
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PositionIdx {
    Merged,
    BuySide,
    SellSide,
}

impl TryFrom<i64> for PositionIdx {
    type Error = BookError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PositionIdx::Merged),
            1 => Ok(PositionIdx::BuySide),
            2 => Ok(PositionIdx::SellSide),
            other => Err(BookError::validation(format!(
                "unknown positionIdx {}",
                other
            ))),
        }
    }
}

/// Position as reported by the exchange, snapshot or push
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRecord {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Option<f64>,
    pub entry_price: Option<f64>,
    pub unrealised_pnl: Option<f64>,
    pub leverage: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub trailing_stop: Option<f64>,
    pub position_idx: PositionIdx,
    pub position_status: Option<String>,
    pub updated_time: Option<i64>,
}

impl PositionRecord {
    /// Only a positive size may occupy a hedge-mode slot
    pub fn is_open(&self) -> bool {
        matches!(self.size, Some(size) if size > 0.0)
    }
}

/// Exchange order status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    New,
    PartiallyFilled,
    Untriggered,
    Active,
    Filled,
    Cancelled,
    Rejected,
    Deactivated,
    Triggered,
    PartiallyFilledCanceled,
    Other(String),
}

impl OrderStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Created" => OrderStatus::Created,
            "New" => OrderStatus::New,
            "PartiallyFilled" => OrderStatus::PartiallyFilled,
            "Untriggered" => OrderStatus::Untriggered,
            "Active" => OrderStatus::Active,
            "Filled" => OrderStatus::Filled,
            "Cancelled" => OrderStatus::Cancelled,
            "Rejected" => OrderStatus::Rejected,
            "Deactivated" => OrderStatus::Deactivated,
            "Triggered" => OrderStatus::Triggered,
            "PartiallyFilledCanceled" => OrderStatus::PartiallyFilledCanceled,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    /// Live statuses stay in the order map; everything else removes the record
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created
                | OrderStatus::New
                | OrderStatus::PartiallyFilled
                | OrderStatus::Untriggered
                | OrderStatus::Active
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Other(s) => f.write_str(s),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Order as reported by the exchange, snapshot or push
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    /// Quantity still resting on the book, when the source reports it
    pub leaves_qty: Option<f64>,
    pub status: OrderStatus,
    pub created_time: i64,
    pub updated_time: i64,
}

impl OrderRecord {
    /// Quantity still open on the exchange
    pub fn live_qty(&self) -> f64 {
        self.leaves_qty.unwrap_or(self.qty)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceFilter {
    pub min_price: f64,
    pub max_price: f64,
    pub tick_size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LotSizeFilter {
    pub min_qty: f64,
    pub max_qty: f64,
    pub qty_step: f64,
}

/// Static instrument description, replaced only on a full refresh
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentMetadata {
    pub symbol: String,
    pub contract_type: String,
    pub status: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub price_filter: PriceFilter,
    pub lot_size_filter: LotSizeFilter,
}
