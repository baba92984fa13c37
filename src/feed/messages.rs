//! Bybit v5 wire formats for the push feed.
//!
//! Numbers arrive as strings (and occasionally as JSON numbers); both are
//! accepted. A field that is absent, empty or unparsable is `None`, and the
//! conversion into a domain record reports it as a validation error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::BookError;
use crate::models::{
    Candle, OrderRecord, OrderStatus, PositionIdx, PositionRecord, PositionSide, Side,
};

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => s.parse().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    })
}

pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => s.parse().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    })
}

fn required<T>(value: Option<T>, what: &str, field: &str) -> Result<T, BookError> {
    value.ok_or_else(|| BookError::validation(format!("{} payload missing {}", what, field)))
}

/// Top-level push message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    pub topic: Option<String>,
    /// "snapshot" or "delta"
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub data: Option<Value>,
    pub ts: Option<i64>,
}

/// One bar from a `kline.<interval>.<symbol>` topic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KlinePayload {
    /// Bar open time, the candle identity
    #[serde(default, deserialize_with = "lenient_i64")]
    pub start: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub end: Option<i64>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub turnover: Option<f64>,
    #[serde(default)]
    pub confirm: Option<bool>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
}

impl KlinePayload {
    /// Normalise into a candle keyed by the bar open time
    pub fn to_candle(&self) -> Result<Candle, BookError> {
        const WHAT: &str = "kline";
        Ok(Candle::new(
            required(self.start, WHAT, "start")?,
            required(self.open, WHAT, "open")?,
            required(self.high, WHAT, "high")?,
            required(self.low, WHAT, "low")?,
            required(self.close, WHAT, "close")?,
            required(self.volume, WHAT, "volume")?,
            required(self.turnover, WHAT, "turnover")?,
            required(self.confirm, WHAT, "confirm")?,
        ))
    }
}

/// Entry of the `position` topic or the position list endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPayload {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub size: Option<f64>,
    #[serde(default, alias = "avgPrice", deserialize_with = "lenient_f64")]
    pub entry_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub leverage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub unrealised_pnl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub stop_loss: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub take_profit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub trailing_stop: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub position_idx: Option<i64>,
    #[serde(default)]
    pub position_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub updated_time: Option<i64>,
}

impl PositionPayload {
    pub fn to_record(&self) -> Result<PositionRecord, BookError> {
        const WHAT: &str = "position";
        let symbol = required(self.symbol.clone(), WHAT, "symbol")?;
        let side = PositionSide::parse(required(self.side.as_deref(), WHAT, "side")?)?;
        let position_idx = PositionIdx::try_from(required(self.position_idx, WHAT, "positionIdx")?)?;

        Ok(PositionRecord {
            symbol,
            side,
            size: self.size,
            entry_price: self.entry_price,
            unrealised_pnl: self.unrealised_pnl,
            leverage: self.leverage,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            trailing_stop: self.trailing_stop,
            position_idx,
            position_status: self.position_status.clone(),
            updated_time: self.updated_time,
        })
    }
}

/// Entry of the `order` topic or the realtime order endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub leaves_qty: Option<f64>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub created_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub updated_time: Option<i64>,
}

impl OrderPayload {
    pub fn to_record(&self) -> Result<OrderRecord, BookError> {
        const WHAT: &str = "order";
        Ok(OrderRecord {
            order_id: required(self.order_id.clone(), WHAT, "orderId")?,
            symbol: required(self.symbol.clone(), WHAT, "symbol")?,
            side: Side::parse(required(self.side.as_deref(), WHAT, "side")?)?,
            price: required(self.price, WHAT, "price")?,
            qty: required(self.qty, WHAT, "qty")?,
            leaves_qty: self.leaves_qty,
            status: OrderStatus::parse(required(self.order_status.as_deref(), WHAT, "orderStatus")?),
            created_time: required(self.created_time, WHAT, "createdTime")?,
            updated_time: required(self.updated_time, WHAT, "updatedTime")?,
        })
    }
}
