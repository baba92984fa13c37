// Collaborator seams: snapshot data, account state and order submission
use std::future::Future;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::BookError;
use crate::models::{Candle, InstrumentMetadata, Interval, OrderRecord, PositionRecord, Side};

/// Public market data pulled on demand
pub trait MarketDataSource: Send + Sync {
    /// Candles in chronological order
    fn fetch_snapshot_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Candle>, BookError>> + Send;

    fn fetch_instrument_metadata(
        &self,
        category: &str,
    ) -> impl Future<Output = Result<Vec<InstrumentMetadata>, BookError>> + Send;
}

/// Private account state pulled on demand
pub trait AccountSource: Send + Sync {
    fn fetch_positions(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<Vec<PositionRecord>, BookError>> + Send;

    fn fetch_live_orders(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<Vec<OrderRecord>, BookError>> + Send;
}

/// Order submission
pub trait OrderGateway: Send + Sync {
    fn submit_limit_order(
        &self,
        request: &LimitOrderRequest,
    ) -> impl Future<Output = Result<OrderAck, BookError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    /// Rejected instead of matched immediately
    pub post_only: bool,
    /// Client id, unique per attempt
    pub order_link_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bracket: Option<Bracket>,
}

/// Protective prices sent along with an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bracket {
    pub stop_loss: Option<f64>,
    /// Distance from the best price, in quote units
    pub trailing_stop: Option<f64>,
    pub take_profits: Vec<TakeProfit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeProfit {
    pub price: f64,
    /// Share of the position closed at `price`
    pub portion: f64,
}

impl LimitOrderRequest {
    pub fn post_only(symbol: impl Into<String>, side: Side, price: f64, qty: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            price,
            qty,
            post_only: true,
            order_link_id: Uuid::new_v4().to_string(),
            bracket: None,
        }
    }

    pub fn with_bracket(mut self, bracket: Option<Bracket>) -> Self {
        self.bracket = bracket;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: String,
}

/// Acknowledges every order without sending it anywhere
///
/// Paper orders never show up in a book's live map, so the executor sees
/// them as filled on the first poll.
#[derive(Default)]
pub struct PaperGateway {
    submitted: Mutex<Vec<LimitOrderRequest>>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far, oldest first
    pub fn submitted(&self) -> Vec<LimitOrderRequest> {
        self.submitted
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl OrderGateway for PaperGateway {
    async fn submit_limit_order(&self, request: &LimitOrderRequest) -> Result<OrderAck, BookError> {
        let order_id = Uuid::new_v4().to_string();
        info!(
            symbol = %request.symbol,
            side = %request.side,
            price = request.price,
            qty = request.qty,
            stop_loss = ?request.bracket.as_ref().and_then(|b| b.stop_loss),
            order_id = %order_id,
            "📝 PAPER ORDER"
        );
        self.submitted
            .lock()
            .map_err(|_| BookError::LockPoisoned)?
            .push(request.clone());
        Ok(OrderAck { order_id })
    }
}
