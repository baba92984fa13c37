use std::collections::HashMap;
use std::future::Future;

use tracing::{debug, info, warn};

use super::candle_series::CandleSeries;
use super::precision::{floor_to_step, round_to_step};
use crate::config::InstrumentConfig;
use crate::error::BookError;
use crate::feed::KlinePayload;
use crate::indicators::{
    CrossValue, IndicatorRegistry, IndicatorValue, MaCrossIndicator, MacdIndicator, MacdValue,
    TrendAverage, EMA_KEY, MACD_KEY, MA_CROSS_KEY,
};
use crate::models::{
    Candle, InstrumentMetadata, Interval, OrderRecord, PositionIdx, PositionRecord, PositionSide,
    Side,
};
use crate::series::Upsert;

/// Unrealised PnL of the two hedge-mode slots
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PnlSummary {
    pub long: f64,
    pub short: f64,
    pub total: f64,
}

/// Everything known about one instrument: candles and indicators per
/// tracked interval, the hedge-mode position slots, live orders and
/// exchange filters.
pub struct InstrumentBook {
    config: InstrumentConfig,
    series: HashMap<Interval, CandleSeries>,
    indicators: IndicatorRegistry,
    positions: HashMap<Side, PositionRecord>,
    orders: HashMap<String, OrderRecord>,
    metadata: Option<InstrumentMetadata>,
}

impl InstrumentBook {
    /// Build a book for a configured instrument
    ///
    /// Fails with `FatalInit` when the configuration is unusable.
    pub fn new(config: InstrumentConfig) -> Result<Self, BookError> {
        config.validate()?;

        let mut series = HashMap::new();
        let mut indicators = IndicatorRegistry::new();
        for &interval in &config.intervals {
            series.insert(interval, CandleSeries::new(config.candle_history_limit));
            indicators.register(interval, MACD_KEY, Box::new(MacdIndicator::new(&config.macd)));
            indicators.register(interval, EMA_KEY, Box::new(TrendAverage::new(&config.ema)));
            indicators.register(
                interval,
                MA_CROSS_KEY,
                Box::new(MaCrossIndicator::new(&config.ma_cross)),
            );
        }

        Ok(Self {
            config,
            series,
            indicators,
            positions: HashMap::new(),
            orders: HashMap::new(),
            metadata: None,
        })
    }

    /// Book for a symbol seen only on the account feeds; tracks no intervals
    pub fn untracked(symbol: impl Into<String>) -> Self {
        Self {
            config: InstrumentConfig::with_intervals(symbol, Vec::new()),
            series: HashMap::new(),
            indicators: IndicatorRegistry::new(),
            positions: HashMap::new(),
            orders: HashMap::new(),
            metadata: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Tracked intervals in configured order; the first is the primary one
    pub fn intervals(&self) -> &[Interval] {
        &self.config.intervals
    }

    pub fn is_tracked(&self) -> bool {
        !self.config.intervals.is_empty()
    }

    /// Fetch a snapshot for `interval` and apply it
    ///
    /// A failed fetch is logged and returned so the caller can mark the
    /// interval degraded.
    pub async fn load_candles<F, Fut>(&mut self, interval: Interval, fetch: F) -> Result<usize, BookError>
    where
        F: FnOnce(String, Interval, usize) -> Fut,
        Fut: Future<Output = Result<Vec<Candle>, BookError>>,
    {
        self.series_for(interval)?;

        let symbol = self.config.symbol.clone();
        match fetch(symbol.clone(), interval, self.config.candle_init_limit).await {
            Ok(candles) => self.apply_snapshot_candles(interval, candles),
            Err(e) => {
                warn!(symbol = %symbol, interval = %interval, error = %e, "candle snapshot failed");
                Err(e)
            }
        }
    }

    /// Apply snapshot candles for `interval` and replay them through the indicators
    ///
    /// Candles may arrive in any order. Invalid entries are dropped, only the
    /// newest `candle_history_limit` are kept, and indicators see them oldest-first.
    pub fn apply_snapshot_candles(
        &mut self,
        interval: Interval,
        mut candles: Vec<Candle>,
    ) -> Result<usize, BookError> {
        let limit = self.config.candle_history_limit;
        let symbol = self.config.symbol.clone();

        candles.retain(|candle| match candle.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(symbol = %symbol, interval = %interval, error = %e, "dropping snapshot candle");
                false
            }
        });
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }

        self.series_for(interval)?.bulk_upsert(&candles)?;
        for candle in &candles {
            self.indicators
                .update(interval, candle.timestamp, candle.close, candle.confirmed);
        }

        info!(symbol = %symbol, interval = %interval, count = candles.len(), "loaded candles");
        Ok(candles.len())
    }

    /// Apply one bar from the push feed
    pub fn apply_push_candle(
        &mut self,
        interval: Interval,
        raw: &KlinePayload,
    ) -> Result<Upsert, BookError> {
        let candle = raw.to_candle()?;
        self.apply_candle(interval, candle)
    }

    /// Upsert a normalised candle and feed its close to the indicators
    pub fn apply_candle(&mut self, interval: Interval, candle: Candle) -> Result<Upsert, BookError> {
        let (timestamp, close, confirmed) = (candle.timestamp, candle.close, candle.confirmed);
        let result = self.series_for(interval)?.upsert(candle)?;
        self.indicators.update(interval, timestamp, close, confirmed);
        Ok(result)
    }

    /// Apply a position record to the hedge-mode slots
    ///
    /// Returns false when the record belongs to another instrument.
    pub fn apply_position_update(&mut self, record: PositionRecord) -> bool {
        if record.symbol != self.config.symbol {
            debug!(book = %self.config.symbol, symbol = %record.symbol, "ignoring foreign position");
            return false;
        }

        match record.side {
            PositionSide::Buy | PositionSide::Sell => {
                let slot = if record.side == PositionSide::Buy {
                    Side::Buy
                } else {
                    Side::Sell
                };
                if record.is_open() {
                    self.positions.insert(slot, record);
                } else {
                    self.positions.remove(&slot);
                }
            }
            PositionSide::None => match record.position_idx {
                PositionIdx::Merged => self.positions.clear(),
                PositionIdx::BuySide => {
                    self.positions.remove(&Side::Buy);
                }
                PositionIdx::SellSide => {
                    self.positions.remove(&Side::Sell);
                }
            },
        }
        true
    }

    /// Order from the push feed
    pub fn apply_order_update(&mut self, record: OrderRecord) -> bool {
        self.apply_order(record)
    }

    /// Order from a snapshot poll
    pub fn apply_order_snapshot(&mut self, record: OrderRecord) -> bool {
        self.apply_order(record)
    }

    fn apply_order(&mut self, record: OrderRecord) -> bool {
        if record.symbol != self.config.symbol {
            debug!(book = %self.config.symbol, symbol = %record.symbol, "ignoring foreign order");
            return false;
        }

        if record.status.is_live() {
            self.orders.insert(record.order_id.clone(), record);
        } else if let Some(last) = self.orders.remove(&record.order_id) {
            debug!(
                symbol = %self.config.symbol,
                order_id = %last.order_id,
                status = %record.status,
                "order left the book"
            );
        }
        true
    }

    /// Positions sorted Buy then Sell
    pub fn positions(&self) -> Vec<PositionRecord> {
        [Side::Buy, Side::Sell]
            .iter()
            .filter_map(|side| self.positions.get(side).cloned())
            .collect()
    }

    pub fn position(&self, side: Side) -> Option<&PositionRecord> {
        self.positions.get(&side)
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.orders.values().cloned().collect()
    }

    pub fn order(&self, order_id: &str) -> Option<&OrderRecord> {
        self.orders.get(order_id)
    }

    pub fn metadata(&self) -> Option<&InstrumentMetadata> {
        self.metadata.as_ref()
    }

    pub fn set_metadata(&mut self, metadata: InstrumentMetadata) {
        self.metadata = Some(metadata);
    }

    pub fn tick_size(&self) -> Result<f64, BookError> {
        self.require_metadata()
            .map(|m| m.price_filter.tick_size)
    }

    pub fn qty_step(&self) -> Result<f64, BookError> {
        self.require_metadata()
            .map(|m| m.lot_size_filter.qty_step)
    }

    /// Nearest tick
    pub fn round_price(&self, price: f64) -> Result<f64, BookError> {
        Ok(round_to_step(price, self.tick_size()?))
    }

    /// Floor to the quantity step so an order never exceeds the request
    pub fn round_quantity(&self, qty: f64) -> Result<f64, BookError> {
        Ok(floor_to_step(qty, self.qty_step()?))
    }

    pub fn candles(&self, interval: Interval) -> Option<&CandleSeries> {
        self.series.get(&interval)
    }

    pub fn last_closed(&self, interval: Interval) -> Option<&Candle> {
        self.series.get(&interval).and_then(|s| s.last_closed())
    }

    pub fn indicators(&self) -> &IndicatorRegistry {
        &self.indicators
    }

    pub fn macd(&self, interval: Interval) -> Option<MacdValue> {
        self.indicators
            .value(interval, MACD_KEY)
            .and_then(|v| v.as_macd())
    }

    /// Newest-first oscillator outputs
    pub fn macd_history(&self, interval: Interval, count: usize) -> Vec<MacdValue> {
        self.indicators
            .history(interval, MACD_KEY, count)
            .unwrap_or_default()
            .iter()
            .filter_map(IndicatorValue::as_macd)
            .collect()
    }

    pub fn ema(&self, interval: Interval) -> Option<f64> {
        self.indicators
            .value(interval, EMA_KEY)
            .and_then(|v| v.as_scalar())
    }

    /// Newest-first trend average outputs
    pub fn ema_history(&self, interval: Interval, count: usize) -> Vec<Option<f64>> {
        self.indicators
            .history(interval, EMA_KEY, count)
            .unwrap_or_default()
            .iter()
            .map(IndicatorValue::as_scalar)
            .collect()
    }

    pub fn ema_at(&self, interval: Interval, timestamp: i64) -> Option<f64> {
        self.indicators
            .value_at(interval, EMA_KEY, timestamp)
            .and_then(|v| v.as_scalar())
    }

    pub fn ma_cross(&self, interval: Interval) -> Option<CrossValue> {
        self.indicators
            .value(interval, MA_CROSS_KEY)
            .and_then(|v| v.as_cross())
    }

    pub fn ma_cross_history(&self, interval: Interval, count: usize) -> Vec<CrossValue> {
        self.indicators
            .history(interval, MA_CROSS_KEY, count)
            .unwrap_or_default()
            .iter()
            .filter_map(IndicatorValue::as_cross)
            .collect()
    }

    pub fn pnl_summary(&self) -> PnlSummary {
        let pnl = |side: Side| {
            self.positions
                .get(&side)
                .and_then(|p| p.unrealised_pnl)
                .unwrap_or(0.0)
        };
        let long = pnl(Side::Buy);
        let short = pnl(Side::Sell);
        PnlSummary {
            long,
            short,
            total: long + short,
        }
    }

    fn require_metadata(&self) -> Result<&InstrumentMetadata, BookError> {
        self.metadata
            .as_ref()
            .ok_or_else(|| BookError::MissingMetadata(self.config.symbol.clone()))
    }

    fn series_for(&mut self, interval: Interval) -> Result<&mut CandleSeries, BookError> {
        let symbol = &self.config.symbol;
        self.series.get_mut(&interval).ok_or_else(|| {
            BookError::validation(format!("{} does not track interval {}", symbol, interval))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LotSizeFilter, OrderStatus, PriceFilter};

    fn create_test_candle(timestamp: i64, price: f64) -> Candle {
        Candle::new(timestamp, price, price, price, price, 1000.0, 1000.0 * price, true)
    }

    fn book() -> InstrumentBook {
        InstrumentBook::new(InstrumentConfig::with_intervals(
            "XRPUSDT",
            vec![Interval::Min1, Interval::Min5],
        ))
        .unwrap()
    }

    fn metadata() -> InstrumentMetadata {
        InstrumentMetadata {
            symbol: "XRPUSDT".to_string(),
            contract_type: "LinearPerpetual".to_string(),
            status: "Trading".to_string(),
            base_currency: "XRP".to_string(),
            quote_currency: "USDT".to_string(),
            price_filter: PriceFilter {
                min_price: 0.0001,
                max_price: 199.9998,
                tick_size: 0.0001,
            },
            lot_size_filter: LotSizeFilter {
                min_qty: 1.0,
                max_qty: 1_000_000.0,
                qty_step: 1.0,
            },
        }
    }

    fn position(side: PositionSide, size: f64, idx: PositionIdx) -> PositionRecord {
        PositionRecord {
            symbol: "XRPUSDT".to_string(),
            side,
            size: Some(size),
            entry_price: Some(0.5),
            unrealised_pnl: Some(size * 0.01),
            leverage: Some(10.0),
            stop_loss: None,
            take_profit: None,
            trailing_stop: None,
            position_idx: idx,
            position_status: Some("Normal".to_string()),
            updated_time: None,
        }
    }

    fn order(id: &str, status: &str) -> OrderRecord {
        OrderRecord {
            order_id: id.to_string(),
            symbol: "XRPUSDT".to_string(),
            side: Side::Buy,
            price: 0.5,
            qty: 10.0,
            leaves_qty: None,
            status: OrderStatus::parse(status),
            created_time: 1,
            updated_time: 2,
        }
    }

    #[test]
    fn test_empty_intervals_is_fatal() {
        let result = InstrumentBook::new(InstrumentConfig::with_intervals("XRPUSDT", vec![]));
        assert!(matches!(result, Err(BookError::FatalInit { .. })));
    }

    #[test]
    fn test_registers_indicators_per_interval() {
        let book = book();
        for interval in [Interval::Min1, Interval::Min5] {
            assert_eq!(
                book.indicators().keys(interval),
                vec![EMA_KEY, MA_CROSS_KEY, MACD_KEY]
            );
        }
        assert!(book.indicators().keys(Interval::Min15).is_empty());
    }

    #[test]
    fn test_snapshot_caps_and_orders() {
        let mut config = InstrumentConfig::with_intervals("XRPUSDT", vec![Interval::Min1]);
        config.candle_history_limit = 3;
        config.ema.period = 2;
        let mut book = InstrumentBook::new(config).unwrap();

        // out of order on purpose
        let candles = vec![
            create_test_candle(3, 3.0),
            create_test_candle(1, 1.0),
            create_test_candle(5, 5.0),
            create_test_candle(2, 2.0),
            create_test_candle(4, 4.0),
        ];
        let applied = book.apply_snapshot_candles(Interval::Min1, candles).unwrap();

        assert_eq!(applied, 3);
        let stamps: Vec<i64> = book
            .candles(Interval::Min1)
            .unwrap()
            .snapshot()
            .iter()
            .map(|c| c.timestamp)
            .collect();
        assert_eq!(stamps, vec![5, 4, 3]);
        // ema(2) over 3,4,5 seeded with sma(3,4)
        assert_eq!(book.ema_at(Interval::Min1, 4), Some(3.5));
        assert!((book.ema(Interval::Min1).unwrap() - (5.0 * 2.0 / 3.0 + 3.5 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_skips_invalid_candles() {
        let mut book = book();
        let mut bad = create_test_candle(2, 2.0);
        bad.turnover = f64::NAN;
        let applied = book
            .apply_snapshot_candles(Interval::Min1, vec![create_test_candle(1, 1.0), bad])
            .unwrap();

        assert_eq!(applied, 1);
        assert_eq!(book.candles(Interval::Min1).unwrap().len(), 1);
    }

    #[test]
    fn test_untracked_interval_rejected() {
        let mut book = book();
        let result = book.apply_candle(Interval::Min15, create_test_candle(1, 1.0));
        assert!(matches!(result, Err(BookError::Validation(_))));
    }

    #[test]
    fn test_load_candles_success() {
        let mut book = book();
        let loaded = tokio_test::block_on(book.load_candles(
            Interval::Min5,
            |symbol, interval, limit| async move {
                assert_eq!(symbol, "XRPUSDT");
                assert_eq!(interval, Interval::Min5);
                assert_eq!(limit, 200);
                Ok((0..10).map(|i| create_test_candle(i, 1.0)).collect())
            },
        ))
        .unwrap();

        assert_eq!(loaded, 10);
        assert_eq!(book.candles(Interval::Min5).unwrap().len(), 10);
        assert!(book.candles(Interval::Min1).unwrap().is_empty());
    }

    #[test]
    fn test_load_candles_failure_is_reraised() {
        let mut book = book();
        let result = tokio_test::block_on(book.load_candles(Interval::Min1, |_, _, _| async {
            Err(BookError::TransientFetch("timeout".to_string()))
        }));

        assert!(matches!(result, Err(BookError::TransientFetch(_))));
        assert!(book.candles(Interval::Min1).unwrap().is_empty());
    }

    #[test]
    fn test_push_candle_is_idempotent() {
        let mut book = book();
        let raw = KlinePayload {
            start: Some(60_000),
            open: Some(0.5),
            high: Some(0.52),
            low: Some(0.49),
            close: Some(0.51),
            volume: Some(100.0),
            turnover: Some(51.0),
            confirm: Some(false),
            ..Default::default()
        };

        assert_eq!(book.apply_push_candle(Interval::Min1, &raw).unwrap(), Upsert::Inserted);
        let first = book.candles(Interval::Min1).unwrap().snapshot();
        let ema_first = book.ema_history(Interval::Min1, 10);

        assert_eq!(book.apply_push_candle(Interval::Min1, &raw).unwrap(), Upsert::Replaced);
        assert_eq!(book.candles(Interval::Min1).unwrap().snapshot(), first);
        assert_eq!(book.ema_history(Interval::Min1, 10), ema_first);
    }

    #[test]
    fn test_push_candle_missing_field() {
        let mut book = book();
        let raw = KlinePayload {
            start: Some(60_000),
            ..Default::default()
        };
        assert!(matches!(
            book.apply_push_candle(Interval::Min1, &raw),
            Err(BookError::Validation(_))
        ));
        assert!(book.candles(Interval::Min1).unwrap().is_empty());
    }

    #[test]
    fn test_none_idx1_clears_buy_only() {
        let mut book = book();
        book.apply_position_update(position(PositionSide::Buy, 5.0, PositionIdx::BuySide));
        book.apply_position_update(position(PositionSide::Sell, 3.0, PositionIdx::SellSide));

        book.apply_position_update(position(PositionSide::None, 0.0, PositionIdx::BuySide));

        assert!(book.position(Side::Buy).is_none());
        assert_eq!(book.position(Side::Sell).unwrap().size, Some(3.0));
    }

    #[test]
    fn test_sell_then_none_idx2_clears_sell() {
        let mut book = book();
        book.apply_position_update(position(PositionSide::Sell, 5.0, PositionIdx::SellSide));
        book.apply_position_update(position(PositionSide::None, 0.0, PositionIdx::SellSide));

        assert!(book.positions().iter().all(|p| p.side != PositionSide::Sell));
    }

    #[test]
    fn test_none_idx0_clears_all() {
        let mut book = book();
        book.apply_position_update(position(PositionSide::Buy, 5.0, PositionIdx::BuySide));
        book.apply_position_update(position(PositionSide::Sell, 3.0, PositionIdx::SellSide));
        book.apply_position_update(position(PositionSide::None, 0.0, PositionIdx::Merged));

        assert!(book.positions().is_empty());
    }

    #[test]
    fn test_zero_size_never_occupies_slot() {
        let mut book = book();
        book.apply_position_update(position(PositionSide::Buy, 0.0, PositionIdx::BuySide));
        let mut no_size = position(PositionSide::Sell, 1.0, PositionIdx::SellSide);
        no_size.size = None;
        book.apply_position_update(no_size);

        assert!(book.positions().is_empty());
    }

    #[test]
    fn test_foreign_position_ignored() {
        let mut book = book();
        let mut other = position(PositionSide::Buy, 5.0, PositionIdx::BuySide);
        other.symbol = "BTCUSDT".to_string();

        assert!(!book.apply_position_update(other));
        assert!(book.positions().is_empty());
    }

    #[test]
    fn test_order_live_and_terminal() {
        let mut book = book();
        book.apply_order_update(order("a", "New"));
        book.apply_order_snapshot(order("b", "PartiallyFilled"));
        assert_eq!(book.orders().len(), 2);

        book.apply_order_update(order("a", "Filled"));
        book.apply_order_snapshot(order("b", "Cancelled"));
        assert!(book.orders().is_empty());

        // terminal status for an unknown order is a no-op
        book.apply_order_update(order("c", "Rejected"));
        assert!(book.order("c").is_none());
    }

    #[test]
    fn test_rounding_requires_metadata() {
        let mut book = book();
        assert!(matches!(
            book.round_price(0.5),
            Err(BookError::MissingMetadata(_))
        ));

        book.set_metadata(metadata());
        assert_eq!(book.round_price(0.51237).unwrap(), 0.5124);
        assert_eq!(book.round_quantity(19.99).unwrap(), 19.0);
    }

    #[test]
    fn test_pnl_summary() {
        let mut book = book();
        book.apply_position_update(position(PositionSide::Buy, 5.0, PositionIdx::BuySide));
        book.apply_position_update(position(PositionSide::Sell, 3.0, PositionIdx::SellSide));

        let summary = book.pnl_summary();
        assert!((summary.long - 0.05).abs() < 1e-12);
        assert!((summary.short - 0.03).abs() < 1e-12);
        assert!((summary.total - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_untracked_book() {
        let book = InstrumentBook::untracked("BTCUSDT");
        assert_eq!(book.symbol(), "BTCUSDT");
        assert!(!book.is_tracked());
        assert!(book.candles(Interval::Min1).is_none());
        assert!(book.macd(Interval::Min1).is_none());
    }
}
