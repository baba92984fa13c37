// Snapshot loading: candles, instrument filters and account state
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::gateway::{AccountSource, MarketDataSource};
use super::instrument_registry::{read_registry, write_registry, SharedRegistry};
use crate::error::BookError;
use crate::models::{Interval, PositionSide};

/// Outcome of one candle loading pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// (symbol, interval, candles applied)
    pub loaded: Vec<(String, Interval, usize)>,
    /// Intervals whose snapshot could not be fetched or applied
    pub degraded: Vec<(String, Interval)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }

    pub fn is_degraded(&self, symbol: &str, interval: Interval) -> bool {
        self.degraded
            .iter()
            .any(|(s, i)| s == symbol && *i == interval)
    }
}

/// Fetch every (instrument, interval) snapshot concurrently and apply the results
///
/// Must finish before push delivery starts for the same intervals, otherwise a
/// late snapshot can overwrite newer pushed bars.
pub async fn load_all_candles<S>(
    shared: &SharedRegistry,
    source: Arc<S>,
) -> Result<LoadReport, BookError>
where
    S: MarketDataSource + 'static,
{
    let jobs: Vec<(String, Interval, usize)> = {
        let registry = read_registry(shared)?;
        registry
            .books()
            .flat_map(|book| {
                let limit = book.config().candle_init_limit;
                book.intervals()
                    .iter()
                    .map(move |&interval| (book.symbol().to_string(), interval, limit))
            })
            .collect()
    };

    let mut tasks = JoinSet::new();
    for (symbol, interval, limit) in jobs {
        let source = Arc::clone(&source);
        tasks.spawn(async move {
            let result = source.fetch_snapshot_candles(&symbol, interval, limit).await;
            (symbol, interval, result)
        });
    }

    let mut report = LoadReport::default();
    while let Some(joined) = tasks.join_next().await {
        let (symbol, interval, fetched) = match joined {
            Ok(done) => done,
            Err(e) => {
                error!(error = %e, "candle load task aborted");
                continue;
            }
        };

        let applied = fetched.and_then(|candles| {
            write_registry(shared)?
                .require_mut(&symbol)?
                .apply_snapshot_candles(interval, candles)
        });

        match applied {
            Ok(count) => report.loaded.push((symbol, interval, count)),
            Err(e) => {
                warn!(symbol = %symbol, interval = %interval, error = %e, "interval degraded");
                report.degraded.push((symbol, interval));
            }
        }
    }

    info!(
        loaded = report.loaded.len(),
        degraded = report.degraded.len(),
        "candle snapshot pass finished"
    );
    Ok(report)
}

/// Attach exchange filters to the books that exist; returns how many were updated
pub async fn load_instrument_metadata<S: MarketDataSource>(
    shared: &SharedRegistry,
    source: &S,
    category: &str,
) -> Result<usize, BookError> {
    let all = source.fetch_instrument_metadata(category).await?;

    let mut registry = write_registry(shared)?;
    let mut applied = 0;
    for metadata in all {
        if let Some(book) = registry.get_mut(&metadata.symbol) {
            book.set_metadata(metadata);
            applied += 1;
        }
    }

    for book in registry.books().filter(|b| b.metadata().is_none()) {
        warn!(symbol = %book.symbol(), category = %category, "no instrument metadata returned");
    }
    Ok(applied)
}

/// Re-apply open positions from a snapshot pull
///
/// Only Buy/Sell records with a positive size are applied. A failure for one
/// instrument is logged and the pass continues.
pub async fn reload_positions<A: AccountSource>(
    shared: &SharedRegistry,
    source: &A,
) -> Result<usize, BookError> {
    let symbols = read_registry(shared)?.symbols();
    let mut applied = 0;

    for symbol in symbols {
        let records = match source.fetch_positions(&symbol).await {
            Ok(records) => records,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "position snapshot failed");
                continue;
            }
        };

        let mut registry = write_registry(shared)?;
        let book = registry.get_or_create(&symbol);
        for record in records {
            if record.side == PositionSide::None || !record.is_open() {
                continue;
            }
            if book.apply_position_update(record) {
                applied += 1;
            }
        }
    }

    Ok(applied)
}

/// Re-apply live orders from a snapshot pull
pub async fn reload_orders<A: AccountSource>(
    shared: &SharedRegistry,
    source: &A,
) -> Result<usize, BookError> {
    let symbols = read_registry(shared)?.symbols();
    let mut applied = 0;

    for symbol in symbols {
        let records = match source.fetch_live_orders(&symbol).await {
            Ok(records) => records,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "order snapshot failed");
                continue;
            }
        };

        let mut registry = write_registry(shared)?;
        let book = registry.get_or_create(&symbol);
        for record in records {
            if book.apply_order_snapshot(record) {
                applied += 1;
            }
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use crate::execution::InstrumentRegistry;
    use crate::models::{
        Candle, InstrumentMetadata, LotSizeFilter, OrderRecord, OrderStatus, PositionIdx,
        PositionRecord, PriceFilter, Side,
    };

    fn create_test_candle(timestamp: i64, price: f64) -> Candle {
        Candle::new(timestamp, price, price, price, price, 1000.0, 1000.0 * price, true)
    }

    struct FakeMarket {
        failing: Vec<(String, Interval)>,
    }

    impl MarketDataSource for FakeMarket {
        async fn fetch_snapshot_candles(
            &self,
            symbol: &str,
            interval: Interval,
            limit: usize,
        ) -> Result<Vec<Candle>, BookError> {
            if self
                .failing
                .iter()
                .any(|(s, i)| s == symbol && *i == interval)
            {
                return Err(BookError::TransientFetch(format!("{} {}", symbol, interval)));
            }
            Ok((0..limit as i64)
                .map(|i| create_test_candle(i * interval.duration_ms(), 1.0 + i as f64))
                .collect())
        }

        async fn fetch_instrument_metadata(
            &self,
            _category: &str,
        ) -> Result<Vec<InstrumentMetadata>, BookError> {
            Ok(["XRPUSDT", "DOGEUSDT"]
                .iter()
                .map(|symbol| InstrumentMetadata {
                    symbol: symbol.to_string(),
                    contract_type: "LinearPerpetual".to_string(),
                    status: "Trading".to_string(),
                    base_currency: symbol.trim_end_matches("USDT").to_string(),
                    quote_currency: "USDT".to_string(),
                    price_filter: PriceFilter {
                        min_price: 0.0001,
                        max_price: 100.0,
                        tick_size: 0.0001,
                    },
                    lot_size_filter: LotSizeFilter {
                        min_qty: 1.0,
                        max_qty: 1e6,
                        qty_step: 1.0,
                    },
                })
                .collect())
        }
    }

    struct FakeAccount;

    impl AccountSource for FakeAccount {
        async fn fetch_positions(&self, symbol: &str) -> Result<Vec<PositionRecord>, BookError> {
            if symbol != "XRPUSDT" {
                return Err(BookError::TransientFetch("down".to_string()));
            }
            let record = |side: PositionSide, size: f64, idx: PositionIdx| PositionRecord {
                symbol: symbol.to_string(),
                side,
                size: Some(size),
                entry_price: Some(0.5),
                unrealised_pnl: Some(0.0),
                leverage: Some(10.0),
                stop_loss: None,
                take_profit: None,
                trailing_stop: None,
                position_idx: idx,
                position_status: None,
                updated_time: None,
            };
            Ok(vec![
                record(PositionSide::Buy, 5.0, PositionIdx::BuySide),
                record(PositionSide::Sell, 0.0, PositionIdx::SellSide),
                record(PositionSide::None, 0.0, PositionIdx::Merged),
            ])
        }

        async fn fetch_live_orders(&self, symbol: &str) -> Result<Vec<OrderRecord>, BookError> {
            let order = |id: &str, status: OrderStatus| OrderRecord {
                order_id: id.to_string(),
                symbol: symbol.to_string(),
                side: Side::Buy,
                price: 1.0,
                qty: 1.0,
                leaves_qty: None,
                status,
                created_time: 0,
                updated_time: 0,
            };
            Ok(vec![order("a", OrderStatus::New), order("b", OrderStatus::Filled)])
        }
    }

    fn shared() -> SharedRegistry {
        let mut xrp = InstrumentConfig::with_intervals("XRPUSDT", vec![Interval::Min1, Interval::Min5]);
        xrp.candle_init_limit = 30;
        xrp.candle_history_limit = 20;
        let btc = InstrumentConfig::with_intervals("BTCUSDT", vec![Interval::Min15]);
        InstrumentRegistry::from_config(&[xrp, btc]).unwrap().shared()
    }

    #[tokio::test]
    async fn test_failed_interval_is_degraded_only() {
        let shared = shared();
        let source = Arc::new(FakeMarket {
            failing: vec![("XRPUSDT".to_string(), Interval::Min5)],
        });

        let report = load_all_candles(&shared, source).await.unwrap();

        assert_eq!(report.loaded.len(), 2);
        assert!(report.is_degraded("XRPUSDT", Interval::Min5));
        assert!(!report.is_complete());

        let registry = read_registry(&shared).unwrap();
        let xrp = registry.get("XRPUSDT").unwrap();
        assert_eq!(xrp.candles(Interval::Min1).unwrap().len(), 20);
        assert!(xrp.candles(Interval::Min5).unwrap().is_empty());
        assert_eq!(registry.get("BTCUSDT").unwrap().candles(Interval::Min15).unwrap().len(), 200);
    }

    #[tokio::test]
    async fn test_metadata_only_for_known_books() {
        let shared = shared();
        let source = FakeMarket { failing: vec![] };

        let applied = load_instrument_metadata(&shared, &source, "linear").await.unwrap();

        assert_eq!(applied, 1);
        let registry = read_registry(&shared).unwrap();
        assert!(registry.get("XRPUSDT").unwrap().metadata().is_some());
        assert!(registry.get("BTCUSDT").unwrap().metadata().is_none());
        assert!(registry.get("DOGEUSDT").is_none());
    }

    #[tokio::test]
    async fn test_reload_positions_skips_flat_and_failures() {
        let shared = shared();

        let applied = reload_positions(&shared, &FakeAccount).await.unwrap();

        assert_eq!(applied, 1);
        let registry = read_registry(&shared).unwrap();
        let positions = registry.get("XRPUSDT").unwrap().positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, PositionSide::Buy);
    }

    #[tokio::test]
    async fn test_reload_orders_keeps_live_only() {
        let shared = shared();

        reload_orders(&shared, &FakeAccount).await.unwrap();

        let registry = read_registry(&shared).unwrap();
        for symbol in ["XRPUSDT", "BTCUSDT"] {
            let book = registry.get(symbol).unwrap();
            assert!(book.order("a").is_some());
            assert!(book.order("b").is_none());
        }
    }
}
