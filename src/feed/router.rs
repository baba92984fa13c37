use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::FeedEvent;
use crate::error::BookError;
use crate::execution::{write_registry, SharedRegistry};

/// Counters for one router run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub applied: usize,
    /// Failed validation or targeted an untracked interval
    pub rejected: usize,
    /// Kline for an unknown symbol
    pub dropped: usize,
}

/// Applies push events to the registry in arrival order
pub struct FeedRouter {
    registry: SharedRegistry,
    rx: mpsc::Receiver<FeedEvent>,
}

impl FeedRouter {
    pub fn new(registry: SharedRegistry, rx: mpsc::Receiver<FeedEvent>) -> Self {
        Self { registry, rx }
    }

    /// Router plus the sender that feeds it
    pub fn channel(registry: SharedRegistry, capacity: usize) -> (mpsc::Sender<FeedEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(registry, rx))
    }

    /// Drain the channel until every sender is gone
    pub async fn run(mut self) -> RouterStats {
        let mut stats = RouterStats::default();

        while let Some(event) = self.rx.recv().await {
            match apply_event(&self.registry, event) {
                Ok(true) => stats.applied += 1,
                Ok(false) => stats.dropped += 1,
                Err(BookError::LockPoisoned) => {
                    warn!("registry lock poisoned, stopping feed router");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "rejected push update");
                    stats.rejected += 1;
                }
            }
        }

        info!(
            applied = stats.applied,
            rejected = stats.rejected,
            dropped = stats.dropped,
            "feed router stopped"
        );
        stats
    }
}

/// Apply one event; `Ok(false)` when it was dropped without error
///
/// Account updates for a symbol without a book create an untracked one.
pub fn apply_event(registry: &SharedRegistry, event: FeedEvent) -> Result<bool, BookError> {
    match event {
        FeedEvent::Kline {
            symbol,
            interval,
            payload,
        } => {
            let mut registry = write_registry(registry)?;
            let Some(book) = registry.get_mut(&symbol) else {
                debug!(symbol = %symbol, interval = %interval, "kline for unknown instrument");
                return Ok(false);
            };
            book.apply_push_candle(interval, &payload)?;
            Ok(true)
        }
        FeedEvent::Position(payload) => {
            let record = payload.to_record()?;
            let mut registry = write_registry(registry)?;
            Ok(registry
                .get_or_create(&record.symbol.clone())
                .apply_position_update(record))
        }
        FeedEvent::Order(payload) => {
            let record = payload.to_record()?;
            let mut registry = write_registry(registry)?;
            Ok(registry
                .get_or_create(&record.symbol.clone())
                .apply_order_update(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use crate::execution::{read_registry, InstrumentRegistry};
    use crate::feed::{decode_message, KlinePayload, OrderPayload, PositionPayload};
    use crate::models::{Interval, Side};

    fn shared() -> SharedRegistry {
        InstrumentRegistry::from_config(&[InstrumentConfig::with_intervals(
            "XRPUSDT",
            vec![Interval::Min1],
        )])
        .unwrap()
        .shared()
    }

    fn kline(symbol: &str, interval: Interval, start: i64, close: f64) -> FeedEvent {
        FeedEvent::Kline {
            symbol: symbol.to_string(),
            interval,
            payload: KlinePayload {
                start: Some(start),
                open: Some(close),
                high: Some(close),
                low: Some(close),
                close: Some(close),
                volume: Some(1.0),
                turnover: Some(close),
                confirm: Some(true),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_router_applies_in_order() {
        let registry = shared();
        let (tx, router) = FeedRouter::channel(registry.clone(), 16);
        let handle = tokio::spawn(router.run());

        tx.send(kline("XRPUSDT", Interval::Min1, 60_000, 1.0)).await.unwrap();
        // correction of the same bar wins
        tx.send(kline("XRPUSDT", Interval::Min1, 60_000, 2.0)).await.unwrap();
        tx.send(kline("BTCUSDT", Interval::Min1, 60_000, 9.0)).await.unwrap();
        tx.send(kline("XRPUSDT", Interval::Min5, 60_000, 9.0)).await.unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(
            stats,
            RouterStats {
                applied: 2,
                rejected: 1,
                dropped: 1
            }
        );

        let guard = read_registry(&registry).unwrap();
        let series = guard.get("XRPUSDT").unwrap().candles(Interval::Min1).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.latest().unwrap().close, 2.0);
        assert!(guard.get("BTCUSDT").is_none());
    }

    #[test]
    fn test_account_updates_create_untracked_book() {
        let registry = shared();
        let position = PositionPayload {
            symbol: Some("SOLUSDT".to_string()),
            side: Some("Sell".to_string()),
            size: Some(2.0),
            position_idx: Some(2),
            ..Default::default()
        };

        assert!(apply_event(&registry, FeedEvent::Position(position)).unwrap());

        let guard = read_registry(&registry).unwrap();
        let book = guard.get("SOLUSDT").unwrap();
        assert!(!book.is_tracked());
        assert_eq!(book.position(Side::Sell).unwrap().size, Some(2.0));
    }

    #[test]
    fn test_invalid_order_rejected() {
        let registry = shared();
        let order = OrderPayload {
            order_id: Some("1".to_string()),
            symbol: Some("XRPUSDT".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            apply_event(&registry, FeedEvent::Order(order)),
            Err(BookError::Validation(_))
        ));
        assert!(read_registry(&registry).unwrap().get("XRPUSDT").unwrap().orders().is_empty());
    }

    #[test]
    fn test_decoded_order_lifecycle() {
        let registry = shared();
        let frame = |status: &str| {
            format!(
                r#"{{"topic": "order", "data": [{{"orderId": "42", "symbol": "XRPUSDT", "side": "Buy",
                "price": "0.5", "qty": "10", "leavesQty": "10", "orderStatus": "{}",
                "createdTime": "1", "updatedTime": "2"}}]}}"#,
                status
            )
        };

        for event in decode_message(&frame("New")).unwrap() {
            apply_event(&registry, event).unwrap();
        }
        assert!(read_registry(&registry).unwrap().get("XRPUSDT").unwrap().order("42").is_some());

        for event in decode_message(&frame("Filled")).unwrap() {
            apply_event(&registry, event).unwrap();
        }
        assert!(read_registry(&registry).unwrap().get("XRPUSDT").unwrap().order("42").is_none());
    }
}
