use crate::error::BookError;
use crate::models::Candle;
use crate::series::{BoundedSeries, Upsert};

/// Bounded candle buffer for one (instrument, interval)
///
/// Newest-first, one candle per open timestamp, never longer than its cap.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    candles: BoundedSeries<Candle>,
}

impl CandleSeries {
    /// Create a new candle series
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep
    pub fn new(max_candles: usize) -> Self {
        Self {
            candles: BoundedSeries::new(max_candles),
        }
    }

    /// Insert or replace the candle with the same open timestamp
    ///
    /// If the buffer is full, removes the oldest candle
    pub fn upsert(&mut self, candle: Candle) -> Result<Upsert, BookError> {
        candle.validate()?;
        Ok(self.candles.upsert(candle))
    }

    /// Upsert every candle in input order
    ///
    /// All candles are validated first, so a bad batch leaves the series untouched.
    pub fn bulk_upsert(&mut self, candles: &[Candle]) -> Result<(), BookError> {
        for candle in candles {
            candle.validate()?;
        }
        for candle in candles {
            self.candles.upsert(candle.clone());
        }
        Ok(())
    }

    /// Copy of all candles, newest-first
    pub fn snapshot(&self) -> Vec<Candle> {
        self.candles.to_vec()
    }

    /// The N most recent candles, newest-first
    pub fn history(&self, count: usize) -> Vec<Candle> {
        self.candles.newest(count)
    }

    /// Newest candle, usually still forming
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.get(0)
    }

    /// Second entry; the newest one is assumed to be still forming
    pub fn last_closed(&self) -> Option<&Candle> {
        self.candles.get(1)
    }

    pub fn find(&self, timestamp: i64) -> Option<&Candle> {
        self.candles.find(timestamp)
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.candles.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_candle(timestamp: i64, price: f64) -> Candle {
        Candle::new(timestamp, price, price, price, price, 1000.0, 1000.0 * price, true)
    }

    fn stamps(series: &CandleSeries) -> Vec<i64> {
        series.snapshot().iter().map(|c| c.timestamp).collect()
    }

    #[test]
    fn test_new_series() {
        let series = CandleSeries::new(100);
        assert_eq!(series.capacity(), 100);
        assert!(series.is_empty());
        assert!(series.last_closed().is_none());
    }

    #[test]
    fn test_cap_three_evicts_oldest() {
        let mut series = CandleSeries::new(3);
        for ts in 1..=4 {
            series.upsert(create_test_candle(ts, 100.0 + ts as f64)).unwrap();
        }

        assert_eq!(stamps(&series), vec![4, 3, 2]);
    }

    #[test]
    fn test_replace_keeps_length_and_order() {
        let mut series = CandleSeries::new(10);
        for ts in 1..=3 {
            series.upsert(create_test_candle(ts, 100.0)).unwrap();
        }

        let result = series.upsert(create_test_candle(2, 250.0)).unwrap();

        assert_eq!(result, Upsert::Replaced);
        assert_eq!(stamps(&series), vec![3, 2, 1]);
        assert_eq!(series.find(2).unwrap().close, 250.0);
    }

    #[test]
    fn test_invalid_candle_rejected() {
        let mut series = CandleSeries::new(10);
        let mut candle = create_test_candle(1, 100.0);
        candle.close = f64::NAN;

        assert!(matches!(
            series.upsert(candle),
            Err(BookError::Validation(_))
        ));
        assert!(series.is_empty());
    }

    #[test]
    fn test_bulk_upsert_is_atomic() {
        let mut series = CandleSeries::new(10);
        let mut bad = create_test_candle(3, 100.0);
        bad.volume = f64::INFINITY;
        let batch = vec![create_test_candle(1, 1.0), create_test_candle(2, 2.0), bad];

        assert!(series.bulk_upsert(&batch).is_err());
        assert!(series.is_empty());
    }

    #[test]
    fn test_last_closed_is_second() {
        let mut series = CandleSeries::new(10);
        series.upsert(create_test_candle(1, 1.0)).unwrap();
        assert!(series.last_closed().is_none());

        series.upsert(create_test_candle(2, 2.0)).unwrap();
        assert_eq!(series.last_closed().unwrap().timestamp, 1);
        assert_eq!(series.latest().unwrap().timestamp, 2);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut series = CandleSeries::new(10);
        series.upsert(create_test_candle(1, 1.0)).unwrap();

        let mut copy = series.snapshot();
        copy[0].close = 99.0;
        copy.clear();

        assert_eq!(series.len(), 1);
        assert_eq!(series.latest().unwrap().close, 1.0);
    }

    #[test]
    fn test_get_recent_candles() {
        let mut series = CandleSeries::new(100);
        for ts in 0..10 {
            series.upsert(create_test_candle(ts, 100.0 + ts as f64)).unwrap();
        }

        let recent = series.history(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].close, 109.0);
        assert_eq!(recent[2].close, 107.0);
    }
}
