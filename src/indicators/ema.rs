use super::moving_average::ema_series;
use super::{newest_first, Indicator, IndicatorValue, PriceHistory};
use crate::config::EmaConfig;

/// Exponential moving average over a single period
///
/// Outputs are kept per price point so a value can also be looked up by the
/// timestamp of the bar that produced it.
pub struct TrendAverage {
    period: usize,
    history: PriceHistory,
    /// (timestamp, ema) oldest-first, aligned with the price history
    outputs: Vec<(i64, Option<f64>)>,
}

impl TrendAverage {
    pub fn new(config: &EmaConfig) -> Self {
        Self {
            period: config.period,
            history: PriceHistory::new(config.max_size),
            outputs: Vec::new(),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Latest EMA, `None` until `period` points exist
    pub fn current(&self) -> Option<f64> {
        self.outputs.last().and_then(|(_, v)| *v)
    }

    fn recompute(&mut self) {
        let values = ema_series(&self.history.prices(), self.period);
        self.outputs = self.history.timestamps().into_iter().zip(values).collect();
    }
}

impl Indicator for TrendAverage {
    fn update(&mut self, timestamp: i64, price: f64, confirmed: bool) {
        self.history.upsert(timestamp, price, confirmed);
        self.recompute();
    }

    fn value(&self) -> IndicatorValue {
        IndicatorValue::Scalar(self.current())
    }

    fn history(&self, count: usize) -> Option<Vec<IndicatorValue>> {
        let values: Vec<Option<f64>> = self.outputs.iter().map(|(_, v)| *v).collect();
        Some(
            newest_first(&values, count)
                .into_iter()
                .map(IndicatorValue::Scalar)
                .collect(),
        )
    }

    fn value_at(&self, timestamp: i64) -> Option<IndicatorValue> {
        self.outputs
            .iter()
            .find(|(ts, _)| *ts == timestamp)
            .map(|(_, v)| IndicatorValue::Scalar(*v))
    }
}
