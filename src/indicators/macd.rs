use super::moving_average::{ema_series, sma_series};
use super::{newest_first, Indicator, IndicatorValue, MacdValue, PriceHistory};
use crate::config::MacdConfig;

/// Fast/slow moving-average spread with a signal line
pub struct MacdIndicator {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
    simple_ma: bool,
    history: PriceHistory,
    /// One output per retained price point, oldest-first
    outputs: Vec<MacdValue>,
}

impl MacdIndicator {
    pub fn new(config: &MacdConfig) -> Self {
        Self {
            fast_period: config.fast_period,
            slow_period: config.slow_period,
            signal_period: config.signal_period,
            simple_ma: config.simple_ma,
            history: PriceHistory::new(config.max_size),
            outputs: Vec::new(),
        }
    }

    pub fn current(&self) -> MacdValue {
        self.outputs.last().copied().unwrap_or_default()
    }

    fn average(&self, values: &[f64], period: usize) -> Vec<Option<f64>> {
        if self.simple_ma {
            sma_series(values, period)
        } else {
            ema_series(values, period)
        }
    }

    fn recompute(&mut self) {
        let prices = self.history.prices();
        let fast = self.average(&prices, self.fast_period);
        let slow = self.average(&prices, self.slow_period);

        let spread: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| match (f, s) {
                (Some(f), Some(s)) => Some(f - s),
                _ => None,
            })
            .collect();

        // The signal line averages only the defined part of the spread
        let first_defined = spread.iter().position(Option::is_some);
        let mut signal = vec![None; spread.len()];
        if let Some(start) = first_defined {
            let defined: Vec<f64> = spread[start..].iter().flatten().copied().collect();
            for (offset, value) in self
                .average(&defined, self.signal_period)
                .into_iter()
                .enumerate()
            {
                signal[start + offset] = value;
            }
        }

        self.outputs = spread
            .into_iter()
            .zip(signal)
            .map(|(macd, signal)| MacdValue {
                macd,
                signal,
                histogram: match (macd, signal) {
                    (Some(m), Some(s)) => Some(m - s),
                    _ => None,
                },
            })
            .collect();
    }
}

impl Indicator for MacdIndicator {
    fn update(&mut self, timestamp: i64, price: f64, confirmed: bool) {
        self.history.upsert(timestamp, price, confirmed);
        self.recompute();
    }

    fn value(&self) -> IndicatorValue {
        IndicatorValue::Macd(self.current())
    }

    fn history(&self, count: usize) -> Option<Vec<IndicatorValue>> {
        Some(
            newest_first(&self.outputs, count)
                .into_iter()
                .map(IndicatorValue::Macd)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> MacdIndicator {
        MacdIndicator::new(&MacdConfig::default())
    }

    fn wave(i: usize) -> f64 {
        100.0 + (i as f64 * 0.3).sin() * 4.0 + i as f64 * 0.1
    }

    #[test]
    fn test_all_none_below_slow_period() {
        let mut indicator = standard();
        for i in 0..25 {
            indicator.update(i as i64 * 60_000, wave(i), true);
        }

        let value = indicator.current();
        assert_eq!(value.macd, None);
        assert_eq!(value.signal, None);
        assert_eq!(value.histogram, None);
    }

    #[test]
    fn test_macd_before_signal() {
        let mut indicator = standard();
        for i in 0..26 {
            indicator.update(i as i64 * 60_000, wave(i), true);
        }
        let value = indicator.current();
        assert!(value.macd.is_some());
        assert!(value.signal.is_none());

        // signal needs 9 spread values: 26 + 8 points
        for i in 26..34 {
            indicator.update(i as i64 * 60_000, wave(i), true);
        }
        let value = indicator.current();
        assert!(value.signal.is_some());
        let histogram = value.macd.unwrap() - value.signal.unwrap();
        assert!((value.histogram.unwrap() - histogram).abs() < 1e-12);
    }

    #[test]
    fn test_small_periods_by_hand() {
        let mut indicator = MacdIndicator::new(&MacdConfig {
            fast_period: 1,
            slow_period: 2,
            signal_period: 2,
            simple_ma: true,
            max_size: 10,
        });
        // fast = price, slow = mean of last two
        for (ts, price) in [(1, 1.0), (2, 3.0), (3, 7.0)] {
            indicator.update(ts, price, true);
        }
        // spread: [_, 1.0, 2.0] -> signal = 1.5
        let value = indicator.current();
        assert_eq!(value.macd, Some(2.0));
        assert_eq!(value.signal, Some(1.5));
        assert_eq!(value.histogram, Some(0.5));
    }

    #[test]
    fn test_full_replay_is_stable() {
        let mut indicator = standard();
        for i in 0..60 {
            indicator.update(i as i64 * 60_000, wave(i), true);
        }
        let first = indicator.current();

        for i in 0..60 {
            indicator.update(i as i64 * 60_000, wave(i), true);
        }
        assert_eq!(indicator.current(), first);
    }

    #[test]
    fn test_history_length() {
        let mut indicator = standard();
        for i in 0..40 {
            indicator.update(i as i64, wave(i), true);
        }
        let history = indicator.history(5).unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0], indicator.value());
    }
}
