use super::moving_average::ema_series;
use super::{newest_first, CrossValue, Indicator, IndicatorValue, PriceHistory};
use crate::config::MaCrossConfig;

/// Short and long EMA pair over one interval's prices
///
/// Crossing direction is not stored; see [`cross_direction`].
pub struct MaCrossIndicator {
    short_period: usize,
    long_period: usize,
    history: PriceHistory,
    outputs: Vec<CrossValue>,
}

impl MaCrossIndicator {
    pub fn new(config: &MaCrossConfig) -> Self {
        Self {
            short_period: config.short_period,
            long_period: config.long_period,
            history: PriceHistory::new(config.max_size),
            outputs: Vec::new(),
        }
    }

    pub fn current(&self) -> CrossValue {
        self.outputs.last().copied().unwrap_or_default()
    }

    fn recompute(&mut self) {
        let prices = self.history.prices();
        let short = ema_series(&prices, self.short_period);
        let long = ema_series(&prices, self.long_period);

        self.outputs = short
            .into_iter()
            .zip(long)
            .map(|(short, long)| CrossValue { short, long })
            .collect();
    }
}

impl Indicator for MaCrossIndicator {
    fn update(&mut self, timestamp: i64, price: f64, confirmed: bool) {
        self.history.upsert(timestamp, price, confirmed);
        self.recompute();
    }

    fn value(&self) -> IndicatorValue {
        IndicatorValue::Cross(self.current())
    }

    fn history(&self, count: usize) -> Option<Vec<IndicatorValue>> {
        Some(
            newest_first(&self.outputs, count)
                .into_iter()
                .map(IndicatorValue::Cross)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    /// Short average moved above the long one
    Golden,
    /// Short average moved below the long one
    Death,
}

/// Direction of a crossing between two consecutive crossover outputs
pub fn cross_direction(previous: CrossValue, current: CrossValue) -> Option<CrossDirection> {
    let (ps, pl) = (previous.short?, previous.long?);
    let (cs, cl) = (current.short?, current.long?);

    if ps <= pl && cs > cl {
        Some(CrossDirection::Golden)
    } else if ps >= pl && cs < cl {
        Some(CrossDirection::Death)
    } else {
        None
    }
}
