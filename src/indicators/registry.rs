use std::collections::{BTreeMap, HashMap};

use super::{Indicator, IndicatorValue};
use crate::models::Interval;

/// Named indicators grouped by interval
///
/// Updates for an interval fan out to every indicator registered under it.
#[derive(Default)]
pub struct IndicatorRegistry {
    by_interval: HashMap<Interval, BTreeMap<String, Box<dyn Indicator>>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `indicator` to `interval` under `key`, replacing any previous binding
    pub fn register(
        &mut self,
        interval: Interval,
        key: impl Into<String>,
        indicator: Box<dyn Indicator>,
    ) {
        self.by_interval
            .entry(interval)
            .or_default()
            .insert(key.into(), indicator);
    }

    /// Feed one price point to every indicator of `interval`. Unknown intervals are ignored.
    pub fn update(&mut self, interval: Interval, timestamp: i64, price: f64, confirmed: bool) {
        let Some(indicators) = self.by_interval.get_mut(&interval) else {
            return;
        };
        for indicator in indicators.values_mut() {
            indicator.update(timestamp, price, confirmed);
        }
    }

    pub fn get(&self, interval: Interval, key: &str) -> Option<&dyn Indicator> {
        self.by_interval
            .get(&interval)
            .and_then(|m| m.get(key))
            .map(|b| &**b)
    }

    pub fn value(&self, interval: Interval, key: &str) -> Option<IndicatorValue> {
        self.get(interval, key).map(|i| i.value())
    }

    pub fn history(&self, interval: Interval, key: &str, count: usize) -> Option<Vec<IndicatorValue>> {
        self.get(interval, key).and_then(|i| i.history(count))
    }

    pub fn value_at(&self, interval: Interval, key: &str, timestamp: i64) -> Option<IndicatorValue> {
        self.get(interval, key).and_then(|i| i.value_at(timestamp))
    }

    /// Keys registered under `interval`, sorted
    pub fn keys(&self, interval: Interval) -> Vec<&str> {
        self.by_interval
            .get(&interval)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}
