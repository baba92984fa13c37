use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BookError;

const MINUTE_MS: i64 = 60 * 1000;

/// Candle periodicity, named by the exchange's interval strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Min60,
    Min120,
    Min240,
    Min360,
    Min720,
    Day1,
    Week1,
    Month1,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::Min1,
        Interval::Min3,
        Interval::Min5,
        Interval::Min15,
        Interval::Min30,
        Interval::Min60,
        Interval::Min120,
        Interval::Min240,
        Interval::Min360,
        Interval::Min720,
        Interval::Day1,
        Interval::Week1,
        Interval::Month1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1",
            Interval::Min3 => "3",
            Interval::Min5 => "5",
            Interval::Min15 => "15",
            Interval::Min30 => "30",
            Interval::Min60 => "60",
            Interval::Min120 => "120",
            Interval::Min240 => "240",
            Interval::Min360 => "360",
            Interval::Min720 => "720",
            Interval::Day1 => "D",
            Interval::Week1 => "W",
            Interval::Month1 => "M",
        }
    }

    /// Window length in milliseconds. A month counts as 30 days.
    pub fn duration_ms(&self) -> i64 {
        match self {
            Interval::Min1 => MINUTE_MS,
            Interval::Min3 => 3 * MINUTE_MS,
            Interval::Min5 => 5 * MINUTE_MS,
            Interval::Min15 => 15 * MINUTE_MS,
            Interval::Min30 => 30 * MINUTE_MS,
            Interval::Min60 => 60 * MINUTE_MS,
            Interval::Min120 => 120 * MINUTE_MS,
            Interval::Min240 => 240 * MINUTE_MS,
            Interval::Min360 => 360 * MINUTE_MS,
            Interval::Min720 => 720 * MINUTE_MS,
            Interval::Day1 => 24 * 60 * MINUTE_MS,
            Interval::Week1 => 7 * 24 * 60 * MINUTE_MS,
            Interval::Month1 => 30 * 24 * 60 * MINUTE_MS,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| BookError::validation(format!("unknown interval '{}'", s)))
    }
}

impl TryFrom<String> for Interval {
    type Error = BookError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}
