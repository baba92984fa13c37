use std::fmt;

use crate::models::Interval;

/// Push subscription topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `kline.<interval>.<symbol>`
    Kline { interval: Interval, symbol: String },
    /// `position` or `position.<category>`
    Position,
    /// `order` or `order.<category>`
    Order,
}

impl Topic {
    pub fn kline(interval: Interval, symbol: impl Into<String>) -> Self {
        Topic::Kline {
            interval,
            symbol: symbol.into(),
        }
    }

    /// `None` for topics this crate does not consume
    pub fn parse(topic: &str) -> Option<Self> {
        let mut parts = topic.splitn(3, '.');
        match parts.next()? {
            "kline" => {
                let interval = parts.next()?.parse().ok()?;
                let symbol = parts.next().filter(|s| !s.is_empty())?;
                Some(Topic::kline(interval, symbol))
            }
            "position" => Some(Topic::Position),
            "order" => Some(Topic::Order),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Kline { interval, symbol } => write!(f, "kline.{}.{}", interval, symbol),
            Topic::Position => f.write_str("position"),
            Topic::Order => f.write_str("order"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kline() {
        assert_eq!(
            Topic::parse("kline.5.XRPUSDT"),
            Some(Topic::kline(Interval::Min5, "XRPUSDT"))
        );
        assert_eq!(
            Topic::parse("kline.D.BTCUSDT"),
            Some(Topic::kline(Interval::Day1, "BTCUSDT"))
        );
    }

    #[test]
    fn test_parse_account_topics() {
        assert_eq!(Topic::parse("position"), Some(Topic::Position));
        assert_eq!(Topic::parse("position.linear"), Some(Topic::Position));
        assert_eq!(Topic::parse("order.linear"), Some(Topic::Order));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(Topic::parse("orderbook.50.XRPUSDT"), None);
        assert_eq!(Topic::parse("kline.7.XRPUSDT"), None);
        assert_eq!(Topic::parse("kline.1"), None);
        assert_eq!(Topic::parse(""), None);
    }

    #[test]
    fn test_display_matches_wire() {
        let topic = Topic::kline(Interval::Min15, "XRPUSDT");
        assert_eq!(topic.to_string(), "kline.15.XRPUSDT");
        assert_eq!(Topic::parse(&topic.to_string()), Some(topic));
    }
}
