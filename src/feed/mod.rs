// Push feed: wire decoding, topic routing and capture replay
pub mod messages;
pub mod replay;
pub mod router;
pub mod topic;

pub use messages::{KlinePayload, OrderPayload, PositionPayload, WsEnvelope};
pub use replay::{replay_file, replay_reader};
pub use router::{FeedRouter, RouterStats};
pub use topic::Topic;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::BookError;
use crate::models::Interval;

/// One decoded push update
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Kline {
        symbol: String,
        interval: Interval,
        payload: KlinePayload,
    },
    Position(PositionPayload),
    Order(OrderPayload),
}

impl FeedEvent {
    /// Symbol the update is addressed to, when the payload carries one
    pub fn symbol(&self) -> Option<&str> {
        match self {
            FeedEvent::Kline { symbol, .. } => Some(symbol),
            FeedEvent::Position(p) => p.symbol.as_deref(),
            FeedEvent::Order(o) => o.symbol.as_deref(),
        }
    }
}

/// Decode one text frame into events, in payload order
///
/// Frames without a topic (subscription acks, pongs) and topics this crate
/// does not consume decode to nothing.
pub fn decode_message(text: &str) -> Result<Vec<FeedEvent>, BookError> {
    let envelope: WsEnvelope = serde_json::from_str(text)?;

    let Some(topic_str) = envelope.topic.as_deref() else {
        return Ok(Vec::new());
    };
    let Some(topic) = Topic::parse(topic_str) else {
        debug!(topic = %topic_str, "ignoring unknown topic");
        return Ok(Vec::new());
    };
    let data = envelope.data.unwrap_or(Value::Null);

    let events = match topic {
        Topic::Kline { interval, symbol } => payloads::<KlinePayload>(topic_str, data)
            .into_iter()
            .map(|payload| FeedEvent::Kline {
                symbol: symbol.clone(),
                interval,
                payload,
            })
            .collect(),
        Topic::Position => payloads::<PositionPayload>(topic_str, data)
            .into_iter()
            .map(FeedEvent::Position)
            .collect(),
        Topic::Order => payloads::<OrderPayload>(topic_str, data)
            .into_iter()
            .map(FeedEvent::Order)
            .collect(),
    };
    Ok(events)
}

/// `data` is normally an array; a bare object is accepted as a single entry
///
/// Entries are decoded one by one, so a malformed entry is logged and
/// skipped without losing its siblings.
fn payloads<T: DeserializeOwned>(topic: &str, data: Value) -> Vec<T> {
    let items = match data {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(topic = %topic, index, error = %e, "skipping malformed entry");
                None
            }
        })
        .collect()
}
