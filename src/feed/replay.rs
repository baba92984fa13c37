use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{decode_message, FeedEvent};
use crate::error::BookError;

/// Publish every event of a JSON-lines capture, one frame per line
///
/// Returns the number of events sent.
pub async fn replay_file(path: &Path, tx: &mpsc::Sender<FeedEvent>) -> Result<usize, BookError> {
    let file = File::open(path).await?;
    let sent = replay_reader(BufReader::new(file), tx).await?;
    info!(path = %path.display(), events = sent, "capture replayed");
    Ok(sent)
}

/// Same as [`replay_file`] over any buffered reader
///
/// Undecodable lines are logged and skipped. Stops early once the receiver
/// is gone.
pub async fn replay_reader<R>(reader: R, tx: &mpsc::Sender<FeedEvent>) -> Result<usize, BookError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let events = match decode_message(line) {
            Ok(events) => events,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping undecodable frame");
                continue;
            }
        };

        for event in events {
            if tx.send(event).await.is_err() {
                warn!(line = line_no, "feed receiver closed, stopping replay");
                return Ok(sent);
            }
            sent += 1;
        }
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPTURE: &str = concat!(
        r#"{"op": "subscribe", "success": true}"#,
        "\n",
        r#"{"topic": "kline.1.XRPUSDT", "data": [{"start": 0, "open": "1", "high": "1", "low": "1", "close": "1", "volume": "1", "turnover": "1", "confirm": true}]}"#,
        "\n\n",
        "garbage\n",
        r#"{"topic": "order", "data": [{"orderId": "a"}, {"orderId": "b"}]}"#,
        "\n",
    );

    #[tokio::test]
    async fn test_replay_reader_counts_events() {
        let (tx, mut rx) = mpsc::channel(16);

        let sent = replay_reader(CAPTURE.as_bytes(), &tx).await.unwrap();
        drop(tx);

        assert_eq!(sent, 3);
        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert!(matches!(received[0], FeedEvent::Kline { .. }));
        assert!(matches!(received[2], FeedEvent::Order(_)));
    }

    #[tokio::test]
    async fn test_replay_stops_when_receiver_closed() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        assert_eq!(replay_reader(CAPTURE.as_bytes(), &tx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let (tx, _rx) = mpsc::channel(1);
        let result = replay_file(Path::new("/nonexistent/capture.jsonl"), &tx).await;
        assert!(matches!(result, Err(BookError::Io(_))));
    }
}
