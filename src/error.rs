use thiserror::Error;

/// Errors raised while maintaining instrument books and placing orders.
#[derive(Error, Debug)]
pub enum BookError {
    /// Malformed candle, order or position payload. Fatal to the single update only.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Snapshot fetch or order submission failed; the attempt produced nothing.
    #[error("fetch failed: {0}")]
    TransientFetch(String),

    /// Static configuration for an instrument is unusable.
    #[error("invalid configuration for {symbol}: {reason}")]
    FatalInit { symbol: String, reason: String },

    /// No attempt of the retry loop produced an order id.
    #[error("failed to place order for {symbol} after {attempts} attempts")]
    OrderPlacement { symbol: String, attempts: u32 },

    #[error("no instrument metadata loaded for {0}")]
    MissingMetadata(String),

    #[error("unknown instrument {0}")]
    UnknownInstrument(String),

    #[error("instrument registry lock poisoned")]
    LockPoisoned,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BookError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn fatal_init(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FatalInit {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry or the next pass may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch(_) | Self::Http(_))
    }
}
