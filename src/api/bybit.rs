use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ExchangeConfig;
use crate::error::BookError;
use crate::execution::MarketDataSource;
use crate::feed::messages::lenient_f64;
use crate::models::{Candle, InstrumentMetadata, Interval, LotSizeFilter, PriceFilter};

const KLINE_PATH: &str = "/v5/market/kline";
const INSTRUMENTS_PATH: &str = "/v5/market/instruments-info";
const MAX_KLINE_LIMIT: usize = 1000;
const INSTRUMENTS_PAGE_LIMIT: usize = 1000;

type BybitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Bybit v5 response wrapper
#[derive(Debug, Deserialize)]
struct BybitResponse<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: Option<T>,
}

/// Kline rows: [start, open, high, low, close, volume, turnover], newest first
#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentsResult {
    #[serde(default)]
    list: Vec<RawInstrument>,
    #[serde(default)]
    next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstrument {
    symbol: String,
    #[serde(default)]
    contract_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    base_coin: String,
    #[serde(default)]
    quote_coin: String,
    price_filter: Option<RawPriceFilter>,
    lot_size_filter: Option<RawLotSizeFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPriceFilter {
    #[serde(default, deserialize_with = "lenient_f64")]
    min_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    max_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    tick_size: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLotSizeFilter {
    #[serde(default, deserialize_with = "lenient_f64")]
    min_order_qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    max_order_qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    qty_step: Option<f64>,
}

impl RawInstrument {
    fn into_metadata(self) -> Result<InstrumentMetadata, BookError> {
        let missing = |what: &str| BookError::validation(format!("{} has no {}", self.symbol, what));

        let price = self.price_filter.as_ref().ok_or_else(|| missing("priceFilter"))?;
        let price_filter = PriceFilter {
            min_price: price.min_price.ok_or_else(|| missing("minPrice"))?,
            max_price: price.max_price.ok_or_else(|| missing("maxPrice"))?,
            tick_size: price.tick_size.ok_or_else(|| missing("tickSize"))?,
        };

        let lot = self.lot_size_filter.as_ref().ok_or_else(|| missing("lotSizeFilter"))?;
        let lot_size_filter = LotSizeFilter {
            min_qty: lot.min_order_qty.ok_or_else(|| missing("minOrderQty"))?,
            max_qty: lot.max_order_qty.ok_or_else(|| missing("maxOrderQty"))?,
            qty_step: lot.qty_step.ok_or_else(|| missing("qtyStep"))?,
        };

        Ok(InstrumentMetadata {
            symbol: self.symbol,
            contract_type: self.contract_type,
            status: self.status,
            base_currency: self.base_coin,
            quote_currency: self.quote_coin,
            price_filter,
            lot_size_filter,
        })
    }
}

/// Public (unsigned) Bybit v5 market data client
///
/// Cloneable; clones share the HTTP pool and the rate limiter.
#[derive(Clone)]
pub struct BybitPublicClient {
    client: Client,
    base_url: String,
    category: String,
    rate_limiter: Arc<BybitRateLimiter>,
}

impl BybitPublicClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self, BookError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            category: config.category.clone(),
            rate_limiter,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BookError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!(path, "Bybit GET request");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BookError::TransientFetch(format!(
                "Bybit HTTP {} on {}: {}",
                status, path, body
            )));
        }

        let wrapper: BybitResponse<T> = serde_json::from_str(&body)?;
        if wrapper.ret_code != 0 {
            return Err(BookError::TransientFetch(format!(
                "Bybit API error {} on {}: {}",
                wrapper.ret_code, path, wrapper.ret_msg
            )));
        }

        wrapper
            .result
            .ok_or_else(|| BookError::TransientFetch(format!("Bybit {} returned no result", path)))
    }

    /// Candles for `symbol`, oldest first
    ///
    /// A bar is confirmed once its window has fully elapsed.
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, BookError> {
        let query = [
            ("category", self.category.clone()),
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.clamp(1, MAX_KLINE_LIMIT).to_string()),
        ];
        let result: KlineResult = self.get(KLINE_PATH, &query).await?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut candles = Vec::with_capacity(result.list.len());
        for row in result.list.iter().rev() {
            match parse_kline_row(row, interval, now_ms) {
                Ok(candle) => candles.push(candle),
                Err(e) => warn!(symbol = %symbol, interval = %interval, error = %e, "skipping kline row"),
            }
        }
        Ok(candles)
    }

    /// Every instrument of `category`, following pagination
    ///
    /// Entries without complete filters are logged and skipped.
    pub async fn fetch_instruments(
        &self,
        category: &str,
    ) -> Result<Vec<InstrumentMetadata>, BookError> {
        let mut instruments = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("category", category.to_string()),
                ("limit", INSTRUMENTS_PAGE_LIMIT.to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page: InstrumentsResult = self.get(INSTRUMENTS_PATH, &query).await?;
            for raw in page.list {
                match raw.into_metadata() {
                    Ok(metadata) => instruments.push(metadata),
                    Err(e) => warn!(error = %e, "skipping instrument"),
                }
            }

            match page.next_page_cursor.filter(|c| !c.is_empty()) {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(instruments)
    }
}

fn parse_kline_row(row: &[String], interval: Interval, now_ms: i64) -> Result<Candle, BookError> {
    if row.len() < 7 {
        return Err(BookError::validation(format!(
            "kline row has {} fields, expected 7",
            row.len()
        )));
    }
    let number = |i: usize, name: &str| -> Result<f64, BookError> {
        row[i]
            .parse::<f64>()
            .map_err(|_| BookError::validation(format!("kline {} '{}' is not a number", name, row[i])))
    };
    let start: i64 = row[0]
        .parse()
        .map_err(|_| BookError::validation(format!("kline start '{}' is not a timestamp", row[0])))?;

    let candle = Candle::new(
        start,
        number(1, "open")?,
        number(2, "high")?,
        number(3, "low")?,
        number(4, "close")?,
        number(5, "volume")?,
        number(6, "turnover")?,
        start + interval.duration_ms() < now_ms,
    );
    candle.validate()?;
    Ok(candle)
}

impl MarketDataSource for BybitPublicClient {
    async fn fetch_snapshot_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, BookError> {
        self.fetch_klines(symbol, interval, limit).await
    }

    async fn fetch_instrument_metadata(
        &self,
        category: &str,
    ) -> Result<Vec<InstrumentMetadata>, BookError> {
        self.fetch_instruments(category).await
    }
}
