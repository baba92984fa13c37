use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::gateway::{Bracket, LimitOrderRequest, OrderGateway, TakeProfit};
use super::instrument_registry::{read_registry, SharedRegistry};
use super::precision::{floor_to_step, round_to_step};
use crate::config::{BracketConfig, InstrumentConfig};
use crate::error::BookError;
use crate::models::Side;

/// Retry loop limits for one instrument
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub fill_timeout: Duration,
    /// Ticks between the reference price and the limit price
    pub price_tick_offset: u32,
    pub bracket: BracketConfig,
}

impl ExecutionSettings {
    pub fn from_config(config: &InstrumentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            poll_interval: Duration::from_millis(config.retry_poll_interval_ms),
            fill_timeout: Duration::from_millis(config.order_timeout_ms),
            price_tick_offset: config.price_tick_offset,
            bracket: config.bracket.clone(),
        }
    }
}

/// Stop-loss, trailing distance and take-profit prices around `entry_price`
///
/// Stops sit on the losing side of the entry, take-profits on the winning
/// side. All prices are rounded to `tick_size`. `None` for an empty config.
pub fn bracket_prices(
    side: Side,
    entry_price: f64,
    config: &BracketConfig,
    tick_size: f64,
) -> Option<Bracket> {
    if config.is_empty() {
        return None;
    }

    let sign = match side {
        Side::Buy => 1.0,
        Side::Sell => -1.0,
    };
    let at = |pct: f64| round_to_step(entry_price * (1.0 + sign * pct), tick_size);

    Some(Bracket {
        stop_loss: config.stop_loss_percent.map(|pct| at(-pct)),
        trailing_stop: config
            .trailing_stop_percent
            .map(|pct| round_to_step(entry_price * pct, tick_size)),
        take_profits: config
            .take_profit_percents
            .iter()
            .zip(&config.take_profit_portions)
            .map(|(&pct, &portion)| TakeProfit {
                price: at(pct),
                portion,
            })
            .collect(),
    })
}

/// Result of a completed retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Id of the last accepted order
    pub order_id: String,
    pub filled_qty: f64,
    /// Unfilled residual; non-zero when retries ran out or it fell below one step
    pub remaining_qty: f64,
    pub attempts: u32,
}

/// Places post-only limit orders until the requested quantity is filled
///
/// Fill progress is read from the instrument's live-order map, which the
/// order feed keeps current. An order that is no longer in the map counts
/// as fully executed.
pub struct OrderExecutor<G: OrderGateway> {
    symbol: String,
    registry: SharedRegistry,
    gateway: Arc<G>,
    settings: ExecutionSettings,
}

impl<G: OrderGateway> OrderExecutor<G> {
    pub fn new(
        symbol: impl Into<String>,
        registry: SharedRegistry,
        gateway: Arc<G>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            registry,
            gateway,
            settings,
        }
    }

    /// Executor using the limits configured for `symbol`
    pub fn for_instrument(
        symbol: &str,
        registry: SharedRegistry,
        gateway: Arc<G>,
    ) -> Result<Self, BookError> {
        let settings = {
            let guard = read_registry(&registry)?;
            ExecutionSettings::from_config(guard.require(symbol)?.config())
        };
        Ok(Self::new(symbol, registry, gateway, settings))
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Buy or sell `qty` around `reference_price`
    ///
    /// Buys are priced below and sells above the reference so the order rests
    /// on the book. Fails with `OrderPlacement` when no attempt got an order id.
    pub async fn execute(
        &self,
        side: Side,
        reference_price: f64,
        qty: f64,
    ) -> Result<ExecutionOutcome, BookError> {
        let (price, mut remaining, step, tick) = {
            let registry = read_registry(&self.registry)?;
            let book = registry.require(&self.symbol)?;
            let tick = book.tick_size()?;
            let offset = tick * self.settings.price_tick_offset as f64;
            let raw_price = match side {
                Side::Buy => reference_price - offset,
                Side::Sell => reference_price + offset,
            };
            (
                book.round_price(raw_price)?,
                book.round_quantity(qty)?,
                book.qty_step()?,
                tick,
            )
        };
        let bracket = bracket_prices(side, price, &self.settings.bracket, tick);

        if remaining <= 0.0 {
            return Err(BookError::validation(format!(
                "quantity {} is below one step of {}",
                qty, self.symbol
            )));
        }

        let mut last_order_id: Option<String> = None;
        let mut filled = 0.0;
        let mut attempts = 0;

        while attempts < self.settings.max_retries && remaining > 0.0 {
            attempts += 1;
            let request = LimitOrderRequest::post_only(&self.symbol, side, price, remaining)
                .with_bracket(bracket.clone());

            let ack = match self.gateway.submit_limit_order(&request).await {
                Ok(ack) => ack,
                Err(e) => {
                    warn!(
                        symbol = %self.symbol,
                        attempt = attempts,
                        error = %e,
                        "order submission failed"
                    );
                    continue;
                }
            };

            let live_qty = self.wait_for_fill(&ack.order_id).await?;
            let executed = (remaining - live_qty).clamp(0.0, remaining);
            filled += executed;
            remaining -= executed;

            info!(
                symbol = %self.symbol,
                side = %side,
                order_id = %ack.order_id,
                attempt = attempts,
                price = price,
                executed = executed,
                remaining = remaining,
                "order attempt finished"
            );
            last_order_id = Some(ack.order_id);

            let next = floor_to_step(remaining, step);
            if next < step {
                break;
            }
            remaining = next;
        }

        match last_order_id {
            Some(order_id) => Ok(ExecutionOutcome {
                order_id,
                filled_qty: filled,
                remaining_qty: remaining,
                attempts,
            }),
            None => Err(BookError::OrderPlacement {
                symbol: self.symbol.clone(),
                attempts,
            }),
        }
    }

    /// Poll the live-order map until the order leaves it or the timeout hits
    ///
    /// Returns the quantity still resting on the book.
    async fn wait_for_fill(&self, order_id: &str) -> Result<f64, BookError> {
        let deadline = Instant::now() + self.settings.fill_timeout;
        loop {
            sleep(self.settings.poll_interval).await;

            let live_qty = {
                let registry = read_registry(&self.registry)?;
                registry
                    .require(&self.symbol)?
                    .order(order_id)
                    .map(|o| o.live_qty())
            };

            match live_qty {
                None => return Ok(0.0),
                Some(qty) if Instant::now() >= deadline => return Ok(qty),
                Some(_) => {}
            }
        }
    }
}
