// Instrument books, snapshot loading and order execution
pub mod candle_series;
pub mod executor;
pub mod gateway;
pub mod instrument_book;
pub mod instrument_registry;
pub mod loader;
pub mod precision;

pub use candle_series::CandleSeries;
pub use executor::{bracket_prices, ExecutionOutcome, ExecutionSettings, OrderExecutor};
pub use gateway::{
    AccountSource, Bracket, LimitOrderRequest, MarketDataSource, OrderAck, OrderGateway,
    PaperGateway, TakeProfit,
};
pub use instrument_book::{InstrumentBook, PnlSummary};
pub use instrument_registry::{read_registry, write_registry, InstrumentRegistry, SharedRegistry};
pub use loader::{
    load_all_candles, load_instrument_metadata, reload_orders, reload_positions, LoadReport,
};
pub use precision::{floor_to_step, round_to_step, step_decimals};
