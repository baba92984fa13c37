// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod series;
pub mod strategy;

// Re-export commonly used types
pub use config::{AppConfig, InstrumentConfig};
pub use error::BookError;
pub use execution::{InstrumentBook, InstrumentRegistry, OrderExecutor, SharedRegistry};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, BookError>;
