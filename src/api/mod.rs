// Exchange REST clients
pub mod bybit;

pub use bybit::BybitPublicClient;
