// =============================================================================
// Binance Exchange Adapter
// =============================================================================

pub mod client;
pub mod rate_limit;

pub use client::{ApiFamily, Credentials, ExchangeClient, RestFormat, RestParams};
pub use rate_limit::WeightTracker;
