// =============================================================================
// Solana JSON-RPC Adapter
// =============================================================================
//
// - `client`      — paced JSON-RPC calls over the resilient client
// - `transaction` — parsed transfer view + counterparty classification
// - `estimator`   — pluggable active-address estimate

pub mod client;
pub mod estimator;
pub mod transaction;

pub use client::{ChainClient, JsonRpcFormat, Pacing, SignatureInfo};
pub use estimator::{ActiveAddressEstimator, DistinctAddressEstimator};
pub use transaction::{TransactionInfo, TxKind, LAMPORTS_PER_SOL};
