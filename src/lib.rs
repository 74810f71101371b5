//! SOL Swap Router Library
//!
//! Resilient quote-and-execution pipeline for token swaps on Solana:
//! cached aggregator quotes, a failover pool of RPC nodes, and ordered
//! setup-then-swap transaction submission.

pub mod config;
pub mod errors;
pub mod telemetry;
pub mod utils;
pub mod network;
pub mod quote;
pub mod execution;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export main types
pub use config::AppConfig;
pub use errors::SwapError;
pub use execution::{SwapPipeline, SwapReceipt, TransactionPlan};
pub use network::{Event, EventBus, NodePool};
pub use quote::{FeeRouting, Quote, QuoteCache, QuoteService};
