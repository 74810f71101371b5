//! Network module
//!
//! Ledger RPC access, the failover node pool, and the event bus that
//! carries swap records to bookkeeping subscribers.

pub mod event_bus;
pub mod ledger;
pub mod node_pool;

pub use event_bus::{Event, EventBus, SwapRecord};
pub use ledger::{LedgerRpc, SolanaRpc};
pub use node_pool::{
    Connection, Endpoint, EndpointHealth, EndpointStatus, NodePool, PoolSettings, ProbeReport,
};
