//! On-demand ordering.
//!
//! Clients push multi-signed batches; the service aggregates them and emits
//! a proposal per round on request. Which peer issues a round's proposal -
//! and which peers must already hold the batches for the rounds that may
//! follow - is a deterministic function of the ledger state ([`connection`]).
//!
//! [`OrderingState`] composes the pieces into one synchronous state machine
//! driven by the node.

mod batch_cache;
mod config;
mod connection;
mod service;
mod state;
mod tx_cache;

pub use batch_cache::BatchCache;
pub use config::OrderingConfig;
pub use connection::{route_round, select_peers, CurrentPeers};
pub use service::OrderingService;
pub use state::OrderingState;
pub use tx_cache::TxPresenceCache;
