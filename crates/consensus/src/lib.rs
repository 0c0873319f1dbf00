//! Chained voting consensus.
//!
//! Each round the cluster votes on the pair (proposal hash, block hash).
//! [`VoteStorage`] accumulates votes and detects quorum under the
//! configured [`ConsistencyModel`]; [`ConsensusState`] drives the round
//! phases and binds proposals to votes.

mod config;
mod state;
mod supermajority;
mod vote_storage;

pub use config::ConsensusConfig;
pub use state::{ConsensusState, RoundPhase};
pub use supermajority::ConsistencyModel;
pub use vote_storage::VoteStorage;
