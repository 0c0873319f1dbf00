//! Wire messages exchanged between peers.
//!
//! The RPC surface is small and push-oriented:
//!
//! - `SendBatches` - client/peer pushes batches to an ordering service
//! - `RequestProposal` / `ProposalResponse` - a round's proposal on demand
//! - `SendState` - YAC vote propagation
//! - `RequestBlock` / `BlockResponse` - committed block download
//!
//! Transport framing is out of scope here; [`codec`] provides the versioned
//! payload encoding shared by every transport.

pub mod codec;

use ledger_types::{Batch, Block, Hash, Proposal, Round, VoteMessage};
use serde::{Deserialize, Serialize};

/// Push a collection of batches to a peer's ordering service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchesRequest {
    pub batches: Vec<Batch>,
}

/// Ask the issuer of `round` for its proposal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub round: Round,
}

/// Reply to a [`ProposalRequest`]. `None` when the issuer has no proposal
/// for the round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub round: Round,
    pub proposal: Option<Proposal>,
}

/// Propagate votes (`Consensus.SendState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRequest {
    pub votes: Vec<VoteMessage>,
}

/// Ask a peer for a committed block by hash.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlockRequest {
    pub block_hash: Hash,
}

/// Reply to a [`BlockRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    pub block_hash: Hash,
    pub block: Option<Block>,
}

/// Any message a peer can send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NetworkMessage {
    Batches(BatchesRequest),
    ProposalRequest(ProposalRequest),
    ProposalResponse(ProposalResponse),
    State(StateRequest),
    BlockRequest(BlockRequest),
    BlockResponse(BlockResponse),
}

impl NetworkMessage {
    /// Message type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            NetworkMessage::Batches(_) => "Batches",
            NetworkMessage::ProposalRequest(_) => "ProposalRequest",
            NetworkMessage::ProposalResponse(_) => "ProposalResponse",
            NetworkMessage::State(_) => "State",
            NetworkMessage::BlockRequest(_) => "BlockRequest",
            NetworkMessage::BlockResponse(_) => "BlockResponse",
        }
    }
}
