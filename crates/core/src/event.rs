//! Event types for the deterministic state machines.

use crate::RequestId;
use ledger_types::{
    Batch, Block, ConsensusOutcome, Hash, LedgerState, Proposal, Round, VoteMessage,
};
use std::sync::Arc;

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same time are processed in priority order. Lower values are
/// processed first, so internal consequences of an event are handled before
/// new external inputs and causality is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    Internal = 0,
    /// Timer events: scheduled by the node itself.
    Timer = 1,
    /// Network events: inputs from other peers.
    Network = 2,
    /// Client events: inputs from users.
    Client = 3,
}

/// All possible events a node can receive.
///
/// Events are **passive data** - they describe something that happened. The
/// state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// The proposal wait for the current round expired.
    ProposalTimer,

    // ═══════════════════════════════════════════════════════════════════════
    // Network (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// Batches pushed to this node's ordering service by a peer.
    BatchesReceived { batches: Vec<Batch> },

    /// A peer asked this node's ordering service for a round's proposal.
    ProposalRequestReceived { round: Round, request_id: RequestId },

    /// Reply (or timeout) for a proposal request this node issued.
    ///
    /// `None` means the issuer had nothing for the round or the request
    /// timed out; the gate votes `NoProposal` either way.
    ProposalResponseReceived {
        round: Round,
        proposal: Option<Proposal>,
    },

    /// Votes pushed by a peer (`SendState`).
    VotesReceived { votes: Vec<VoteMessage> },

    /// A peer asked for a committed block by hash.
    BlockRequestReceived {
        block_hash: Hash,
        request_id: RequestId,
    },

    /// Reply for a block request this node issued.
    BlockResponseReceived {
        block_hash: Hash,
        block: Option<Block>,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal (priority: Internal)
    // ═══════════════════════════════════════════════════════════════════════
    /// A proposal passed stateful verification and became a candidate block.
    ///
    /// Callback from `Action::VerifyProposal`. The block separates the
    /// proposal's transactions into applied ones and rejected hashes.
    ProposalVerified {
        round: Round,
        proposal_hash: Hash,
        block: Block,
    },

    /// Vote storage reached a terminal outcome for a round.
    OutcomeDetermined { outcome: ConsensusOutcome },

    /// A committed block was applied to the world state.
    ///
    /// Carries the refreshed ledger state (tip and peer set) so the state
    /// machines never read storage themselves.
    BlockApplied {
        block: Arc<Block>,
        ledger_state: LedgerState,
    },

    /// Applying a committed block failed; the round is treated as rejected.
    BlockApplyFailed { round: Round, description: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Client (priority: Client)
    // ═══════════════════════════════════════════════════════════════════════
    /// A client submitted a multi-signed batch.
    SubmitBatch { batch: Batch, request_id: RequestId },
}

impl Event {
    /// Get the priority for this event type.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::ProposalVerified { .. }
            | Event::OutcomeDetermined { .. }
            | Event::BlockApplied { .. }
            | Event::BlockApplyFailed { .. } => EventPriority::Internal,

            Event::ProposalTimer => EventPriority::Timer,

            Event::BatchesReceived { .. }
            | Event::ProposalRequestReceived { .. }
            | Event::ProposalResponseReceived { .. }
            | Event::VotesReceived { .. }
            | Event::BlockRequestReceived { .. }
            | Event::BlockResponseReceived { .. } => EventPriority::Network,

            Event::SubmitBatch { .. } => EventPriority::Client,
        }
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ProposalTimer => "ProposalTimer",
            Event::BatchesReceived { .. } => "BatchesReceived",
            Event::ProposalRequestReceived { .. } => "ProposalRequestReceived",
            Event::ProposalResponseReceived { .. } => "ProposalResponseReceived",
            Event::VotesReceived { .. } => "VotesReceived",
            Event::BlockRequestReceived { .. } => "BlockRequestReceived",
            Event::BlockResponseReceived { .. } => "BlockResponseReceived",
            Event::ProposalVerified { .. } => "ProposalVerified",
            Event::OutcomeDetermined { .. } => "OutcomeDetermined",
            Event::BlockApplied { .. } => "BlockApplied",
            Event::BlockApplyFailed { .. } => "BlockApplyFailed",
            Event::SubmitBatch { .. } => "SubmitBatch",
        }
    }
}
