//! Action types for the deterministic state machines.

use crate::{Event, RequestId, TimerId};
use ledger_types::{Batch, Block, Hash, Proposal, PublicKey, Round, VoteMessage};
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do. The runner
/// executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Push batches to a peer's ordering service. A send addressed to the
    /// local peer loops back as `Event::BatchesReceived`.
    SendBatches {
        peer: PublicKey,
        batches: Vec<Batch>,
    },

    /// Ask a peer's ordering service for the proposal of a round.
    ///
    /// The runner bounds the request with the configured proposal-request
    /// timeout and always delivers `Event::ProposalResponseReceived`,
    /// with `None` on timeout or failure.
    RequestProposal { peer: PublicKey, round: Round },

    /// Answer a proposal request received earlier, echoing its round.
    RespondProposal {
        request_id: RequestId,
        round: Round,
        proposal: Option<Proposal>,
    },

    /// Send votes to one peer.
    SendVotes {
        peer: PublicKey,
        votes: Vec<VoteMessage>,
    },

    /// Send votes to every peer in the cluster (including self, so the local
    /// vote storage sees the node's own vote).
    BroadcastVotes { votes: Vec<VoteMessage> },

    /// Fetch a committed block from a peer.
    ///
    /// Delivers `Event::BlockResponseReceived`.
    RequestBlock { peer: PublicKey, block_hash: Hash },

    /// Answer a block request received earlier, echoing the requested hash.
    RespondBlock {
        request_id: RequestId,
        block_hash: Hash,
        block: Option<Block>,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration. Re-setting an armed timer
    /// replaces it.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal (fed back as events with Internal priority)
    // ═══════════════════════════════════════════════════════════════════════
    /// Enqueue an internal event for immediate processing.
    EnqueueInternal { event: Event },

    // ═══════════════════════════════════════════════════════════════════════
    // Delegated work (runs outside the state machine, returns an event)
    // ═══════════════════════════════════════════════════════════════════════
    /// Statefully verify a proposal against the current world state.
    ///
    /// The runner speculatively applies the proposal's transactions (and
    /// rolls everything back), splitting them into a candidate block's
    /// applied transactions and rejected hashes. Delivers
    /// `Event::ProposalVerified`.
    VerifyProposal {
        round: Round,
        proposal: Proposal,
        prev_hash: Hash,
    },

    /// Validate and apply a committed block to the world state.
    ///
    /// The runner drives the command executor under one storage transaction
    /// and delivers `Event::BlockApplied` or `Event::BlockApplyFailed`.
    ApplyBlock { block: Block },

    // ═══════════════════════════════════════════════════════════════════════
    // External notifications
    // ═══════════════════════════════════════════════════════════════════════
    /// Emit a committed block for external observers.
    EmitCommittedBlock { block: Block },

    /// Acknowledge a client batch submission.
    AckBatch {
        request_id: RequestId,
        accepted: bool,
    },
}

impl Action {
    /// Check if this action performs network I/O.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Action::SendBatches { .. }
                | Action::RequestProposal { .. }
                | Action::RespondProposal { .. }
                | Action::SendVotes { .. }
                | Action::BroadcastVotes { .. }
                | Action::RequestBlock { .. }
                | Action::RespondBlock { .. }
        )
    }

    /// Check if this action is delegated work returning a callback event.
    pub fn is_delegated(&self) -> bool {
        matches!(
            self,
            Action::VerifyProposal { .. }
                | Action::ApplyBlock { .. }
                | Action::RequestProposal { .. }
                | Action::RequestBlock { .. }
        )
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SendBatches { .. } => "SendBatches",
            Action::RequestProposal { .. } => "RequestProposal",
            Action::RespondProposal { .. } => "RespondProposal",
            Action::SendVotes { .. } => "SendVotes",
            Action::BroadcastVotes { .. } => "BroadcastVotes",
            Action::RequestBlock { .. } => "RequestBlock",
            Action::RespondBlock { .. } => "RespondBlock",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
            Action::VerifyProposal { .. } => "VerifyProposal",
            Action::ApplyBlock { .. } => "ApplyBlock",
            Action::EmitCommittedBlock { .. } => "EmitCommittedBlock",
            Action::AckBatch { .. } => "AckBatch",
        }
    }
}
