//! Production runner.
//!
//! Owns the I/O around a [`NodeStateMachine`]: the network adapter, the
//! storage backend, timers, and client channels. Events are delivered to the
//! state machine one at a time; returned actions are executed here, and
//! their results flow back in as internal events, which always drain before
//! new external input.

use crate::config::NodeConfig;
use crate::state::NodeStateMachine;
use ledger_core::{Action, Event, RequestId, StateMachine, TimerId};
use ledger_messages::{
    BatchesRequest, BlockRequest, BlockResponse, NetworkMessage, ProposalRequest,
    ProposalResponse, StateRequest,
};
use ledger_types::{Batch, Block, KeyPair, PublicKey, Round};
use ledger_wsv::{
    restore_wsv, verify_proposal, BlockStore, ChainValidator, CommandExecutor, KvBackend,
    RestoreError, WsvQuery,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

/// Sends wire messages to remote peers. Delivery is best effort; the
/// consensus protocol tolerates loss.
pub trait NetworkAdapter: Send + Sync + 'static {
    fn send(&self, to: PublicKey, message: NetworkMessage);
}

/// Requests a client can make against a running node.
pub enum ClientCommand {
    /// Submit a batch; the reply reports acceptance into the pipeline.
    SubmitBatch {
        batch: Batch,
        reply: oneshot::Sender<bool>,
    },
}

/// Errors that can abort the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("world state restore failed: {0}")]
    Restore(#[from] RestoreError),

    #[error("storage error: {0}")]
    Storage(#[from] ledger_wsv::StorageError),

    #[error("block store is empty; a genesis block must be provisioned")]
    NoGenesis,
}

/// Drives one node.
pub struct NodeRunner<A: NetworkAdapter> {
    machine: NodeStateMachine,
    backend: Arc<dyn KvBackend>,
    adapter: A,
    local_key: PublicKey,

    inbound: mpsc::Receiver<(PublicKey, NetworkMessage)>,
    clients: mpsc::Receiver<ClientCommand>,
    shutdown: mpsc::Receiver<()>,
    committed_tx: broadcast::Sender<Block>,

    /// Internal events to drain before any external input.
    internal: VecDeque<Event>,

    /// Remote requests awaiting our response, by request id.
    pending_remote: HashMap<RequestId, PublicKey>,
    /// Client acks awaiting batch admission.
    client_replies: HashMap<RequestId, oneshot::Sender<bool>>,
    next_request: u64,

    /// Armed proposal timer, if any.
    proposal_deadline: Option<Instant>,
    /// Outstanding proposal request and its timeout.
    proposal_request: Option<(Round, Instant)>,
    proposal_request_timeout: Duration,
}

/// Handles to a spawned runner.
///
/// Dropping the handle closes its channels and stops the runner.
pub struct NodeHandle {
    pub client_tx: mpsc::Sender<ClientCommand>,
    pub inbound_tx: mpsc::Sender<(PublicKey, NetworkMessage)>,
    pub shutdown_tx: mpsc::Sender<()>,
    pub committed_rx: broadcast::Receiver<Block>,
}

impl<A: NetworkAdapter> NodeRunner<A> {
    /// Construct a runner and its control handles.
    pub fn new(
        keypair: KeyPair,
        config: NodeConfig,
        backend: Arc<dyn KvBackend>,
        adapter: A,
    ) -> (Self, NodeHandle) {
        let (client_tx, clients) = mpsc::channel(256);
        let (inbound_tx, inbound) = mpsc::channel(1024);
        let (shutdown_tx, shutdown) = mpsc::channel(1);
        let (committed_tx, committed_rx) = broadcast::channel(64);

        let proposal_request_timeout = config.ordering.proposal_request_timeout;
        let local_key = keypair.public_key();
        let runner = Self {
            machine: NodeStateMachine::new(keypair, config),
            backend,
            adapter,
            local_key,
            inbound,
            clients,
            shutdown,
            committed_tx: committed_tx.clone(),
            internal: VecDeque::new(),
            pending_remote: HashMap::new(),
            client_replies: HashMap::new(),
            next_request: 0,
            proposal_deadline: None,
            proposal_request: None,
            proposal_request_timeout,
        };
        (
            runner,
            NodeHandle {
                client_tx,
                inbound_tx,
                shutdown_tx,
                committed_rx,
            },
        )
    }

    /// Restore the world state, enter the first round, and serve events
    /// until shutdown.
    pub async fn run(mut self) -> Result<(), RunnerError> {
        let top = restore_wsv(self.backend.as_ref(), &ChainValidator, false)?;
        let last_block = BlockStore::new(self.backend.as_ref())
            .get(top)?
            .ok_or(RunnerError::NoGenesis)?;
        let ledger_state = WsvQuery::new(self.backend.as_ref())
            .ledger_state()?
            .ok_or(RunnerError::NoGenesis)?;
        info!(height = top.0, "node starting");

        self.machine.set_time(unix_ms());
        let actions = self.machine.initialize(&last_block, ledger_state);
        for action in actions {
            self.perform(action);
        }

        loop {
            while let Some(event) = self.internal.pop_front() {
                self.handle(event);
            }

            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    info!("shutdown requested");
                    return Ok(());
                }

                () = sleep_until_opt(self.proposal_deadline) => {
                    self.proposal_deadline = None;
                    self.handle(Event::ProposalTimer);
                }

                () = sleep_until_opt(self.proposal_request.map(|(_, at)| at)) => {
                    if let Some((round, _)) = self.proposal_request.take() {
                        warn!(%round, "proposal request timed out");
                        self.handle(Event::ProposalResponseReceived { round, proposal: None });
                    }
                }

                message = self.inbound.recv() => {
                    let Some((from, message)) = message else { return Ok(()) };
                    self.on_network(from, message);
                }

                command = self.clients.recv() => {
                    let Some(command) = command else { return Ok(()) };
                    self.on_client(command);
                }
            }
        }
    }

    fn handle(&mut self, event: Event) {
        self.machine.set_time(unix_ms());
        let actions = self.machine.handle(event);
        for action in actions {
            self.perform(action);
        }
    }

    fn on_client(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::SubmitBatch { batch, reply } => {
                let request_id = self.allocate_request();
                self.client_replies.insert(request_id, reply);
                self.handle(Event::SubmitBatch { batch, request_id });
            }
        }
    }

    fn on_network(&mut self, from: PublicKey, message: NetworkMessage) {
        let event = match message {
            NetworkMessage::Batches(BatchesRequest { batches }) => {
                Event::BatchesReceived { batches }
            }
            NetworkMessage::ProposalRequest(ProposalRequest { round }) => {
                let request_id = self.allocate_request();
                self.pending_remote.insert(request_id, from);
                Event::ProposalRequestReceived { round, request_id }
            }
            NetworkMessage::ProposalResponse(ProposalResponse { round, proposal }) => {
                match self.proposal_request {
                    Some((expected, _)) if expected == round => {
                        self.proposal_request = None;
                        Event::ProposalResponseReceived { round, proposal }
                    }
                    _ => {
                        warn!(%round, "unsolicited proposal response");
                        return;
                    }
                }
            }
            NetworkMessage::State(StateRequest { votes }) => Event::VotesReceived { votes },
            NetworkMessage::BlockRequest(BlockRequest { block_hash }) => {
                let request_id = self.allocate_request();
                self.pending_remote.insert(request_id, from);
                Event::BlockRequestReceived {
                    block_hash,
                    request_id,
                }
            }
            NetworkMessage::BlockResponse(BlockResponse { block_hash, block }) => {
                Event::BlockResponseReceived { block_hash, block }
            }
        };
        self.handle(event);
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::SendBatches { peer, batches } => {
                self.send_message(peer, NetworkMessage::Batches(BatchesRequest { batches }));
            }

            Action::RequestProposal { peer, round } => {
                self.proposal_request =
                    Some((round, Instant::now() + self.proposal_request_timeout));
                self.send_message(
                    peer,
                    NetworkMessage::ProposalRequest(ProposalRequest { round }),
                );
            }

            Action::RespondProposal {
                request_id,
                round,
                proposal,
            } => {
                if let Some(to) = self.pending_remote.remove(&request_id) {
                    self.send_message(
                        to,
                        NetworkMessage::ProposalResponse(ProposalResponse { round, proposal }),
                    );
                }
            }

            Action::SendVotes { peer, votes } => {
                self.send_message(peer, NetworkMessage::State(StateRequest { votes }));
            }

            Action::BroadcastVotes { votes } => match WsvQuery::new(self.backend.as_ref()).peers() {
                Ok(peers) => {
                    for peer in peers {
                        self.send_message(
                            peer.pubkey,
                            NetworkMessage::State(StateRequest { votes: votes.clone() }),
                        );
                    }
                }
                Err(e) => error!(%e, "cannot enumerate peers for vote broadcast"),
            },

            Action::RequestBlock { peer, block_hash } => {
                self.send_message(peer, NetworkMessage::BlockRequest(BlockRequest { block_hash }));
            }

            Action::RespondBlock {
                request_id,
                block_hash,
                block,
            } => {
                if let Some(to) = self.pending_remote.remove(&request_id) {
                    // The result cache misses for older blocks; fall back to
                    // the block store before answering empty-handed.
                    let block = match block {
                        Some(block) => Some(block),
                        None => BlockStore::new(self.backend.as_ref())
                            .get_by_hash(&block_hash)
                            .unwrap_or_default(),
                    };
                    self.send_message(
                        to,
                        NetworkMessage::BlockResponse(BlockResponse { block_hash, block }),
                    );
                }
            }

            Action::SetTimer { id: TimerId::Proposal, duration } => {
                self.proposal_deadline = Some(Instant::now() + duration);
            }

            Action::CancelTimer { id: TimerId::Proposal } => {
                self.proposal_deadline = None;
            }

            Action::EnqueueInternal { event } => {
                self.internal.push_back(event);
            }

            Action::VerifyProposal { round, proposal, prev_hash } => {
                let proposal_hash = proposal.hash();
                let block = verify_proposal(self.backend.as_ref(), &proposal, prev_hash);
                self.internal.push_back(Event::ProposalVerified {
                    round,
                    proposal_hash,
                    block,
                });
            }

            Action::ApplyBlock { block } => self.apply_block(block),

            Action::EmitCommittedBlock { block } => {
                let _ = self.committed_tx.send(block);
            }

            Action::AckBatch { request_id, accepted } => {
                if let Some(reply) = self.client_replies.remove(&request_id) {
                    let _ = reply.send(accepted);
                }
            }
        }
    }

    fn apply_block(&mut self, block: Block) {
        let round = self.machine.ordering().current_round();
        let backend = self.backend.as_ref();

        let result = (|| -> Result<(), String> {
            BlockStore::new(backend).put(&block).map_err(|e| e.to_string())?;
            let mut executor = CommandExecutor::new(backend);
            executor
                .apply_block(&block, block.height().0 != 1)
                .map_err(|e| e.to_string())?;
            executor.commit().map_err(|e| e.to_string())
        })();

        let event = match result {
            Ok(()) => match WsvQuery::new(backend).ledger_state() {
                Ok(Some(ledger_state)) => Event::BlockApplied {
                    block: Arc::new(block),
                    ledger_state,
                },
                Ok(None) => Event::BlockApplyFailed {
                    round,
                    description: "ledger state missing after apply".into(),
                },
                Err(e) => Event::BlockApplyFailed {
                    round,
                    description: e.to_string(),
                },
            },
            Err(description) => {
                error!(height = block.height().0, %description, "block apply failed");
                Event::BlockApplyFailed { round, description }
            }
        };
        self.internal.push_back(event);
    }

    fn send_message(&mut self, to: PublicKey, message: NetworkMessage) {
        if to == self.local_key {
            self.on_loopback(message);
        } else {
            self.adapter.send(to, message);
        }
    }

    /// A message addressed to ourselves becomes an inbound message without
    /// touching the wire.
    fn on_loopback(&mut self, message: NetworkMessage) {
        self.on_network(self.local_key, message);
    }

    fn allocate_request(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }
}

/// Sleep until an optional deadline; pend forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
