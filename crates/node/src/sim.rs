//! Deterministic in-process cluster.
//!
//! Drives several [`NodeStateMachine`]s against in-memory storage with
//! synchronous, loss-free message delivery. No I/O, no threads, no real
//! clock: the same inputs produce the same committed chain on every run.
//! Used by the integration tests; production I/O lives in [`crate::runner`].

use crate::config::NodeConfig;
use crate::state::NodeStateMachine;
use ledger_core::{Action, Event, RequestId, StateMachine, TimerId};
use ledger_types::{
    AccountId, Batch, Block, BlockHeight, BlockPayload, Command, DomainId, Hash, KeyPair,
    LedgerState, PeerRecord, PublicKey, RoleName, RolePermission, Transaction,
    TransactionPayload,
};
use ledger_wsv::{
    verify_proposal, BlockStore, CommandExecutor, MemoryBackend, WsvQuery,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::warn;

/// Who is waiting on a pending request.
enum Pending {
    Proposal { requester: usize },
    Block { requester: usize },
}

/// One simulated node: state machine, storage, queues.
pub struct SimNode {
    machine: NodeStateMachine,
    backend: MemoryBackend,
    internal: VecDeque<Event>,
    external: VecDeque<Event>,
    /// Absolute fire times of armed timers.
    timers: HashMap<TimerId, u64>,
    /// Blocks emitted for external observers, in commit order.
    pub committed: Vec<Block>,
}

impl SimNode {
    pub fn machine(&self) -> &NodeStateMachine {
        &self.machine
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    fn pop_event(&mut self) -> Option<Event> {
        self.internal.pop_front().or_else(|| self.external.pop_front())
    }

    fn has_events(&self) -> bool {
        !self.internal.is_empty() || !self.external.is_empty()
    }
}

/// Synchronous multi-node simulation.
pub struct SimCluster {
    nodes: Vec<SimNode>,
    by_key: HashMap<PublicKey, usize>,
    now_ms: u64,
    next_request: u64,
    pending: HashMap<RequestId, Pending>,
    /// (request id, accepted) acknowledgements for submitted batches.
    pub acks: Vec<(RequestId, bool)>,
}

impl SimCluster {
    /// Build an `n`-node cluster with a shared genesis block: an all-powerful
    /// `admin@test` account, a `user` default role, the `coin#test` asset
    /// (precision 2), and one peer entry per node.
    pub fn new(n: usize, config: NodeConfig) -> Self {
        let keypairs: Vec<KeyPair> = (0..n).map(|i| KeyPair::from_seed(&[i as u8; 32])).collect();
        let peers: Vec<PeerRecord> = keypairs
            .iter()
            .enumerate()
            .map(|(i, kp)| PeerRecord {
                pubkey: kp.public_key(),
                address: format!("127.0.0.1:{}", 10000 + i),
                tls_certificate: None,
            })
            .collect();
        let genesis = genesis_block(&keypairs[0], &peers);

        let mut cluster = Self {
            nodes: Vec::with_capacity(n),
            by_key: HashMap::new(),
            now_ms: 0,
            next_request: 1 << 32,
            pending: HashMap::new(),
            acks: Vec::new(),
        };

        for (i, keypair) in keypairs.into_iter().enumerate() {
            let backend = MemoryBackend::new();
            BlockStore::new(&backend).put(&genesis).expect("genesis stores");
            let mut executor = CommandExecutor::new(&backend);
            executor.apply_block(&genesis, false).expect("genesis applies");
            executor.commit().expect("genesis commits");

            cluster.by_key.insert(keypair.public_key(), i);
            cluster.nodes.push(SimNode {
                machine: NodeStateMachine::new(keypair, config.clone()),
                backend,
                internal: VecDeque::new(),
                external: VecDeque::new(),
                timers: HashMap::new(),
                committed: Vec::new(),
            });
        }

        for i in 0..cluster.nodes.len() {
            let ledger_state = cluster.ledger_state(i);
            let actions = {
                let node = &mut cluster.nodes[i];
                node.machine.set_time(cluster.now_ms);
                node.machine.initialize(&genesis, ledger_state)
            };
            for action in actions {
                cluster.perform(i, action);
            }
        }
        cluster
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, i: usize) -> &SimNode {
        &self.nodes[i]
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Committed chain height of one node.
    pub fn committed_height(&self, i: usize) -> u64 {
        BlockStore::new(&self.nodes[i].backend)
            .top_height()
            .expect("in-memory store")
            .0
    }

    /// Submit a client batch to one node.
    pub fn submit(&mut self, node: usize, batch: Batch) {
        let request_id = self.allocate_request();
        self.nodes[node].external.push_back(Event::SubmitBatch { batch, request_id });
    }

    /// Process queued events until all queues drain or `max_steps` is hit.
    /// Returns the number of events processed.
    pub fn run_steps(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps {
            let Some(i) = self.next_busy_node() else { break };
            let event = self.nodes[i].pop_event().expect("busy node has an event");
            self.dispatch(i, event);
            steps += 1;
        }
        steps
    }

    /// Run until the predicate holds, firing due timers and nudging the
    /// clock forward whenever the cluster goes quiet. Returns whether the
    /// predicate was reached within the step budget.
    pub fn run_until(&mut self, mut done: impl FnMut(&SimCluster) -> bool, max_steps: usize) -> bool {
        let mut budget = max_steps;
        loop {
            if done(self) {
                return true;
            }
            if budget == 0 {
                return false;
            }
            let consumed = self.run_steps(budget.min(64));
            budget -= consumed.min(budget);
            if consumed == 0 {
                // Idle: advance to the next timer deadline.
                if !self.fire_next_timer() {
                    return done(self);
                }
            }
        }
    }

    /// Advance the clock, firing any timers that come due.
    pub fn advance_time(&mut self, ms: u64) {
        self.now_ms += ms;
        let now = self.now_ms;
        for node in &mut self.nodes {
            let due: Vec<TimerId> = node
                .timers
                .iter()
                .filter(|(_, &at)| at <= now)
                .map(|(&id, _)| id)
                .collect();
            for id in due {
                node.timers.remove(&id);
                node.external.push_back(match id {
                    TimerId::Proposal => Event::ProposalTimer,
                });
            }
        }
    }

    fn fire_next_timer(&mut self) -> bool {
        let next = self
            .nodes
            .iter()
            .flat_map(|node| node.timers.values().copied())
            .min();
        match next {
            Some(at) => {
                self.advance_time(at.saturating_sub(self.now_ms).max(1));
                true
            }
            None => false,
        }
    }

    fn next_busy_node(&self) -> Option<usize> {
        // Internal events across the cluster drain before external ones.
        if let Some(i) = self.nodes.iter().position(|n| !n.internal.is_empty()) {
            return Some(i);
        }
        self.nodes.iter().position(|n| n.has_events())
    }

    fn dispatch(&mut self, i: usize, event: Event) {
        let actions = {
            let node = &mut self.nodes[i];
            node.machine.set_time(self.now_ms);
            node.machine.handle(event)
        };
        for action in actions {
            self.perform(i, action);
        }
    }

    fn perform(&mut self, i: usize, action: Action) {
        match action {
            Action::SendBatches { peer, batches } => {
                self.deliver(peer, Event::BatchesReceived { batches });
            }

            Action::RequestProposal { peer, round } => {
                let request_id = self.allocate_request();
                self.pending.insert(request_id, Pending::Proposal { requester: i });
                self.deliver(peer, Event::ProposalRequestReceived { round, request_id });
            }

            Action::RespondProposal { request_id, round, proposal } => {
                match self.pending.remove(&request_id) {
                    Some(Pending::Proposal { requester }) => {
                        self.nodes[requester]
                            .external
                            .push_back(Event::ProposalResponseReceived { round, proposal });
                    }
                    _ => warn!("response to unknown proposal request"),
                }
            }

            Action::SendVotes { peer, votes } => {
                self.deliver(peer, Event::VotesReceived { votes });
            }

            Action::BroadcastVotes { votes } => {
                for node in &mut self.nodes {
                    node.external
                        .push_back(Event::VotesReceived { votes: votes.clone() });
                }
            }

            Action::RequestBlock { peer, block_hash } => {
                let request_id = self.allocate_request();
                self.pending.insert(request_id, Pending::Block { requester: i });
                self.deliver(peer, Event::BlockRequestReceived { block_hash, request_id });
            }

            Action::RespondBlock { request_id, block_hash, block } => {
                match self.pending.remove(&request_id) {
                    Some(Pending::Block { requester }) => {
                        self.nodes[requester]
                            .external
                            .push_back(Event::BlockResponseReceived { block_hash, block });
                    }
                    _ => warn!("response to unknown block request"),
                }
            }

            Action::SetTimer { id, duration } => {
                self.nodes[i].timers.insert(id, self.now_ms + duration.as_millis() as u64);
            }

            Action::CancelTimer { id } => {
                self.nodes[i].timers.remove(&id);
            }

            Action::EnqueueInternal { event } => {
                self.nodes[i].internal.push_back(event);
            }

            Action::VerifyProposal { round, proposal, prev_hash } => {
                let proposal_hash = proposal.hash();
                let block = verify_proposal(&self.nodes[i].backend, &proposal, prev_hash);
                self.nodes[i].internal.push_back(Event::ProposalVerified {
                    round,
                    proposal_hash,
                    block,
                });
            }

            Action::ApplyBlock { block } => self.apply_block(i, block),

            Action::EmitCommittedBlock { block } => {
                self.nodes[i].committed.push(block);
            }

            Action::AckBatch { request_id, accepted } => {
                self.acks.push((request_id, accepted));
            }
        }
    }

    fn apply_block(&mut self, i: usize, block: Block) {
        let round = self.nodes[i].machine.current_round();
        let backend = &self.nodes[i].backend;

        let result = (|| -> Result<(), String> {
            BlockStore::new(backend).put(&block).map_err(|e| e.to_string())?;
            let mut executor = CommandExecutor::new(backend);
            executor
                .apply_block(&block, block.height().0 != 1)
                .map_err(|e| e.to_string())?;
            executor.commit().map_err(|e| e.to_string())
        })();

        let event = match result {
            Ok(()) => {
                let ledger_state = self.ledger_state(i);
                Event::BlockApplied {
                    block: Arc::new(block),
                    ledger_state,
                }
            }
            Err(description) => Event::BlockApplyFailed { round, description },
        };
        self.nodes[i].internal.push_back(event);
    }

    fn ledger_state(&self, i: usize) -> LedgerState {
        WsvQuery::new(&self.nodes[i].backend)
            .ledger_state()
            .expect("in-memory store")
            .expect("genesis applied")
    }

    fn deliver(&mut self, peer: PublicKey, event: Event) {
        match self.by_key.get(&peer) {
            Some(&target) => self.nodes[target].external.push_back(event),
            None => warn!(%peer, "message to unknown peer dropped"),
        }
    }

    fn allocate_request(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }
}

/// The genesis block shared by every simulated node.
fn genesis_block(admin_key: &KeyPair, peers: &[PeerRecord]) -> Block {
    let mut commands = vec![
        Command::CreateRole {
            role_name: RoleName::new("admin"),
            permissions: vec![RolePermission::Root],
        },
        Command::CreateRole {
            role_name: RoleName::new("user"),
            permissions: vec![
                RolePermission::Receive,
                RolePermission::Transfer,
                RolePermission::AddSignatory,
                RolePermission::RemoveSignatory,
                RolePermission::SetQuorum,
                RolePermission::SetDetail,
            ],
        },
        Command::CreateDomain {
            domain_id: DomainId::new("test"),
            default_role: RoleName::new("user"),
        },
        Command::CreateAccount {
            account_name: "admin".into(),
            domain_id: DomainId::new("test"),
            pubkey: admin_key.public_key(),
        },
        Command::AppendRole {
            account_id: AccountId::new("admin", "test"),
            role_name: RoleName::new("admin"),
        },
        Command::CreateAsset {
            asset_name: "coin".into(),
            domain_id: DomainId::new("test"),
            precision: 2,
        },
    ];
    commands.extend(peers.iter().map(|peer| Command::AddPeer { peer: peer.clone() }));

    Block::new(BlockPayload {
        height: BlockHeight(1),
        prev_hash: Hash::ZERO,
        created_ms: 0,
        transactions: vec![Transaction::new(TransactionPayload {
            creator_account_id: None,
            commands,
            quorum: 1,
            created_ms: 0,
        })],
        rejected_hashes: vec![],
    })
}
