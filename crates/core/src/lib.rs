//! Core event model for the ledger node.
//!
//! This crate provides the skeleton of the node architecture:
//!
//! - [`Event`]: all possible inputs to the state machine
//! - [`Action`]: all possible outputs from the state machine
//! - [`EventPriority`]: ordering priority for events at the same timestamp
//! - [`StateMachine`]: the trait the composed node implements
//!
//! # Architecture
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! The state machine is:
//! - **Synchronous**: no async, no .await
//! - **Deterministic**: same state + event = same actions
//! - **Pure-ish**: mutates self, but performs no I/O
//!
//! All I/O is handled by the runner, which delivers events, executes the
//! returned actions, and converts action results back into events. The
//! executor, ordering, and consensus subsystems each expose `on_*` handlers
//! returning `Vec<Action>`; the node composes them behind [`StateMachine`].

mod action;
mod event;
mod traits;

pub use action::Action;
pub use event::{Event, EventPriority};
pub use traits::StateMachine;

/// Correlates a request event with its response action (RPC bookkeeping kept
/// by the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Timers a state machine can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Bounds the wait for the current round's proposal.
    Proposal,
}
