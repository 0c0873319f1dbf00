//! World State View: the materialized state derived from applying all
//! committed blocks.
//!
//! The WSV lives in an ordered key-value store ([`storage`]) accessed through
//! a savepointed transactional cursor ([`cursor`]). The [`executor`] applies
//! commands to it, enforcing role- and grant-based permissions; [`restore`]
//! rebuilds it from the [`block_store`] by deterministic replay; [`queries`]
//! expose committed reads.
//!
//! One executor holds the cursor at a time; commands within a transaction
//! apply in order under one savepoint, transactions within a block in block
//! order, and a block commits as a single atomic write batch.

pub mod block_store;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod keys;
pub mod queries;
pub mod restore;
pub mod storage;
pub mod validation;

pub use block_store::BlockStore;
pub use cursor::{Cursor, ExistencePolicy, KvError};
pub use error::{CommandError, ErrorCode, StorageError, TransactionError};
pub use executor::CommandExecutor;
pub use queries::WsvQuery;
pub use restore::{restore_wsv, wsv_height, BlockValidator, ChainValidator, RestoreError};
pub use storage::{KvBackend, MemoryBackend, RocksBackend, ScanControl, WriteOp};
pub use validation::verify_proposal;
