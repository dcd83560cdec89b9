//! Persistence boundary for blocks and transactions.

pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::blockchain::Block;
use crate::error::Result;
use crate::transaction::{NewTransaction, Transaction};

pub use sqlite::SqliteLedger;

/// Index and hash of the highest block in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub index: u64,
    pub hash: String,
}

/// Storage operations the miner, the validator and the HTTP layer rely on.
/// Implementations must make `commit_block` all-or-nothing.
pub trait LedgerStore: Send + Sync {
    /// Store a validated submission as `pending` and return it with its id.
    fn insert_transaction(
        &self,
        new: &NewTransaction,
        timestamp: DateTime<Utc>,
    ) -> Result<Transaction>;

    fn transaction(&self, id: u64) -> Result<Option<Transaction>>;

    /// All pending transactions, ascending by id.
    fn pending_transactions(&self) -> Result<Vec<Transaction>>;

    /// Highest-index block, or `None` for an empty chain.
    fn tip(&self) -> Result<Option<ChainTip>>;

    /// Every block ascending by index, each with its settled transactions,
    /// read from one consistent snapshot.
    fn chain(&self) -> Result<Vec<Block>>;

    /// Insert `block` and settle every transaction it carries, atomically.
    /// Fails with `StaleSnapshot` if any of them is no longer pending;
    /// nothing is written in that case.
    fn commit_block(&self, block: &Block) -> Result<()>;

    /// Delete a transaction that is still pending and return it.
    /// Settled transactions are rejected.
    fn withdraw_transaction(&self, id: u64) -> Result<Transaction>;
}
