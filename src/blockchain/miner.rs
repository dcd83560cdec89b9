use log::{debug, warn};
use std::sync::{Arc, Mutex};

use super::block::{BlockContent, ledger_now, meets_difficulty};
use super::{Block, DIFFICULTY, GENESIS_PREVIOUS_HASH};
use crate::error::{LedgerError, Result};
use crate::storage::LedgerStore;
use crate::transaction::TxStatus;

/// Result of one mining request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    /// A block was found and committed; its transactions are settled.
    Mined(Block),
    /// There were no pending transactions. Nothing was written.
    NothingToMine,
}

/// Perform Proof-of-Work over fixed content: starting at nonce 0, find the
/// first nonce whose hash has `difficulty` leading zeros (in hex).
pub fn search_nonce(content: &BlockContent, difficulty: usize) -> (u64, String) {
    let hasher = content.nonce_hasher();
    let mut nonce: u64 = 0;
    loop {
        let hash = hasher.hash(nonce);
        if meets_difficulty(&hash, difficulty) {
            return (nonce, hash);
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Bundles pending transactions into new blocks.
///
/// Rounds are serialized by an in-process guard. The store lock is not held
/// while searching; the commit re-checks that every snapshotted transaction
/// is still pending and the round starts over if one was withdrawn meanwhile.
pub struct Miner {
    store: Arc<dyn LedgerStore>,
    round: Mutex<()>,
    max_attempts: u32,
    difficulty: usize,
}

impl Miner {
    pub fn new(store: Arc<dyn LedgerStore>, max_attempts: u32) -> Self {
        Self {
            store,
            round: Mutex::new(()),
            max_attempts: max_attempts.max(1),
            difficulty: DIFFICULTY,
        }
    }

    pub fn mine(&self) -> Result<MineOutcome> {
        let _round = self.round.lock().map_err(|_| LedgerError::LockPoisoned)?;

        for attempt in 1..=self.max_attempts {
            let content = match self.snapshot()? {
                Some(content) => content,
                None => return Ok(MineOutcome::NothingToMine),
            };
            debug!(
                "MINER - round {} for block #{} over {} txs",
                attempt,
                content.index,
                content.transactions.len()
            );

            let (nonce, hash) = search_nonce(&content, self.difficulty);
            let mut block = content.seal(nonce, hash);

            match self.store.commit_block(&block) {
                Ok(()) => {
                    for tx in &mut block.transactions {
                        tx.status = TxStatus::Settled;
                        tx.block_index = Some(block.index);
                    }
                    return Ok(MineOutcome::Mined(block));
                }
                Err(LedgerError::StaleSnapshot(id)) => {
                    warn!(
                        "MINER - tx {} left the pending set during round {}; re-snapshotting",
                        id, attempt
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::ContentionExhausted(self.max_attempts))
    }

    /// Fix the transactions, index, timestamp and previous hash for one round.
    fn snapshot(&self) -> Result<Option<BlockContent>> {
        let pending = self.store.pending_transactions()?;
        if pending.is_empty() {
            return Ok(None);
        }
        let (index, previous_hash) = match self.store.tip()? {
            Some(tip) => (tip.index + 1, tip.hash),
            None => (1, GENESIS_PREVIOUS_HASH.to_string()),
        };
        Ok(Some(BlockContent::new(
            index,
            ledger_now(),
            previous_hash,
            pending,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::tests::tx;
    use crate::storage::{ChainTip, SqliteLedger};
    use crate::transaction::{NewTransaction, Transaction};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ledger() -> Arc<SqliteLedger> {
        Arc::new(SqliteLedger::open_in_memory().unwrap())
    }

    fn submit(store: &SqliteLedger, sender: &str, receiver: &str, amount: &str) -> Transaction {
        let new = NewTransaction::new(sender, receiver, amount).unwrap();
        store.insert_transaction(&new, ledger_now()).unwrap()
    }

    fn mined(outcome: MineOutcome) -> Block {
        match outcome {
            MineOutcome::Mined(block) => block,
            MineOutcome::NothingToMine => panic!("expected a block"),
        }
    }

    #[test]
    fn search_finds_first_matching_nonce() {
        let content = BlockContent::new(1, ledger_now(), "0".into(), vec![tx(1, "Alice", "Bob", 1000)]);
        let (nonce, hash) = search_nonce(&content, 2);
        assert!(hash.starts_with("00"));
        assert_eq!(hash, content.hash_with_nonce(nonce));
        for earlier in 0..nonce {
            assert!(!content.hash_with_nonce(earlier).starts_with("00"));
        }
    }

    #[test]
    fn nothing_to_mine_writes_nothing() {
        let store = ledger();
        let miner = Miner::new(store.clone(), 3);
        assert_eq!(miner.mine().unwrap(), MineOutcome::NothingToMine);
        assert!(store.tip().unwrap().is_none());
    }

    #[test]
    fn first_block_settles_all_pending() {
        let store = ledger();
        let a = submit(&store, "Alice", "Bob", "10.00");
        let b = submit(&store, "Bob", "Carol", "5.00");
        let miner = Miner::new(store.clone(), 3);

        let block = mined(miner.mine().unwrap());
        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, "0");
        assert!(block.current_hash.starts_with("00"));
        assert_eq!(block.compute_hash(), block.current_hash);
        assert_eq!(block.transaction_ids(), vec![a.id, b.id]);
        assert!(block
            .transactions
            .iter()
            .all(|t| t.status == TxStatus::Settled && t.block_index == Some(1)));

        assert!(store.pending_transactions().unwrap().is_empty());
        assert_eq!(store.chain().unwrap(), vec![block]);
    }

    #[test]
    fn blocks_link_to_the_tip() {
        let store = ledger();
        let miner = Miner::new(store.clone(), 3);
        submit(&store, "Alice", "Bob", "1");
        let first = mined(miner.mine().unwrap());
        submit(&store, "Bob", "Alice", "2");
        let second = mined(miner.mine().unwrap());

        assert_eq!(second.index, 2);
        assert_eq!(second.previous_hash, first.current_hash);
        assert_eq!(second.transactions.len(), 1);
    }

    /// Store wrapper that injects events between snapshot and commit.
    struct Interleaving {
        inner: Arc<SqliteLedger>,
        on_first_commit: Box<dyn Fn(&SqliteLedger) + Send + Sync>,
        fired: AtomicBool,
    }

    impl LedgerStore for Interleaving {
        fn insert_transaction(&self, new: &NewTransaction, ts: DateTime<Utc>) -> Result<Transaction> {
            self.inner.insert_transaction(new, ts)
        }
        fn transaction(&self, id: u64) -> Result<Option<Transaction>> {
            self.inner.transaction(id)
        }
        fn pending_transactions(&self) -> Result<Vec<Transaction>> {
            self.inner.pending_transactions()
        }
        fn tip(&self) -> Result<Option<ChainTip>> {
            self.inner.tip()
        }
        fn chain(&self) -> Result<Vec<Block>> {
            self.inner.chain()
        }
        fn commit_block(&self, block: &Block) -> Result<()> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                (self.on_first_commit)(&self.inner);
            }
            self.inner.commit_block(block)
        }
        fn withdraw_transaction(&self, id: u64) -> Result<Transaction> {
            self.inner.withdraw_transaction(id)
        }
    }

    #[test]
    fn late_submission_stays_pending() {
        let inner = ledger();
        let a = submit(&inner, "Alice", "Bob", "10.00");
        let store = Arc::new(Interleaving {
            inner: inner.clone(),
            on_first_commit: Box::new(|s: &SqliteLedger| {
                submit(s, "Carol", "Dave", "1.00");
            }),
            fired: AtomicBool::new(false),
        });
        let miner = Miner::new(store, 3);

        let block = mined(miner.mine().unwrap());
        assert_eq!(block.transaction_ids(), vec![a.id]);

        let pending = inner.pending_transactions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sender, "Carol");
        assert_eq!(pending[0].block_index, None);
    }

    #[test]
    fn withdrawal_mid_search_triggers_resnapshot() {
        let inner = ledger();
        let a = submit(&inner, "Alice", "Bob", "1");
        let b = submit(&inner, "Bob", "Carol", "2");
        let b_id = b.id;
        let store = Arc::new(Interleaving {
            inner: inner.clone(),
            on_first_commit: Box::new(move |s: &SqliteLedger| {
                s.withdraw_transaction(b_id).unwrap();
            }),
            fired: AtomicBool::new(false),
        });
        let miner = Miner::new(store, 3);

        let block = mined(miner.mine().unwrap());
        assert_eq!(block.index, 1);
        assert_eq!(block.transaction_ids(), vec![a.id]);
        assert_eq!(block.compute_hash(), block.current_hash);
        assert!(inner.transaction(b.id).unwrap().is_none());
    }

    #[test]
    fn withdrawing_everything_mid_search_is_a_noop() {
        let inner = ledger();
        let a = submit(&inner, "Alice", "Bob", "1");
        let a_id = a.id;
        let store = Arc::new(Interleaving {
            inner: inner.clone(),
            on_first_commit: Box::new(move |s: &SqliteLedger| {
                s.withdraw_transaction(a_id).unwrap();
            }),
            fired: AtomicBool::new(false),
        });
        let miner = Miner::new(store, 3);

        assert_eq!(miner.mine().unwrap(), MineOutcome::NothingToMine);
        assert!(inner.tip().unwrap().is_none());
    }
}
