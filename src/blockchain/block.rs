use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::transaction::Transaction;

/// Current UTC time truncated to the millisecond precision the hash
/// encoding uses, so stored and hashed timestamps always agree.
pub fn ledger_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Canonical timestamp text: RFC 3339, UTC, milliseconds, `Z` suffix.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns true when the first `difficulty` hex characters are all `0`.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

// Field order of these two structs is the wire contract of the hash
// encoding (version 1). Do not reorder.
#[derive(Serialize)]
struct CanonicalTx<'a> {
    id: u64,
    sender: &'a str,
    receiver: &'a str,
    amount: String,
    timestamp: String,
}

#[derive(Serialize)]
struct CanonicalBlock<'a> {
    index: u64,
    timestamp: String,
    previous_hash: &'a str,
    transactions: Vec<CanonicalTx<'a>>,
    nonce: u64,
}

/// Serialize block content into the canonical byte string that gets hashed.
/// Transactions are always ordered by ascending id.
pub fn canonical_bytes(
    index: u64,
    timestamp: &DateTime<Utc>,
    previous_hash: &str,
    transactions: &[Transaction],
    nonce: u64,
) -> Vec<u8> {
    let mut txs: Vec<&Transaction> = transactions.iter().collect();
    txs.sort_by_key(|t| t.id);

    let content = CanonicalBlock {
        index,
        timestamp: canonical_timestamp(timestamp),
        previous_hash,
        transactions: txs
            .into_iter()
            .map(|t| CanonicalTx {
                id: t.id,
                sender: &t.sender,
                receiver: &t.receiver,
                amount: t.amount.to_string(),
                timestamp: canonical_timestamp(&t.timestamp),
            })
            .collect(),
        nonce,
    };
    serde_json::to_vec(&content).expect("canonical block content is always serializable")
}

/// SHA-256 of the canonical encoding, lowercase hex.
pub fn canonical_hash(
    index: u64,
    timestamp: &DateTime<Utc>,
    previous_hash: &str,
    transactions: &[Transaction],
    nonce: u64,
) -> String {
    let bytes = canonical_bytes(index, timestamp, previous_hash, transactions, nonce);
    hex::encode(Sha256::digest(&bytes))
}

/// A block in the ledger together with the transactions it settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// 1-based position in the chain.
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub current_hash: String,
    pub nonce: u64,
    /// Settled transactions, ascending by id.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Recompute the hash of this block from its stored fields.
    pub fn compute_hash(&self) -> String {
        canonical_hash(
            self.index,
            &self.timestamp,
            &self.previous_hash,
            &self.transactions,
            self.nonce,
        )
    }

    pub fn transaction_ids(&self) -> Vec<u64> {
        self.transactions.iter().map(|t| t.id).collect()
    }
}

/// Everything that is fixed for the duration of one nonce search.
#[derive(Debug, Clone)]
pub struct BlockContent {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
}

impl BlockContent {
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        previous_hash: String,
        mut transactions: Vec<Transaction>,
    ) -> Self {
        transactions.sort_by_key(|t| t.id);
        Self {
            index,
            timestamp,
            previous_hash,
            transactions,
        }
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        canonical_hash(
            self.index,
            &self.timestamp,
            &self.previous_hash,
            &self.transactions,
            nonce,
        )
    }

    /// Hasher with the nonce-independent prefix already absorbed.
    pub fn nonce_hasher(&self) -> NonceHasher {
        // The nonce is the last field, so the encoding for nonce 0 ends in `0}`.
        let template = canonical_bytes(
            self.index,
            &self.timestamp,
            &self.previous_hash,
            &self.transactions,
            0,
        );
        let prefix = &template[..template.len() - 2];
        NonceHasher {
            prefix: Sha256::new_with_prefix(prefix),
        }
    }

    /// Turn the content into a block once a nonce has been accepted.
    pub fn seal(self, nonce: u64, current_hash: String) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: self.previous_hash,
            current_hash,
            nonce,
            transactions: self.transactions,
        }
    }
}

/// Produces the same digest as [`canonical_hash`] without re-serializing
/// the block for every nonce.
#[derive(Clone)]
pub struct NonceHasher {
    prefix: Sha256,
}

impl NonceHasher {
    pub fn hash(&self, nonce: u64) -> String {
        let mut hasher = self.prefix.clone();
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(b"}");
        hex::encode(hasher.finalize())
    }
}
