use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::block::meets_difficulty;
use super::{Block, DIFFICULTY, GENESIS_PREVIOUS_HASH};
use crate::error::Result;
use crate::storage::LedgerStore;

/// Which chain invariant a block broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    /// First block does not point at the genesis sentinel.
    Genesis,
    /// `previous_hash` differs from the prior block's `current_hash`.
    Linkage,
    /// Stored hash differs from the hash of the stored content.
    Integrity,
    /// Stored hash does not meet the Proof-of-Work difficulty.
    Difficulty,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::Genesis => "genesis",
            ViolationKind::Linkage => "linkage",
            ViolationKind::Integrity => "integrity",
            ViolationKind::Difficulty => "difficulty",
        }
    }
}

/// The first failure found in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainViolation {
    pub kind: ViolationKind,
    /// Index of the offending block.
    pub index: u64,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::Genesis => write!(
                f,
                "block #{} is not anchored at genesis (previous_hash {:?}, expected {:?})",
                self.index, self.actual, self.expected
            ),
            ViolationKind::Linkage => write!(
                f,
                "block #{} linkage broken (previous_hash {}, expected {})",
                self.index, self.actual, self.expected
            ),
            ViolationKind::Integrity => write!(
                f,
                "block #{} hash mismatch, possible tampering (stored {}, recomputed {})",
                self.index, self.actual, self.expected
            ),
            ViolationKind::Difficulty => write!(
                f,
                "block #{} hash {} does not have {} leading zeros",
                self.index, self.actual, self.expected
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReport {
    Valid { length: usize },
    Invalid { length: usize, violation: ChainViolation },
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationReport::Valid { .. })
    }

    pub fn length(&self) -> usize {
        match self {
            ValidationReport::Valid { length } | ValidationReport::Invalid { length, .. } => *length,
        }
    }

    pub fn violation(&self) -> Option<&ChainViolation> {
        match self {
            ValidationReport::Valid { .. } => None,
            ValidationReport::Invalid { violation, .. } => Some(violation),
        }
    }

    /// Human-readable reason for the verdict.
    pub fn reason(&self) -> String {
        match self {
            ValidationReport::Valid { length: 0 } => "chain is empty".to_string(),
            ValidationReport::Valid { length } => format!("all {length} blocks verified"),
            ValidationReport::Invalid { violation, .. } => violation.to_string(),
        }
    }
}

/// Replay `chain` (ascending by index) and report the first broken invariant.
///
/// Every block is checked, including the first: genesis anchor (first block
/// only), linkage to the previous block, hash recomputation, difficulty.
pub fn validate_chain(chain: &[Block], difficulty: usize) -> ValidationReport {
    let length = chain.len();
    let invalid = |violation: ChainViolation| ValidationReport::Invalid { length, violation };

    for (pos, block) in chain.iter().enumerate() {
        let expected_previous = match pos {
            0 => GENESIS_PREVIOUS_HASH,
            _ => chain[pos - 1].current_hash.as_str(),
        };
        if block.previous_hash != expected_previous {
            return invalid(ChainViolation {
                kind: if pos == 0 {
                    ViolationKind::Genesis
                } else {
                    ViolationKind::Linkage
                },
                index: block.index,
                expected: expected_previous.to_string(),
                actual: block.previous_hash.clone(),
            });
        }

        let recomputed = block.compute_hash();
        if recomputed != block.current_hash {
            return invalid(ChainViolation {
                kind: ViolationKind::Integrity,
                index: block.index,
                expected: recomputed,
                actual: block.current_hash.clone(),
            });
        }

        if !meets_difficulty(&block.current_hash, difficulty) {
            return invalid(ChainViolation {
                kind: ViolationKind::Difficulty,
                index: block.index,
                expected: difficulty.to_string(),
                actual: block.current_hash.clone(),
            });
        }
    }

    ValidationReport::Valid { length }
}

/// Audits the persisted chain. Read-only.
pub struct Validator {
    store: Arc<dyn LedgerStore>,
}

impl Validator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn validate(&self) -> Result<ValidationReport> {
        let chain = self.store.chain()?;
        Ok(validate_chain(&chain, DIFFICULTY))
    }
}
