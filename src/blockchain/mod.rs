pub mod block;
pub mod miner;
pub mod validator;

pub use block::Block;
pub use miner::{MineOutcome, Miner};
pub use validator::{ChainViolation, ValidationReport, Validator, ViolationKind};

/// Proof-of-Work difficulty: leading `0` hex characters required in a block hash.
pub const DIFFICULTY: usize = 2;

/// `previous_hash` of the first block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Version of the canonical block encoding fed to SHA-256.
/// Any change to field order or formatting must bump this.
pub const HASH_FORMAT_VERSION: u32 = 1;

/// Default number of optimistic commit attempts per mining request.
pub const DEFAULT_MINING_ATTEMPTS: u32 = 3;
