use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::blockchain::{Block, ChainViolation, Miner, Validator};
use crate::storage::LedgerStore;
use crate::transaction::Transaction;

/// Shared application state: the persisted ledger plus the miner and
/// validator working over it.
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub miner: Miner,
    pub validator: Validator,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, mining_attempts: u32) -> Self {
        Self {
            miner: Miner::new(store.clone(), mining_attempts),
            validator: Validator::new(store.clone()),
            store,
        }
    }
}

/* ---------- TX API Models ---------- */

/// Missing fields deserialize as empty so they are rejected with a reason
/// instead of a bare JSON error.
#[derive(Deserialize)]
pub struct NewTxRequest {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub amount: Option<Value>,
}

impl NewTxRequest {
    /// Amount as decimal text, whether it arrived as a JSON number or string.
    pub fn amount_text(&self) -> String {
        match &self.amount {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub size: usize,
    pub transactions: Vec<Transaction>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct MineResponse {
    pub mined: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

#[derive(Serialize)]
pub struct ChainResponse {
    pub length: usize,
    pub difficulty: usize,
    pub chain: Vec<Block>,
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: usize,
    pub message: &'static str,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<ChainViolation>,
}
