use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{ChainTip, LedgerStore};
use crate::blockchain::Block;
use crate::error::{LedgerError, Rejection, Result};
use crate::transaction::{Amount, NewTransaction, Transaction, TxStatus};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS blocks (
        index_no      INTEGER PRIMARY KEY,
        previous_hash TEXT    NOT NULL,
        current_hash  TEXT    NOT NULL,
        nonce         INTEGER NOT NULL,
        timestamp_ms  INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS transactions (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        sender       TEXT    NOT NULL,
        receiver     TEXT    NOT NULL,
        amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
        timestamp_ms INTEGER NOT NULL,
        status       TEXT    NOT NULL CHECK (status IN ('pending', 'settled')),
        block_index  INTEGER REFERENCES blocks(index_no),
        CHECK (sender <> receiver)
    );

    CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status, id);
    CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions(block_index, id);

    CREATE TRIGGER IF NOT EXISTS settled_transactions_are_final
    BEFORE DELETE ON transactions WHEN OLD.status = 'settled'
    BEGIN
        SELECT RAISE(ABORT, 'settled transactions cannot be deleted');
    END;
";

const TX_COLUMNS: &str =
    "id, sender, receiver, amount_cents, timestamp_ms, status, block_index";

/// SQLite-backed ledger. One connection guarded by a mutex; every
/// multi-statement write runs inside a SQLite transaction that rolls back
/// when dropped without commit.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger at `path`. `:memory:` gives a private
    /// in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    /// Run raw SQL against the store. Tests use it to forge tampered rows.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<usize> {
        Ok(self.lock()?.execute(sql, [])?)
    }
}

/// Raw transaction row, decoded outside the rusqlite row callback so that
/// bad values surface as `LedgerError::Corrupt`.
struct TxRow {
    id: u64,
    sender: String,
    receiver: String,
    amount_cents: u64,
    timestamp_ms: i64,
    status: String,
    block_index: Option<u64>,
}

impl TxRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender: row.get(1)?,
            receiver: row.get(2)?,
            amount_cents: row.get(3)?,
            timestamp_ms: row.get(4)?,
            status: row.get(5)?,
            block_index: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Transaction> {
        let amount = Amount::from_cents(self.amount_cents)
            .map_err(|e| LedgerError::Corrupt(format!("transaction {}: {e}", self.id)))?;
        let status: TxStatus = self
            .status
            .parse()
            .map_err(|e| LedgerError::Corrupt(format!("transaction {}: {e}", self.id)))?;
        Ok(Transaction {
            id: self.id,
            sender: self.sender,
            receiver: self.receiver,
            amount,
            timestamp: from_millis(self.timestamp_ms)?,
            status,
            block_index: self.block_index,
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| LedgerError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn query_transactions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, TxRow::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.decode()?);
    }
    Ok(out)
}

fn find_transaction(conn: &Connection, id: u64) -> Result<Option<Transaction>> {
    let row = conn
        .query_row(
            &format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?1"),
            params![id],
            TxRow::from_row,
        )
        .optional()?;
    row.map(TxRow::decode).transpose()
}

impl LedgerStore for SqliteLedger {
    fn insert_transaction(
        &self,
        new: &NewTransaction,
        timestamp: DateTime<Utc>,
    ) -> Result<Transaction> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transactions (sender, receiver, amount_cents, timestamp_ms, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.sender,
                new.receiver,
                new.amount.cents(),
                timestamp.timestamp_millis(),
                TxStatus::Pending.as_str()
            ],
        )?;
        let id = conn.last_insert_rowid();
        find_transaction(&conn, id as u64)?
            .ok_or_else(|| LedgerError::Corrupt(format!("transaction {id} vanished after insert")))
    }

    fn transaction(&self, id: u64) -> Result<Option<Transaction>> {
        let conn = self.lock()?;
        find_transaction(&conn, id)
    }

    fn pending_transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.lock()?;
        query_transactions(
            &conn,
            &format!(
                "SELECT {TX_COLUMNS} FROM transactions
                 WHERE status = 'pending' AND block_index IS NULL ORDER BY id"
            ),
            [],
        )
    }

    fn tip(&self) -> Result<Option<ChainTip>> {
        let conn = self.lock()?;
        let tip = conn
            .query_row(
                "SELECT index_no, current_hash FROM blocks ORDER BY index_no DESC LIMIT 1",
                [],
                |row| {
                    Ok(ChainTip {
                        index: row.get(0)?,
                        hash: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(tip)
    }

    fn chain(&self) -> Result<Vec<Block>> {
        let mut conn = self.lock()?;
        let db_tx = conn.transaction()?;

        let mut by_block: HashMap<u64, Vec<Transaction>> = HashMap::new();
        for tx in query_transactions(
            &db_tx,
            &format!(
                "SELECT {TX_COLUMNS} FROM transactions
                 WHERE status = 'settled' AND block_index IS NOT NULL
                 ORDER BY block_index, id"
            ),
            [],
        )? {
            if let Some(index) = tx.block_index {
                by_block.entry(index).or_default().push(tx);
            }
        }

        let raw_blocks = {
            let mut stmt = db_tx.prepare(
                "SELECT index_no, previous_hash, current_hash, nonce, timestamp_ms
                 FROM blocks ORDER BY index_no",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        db_tx.commit()?;

        raw_blocks
            .into_iter()
            .map(|(index, previous_hash, current_hash, nonce, ts_ms)| {
                Ok(Block {
                    index,
                    timestamp: from_millis(ts_ms)?,
                    previous_hash,
                    current_hash,
                    nonce,
                    transactions: by_block.remove(&index).unwrap_or_default(),
                })
            })
            .collect()
    }

    fn commit_block(&self, block: &Block) -> Result<()> {
        let mut conn = self.lock()?;
        let db_tx = conn.transaction()?;

        db_tx.execute(
            "INSERT INTO blocks (index_no, previous_hash, current_hash, nonce, timestamp_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                block.index,
                block.previous_hash,
                block.current_hash,
                block.nonce,
                block.timestamp.timestamp_millis()
            ],
        )?;

        {
            let mut settle = db_tx.prepare(
                "UPDATE transactions SET status = 'settled', block_index = ?1
                 WHERE id = ?2 AND status = 'pending' AND block_index IS NULL",
            )?;
            for tx in &block.transactions {
                if settle.execute(params![block.index, tx.id])? != 1 {
                    // dropping db_tx rolls back the block insert
                    return Err(LedgerError::StaleSnapshot(tx.id));
                }
            }
        }

        db_tx.commit()?;
        Ok(())
    }

    fn withdraw_transaction(&self, id: u64) -> Result<Transaction> {
        let mut conn = self.lock()?;
        let db_tx = conn.transaction()?;

        let existing = find_transaction(&db_tx, id)?.ok_or(LedgerError::TransactionNotFound(id))?;
        if !existing.is_pending() || existing.block_index.is_some() {
            return Err(Rejection::AlreadySettled(id).into());
        }
        db_tx.execute(
            "DELETE FROM transactions WHERE id = ?1 AND status = 'pending' AND block_index IS NULL",
            params![id],
        )?;
        db_tx.commit()?;
        Ok(existing)
    }
}
