use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::Rejection;

/// Longest sender/receiver name accepted at submission.
pub const MAX_PARTY_LEN: usize = 255;

/// A strictly positive amount with fixed two-place precision, stored as cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    /// Largest amount in cents; the store keeps cents in a signed 64-bit column.
    pub const MAX_CENTS: u64 = i64::MAX as u64;

    pub fn from_cents(cents: u64) -> Result<Self, Rejection> {
        if cents == 0 {
            return Err(Rejection::NonPositiveAmount);
        }
        if cents > Self::MAX_CENTS {
            return Err(Rejection::InvalidAmount(format!("{cents} cents exceeds the maximum")));
        }
        Ok(Self(cents))
    }

    pub fn cents(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = Rejection;

    /// Accepts `10`, `10.5`, `10.50`. Rejects more than two fraction digits,
    /// signs, exponents and anything that is not plain decimal text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || Rejection::InvalidAmount(s.to_string());

        if let Some(rest) = s.strip_prefix('-') {
            return if rest.chars().all(|c| c.is_ascii_digit() || c == '.') && !rest.is_empty() {
                Err(Rejection::NonPositiveAmount)
            } else {
                Err(invalid())
            };
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if s.ends_with('.') {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let frac_cents: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .filter(|c| *c <= Self::MAX_CENTS)
            .ok_or_else(invalid)?;

        Self::from_cents(cents)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Settled,
}

impl TxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Settled => "settled",
        }
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TxStatus::Pending),
            "settled" => Ok(TxStatus::Settled),
            other => Err(format!("unknown transaction status '{other}'")),
        }
    }
}

/// A transfer recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    /// Monotonic identifier assigned by the store.
    pub id: u64,
    pub sender: String,
    pub receiver: String,
    pub amount: Amount,
    /// Server-assigned creation time, millisecond precision (UTC).
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
    /// Index of the block that settled this transaction, if any.
    pub block_index: Option<u64>,
}

impl Transaction {
    pub fn is_pending(&self) -> bool {
        self.status == TxStatus::Pending
    }
}

/// A validated submission, ready to be stored as a pending transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub sender: String,
    pub receiver: String,
    pub amount: Amount,
}

impl NewTransaction {
    /// Validate the raw submission fields. Nothing is persisted here.
    pub fn new(sender: &str, receiver: &str, amount: &str) -> Result<Self, Rejection> {
        let sender = party("sender", sender)?;
        let receiver = party("receiver", receiver)?;
        if amount.trim().is_empty() {
            return Err(Rejection::MissingField("amount"));
        }
        let amount: Amount = amount.parse()?;

        if sender == receiver {
            return Err(Rejection::SameParty);
        }

        Ok(Self {
            sender,
            receiver,
            amount,
        })
    }
}

fn party(field: &'static str, value: &str) -> Result<String, Rejection> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Rejection::MissingField(field));
    }
    if value.chars().count() > MAX_PARTY_LEN {
        return Err(Rejection::FieldTooLong {
            field,
            max: MAX_PARTY_LEN,
        });
    }
    Ok(value.to_string())
}
