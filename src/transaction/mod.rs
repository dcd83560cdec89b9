pub mod model;

pub use model::{Amount, NewTransaction, Transaction, TxStatus};
