use std::env;

use crate::blockchain::DEFAULT_MINING_ATTEMPTS;

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// SQLite database path; `:memory:` for a throwaway ledger.
    pub database_path: String,
    /// Optimistic commit attempts before a mining request gives up.
    pub mining_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_path: "ledger.db".to_string(),
            mining_attempts: DEFAULT_MINING_ATTEMPTS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset or unparsable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            database_path: lookup("LEDGER_DB")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.database_path),
            mining_attempts: lookup("MINING_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n >= 1)
                .unwrap_or(defaults.mining_attempts),
        }
    }
}
