//! Runtime configuration for the admin tool

use crate::error::{LedgerError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_DB_PATH: &str = "DUES_LEDGER_DB";
pub const ENV_STATEMENT_DIR: &str = "DUES_LEDGER_STATEMENT_DIR";
pub const ENV_CREDIT_POLICY: &str = "DUES_LEDGER_CREDIT_POLICY";
pub const ENV_LOG: &str = "DUES_LEDGER_LOG";
pub const ENV_LOG_FILE: &str = "DUES_LEDGER_LOG_FILE";

/// What `add_transaction` does with credit entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreditPolicy {
    /// Credits are dropped without writing anything
    #[default]
    Ignore,
    /// Credits are stored; they never count towards dues
    Record,
}

impl FromStr for CreditPolicy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(CreditPolicy::Ignore),
            "record" => Ok(CreditPolicy::Record),
            other => Err(LedgerError::Config(format!(
                "unknown credit policy {:?} (expected ignore or record)",
                other
            ))),
        }
    }
}

impl fmt::Display for CreditPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditPolicy::Ignore => f.write_str("ignore"),
            CreditPolicy::Record => f.write_str("record"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// SQLite file holding the Users and Transactions tables
    pub db_path: PathBuf,

    /// Where exported statements are written
    pub statement_dir: PathBuf,

    pub credit_policy: CreditPolicy,

    /// `tracing` filter directive, overridden by RUST_LOG
    pub log_filter: String,

    /// Log to this file instead of stderr. Required for logging in TUI mode.
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: PathBuf::from("dues-ledger.db"),
            statement_dir: PathBuf::from("."),
            credit_policy: CreditPolicy::Ignore,
            log_filter: "info".to_string(),
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `DUES_LEDGER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = get(ENV_STATEMENT_DIR) {
            config.statement_dir = PathBuf::from(dir);
        }
        if let Some(policy) = get(ENV_CREDIT_POLICY) {
            config.credit_policy = policy.parse()?;
        }
        if let Some(filter) = get(ENV_LOG) {
            config.log_filter = filter;
        }
        if let Some(file) = get(ENV_LOG_FILE) {
            config.log_file = Some(PathBuf::from(file));
        }

        Ok(config)
    }

    pub fn with_statement_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.statement_dir = dir.into();
        self
    }

    pub fn with_credit_policy(mut self, policy: CreditPolicy) -> Self {
        self.credit_policy = policy;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}
