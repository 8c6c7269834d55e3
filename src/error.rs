// Error types for the ledger core
// The binary wraps these in anyhow at the edges

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced user or transaction does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Unique key already taken (user email)
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// Stored data that cannot be interpreted (bad amount, timestamp, type)
    #[error("cannot parse {field} from {value:?}: {reason}")]
    Parse {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("amount must be a finite value >= 0, got {0}")]
    InvalidAmount(f64),

    #[error("row position {0} is outside the data rows")]
    InvalidPosition(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("statement rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn parse(field: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        LedgerError::Parse {
            field,
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
