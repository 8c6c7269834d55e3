// Ledger Store port
//
// The store is a single shared mutable resource with no mutual exclusion.
// Every operation reads a fresh snapshot; callers that need correctness under
// concurrent admin sessions must serialize access themselves.

use crate::db::{Transaction, User};
use crate::error::{LedgerError, Result};

/// Sheet convention: row 1 is the header, row 2 the first data row.
pub const HEADER_ROWS: usize = 2;

pub trait LedgerStore {
    fn list_users(&self) -> Result<Vec<User>>;

    /// Fails with `Duplicate` if the email is taken.
    fn append_user(&mut self, user: &User) -> Result<()>;

    fn delete_user(&mut self, email: &str) -> Result<()>;

    /// Full snapshot in append order.
    fn list_transactions(&self) -> Result<Vec<Transaction>>;

    /// Fails with `Duplicate` if the id is taken.
    fn append_transaction(&mut self, tx: &Transaction) -> Result<()>;

    /// Delete by stable identifier. `NotFound` if no such transaction.
    fn delete_transaction(&mut self, id: &str) -> Result<()>;

    /// Delete by sheet row position (1-based, header offset `HEADER_ROWS`).
    /// Positions shift under concurrent deletes; prefer `delete_transaction`.
    fn delete_transaction_at(&mut self, position: usize) -> Result<()>;
}

/// In-memory fake of the Users and Transactions tables
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    users: Vec<User>,
    transactions: Vec<Transaction>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(users: Vec<User>, transactions: Vec<Transaction>) -> Self {
        InMemoryLedger {
            users,
            transactions,
        }
    }
}

impl LedgerStore for InMemoryLedger {
    fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    fn append_user(&mut self, user: &User) -> Result<()> {
        if self.users.iter().any(|u| u.email == user.email) {
            return Err(LedgerError::Duplicate {
                entity: "user",
                key: user.email.clone(),
            });
        }
        self.users.push(user.clone());
        Ok(())
    }

    fn delete_user(&mut self, email: &str) -> Result<()> {
        let idx = self
            .users
            .iter()
            .position(|u| u.email == email)
            .ok_or_else(|| LedgerError::not_found("user", email))?;
        self.users.remove(idx);
        Ok(())
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.transactions.clone())
    }

    fn append_transaction(&mut self, tx: &Transaction) -> Result<()> {
        if self.transactions.iter().any(|t| t.id == tx.id) {
            return Err(LedgerError::Duplicate {
                entity: "transaction",
                key: tx.id.clone(),
            });
        }
        self.transactions.push(tx.clone());
        Ok(())
    }

    fn delete_transaction(&mut self, id: &str) -> Result<()> {
        let idx = self
            .transactions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))?;
        self.transactions.remove(idx);
        Ok(())
    }

    fn delete_transaction_at(&mut self, position: usize) -> Result<()> {
        let idx = position
            .checked_sub(HEADER_ROWS)
            .filter(|idx| *idx < self.transactions.len())
            .ok_or(LedgerError::InvalidPosition(position))?;
        self.transactions.remove(idx);
        Ok(())
    }
}

/// Sheet row of the first snapshot entry matching `email` and `timestamp`.
/// This is how rows were located before transactions carried an id.
pub fn locate_row(snapshot: &[Transaction], email: &str, timestamp: &str) -> Option<usize> {
    snapshot
        .iter()
        .position(|t| t.user_email == email && t.timestamp == timestamp)
        .map(|idx| idx + HEADER_ROWS)
}
