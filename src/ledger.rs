// Ledger service - admin operations over a LedgerStore
//
// Each operation reads a fresh snapshot, computes, and only then mutates.
// Deletes go through transaction ids, never row positions.

use crate::billing::{self, DuesReport, Statement};
use crate::config::{AppConfig, CreditPolicy};
use crate::db::{Transaction, TransactionType, User};
use crate::error::{LedgerError, Result};
use crate::import;
use crate::statement::{statement_filename, StatementRenderer};
use crate::store::LedgerStore;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;
use std::io::{Read, Write};
use tracing::{debug, info, warn};

/// Rendered statement ready to be saved or offered for download
#[derive(Debug, Clone)]
pub struct ExportedStatement {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub statement: Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

pub struct Ledger<S: LedgerStore> {
    store: S,
    credit_policy: CreditPolicy,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Ledger {
            store,
            credit_policy: CreditPolicy::default(),
        }
    }

    pub fn with_config(store: S, config: &AppConfig) -> Self {
        Ledger {
            store,
            credit_policy: config.credit_policy,
        }
    }

    pub fn with_credit_policy(mut self, policy: CreditPolicy) -> Self {
        self.credit_policy = policy;
        self
    }

    pub fn credit_policy(&self) -> CreditPolicy {
        self.credit_policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================================================================
    // USERS
    // ========================================================================

    pub fn users(&self) -> Result<Vec<User>> {
        self.store.list_users()
    }

    pub fn find_user(&self, email: &str) -> Result<User> {
        self.store
            .list_users()?
            .into_iter()
            .find(|u| u.email == email)
            .ok_or_else(|| LedgerError::not_found("user", email))
    }

    pub fn find_user_by_name(&self, name: &str) -> Result<User> {
        self.store
            .list_users()?
            .into_iter()
            .find(|u| u.name == name)
            .ok_or_else(|| LedgerError::not_found("user", name))
    }

    pub fn add_user(&mut self, name: &str, email: &str, password: &str) -> Result<User> {
        let user = User::new(name.trim(), email.trim(), password);
        self.store.append_user(&user)?;
        info!(email = %user.email, "user added");
        Ok(user)
    }

    /// Removes the user row only; their transactions stay in the ledger
    pub fn remove_user(&mut self, email: &str) -> Result<()> {
        self.store.delete_user(email)?;
        info!(email, "user removed");
        Ok(())
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Record a transaction stamped with the local wall clock.
    /// Returns `None` when a credit is dropped by `CreditPolicy::Ignore`.
    pub fn add_transaction(
        &mut self,
        email: &str,
        amount: f64,
        transaction_type: TransactionType,
        description: &str,
    ) -> Result<Option<Transaction>> {
        let now = Local::now().naive_local();
        self.add_transaction_at(email, amount, transaction_type, description, now)
    }

    pub fn add_transaction_at(
        &mut self,
        email: &str,
        amount: f64,
        transaction_type: TransactionType,
        description: &str,
        at: NaiveDateTime,
    ) -> Result<Option<Transaction>> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        if transaction_type == TransactionType::Credit && self.credit_policy == CreditPolicy::Ignore
        {
            warn!(email, amount, "credit transaction ignored by policy");
            return Ok(None);
        }

        let tx = Transaction::new(email, amount, transaction_type, description, at);
        self.store.append_transaction(&tx)?;
        info!(id = %tx.id, email, amount, kind = %transaction_type, "transaction added");
        Ok(Some(tx))
    }

    /// All transactions of one user in ledger order
    pub fn user_transactions(&self, email: &str) -> Result<Vec<Transaction>> {
        let snapshot = self.store.list_transactions()?;
        Ok(billing::filter_transactions(&snapshot, email, None)
            .cloned()
            .collect())
    }

    /// Delete by id and return what was removed
    pub fn delete_transaction(&mut self, id: &str) -> Result<Transaction> {
        let snapshot = self.store.list_transactions()?;
        let target = snapshot
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| LedgerError::not_found("transaction", id))?;

        self.store.delete_transaction(id)?;
        info!(id, email = %target.user_email, "transaction deleted");
        Ok(target)
    }

    /// Delete every transaction, any user, timestamped from `start` 00:00
    /// through the end of `end`. Timestamps are all validated before the
    /// first delete. Rows removed by someone else in the meantime are
    /// skipped. Returns how many rows this call removed.
    pub fn delete_between(&mut self, start: NaiveDate, end: NaiveDate) -> Result<usize> {
        let from = start.and_time(NaiveTime::MIN);
        let until = end.and_time(end_of_day());

        let snapshot = self.store.list_transactions()?;
        let mut doomed = Vec::new();
        for tx in &snapshot {
            let at = tx.recorded_at()?;
            if from <= at && at <= until {
                doomed.push(tx.id.clone());
            }
        }

        let mut removed = 0;
        for id in &doomed {
            match self.store.delete_transaction(id) {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {
                    debug!(id = %id, "transaction already gone");
                }
                Err(e) => return Err(e),
            }
        }

        info!(%start, %end, removed, "transactions deleted between dates");
        Ok(removed)
    }

    // ========================================================================
    // DUES & STATEMENTS
    // ========================================================================

    /// All-time dues for every known user
    pub fn dues_report(&self) -> Result<DuesReport> {
        let users = self.store.list_users()?;
        let snapshot = self.store.list_transactions()?;
        debug!(users = users.len(), transactions = snapshot.len(), "computing dues");
        Ok(billing::dues_report(&users, &snapshot))
    }

    /// Statement for the cycle containing `today`. Unknown user aborts.
    pub fn statement(&self, email: &str, today: NaiveDate) -> Result<Statement> {
        let user = self.find_user(email)?;
        let snapshot = self.store.list_transactions()?;
        billing::build_statement(&user, &snapshot, today)
    }

    pub fn export_statement<R: StatementRenderer>(
        &self,
        email: &str,
        today: NaiveDate,
        renderer: &R,
    ) -> Result<ExportedStatement> {
        let statement = self.statement(email, today)?;
        let bytes = renderer.render_statement(&statement)?;
        let filename = statement_filename(&statement.user.name, statement.cycle.due_date);

        info!(
            email,
            filename = %filename,
            lines = statement.lines.len(),
            total_due = statement.total_due,
            "statement exported"
        );

        Ok(ExportedStatement {
            filename,
            bytes,
            statement,
        })
    }

    // ========================================================================
    // CSV IMPORT / EXPORT
    // ========================================================================

    /// Users whose email already exists are skipped
    pub fn import_users<R: Read>(&mut self, reader: R) -> Result<ImportSummary> {
        let incoming = import::read_users(reader)?;
        let mut known: HashSet<String> =
            self.store.list_users()?.into_iter().map(|u| u.email).collect();

        let mut summary = ImportSummary::default();
        for user in incoming {
            if !known.insert(user.email.clone()) {
                summary.skipped += 1;
                continue;
            }
            self.store.append_user(&user)?;
            summary.inserted += 1;
        }

        info!(inserted = summary.inserted, skipped = summary.skipped, "users imported");
        Ok(summary)
    }

    /// Rows matching an existing transaction's content hash (or one earlier
    /// in the file) are skipped, so re-importing the same sheet is a no-op.
    /// The whole file is parsed before anything is written.
    pub fn import_transactions<R: Read>(&mut self, reader: R) -> Result<ImportSummary> {
        let incoming = import::read_transactions(reader)?;
        let snapshot = self.store.list_transactions()?;
        let mut seen: HashSet<String> = snapshot.iter().map(|t| t.idempotency_hash()).collect();
        let mut ids: HashSet<String> = snapshot.into_iter().map(|t| t.id).collect();

        let mut summary = ImportSummary::default();
        for mut tx in incoming {
            if !seen.insert(tx.idempotency_hash()) {
                summary.skipped += 1;
                continue;
            }
            if !ids.insert(tx.id.clone()) {
                tx.id = uuid::Uuid::new_v4().to_string();
                ids.insert(tx.id.clone());
            }
            self.store.append_transaction(&tx)?;
            summary.inserted += 1;
        }

        info!(inserted = summary.inserted, skipped = summary.skipped, "transactions imported");
        Ok(summary)
    }

    pub fn export_transactions<W: Write>(&self, writer: W) -> Result<usize> {
        let snapshot = self.store.list_transactions()?;
        import::write_transactions(writer, &snapshot)?;
        Ok(snapshot.len())
    }
}

fn end_of_day() -> NaiveTime {
    // 23:59:59.999999, the last instant the persisted format can express
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN)
}

/// Parse a `YYYY-MM-DD` admin input
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| LedgerError::parse("date", value, e))
}

/// Parse an amount typed by the admin
pub fn parse_amount(value: &str) -> Result<f64> {
    let amount: f64 = value
        .trim()
        .parse()
        .map_err(|e| LedgerError::parse("Amount", value, e))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(amount)
}
