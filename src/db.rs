use crate::error::{LedgerError, Result};
use crate::store::{LedgerStore, HEADER_ROWS};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Persisted timestamp layout. Always six fractional digits so that string
/// order and chronological order agree.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Accepted when reading: fraction is optional.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_PARSE_FORMAT)
        .map_err(|e| LedgerError::parse("Timestamp", value, e))
}

// ============================================================================
// USERS
// ============================================================================

/// Row of the Users table. Email is the identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Email")]
    pub email: String,

    #[serde(rename = "Password", default)]
    pub password: String,
}

impl User {
    pub fn new(name: &str, email: &str, password: &str) -> Self {
        User {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Debit,
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debit => "debit",
            TransactionType::Credit => "credit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "debit" => Ok(TransactionType::Debit),
            "credit" => Ok(TransactionType::Credit),
            _ => Err(LedgerError::parse("Type", s, "expected debit or credit")),
        }
    }
}

/// One ledger entry. Immutable once appended; corrections are delete + re-add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identity (UUID v4) assigned at creation, used for deletes
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "UserEmail")]
    pub user_email: String,

    #[serde(rename = "Amount")]
    pub amount: f64,

    #[serde(rename = "Type")]
    pub transaction_type: TransactionType,

    #[serde(rename = "Description")]
    pub description: String,

    /// Wall-clock creation time in TIMESTAMP_FORMAT
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl Transaction {
    pub fn new(
        user_email: &str,
        amount: f64,
        transaction_type: TransactionType,
        description: &str,
        at: NaiveDateTime,
    ) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_email: user_email.to_string(),
            amount,
            transaction_type,
            description: description.to_string(),
            timestamp: format_timestamp(at),
        }
    }

    pub fn is_debit(&self) -> bool {
        self.transaction_type == TransactionType::Debit
    }

    /// Parsed creation time. Fails on malformed stored timestamps.
    pub fn recorded_at(&self) -> Result<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }

    /// Content hash used to skip duplicates on re-import.
    /// NOTE: identity is `id`; two rows may share a hash.
    pub fn idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}",
            self.user_email, self.amount, self.transaction_type, self.description, self.timestamp
        ));
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Audit trail entry, one per mutation of the SQLite ledger
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

const ACTOR: &str = "admin";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            password TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Row id order is append order, the sheet's row order
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_uuid TEXT UNIQUE NOT NULL,
            user_email TEXT NOT NULL,
            amount REAL NOT NULL,
            transaction_type TEXT NOT NULL,
            description TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            idempotency_hash TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_user_email ON transactions(user_email)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_timestamp ON transactions(timestamp)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
                let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| LedgerError::parse("event timestamp", timestamp.as_str(), e))?
                    .with_timezone(&Utc);
                Ok(Event {
                    event_id,
                    timestamp,
                    event_type,
                    entity_type,
                    entity_id,
                    data: serde_json::from_str(&data)?,
                    actor,
                })
            },
        )
        .collect()
}

// ============================================================================
// SQLITE LEDGER
// ============================================================================

/// Ledger Store bound to a SQLite file
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened ledger database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteLedger { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, entity_type, entity_id)
    }

    pub fn transaction_count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    fn remove_transaction_row(&mut self, row_id: i64, tx_uuid: &str) -> Result<()> {
        let db_tx = self.conn.transaction()?;
        db_tx.execute("DELETE FROM transactions WHERE id = ?1", params![row_id])?;
        insert_event(
            &db_tx,
            &Event::new(
                "transaction_deleted",
                "transaction",
                tx_uuid,
                serde_json::json!({ "row_id": row_id }),
                ACTOR,
            ),
        )?;
        db_tx.commit()?;
        Ok(())
    }
}

impl LedgerStore for SqliteLedger {
    fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, email, password FROM users ORDER BY id ASC")?;

        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    name: row.get(0)?,
                    email: row.get(1)?,
                    password: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(count = users.len(), "loaded users snapshot");
        Ok(users)
    }

    fn append_user(&mut self, user: &User) -> Result<()> {
        let db_tx = self.conn.transaction()?;
        let result = db_tx.execute(
            "INSERT INTO users (name, email, password) VALUES (?1, ?2, ?3)",
            params![user.name, user.email, user.password],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(LedgerError::Duplicate {
                    entity: "user",
                    key: user.email.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        insert_event(
            &db_tx,
            &Event::new(
                "user_added",
                "user",
                &user.email,
                serde_json::json!({ "name": user.name }),
                ACTOR,
            ),
        )?;
        db_tx.commit()?;
        Ok(())
    }

    fn delete_user(&mut self, email: &str) -> Result<()> {
        let db_tx = self.conn.transaction()?;
        let removed = db_tx.execute("DELETE FROM users WHERE email = ?1", params![email])?;
        if removed == 0 {
            return Err(LedgerError::not_found("user", email));
        }
        insert_event(
            &db_tx,
            &Event::new("user_deleted", "user", email, serde_json::json!({}), ACTOR),
        )?;
        db_tx.commit()?;
        Ok(())
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT tx_uuid, user_email, amount, transaction_type, description, timestamp
             FROM transactions
             ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let transactions = rows
            .into_iter()
            .map(|(id, user_email, amount, kind, description, timestamp)| {
                Ok(Transaction {
                    id,
                    user_email,
                    amount,
                    transaction_type: kind.parse()?,
                    description,
                    timestamp,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = transactions.len(), "loaded transactions snapshot");
        Ok(transactions)
    }

    fn append_transaction(&mut self, tx: &Transaction) -> Result<()> {
        let db_tx = self.conn.transaction()?;
        let result = db_tx.execute(
            "INSERT INTO transactions (
                tx_uuid, user_email, amount, transaction_type, description, timestamp,
                idempotency_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tx.id,
                tx.user_email,
                tx.amount,
                tx.transaction_type.as_str(),
                tx.description,
                tx.timestamp,
                tx.idempotency_hash(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(LedgerError::Duplicate {
                    entity: "transaction",
                    key: tx.id.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        insert_event(
            &db_tx,
            &Event::new(
                "transaction_added",
                "transaction",
                &tx.id,
                serde_json::json!({
                    "user_email": tx.user_email,
                    "amount": tx.amount,
                    "type": tx.transaction_type.as_str(),
                }),
                ACTOR,
            ),
        )?;
        db_tx.commit()?;
        Ok(())
    }

    fn delete_transaction(&mut self, id: &str) -> Result<()> {
        let row_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM transactions WHERE tx_uuid = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match row_id {
            Some(row_id) => self.remove_transaction_row(row_id, id),
            None => Err(LedgerError::not_found("transaction", id)),
        }
    }

    fn delete_transaction_at(&mut self, position: usize) -> Result<()> {
        if position < HEADER_ROWS {
            return Err(LedgerError::InvalidPosition(position));
        }
        let offset = (position - HEADER_ROWS) as i64;

        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, tx_uuid FROM transactions ORDER BY id ASC LIMIT 1 OFFSET ?1",
                params![offset],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((row_id, tx_uuid)) => self.remove_transaction_row(row_id, &tx_uuid),
            None => Err(LedgerError::InvalidPosition(position)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn seeded_ledger() -> SqliteLedger {
        let mut ledger = SqliteLedger::open_in_memory().unwrap();
        ledger
            .append_user(&User::new("Asha Rao", "asha@example.com", "pw"))
            .unwrap();
        ledger
            .append_user(&User::new("Ben Ito", "ben@example.com", "pw"))
            .unwrap();
        ledger
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let ts = format_timestamp(at(13, 0));
        assert_eq!(ts, "2024-03-13T00:00:00.000000");
        assert_eq!(parse_timestamp(&ts).unwrap(), at(13, 0));

        // Python-style isoformat without fraction is still readable
        assert_eq!(parse_timestamp("2024-03-13T05:00:00").unwrap(), at(13, 5));
        assert!(parse_timestamp("13/03/2024").is_err());
    }

    #[test]
    fn test_transaction_type_parse() {
        assert_eq!("debit".parse::<TransactionType>().unwrap(), TransactionType::Debit);
        assert_eq!(" Credit ".parse::<TransactionType>().unwrap(), TransactionType::Credit);

        let err = "refund".parse::<TransactionType>().unwrap_err();
        assert!(matches!(err, LedgerError::Parse { field: "Type", .. }));
    }

    #[test]
    fn test_user_debug_redacts_password() {
        let user = User::new("Asha Rao", "asha@example.com", "hunter2");
        let shown = format!("{:?}", user);
        assert!(shown.contains("asha@example.com"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_idempotency_hash_ignores_identity() {
        let a = Transaction::new("a@example.com", 10.0, TransactionType::Debit, "tea", at(14, 9));
        let mut b = a.clone();
        b.id = uuid::Uuid::new_v4().to_string();

        assert_ne!(a.id, b.id);
        assert_eq!(a.idempotency_hash(), b.idempotency_hash());
        assert_eq!(a.idempotency_hash().len(), 64);
    }

    #[test]
    fn test_idempotency_hash_keeps_full_amount_precision() {
        let a = Transaction::new("a@example.com", 10.004, TransactionType::Debit, "tea", at(14, 9));
        let mut b = a.clone();
        b.amount = 10.001;
        assert_ne!(a.idempotency_hash(), b.idempotency_hash());
    }

    #[test]
    fn test_users_roundtrip_and_duplicate_email() {
        let mut ledger = seeded_ledger();

        let users = ledger.list_users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "Asha Rao");

        let err = ledger
            .append_user(&User::new("Other", "asha@example.com", "x"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate { entity: "user", .. }));

        ledger.delete_user("ben@example.com").unwrap();
        assert_eq!(ledger.list_users().unwrap().len(), 1);
        assert!(ledger.delete_user("ben@example.com").unwrap_err().is_not_found());
    }

    #[test]
    fn test_transactions_keep_append_order() {
        let mut ledger = seeded_ledger();
        let first = Transaction::new("asha@example.com", 100.0, TransactionType::Debit, "rent", at(14, 9));
        let second = Transaction::new("ben@example.com", 30.0, TransactionType::Debit, "lunch", at(2, 9));

        ledger.append_transaction(&first).unwrap();
        ledger.append_transaction(&second).unwrap();

        let all = ledger.list_transactions().unwrap();
        assert_eq!(all, vec![first, second]);
        assert_eq!(ledger.transaction_count().unwrap(), 2);
    }

    #[test]
    fn test_duplicate_transaction_id_rejected() {
        let mut ledger = seeded_ledger();
        let first = Transaction::new("asha@example.com", 5.0, TransactionType::Debit, "tea", at(14, 9));
        let mut again = Transaction::new("ben@example.com", 6.0, TransactionType::Debit, "bus", at(15, 9));
        again.id = first.id.clone();

        ledger.append_transaction(&first).unwrap();
        let err = ledger.append_transaction(&again).unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate { entity: "transaction", .. }));
        assert_eq!(ledger.list_transactions().unwrap(), vec![first.clone()]);
        // Rolled back together with its audit event
        assert_eq!(ledger.events_for("transaction", &first.id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_by_id_and_by_position() {
        let mut ledger = seeded_ledger();
        let txs: Vec<Transaction> = (1..=3)
            .map(|d| {
                Transaction::new("asha@example.com", d as f64, TransactionType::Debit, "x", at(d, 9))
            })
            .collect();
        for tx in &txs {
            ledger.append_transaction(tx).unwrap();
        }

        ledger.delete_transaction(&txs[1].id).unwrap();
        assert!(ledger.delete_transaction(&txs[1].id).unwrap_err().is_not_found());

        // Row 2 is the first data row
        ledger.delete_transaction_at(HEADER_ROWS).unwrap();
        let left = ledger.list_transactions().unwrap();
        assert_eq!(left, vec![txs[2].clone()]);

        assert!(matches!(
            ledger.delete_transaction_at(1),
            Err(LedgerError::InvalidPosition(1))
        ));
        assert!(matches!(
            ledger.delete_transaction_at(HEADER_ROWS + 5),
            Err(LedgerError::InvalidPosition(_))
        ));
    }

    #[test]
    fn test_unknown_stored_type_is_parse_error() {
        let ledger = seeded_ledger();
        ledger
            .connection()
            .execute(
                "INSERT INTO transactions (tx_uuid, user_email, amount, transaction_type,
                    description, timestamp, idempotency_hash)
                 VALUES ('u1', 'asha@example.com', 5.0, 'refund', 'x', '2024-03-14T00:00:00.000000', 'h')",
                [],
            )
            .unwrap();

        let err = ledger.list_transactions().unwrap_err();
        assert!(matches!(err, LedgerError::Parse { field: "Type", .. }));
    }

    #[test]
    fn test_mutations_write_audit_events() {
        let mut ledger = seeded_ledger();
        let tx = Transaction::new("asha@example.com", 12.5, TransactionType::Debit, "books", at(20, 9));
        ledger.append_transaction(&tx).unwrap();
        ledger.delete_transaction(&tx.id).unwrap();

        let events = ledger.events_for("transaction", &tx.id).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["transaction_added", "transaction_deleted"]);
        assert_eq!(events[0].data["amount"], serde_json::json!(12.5));

        let user_events = ledger.events_for("user", "asha@example.com").unwrap();
        assert_eq!(user_events.len(), 1);
        assert_eq!(user_events[0].actor, "admin");
    }
}
