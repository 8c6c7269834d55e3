// CSV exchange for the Users and Transactions sheets
//
// Column headers follow the spreadsheet:
//   Users:        Name, Email, Password
//   Transactions: UserEmail, Amount, Type, Description, Timestamp[, Id]

use crate::db::{format_timestamp, parse_timestamp, Transaction, User};
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::io::{Read, Write};

/// Transaction row as it appears in a sheet export. Everything is text so
/// malformed cells surface as `LedgerError::Parse` naming the column.
#[derive(Debug, Deserialize)]
struct TransactionRecord {
    #[serde(rename = "UserEmail")]
    user_email: String,

    #[serde(rename = "Amount")]
    amount: String,

    #[serde(rename = "Type")]
    transaction_type: String,

    #[serde(rename = "Description", default)]
    description: String,

    #[serde(rename = "Timestamp")]
    timestamp: String,

    #[serde(rename = "Id", default)]
    id: String,
}

impl TransactionRecord {
    fn into_transaction(self) -> Result<Transaction> {
        let amount: f64 = self
            .amount
            .trim()
            .parse()
            .map_err(|e| LedgerError::parse("Amount", self.amount.as_str(), e))?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        // Normalized so the window comparison stays string-safe
        let timestamp = format_timestamp(parse_timestamp(self.timestamp.trim())?);

        let id = if self.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.id.trim().to_string()
        };

        Ok(Transaction {
            id,
            user_email: self.user_email.trim().to_string(),
            amount,
            transaction_type: self.transaction_type.parse()?,
            description: self.description,
            timestamp,
        })
    }
}

pub fn read_users<R: Read>(reader: R) -> Result<Vec<User>> {
    let mut rdr = csv::Reader::from_reader(reader);

    let mut users = Vec::new();
    for result in rdr.deserialize() {
        let mut user: User = result?;
        user.email = user.email.trim().to_string();
        users.push(user);
    }

    Ok(users)
}

/// Parse every row; the first bad row fails the whole read
pub fn read_transactions<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = csv::Reader::from_reader(reader);

    let mut transactions = Vec::new();
    for result in rdr.deserialize() {
        let record: TransactionRecord = result?;
        transactions.push(record.into_transaction()?);
    }

    Ok(transactions)
}

/// Write in sheet column order, `Id` last
pub fn write_transactions<W: Write>(writer: W, transactions: &[Transaction]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["UserEmail", "Amount", "Type", "Description", "Timestamp", "Id"])?;

    for tx in transactions {
        let amount = tx.amount.to_string();
        wtr.write_record([
            tx.user_email.as_str(),
            amount.as_str(),
            tx.transaction_type.as_str(),
            tx.description.as_str(),
            tx.timestamp.as_str(),
            tx.id.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
