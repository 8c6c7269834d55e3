// Dues Ledger - Core Library
// Exposes all modules for use in the CLI, the TUI and tests

pub mod error;
pub mod config;
pub mod observability;
pub mod db;             // Data model + SQLite ledger store
pub mod store;          // Storage port + in-memory fake
pub mod billing;        // Billing engine: cycles, filters, dues
pub mod statement;      // PDF statement renderer
pub mod import;         // CSV exchange with the spreadsheet
pub mod ledger;         // Admin operations

// Re-export commonly used types
pub use error::{LedgerError, Result};
pub use config::{AppConfig, CreditPolicy};
pub use db::{
    User, Transaction, TransactionType, Event,
    SqliteLedger, setup_database, format_timestamp, parse_timestamp,
    TIMESTAMP_FORMAT,
};
pub use store::{LedgerStore, InMemoryLedger, HEADER_ROWS};
pub use billing::{
    BillingCycle, CycleWindow, DuesTable, DuesReport, DuesRow,
    Statement, StatementLine,
    resolve_cycle, filter_transactions, aggregate_dues, dues_report,
    statement_lines, build_statement, display_description,
};
pub use statement::{StatementRenderer, PdfStatementRenderer, statement_filename};
pub use ledger::{Ledger, ExportedStatement, ImportSummary, parse_date, parse_amount};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
