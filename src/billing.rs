// Billing Engine - cycle boundaries, filtering and dues
//
// Stateless: every function works on a snapshot handed in by the caller.
//
// Two distinct totals live here:
//   aggregate_dues / dues_report  -> all-time debits per user
//   statement_lines               -> debits inside one billing cycle

use crate::db::{format_timestamp, Transaction, TransactionType, User};
use crate::error::Result;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Day of month every cycle starts on
pub const CYCLE_START_DAY: u32 = 13;

/// Fixed window length, not calendar-month aware
pub const CYCLE_LENGTH_DAYS: i64 = 30;

/// Due date offset from cycle start
pub const DUE_AFTER_DAYS: i64 = 50;

/// Descriptions longer than this are shortened for display
pub const DESCRIPTION_DISPLAY_LIMIT: usize = 33;
const DESCRIPTION_KEEP: usize = 30;

/// Characters of the timestamp shown in the Date column
const DATE_COLUMN_WIDTH: usize = 19;

// ============================================================================
// BILLING CYCLE RESOLVER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCycle {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub due_date: NaiveDate,
}

impl BillingCycle {
    /// Inclusive timestamp window `[start 00:00, end 00:00]`
    pub fn window(&self) -> CycleWindow {
        CycleWindow::between(
            self.start.and_time(NaiveTime::MIN),
            self.end.and_time(NaiveTime::MIN),
        )
    }

    pub fn period_label(&self) -> String {
        format!("{} to {}", self.start, self.end)
    }
}

/// Cycle containing `today`. Starts on the 13th of this month when today is
/// on or after the 13th, otherwise on the 13th of the previous month.
///
/// Never panics: at chrono's calendar limits the bounds clamp to
/// `NaiveDate::MIN` / `NaiveDate::MAX`.
pub fn resolve_cycle(today: NaiveDate) -> BillingCycle {
    let start = if today.day() >= CYCLE_START_DAY {
        days_before(today, i64::from(today.day() - CYCLE_START_DAY))
    } else {
        match today.checked_sub_signed(Duration::days(i64::from(today.day()))) {
            Some(last_of_previous) => days_before(
                last_of_previous,
                i64::from(last_of_previous.day() - CYCLE_START_DAY),
            ),
            None => NaiveDate::MIN,
        }
    };

    BillingCycle {
        start,
        end: days_after(start, CYCLE_LENGTH_DAYS),
        due_date: days_after(start, DUE_AFTER_DAYS),
    }
}

fn days_before(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_sub_signed(Duration::days(days))
        .unwrap_or(NaiveDate::MIN)
}

fn days_after(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(NaiveDate::MAX)
}

// ============================================================================
// TRANSACTION FILTER
// ============================================================================

/// Inclusive window compared against persisted timestamps as strings.
/// Bounds use the persisted fixed-width format, so string order is time order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleWindow {
    pub start: String,
    pub end: String,
}

impl CycleWindow {
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        CycleWindow {
            start: format_timestamp(start),
            end: format_timestamp(end),
        }
    }

    pub fn contains(&self, timestamp: &str) -> bool {
        self.start.as_str() <= timestamp && timestamp <= self.end.as_str()
    }
}

/// Transactions of `email`, optionally restricted to `window`, in snapshot order
pub fn filter_transactions<'a>(
    snapshot: &'a [Transaction],
    email: &'a str,
    window: Option<&'a CycleWindow>,
) -> impl Iterator<Item = &'a Transaction> + 'a {
    snapshot.iter().filter(move |tx| {
        tx.user_email == email && window.map_or(true, |w| w.contains(&tx.timestamp))
    })
}

// ============================================================================
// DUES AGGREGATOR
// ============================================================================

/// user email -> all-time debit total. Users without debits are absent.
pub type DuesTable = BTreeMap<String, f64>;

pub fn aggregate_dues(snapshot: &[Transaction]) -> DuesTable {
    let mut dues = DuesTable::new();
    for tx in snapshot.iter().filter(|tx| tx.is_debit()) {
        *dues.entry(tx.user_email.clone()).or_insert(0.0) += tx.amount;
    }
    dues
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuesRow {
    pub name: String,
    pub email: String,
    pub due: f64,
}

/// All-users dues view: every known user, defaulting to 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuesReport {
    pub rows: Vec<DuesRow>,
    pub total_due: f64,
}

pub fn dues_report(users: &[User], snapshot: &[Transaction]) -> DuesReport {
    let dues = aggregate_dues(snapshot);

    let mut total = 0.0;
    let rows = users
        .iter()
        .map(|user| {
            let due = dues.get(&user.email).copied().unwrap_or(0.0);
            total += due;
            DuesRow {
                name: user.name.clone(),
                email: user.email.clone(),
                due: round2(due),
            }
        })
        .collect();

    DuesReport {
        rows,
        total_due: round2(total),
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// STATEMENT LINE ITEMS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub transaction_id: String,
    /// Timestamp cut to `YYYY-MM-DDTHH:MM:SS`
    pub date: String,
    pub transaction_type: TransactionType,
    pub amount: f64,
    /// Display text, possibly shortened
    pub description: String,
}

impl StatementLine {
    fn from_transaction(tx: &Transaction) -> Self {
        StatementLine {
            transaction_id: tx.id.clone(),
            date: tx.timestamp.chars().take(DATE_COLUMN_WIDTH).collect(),
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            description: display_description(&tx.description),
        }
    }

    pub fn type_label(&self) -> String {
        self.transaction_type.as_str().to_uppercase()
    }
}

/// Everything a renderer needs for one user's statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub user: User,
    pub cycle: BillingCycle,
    pub lines: Vec<StatementLine>,
    pub total_due: f64,
}

/// Line items of `email` inside `cycle` plus their debit total.
/// Credits are listed but not summed. Malformed timestamps fail the whole call.
pub fn statement_lines(
    snapshot: &[Transaction],
    email: &str,
    cycle: &BillingCycle,
) -> Result<(Vec<StatementLine>, f64)> {
    let window = cycle.window();
    let mut lines = Vec::new();
    let mut total_due = 0.0;

    for tx in filter_transactions(snapshot, email, None) {
        tx.recorded_at()?;
        if !window.contains(&tx.timestamp) {
            continue;
        }
        if tx.is_debit() {
            total_due += tx.amount;
        }
        lines.push(StatementLine::from_transaction(tx));
    }

    Ok((lines, total_due))
}

pub fn build_statement(user: &User, snapshot: &[Transaction], today: NaiveDate) -> Result<Statement> {
    let cycle = resolve_cycle(today);
    let (lines, total_due) = statement_lines(snapshot, &user.email, &cycle)?;

    Ok(Statement {
        user: user.clone(),
        cycle,
        lines,
        total_due,
    })
}

/// First 30 characters plus "..." when longer than 33 characters
pub fn display_description(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_DISPLAY_LIMIT {
        let kept: String = description.chars().take(DESCRIPTION_KEEP).collect();
        format!("{}...", kept)
    } else {
        description.to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx_at(email: &str, amount: f64, kind: TransactionType, at: NaiveDateTime) -> Transaction {
        Transaction::new(email, amount, kind, "test item", at)
    }

    fn noon(d: NaiveDate) -> NaiveDateTime {
        d.and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_cycle_start_on_the_13th() {
        let d = date(2024, 3, 13);
        let cycle = resolve_cycle(d);
        assert_eq!(cycle.start, d);
        assert_eq!(cycle.end, date(2024, 4, 12));
        assert_eq!(cycle.due_date, date(2024, 5, 2));
    }

    #[test]
    fn test_cycle_year_rollover() {
        assert_eq!(resolve_cycle(date(2024, 1, 5)).start, date(2023, 12, 13));
        assert_eq!(resolve_cycle(date(2024, 1, 12)).start, date(2023, 12, 13));
    }

    #[test]
    fn test_cycle_invariants_over_several_years() {
        let mut d = date(2023, 1, 1);
        while d <= date(2025, 12, 31) {
            let cycle = resolve_cycle(d);
            assert_eq!(cycle.start.day(), CYCLE_START_DAY, "start day for {}", d);
            assert_eq!(cycle.end, cycle.start + Duration::days(30));
            assert_eq!(cycle.due_date, cycle.start + Duration::days(50));
            assert!(cycle.start <= d);
            if d.day() == CYCLE_START_DAY {
                assert_eq!(cycle.start, d);
            }
            d += Duration::days(1);
        }
    }

    #[test]
    fn test_cycle_at_calendar_limits() {
        let last = resolve_cycle(NaiveDate::MAX);
        assert_eq!(last.start.day(), CYCLE_START_DAY);
        assert!(last.start <= NaiveDate::MAX);
        assert_eq!(last.end, NaiveDate::MAX);
        assert_eq!(last.due_date, NaiveDate::MAX);

        // No previous month to fall back to
        let first = resolve_cycle(NaiveDate::MIN);
        assert_eq!(first.start, NaiveDate::MIN);
        assert_eq!(first.end, NaiveDate::MIN + Duration::days(30));
    }

    #[test]
    fn test_cycle_before_13th_in_march() {
        // February has 29 days in 2024; start is still the 13th
        let cycle = resolve_cycle(date(2024, 3, 1));
        assert_eq!(cycle.start, date(2024, 2, 13));
        assert_eq!(cycle.end, date(2024, 3, 14));
    }

    #[test]
    fn test_aggregate_dues_counts_debits_only() {
        let at = noon(date(2024, 3, 14));
        let snapshot = vec![
            tx_at("A", 100.0, TransactionType::Debit, at),
            tx_at("A", 50.0, TransactionType::Credit, at),
            tx_at("B", 30.0, TransactionType::Debit, at),
        ];

        let dues = aggregate_dues(&snapshot);
        assert_eq!(dues.len(), 2);
        assert_eq!(dues["A"], 100.0);
        assert_eq!(dues["B"], 30.0);

        // Idempotent on an unchanged snapshot
        assert_eq!(aggregate_dues(&snapshot), dues);
        assert!(aggregate_dues(&[]).is_empty());
    }

    #[test]
    fn test_aggregate_dues_omits_credit_only_users() {
        let at = noon(date(2024, 3, 14));
        let snapshot = vec![tx_at("C", 75.0, TransactionType::Credit, at)];
        assert!(!aggregate_dues(&snapshot).contains_key("C"));
    }

    #[test]
    fn test_dues_report_defaults_missing_users_to_zero() {
        let users = vec![
            User::new("Asha", "a@example.com", "pw"),
            User::new("Ben", "b@example.com", "pw"),
        ];
        let at = noon(date(2024, 3, 14));
        let snapshot = vec![
            tx_at("a@example.com", 10.0, TransactionType::Debit, at),
            tx_at("a@example.com", 0.256, TransactionType::Debit, at),
            tx_at("ghost@example.com", 99.0, TransactionType::Debit, at),
        ];

        let report = dues_report(&users, &snapshot);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].due, 10.26);
        assert_eq!(report.rows[1].due, 0.0);
        assert_eq!(report.total_due, 10.26);
    }

    #[test]
    fn test_window_inclusive_bounds() {
        let cycle = resolve_cycle(date(2024, 3, 20));
        let start = cycle.start.and_time(NaiveTime::MIN);
        let end = cycle.end.and_time(NaiveTime::MIN);

        let on_start = tx_at("a", 1.0, TransactionType::Debit, start);
        let before = tx_at("a", 2.0, TransactionType::Debit, start - Duration::seconds(1));
        let on_end = tx_at("a", 4.0, TransactionType::Debit, end);
        let after = tx_at("a", 8.0, TransactionType::Debit, end + Duration::seconds(1));
        let snapshot = vec![before, on_start.clone(), on_end.clone(), after];

        let window = cycle.window();
        let picked: Vec<&Transaction> = filter_transactions(&snapshot, "a", Some(&window)).collect();
        assert_eq!(picked, vec![&on_start, &on_end]);

        let (lines, total) = statement_lines(&snapshot, "a", &cycle).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(total, 5.0);
    }

    #[test]
    fn test_filter_without_window_keeps_order() {
        let snapshot = vec![
            tx_at("a", 1.0, TransactionType::Debit, noon(date(2024, 5, 1))),
            tx_at("b", 2.0, TransactionType::Debit, noon(date(2024, 3, 1))),
            tx_at("a", 3.0, TransactionType::Debit, noon(date(2024, 1, 1))),
        ];

        let amounts: Vec<f64> = filter_transactions(&snapshot, "a", None)
            .map(|t| t.amount)
            .collect();
        assert_eq!(amounts, vec![1.0, 3.0]);
    }

    #[test]
    fn test_statement_lists_credits_without_summing() {
        let user = User::new("Asha Rao", "a@example.com", "pw");
        let today = date(2024, 3, 20);
        let snapshot = vec![
            tx_at("a@example.com", 40.0, TransactionType::Debit, noon(date(2024, 3, 14))),
            tx_at("a@example.com", 15.0, TransactionType::Credit, noon(date(2024, 3, 15))),
            tx_at("a@example.com", 99.0, TransactionType::Debit, noon(date(2024, 2, 1))),
            tx_at("b@example.com", 7.0, TransactionType::Debit, noon(date(2024, 3, 16))),
        ];

        let statement = build_statement(&user, &snapshot, today).unwrap();
        assert_eq!(statement.cycle.start, date(2024, 3, 13));
        assert_eq!(statement.lines.len(), 2);
        assert_eq!(statement.total_due, 40.0);
        assert_eq!(statement.lines[0].date, "2024-03-14T12:00:00");
        assert_eq!(statement.lines[1].type_label(), "CREDIT");
    }

    #[test]
    fn test_statement_fails_fast_on_bad_timestamp() {
        let mut bad = tx_at("a", 1.0, TransactionType::Debit, noon(date(2024, 3, 14)));
        bad.timestamp = "yesterday".to_string();

        let cycle = resolve_cycle(date(2024, 3, 20));
        let err = statement_lines(&[bad], "a", &cycle).unwrap_err();
        assert!(matches!(err, LedgerError::Parse { field: "Timestamp", .. }));
    }

    #[test]
    fn test_display_description() {
        let exact = "a".repeat(33);
        assert_eq!(display_description(&exact), exact);

        let long = "Monthly groceries at the corner market";
        let shown = display_description(long);
        assert_eq!(shown, "Monthly groceries at the corne...");
        assert_eq!(shown.chars().count(), 33);

        // Multi-byte text is cut on character boundaries
        let accented = "é".repeat(40);
        assert_eq!(display_description(&accented).chars().count(), 33);
    }
}
