// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use chrono::Local;
use dues_ledger::{
    observability::{self, LogTarget},
    parse_amount, parse_date, statement::format_amount, AppConfig, Ledger, PdfStatementRenderer,
    SqliteLedger, TransactionType,
};
use std::env;
use std::fs::{self, File};

const USAGE: &str = "\
Usage: dues-ledger [COMMAND]

With no command the admin shell opens (requires the `tui` feature).

Commands:
  users                                     List users
  add-user <name> <email> <password>        Add a user
  remove-user <email>                       Remove a user (transactions are kept)
  add <email> <amount> <description> [--credit]
                                            Record a transaction (debit by default)
  list <email>                              List a user's transactions
  delete <id>                               Delete a transaction by id
  delete-range <start> <end>                Delete all transactions between two dates (YYYY-MM-DD)
  dues                                      Show all-time dues for every user
  statement <email> [YYYY-MM-DD]            Export the PDF statement for the cycle containing the date
  import-users <csv>                        Import users (Name,Email,Password)
  import-transactions <csv>                 Import transactions (UserEmail,Amount,Type,Description,Timestamp[,Id])
  export-csv <csv>                          Export every transaction to CSV

Environment:
  DUES_LEDGER_DB, DUES_LEDGER_STATEMENT_DIR, DUES_LEDGER_CREDIT_POLICY,
  DUES_LEDGER_LOG, DUES_LEDGER_LOG_FILE";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = AppConfig::from_env()?;

    if args.len() > 1 && (args[1] == "help" || args[1] == "--help" || args[1] == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let target = if args.len() > 1 {
        LogTarget::Console
    } else {
        LogTarget::FileOnly
    };
    observability::init(&config, target)?;

    let store = SqliteLedger::open(&config.db_path)
        .with_context(|| format!("opening ledger at {}", config.db_path.display()))?;
    let ledger = Ledger::with_config(store, &config);

    if args.len() > 1 {
        run_command(ledger, &config, &args[1..])
    } else {
        run_ui_mode(ledger, &config)
    }
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value.as_str()),
        None => bail!("missing <{}>\n\n{}", name, USAGE),
    }
}

fn run_command(mut ledger: Ledger<SqliteLedger>, config: &AppConfig, args: &[String]) -> Result<()> {
    match args[0].as_str() {
        "users" => {
            let users = ledger.users()?;
            println!("👥 {} users", users.len());
            for user in users {
                println!("  {:<25} {}", user.name, user.email);
            }
        }

        "add-user" => {
            let user = ledger.add_user(
                arg(args, 1, "name")?,
                arg(args, 2, "email")?,
                arg(args, 3, "password")?,
            )?;
            println!("✓ Added user {} ({})", user.name, user.email);
        }

        "remove-user" => {
            let email = arg(args, 1, "email")?;
            ledger.remove_user(email)?;
            println!("✓ Removed user {}", email);
        }

        "add" => {
            let email = arg(args, 1, "email")?;
            let amount = parse_amount(arg(args, 2, "amount")?)?;
            let description = arg(args, 3, "description")?;
            let kind = if args.iter().any(|a| a == "--credit") {
                TransactionType::Credit
            } else {
                TransactionType::Debit
            };

            // Unknown users are refused here; the store itself does not check
            ledger.find_user(email)?;
            match ledger.add_transaction(email, amount, kind, description)? {
                Some(tx) => println!("✓ Recorded {} {} for {} [{}]", kind, format_amount(amount), email, tx.id),
                None => println!("⚠️  Credit ignored (credit policy is {})", ledger.credit_policy()),
            }
        }

        "list" => {
            let email = arg(args, 1, "email")?;
            let transactions = ledger.user_transactions(email)?;
            println!("📋 {} transactions for {}", transactions.len(), email);
            for tx in transactions {
                println!(
                    "  {}  {:<6} {:>12}  {}  [{}]",
                    tx.timestamp.chars().take(19).collect::<String>(),
                    tx.transaction_type,
                    format_amount(tx.amount),
                    tx.description,
                    tx.id
                );
            }
        }

        "delete" => {
            let removed = ledger.delete_transaction(arg(args, 1, "id")?)?;
            println!(
                "✓ Deleted {} {} for {} ({})",
                removed.transaction_type,
                format_amount(removed.amount),
                removed.user_email,
                removed.timestamp
            );
        }

        "delete-range" => {
            let start = parse_date(arg(args, 1, "start")?)?;
            let end = parse_date(arg(args, 2, "end")?)?;
            let removed = ledger.delete_between(start, end)?;
            println!("✓ Deleted {} transactions between {} and {}", removed, start, end);
        }

        "dues" => {
            let report = ledger.dues_report()?;
            println!("💰 All Users Dues");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            for row in &report.rows {
                println!("  {:<25} {:<30} {:>12}", row.name, row.email, format_amount(row.due));
            }
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("  Total Due: {}", format_amount(report.total_due));
        }

        "statement" => {
            let email = arg(args, 1, "email")?;
            let today = match args.get(2) {
                Some(value) => parse_date(value)?,
                None => Local::now().date_naive(),
            };

            let exported = ledger.export_statement(email, today, &PdfStatementRenderer::new())?;
            fs::create_dir_all(&config.statement_dir)?;
            let path = config.statement_dir.join(&exported.filename);
            fs::write(&path, &exported.bytes)
                .with_context(|| format!("writing {}", path.display()))?;

            println!("🧾 Billing Period: {}", exported.statement.cycle.period_label());
            println!("   Due Date: {}", exported.statement.cycle.due_date);
            println!("   Lines: {}", exported.statement.lines.len());
            println!("   TOTAL DUE: {}", format_amount(exported.statement.total_due));
            println!("✓ Saved {}", path.display());
        }

        "import-users" => {
            let path = arg(args, 1, "csv")?;
            let file = File::open(path).with_context(|| format!("opening {}", path))?;
            let summary = ledger.import_users(file)?;
            println!("✓ Imported {} users ({} already known)", summary.inserted, summary.skipped);
        }

        "import-transactions" => {
            let path = arg(args, 1, "csv")?;
            let file = File::open(path).with_context(|| format!("opening {}", path))?;
            let summary = ledger.import_transactions(file)?;
            println!(
                "✓ Imported {} transactions ({} duplicates skipped)",
                summary.inserted, summary.skipped
            );
            println!("✓ Ledger contains {} transactions", ledger.store().transaction_count()?);
        }

        "export-csv" => {
            let path = arg(args, 1, "csv")?;
            let file = File::create(path).with_context(|| format!("creating {}", path))?;
            let count = ledger.export_transactions(file)?;
            println!("✓ Exported {} transactions to {}", count, path);
        }

        other => bail!("unknown command `{}`\n\n{}", other, USAGE),
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(ledger: Ledger<SqliteLedger>, config: &AppConfig) -> Result<()> {
    let mut app = ui::App::new(ledger, config.statement_dir.clone())?;
    ui::run_ui(&mut app)?;
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_ledger: Ledger<SqliteLedger>, _config: &AppConfig) -> Result<()> {
    eprintln!("❌ Admin shell not available. Build with --features tui");
    eprintln!("{}", USAGE);
    std::process::exit(1);
}
