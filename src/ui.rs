use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dues_ledger::{
    parse_amount, parse_date, statement::format_amount, DuesReport, Ledger, LedgerStore,
    PdfStatementRenderer, Transaction, TransactionType, User,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    AddTransaction,
    ViewTransactions,
    ExportStatement,
    AllUserDues,
    DeleteBetweenDates,
}

const PAGES: [Page; 5] = [
    Page::AddTransaction,
    Page::ViewTransactions,
    Page::ExportStatement,
    Page::AllUserDues,
    Page::DeleteBetweenDates,
];

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::AddTransaction => Page::ViewTransactions,
            Page::ViewTransactions => Page::ExportStatement,
            Page::ExportStatement => Page::AllUserDues,
            Page::AllUserDues => Page::DeleteBetweenDates,
            Page::DeleteBetweenDates => Page::AddTransaction,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::AddTransaction => Page::DeleteBetweenDates,
            Page::ViewTransactions => Page::AddTransaction,
            Page::ExportStatement => Page::ViewTransactions,
            Page::AllUserDues => Page::ExportStatement,
            Page::DeleteBetweenDates => Page::AllUserDues,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::AddTransaction => "Add Transaction",
            Page::ViewTransactions => "View Transactions",
            Page::ExportStatement => "Export Statement",
            Page::AllUserDues => "All User Dues",
            Page::DeleteBetweenDates => "Delete Between Dates",
        }
    }

    /// Pages with text inputs take printable keys
    fn has_form(&self) -> bool {
        matches!(self, Page::AddTransaction | Page::DeleteBetweenDates)
    }
}

/// Two-field text form
#[derive(Debug, Clone, Default)]
pub struct Form {
    pub values: [String; 2],
    pub focus: usize,
}

impl Form {
    fn push(&mut self, c: char) {
        self.values[self.focus].push(c);
    }

    fn pop(&mut self) {
        self.values[self.focus].pop();
    }

    fn toggle_focus(&mut self) {
        self.focus = 1 - self.focus;
    }

    fn clear(&mut self) {
        self.values = Default::default();
        self.focus = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub message: String,
    pub is_error: bool,
}

pub struct App<S: LedgerStore> {
    pub ledger: Ledger<S>,
    pub statement_dir: PathBuf,
    pub users: Vec<User>,
    /// One selection shared by every page
    pub selected_user: usize,
    pub current_page: Page,
    pub transactions: Vec<Transaction>,
    pub state: TableState,
    pub dues: DuesReport,
    pub add_form: Form,
    pub range_form: Form,
    pub status: Option<Status>,
}

impl<S: LedgerStore> App<S> {
    pub fn new(ledger: Ledger<S>, statement_dir: PathBuf) -> dues_ledger::Result<Self> {
        let mut app = Self {
            ledger,
            statement_dir,
            users: Vec::new(),
            selected_user: 0,
            current_page: Page::AddTransaction,
            transactions: Vec::new(),
            state: TableState::default(),
            dues: DuesReport {
                rows: Vec::new(),
                total_due: 0.0,
            },
            add_form: Form::default(),
            range_form: Form::default(),
            status: None,
        };
        app.refresh()?;
        Ok(app)
    }

    /// Re-read users, the selected user's transactions and the dues view
    pub fn refresh(&mut self) -> dues_ledger::Result<()> {
        self.users = self.ledger.users()?;
        if self.selected_user >= self.users.len() {
            self.selected_user = 0;
        }

        self.transactions = match self.current_user() {
            Some(user) => self.ledger.user_transactions(&user.email)?,
            None => Vec::new(),
        };
        self.dues = self.ledger.dues_report()?;

        match self.state.selected() {
            _ if self.transactions.is_empty() => self.state.select(None),
            Some(i) if i >= self.transactions.len() => {
                self.state.select(Some(self.transactions.len() - 1))
            }
            None => self.state.select(Some(0)),
            Some(_) => {}
        }
        Ok(())
    }

    pub fn current_user(&self) -> Option<&User> {
        self.users.get(self.selected_user)
    }

    pub fn selected_transaction(&self) -> Option<&Transaction> {
        self.state.selected().and_then(|i| self.transactions.get(i))
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn next_user(&mut self) {
        if self.users.is_empty() {
            return;
        }
        self.selected_user = (self.selected_user + 1) % self.users.len();
        self.state.select(None);
        let result = self.refresh();
        self.report(result);
    }

    pub fn previous_user(&mut self) {
        if self.users.is_empty() {
            return;
        }
        self.selected_user = (self.selected_user + self.users.len() - 1) % self.users.len();
        self.state.select(None);
        let result = self.refresh();
        self.report(result);
    }

    pub fn next(&mut self) {
        let len = self.transactions.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.transactions.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    fn active_form(&mut self) -> Option<&mut Form> {
        match self.current_page {
            Page::AddTransaction => Some(&mut self.add_form),
            Page::DeleteBetweenDates => Some(&mut self.range_form),
            _ => None,
        }
    }

    pub fn type_char(&mut self, c: char) {
        if let Some(form) = self.active_form() {
            form.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if let Some(form) = self.active_form() {
            form.pop();
        }
    }

    pub fn toggle_focus(&mut self) {
        if let Some(form) = self.active_form() {
            form.toggle_focus();
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(Status {
            message: message.into(),
            is_error: false,
        });
    }

    fn report(&mut self, result: dues_ledger::Result<()>) {
        if let Err(e) = result {
            error!(error = %e, "admin action failed");
            self.status = Some(Status {
                message: e.to_string(),
                is_error: true,
            });
        }
    }

    /// Enter on the current page
    pub fn submit(&mut self) {
        let result = match self.current_page {
            Page::AddTransaction => self.submit_transaction(),
            Page::ExportStatement => self.export_statement(),
            Page::DeleteBetweenDates => self.submit_range_delete(),
            Page::ViewTransactions | Page::AllUserDues => self.refresh(),
        };
        self.report(result);
    }

    fn submit_transaction(&mut self) -> dues_ledger::Result<()> {
        let email = match self.current_user() {
            Some(user) => user.email.clone(),
            None => return Err(dues_ledger::LedgerError::not_found("user", "(none selected)")),
        };
        let amount = parse_amount(&self.add_form.values[0])?;
        let description = self.add_form.values[1].trim().to_string();

        // The form only records debits
        self.ledger
            .add_transaction(&email, amount, TransactionType::Debit, &description)?;
        self.add_form.clear();
        self.refresh()?;
        self.set_status("Transaction added");
        Ok(())
    }

    pub fn delete_selected(&mut self) {
        let id = match self.selected_transaction() {
            Some(tx) => tx.id.clone(),
            None => return,
        };
        let result = self.ledger.delete_transaction(&id).and_then(|_| self.refresh());
        if result.is_ok() {
            self.set_status("Transaction deleted");
        }
        self.report(result);
    }

    fn export_statement(&mut self) -> dues_ledger::Result<()> {
        let email = match self.current_user() {
            Some(user) => user.email.clone(),
            None => return Err(dues_ledger::LedgerError::not_found("user", "(none selected)")),
        };
        let today = Local::now().date_naive();
        let exported = self
            .ledger
            .export_statement(&email, today, &PdfStatementRenderer::new())?;

        fs::create_dir_all(&self.statement_dir)?;
        let path = self.statement_dir.join(&exported.filename);
        fs::write(&path, &exported.bytes)?;
        self.set_status(format!("Statement saved to {}", path.display()));
        Ok(())
    }

    fn submit_range_delete(&mut self) -> dues_ledger::Result<()> {
        let start = parse_date(&self.range_form.values[0])?;
        let end = parse_date(&self.range_form.values[1])?;
        let removed = self.ledger.delete_between(start, end)?;
        self.range_form.clear();
        self.refresh()?;
        self.set_status(format!("{} transactions deleted", removed));
        Ok(())
    }

    /// Returns false when the app should exit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            return false;
        }

        match key.code {
            KeyCode::Tab => self.next_page(),
            KeyCode::BackTab => self.previous_page(),
            KeyCode::Left => self.previous_user(),
            KeyCode::Right => self.next_user(),
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Up | KeyCode::Down if self.current_page.has_form() => self.toggle_focus(),
            KeyCode::Char(c) if self.current_page.has_form() => self.type_char(c),
            KeyCode::Char('q') => return false,
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Char('d') if self.current_page == Page::ViewTransactions => {
                self.delete_selected()
            }
            KeyCode::Char('r') => {
                let result = self.refresh();
                self.report(result);
            }
            _ => {}
        }
        true
    }
}

pub fn run_ui<S: LedgerStore>(app: &mut App<S>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend, S: LedgerStore>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != event::KeyEventKind::Press {
                continue;
            }
            if !app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

fn ui<S: LedgerStore>(f: &mut Frame, app: &mut App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tabs + selected user
            Constraint::Min(0),    // Page content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::AddTransaction => render_form(
            f,
            chunks[1],
            &app.add_form,
            ["Amount", "Description"],
            " Add Transaction (debit) ",
        ),
        Page::ViewTransactions => render_transactions(f, chunks[1], app),
        Page::ExportStatement => render_export(f, chunks[1], app),
        Page::AllUserDues => render_dues(f, chunks[1], &app.dues),
        Page::DeleteBetweenDates => render_form(
            f,
            chunks[1],
            &app.range_form,
            ["Start Date (YYYY-MM-DD)", "End Date (YYYY-MM-DD)"],
            " Delete Transactions Between Two Dates ",
        ),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header<S: LedgerStore>(f: &mut Frame, area: Rect, app: &App<S>) {
    let mut tab_spans = vec![];
    for (i, page) in PAGES.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title(), style));
    }

    tab_spans.push(Span::raw("  |  User: "));
    let user_label = match app.current_user() {
        Some(user) => format!("◀ {} ({}) ▶", user.name, user.email),
        None => "no users".to_string(),
    };
    tab_spans.push(Span::styled(user_label, Style::default().fg(Color::Cyan)));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_form(f: &mut Frame, area: Rect, form: &Form, labels: [&str; 2], title: &str) {
    let mut content = vec![Line::from("")];

    for (i, label) in labels.iter().enumerate() {
        let focused = form.focus == i;
        let marker = if focused { "→ " } else { "  " };
        let cursor = if focused { "█" } else { "" };
        content.push(Line::from(vec![
            Span::styled(
                format!("  {}{}: ", marker, label),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("{}{}", form.values[i], cursor)),
        ]));
        content.push(Line::from(""));
    }

    content.push(Line::from(vec![Span::styled(
        "  ↑/↓ switch field, Enter to submit",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )]));

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title.to_string()),
    );

    f.render_widget(paragraph, area);
}

fn header_row<'a>(titles: &[&'a str]) -> Row<'a> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn type_color(kind: TransactionType) -> Color {
    match kind {
        TransactionType::Debit => Color::Red,
        TransactionType::Credit => Color::Green,
    }
}

fn render_transactions<S: LedgerStore>(f: &mut Frame, area: Rect, app: &mut App<S>) {
    let rows = app.transactions.iter().map(|tx| {
        let color = type_color(tx.transaction_type);
        Row::new(vec![
            Cell::from(tx.timestamp.chars().take(19).collect::<String>()),
            Cell::from(tx.transaction_type.as_str().to_uppercase())
                .style(Style::default().fg(color)),
            Cell::from(format_amount(tx.amount)).style(Style::default().fg(color)),
            Cell::from(tx.description.clone()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(21),
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Min(20),
        ],
    )
    .header(header_row(&["Date", "Type", "Amount", "Description"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Transactions (d: delete selected) "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_export<S: LedgerStore>(f: &mut Frame, area: Rect, app: &App<S>) {
    let today = Local::now().date_naive();
    let cycle = dues_ledger::resolve_cycle(today);

    let content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Billing Period: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw(cycle.period_label()),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Due Date: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw(cycle.due_date.to_string()),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Output Folder: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw(app.statement_dir.display().to_string()),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  Press Enter to export the PDF statement for the selected user",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )]),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Export Statement "),
    );

    f.render_widget(paragraph, area);
}

fn render_dues(f: &mut Frame, area: Rect, dues: &DuesReport) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let rows = dues.rows.iter().map(|row| {
        let color = if row.due > 0.0 { Color::Red } else { Color::Green };
        Row::new(vec![
            Cell::from(row.name.clone()),
            Cell::from(row.email.clone()),
            Cell::from(format_amount(row.due)).style(Style::default().fg(color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(25),
            Constraint::Length(32),
            Constraint::Length(16),
        ],
    )
    .header(header_row(&["Name", "Email", "Due"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" All Users Dues "),
    );

    f.render_widget(table, chunks[0]);

    let total = Paragraph::new(Line::from(vec![Span::styled(
        format!(" Total Due: {}", format_amount(dues.total_due)),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(total, chunks[1]);
}

fn render_status_bar<S: LedgerStore>(f: &mut Frame, area: Rect, app: &App<S>) {
    let mut status_spans = vec![];

    if let Some(status) = &app.status {
        let color = if status.is_error { Color::Red } else { Color::Green };
        status_spans.push(Span::styled(
            format!(" {} ", status.message),
            Style::default().fg(color),
        ));
        status_spans.push(Span::raw(" | "));
    }

    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("←/→", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" User | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Run | "));
    status_spans.push(Span::styled("Esc", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dues_ledger::InMemoryLedger;

    fn app() -> App<InMemoryLedger> {
        let mut ledger = Ledger::new(InMemoryLedger::new());
        ledger.add_user("Asha Rao", "asha@example.com", "pw").unwrap();
        ledger.add_user("Ben Ito", "ben@example.com", "pw").unwrap();
        App::new(ledger, std::env::temp_dir()).unwrap()
    }

    fn press(app: &mut App<InMemoryLedger>, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App<InMemoryLedger>, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_page_cycle() {
        let mut page = Page::AddTransaction;
        for _ in 0..PAGES.len() {
            page = page.next();
        }
        assert_eq!(page, Page::AddTransaction);
        assert_eq!(Page::AddTransaction.previous(), Page::DeleteBetweenDates);
    }

    #[test]
    fn test_add_transaction_through_form() {
        let mut app = app();
        type_text(&mut app, "120.50");
        press(&mut app, KeyCode::Down);
        type_text(&mut app, "Groceries");
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.status.as_ref().map(|s| s.is_error), Some(false));
        assert_eq!(app.transactions.len(), 1);
        assert_eq!(app.transactions[0].amount, 120.5);
        assert_eq!(app.transactions[0].description, "Groceries");
        assert_eq!(app.dues.total_due, 120.5);
        assert!(app.add_form.values[0].is_empty());
    }

    #[test]
    fn test_bad_amount_shows_error() {
        let mut app = app();
        type_text(&mut app, "twelve");
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.status.as_ref().map(|s| s.is_error), Some(true));
        assert!(app.transactions.is_empty());
    }

    #[test]
    fn test_user_selection_shared_across_pages() {
        let mut app = app();
        press(&mut app, KeyCode::Right);
        assert_eq!(app.current_user().unwrap().email, "ben@example.com");

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.current_page, Page::ViewTransactions);
        assert_eq!(app.current_user().unwrap().email, "ben@example.com");

        press(&mut app, KeyCode::Right);
        assert_eq!(app.selected_user, 0);
    }

    #[test]
    fn test_delete_selected_transaction() {
        let mut app = app();
        type_text(&mut app, "10");
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "20");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.transactions.len(), 2);

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Down);
        let target = app.selected_transaction().unwrap().id.clone();
        press(&mut app, KeyCode::Char('d'));

        assert_eq!(app.transactions.len(), 1);
        assert!(app.transactions.iter().all(|t| t.id != target));
    }

    #[test]
    fn test_quit_keys() {
        let mut app = app();
        // 'q' is text on form pages
        assert!(press(&mut app, KeyCode::Char('q')));
        press(&mut app, KeyCode::Tab);
        assert!(!press(&mut app, KeyCode::Char('q')));
        assert!(!press(&mut app, KeyCode::Esc));
    }
}
