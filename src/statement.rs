// 🧾 Statement Renderer - fixed-layout PDF for one billing cycle
//
// Layout (A4, millimetres, origin top-left in the comments, PDF is bottom-left):
//   header block : title, billing period, due date
//   table        : Date 50 | Type 30 | Amount 40 | Description 70, 10mm rows
//   footer       : TOTAL DUE line

use crate::billing::{BillingCycle, Statement, StatementLine};
use crate::db::User;
use crate::error::{LedgerError, Result};
use chrono::NaiveDate;
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point,
};

pub const CURRENCY_PREFIX: &str = "Rs.";

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 10.0;
const LINE_HEIGHT: f32 = 10.0;
const FONT_SIZE: f32 = 12.0;
/// Baseline offset inside a 10mm cell
const TEXT_INSET_X: f32 = 1.5;
const TEXT_INSET_Y: f32 = 6.5;

const COLUMNS: [(&str, f32); 4] = [
    ("Date", 50.0),
    ("Type", 30.0),
    ("Amount", 40.0),
    ("Description", 70.0),
];

/// Turns a statement into a downloadable byte stream
pub trait StatementRenderer {
    fn render(
        &self,
        user: &User,
        lines: &[StatementLine],
        cycle: &BillingCycle,
        total_due: f64,
    ) -> Result<Vec<u8>>;

    fn render_statement(&self, statement: &Statement) -> Result<Vec<u8>> {
        self.render(
            &statement.user,
            &statement.lines,
            &statement.cycle,
            statement.total_due,
        )
    }
}

/// `{Name}_due_{due date}.pdf`, spaces in the name become underscores
pub fn statement_filename(user_name: &str, due_date: NaiveDate) -> String {
    format!("{}_due_{}.pdf", user_name.replace(' ', "_"), due_date)
}

pub fn format_amount(amount: f64) -> String {
    format!("{}{:.2}", CURRENCY_PREFIX, amount)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfStatementRenderer;

impl PdfStatementRenderer {
    pub fn new() -> Self {
        PdfStatementRenderer
    }
}

/// Cursor over the current page, top-down in millimetres
struct PageCursor {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the top edge
    y: f32,
    pages: usize,
}

impl PageCursor {
    fn text(&self, text: &str, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(
            text,
            FONT_SIZE,
            Mm(x + TEXT_INSET_X),
            Mm(PAGE_HEIGHT - self.y - TEXT_INSET_Y),
            font,
        );
    }

    fn cell_border(&self, x: f32, width: f32) {
        let top = PAGE_HEIGHT - self.y;
        let bottom = top - LINE_HEIGHT;
        let border = Line {
            points: vec![
                (Point::new(Mm(x), Mm(top)), false),
                (Point::new(Mm(x + width), Mm(top)), false),
                (Point::new(Mm(x + width), Mm(bottom)), false),
                (Point::new(Mm(x), Mm(bottom)), false),
            ],
            is_closed: true,
        };
        self.layer.add_line(border);
    }

    fn row(&mut self, cells: [&str; 4], bold: bool) {
        if self.y + LINE_HEIGHT > PAGE_HEIGHT - MARGIN {
            self.new_page();
            self.header_row();
        }

        let mut x = MARGIN;
        for ((_, width), text) in COLUMNS.iter().zip(cells) {
            self.cell_border(x, *width);
            self.text(text, x, bold);
            x += width;
        }
        self.y += LINE_HEIGHT;
    }

    fn header_row(&mut self) {
        let titles = COLUMNS.map(|(title, _)| title);
        self.row(titles, true);
    }

    fn line(&mut self, text: &str, bold: bool) {
        if self.y + LINE_HEIGHT > PAGE_HEIGHT - MARGIN {
            self.new_page();
        }
        self.text(text, MARGIN, bold);
        self.y += LINE_HEIGHT;
    }

    fn new_page(&mut self) {
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Layer {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.layer.set_outline_thickness(0.3);
        self.y = MARGIN;
    }
}

impl StatementRenderer for PdfStatementRenderer {
    fn render(
        &self,
        user: &User,
        lines: &[StatementLine],
        cycle: &BillingCycle,
        total_due: f64,
    ) -> Result<Vec<u8>> {
        let title = format!("Statement for {} ({})", user.name, user.email);
        let (doc, page, layer) =
            PdfDocument::new(title.as_str(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");

        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| LedgerError::Render(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| LedgerError::Render(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);
        layer.set_outline_thickness(0.3);

        let mut cursor = PageCursor {
            doc,
            layer,
            regular,
            bold,
            y: MARGIN,
            pages: 1,
        };

        cursor.line(&title, false);
        cursor.line(&format!("Billing Period: {}", cycle.period_label()), false);
        cursor.line(&format!("Due Date: {}", cycle.due_date), false);
        cursor.y += LINE_HEIGHT;

        cursor.header_row();
        for item in lines {
            let kind = item.type_label();
            let amount = format_amount(item.amount);
            cursor.row(
                [item.date.as_str(), kind.as_str(), amount.as_str(), item.description.as_str()],
                false,
            );
        }

        cursor.y += LINE_HEIGHT / 2.0;
        cursor.line(&format!("TOTAL DUE: {}", format_amount(total_due)), true);

        cursor
            .doc
            .save_to_bytes()
            .map_err(|e| LedgerError::Render(e.to_string()))
    }
}
