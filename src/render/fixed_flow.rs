use std::sync::Arc;

use printpdf::image_crate::DynamicImage;
use sha2::{Digest, Sha256};
use time::Date;

use super::metrics::FontMetrics;
use super::{Align, Heading, Line, LinkNode, Node, RenderTree, Section, SignatureBlock, Table, TotalRow};
use crate::error::RenderError;
use crate::validate::decode_logo_data_uri;

// Layout constants (millimeters, A4, bottom-left origin like the PDF itself)
pub(crate) const PAGE_W: f32 = 210.0;
pub(crate) const PAGE_H: f32 = 297.0;
const PAGE_MARGIN_X: f32 = 15.0;
const PAGE_MARGIN_TOP: f32 = 12.0;
const PAGE_MARGIN_BOTTOM: f32 = 12.0;
const FOOTER_H: f32 = 8.0;

const CONTENT_LEFT: f32 = PAGE_MARGIN_X;
const CONTENT_RIGHT: f32 = PAGE_W - PAGE_MARGIN_X;
const CONTENT_W: f32 = CONTENT_RIGHT - CONTENT_LEFT;
const CONTENT_TOP: f32 = PAGE_H - PAGE_MARGIN_TOP;
const CONTENT_BOTTOM: f32 = PAGE_MARGIN_BOTTOM + FOOTER_H;

const TEXT_SIZE: f32 = 8.8;
const TITLE_SIZE: f32 = 9.6;
const LINE_H: f32 = 4.2;
const BLOCK_GAP: f32 = 7.0;
const COLUMN_GAP: f32 = 10.0;
const CELL_PAD_X: f32 = 1.2;
const CELL_PAD_Y: f32 = 1.4;

const HEADING_SIZE: f32 = 20.0;
const LOGO_BOX_W: f32 = 45.0;
const LOGO_BOX_H: f32 = 22.0;
pub(crate) const LOGO_DPI: f32 = 300.0;

const TABLE_HEADER_SIZE: f32 = 8.6;
const TABLE_HEADER_H: f32 = 7.0;
const TOTALS_W: f32 = 80.0;
const TOTALS_ROW_H: f32 = 6.4;
const SIGNATURE_RULE_W: f32 = 50.0;

/// One positioned drawing instruction.
#[derive(Debug, Clone)]
pub enum DrawOp {
    /// `y` is the text baseline.
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        thickness: f32,
    },
    FillRect {
        x: f32,
        y_top: f32,
        w: f32,
        h: f32,
        gray: f32,
    },
    Image {
        image: Arc<DynamicImage>,
        x: f32,
        y: f32,
        scale: f32,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

/// The tree placed onto A4 pages, ready for PDF serialization.
#[derive(Debug, Clone)]
pub struct PagedDocument {
    pub title: String,
    pub issue_date: Date,
    pub pages: Vec<Page>,
    pub(crate) font: FontMetrics,
}

impl PagedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Every text run in drawing order, footers included.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flat_map(|p| {
            p.ops.iter().filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
        })
    }

    /// Hex SHA-256 over everything that ends up on the pages; used as the PDF document id.
    pub fn content_hash(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.title.as_bytes());
        h.update(crate::dates::iso_date(self.issue_date).as_bytes());
        for (i, page) in self.pages.iter().enumerate() {
            h.update(format!("page {i}").as_bytes());
            for op in &page.ops {
                match op {
                    DrawOp::Text {
                        x,
                        y,
                        size,
                        bold,
                        text,
                    } => {
                        h.update(format!("T{x:.3},{y:.3},{size},{bold}").as_bytes());
                        h.update(text.as_bytes());
                    }
                    DrawOp::Rule { x1, x2, y, thickness } => {
                        h.update(format!("R{x1:.3},{x2:.3},{y:.3},{thickness}").as_bytes());
                    }
                    DrawOp::FillRect { x, y_top, w, h: rh, gray } => {
                        h.update(format!("F{x:.3},{y_top:.3},{w:.3},{rh:.3},{gray}").as_bytes());
                    }
                    DrawOp::Image { image, x, y, scale } => {
                        h.update(
                            format!("I{x:.3},{y:.3},{scale},{}x{}", image.width(), image.height())
                                .as_bytes(),
                        );
                        h.update(image.as_bytes());
                    }
                }
            }
        }
        hex::encode(h.finalize())
    }
}

/// One printed line of a block: text runs at x offsets from the block's left edge.
#[derive(Debug, Clone, Default)]
struct Row {
    runs: Vec<Run>,
}

#[derive(Debug, Clone)]
struct Run {
    dx: f32,
    size: f32,
    bold: bool,
    text: String,
}

impl Row {
    fn single(text: String, size: f32, bold: bool) -> Self {
        Row {
            runs: vec![Run {
                dx: 0.0,
                size,
                bold,
                text,
            }],
        }
    }
}

struct Layout<'a> {
    metrics: &'a FontMetrics,
    stop: &'a dyn Fn() -> bool,
    pages: Vec<Page>,
    ops: Vec<DrawOp>,
    /// Top of the free area on the current page.
    y: f32,
}

impl<'a> Layout<'a> {
    fn new(metrics: &'a FontMetrics, stop: &'a dyn Fn() -> bool) -> Self {
        Layout {
            metrics,
            stop,
            pages: Vec::new(),
            ops: Vec::new(),
            y: CONTENT_TOP,
        }
    }

    fn push_line(&mut self, text: &str, size: f32, bold: bool, x: f32, y: f32) {
        if text.is_empty() {
            return;
        }
        self.ops.push(DrawOp::Text {
            x,
            y,
            size,
            bold,
            text: text.to_string(),
        });
    }

    fn push_line_right(&mut self, text: &str, size: f32, bold: bool, x_right: f32, y: f32) {
        let w = self.metrics.text_width_mm(text, size, bold);
        self.push_line(text, size, bold, (x_right - w).max(0.0), y);
    }

    fn push_line_centered(&mut self, text: &str, size: f32, bold: bool, x_mid: f32, y: f32) {
        let w = self.metrics.text_width_mm(text, size, bold);
        self.push_line(text, size, bold, x_mid - w / 2.0, y);
    }

    fn draw_rule_with_thickness(&mut self, x1: f32, x2: f32, y: f32, thickness: f32) {
        self.ops.push(DrawOp::Rule { x1, x2, y, thickness });
    }

    fn fill_rect_gray(&mut self, x: f32, y_top: f32, w: f32, h: f32, gray: f32) {
        self.ops.push(DrawOp::FillRect { x, y_top, w, h, gray });
    }

    fn baseline(&self, top: f32, size: f32) -> f32 {
        top - self.metrics.ascent_mm(size) - 0.6
    }

    fn new_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages.push(Page { ops });
        self.y = CONTENT_TOP;
    }

    /// Starts a new page unless `h` fits below the cursor; returns whether a break happened.
    /// Blocks taller than a whole page are placed anyway and split by the caller.
    fn ensure(&mut self, h: f32) -> bool {
        let fresh = self.y >= CONTENT_TOP;
        if self.y - h < CONTENT_BOTTOM && !fresh {
            self.new_page();
            return true;
        }
        false
    }

    fn check_stop(&self) -> Result<(), RenderError> {
        if (self.stop)() {
            Err(RenderError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn gap(&mut self) {
        self.y -= BLOCK_GAP;
    }

    /// Wraps one semantic line to `width`, producing the printed rows.
    fn line_rows(&self, line: &Line, width: f32) -> Vec<Row> {
        let m = self.metrics;
        match line {
            Line::Strong(t) => m
                .wrap(t, TEXT_SIZE + 0.6, true, width)
                .into_iter()
                .map(|s| Row::single(s, TEXT_SIZE + 0.6, true))
                .collect(),
            Line::Paragraph(t) => t
                .lines()
                .flat_map(|l| m.wrap(l, TEXT_SIZE, false, width))
                .map(|s| Row::single(s, TEXT_SIZE, false))
                .collect(),
            Line::KeyValue { key, value } => {
                // exactly one space after the colon
                let prefix = format!("{}: ", key);
                let prefix_w = m.text_width_mm(&prefix, TEXT_SIZE, true);
                let value_w = (width - prefix_w).max(6.0);
                let mut values = m.wrap(value, TEXT_SIZE, false, value_w).into_iter();

                let mut first = Row::single(prefix, TEXT_SIZE, true);
                if let Some(v) = values.next() {
                    first.runs.push(Run {
                        dx: prefix_w,
                        size: TEXT_SIZE,
                        bold: false,
                        text: v,
                    });
                }
                let mut rows = vec![first];
                rows.extend(values.map(|v| Row {
                    runs: vec![Run {
                        dx: prefix_w,
                        size: TEXT_SIZE,
                        bold: false,
                        text: v,
                    }],
                }));
                rows
            }
        }
    }

    fn section_rows(&self, section: &Section, width: f32) -> Vec<Row> {
        let mut rows = Vec::new();
        if let Some(title) = &section.title {
            rows.extend(
                self.metrics
                    .wrap(title, TITLE_SIZE, true, width)
                    .into_iter()
                    .map(|t| Row::single(t, TITLE_SIZE, true)),
            );
        }
        for line in &section.lines {
            rows.extend(self.line_rows(line, width));
        }
        rows
    }

    fn draw_row(&mut self, row: &Row, x: f32, top: f32) {
        for run in &row.runs {
            let y = self.baseline(top, run.size);
            self.push_line(&run.text, run.size, run.bold, x + run.dx, y);
        }
    }

    /// Places side-by-side columns; kept on one page unless taller than a page.
    fn columns(&mut self, sections: &[Section]) -> Result<(), RenderError> {
        if sections.is_empty() {
            return Ok(());
        }
        let n = sections.len() as f32;
        let col_w = (CONTENT_W - COLUMN_GAP * (n - 1.0)) / n;
        let laid: Vec<Vec<Row>> = sections.iter().map(|s| self.section_rows(s, col_w)).collect();
        let max_rows = laid.iter().map(Vec::len).max().unwrap_or(0);
        if max_rows == 0 {
            return Ok(());
        }

        self.ensure(max_rows as f32 * LINE_H);
        for i in 0..max_rows {
            self.check_stop()?;
            self.ensure(LINE_H);
            let top = self.y;
            for (c, rows) in laid.iter().enumerate() {
                if let Some(row) = rows.get(i) {
                    let x = CONTENT_LEFT + c as f32 * (col_w + COLUMN_GAP);
                    self.draw_row(row, x, top);
                }
            }
            self.y -= LINE_H;
        }
        self.gap();
        Ok(())
    }

    fn heading(&mut self, heading: &Heading) {
        let top = self.y;
        let title_base = self.baseline(top, HEADING_SIZE);
        self.push_line(&heading.title, HEADING_SIZE, true, CONTENT_LEFT, title_base);
        let number_top = top - self.metrics.ascent_mm(HEADING_SIZE) - 3.0;
        let number_base = self.baseline(number_top, TEXT_SIZE + 1.0);
        self.push_line(&heading.number, TEXT_SIZE + 1.0, false, CONTENT_LEFT, number_base);
        let left_bottom = number_top - LINE_H - 1.0;

        let mut right_top = top;
        if let Some(img) = heading.logo.as_ref().and_then(|l| decode_logo(&l.data_uri)) {
            let px_w = img.width().max(1) as f32;
            let px_h = img.height().max(1) as f32;
            let natural_w_mm = px_w / LOGO_DPI * 25.4;
            let natural_h_mm = px_h / LOGO_DPI * 25.4;

            // contain within the logo box, right-aligned, top-aligned with the title
            let scale = (LOGO_BOX_W / natural_w_mm)
                .min(LOGO_BOX_H / natural_h_mm)
                .max(0.01);
            let w = natural_w_mm * scale;
            let h = natural_h_mm * scale;
            self.ops.push(DrawOp::Image {
                image: Arc::new(img),
                x: CONTENT_RIGHT - w,
                y: top - h,
                scale,
            });
            right_top = top - h - 2.0;
        }

        let name_size = TEXT_SIZE + 3.0;
        let name_rows = self
            .metrics
            .wrap(&heading.seller_name, name_size, true, LOGO_BOX_W + 20.0);
        let mut row_top = right_top;
        for row in &name_rows {
            let base = self.baseline(row_top, name_size);
            self.push_line_right(row, name_size, true, CONTENT_RIGHT, base);
            row_top -= LINE_H + 0.8;
        }

        self.y = left_bottom.min(row_top);
        self.draw_rule_with_thickness(CONTENT_LEFT, CONTENT_RIGHT, self.y, 0.85);
        self.y -= 1.0;
        self.gap();
    }

    fn section(&mut self, section: &Section) -> Result<(), RenderError> {
        self.columns(std::slice::from_ref(section))
    }

    fn table_header(&mut self, table: &Table, xs: &[(f32, f32)]) {
        let top = self.y;
        self.fill_rect_gray(CONTENT_LEFT, top, CONTENT_W, TABLE_HEADER_H, 0.92);
        let base = top - TABLE_HEADER_H / 2.0 - self.metrics.ascent_mm(TABLE_HEADER_SIZE) / 2.0 + 0.3;
        for (col, (left, right)) in table.columns.iter().zip(xs) {
            match col.align {
                Align::Left => self.push_line(&col.label, TABLE_HEADER_SIZE, true, left + CELL_PAD_X, base),
                Align::Right => {
                    self.push_line_right(&col.label, TABLE_HEADER_SIZE, true, right - CELL_PAD_X, base)
                }
            }
        }
        self.draw_rule_with_thickness(CONTENT_LEFT, CONTENT_RIGHT, top, 0.45);
        self.y -= TABLE_HEADER_H;
        self.draw_rule_with_thickness(CONTENT_LEFT, CONTENT_RIGHT, self.y, 0.60);
    }

    /// Item table; the header repeats at the top of every continuation page.
    fn table(&mut self, table: &Table) -> Result<(), RenderError> {
        let total_share: f32 = table.columns.iter().map(|c| c.width).sum::<f32>().max(f32::EPSILON);
        let mut xs = Vec::with_capacity(table.columns.len());
        let mut left = CONTENT_LEFT;
        for col in &table.columns {
            let w = CONTENT_W * col.width / total_share;
            xs.push((left, left + w));
            left += w;
        }

        // header plus at least one row stay together
        self.ensure(TABLE_HEADER_H + LINE_H + 2.0 * CELL_PAD_Y);
        self.table_header(table, &xs);

        for row in &table.rows {
            self.check_stop()?;

            let cells: Vec<Vec<String>> = row
                .cells
                .iter()
                .zip(table.columns.iter().zip(&xs))
                .map(|(cell, (col, (l, r)))| match col.align {
                    Align::Left => self.metrics.wrap(cell, TEXT_SIZE, false, r - l - 2.0 * CELL_PAD_X),
                    // numbers are never wrapped so both renderings print the same string
                    Align::Right => vec![cell.clone()],
                })
                .collect();
            let lines = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
            let row_h = lines as f32 * LINE_H + 2.0 * CELL_PAD_Y;

            if self.ensure(row_h) {
                self.table_header(table, &xs);
            }

            let top = self.y - CELL_PAD_Y;
            for ((col, (l, r)), cell_lines) in table.columns.iter().zip(&xs).zip(&cells) {
                for (i, text) in cell_lines.iter().enumerate() {
                    let base = self.baseline(top - i as f32 * LINE_H, TEXT_SIZE);
                    match col.align {
                        Align::Left => self.push_line(text, TEXT_SIZE, false, l + CELL_PAD_X, base),
                        Align::Right => self.push_line_right(text, TEXT_SIZE, false, r - CELL_PAD_X, base),
                    }
                }
            }
            self.y -= row_h;
            self.draw_rule_with_thickness(CONTENT_LEFT, CONTENT_RIGHT, self.y, 0.25);
        }

        self.gap();
        Ok(())
    }

    fn totals(&mut self, rows: &[TotalRow]) {
        self.ensure(rows.len() as f32 * TOTALS_ROW_H + 2.0);
        let label_x = CONTENT_RIGHT - TOTALS_W;
        for row in rows {
            let size = if row.emphasized { TEXT_SIZE + 1.8 } else { TEXT_SIZE };
            if row.emphasized {
                self.draw_rule_with_thickness(label_x, CONTENT_RIGHT, self.y, 0.6);
                self.y -= 1.0;
            }
            let base = self.baseline(self.y - 1.0, size);
            self.push_line(&row.label, size, row.emphasized, label_x, base);
            self.push_line_right(&row.value, size, true, CONTENT_RIGHT - CELL_PAD_X, base);
            self.y -= TOTALS_ROW_H;
        }
        self.gap();
    }

    fn signature(&mut self, sig: &SignatureBlock) {
        let h = 13.5 + 2.0 * LINE_H + 1.0;
        self.ensure(h);
        let right = CONTENT_RIGHT;
        let left = right - SIGNATURE_RULE_W;
        let mid = (left + right) / 2.0;

        let caption_base = self.baseline(self.y, TEXT_SIZE - 0.8);
        self.push_line_centered(&sig.caption, TEXT_SIZE - 0.8, false, mid, caption_base);
        self.y -= 12.0;
        self.draw_rule_with_thickness(left, right, self.y, 0.4);
        self.y -= 1.5;
        let name_base = self.baseline(self.y, TEXT_SIZE + 0.6);
        self.push_line_centered(&sig.name, TEXT_SIZE + 0.6, true, mid, name_base);
        self.y -= LINE_H;
        let title_base = self.baseline(self.y, TEXT_SIZE - 0.8);
        self.push_line_centered(&sig.title, TEXT_SIZE - 0.8, false, mid, title_base);
        self.y -= LINE_H;
        self.gap();
    }

    fn link(&mut self, link: &LinkNode) -> Result<(), RenderError> {
        self.section(&Section {
            title: None,
            lines: vec![Line::KeyValue {
                key: link.label.clone(),
                value: link.url.clone(),
            }],
        })
    }

    /// Closes the last page and stamps `Page n / N` on every page.
    fn finish(mut self, page_label: &str) -> Vec<Page> {
        self.new_page();
        let n = self.pages.len();
        let y = PAGE_MARGIN_BOTTOM;
        let size = 7.5;
        for (i, page) in self.pages.iter_mut().enumerate() {
            let text = format!("{} {} / {}", page_label, i + 1, n);
            let w = self.metrics.text_width_mm(&text, size, false);
            page.ops.push(DrawOp::Text {
                x: CONTENT_RIGHT - w,
                y,
                size,
                bold: false,
                text,
            });
        }
        self.pages
    }
}

fn decode_logo(data_uri: &str) -> Option<DynamicImage> {
    let bytes = match decode_logo_data_uri(data_uri) {
        Ok(b) => b,
        Err(reason) => {
            tracing::warn!(reason, "logo skipped");
            return None;
        }
    };
    match printpdf::image_crate::load_from_memory(&bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            tracing::warn!(error = %e, "logo could not be decoded; skipped");
            None
        }
    }
}

/// Places the tree on A4 pages.
pub fn to_fixed_flow(tree: &RenderTree, metrics: &FontMetrics) -> Result<PagedDocument, RenderError> {
    to_fixed_flow_until(tree, metrics, &|| false)
}

/// Like [`to_fixed_flow`], but checks `stop` at every block and table row and gives up with
/// [`RenderError::Cancelled`] once it returns true.
pub fn to_fixed_flow_until(
    tree: &RenderTree,
    metrics: &FontMetrics,
    stop: &dyn Fn() -> bool,
) -> Result<PagedDocument, RenderError> {
    let mut layout = Layout::new(metrics, stop);

    for node in &tree.nodes {
        layout.check_stop()?;
        match node {
            Node::Heading(h) => layout.heading(h),
            Node::Columns(cols) => layout.columns(cols)?,
            Node::Section(s) => layout.section(s)?,
            Node::Table(t) => layout.table(t)?,
            Node::Totals(rows) => layout.totals(rows),
            Node::Signature(sig) => layout.signature(sig),
            Node::Link(link) => layout.link(link)?,
        }
    }

    Ok(PagedDocument {
        title: tree.title.clone(),
        issue_date: tree.issue_date,
        pages: layout.finish(&tree.page_label),
        font: metrics.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::prepare;
    use crate::test_support::sample_document;
    use std::cell::Cell;

    fn within_page(op: &DrawOp) -> bool {
        match op {
            DrawOp::Text { x, y, .. } => (0.0..=PAGE_W).contains(x) && (PAGE_MARGIN_BOTTOM..=PAGE_H).contains(y),
            DrawOp::Rule { y, .. } => (CONTENT_BOTTOM..=PAGE_H).contains(y),
            _ => true,
        }
    }

    #[test]
    fn sample_fits_one_page_with_footer() {
        let (_, _, tree) = prepare(&sample_document());
        let paged = to_fixed_flow(&tree, &FontMetrics::default()).unwrap();
        assert_eq!(paged.page_count(), 1);
        let texts: Vec<&str> = paged.texts().collect();
        assert!(texts.contains(&"Page 1 / 1"));
        assert!(texts.contains(&"€291.50"));
        assert!(texts.contains(&"Signature"));
        assert!(paged.pages.iter().flat_map(|p| &p.ops).all(within_page));
    }

    #[test]
    fn long_tables_paginate_and_repeat_the_header() {
        let mut doc = sample_document();
        let template = doc.items[0].clone();
        doc.items = (0..120)
            .map(|i| {
                let mut it = template.clone();
                it.id = i.to_string();
                it.description = format!("Line item number {i} with a description long enough to wrap twice");
                it
            })
            .collect();

        let (_, _, tree) = prepare(&doc);
        let paged = to_fixed_flow(&tree, &FontMetrics::default()).unwrap();
        let n = paged.page_count();
        assert!(n > 2, "expected several pages, got {n}");

        for (i, page) in paged.pages.iter().enumerate() {
            let texts: Vec<&str> = page
                .ops
                .iter()
                .filter_map(|op| match op {
                    DrawOp::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            assert!(texts.contains(&format!("Page {} / {}", i + 1, n).as_str()));
            if i > 0 && texts.iter().any(|t| t.starts_with("Line item number")) {
                assert!(texts.contains(&"Description"), "page {} lacks table header", i + 1);
            }
            assert!(page.ops.iter().all(within_page), "page {} overflows", i + 1);
        }
    }

    #[test]
    fn stop_callback_cancels_layout() {
        let (_, _, tree) = prepare(&sample_document());
        let calls = Cell::new(0);
        let stop = || {
            calls.set(calls.get() + 1);
            calls.get() > 3
        };
        assert!(matches!(
            to_fixed_flow_until(&tree, &FontMetrics::default(), &stop),
            Err(RenderError::Cancelled)
        ));
    }

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        let doc = sample_document();
        let (_, _, tree) = prepare(&doc);
        let a = to_fixed_flow(&tree, &FontMetrics::default()).unwrap().content_hash();
        let b = to_fixed_flow(&tree, &FontMetrics::default()).unwrap().content_hash();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut other = doc.clone();
        other.items[0].unit_price += rust_decimal::Decimal::ONE;
        let (_, _, tree2) = prepare(&other);
        assert_ne!(a, to_fixed_flow(&tree2, &FontMetrics::default()).unwrap().content_hash());
    }

    #[test]
    fn undecodable_logo_is_skipped() {
        let mut doc = sample_document();
        doc.general.template = crate::document::TemplateVariant::Stripe;
        doc.general.company_logo = Some("data:image/png;base64,AAAA".into());
        let (_, _, tree) = prepare(&doc);
        let paged = to_fixed_flow(&tree, &FontMetrics::default()).unwrap();
        assert!(!paged
            .pages
            .iter()
            .flat_map(|p| &p.ops)
            .any(|op| matches!(op, DrawOp::Image { .. })));
    }
}
