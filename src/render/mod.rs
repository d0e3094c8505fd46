//! Invoice layout: one semantic [`RenderTree`] built from the document, consumed by the
//! fixed-flow (paged PDF) back-end and the reflow (HTML) back-end.
//!
//! Every visibility decision is taken while building the tree. The back-ends only place
//! what they are given, so the PDF and the HTML cannot disagree on which blocks exist or
//! on any printed number.

mod fixed_flow;
mod html;
mod labels;
mod metrics;
mod pdf;

use serde::Serialize;
use time::Date;
use tokio_util::sync::CancellationToken;

use crate::currency::{currency_symbol, format_quantity, format_rate, format_with_prefix};
use crate::dates::format_document_date;
use crate::document::{InvoiceDocument, Language};
use crate::error::RenderError;
use crate::totals::{compute_totals, Totals};

pub use fixed_flow::{to_fixed_flow, to_fixed_flow_until, DrawOp, Page, PagedDocument};
pub use html::to_reflow;
pub use labels::{labels_for, Labels};
pub use metrics::FontMetrics;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTree {
    /// PDF document title.
    pub title: String,
    pub language: Language,
    /// Fixes the PDF creation date so repeated renders are identical.
    pub issue_date: Date,
    pub page_label: String,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Heading(Heading),
    Columns(Vec<Section>),
    Section(Section),
    Table(Table),
    Totals(Vec<TotalRow>),
    Signature(SignatureBlock),
    Link(LinkNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub title: String,
    pub number: String,
    pub seller_name: String,
    pub logo: Option<Logo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Logo {
    pub data_uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: Option<String>,
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Strong(String),
    KeyValue { key: String, value: String },
    /// Free text that keeps its own line breaks.
    Paragraph(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    pub label: String,
    pub align: Align,
    /// Share of the content width.
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TotalRow {
    pub label: String,
    pub value: String,
    pub emphasized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureBlock {
    /// Printed above the signing line.
    pub caption: String,
    pub name: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkNode {
    pub label: String,
    pub url: String,
}

/// Every string the layouts print for one item row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedLine {
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub vat_rate: String,
    pub amount: String,
}

/// Display strings for one document, computed once and shared by both back-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedInvoice {
    pub invoice_number: String,
    pub issue_date: String,
    pub due_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_date: Option<String>,
    pub payment_due_date: String,
    pub currency: String,
    pub lines: Vec<FormattedLine>,
    pub subtotal: String,
    pub vat: String,
    pub total: String,
}

impl FormattedInvoice {
    /// Money is prefixed with the currency symbol, or with the ISO code when `font` has no
    /// glyph for the symbol, so both back-ends print exactly the same amount.
    pub fn new(doc: &InvoiceDocument, totals: &Totals, font: &FontMetrics) -> Self {
        let g = &doc.general;
        let date = |d: Date| format_document_date(d, g.language, g.date_format);
        let symbol = currency_symbol(&g.currency);
        let prefix = if font.covers(symbol) {
            symbol
        } else {
            tracing::debug!(currency = %g.currency, "font lacks the currency sign; printing the code");
            g.currency.as_str()
        };
        let money = |v| format_with_prefix(v, prefix);

        let lines = doc
            .items
            .iter()
            .zip(totals.lines.iter())
            .map(|(item, line)| FormattedLine {
                description: item.description.clone(),
                quantity: format_quantity(item.quantity),
                unit_price: money(item.unit_price),
                vat_rate: format_rate(item.vat_rate),
                amount: money(line.net),
            })
            .collect();

        FormattedInvoice {
            invoice_number: doc.full_invoice_number(),
            issue_date: date(g.issue_date),
            due_date: date(g.due_date),
            service_date: g.service_date.map(date),
            payment_due_date: date(doc.payment.due_date.unwrap_or(g.due_date)),
            currency: g.currency.clone(),
            lines,
            subtotal: money(totals.subtotal),
            vat: money(totals.vat),
            total: money(totals.total),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let t = s.trim();
    (!t.is_empty()).then_some(t)
}

fn flagged(show: bool, value: &str) -> Option<&str> {
    if show {
        non_empty(value)
    } else {
        None
    }
}

/// `VAT - FR (19%)`: labelled with the first item's rate while the amount sums every item.
fn vat_summary_label(doc: &InvoiceDocument, vat_caption: &str) -> String {
    let mut label = vat_caption.to_string();
    if let Some(country) = non_empty(&doc.buyer.country_code) {
        label.push_str(" - ");
        label.push_str(country);
    }
    if let Some(first) = doc.items.first() {
        label.push_str(&format!(" ({})", format_rate(first.vat_rate)));
    }
    label
}

pub fn build_render_tree(
    doc: &InvoiceDocument,
    totals: &Totals,
    formatted: &FormattedInvoice,
) -> RenderTree {
    debug_assert_eq!(totals.lines.len(), formatted.lines.len());
    let labels = labels_for(doc.general.language);
    let branded = doc.general.template.is_branded();
    let mut nodes = Vec::new();

    nodes.push(Node::Heading(Heading {
        title: labels.invoice.clone(),
        number: formatted.invoice_number.clone(),
        seller_name: doc.seller.name.clone(),
        logo: doc
            .general
            .company_logo
            .as_deref()
            .and_then(non_empty)
            .filter(|_| branded)
            .map(|uri| Logo {
                data_uri: uri.to_string(),
            }),
    }));

    let seller = &doc.seller;
    let mut seller_lines = vec![
        Line::Strong(seller.name.clone()),
        Line::Paragraph(seller.address.clone()),
    ];
    if let Some(email) = non_empty(&seller.email) {
        seller_lines.push(kv(&labels.email, email));
    }
    if let Some(vat) = flagged(seller.show_vat_in_pdf, &seller.vat_number) {
        seller_lines.push(kv(&labels.vat_number, vat));
    }
    if let Some(account) = flagged(seller.show_account_in_pdf, &seller.account_number) {
        seller_lines.push(kv(&labels.account_number, account));
    }
    if let Some(swift) = flagged(seller.show_swift_in_pdf, &seller.swift_bic) {
        seller_lines.push(kv(&labels.swift_bic, swift));
    }
    if let Some(notes) = flagged(seller.show_notes_in_pdf, &seller.notes) {
        seller_lines.push(Line::Paragraph(notes.to_string()));
    }

    let mut details = vec![
        kv(&labels.date_of_issue, &formatted.issue_date),
        kv(&labels.date_due, &formatted.due_date),
    ];
    if let Some(service) = &formatted.service_date {
        details.push(kv(&labels.service_date, service));
    }
    details.push(kv(&labels.currency, &formatted.currency));

    nodes.push(Node::Columns(vec![
        Section {
            title: None,
            lines: seller_lines,
        },
        Section {
            title: None,
            lines: details,
        },
    ]));

    let buyer = &doc.buyer;
    let mut bill_to = vec![
        Line::Strong(buyer.name.clone()),
        Line::Paragraph(buyer.address.clone()),
    ];
    if let Some(email) = non_empty(&buyer.email) {
        bill_to.push(kv(&labels.email, email));
    }
    if let Some(vat) = non_empty(&buyer.vat_number) {
        bill_to.push(kv(&labels.vat_number, vat));
    }
    nodes.push(Node::Columns(vec![
        Section {
            title: Some(labels.bill_to.clone()),
            lines: bill_to,
        },
        Section {
            title: Some(labels.ship_to.clone()),
            lines: vec![
                Line::Strong(buyer.name.clone()),
                Line::Paragraph(buyer.address.clone()),
            ],
        },
    ]));

    let column = |label: &str, align, width| TableColumn {
        label: label.to_string(),
        align,
        width,
    };
    nodes.push(Node::Table(Table {
        columns: vec![
            column(&labels.description, Align::Left, 0.42),
            column(&labels.quantity, Align::Right, 0.11),
            column(&labels.unit_price, Align::Right, 0.18),
            column(&labels.tax, Align::Right, 0.11),
            column(&labels.amount, Align::Right, 0.18),
        ],
        rows: formatted
            .lines
            .iter()
            .map(|l| TableRow {
                cells: vec![
                    l.description.clone(),
                    l.quantity.clone(),
                    l.unit_price.clone(),
                    l.vat_rate.clone(),
                    l.amount.clone(),
                ],
            })
            .collect(),
    }));

    nodes.push(Node::Totals(vec![
        TotalRow {
            label: labels.subtotal.clone(),
            value: formatted.subtotal.clone(),
            emphasized: false,
        },
        TotalRow {
            label: vat_summary_label(doc, &labels.vat),
            value: formatted.vat.clone(),
            emphasized: false,
        },
        TotalRow {
            label: labels.total.clone(),
            value: formatted.total.clone(),
            emphasized: true,
        },
    ]));

    let payment = &doc.payment;
    if payment.any_visible() {
        let mut rows = Vec::new();
        if payment.show_method_in_pdf {
            rows.push(kv(&labels.payment_method, &payment.method));
        }
        if payment.show_due_date_in_pdf {
            rows.push(kv(&labels.due_date, &formatted.payment_due_date));
        }
        if payment.show_terms_in_pdf {
            rows.push(kv(&labels.payment_terms, &payment.terms));
        }
        nodes.push(Node::Section(Section {
            title: Some(labels.payment_information.clone()),
            lines: rows,
        }));
    }

    if doc.notes.show_in_pdf {
        if let Some(content) = non_empty(&doc.notes.content) {
            nodes.push(Node::Section(Section {
                title: Some(labels.notes.clone()),
                lines: vec![Line::Paragraph(content.to_string())],
            }));
        }
    }

    if doc.signature.show_in_pdf {
        nodes.push(Node::Signature(SignatureBlock {
            caption: labels.signature.clone(),
            name: doc.signature.name.clone(),
            title: doc.signature.title.clone(),
        }));
    }

    if branded {
        if let Some(url) = doc.general.payment_link_url.as_deref().and_then(non_empty) {
            nodes.push(Node::Link(LinkNode {
                label: labels.pay_online.clone(),
                url: url.to_string(),
            }));
        }
    }

    RenderTree {
        title: format!("{} {}", labels.invoice, formatted.invoice_number),
        language: doc.general.language,
        issue_date: doc.general.issue_date,
        page_label: labels.page,
        nodes,
    }
}

fn kv(key: &str, value: &str) -> Line {
    Line::KeyValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Totals, display strings and tree for a validated document, for the embedded font.
pub fn prepare(doc: &InvoiceDocument) -> (Totals, FormattedInvoice, RenderTree) {
    prepare_with(doc, &FontMetrics::default())
}

/// Like [`prepare`], for the font the PDF will be drawn with.
pub fn prepare_with(doc: &InvoiceDocument, font: &FontMetrics) -> (Totals, FormattedInvoice, RenderTree) {
    let totals = compute_totals(&doc.items);
    let formatted = FormattedInvoice::new(doc, &totals, font);
    let tree = build_render_tree(doc, &totals, &formatted);
    (totals, formatted, tree)
}

#[derive(Debug, Clone)]
pub struct RenderedInvoice {
    pub totals: Totals,
    pub formatted: FormattedInvoice,
    pub html: String,
    pub pdf: Vec<u8>,
}

/// Both renderings on the calling thread.
pub fn render_invoice(doc: &InvoiceDocument, metrics: &FontMetrics) -> Result<RenderedInvoice, RenderError> {
    let (totals, formatted, tree) = prepare_with(doc, metrics);
    let html = to_reflow(&tree);
    let pdf = to_fixed_flow(&tree, metrics)?.to_pdf_bytes()?;
    Ok(RenderedInvoice {
        totals,
        formatted,
        html,
        pdf,
    })
}

/// Lays out and serializes the PDF on the blocking pool.
///
/// Returns [`RenderError::Cancelled`] as soon as `cancel` fires; the worker notices the token
/// at its next table row and stops without producing output.
pub async fn render_pdf_cancellable(
    tree: RenderTree,
    metrics: FontMetrics,
    cancel: CancellationToken,
) -> Result<Vec<u8>, RenderError> {
    let worker_token = cancel.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let stop = || worker_token.is_cancelled();
        let paged = to_fixed_flow_until(&tree, &metrics, &stop)?;
        if stop() {
            return Err(RenderError::Cancelled);
        }
        paged.to_pdf_bytes()
    });

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!("pdf render cancelled");
            Err(RenderError::Cancelled)
        }
        joined = worker => match joined {
            Ok(result) => result,
            Err(e) => Err(RenderError::Join(e.to_string())),
        },
    }
}
