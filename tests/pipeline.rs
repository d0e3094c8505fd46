use invoice_builder_lib::document::Language;
use invoice_builder_lib::render::{
    labels_for, prepare, render_invoice, to_fixed_flow, to_reflow, FontMetrics, FormattedInvoice, PagedDocument,
};
use printpdf::lopdf;
use invoice_builder_lib::validate::{validate, ValidatorOptions};
use invoice_builder_lib::InvoiceDocument;
use serde_json::{json, Value};

fn fixture() -> Value {
    serde_json::from_str(include_str!("fixtures/invoice.json")).unwrap()
}

fn document(raw: &Value) -> InvoiceDocument {
    validate(raw, &ValidatorOptions::default()).unwrap()
}

fn both(doc: &InvoiceDocument) -> (PagedDocument, String) {
    let (_, _, tree) = prepare(doc);
    let paged = to_fixed_flow(&tree, &FontMetrics::default()).unwrap();
    (paged, to_reflow(&tree))
}

fn pdf_has(paged: &PagedDocument, needle: &str) -> bool {
    paged.texts().any(|t| t == needle)
}

#[test]
fn totals_match_the_hand_computed_figures() {
    let (_, formatted, _) = prepare(&document(&fixture()));
    // 3 x 1249.99 + 1.5 x 33.33 (49.995 -> 50.00) + 2 x 12.50 + 80
    assert_eq!(formatted.subtotal, "$3,904.97");
    // 712.49 + 9.50 + 1.75 + 0
    assert_eq!(formatted.vat, "$723.74");
    assert_eq!(formatted.total, "$4,628.71");
    assert_eq!(formatted.lines[1].amount, "$50.00");
    assert_eq!(formatted.issue_date, "10/05/2024");
}

#[test]
fn every_number_is_printed_identically_by_both_backends() {
    let doc = document(&fixture());
    let (_, formatted, _) = prepare(&doc);
    let (paged, html) = both(&doc);

    let mut numbers: Vec<&str> = vec![
        formatted.subtotal.as_str(),
        formatted.vat.as_str(),
        formatted.total.as_str(),
    ];
    for line in &formatted.lines {
        numbers.extend([
            line.amount.as_str(),
            line.unit_price.as_str(),
            line.quantity.as_str(),
            line.vat_rate.as_str(),
        ]);
    }

    for n in numbers {
        assert!(pdf_has(&paged, n), "{n} missing from the fixed-flow output");
        assert!(html.contains(n), "{n} missing from the reflow output");
    }
}

#[test]
fn rendering_twice_is_identical() {
    let doc = document(&fixture());
    let a = render_invoice(&doc, &FontMetrics::default()).unwrap();
    let b = render_invoice(&doc, &FontMetrics::default()).unwrap();
    assert!(a.pdf.starts_with(b"%PDF-"));
    assert_eq!(a.pdf, b.pdf);
    assert_eq!(a.html, b.html);
}

#[test]
fn branded_template_shows_payment_link_and_german_captions() {
    let doc = document(&fixture());
    let de = labels_for(Language::De);
    let (paged, html) = both(&doc);

    assert!(pdf_has(&paged, "Rechnung"));
    assert!(pdf_has(&paged, "MwSt. - IE (19%)"));
    assert!(pdf_has(&paged, "Seite 1 / 1"));
    assert!(html.contains("MwSt. - IE (19%)"));
    assert!(html.contains(&format!("{}:", de.pay_online)));
    assert!(html.contains("href=\"https://pay.example.com/i/0042\""));
    assert!(paged.texts().any(|t| t.contains("https://pay.example.com/i/0042")));

    let mut raw = fixture();
    raw["general"]["template"] = json!("default");
    let (plain_pdf, plain_html) = both(&document(&raw));
    assert!(!plain_html.contains("pay.example.com"));
    assert!(!plain_pdf.texts().any(|t| t.contains("pay.example.com")));
}

#[test]
fn turning_a_flag_off_removes_only_that_block() {
    let de = labels_for(Language::De);
    let doc = document(&fixture());
    let (paged, html) = both(&doc);
    assert!(pdf_has(&paged, &de.payment_information));
    assert!(html.contains(&de.payment_information));

    let mut raw = fixture();
    for flag in ["showMethodInPDF", "showDueDateInPDF", "showTermsInPDF"] {
        raw["payment"][flag] = json!(false);
    }
    raw["signature"]["showInPDF"] = json!(false);
    let hidden = document(&raw);
    let (hidden_pdf, hidden_html) = both(&hidden);

    assert!(!pdf_has(&hidden_pdf, &de.payment_information));
    assert!(!hidden_html.contains(&de.payment_information));
    assert!(!pdf_has(&hidden_pdf, "Max Mustermann"));
    assert!(!hidden_html.contains("Max Mustermann"));

    // notes and totals are untouched
    assert!(pdf_has(&hidden_pdf, &de.notes));
    assert_eq!(prepare(&doc).0, prepare(&hidden).0);
    assert!(pdf_has(&hidden_pdf, "$4,628.71"));
}

#[test]
fn long_invoices_paginate_only_in_the_fixed_flow() {
    let mut raw = fixture();
    let items: Vec<Value> = (0..90)
        .map(|i| {
            json!({
                "id": format!("row-{i}"),
                "description": format!("Spare part number {i}"),
                "quantity": 1,
                "unitPrice": 10,
                "vatRate": 19
            })
        })
        .collect();
    raw["items"] = Value::Array(items);

    let de = labels_for(Language::De);
    let (paged, html) = both(&document(&raw));
    let n = paged.page_count();
    assert!(n > 1);

    // the table header repeats on every page the table continues onto
    let header_count = paged.texts().filter(|t| *t == de.description).count();
    assert!(header_count >= 2 && header_count <= n);
    for page in 1..=n {
        assert!(pdf_has(&paged, &format!("Seite {page} / {n}")));
    }

    assert_eq!(html.matches("<thead>").count(), 1);
    assert!(!html.contains("Seite"));
    assert!(html.contains("$900.00"));
}

/// Glyph ids of every `Tj` text run, decoded from the serialized PDF.
fn pdf_glyph_runs(pdf: &[u8]) -> Vec<Vec<u16>> {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    let mut runs = Vec::new();
    for page_id in doc.get_pages().into_values() {
        let content = doc.get_and_decode_page_content(page_id).unwrap();
        for op in content.operations {
            if op.operator == "Tj" {
                let bytes = op.operands[0].as_str().unwrap();
                runs.push(bytes.chunks(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect());
            }
        }
    }
    runs
}

fn glyphs(face: &ttf_parser::Face<'_>, text: &str) -> Vec<u16> {
    text.chars()
        .map(|ch| {
            face.glyph_index(ch)
                .unwrap_or_else(|| panic!("no glyph for {ch:?} in {text:?}"))
                .0
        })
        .collect()
}

fn amounts(formatted: &FormattedInvoice) -> Vec<&str> {
    let mut out = vec![
        formatted.subtotal.as_str(),
        formatted.vat.as_str(),
        formatted.total.as_str(),
    ];
    for line in &formatted.lines {
        out.extend([line.amount.as_str(), line.unit_price.as_str()]);
    }
    out
}

#[test]
fn serialized_pdf_keeps_currency_signs_and_polish_letters() {
    let mut raw = fixture();
    raw["general"]["currency"] = json!("INR");
    raw["general"]["language"] = json!("pl");
    let doc = document(&raw);

    let font = FontMetrics::default();
    let face = ttf_parser::Face::parse(font.font_bytes(), 0).unwrap();
    let rendered = render_invoice(&doc, &font).unwrap();
    let runs = pdf_glyph_runs(&rendered.pdf);
    let in_pdf = |text: &str| runs.contains(&glyphs(&face, text));

    assert_eq!(rendered.formatted.total, "₹4,628.71");
    for amount in amounts(&rendered.formatted) {
        assert!(in_pdf(amount), "{amount} not in the PDF content");
        assert!(rendered.html.contains(amount), "{amount} not in the HTML");
    }

    let pl = labels_for(Language::Pl);
    for caption in [&pl.subtotal, &pl.quantity, &pl.payment_information, &pl.signature] {
        assert!(in_pdf(caption.as_str()), "{caption} not in the PDF content");
        assert!(rendered.html.contains(caption.as_str()));
    }
    assert!(in_pdf("Strona 1 / 1"));
}

#[test]
fn currency_sign_missing_from_the_font_falls_back_to_the_code_everywhere() {
    let mut raw = fixture();
    raw["general"]["currency"] = json!("YER");
    let doc = document(&raw);

    let font = FontMetrics::default();
    let face = ttf_parser::Face::parse(font.font_bytes(), 0).unwrap();
    let rendered = render_invoice(&doc, &font).unwrap();
    let runs = pdf_glyph_runs(&rendered.pdf);

    assert_eq!(rendered.formatted.total, "YER4,628.71");
    assert!(!rendered.html.contains('\u{FDFC}'));
    for amount in amounts(&rendered.formatted) {
        assert!(runs.contains(&glyphs(&face, amount)), "{amount} not in the PDF content");
        assert!(rendered.html.contains(amount));
    }
}
