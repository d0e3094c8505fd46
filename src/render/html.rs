use super::{Align, Heading, Line, LinkNode, Node, RenderTree, Section, SignatureBlock, Table, TotalRow};

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const MUTED: &str = "color:#4b5563;";
const INK: &str = "color:#111827;";

fn push_line(html: &mut String, line: &Line) {
    match line {
        Line::Strong(t) => html.push_str(&format!(
            "<p style=\"margin:0 0 4px 0;font-size:14px;font-weight:700;{INK}\">{}</p>",
            escape_html(t)
        )),
        Line::Paragraph(t) => html.push_str(&format!(
            "<p style=\"margin:0 0 4px 0;font-size:13px;white-space:pre-wrap;{MUTED}\">{}</p>",
            escape_html(t.trim())
        )),
        Line::KeyValue { key, value } => html.push_str(&format!(
            "<p style=\"margin:0 0 4px 0;font-size:13px;\"><span style=\"font-weight:700;{MUTED}\">{}:</span> <span style=\"{INK}\">{}</span></p>",
            escape_html(key),
            escape_html(value)
        )),
    }
}

fn push_section(html: &mut String, section: &Section) {
    if let Some(title) = &section.title {
        html.push_str(&format!(
            "<h3 style=\"margin:0 0 8px 0;font-size:12px;font-weight:700;text-transform:uppercase;{MUTED}\">{}</h3>",
            escape_html(title)
        ));
    }
    for line in &section.lines {
        push_line(html, line);
    }
}

fn push_heading(html: &mut String, heading: &Heading) {
    html.push_str("<header style=\"display:flex;justify-content:space-between;align-items:flex-start;margin-bottom:32px;\">");
    html.push_str(&format!(
        "<div><h1 style=\"margin:0 0 8px 0;font-size:30px;font-weight:700;{INK}\">{}</h1><p style=\"margin:0;font-size:14px;{MUTED}\">{}</p></div>",
        escape_html(&heading.title),
        escape_html(&heading.number)
    ));
    html.push_str("<div style=\"text-align:right;\">");
    if let Some(logo) = &heading.logo {
        html.push_str(&format!(
            "<img src=\"{}\" alt=\"Company Logo\" style=\"max-width:170px;max-height:80px;object-fit:contain;margin-bottom:12px;\">",
            escape_html(&logo.data_uri)
        ));
    }
    html.push_str(&format!(
        "<h2 style=\"margin:0;font-size:18px;font-weight:700;{INK}\">{}</h2>",
        escape_html(&heading.seller_name)
    ));
    html.push_str("</div></header>");
}

fn push_table(html: &mut String, table: &Table) {
    let align = |a: Align| match a {
        Align::Left => "left",
        Align::Right => "right",
    };

    html.push_str("<table style=\"width:100%;border-collapse:collapse;margin-bottom:32px;\"><thead><tr style=\"background-color:#ebebeb;\">");
    for col in &table.columns {
        html.push_str(&format!(
            "<th style=\"text-align:{};padding:10px 12px;font-size:12px;font-weight:700;text-transform:uppercase;{MUTED}\">{}</th>",
            align(col.align),
            escape_html(&col.label)
        ));
    }
    html.push_str("</tr></thead><tbody>");
    for row in &table.rows {
        html.push_str("<tr style=\"border-bottom:1px solid #f3f4f6;\">");
        for (i, (cell, col)) in row.cells.iter().zip(&table.columns).enumerate() {
            let weight = if i + 1 == table.columns.len() { "font-weight:700;" } else { "" };
            html.push_str(&format!(
                "<td style=\"text-align:{};padding:10px 12px;font-size:13px;{weight}{INK}\">{}</td>",
                align(col.align),
                escape_html(cell)
            ));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
}

fn push_totals(html: &mut String, rows: &[TotalRow]) {
    html.push_str("<div style=\"display:flex;justify-content:flex-end;margin-bottom:32px;\"><table style=\"width:300px;border-collapse:collapse;\">");
    for row in rows {
        let (size, border) = if row.emphasized {
            ("17px", "border-top:1px solid #e5e7eb;")
        } else {
            ("13px", "")
        };
        let label_weight = if row.emphasized { "font-weight:700;" } else { "" };
        html.push_str(&format!(
            "<tr style=\"{border}\"><td style=\"padding:8px 0;font-size:{size};{label_weight}{MUTED}\">{}</td><td style=\"padding:8px 0;text-align:right;font-size:{size};font-weight:700;{INK}\">{}</td></tr>",
            escape_html(&row.label),
            escape_html(&row.value)
        ));
    }
    html.push_str("</table></div>");
}

fn push_signature(html: &mut String, sig: &SignatureBlock) {
    html.push_str(&format!(
        "<div style=\"display:flex;justify-content:flex-end;margin-bottom:32px;\"><div style=\"text-align:center;\"><p style=\"margin:0;font-size:12px;{MUTED}\">{}</p><div style=\"width:190px;height:1px;background-color:#d1d5db;margin:40px 0 8px 0;\"></div><p style=\"margin:0;font-size:13px;font-weight:700;{INK}\">{}</p><p style=\"margin:0;font-size:12px;{MUTED}\">{}</p></div></div>",
        escape_html(&sig.caption),
        escape_html(&sig.name),
        escape_html(&sig.title)
    ));
}

fn push_link(html: &mut String, link: &LinkNode) {
    html.push_str(&format!(
        "<p style=\"margin:0 0 32px 0;font-size:13px;\"><span style=\"font-weight:700;{MUTED}\">{}:</span> <a href=\"{}\" style=\"color:#635bff;\">{}</a></p>",
        escape_html(&link.label),
        escape_html(&link.url),
        escape_html(&link.url)
    ));
}

/// Renders the tree as one self-contained HTML page. Nothing is paginated.
pub fn to_reflow(tree: &RenderTree) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        "<!doctype html><html lang=\"{}\"><head><meta charset=\"utf-8\"><title>{}</title></head>",
        tree.language.code(),
        escape_html(&tree.title)
    ));
    html.push_str("<body style=\"margin:0;padding:32px;background-color:#ffffff;font-family:Arial,Helvetica,sans-serif;\"><main style=\"max-width:880px;margin:0 auto;\">");

    for node in &tree.nodes {
        match node {
            Node::Heading(h) => push_heading(&mut html, h),
            Node::Columns(sections) => {
                html.push_str("<div style=\"display:flex;gap:32px;margin-bottom:32px;\">");
                for s in sections {
                    html.push_str("<div style=\"flex:1;\">");
                    push_section(&mut html, s);
                    html.push_str("</div>");
                }
                html.push_str("</div>");
            }
            Node::Section(s) => {
                html.push_str("<section style=\"margin-bottom:32px;\">");
                push_section(&mut html, s);
                html.push_str("</section>");
            }
            Node::Table(t) => push_table(&mut html, t),
            Node::Totals(rows) => push_totals(&mut html, rows),
            Node::Signature(sig) => push_signature(&mut html, sig),
            Node::Link(link) => push_link(&mut html, link),
        }
    }

    html.push_str("</main></body></html>");
    html
}
