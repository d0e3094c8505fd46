use std::io::Cursor;

use printpdf::{
    CustomPdfConformance, Image, ImageTransform, IndirectFontRef, Mm, PdfConformance,
    PdfDocument, PdfLayerReference,
};

use super::fixed_flow::{DrawOp, PagedDocument, LOGO_DPI, PAGE_H, PAGE_W};
use crate::error::RenderError;

fn pdf_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(e.to_string())
}

fn push_line(layer: &PdfLayerReference, font: &IndirectFontRef, text: &str, font_size: f32, x: f32, y: f32) {
    layer.use_text(text, font_size, Mm(x), Mm(y), font);
}

fn draw_rule_with_thickness(layer: &PdfLayerReference, x1: f32, x2: f32, y: f32, thickness: f32) {
    layer.set_outline_thickness(thickness);
    layer.add_line(printpdf::Line {
        points: vec![
            (printpdf::Point::new(Mm(x1), Mm(y)), false),
            (printpdf::Point::new(Mm(x2), Mm(y)), false),
        ],
        is_closed: false,
    });
}

fn fill_rect_gray(layer: &PdfLayerReference, x: f32, y_top: f32, w: f32, h: f32, gray: f32) {
    use printpdf::{path::PaintMode, Color, Rect, Rgb};

    layer.set_fill_color(Color::Rgb(Rgb::new(gray, gray, gray, None)));
    let rect = Rect::new(Mm(x), Mm(y_top - h), Mm(x + w), Mm(y_top)).with_mode(PaintMode::Fill);
    layer.add_rect(rect);
    // text is drawn with the fill color
    layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
}

/// Overwrites the random second `/ID` entry in the trailer with characters of `id`.
///
/// The writer always emits a fresh instance id; pinning it keeps repeated renders of one
/// document byte-identical. Leaves `bytes` untouched when the trailer has no `/ID` array.
pub(crate) fn pin_trailer_instance_id(bytes: &mut [u8], id: &str) {
    let Some(start) = bytes.windows(3).rposition(|w| w == b"/ID") else {
        return;
    };
    let Some(open) = bytes[start..].iter().position(|&b| b == b'[').map(|p| start + p) else {
        return;
    };

    // (content) or <content>; returns the content range
    let string_at = |from: usize| -> Option<(usize, usize)> {
        let rel = bytes[from..].iter().position(|&b| b == b'(' || b == b'<')?;
        let begin = from + rel;
        let close = if bytes[begin] == b'(' { b')' } else { b'>' };
        let end = bytes[begin + 1..].iter().position(|&b| b == close)? + begin + 1;
        Some((begin + 1, end))
    };

    let Some((_, first_end)) = string_at(open + 1) else {
        return;
    };
    let Some((begin, end)) = string_at(first_end + 1) else {
        return;
    };

    let hex_digits = bytes[begin - 1] == b'<';
    let filler: Vec<u8> = if hex_digits {
        id.bytes().filter(u8::is_ascii_hexdigit).collect()
    } else {
        id.bytes().filter(u8::is_ascii_alphanumeric).collect()
    };
    if filler.is_empty() {
        return;
    }
    for (i, slot) in bytes[begin..end].iter_mut().enumerate() {
        *slot = filler[i % filler.len()];
    }
}

impl PagedDocument {
    /// Serializes the pages. Identical documents give identical bytes: dates come from the
    /// issue date, the document id from [`PagedDocument::content_hash`], and no XMP packet
    /// is written.
    pub fn to_pdf_bytes(&self) -> Result<Vec<u8>, RenderError> {
        let id = self.content_hash();
        let stamp = self.issue_date.midnight().assume_utc();

        let (doc, page1, layer1) = PdfDocument::new(&self.title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let doc = doc
            .with_document_id(id.clone())
            .with_conformance(PdfConformance::Custom(CustomPdfConformance {
                requires_icc_profile: false,
                requires_xmp_metadata: false,
                ..Default::default()
            }))
            .with_creation_date(stamp)
            .with_mod_date(stamp)
            .with_metadata_date(stamp);

        // Embed a Unicode font so currency signs and non-Latin captions survive.
        let font = doc
            .add_external_font(Cursor::new(self.font.font_bytes()))
            .map_err(pdf_err)?;
        // one embedded face serves regular and bold text
        let font_bold = font.clone();

        for (i, page) in self.pages.iter().enumerate() {
            let layer = if i == 0 {
                doc.get_page(page1).get_layer(layer1)
            } else {
                let (p, l) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
                doc.get_page(p).get_layer(l)
            };

            for op in &page.ops {
                match op {
                    DrawOp::Text {
                        x,
                        y,
                        size,
                        bold,
                        text,
                    } => {
                        let f = if *bold { &font_bold } else { &font };
                        push_line(&layer, f, text, *size, *x, *y);
                    }
                    DrawOp::Rule { x1, x2, y, thickness } => {
                        draw_rule_with_thickness(&layer, *x1, *x2, *y, *thickness);
                    }
                    DrawOp::FillRect { x, y_top, w, h, gray } => {
                        fill_rect_gray(&layer, *x, *y_top, *w, *h, *gray);
                    }
                    DrawOp::Image { image, x, y, scale } => {
                        Image::from_dynamic_image(image).add_to_layer(
                            layer.clone(),
                            ImageTransform {
                                translate_x: Some(Mm(*x)),
                                translate_y: Some(Mm(*y)),
                                rotate: None,
                                scale_x: Some(*scale),
                                scale_y: Some(*scale),
                                dpi: Some(LOGO_DPI),
                            },
                        );
                    }
                }
            }
        }

        let mut writer = std::io::BufWriter::new(Vec::<u8>::new());
        doc.save(&mut writer).map_err(pdf_err)?;
        let mut bytes = writer.into_inner().map_err(pdf_err)?;
        pin_trailer_instance_id(&mut bytes, &id);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{prepare, to_fixed_flow, FontMetrics};
    use crate::test_support::sample_document;

    #[test]
    fn renders_are_byte_identical() {
        let (_, _, tree) = prepare(&sample_document());
        let a = to_fixed_flow(&tree, &FontMetrics::default()).unwrap().to_pdf_bytes().unwrap();
        let b = to_fixed_flow(&tree, &FontMetrics::default()).unwrap().to_pdf_bytes().unwrap();
        assert!(a.starts_with(b"%PDF-"));
        assert_eq!(a, b);
    }

    #[test]
    fn pins_literal_instance_id() {
        let mut trailer = b"trailer\n<</ID[(aaaa)(zzzzzz)]/Root 1 0 R>>".to_vec();
        pin_trailer_instance_id(&mut trailer, "0123456789abcdef");
        assert_eq!(trailer, b"trailer\n<</ID[(aaaa)(012345)]/Root 1 0 R>>".to_vec());
    }

    #[test]
    fn pins_hex_instance_id() {
        let mut trailer = b"<</ID [<00ff> <1a2b3c4d>]>>".to_vec();
        pin_trailer_instance_id(&mut trailer, "feedbeef99");
        assert_eq!(trailer, b"<</ID [<00ff> <feedbeef>]>>".to_vec());
    }

    #[test]
    fn missing_id_leaves_bytes_alone() {
        let mut bytes = b"%PDF-1.3 no trailer here".to_vec();
        let before = bytes.clone();
        pin_trailer_instance_id(&mut bytes, "abc");
        assert_eq!(bytes, before);
    }
}
