use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use crate::error::RenderError;

// PDF font sizes are in points; layout coordinates are in millimeters.
const PT_TO_MM: f32 = 25.4 / 72.0;

// Embedded Unicode font: Latin, Cyrillic, Greek and most currency signs.
static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Text measurement for the fixed-flow layout, using the glyph advances of the font that
/// is also embedded in the PDF. Measuring and drawing with one face keeps right-aligned
/// numbers flush.
#[derive(Clone)]
pub struct FontMetrics {
    bytes: Arc<Cow<'static, [u8]>>,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self::embedded()
    }
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("font_bytes", &self.bytes.len())
            .finish()
    }
}

impl FontMetrics {
    /// The bundled DejaVu Sans.
    pub fn embedded() -> Self {
        FontMetrics {
            bytes: Arc::new(Cow::Borrowed(EMBEDDED_FONT)),
        }
    }

    pub fn from_ttf_bytes(bytes: Vec<u8>) -> Result<Self, RenderError> {
        ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| RenderError::Font(format!("failed to parse font: {e}")))?;
        Ok(FontMetrics {
            bytes: Arc::new(Cow::Owned(bytes)),
        })
    }

    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let bytes = std::fs::read(path)
            .map_err(|e| RenderError::Font(format!("failed to read {}: {e}", path.display())))?;
        Self::from_ttf_bytes(bytes)
    }

    pub fn font_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.bytes, 0).ok()
    }

    /// Whether every character of `text` has a glyph. The PDF writer silently drops
    /// characters without one.
    pub fn covers(&self, text: &str) -> bool {
        match self.face() {
            Some(face) => text.chars().all(|ch| face.glyph_index(ch).is_some()),
            None => false,
        }
    }

    pub fn text_width_mm(&self, text: &str, font_size_pt: f32, _bold: bool) -> f32 {
        match self.face() {
            Some(face) => text_width_mm_ttf(&face, text, font_size_pt),
            // half an em per character
            None => text.chars().count() as f32 * 0.5 * font_size_pt * PT_TO_MM,
        }
    }

    pub fn ascent_mm(&self, font_size_pt: f32) -> f32 {
        match self.face() {
            Some(face) => font_ascent_mm(&face, font_size_pt),
            None => font_size_pt * PT_TO_MM * 0.80,
        }
    }

    /// Greedy word wrap to `max_width_mm`; a single word wider than the line is split.
    pub fn wrap(&self, input: &str, font_size: f32, bold: bool, max_width_mm: f32) -> Vec<String> {
        let s = input.trim();
        if s.is_empty() {
            return Vec::new();
        }

        let fits = |t: &str| self.text_width_mm(t, font_size, bold) <= max_width_mm;
        let mut out: Vec<String> = Vec::new();
        let mut current = String::new();

        for word in s.split_whitespace() {
            if !current.is_empty() {
                let candidate = format!("{} {}", current, word);
                if fits(&candidate) {
                    current = candidate;
                    continue;
                }
                out.push(std::mem::take(&mut current));
            }

            if fits(word) {
                current.push_str(word);
                continue;
            }

            let mut chunk = String::new();
            for ch in word.chars() {
                let candidate = format!("{}{}", chunk, ch);
                if fits(&candidate) || chunk.is_empty() {
                    chunk = candidate;
                } else {
                    out.push(std::mem::replace(&mut chunk, ch.to_string()));
                }
            }
            current = chunk;
        }

        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

fn text_width_mm_ttf(face: &ttf_parser::Face<'_>, text: &str, font_size_pt: f32) -> f32 {
    let units_per_em = face.units_per_em() as f32;
    if units_per_em <= 0.0 {
        return 0.0;
    }

    let mut width_units: i32 = 0;
    for ch in text.chars() {
        let Some(gid) = face.glyph_index(ch) else {
            continue;
        };
        width_units += face.glyph_hor_advance(gid).unwrap_or(0) as i32;
    }

    (width_units as f32 / units_per_em) * font_size_pt * PT_TO_MM
}

fn font_ascent_mm(face: &ttf_parser::Face<'_>, font_size_pt: f32) -> f32 {
    let units_per_em = face.units_per_em() as f32;
    if units_per_em <= 0.0 {
        return font_size_pt * PT_TO_MM * 0.80;
    }
    (face.ascender() as f32 / units_per_em) * font_size_pt * PT_TO_MM
}
