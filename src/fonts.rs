//! Font metrics and line breaking for the built-in layout engine.
//!
//! Text is painted with the PDF base-14 fonts, so measurement defaults to
//! per-class average advances. Loading a metric-compatible TrueType face
//! (Liberation Serif for Times, Liberation Sans for Helvetica, ...) with
//! `ttf-parser` switches that class to exact glyph advances.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::EngineError;

/// The base-14 family a CSS font family is painted with.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum FontClass {
    Serif,
    Sans,
    Mono,
}

impl FontClass {
    pub fn for_family(family: &str) -> Self {
        let f = family.to_ascii_lowercase();
        if f.contains("courier") || f.contains("mono") || f.contains("consol") {
            FontClass::Mono
        } else if f.contains("helvetica")
            || f.contains("arial")
            || f.contains("sans")
            || f.contains("verdana")
        {
            FontClass::Sans
        } else {
            FontClass::Serif
        }
    }

    /// Average advance as a fraction of the font size.
    fn average_advance(self, bold: bool) -> f32 {
        match (self, bold) {
            (FontClass::Mono, _) => 0.6,
            (FontClass::Sans, false) => 0.5,
            (FontClass::Sans, true) => 0.55,
            (FontClass::Serif, false) => 0.45,
            (FontClass::Serif, true) => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub class: FontClass,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            class: FontClass::for_family(family),
            bold,
            italic,
        }
    }
}

/// `serif`, `sans-bold`, `mono-bold-italic`, `serif-italic`, ...
impl FromStr for FontKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || EngineError::Launch(format!("unknown font variant '{s}'"));
        let mut parts = s.split('-');
        let class = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("serif") => FontClass::Serif,
            Some("sans") => FontClass::Sans,
            Some("mono") => FontClass::Mono,
            _ => return Err(unknown()),
        };
        let mut key = FontKey {
            class,
            bold: false,
            italic: false,
        };
        for part in parts {
            match part.to_ascii_lowercase().as_str() {
                "bold" if !key.bold => key.bold = true,
                "italic" if !key.italic => key.italic = true,
                _ => return Err(unknown()),
            }
        }
        Ok(key)
    }
}

/// A loaded font face with metrics.
#[derive(Clone)]
struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    bytes: Vec<u8>,
    units_per_em: f32,
    ascender: f32,
}

/// Measures text for the layout engine.
#[derive(Clone, Default)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
}

impl std::fmt::Debug for FontManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontManager")
            .field("loaded", &self.fonts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FontManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a TTF/OTF face for measuring one font variant.
    pub fn load_font(&mut self, key: FontKey, bytes: Vec<u8>) -> Result<(), EngineError> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| EngineError::Launch(format!("failed to parse font: {e}")))?;
        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            bytes,
        };
        log::debug!("measuring {key:?} with a loaded face");
        self.fonts.insert(key, data);
        Ok(())
    }

    /// [`FontManager::load_font`] from a file on disk.
    pub fn load_font_file(&mut self, key: FontKey, path: &Path) -> Result<(), EngineError> {
        let bytes = std::fs::read(path)
            .map_err(|e| EngineError::Launch(format!("failed to read font '{}': {e}", path.display())))?;
        self.load_font(key, bytes)
    }

    pub fn has_loaded(&self, key: &FontKey) -> bool {
        self.fonts.contains_key(key)
    }

    /// Width of `text` in points.
    pub fn measure_text_width(&self, text: &str, font_size: f32, key: &FontKey) -> f32 {
        let heuristic = || text.chars().count() as f32 * font_size * key.class.average_advance(key.bold);
        let Some(data) = self.fonts.get(key) else {
            return heuristic();
        };
        let Ok(face) = ttf_parser::Face::parse(&data.bytes, 0) else {
            return heuristic();
        };
        let scale = font_size / data.units_per_em;
        text.chars()
            .map(|ch| match face.glyph_index(ch) {
                Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                None => font_size * key.class.average_advance(key.bold),
            })
            .sum()
    }

    /// Distance from the top of a line box to the baseline, in points.
    pub fn ascender(&self, font_size: f32, key: &FontKey) -> f32 {
        match self.fonts.get(key) {
            Some(data) => data.ascender * font_size / data.units_per_em,
            None => font_size * 0.75,
        }
    }
}

/// Word-wrap `text` into lines no wider than `max_width` points. The first
/// line is shortened by `first_line_indent`. A word longer than a line gets
/// a line of its own.
pub fn wrap_text(
    text: &str,
    key: &FontKey,
    font_size: f32,
    max_width: f32,
    first_line_indent: f32,
    fonts: &FontManager,
) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    if max_width <= 0.0 {
        return vec![words.join(" ")];
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in words {
        let available = if lines.is_empty() {
            max_width - first_line_indent
        } else {
            max_width
        };
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if !current.is_empty() && fonts.measure_text_width(&candidate, font_size, key) > available
        {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// A minimal TrueType face: 1000 units/em, ascender 800, `a`-`z` advance
/// 500 units, space 250. Other characters are unmapped.
#[cfg(test)]
pub(crate) fn sample_face() -> Vec<u8> {
    fn be16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }
    fn be32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }
    // .notdef, a-z, space
    const GLYPHS: u16 = 28;
    const SPACE_GLYPH: u32 = 27;

    let mut cmap = Vec::new();
    be16(&mut cmap, 0);
    be16(&mut cmap, 1);
    be16(&mut cmap, 0); // Unicode platform
    be16(&mut cmap, 4);
    be32(&mut cmap, 12);
    be16(&mut cmap, 12); // format 12 subtable
    be16(&mut cmap, 0);
    be32(&mut cmap, 16 + 2 * 12);
    be32(&mut cmap, 0);
    be32(&mut cmap, 2);
    for (start, end, glyph) in [(0x20, 0x20, SPACE_GLYPH), (0x61, 0x7A, 1)] {
        be32(&mut cmap, start);
        be32(&mut cmap, end);
        be32(&mut cmap, glyph);
    }

    let mut head = vec![0u8; 54];
    head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
    head[18..20].copy_from_slice(&1000u16.to_be_bytes());

    let mut hhea = vec![0u8; 36];
    hhea[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    hhea[4..6].copy_from_slice(&800i16.to_be_bytes());
    hhea[6..8].copy_from_slice(&(-200i16).to_be_bytes());
    hhea[34..36].copy_from_slice(&GLYPHS.to_be_bytes());

    let mut hmtx = Vec::new();
    for glyph in 0..GLYPHS {
        be16(&mut hmtx, if u32::from(glyph) == SPACE_GLYPH { 250 } else { 500 });
        be16(&mut hmtx, 0);
    }

    let mut maxp = Vec::new();
    be32(&mut maxp, 0x0000_5000);
    be16(&mut maxp, GLYPHS);

    // Table records must be sorted by tag.
    let tables: [(&[u8; 4], Vec<u8>); 5] = [
        (b"cmap", cmap),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"maxp", maxp),
    ];
    let directory_len = 12 + 16 * tables.len();
    let mut font = Vec::new();
    be32(&mut font, 0x0001_0000);
    be16(&mut font, tables.len() as u16);
    be16(&mut font, 0);
    be16(&mut font, 0);
    be16(&mut font, 0);
    let mut body = Vec::new();
    for (tag, data) in &tables {
        font.extend_from_slice(*tag);
        be32(&mut font, 0);
        be32(&mut font, (directory_len + body.len()) as u32);
        be32(&mut font, data.len() as u32);
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
    }
    font.extend_from_slice(&body);
    font
}
