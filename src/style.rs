//! Style applier and CSS resolution.
//!
//! [`apply`] classifies every block of a [`Document`] and pairs it with the
//! flattened attributes of its template category, producing a new
//! [`StyledDocument`]. The document itself is never touched.
//!
//! [`ComputedStyle`] goes the other way for the built-in layout engine: it
//! resolves the inline CSS the renderers emit into concrete point values.

use serde::{Deserialize, Serialize};

use crate::document::{Block, Document};
use crate::error::{FormatError, Result};
use crate::markup::MarkupWriter;
use crate::template::{Attributes, Category, RuleSet, Template};
use crate::units::Dimension;

// ---------------------------------------------------------------------------
// Resolved styles
// ---------------------------------------------------------------------------

/// The flattened attributes that apply to one block: the global `text`
/// category overlaid beneath the block's own category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedStyle {
    attributes: Attributes,
}

impl ResolvedStyle {
    /// `specific` attributes win over `global` ones.
    pub fn resolve(global: &Attributes, specific: &Attributes) -> Self {
        let mut attributes = global.clone();
        attributes.extend(specific.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { attributes }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn dimension(&self, name: &str) -> Option<Dimension> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// A copy with `defaults` filled in for attributes this style lacks.
    pub fn with_defaults(&self, defaults: &[(&str, &str)]) -> Self {
        let mut attributes = self.attributes.clone();
        for (name, value) in defaults {
            attributes
                .entry(name.to_string())
                .or_insert_with(|| value.to_string());
        }
        Self { attributes }
    }

    /// Inline CSS declarations, e.g. `font-size: 12pt; text-align: center`.
    pub fn to_css(&self) -> String {
        self.attributes
            .iter()
            .map(|(name, value)| {
                let property = css_property(name);
                if name == "fontFamily" {
                    format!("{property}: \"{}\"", value.replace('"', ""))
                } else {
                    format!("{property}: {value}")
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// `marginTop` → `margin-top`.
pub fn css_property(attribute: &str) -> String {
    let mut out = String::with_capacity(attribute.len() + 4);
    for c in attribute.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Styled document
// ---------------------------------------------------------------------------

/// One block paired with its resolved style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyledBlock {
    /// Position of the block in the source document.
    pub index: usize,
    pub block: Block,
    pub category: Category,
    pub style: ResolvedStyle,
    /// Style of the author line, for title blocks that carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_style: Option<ResolvedStyle>,
}

/// A document with every block paired to its style under one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyledDocument {
    template_id: String,
    title: Option<String>,
    blocks: Vec<StyledBlock>,
}

impl StyledDocument {
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// The manuscript title, if it has a title block.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn blocks(&self) -> &[StyledBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Attributes every block element states explicitly, so a renderer never
/// depends on a viewer's own defaults for them.
pub const BLOCK_DEFAULTS: &[(&str, &str)] = &[
    ("fontStyle", "normal"),
    ("fontWeight", "normal"),
    ("marginBottom", "0pt"),
    ("marginTop", "0pt"),
    ("textAlign", "left"),
    ("textIndent", "0pt"),
];

/// Element name and class a category is written as.
pub fn markup_element(category: Category) -> (&'static str, &'static str) {
    match category {
        Category::TitlePageTitle => ("p", "title"),
        Category::TitlePageAuthor => ("p", "author"),
        Category::ChapterTitle => ("h1", "chapter-title"),
        Category::SectionTitle => ("h2", "section-title"),
        Category::ChapterFirstParagraph => ("p", "first-paragraph"),
        _ => ("p", "paragraph"),
    }
}

impl StyledDocument {
    /// Write one element per block (two for a title with an author line),
    /// in document order, each carrying its style inline. `defaults` supplies
    /// per-category attributes to fill in where the style has none.
    pub fn write_markup<F>(&self, w: &mut MarkupWriter, defaults: F)
    where
        F: Fn(Category) -> Vec<(&'static str, &'static str)>,
    {
        let mut write = |category: Category, style: &ResolvedStyle, text: &str| {
            let css = style.with_defaults(&defaults(category)).to_css();
            let (tag, class) = markup_element(category);
            w.text_element(tag, &[("class", class), ("style", css.as_str())], text);
        };
        for styled in &self.blocks {
            write(styled.category, &styled.style, styled.block.text());
            if let (Block::TitleBlock { author_text, .. }, Some(author_style)) =
                (&styled.block, &styled.author_style)
            {
                write(Category::TitlePageAuthor, author_style, author_text);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Applier
// ---------------------------------------------------------------------------

fn lookup(rules: &RuleSet, category: Category, index: usize) -> Result<&Attributes> {
    rules.get(category).ok_or(FormatError::MissingCategory {
        category,
        block_index: Some(index),
    })
}

/// Classify each block and attach its style.
///
/// A single forward pass tracks how many paragraphs the current chapter has
/// seen; the first one (after a chapter heading or the start of the
/// document) gets `chapter.firstParagraph`, the rest `chapter.paragraph`.
/// The template is not assumed to be valid: a category missing for a block
/// that needs it fails with [`FormatError::MissingCategory`].
pub fn apply(document: &Document, template: &Template) -> Result<StyledDocument> {
    let rules = &template.rules;
    let mut paragraphs_in_chapter = 0usize;
    let mut blocks = Vec::with_capacity(document.len());

    for (index, block) in document.blocks().iter().enumerate() {
        let (category, block) = match block {
            Block::TitleBlock { .. } => (Category::TitlePageTitle, block.clone()),
            Block::ChapterHeading { .. } => {
                paragraphs_in_chapter = 0;
                (Category::ChapterTitle, block.clone())
            }
            Block::SectionHeading { .. } => (Category::SectionTitle, block.clone()),
            Block::Paragraph { text, .. } => {
                let first = paragraphs_in_chapter == 0;
                paragraphs_in_chapter += 1;
                let category = if first {
                    Category::ChapterFirstParagraph
                } else {
                    Category::ChapterParagraph
                };
                (
                    category,
                    Block::Paragraph {
                        text: text.clone(),
                        is_first_in_chapter: first,
                    },
                )
            }
        };

        let global = lookup(rules, Category::Text, index)?;
        let style = ResolvedStyle::resolve(global, lookup(rules, category, index)?);
        let author_style = match &block {
            Block::TitleBlock { author_text, .. } if !author_text.is_empty() => Some(
                ResolvedStyle::resolve(global, lookup(rules, Category::TitlePageAuthor, index)?),
            ),
            _ => None,
        };

        blocks.push(StyledBlock {
            index,
            block,
            category,
            style,
            author_style,
        });
    }

    log::debug!(
        "styled {} blocks with template '{}'",
        blocks.len(),
        template.id
    );
    Ok(StyledDocument {
        template_id: template.id.clone(),
        title: document.title().map(str::to_string),
        blocks,
    })
}

// ---------------------------------------------------------------------------
// Computed style (inline CSS → points)
// ---------------------------------------------------------------------------

/// Font size used when a declaration list does not set one.
pub const DEFAULT_FONT_SIZE_PT: f32 = 12.0;

/// Fully resolved style for one block element, in points.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub font_family: String,
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub color: Color,
    pub text_align: TextAlign,
    /// Multiple of the font size.
    pub line_height: f32,
    pub text_indent: f32,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub orphans: usize,
    pub widows: usize,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            font_family: "Times New Roman".to_string(),
            font_size: DEFAULT_FONT_SIZE_PT,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.2,
            text_indent: 0.0,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            page_break_before: false,
            page_break_after: false,
            orphans: 2,
            widows: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
    Justify,
}

/// RGB colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            3 => Some(Self {
                r: channel(&hex[0..1].repeat(2))?,
                g: channel(&hex[1..2].repeat(2))?,
                b: channel(&hex[2..3].repeat(2))?,
            }),
            _ => None,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl ComputedStyle {
    /// Resolve an inline `style` attribute. Unknown properties and
    /// unparseable values are ignored and keep their defaults.
    pub fn from_inline(css: &str) -> Self {
        let declarations = parse_declarations(css);
        let mut style = ComputedStyle::default();

        // `em` lengths are relative to the element's own font size.
        if let Some((_, value)) = declarations.iter().rev().find(|(p, _)| *p == "font-size") {
            if let Some(size) = parse_length(value, DEFAULT_FONT_SIZE_PT) {
                if size > 0.0 {
                    style.font_size = size;
                }
            }
        }
        for (property, value) in &declarations {
            apply_css_property(&mut style, property, value);
        }
        style
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }

    /// Distance between baselines, in points.
    pub fn line_advance(&self) -> f32 {
        self.font_size * self.line_height
    }
}

fn parse_declarations(css: &str) -> Vec<(String, String)> {
    css.split(';')
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some((property, value.to_string()))
        })
        .collect()
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    match prop {
        "font-family" => {
            let family = val
                .split(',')
                .next()
                .unwrap_or(val)
                .trim()
                .trim_matches(|c| c == '"' || c == '\'');
            if !family.is_empty() {
                s.font_family = family.to_string();
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "color" => {
            if let Some(c) = Color::from_hex(val) {
                s.color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" => TextAlign::Right,
                "justify" => TextAlign::Justify,
                _ => TextAlign::Left,
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                if v > 0.0 {
                    s.line_height = v;
                }
            } else if let Some(pt) = parse_length(val, s.font_size) {
                if pt > 0.0 {
                    s.line_height = pt / s.font_size;
                }
            }
        }
        "text-indent" => set_length(&mut s.text_indent, val, s.font_size),
        "margin-top" => set_length(&mut s.margin_top, val, s.font_size),
        "margin-right" => set_length(&mut s.margin_right, val, s.font_size),
        "margin-bottom" => set_length(&mut s.margin_bottom, val, s.font_size),
        "margin-left" => set_length(&mut s.margin_left, val, s.font_size),
        "page-break-before" | "break-before" => {
            s.page_break_before = val == "always" || val == "page";
        }
        "page-break-after" | "break-after" => {
            s.page_break_after = val == "always" || val == "page";
        }
        "orphans" => {
            if let Ok(n) = val.parse::<usize>() {
                s.orphans = n.max(1);
            }
        }
        "widows" => {
            if let Ok(n) = val.parse::<usize>() {
                s.widows = n.max(1);
            }
        }
        _ => {}
    }
}

fn set_length(target: &mut f32, val: &str, font_size: f32) {
    if let Some(pt) = parse_length(val, font_size) {
        *target = pt;
    }
}

/// A dimension in points; bare `0` is accepted as in CSS.
fn parse_length(val: &str, font_size: f32) -> Option<f32> {
    if val.trim() == "0" {
        return Some(0.0);
    }
    val.parse::<Dimension>()
        .ok()
        .map(|d| d.to_points(font_size))
}
