//! Flow layout – turns styled markup into a flat list of line-broken blocks
//! in document order, ready for pagination.
//!
//! Book content is a single column, so every text-block element (`p`,
//! `h1`–`h6`, `li`) becomes one [`FlowBlock`] spanning the content width
//! minus its own horizontal margins.

use crate::fonts::{wrap_text, FontKey, FontManager};
use crate::markup::{self, Element, Node, Tag};
use crate::style::ComputedStyle;

/// A block of wrapped lines in document order (before page splitting).
#[derive(Debug, Clone)]
pub struct FlowBlock {
    pub style: ComputedStyle,
    pub font: FontKey,
    pub lines: Vec<String>,
    /// Width available to the lines, in points.
    pub width: f32,
    /// Headings cannot be split and stay with the block that follows.
    pub keep_with_next: bool,
}

impl FlowBlock {
    pub fn line_advance(&self) -> f32 {
        self.style.line_advance()
    }

    pub fn height(&self) -> f32 {
        self.lines.len() as f32 * self.line_advance()
    }
}

/// Parsed markup: the `<title>` text and the flowed blocks.
#[derive(Debug, Clone)]
pub struct Flow {
    pub title: Option<String>,
    pub blocks: Vec<FlowBlock>,
}

/// Parse `markup` and break every text block into lines for a content area
/// `content_width` points wide.
pub fn compute_flow(markup_src: &str, content_width: f32, fonts: &FontManager) -> Flow {
    let nodes = markup::parse_html(markup_src);
    let title = markup::find_element(&nodes, &Tag::Title)
        .map(Element::text_content)
        .filter(|t| !t.is_empty());

    let mut blocks = Vec::new();
    collect(&markup::body_children(&nodes), content_width, fonts, &mut blocks);
    log::debug!("flowed {} blocks at {content_width}pt", blocks.len());
    Flow { title, blocks }
}

fn collect(nodes: &[Node], content_width: f32, fonts: &FontManager, out: &mut Vec<FlowBlock>) {
    for node in nodes {
        let Node::Element(e) = node else {
            continue;
        };
        if matches!(e.tag, Tag::Head | Tag::Script | Tag::Style) {
            continue;
        }
        if !e.tag.is_text_block() {
            collect(&e.children, content_width, fonts, out);
            continue;
        }
        let text = e.text_content();
        if text.is_empty() {
            continue;
        }

        let style = ComputedStyle::from_inline(e.inline_style().unwrap_or_default());
        let font = FontKey::new(&style.font_family, style.is_bold(), style.is_italic());
        let width = (content_width - style.margin_left - style.margin_right).max(0.0);
        let lines = wrap_text(&text, &font, style.font_size, width, style.text_indent, fonts);
        out.push(FlowBlock {
            keep_with_next: matches!(e.tag, Tag::Heading(_)),
            style,
            font,
            lines,
            width,
        });
    }
}
