//! Source decoders – turn manuscript bytes into a [`Document`].
//!
//! Decoding keeps only the structural distinction between titles, headings
//! and paragraphs plus their text; any rich formatting in the source is
//! discarded and replaced by the template's rules.

use crate::document::{Block, Document};
use crate::error::DecodeError;
use crate::markup::{self, Element, Node, Tag};

/// Converts source bytes into the structural document model.
pub trait SourceDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Document, DecodeError>;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

fn utf8(bytes: &[u8]) -> Result<&str, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidEncoding {
        valid_up_to: e.valid_up_to(),
    })?;
    Ok(text.strip_prefix('\u{FEFF}').unwrap_or(text))
}

fn finish(blocks: Vec<Block>) -> Result<Document, DecodeError> {
    if blocks.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(Document::new(blocks))
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

/// Decodes the HTML a word-processor export produces.
///
/// `h1` starts a chapter, `h2`–`h6` are section headings, `p` and `li` are
/// paragraphs. An element with class `title` becomes the title block; an
/// element with class `author` or `subtitle` right after it supplies the
/// author line.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlDecoder;

impl SourceDecoder for HtmlDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Document, DecodeError> {
        let html = utf8(bytes)?;
        let nodes = markup::parse_html(html);
        let body = markup::body_children(&nodes);

        let mut blocks = Vec::new();
        collect_blocks(&body, &mut blocks);
        log::debug!("html decoder produced {} blocks", blocks.len());
        finish(blocks)
    }

    fn name(&self) -> &'static str {
        "html"
    }
}

fn collect_blocks(nodes: &[Node], blocks: &mut Vec<Block>) {
    for node in nodes {
        match node {
            Node::Element(e) => collect_element(e, blocks),
            Node::Text(text) => {
                // Bare text directly inside a container reads as a paragraph.
                let text = markup::collapse_whitespace(text);
                if !text.is_empty() {
                    blocks.push(Block::paragraph(text));
                }
            }
        }
    }
}

fn collect_element(e: &Element, blocks: &mut Vec<Block>) {
    if matches!(e.tag, Tag::Head | Tag::Script | Tag::Style | Tag::Title) {
        return;
    }

    if e.has_class("title") {
        let text = e.text_content();
        if !text.is_empty() {
            blocks.push(Block::title(text, ""));
        }
        return;
    }
    if e.has_class("author") || e.has_class("subtitle") {
        let text = e.text_content();
        if let Some(Block::TitleBlock { author_text, .. }) = blocks.last_mut() {
            if author_text.is_empty() {
                *author_text = text;
                return;
            }
        }
        if !text.is_empty() {
            blocks.push(Block::paragraph(text));
        }
        return;
    }

    match e.tag {
        Tag::Heading(level) => {
            let text = e.text_content();
            if text.is_empty() {
                return;
            }
            blocks.push(if level == 1 {
                Block::chapter(text)
            } else {
                Block::section(text)
            });
        }
        Tag::P | Tag::Li => {
            // A list item may wrap its own paragraphs.
            if e.tag == Tag::Li && has_block_children(e) {
                collect_blocks(&e.children, blocks);
                return;
            }
            let text = e.text_content();
            if !text.is_empty() {
                blocks.push(Block::paragraph(text));
            }
        }
        ref tag if tag.is_inline() => {
            let text = e.text_content();
            if !text.is_empty() {
                blocks.push(Block::paragraph(text));
            }
        }
        _ => collect_blocks(&e.children, blocks),
    }
}

fn has_block_children(e: &Element) -> bool {
    e.children
        .iter()
        .any(|c| matches!(c, Node::Element(child) if !child.tag.is_inline()))
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

/// Decodes plain-text manuscripts.
///
/// Leading `% ` lines give the title and author. `# ` starts a chapter,
/// `## ` (or deeper) a section. Paragraphs are separated by blank lines;
/// lines within a paragraph are joined with spaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDecoder;

impl SourceDecoder for TextDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Document, DecodeError> {
        let text = utf8(bytes)?;
        let mut blocks = Vec::new();
        let mut lines = text.lines().peekable();

        // Title block
        let mut header = Vec::new();
        while let Some(line) = lines.peek() {
            match line.trim_start().strip_prefix('%') {
                Some(rest) => {
                    header.push(rest.trim().to_string());
                    lines.next();
                }
                None => break,
            }
        }
        if let Some(title) = header.first().filter(|t| !t.is_empty()) {
            let author = header.get(1).cloned().unwrap_or_default();
            blocks.push(Block::title(title.clone(), author));
        }

        let mut paragraph: Vec<&str> = Vec::new();
        let flush = |paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>| {
            if !paragraph.is_empty() {
                let joined = markup::collapse_whitespace(&paragraph.join(" "));
                if !joined.is_empty() {
                    blocks.push(Block::paragraph(joined));
                }
                paragraph.clear();
            }
        };

        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                flush(&mut paragraph, &mut blocks);
                continue;
            }
            if let Some(heading) = heading_level(trimmed) {
                flush(&mut paragraph, &mut blocks);
                let (level, text) = heading;
                if text.is_empty() {
                    continue;
                }
                blocks.push(if level == 1 {
                    Block::chapter(text)
                } else {
                    Block::section(text)
                });
                continue;
            }
            paragraph.push(trimmed);
        }
        flush(&mut paragraph, &mut blocks);

        log::debug!("text decoder produced {} blocks", blocks.len());
        finish(blocks)
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// `# Heading` → `(1, "Heading")`. Requires a space after the hashes.
fn heading_level(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    Some((level, markup::collapse_whitespace(rest)))
}

/// Pick a decoder from a file extension (`html`, `htm`, `xhtml`, `txt`, `text`, `md`).
pub fn decoder_for_extension(ext: &str) -> Option<Box<dyn SourceDecoder>> {
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" | "xhtml" => Some(Box::new(HtmlDecoder)),
        "txt" | "text" | "md" => Some(Box::new(TextDecoder)),
        _ => None,
    }
}
