//! Reflow renderer – styled document → reflowable XHTML.
//!
//! Every block becomes one element whose inline style carries the resolved
//! attributes (font, size, weight, alignment, indentation and spacing), so
//! an e-book viewer reproduces the template's hierarchy while reflowing text
//! to its own page size. The final encoding is left to a [`ReflowSerializer`].

use crate::error::{FormatError, Result};
use crate::markup::MarkupWriter;
use crate::style::{StyledDocument, BLOCK_DEFAULTS};

/// Media type of the default reflow output.
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// A rendered reflowable document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflowArtifact {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

impl ReflowArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encodes reflow markup into the output format's bytes.
pub trait ReflowSerializer: Send + Sync {
    fn media_type(&self) -> &'static str;

    fn serialize(&self, markup: &str) -> std::result::Result<Vec<u8>, String>;
}

/// Writes the markup as a standalone XHTML document.
#[derive(Debug, Default, Clone, Copy)]
pub struct XhtmlSerializer;

impl ReflowSerializer for XhtmlSerializer {
    fn media_type(&self) -> &'static str {
        XHTML_MEDIA_TYPE
    }

    fn serialize(&self, markup: &str) -> std::result::Result<Vec<u8>, String> {
        let mut bytes = Vec::with_capacity(markup.len() + 40);
        bytes.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        bytes.extend_from_slice(markup.as_bytes());
        Ok(bytes)
    }
}

/// Reflow markup for a styled document, before serialization.
pub fn reflow_markup(doc: &StyledDocument) -> String {
    let mut w = MarkupWriter::new();
    let generator = format!(
        "<meta name=\"template\" content=\"{}\"/>",
        crate::markup::escape(doc.template_id())
    );
    w.document_start(doc.title().unwrap_or("Untitled"), &[generator.as_str()]);
    doc.write_markup(&mut w, |_| BLOCK_DEFAULTS.to_vec());
    w.document_end();
    w.finish()
}

/// Renders styled documents through a [`ReflowSerializer`].
pub struct ReflowRenderer {
    serializer: Box<dyn ReflowSerializer>,
}

impl Default for ReflowRenderer {
    fn default() -> Self {
        Self::new(Box::new(XhtmlSerializer))
    }
}

impl std::fmt::Debug for ReflowRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflowRenderer")
            .field("media_type", &self.serializer.media_type())
            .finish()
    }
}

impl ReflowRenderer {
    pub fn new(serializer: Box<dyn ReflowSerializer>) -> Self {
        Self { serializer }
    }

    pub fn render(&self, doc: &StyledDocument) -> Result<ReflowArtifact> {
        let markup = reflow_markup(doc);
        let bytes = self
            .serializer
            .serialize(&markup)
            .map_err(FormatError::Reflow)?;
        if bytes.is_empty() {
            return Err(FormatError::EmptyArtifact { renderer: "reflow" });
        }
        log::debug!("reflow artifact: {} bytes", bytes.len());
        Ok(ReflowArtifact {
            bytes,
            media_type: self.serializer.media_type(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{HtmlDecoder, SourceDecoder};
    use crate::document::{Block, Document};
    use crate::markup::{self, Node, Tag};
    use crate::style::apply;
    use crate::template::fiction_template;

    fn styled() -> StyledDocument {
        let doc = Document::new(vec![
            Block::title("The Long Road", "A. Writer"),
            Block::chapter("One"),
            Block::paragraph("First & foremost."),
            Block::paragraph("Second."),
            Block::section("Aside"),
            Block::paragraph("Third."),
        ]);
        apply(&doc, &fiction_template()).unwrap()
    }

    fn elements(html: &str) -> Vec<markup::Element> {
        markup::body_children(&markup::parse_html(html))
            .into_iter()
            .filter_map(|n| match n {
                Node::Element(e) => Some(e),
                Node::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn blocks_keep_order_and_styles() {
        let html = reflow_markup(&styled());
        let els = elements(&html);
        let texts: Vec<String> = els.iter().map(|e| e.text_content()).collect();
        assert_eq!(
            texts,
            vec!["The Long Road", "A. Writer", "One", "First & foremost.", "Second.", "Aside", "Third."]
        );

        assert_eq!(els[2].tag, Tag::Heading(1));
        let heading = els[2].inline_style().unwrap();
        assert!(heading.contains("font-size: 18pt"));
        assert!(heading.contains("font-weight: bold"));
        assert!(heading.contains("page-break-before: always"));
        assert!(heading.contains("font-family: \"Times New Roman\""));

        let second = els[4].inline_style().unwrap();
        assert!(second.contains("text-indent: 0.25in"));
        assert!(second.contains("margin-bottom: 0.5em"));
        assert!(second.contains("text-align: left"));
        assert!(second.contains("font-weight: normal"));
        assert!(second.contains("font-size: 12pt"));
    }

    #[test]
    fn reflow_output_decodes_to_same_structure() {
        let artifact = ReflowRenderer::default().render(&styled()).unwrap();
        assert_eq!(artifact.media_type, XHTML_MEDIA_TYPE);
        assert!(artifact.bytes.starts_with(b"<?xml"));

        let decoded = HtmlDecoder.decode(&artifact.bytes).unwrap();
        let original: Vec<Block> = styled().blocks().iter().map(|b| b.block.clone()).collect();
        assert_eq!(decoded.blocks(), original.as_slice());
    }

    #[test]
    fn serializer_failures_surface() {
        struct Broken;
        impl ReflowSerializer for Broken {
            fn media_type(&self) -> &'static str {
                "application/epub+zip"
            }
            fn serialize(&self, _: &str) -> std::result::Result<Vec<u8>, String> {
                Err("zip writer failed".into())
            }
        }
        struct Empty;
        impl ReflowSerializer for Empty {
            fn media_type(&self) -> &'static str {
                "text/plain"
            }
            fn serialize(&self, _: &str) -> std::result::Result<Vec<u8>, String> {
                Ok(Vec::new())
            }
        }

        let err = ReflowRenderer::new(Box::new(Broken)).render(&styled()).unwrap_err();
        assert!(matches!(err, FormatError::Reflow(ref m) if m == "zip writer failed"));
        let err = ReflowRenderer::new(Box::new(Empty)).render(&styled()).unwrap_err();
        assert!(matches!(err, FormatError::EmptyArtifact { renderer: "reflow" }));
    }
}
