//! Document model – the structural representation of a manuscript as an
//! ordered sequence of typed blocks.
//!
//! A [`Document`] is immutable once built. Construction normalizes the
//! `is_first_in_chapter` flag on every paragraph so the invariant holds no
//! matter what the source decoder produced.

use serde::{Deserialize, Serialize};

/// One structural unit of a manuscript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Block {
    /// Book title with its author line.
    #[serde(rename_all = "camelCase")]
    TitleBlock { text: String, author_text: String },
    ChapterHeading { text: String },
    SectionHeading { text: String },
    #[serde(rename_all = "camelCase")]
    Paragraph {
        text: String,
        is_first_in_chapter: bool,
    },
}

impl Block {
    pub fn title(text: impl Into<String>, author: impl Into<String>) -> Self {
        Block::TitleBlock {
            text: text.into(),
            author_text: author.into(),
        }
    }

    pub fn chapter(text: impl Into<String>) -> Self {
        Block::ChapterHeading { text: text.into() }
    }

    pub fn section(text: impl Into<String>) -> Self {
        Block::SectionHeading { text: text.into() }
    }

    /// A paragraph whose chapter position is not yet known.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph {
            text: text.into(),
            is_first_in_chapter: false,
        }
    }

    /// The main text run of the block.
    pub fn text(&self) -> &str {
        match self {
            Block::TitleBlock { text, .. }
            | Block::ChapterHeading { text }
            | Block::SectionHeading { text }
            | Block::Paragraph { text, .. } => text,
        }
    }

    /// Short name of the block variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Block::TitleBlock { .. } => "title",
            Block::ChapterHeading { .. } => "chapter heading",
            Block::SectionHeading { .. } => "section heading",
            Block::Paragraph { .. } => "paragraph",
        }
    }

    pub fn is_first_in_chapter(&self) -> bool {
        matches!(
            self,
            Block::Paragraph {
                is_first_in_chapter: true,
                ..
            }
        )
    }
}

/// An ordered, immutable sequence of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    /// Build a document, recomputing every paragraph's `is_first_in_chapter`.
    ///
    /// The first paragraph after each chapter heading (or after the start of
    /// the document when no heading precedes it) is flagged; every other
    /// paragraph is not. Section headings do not start a new chapter segment.
    pub fn new(blocks: Vec<Block>) -> Self {
        let mut seen_paragraph = false;
        let blocks = blocks
            .into_iter()
            .map(|block| match block {
                Block::ChapterHeading { .. } => {
                    seen_paragraph = false;
                    block
                }
                Block::Paragraph { text, .. } => {
                    let first = !seen_paragraph;
                    seen_paragraph = true;
                    Block::Paragraph {
                        text,
                        is_first_in_chapter: first,
                    }
                }
                other => other,
            })
            .collect();
        Self { blocks }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Text of the first title block, if the manuscript has one.
    pub fn title(&self) -> Option<&str> {
        self.blocks.iter().find_map(|b| match b {
            Block::TitleBlock { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn chapter_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::ChapterHeading { .. }))
            .count()
    }
}

impl From<Vec<Block>> for Document {
    fn from(blocks: Vec<Block>) -> Self {
        Self::new(blocks)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            blocks: Vec<Block>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Document::new(raw.blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(doc: &Document) -> Vec<bool> {
        doc.blocks()
            .iter()
            .filter(|b| matches!(b, Block::Paragraph { .. }))
            .map(Block::is_first_in_chapter)
            .collect()
    }

    #[test]
    fn first_paragraph_per_chapter_is_flagged() {
        let doc = Document::new(vec![
            Block::chapter("Ch.1"),
            Block::paragraph("A"),
            Block::paragraph("B"),
            Block::chapter("Ch.2"),
            Block::paragraph("C"),
        ]);
        assert_eq!(flags(&doc), vec![true, false, true]);
    }

    #[test]
    fn leading_paragraphs_without_heading() {
        let doc = Document::new(vec![
            Block::paragraph("Prologue"),
            Block::paragraph("More"),
            Block::chapter("One"),
            Block::paragraph("Body"),
        ]);
        assert_eq!(flags(&doc), vec![true, false, true]);
    }

    #[test]
    fn section_heading_does_not_reset_chapter() {
        let doc = Document::new(vec![
            Block::chapter("One"),
            Block::paragraph("A"),
            Block::section("1.1"),
            Block::paragraph("B"),
        ]);
        assert_eq!(flags(&doc), vec![true, false]);
    }

    #[test]
    fn decoder_flags_are_not_trusted() {
        let doc = Document::new(vec![
            Block::chapter("One"),
            Block::Paragraph {
                text: "A".into(),
                is_first_in_chapter: false,
            },
            Block::Paragraph {
                text: "B".into(),
                is_first_in_chapter: true,
            },
        ]);
        assert_eq!(flags(&doc), vec![true, false]);
    }

    #[test]
    fn chapter_without_paragraphs_has_no_flag() {
        let doc = Document::new(vec![
            Block::chapter("Empty"),
            Block::chapter("Full"),
            Block::paragraph("A"),
        ]);
        assert_eq!(flags(&doc), vec![true]);
        assert_eq!(doc.chapter_count(), 2);
    }

    #[test]
    fn deserialized_document_is_normalized() {
        let json = r#"{"blocks":[
            {"kind":"chapterHeading","text":"One"},
            {"kind":"paragraph","text":"A","isFirstInChapter":false}
        ]}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(flags(&doc), vec![true]);
    }
}
