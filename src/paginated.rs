//! Paginated renderer – styled document → fixed-page artifact.
//!
//! Converts the template's page geometry to engine units, writes the styled
//! markup the layout engine consumes and runs the engine under a timeout.
//! The engine session is held by a [`SessionGuard`] for the whole render, so
//! it is released on success, engine error, timeout and crash alike.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::engine::{LayoutEngine, PageConstraints, PrintPdfEngine, SessionGuard};
use crate::error::{EngineError, FormatError, Result, TemplateError};
use crate::markup::MarkupWriter;
use crate::style::{StyledDocument, BLOCK_DEFAULTS};
use crate::template::{Category, RuleSet};
use crate::units::Dimension;

/// Media type of the built-in engine's output.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Timeout applied when none is configured.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

/// Orphan and widow minimum for paragraphs whose style sets none.
pub const DEFAULT_LINE_MINIMUM: &str = "2";

/// Page box in author-facing units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: Dimension,
    pub height: Dimension,
}

/// Page margins in author-facing units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Dimension,
    pub right: Dimension,
    pub bottom: Dimension,
    pub left: Dimension,
}

/// Page size and margins read from a rule set's `page.size` and
/// `page.margin` categories.
pub fn page_setup(rules: &RuleSet, template_id: &str) -> Result<(PageSize, Margins)> {
    let read = |category: Category, attribute: &str| -> Result<Dimension> {
        let attrs = rules.get(category).ok_or(FormatError::MissingCategory {
            category,
            block_index: None,
        })?;
        let value = attrs.get(attribute).ok_or_else(|| TemplateError::MissingAttribute {
            template: template_id.to_string(),
            category,
            attribute: attribute.to_string(),
        })?;
        value.parse::<Dimension>().map_err(|_| {
            TemplateError::InvalidDimension {
                template: template_id.to_string(),
                category,
                attribute: attribute.to_string(),
                value: value.clone(),
            }
            .into()
        })
    };

    let size = PageSize {
        width: read(Category::PageSize, "width")?,
        height: read(Category::PageSize, "height")?,
    };
    let margins = Margins {
        top: read(Category::PageMargin, "top")?,
        right: read(Category::PageMargin, "right")?,
        bottom: read(Category::PageMargin, "bottom")?,
        left: read(Category::PageMargin, "left")?,
    };
    Ok((size, margins))
}

/// Convert author-facing page geometry to engine units, truncating
/// fractional points. `template_id` names the template in errors.
pub fn page_constraints(
    size: &PageSize,
    margins: &Margins,
    template_id: &str,
) -> Result<PageConstraints> {
    let convert = |d: Dimension, category: Category, attribute: &str| -> Result<u32> {
        d.to_engine_units().ok_or_else(|| {
            TemplateError::InvalidValue {
                template: template_id.to_string(),
                category,
                attribute: attribute.to_string(),
                value: d.to_string(),
                expected: "an absolute dimension (in or pt)",
            }
            .into()
        })
    };
    Ok(PageConstraints {
        width: convert(size.width, Category::PageSize, "width")?,
        height: convert(size.height, Category::PageSize, "height")?,
        margin_top: convert(margins.top, Category::PageMargin, "top")?,
        margin_right: convert(margins.right, Category::PageMargin, "right")?,
        margin_bottom: convert(margins.bottom, Category::PageMargin, "bottom")?,
        margin_left: convert(margins.left, Category::PageMargin, "left")?,
    })
}

/// Styled markup handed to the layout engine. Every block states its
/// typography explicitly and every paragraph its orphan/widow minimums.
pub fn paginated_markup(doc: &StyledDocument) -> String {
    let mut w = MarkupWriter::new();
    w.document_start(doc.title().unwrap_or("Untitled"), &[]);
    doc.write_markup(&mut w, |category| {
        let mut defaults = BLOCK_DEFAULTS.to_vec();
        if matches!(
            category,
            Category::ChapterFirstParagraph | Category::ChapterParagraph
        ) {
            defaults.push(("orphans", DEFAULT_LINE_MINIMUM));
            defaults.push(("widows", DEFAULT_LINE_MINIMUM));
        }
        defaults
    });
    w.document_end();
    w.finish()
}

/// A rendered fixed-layout document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedArtifact {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    /// The page box the engine was given.
    pub constraints: PageConstraints,
}

impl PaginatedArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Drives a [`LayoutEngine`] to paginate styled documents.
#[derive(Clone)]
pub struct PaginatedRenderer {
    engine: Arc<dyn LayoutEngine>,
    timeout: Duration,
}

impl std::fmt::Debug for PaginatedRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedRenderer")
            .field("engine", &self.engine.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for PaginatedRenderer {
    fn default() -> Self {
        Self::new(Arc::new(PrintPdfEngine::new()), DEFAULT_ENGINE_TIMEOUT)
    }
}

impl PaginatedRenderer {
    pub fn new(engine: Arc<dyn LayoutEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn render(
        &self,
        doc: &StyledDocument,
        size: &PageSize,
        margins: &Margins,
    ) -> Result<PaginatedArtifact> {
        let constraints = page_constraints(size, margins, doc.template_id())?;
        log::debug!(
            "page box {}x{}pt, margins {}/{}/{}/{}pt",
            constraints.width,
            constraints.height,
            constraints.margin_top,
            constraints.margin_right,
            constraints.margin_bottom,
            constraints.margin_left
        );
        let markup = paginated_markup(doc);

        let guard = SessionGuard::acquire(self.engine.as_ref())?;
        let session = guard.session().ok_or(EngineError::Crashed)?;

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::Builder::new()
            .name("layout-engine".into())
            .spawn(move || {
                // The receiver is gone if we already timed out.
                let _ = tx.send(session.render(&markup, &constraints));
            })?;

        let bytes = match rx.recv_timeout(self.timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "layout engine '{}' timed out after {:?}",
                    self.engine.name(),
                    self.timeout
                );
                return Err(FormatError::RenderTimeout {
                    timeout: self.timeout,
                });
            }
            Err(RecvTimeoutError::Disconnected) => return Err(EngineError::Crashed.into()),
        };
        drop(guard);

        if bytes.is_empty() {
            return Err(FormatError::EmptyArtifact {
                renderer: "paginated",
            });
        }
        log::debug!("paginated artifact: {} bytes", bytes.len());
        Ok(PaginatedArtifact {
            bytes,
            media_type: PDF_MEDIA_TYPE,
            constraints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Block, Document};
    use crate::engine::EngineSession;
    use crate::markup::{self, Node};
    use crate::style::apply;
    use crate::template::{fiction_template, standard_rules};

    fn styled() -> StyledDocument {
        let doc = Document::new(vec![
            Block::chapter("Ch.1"),
            Block::paragraph("A"),
            Block::paragraph("B"),
        ]);
        apply(&doc, &fiction_template()).unwrap()
    }

    #[test]
    fn standard_page_setup_converts_to_points() {
        let (size, margins) = page_setup(&standard_rules(), "standard").unwrap();
        let c = page_constraints(&size, &margins, "standard").unwrap();
        assert_eq!((c.width, c.height), (432, 648));
        assert_eq!(
            (c.margin_top, c.margin_right, c.margin_bottom, c.margin_left),
            (54, 54, 54, 54)
        );
    }

    #[test]
    fn one_inch_margin_is_72_units() {
        let size = PageSize {
            width: "6in".parse().unwrap(),
            height: "9in".parse().unwrap(),
        };
        let inch = "1in".parse().unwrap();
        let margins = Margins {
            top: inch,
            right: inch,
            bottom: inch,
            left: "0.3in".parse().unwrap(),
        };
        let c = page_constraints(&size, &margins, "t").unwrap();
        assert_eq!(c.margin_top, 72);
        assert_eq!(c.margin_left, 21);
        assert_eq!(c.width, 432);
    }

    #[test]
    fn relative_page_units_are_rejected() {
        let size = PageSize {
            width: "30em".parse().unwrap(),
            height: "9in".parse().unwrap(),
        };
        let m = "1in".parse().unwrap();
        let margins = Margins {
            top: m,
            right: m,
            bottom: m,
            left: m,
        };
        match page_constraints(&size, &margins, "wide") {
            Err(FormatError::Template(TemplateError::InvalidValue {
                template,
                category,
                attribute,
                ..
            })) => {
                assert_eq!(template, "wide");
                assert_eq!(category, Category::PageSize);
                assert_eq!(attribute, "width");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn missing_page_category_is_reported() {
        let mut rules = standard_rules();
        rules.remove(Category::PageMargin);
        assert!(matches!(
            page_setup(&rules, "t"),
            Err(FormatError::MissingCategory {
                category: Category::PageMargin,
                block_index: None
            })
        ));
    }

    #[test]
    fn markup_carries_paragraph_minimums() {
        let html = paginated_markup(&styled());
        let nodes = markup::parse_html(&html);
        let styles: Vec<String> = markup::body_children(&nodes)
            .iter()
            .filter_map(|n| match n {
                Node::Element(e) => e.inline_style().map(str::to_string),
                Node::Text(_) => None,
            })
            .collect();
        assert_eq!(styles.len(), 3);
        assert!(styles[0].contains("page-break-before: always"));
        assert!(!styles[0].contains("orphans"));
        // First paragraph: category has no minimums, defaults fill them in.
        assert!(styles[1].contains("orphans: 2") && styles[1].contains("widows: 2"));
        assert!(styles[2].contains("widows: 2"));
    }

    struct EmptyEngine;
    struct EmptySession;

    impl LayoutEngine for EmptyEngine {
        fn name(&self) -> &str {
            "empty"
        }
        fn launch(&self) -> std::result::Result<Arc<dyn EngineSession>, EngineError> {
            Ok(Arc::new(EmptySession))
        }
    }

    impl EngineSession for EmptySession {
        fn render(
            &self,
            _: &str,
            _: &PageConstraints,
        ) -> std::result::Result<Vec<u8>, EngineError> {
            Ok(Vec::new())
        }
        fn close(&self) -> std::result::Result<(), EngineError> {
            Ok(())
        }
    }

    #[test]
    fn empty_engine_output_is_an_error() {
        let renderer = PaginatedRenderer::new(Arc::new(EmptyEngine), Duration::from_secs(5));
        let (size, margins) = page_setup(&standard_rules(), "standard").unwrap();
        assert!(matches!(
            renderer.render(&styled(), &size, &margins),
            Err(FormatError::EmptyArtifact {
                renderer: "paginated"
            })
        ));
    }

    #[test]
    fn builtin_engine_produces_pdf() {
        let (size, margins) = page_setup(&standard_rules(), "standard").unwrap();
        let artifact = PaginatedRenderer::default()
            .render(&styled(), &size, &margins)
            .unwrap();
        assert_eq!(artifact.media_type, PDF_MEDIA_TYPE);
        assert_eq!(&artifact.bytes[0..5], b"%PDF-");
        assert_eq!(artifact.constraints.width, 432);
    }
}
