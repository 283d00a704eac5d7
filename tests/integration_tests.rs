//! Integration tests for the book-forge pipeline.
//!
//! These tests validate:
//! - Styling is deterministic and classifies blocks by chapter position
//! - Template merging and page geometry conversion
//! - Both artifacts are produced, or the request fails as a whole
//! - Template fallback, engine timeouts and session release

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use sha2::{Digest, Sha256};

use book_forge::decode::{HtmlDecoder, SourceDecoder, TextDecoder};
use book_forge::engine::{EngineSession, LayoutEngine, PageConstraints, PrintPdfEngine};
use book_forge::error::{EngineError, FormatError};
use book_forge::paginated::{page_constraints, page_setup, paginated_markup, PaginatedRenderer};
use book_forge::pipeline::{FormattingPipeline, PipelineConfig};
use book_forge::registry::TemplateRegistry;
use book_forge::style::{apply, StyledDocument};
use book_forge::template::{
    attrs, fiction_template, non_fiction_template, standard_rules, Category, RuleOverride, RuleSet,
};
use book_forge::units::Dimension;
use book_forge::{Block, Document};

// =====================================================================
// Helpers
// =====================================================================

fn two_chapters() -> Document {
    Document::new(vec![
        Block::chapter("Ch.1"),
        Block::paragraph("A"),
        Block::paragraph("B"),
        Block::chapter("Ch.2"),
        Block::paragraph("C"),
    ])
}

fn manuscript() -> &'static [u8] {
    br#"<html><body>
        <p class="title">The Long Road</p>
        <p class="author">A. Writer</p>
        <h1>Departure</h1>
        <p>It began on a Tuesday.</p>
        <p>Nobody noticed.</p>
        <h2>Later</h2>
        <p>Then everyone did.</p>
        <h1>Arrival</h1>
        <p>The road ended.</p>
    </body></html>"#
}

fn pipeline_with(engine: Arc<dyn LayoutEngine>, timeout: Duration) -> FormattingPipeline {
    let config = PipelineConfig::default().with_engine_timeout(timeout);
    FormattingPipeline::new(Arc::new(TemplateRegistry::with_builtin().unwrap()), config).with_engine(engine)
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn trade_paperback() -> PageConstraints {
    let (size, margins) = page_setup(&standard_rules(), "standard").unwrap();
    page_constraints(&size, &margins, "standard").unwrap()
}

// =====================================================================
// Engine doubles
// =====================================================================

/// Counts session launches and closes; renders after `delay`, echoing the
/// markup and page box so output is deterministic.
struct TrackingEngine {
    delay: Duration,
    fail: bool,
    launches: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl TrackingEngine {
    fn new(delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail,
            launches: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }
}

struct TrackingSession {
    delay: Duration,
    fail: bool,
    closes: Arc<AtomicUsize>,
}

impl LayoutEngine for TrackingEngine {
    fn name(&self) -> &str {
        "tracking"
    }

    fn launch(&self) -> Result<Arc<dyn EngineSession>, EngineError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TrackingSession {
            delay: self.delay,
            fail: self.fail,
            closes: Arc::clone(&self.closes),
        }))
    }
}

impl EngineSession for TrackingSession {
    fn render(&self, markup: &str, constraints: &PageConstraints) -> Result<Vec<u8>, EngineError> {
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(EngineError::Render("font not available".into()));
        }
        Ok(format!("{constraints:?}\n{markup}").into_bytes())
    }

    fn close(&self) -> Result<(), EngineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Every render waits until `parties` renders are in flight at once.
struct RendezvousEngine {
    barrier: Arc<Barrier>,
}

struct RendezvousSession {
    barrier: Arc<Barrier>,
}

impl LayoutEngine for RendezvousEngine {
    fn name(&self) -> &str {
        "rendezvous"
    }

    fn launch(&self) -> Result<Arc<dyn EngineSession>, EngineError> {
        Ok(Arc::new(RendezvousSession {
            barrier: Arc::clone(&self.barrier),
        }))
    }
}

impl EngineSession for RendezvousSession {
    fn render(&self, markup: &str, _: &PageConstraints) -> Result<Vec<u8>, EngineError> {
        self.barrier.wait();
        Ok(markup.as_bytes().to_vec())
    }

    fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

// =====================================================================
// Styling
// =====================================================================

#[test]
fn apply_is_deterministic() {
    let doc = HtmlDecoder.decode(manuscript()).unwrap();
    for template in [fiction_template(), non_fiction_template()] {
        let first = apply(&doc, &template).unwrap();
        let second = apply(&doc, &template).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}

#[test]
fn exactly_one_first_paragraph_per_chapter() {
    let doc = HtmlDecoder.decode(manuscript()).unwrap();
    let mut firsts_per_chapter = Vec::new();
    for block in doc.blocks() {
        match block {
            Block::ChapterHeading { .. } => firsts_per_chapter.push(0),
            Block::Paragraph { .. } if block.is_first_in_chapter() => {
                *firsts_per_chapter.last_mut().unwrap() += 1
            }
            _ => {}
        }
    }
    assert_eq!(firsts_per_chapter, vec![1, 1]);
}

#[test]
fn two_chapter_scenario_classification() {
    let styled = apply(&two_chapters(), &fiction_template()).unwrap();
    let by_text = |text: &str| {
        styled
            .blocks()
            .iter()
            .find(|b| b.block.text() == text)
            .unwrap()
    };

    assert_eq!(by_text("A").category, Category::ChapterFirstParagraph);
    assert_eq!(by_text("B").category, Category::ChapterParagraph);
    assert_eq!(by_text("C").category, Category::ChapterFirstParagraph);
    for heading in ["Ch.1", "Ch.2"] {
        let block = by_text(heading);
        assert_eq!(block.category, Category::ChapterTitle);
        assert_eq!(block.style.get("pageBreakBefore"), Some("always"));
    }
}

#[test]
fn global_text_category_fills_in_beneath() {
    let styled = apply(&two_chapters(), &fiction_template()).unwrap();
    let heading = &styled.blocks()[0];
    // chapter.title sets its own size; family comes from `text`.
    assert_eq!(heading.style.get("fontSize"), Some("18pt"));
    assert_eq!(heading.style.get("fontFamily"), Some("Times New Roman"));
    assert_eq!(styled.blocks()[2].style.get("fontSize"), Some("12pt"));
}

// =====================================================================
// Templates and geometry
// =====================================================================

#[test]
fn merge_takes_whole_categories() {
    let base = standard_rules();
    let over = RuleSet::new().with(Category::ChapterTitle, attrs(&[("fontSize", "20pt")]));
    let merged = base.merge(&over);
    for category in Category::ALL {
        let expected = if over.contains(category) {
            over.get(category)
        } else {
            base.get(category)
        };
        assert_eq!(merged.get(category), expected, "category {category}");
    }
}

#[test]
fn overrides_patch_attributes_on_top_of_base() {
    let derived = RuleOverride::new()
        .patch(Category::ChapterTitle, attrs(&[("fontSize", "20pt")]))
        .apply_to(&standard_rules());
    let title = derived.get(Category::ChapterTitle).unwrap();
    assert_eq!(title["fontSize"], "20pt");
    assert_eq!(title["pageBreakBefore"], "always");
}

#[test]
fn dimension_conversions() {
    let units = |s: &str| s.parse::<Dimension>().unwrap().to_engine_units();
    assert_eq!(units("1in"), Some(72));
    assert_eq!(units("0.75in"), Some(54));
    assert_eq!(units("6in"), Some(432));
    assert_eq!(units("9in"), Some(648));
    assert_eq!(units("1.5em"), None);
}

#[test]
fn standard_page_box() {
    let c = trade_paperback();
    assert_eq!((c.width, c.height), (432, 648));
    assert_eq!(c.margin_left, 54);
}

// =====================================================================
// Paginated rendering
// =====================================================================

#[test]
fn chapters_start_on_new_pages() {
    let styled = apply(&two_chapters(), &fiction_template()).unwrap();
    let layout = PrintPdfEngine::new()
        .layout(&paginated_markup(&styled), &trade_paperback())
        .unwrap();
    assert_eq!(layout.page_count(), 2);
    let starts = layout.block_start_pages();
    assert_eq!(starts, vec![(0, 0), (1, 0), (2, 0), (3, 1), (4, 1)]);
}

#[test]
fn builtin_layout_is_deterministic() {
    let styled = apply(&two_chapters(), &non_fiction_template()).unwrap();
    let markup = paginated_markup(&styled);
    let engine = PrintPdfEngine::new();
    let first = engine.layout(&markup, &trade_paperback()).unwrap();
    let second = engine.layout(&markup, &trade_paperback()).unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn paginated_render_is_idempotent() {
    let styled = apply(&two_chapters(), &fiction_template()).unwrap();
    let (size, margins) = page_setup(&standard_rules(), "standard").unwrap();
    let engine = TrackingEngine::new(Duration::ZERO, false);
    let renderer = PaginatedRenderer::new(engine.clone(), Duration::from_secs(5));

    let digest = |doc: &StyledDocument| {
        let artifact = renderer.render(doc, &size, &margins).unwrap();
        Sha256::digest(&artifact.bytes)
    };
    assert_eq!(digest(&styled), digest(&styled));

    let other = apply(&two_chapters(), &non_fiction_template()).unwrap();
    assert_ne!(digest(&styled), digest(&other));
    assert_eq!(engine.launches.load(Ordering::SeqCst), 3);
    assert_eq!(engine.closes.load(Ordering::SeqCst), 3);
}

// =====================================================================
// Pipeline
// =====================================================================

#[test]
fn pipeline_produces_both_artifacts() {
    let book = FormattingPipeline::builtin().unwrap()
        .format(manuscript(), "fiction")
        .unwrap();
    assert_valid_pdf(&book.paginated.bytes);
    assert_eq!(book.paginated.media_type, "application/pdf");
    assert_eq!(book.reflow.media_type, "application/xhtml+xml");

    let reflowed = HtmlDecoder.decode(&book.reflow.bytes).unwrap();
    let source = HtmlDecoder.decode(manuscript()).unwrap();
    assert_eq!(reflowed, source);
}

#[test]
fn unregistered_template_falls_back() {
    let book = FormattingPipeline::builtin().unwrap()
        .format(manuscript(), "poetry")
        .unwrap();
    assert!(book.fell_back);
    assert_eq!(book.template_id, "fiction");
    assert_eq!(book.styled.template_id(), "fiction");
    assert_valid_pdf(&book.paginated.bytes);
    assert!(!book.reflow.is_empty());
}

#[test]
fn sequential_and_parallel_agree() {
    let engine = TrackingEngine::new(Duration::ZERO, false);
    let parallel = pipeline_with(engine.clone(), Duration::from_secs(5));
    let sequential = FormattingPipeline::new(
        Arc::new(TemplateRegistry::with_builtin().unwrap()),
        PipelineConfig::default().with_parallel(false),
    )
    .with_engine(engine);

    let a = parallel.format(manuscript(), "nonFiction").unwrap();
    let b = sequential.format(manuscript(), "nonFiction").unwrap();
    assert_eq!(a.reflow, b.reflow);
    assert_eq!(a.paginated.bytes, b.paginated.bytes);
}

#[test]
fn engine_timeout_releases_session() {
    let engine = TrackingEngine::new(Duration::from_secs(2), false);
    let pipeline = pipeline_with(engine.clone(), Duration::from_millis(100));

    let err = pipeline.format(manuscript(), "fiction").unwrap_err();
    match err {
        FormatError::RenderTimeout { timeout } => assert_eq!(timeout, Duration::from_millis(100)),
        other => panic!("expected RenderTimeout, got {other:?}"),
    }
    assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
    assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_requests_render_simultaneously() {
    // More requests than a typical worker pool has threads.
    const REQUESTS: usize = 24;
    let engine = Arc::new(RendezvousEngine {
        barrier: Arc::new(Barrier::new(REQUESTS)),
    });
    let pipeline = pipeline_with(engine, Duration::from_secs(20));

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..REQUESTS)
            .map(|_| scope.spawn(|| pipeline.format(manuscript(), "fiction")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for result in results {
        let book = result.unwrap();
        assert!(!book.paginated.is_empty());
    }
}

#[test]
fn engine_failure_fails_whole_request() {
    let engine = TrackingEngine::new(Duration::ZERO, true);
    let pipeline = pipeline_with(engine.clone(), Duration::from_secs(5));

    let err = pipeline.format(manuscript(), "fiction").unwrap_err();
    assert!(matches!(err, FormatError::Engine(EngineError::Render(_))));
    assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn text_manuscripts_format_too() {
    let source = b"% The Long Road\n% A. Writer\n\n# Departure\n\nIt began.\n\nNobody noticed.\n";
    let pipeline = FormattingPipeline::builtin().unwrap().with_decoder(Box::new(TextDecoder));
    let book = pipeline.format(source, "nonFiction").unwrap();
    assert_eq!(book.styled.title(), Some("The Long Road"));
    assert_eq!(book.styled.len(), 4);
    assert_valid_pdf(&book.paginated.bytes);
}

#[test]
fn template_source_end_to_end() {
    let json = r#"{
        "templates": {
            "poetry": {
                "name": "Poetry",
                "description": "Verse collections",
                "overrides": {
                    "chapter.paragraph": { "textIndent": "0in", "textAlign": "center" },
                    "page.size": { "width": "5in", "height": "8in" }
                }
            }
        }
    }"#;
    let mut registry = TemplateRegistry::with_builtin().unwrap();
    registry.load_json(json).unwrap();
    let pipeline = FormattingPipeline::new(Arc::new(registry), PipelineConfig::default());

    let book = pipeline.format(manuscript(), "poetry").unwrap();
    assert!(!book.fell_back);
    assert_eq!(book.paginated.constraints.width, 360);
    assert_eq!(book.paginated.constraints.height, 576);
    let second = book
        .styled
        .blocks()
        .iter()
        .find(|b| b.category == Category::ChapterParagraph)
        .unwrap();
    assert_eq!(second.style.get("textAlign"), Some("center"));
    assert_eq!(second.style.get("textIndent"), Some("0in"));
}

#[test]
fn invalid_template_source_registers_nothing() {
    let json = r#"{ "templates": {
        "good": { "name": "Good" },
        "bad": { "name": "Bad", "overrides": { "page.size": { "width": "wide" } } }
    } }"#;
    let mut registry = TemplateRegistry::with_builtin().unwrap();
    assert!(registry.load_json(json).is_err());
    assert!(!registry.contains("good"));
    assert_eq!(registry.len(), 2);
}
