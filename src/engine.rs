//! Layout engine collaborator – accepts styled markup plus page constraints
//! and returns a fixed-layout artifact.
//!
//! An engine is launched into an [`EngineSession`] per render. Sessions are
//! held through a [`SessionGuard`], which closes them when dropped, so every
//! exit path (success, error, timeout, panic unwind) releases the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::EngineError;
use crate::fonts::FontManager;
use crate::layout::compute_flow;
use crate::layout_config::LayoutConfig;
use crate::pagination::{paginate, PageGeometry};
use crate::render::render_pdf;

/// Page size and margins in whole engine units (PDF points).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageConstraints {
    pub width: u32,
    pub height: u32,
    pub margin_top: u32,
    pub margin_right: u32,
    pub margin_bottom: u32,
    pub margin_left: u32,
}

impl PageConstraints {
    pub fn geometry(&self) -> PageGeometry {
        PageGeometry {
            width: self.width as f32,
            height: self.height as f32,
            margin_top: self.margin_top as f32,
            margin_right: self.margin_right as f32,
            margin_bottom: self.margin_bottom as f32,
            margin_left: self.margin_left as f32,
        }
    }

    /// Whether the margins leave any content area.
    pub fn has_content_area(&self) -> bool {
        self.margin_left.saturating_add(self.margin_right) < self.width
            && self.margin_top.saturating_add(self.margin_bottom) < self.height
    }
}

/// A layout engine that can be launched into sessions.
pub trait LayoutEngine: Send + Sync {
    fn name(&self) -> &str;

    fn launch(&self) -> Result<Arc<dyn EngineSession>, EngineError>;
}

/// One acquired engine session.
///
/// `render` may be called from a worker thread while the owning
/// [`SessionGuard`] closes the session on timeout.
pub trait EngineSession: Send + Sync {
    fn render(&self, markup: &str, constraints: &PageConstraints) -> Result<Vec<u8>, EngineError>;

    /// Release the session. Called exactly once, by [`SessionGuard`].
    fn close(&self) -> Result<(), EngineError>;
}

/// Owns a launched session and closes it on drop.
pub struct SessionGuard {
    engine: String,
    session: Option<Arc<dyn EngineSession>>,
}

impl SessionGuard {
    pub fn acquire(engine: &dyn LayoutEngine) -> Result<Self, EngineError> {
        let session = engine.launch()?;
        log::debug!("layout engine '{}' session launched", engine.name());
        Ok(Self {
            engine: engine.name().to_string(),
            session: Some(session),
        })
    }

    /// A handle to the session for a worker thread.
    pub fn session(&self) -> Option<Arc<dyn EngineSession>> {
        self.session.clone()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match session.close() {
            Ok(()) => log::debug!("layout engine '{}' session closed", self.engine),
            // Cleanup is best effort and never replaces the render's own result.
            Err(e) => log::warn!("closing layout engine '{}' session failed: {e}", self.engine),
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in engine
// ---------------------------------------------------------------------------

/// In-process engine: markup → flowed lines → pages → printpdf.
#[derive(Debug, Clone, Default)]
pub struct PrintPdfEngine {
    fonts: Arc<FontManager>,
}

impl PrintPdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure text with `fonts` instead of average advances.
    pub fn with_fonts(fonts: FontManager) -> Self {
        Self {
            fonts: Arc::new(fonts),
        }
    }

    /// Compute the page layout for `markup` without rendering it.
    pub fn layout(
        &self,
        markup: &str,
        constraints: &PageConstraints,
    ) -> Result<LayoutConfig, EngineError> {
        layout_markup(markup, constraints, &self.fonts)
    }
}

impl LayoutEngine for PrintPdfEngine {
    fn name(&self) -> &str {
        "printpdf"
    }

    fn launch(&self) -> Result<Arc<dyn EngineSession>, EngineError> {
        Ok(Arc::new(PrintPdfSession {
            fonts: Arc::clone(&self.fonts),
            closed: AtomicBool::new(false),
        }))
    }
}

struct PrintPdfSession {
    fonts: Arc<FontManager>,
    closed: AtomicBool,
}

impl PrintPdfSession {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Render("session already closed".into()));
        }
        Ok(())
    }

    /// Paint a finished layout unless the session was closed meanwhile.
    fn paint(&self, layout: &LayoutConfig) -> Result<Vec<u8>, EngineError> {
        self.ensure_open()?;
        render_pdf(layout)
    }
}

impl EngineSession for PrintPdfSession {
    fn render(&self, markup: &str, constraints: &PageConstraints) -> Result<Vec<u8>, EngineError> {
        self.ensure_open()?;
        let layout = layout_markup(markup, constraints, &self.fonts)?;
        log::debug!("laid out {} pages", layout.page_count());
        self.paint(&layout)
    }

    fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn layout_markup(
    markup: &str,
    constraints: &PageConstraints,
    fonts: &FontManager,
) -> Result<LayoutConfig, EngineError> {
    if !constraints.has_content_area() {
        return Err(EngineError::Render(format!(
            "margins leave no content area on a {}x{}pt page",
            constraints.width, constraints.height
        )));
    }
    let geometry = constraints.geometry();
    let flow = compute_flow(markup, geometry.content_width(), fonts);
    let mut config = paginate(&flow.blocks, geometry, fonts);
    if let Some(title) = flow.title {
        config.title = title;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{sample_face, FontKey};
    use std::sync::atomic::AtomicUsize;

    fn trade_paperback() -> PageConstraints {
        PageConstraints {
            width: 432,
            height: 648,
            margin_top: 54,
            margin_right: 54,
            margin_bottom: 54,
            margin_left: 54,
        }
    }

    #[test]
    fn builtin_engine_renders_pdf() {
        let engine = PrintPdfEngine::new();
        let guard = SessionGuard::acquire(&engine).unwrap();
        let session = guard.session().unwrap();
        let html = "<html><head><title>Book</title></head><body><h1>One</h1><p>Text.</p></body></html>";
        let bytes = session.render(html, &trade_paperback()).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn layout_uses_title_and_page_box() {
        let engine = PrintPdfEngine::new();
        let html = "<html><head><title>Book</title></head><body><p>Text.</p></body></html>";
        let layout = engine.layout(html, &trade_paperback()).unwrap();
        assert_eq!(layout.title, "Book");
        assert_eq!(layout.page_width_pt, 432.0);
        assert_eq!(layout.page_height_pt, 648.0);
        let first = &layout.pages[0].boxes[0];
        assert_eq!((first.x, first.y), (54.0, 54.0));

        let json = layout.to_json().unwrap();
        assert_eq!(LayoutConfig::from_json(&json).unwrap(), layout);
    }

    #[test]
    fn rejects_margins_without_content_area() {
        let constraints = PageConstraints {
            margin_left: 300,
            margin_right: 200,
            ..trade_paperback()
        };
        let engine = PrintPdfEngine::new();
        assert!(matches!(
            engine.layout("<p>x</p>", &constraints),
            Err(EngineError::Render(_))
        ));
    }

    #[test]
    fn closed_session_refuses_work() {
        let session = PrintPdfEngine::new().launch().unwrap();
        session.close().unwrap();
        assert!(session.render("<p>x</p>", &trade_paperback()).is_err());
    }

    #[test]
    fn close_after_layout_skips_painting() {
        let engine = PrintPdfEngine::new();
        let session = PrintPdfSession {
            fonts: Arc::clone(&engine.fonts),
            closed: AtomicBool::new(false),
        };
        let layout = engine.layout("<p>Text.</p>", &trade_paperback()).unwrap();
        assert!(session.paint(&layout).is_ok());
        session.close().unwrap();
        assert!(matches!(session.paint(&layout), Err(EngineError::Render(_))));
    }

    #[test]
    fn loaded_faces_reach_layout() {
        let html = r#"<p style="font-size: 10pt">ab</p>"#;
        let plain = PrintPdfEngine::new().layout(html, &trade_paperback()).unwrap();
        assert_eq!(plain.pages[0].boxes[0].text.ascender, 7.5);

        let mut fonts = FontManager::new();
        fonts
            .load_font(FontKey::new("Times New Roman", false, false), sample_face())
            .unwrap();
        let measured = PrintPdfEngine::with_fonts(fonts)
            .layout(html, &trade_paperback())
            .unwrap();
        assert!((measured.pages[0].boxes[0].text.ascender - 8.0).abs() < 0.01);
    }

    struct CountingEngine {
        launches: AtomicUsize,
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    struct CountingSession {
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl LayoutEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }
        fn launch(&self) -> Result<Arc<dyn EngineSession>, EngineError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingSession {
                closes: Arc::clone(&self.closes),
                fail_close: self.fail_close,
            }))
        }
    }

    impl EngineSession for CountingSession {
        fn render(&self, _: &str, _: &PageConstraints) -> Result<Vec<u8>, EngineError> {
            Err(EngineError::Render("boom".into()))
        }
        fn close(&self) -> Result<(), EngineError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(EngineError::Crashed)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn guard_closes_once_on_error_path() {
        for fail_close in [false, true] {
            let engine = CountingEngine {
                launches: AtomicUsize::new(0),
                closes: Arc::new(AtomicUsize::new(0)),
                fail_close,
            };
            let result = (|| -> Result<Vec<u8>, EngineError> {
                let guard = SessionGuard::acquire(&engine)?;
                let session = guard.session().ok_or(EngineError::Crashed)?;
                session.render("<p>x</p>", &trade_paperback())
            })();
            // The render error survives a failing close.
            assert!(matches!(result, Err(EngineError::Render(ref m)) if m == "boom"));
            assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
            assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
        }
    }
}
