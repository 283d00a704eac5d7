//! Pipeline – ties together decoding, template lookup, styling and the two
//! renderers into a single formatting request.

use std::sync::Arc;
use std::time::Duration;

use crate::decode::{HtmlDecoder, SourceDecoder};
use crate::document::Document;
use crate::engine::{LayoutEngine, PrintPdfEngine};
use crate::error::{EngineError, FormatError, Result};
use crate::fonts::FontManager;
use crate::paginated::{page_setup, PaginatedArtifact, PaginatedRenderer, DEFAULT_ENGINE_TIMEOUT};
use crate::reflow::{ReflowArtifact, ReflowRenderer, ReflowSerializer};
use crate::registry::TemplateRegistry;
use crate::style::{self, StyledDocument};
use crate::template::{Template, DEFAULT_TEMPLATE_ID};

/// Configuration for the formatting pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Template used when a request names an unregistered one (default: "fiction").
    pub default_template: String,
    /// Upper bound on one layout engine render (default: 30 s).
    pub engine_timeout: Duration,
    /// Run the paginated renderer on its own thread while the reflow
    /// renderer runs on the caller's (default: true).
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_template: DEFAULT_TEMPLATE_ID.to_string(),
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
            parallel: true,
        }
    }
}

impl PipelineConfig {
    pub fn with_default_template(mut self, id: impl Into<String>) -> Self {
        self.default_template = id.into();
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Both artifacts of one formatting request.
#[derive(Debug, Clone)]
pub struct FormattedBook {
    pub reflow: ReflowArtifact,
    pub paginated: PaginatedArtifact,
    /// Id of the template that was actually applied.
    pub template_id: String,
    /// The requested template was not registered and the default was used.
    pub fell_back: bool,
    pub styled: StyledDocument,
}

/// Source bytes → both publication artifacts.
///
/// Holds no per-request state, so one pipeline can serve concurrent
/// requests.
pub struct FormattingPipeline {
    registry: Arc<TemplateRegistry>,
    decoder: Box<dyn SourceDecoder>,
    reflow: ReflowRenderer,
    paginated: PaginatedRenderer,
    config: PipelineConfig,
}

impl std::fmt::Debug for FormattingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormattingPipeline")
            .field("templates", &self.registry.len())
            .field("decoder", &self.decoder.name())
            .field("reflow", &self.reflow)
            .field("paginated", &self.paginated)
            .field("config", &self.config)
            .finish()
    }
}

impl FormattingPipeline {
    /// A pipeline over the built-in templates with the default configuration.
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(
            Arc::new(TemplateRegistry::with_builtin()?),
            PipelineConfig::default(),
        ))
    }

    /// HTML decoding, XHTML reflow output and the built-in PDF engine.
    pub fn new(registry: Arc<TemplateRegistry>, config: PipelineConfig) -> Self {
        let paginated = PaginatedRenderer::default().with_timeout(config.engine_timeout);
        Self {
            registry,
            decoder: Box::new(HtmlDecoder),
            reflow: ReflowRenderer::default(),
            paginated,
            config,
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn SourceDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn LayoutEngine>) -> Self {
        self.paginated = PaginatedRenderer::new(engine, self.config.engine_timeout);
        self
    }

    /// Use the built-in engine, measuring text with the faces in `fonts`.
    pub fn with_fonts(self, fonts: FontManager) -> Self {
        self.with_engine(Arc::new(PrintPdfEngine::with_fonts(fonts)))
    }

    pub fn with_reflow_serializer(mut self, serializer: Box<dyn ReflowSerializer>) -> Self {
        self.reflow = ReflowRenderer::new(serializer);
        self
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Look up `id`, falling back to the configured default template when it
    /// is not registered. Returns the template and whether fallback happened.
    pub fn resolve_template(&self, id: &str) -> Result<(&Template, bool)> {
        match self.registry.get(id) {
            Ok(template) => Ok((template, false)),
            Err(FormatError::NotFound { .. }) => {
                log::warn!(
                    "template '{id}' is not registered, using default '{}'",
                    self.config.default_template
                );
                let template = self.registry.get(&self.config.default_template)?;
                Ok((template, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Decode `source` and format it with `template_id`.
    pub fn format(&self, source: &[u8], template_id: &str) -> Result<FormattedBook> {
        let document = self.decoder.decode(source)?;
        log::debug!(
            "{} decoder: {} blocks, {} chapters",
            self.decoder.name(),
            document.len(),
            document.chapter_count()
        );
        self.format_document(&document, template_id)
    }

    /// Format an already decoded document. Fails as a whole if either
    /// renderer fails.
    pub fn format_document(&self, document: &Document, template_id: &str) -> Result<FormattedBook> {
        let (template, fell_back) = self.resolve_template(template_id)?;
        let styled = style::apply(document, template)?;
        let (size, margins) = page_setup(&template.rules, &template.id)?;

        let (reflow, paginated) = if self.config.parallel {
            // The paginated side blocks on the engine for up to its timeout.
            let (reflow, paginated) = std::thread::scope(|scope| {
                let worker = std::thread::Builder::new()
                    .name("paginated-render".into())
                    .spawn_scoped(scope, || self.paginated.render(&styled, &size, &margins));
                let reflow = self.reflow.render(&styled);
                let paginated = match worker {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        log::error!("paginated render thread panicked");
                        Err(EngineError::Crashed.into())
                    }),
                    Err(e) => Err(FormatError::Io(e)),
                };
                (reflow, paginated)
            });
            (reflow?, paginated?)
        } else {
            let reflow = self.reflow.render(&styled)?;
            (reflow, self.paginated.render(&styled, &size, &margins)?)
        };

        log::info!(
            "formatted {} blocks with '{}': reflow {} bytes, paginated {} bytes",
            styled.len(),
            template.id,
            reflow.len(),
            paginated.len()
        );
        Ok(FormattedBook {
            reflow,
            paginated,
            template_id: template.id.clone(),
            fell_back,
            styled,
        })
    }
}
