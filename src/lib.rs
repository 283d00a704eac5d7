//! # book-forge – Template-driven manuscript formatting
//!
//! Turns an author's manuscript into two publication artifacts, a reflowable
//! e-book document and a paginated print document, styled by a named
//! template. The pipeline stages are:
//!
//! 1. **Decode** – source bytes → structural [`document::Document`] ([`decode`])
//! 2. **Resolve** – template id → validated [`template::Template`] ([`registry`])
//! 3. **Style** – categorise every block and merge its style ([`style`])
//! 4. **Render** – reflowable XHTML ([`reflow`]) and paginated PDF ([`paginated`])
//!    side by side
//!
//! The paginated renderer drives a [`engine::LayoutEngine`]. The built-in
//! engine flows text ([`layout`]), breaks it into pages ([`pagination`]) and
//! emits PDF via printpdf ([`render`]).
//!
//! ```no_run
//! use book_forge::FormattingPipeline;
//!
//! let book = FormattingPipeline::builtin()
//!     .unwrap()
//!     .format(b"<h1>Chapter One</h1><p>It began.</p>", "fiction")
//!     .unwrap();
//! std::fs::write("book.pdf", &book.paginated.bytes).unwrap();
//! ```

pub mod decode;
pub mod document;
pub mod engine;
pub mod error;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod markup;
pub mod paginated;
pub mod pagination;
pub mod pipeline;
pub mod reflow;
pub mod registry;
pub mod render;
pub mod style;
pub mod template;
pub mod units;

// Re-exports for convenience
pub use document::{Block, Document};
pub use error::{FormatError, Result};
pub use pipeline::{FormattedBook, FormattingPipeline, PipelineConfig};
pub use registry::TemplateRegistry;
pub use template::{Category, Template};
