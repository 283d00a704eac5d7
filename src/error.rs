//! Error types for the formatting pipeline.
//!
//! Each stage has its own enum so collaborators (decoders, layout engines)
//! can be implemented without depending on the whole pipeline. [`FormatError`]
//! is what a formatting request ultimately fails with.

use std::time::Duration;

use thiserror::Error;

use crate::template::Category;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, FormatError>;

/// The source manuscript could not be turned into a [`crate::document::Document`].
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The source bytes are not valid UTF-8.
    #[error("source is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidEncoding { valid_up_to: usize },

    /// The source contained no headings or paragraphs.
    #[error("source contains no manuscript content")]
    Empty,

    /// The source is structurally unusable.
    #[error("malformed source: {0}")]
    Malformed(String),
}

/// A template definition failed registration-time validation.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template '{template}' does not define required category '{category}'")]
    MissingCategory { template: String, category: Category },

    #[error("template '{template}': {category}.{attribute} = {value:?} is not a valid dimension")]
    InvalidDimension {
        template: String,
        category: Category,
        attribute: String,
        value: String,
    },

    #[error("template '{template}': {category}.{attribute} = {value:?} (expected {expected})")]
    InvalidValue {
        template: String,
        category: Category,
        attribute: String,
        value: String,
        expected: &'static str,
    },

    #[error("template '{template}': unknown attribute '{attribute}' in category '{category}'")]
    UnknownAttribute {
        template: String,
        category: Category,
        attribute: String,
    },

    #[error("template '{template}': category '{category}' must define '{attribute}'")]
    MissingAttribute {
        template: String,
        category: Category,
        attribute: String,
    },

    #[error("template '{template}' names unknown base rule set '{base}'")]
    UnknownBase { template: String, base: String },

    #[error("unknown style category '{0}'")]
    UnknownCategory(String),

    #[error("template source is not valid JSON: {0}")]
    Source(#[from] serde_json::Error),
}

/// Failure reported by a layout engine collaborator.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine session could not be started.
    #[error("layout engine failed to launch: {0}")]
    Launch(String),

    /// The engine rejected the markup or failed while laying it out.
    #[error("layout engine render failed: {0}")]
    Render(String),

    /// The engine went away without producing a result.
    #[error("layout engine terminated without a result")]
    Crashed,
}

/// Top-level error for a formatting request.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("template '{id}' is not registered")]
    NotFound { id: String },

    #[error("{} requires style category '{category}', which the template does not define", describe_block(.block_index))]
    MissingCategory {
        category: Category,
        block_index: Option<usize>,
    },

    #[error("invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error("layout engine did not finish within {timeout:?}")]
    RenderTimeout { timeout: Duration },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{renderer} renderer produced an empty artifact")]
    EmptyArtifact { renderer: &'static str },

    #[error("reflow serialization failed: {0}")]
    Reflow(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_block(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("block {i}"),
        None => "page setup".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_category_names_block_and_category() {
        let err = FormatError::MissingCategory {
            category: Category::ChapterTitle,
            block_index: Some(3),
        };
        assert_eq!(
            err.to_string(),
            "block 3 requires style category 'chapter.title', which the template does not define"
        );

        let err = FormatError::MissingCategory {
            category: Category::PageSize,
            block_index: None,
        };
        assert!(err.to_string().starts_with("page setup requires"));
    }

    #[test]
    fn engine_error_converts_transparently() {
        let err: FormatError = EngineError::Render("bad markup".into()).into();
        assert_eq!(err.to_string(), "layout engine render failed: bad markup");
    }

    #[test]
    fn decode_error_converts() {
        let err: FormatError = DecodeError::Empty.into();
        assert!(matches!(err, FormatError::Decode(DecodeError::Empty)));
    }
}
