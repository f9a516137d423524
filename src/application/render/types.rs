use thiserror::Error;

/// Rendering request passed into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest<'a> {
    /// Slug of the article being rendered, used for diagnostics only.
    pub slug: &'a str,
    /// Markdown body with the metadata block already removed.
    pub markdown: &'a str,
}

impl<'a> RenderRequest<'a> {
    pub fn new(slug: &'a str, markdown: &'a str) -> Self {
        Self { slug, markdown }
    }
}

/// Deterministic rendering result returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub html: String,
    /// Indicates whether any fenced or indented code block was highlighted.
    pub contains_code: bool,
}

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
}

/// Markdown to HTML conversion. Implementations must be pure and
/// deterministic: the same input yields the same output.
pub trait RenderService: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> Result<RenderOutput, RenderError>;
}
