mod config;
mod highlight;
mod rewrite;

use std::sync::Arc;

use comrak::{Arena, format_html, nodes::AstNode, parse_document};
use once_cell::sync::Lazy;
use syntect::{html::ClassStyle, parsing::SyntaxSet};

use crate::application::render::types::{RenderError, RenderOutput, RenderRequest, RenderService};

use config::default_options;
use rewrite::rewrite_ast;

/// Comrak-based rendering pipeline with Syntect highlighting.
pub struct ComrakRenderService {
    options: comrak::Options<'static>,
    syntax_set: SyntaxSet,
    class_style: ClassStyle,
}

impl ComrakRenderService {
    /// Construct a renderer with the GFM extensions enabled and syntax
    /// highlighting configured to emit `syntax-` prefixed CSS classes.
    fn new() -> Self {
        Self {
            options: default_options(),
            syntax_set: SyntaxSet::load_defaults_newlines(),
            class_style: ClassStyle::SpacedPrefixed { prefix: "syntax-" },
        }
    }
}

static RENDER_SERVICE: Lazy<Arc<ComrakRenderService>> =
    Lazy::new(|| Arc::new(ComrakRenderService::new()));

/// Access the shared render service instance, initialised on first use.
pub fn render_service() -> Arc<ComrakRenderService> {
    Arc::clone(&RENDER_SERVICE)
}

impl Default for ComrakRenderService {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderService for ComrakRenderService {
    fn render(&self, request: &RenderRequest<'_>) -> Result<RenderOutput, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, request.markdown, &self.options);

        let outcome = rewrite_ast(root, &self.syntax_set, &self.class_style)?;
        let html = render_html_stage(root, &self.options)?;

        Ok(RenderOutput {
            html,
            contains_code: outcome.contains_code,
        })
    }
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}
