use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use syntect::{html::ClassStyle, parsing::SyntaxSet};

use super::highlight;
use crate::application::render::types::RenderError;

#[derive(Default)]
pub(crate) struct RewriteOutcome {
    pub(crate) contains_code: bool,
}

/// Replace every code block with pre-highlighted HTML.
pub(crate) fn rewrite_ast<'a>(
    root: &'a AstNode<'a>,
    syntax_set: &SyntaxSet,
    class_style: &ClassStyle,
) -> Result<RewriteOutcome, RenderError> {
    let mut outcome = RewriteOutcome::default();
    visit_nodes(root, syntax_set, class_style, &mut outcome)?;
    Ok(outcome)
}

fn visit_nodes(
    node: &AstNode<'_>,
    syntax_set: &SyntaxSet,
    class_style: &ClassStyle,
    outcome: &mut RewriteOutcome,
) -> Result<(), RenderError> {
    if let Some((info, literal)) = extract_code_block(node) {
        let language = info.split_whitespace().next();
        let html = highlight::highlight_code(language, &literal, syntax_set, class_style)?;
        outcome.contains_code = true;
        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
    }

    let mut child = node.first_child();
    while let Some(next) = child {
        visit_nodes(next, syntax_set, class_style, outcome)?;
        child = next.next_sibling();
    }

    Ok(())
}

fn extract_code_block(node: &AstNode<'_>) -> Option<(String, String)> {
    let data = node.data.borrow();
    if let NodeValue::CodeBlock(block) = &data.value {
        let info = block.info.trim().to_string();
        let literal = block.literal.clone();
        Some((info, literal))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comrak::{Arena, format_html, parse_document};

    #[test]
    fn rewrite_highlights_fenced_code() {
        let options = crate::application::render::service::config::default_options();
        let arena = Arena::new();
        let root = parse_document(&arena, "```rust\nfn main() {}\n```\n", &options);
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let class_style = ClassStyle::SpacedPrefixed { prefix: "syntax-" };

        let outcome = rewrite_ast(root, &syntax_set, &class_style).expect("rewrite");
        assert!(outcome.contains_code);

        let mut html = String::new();
        format_html(root, &options, &mut html).expect("html");
        assert!(html.contains("syntax-highlight"));
        assert!(html.contains("language-rust"));
        assert!(html.contains("syntax-"));
    }

    #[test]
    fn rewrite_leaves_prose_alone() {
        let options = crate::application::render::service::config::default_options();
        let arena = Arena::new();
        let root = parse_document(&arena, "Just *words*.\n", &options);
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let class_style = ClassStyle::SpacedPrefixed { prefix: "syntax-" };

        let outcome = rewrite_ast(root, &syntax_set, &class_style).expect("rewrite");
        assert!(!outcome.contains_code);
    }
}
