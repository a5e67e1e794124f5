//! Conversion of extension-authored markup into preview HTML.

use pulldown_cmark::{html, Options, Parser};

/// Turns extension markup into markup the live preview can display.
pub trait Renderer: Send + Sync {
    fn render(&self, markup: &str) -> String;
}

/// Markdown renderer backed by pulldown-cmark.
///
/// Leading spaces and tabs are stripped from every line first, so alert
/// text written inside indented template literals is not turned into code
/// blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, markup: &str) -> String {
        let dedented = strip_indentation(markup);

        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);

        let parser = Parser::new_ext(&dedented, options);
        let mut out = String::with_capacity(dedented.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

fn strip_indentation(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_start_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n")
}
