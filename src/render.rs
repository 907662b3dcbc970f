use pulldown_cmark::{html, Event, Options, Parser};
use pulldown_cmark_escape::escape_html;
use tracing::warn;

use crate::error::ClientError;

/// Converts model output (markdown) into HTML for the transcript.
///
/// Fenced code blocks are always recognised; tables and strikethrough are
/// enabled explicitly. Raw HTML inside the markdown is emitted as escaped
/// text so the result can be inserted into a rich-text view as-is.
pub fn markdown_to_html(markdown: &str) -> Result<String, ClientError> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::write_html_fmt(&mut out, parser).map_err(|e| ClientError::Render(e.to_string()))?;
    Ok(out)
}

/// Like [`markdown_to_html`] but never fails: a render error degrades to
/// escaped plain text.
pub fn render_or_plain(markdown: &str) -> String {
    match markdown_to_html(markdown) {
        Ok(rendered) => rendered,
        Err(e) => {
            warn!("{e}; showing plain text");
            plain_text_html(markdown)
        }
    }
}

pub fn plain_text_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 11);
    out.push_str("<pre>");
    // Writing into a String cannot fail
    escape_html(&mut out, text).unwrap_or_default();
    out.push_str("</pre>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_text() {
        let html = markdown_to_html("**Hi!**").unwrap();
        assert!(html.contains("<strong>Hi!</strong>"), "{html}");
    }

    #[test]
    fn fenced_code_block_keeps_language() {
        let html = markdown_to_html("```rust\nfn main() {}\n```\n").unwrap();
        assert!(html.contains("<pre><code class=\"language-rust\">"), "{html}");
        assert!(html.contains("fn main() {}"), "{html}");
    }

    #[test]
    fn tables_are_enabled() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n").unwrap();
        assert!(html.contains("<table>"), "{html}");
        assert!(html.contains("<td>1</td>"), "{html}");
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = markdown_to_html("hello <script>alert(1)</script>").unwrap();
        assert!(!html.contains("<script>"), "{html}");
        assert!(html.contains("&lt;script&gt;"), "{html}");
    }

    #[test]
    fn plain_fallback_escapes_markup() {
        assert_eq!(plain_text_html("a < b & c"), "<pre>a &lt; b &amp; c</pre>");
        assert_eq!(
            plain_text_html("<b class=\"x\">"),
            "<pre>&lt;b class=&quot;x&quot;&gt;</pre>"
        );
    }
}
