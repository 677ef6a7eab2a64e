//! Plain-text views of HTML for previews and search.

use crate::dom::{Node, parse_fragment};

/// Appended when text is cut short.
const ELLIPSIS: &str = "...";

/// Tags whose boundaries separate words.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "hr", "li", "ul", "ol", "dl", "dt", "dd", "tr", "td", "th", "table",
    "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "article", "section", "header",
    "footer", "nav", "aside", "main", "figure", "figcaption", "caption",
];

/// Discards all markup and returns the text content.
///
/// Script and style bodies are not text. Block boundaries become spaces and
/// whitespace runs collapse, so the result is a single trimmed line.
#[must_use]
pub fn strip_to_plain_text(html: &str) -> String {
    let mut raw = String::with_capacity(html.len());
    collect_text(&parse_fragment(html), &mut raw);

    let mut result = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(word);
    }
    result
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                if matches!(element.tag.as_str(), "script" | "style") {
                    continue;
                }
                let is_block = BLOCK_TAGS.contains(&element.tag.as_str());
                if is_block {
                    out.push(' ');
                }
                collect_text(&element.children, out);
                if is_block {
                    out.push(' ');
                }
            }
        }
    }
}

/// Truncates text to at most `max_length` characters.
///
/// When the text is cut, the last characters are replaced by `...` so the
/// result, ellipsis included, still fits. Counts `char`s, never bytes, so
/// multi-byte text is never split mid-character.
#[must_use]
pub fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let ellipsis_len = ELLIPSIS.chars().count();
    if max_length <= ellipsis_len {
        return text.chars().take(max_length).collect();
    }

    let kept: String = text.chars().take(max_length - ellipsis_len).collect();
    let mut result = kept.trim_end().to_string();
    result.push_str(ELLIPSIS);
    result
}

/// Builds a preview line from an HTML body.
#[must_use]
pub fn preview(html: &str, max_length: usize) -> String {
    truncate(&strip_to_plain_text(html), max_length)
}
