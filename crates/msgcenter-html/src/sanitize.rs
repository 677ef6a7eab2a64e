//! The allow-list walk.

use std::fmt;
use std::sync::LazyLock;

use crate::dom::{Element, Node, parse_fragment};
use crate::policy::Policy;
use crate::serialize::to_html;

static DEFAULT_SANITIZER: LazyLock<Sanitizer> = LazyLock::new(Sanitizer::default);

/// The `rel` value forced onto links that open a new browsing context.
const BLANK_TARGET_REL: &str = "noopener noreferrer";

/// HTML that has been through the sanitizer.
///
/// The only way to build one is [`Sanitizer::sanitize`], so holding a
/// `SafeHtml` is proof the markup was cleaned. Renderers should accept this
/// type, never a plain `String`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SafeHtml(String);

impl SafeHtml {
    /// Returns the sanitized markup.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the markup.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns true if nothing survived sanitizing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeHtml {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sanitizes HTML with the default [`Policy`].
#[must_use]
pub fn sanitize(html: &str) -> SafeHtml {
    DEFAULT_SANITIZER.sanitize(html)
}

/// Allow-list HTML sanitizer.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    policy: Policy,
}

impl Sanitizer {
    /// Creates a sanitizer for the given policy.
    #[must_use]
    pub const fn new(policy: Policy) -> Self {
        Self { policy }
    }

    /// Returns the policy in use.
    #[must_use]
    pub const fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Cleans untrusted HTML.
    ///
    /// Disallowed elements are removed and their children spliced into the
    /// parent, except `script`/`style` whose content goes too. Kept elements
    /// lose every attribute the policy does not list.
    #[must_use]
    pub fn sanitize(&self, html: &str) -> SafeHtml {
        SafeHtml(to_html(&self.clean_tree(parse_fragment(html))))
    }

    /// Runs the allow-list walk over an already parsed tree.
    #[must_use]
    pub fn clean_tree(&self, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        self.clean_into(nodes, &mut out);
        out
    }

    fn clean_into(&self, nodes: Vec<Node>, out: &mut Vec<Node>) {
        for node in nodes {
            match node {
                Node::Text(text) => push_text(out, text),
                Node::Element(element) => {
                    if self.policy.drops_content(&element.tag) {
                        continue;
                    }
                    if self.policy.allows_tag(&element.tag) {
                        out.push(Node::Element(self.clean_element(element)));
                    } else {
                        // Splice: the children take the element's place.
                        self.clean_into(element.children, out);
                    }
                }
            }
        }
    }

    fn clean_element(&self, element: Element) -> Element {
        let Element {
            tag,
            attributes,
            children,
        } = element;

        let mut attributes: Vec<(String, String)> = attributes
            .into_iter()
            .filter(|(name, value)| self.keeps_attribute(&tag, name, value))
            .collect();

        if tag == "a" {
            harden_blank_target(&mut attributes);
        }

        Element {
            children: self.clean_tree(children),
            tag,
            attributes,
        }
    }

    fn keeps_attribute(&self, tag: &str, name: &str, value: &str) -> bool {
        if !self.policy.allows_attribute(tag, name) {
            return false;
        }
        if self.policy.is_url_attribute(name) {
            return self.policy.allows_url(value);
        }
        if name == "style" {
            return self.policy.allows_style(value);
        }
        true
    }
}

/// Forces `rel="noopener noreferrer"` when the link opens in a new tab.
fn harden_blank_target(attributes: &mut Vec<(String, String)>) {
    let opens_blank = attributes
        .iter()
        .any(|(name, value)| name == "target" && value.trim().eq_ignore_ascii_case("_blank"));
    if !opens_blank {
        return;
    }

    if let Some((_, value)) = attributes.iter_mut().find(|(name, _)| name == "rel") {
        BLANK_TARGET_REL.clone_into(value);
    } else {
        attributes.push(("rel".to_string(), BLANK_TARGET_REL.to_string()));
    }
}

fn push_text(out: &mut Vec<Node>, text: String) {
    if let Some(Node::Text(last)) = out.last_mut() {
        last.push_str(&text);
    } else {
        out.push(Node::Text(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_removed_with_content() {
        let out = sanitize("<p>ok</p><script>alert('x')</script>");
        assert_eq!(out.as_str(), "<p>ok</p>");
    }

    #[test]
    fn test_style_removed_with_content() {
        let out = sanitize("<style>body{display:none}</style><b>hi</b>");
        assert_eq!(out.as_str(), "<b>hi</b>");
    }

    #[test]
    fn test_unknown_tag_is_spliced() {
        let out = sanitize("<custom>hello</custom>");
        assert_eq!(out.as_str(), "hello");
    }

    #[test]
    fn test_spliced_children_keep_markup() {
        let out = sanitize("<font color=red>a <b>b</b> c</font>");
        assert_eq!(out.as_str(), "a <b>b</b> c");
    }

    #[test]
    fn test_event_handlers_dropped() {
        let out = sanitize(r#"<img src="a.png" onerror="alert(1)" alt="x">"#);
        assert_eq!(out.as_str(), r#"<img src="a.png" alt="x">"#);
    }

    #[test]
    fn test_javascript_href_dropped() {
        let out = sanitize(r#"<a href="javascript:alert(1)">x</a>"#);
        assert_eq!(out.as_str(), "<a>x</a>");
    }

    #[test]
    fn test_https_href_kept() {
        let out = sanitize(r#"<a href="https://example.com">x</a>"#);
        assert_eq!(out.as_str(), r#"<a href="https://example.com">x</a>"#);
    }

    #[test]
    fn test_data_src_dropped() {
        let out = sanitize(r#"<img src="data:image/svg+xml;base64,AAAA">"#);
        assert_eq!(out.as_str(), "<img>");
    }

    #[test]
    fn test_blank_target_gets_rel() {
        let out = sanitize(r#"<a href="https://x.com" target="_blank">y</a>"#);
        assert_eq!(
            out.as_str(),
            r#"<a href="https://x.com" target="_blank" rel="noopener noreferrer">y</a>"#
        );
    }

    #[test]
    fn test_blank_target_overrides_supplied_rel() {
        let out = sanitize(r#"<a rel="opener" target="_BLANK" href="/x">y</a>"#);
        assert_eq!(
            out.as_str(),
            r#"<a rel="noopener noreferrer" target="_BLANK" href="/x">y</a>"#
        );
    }

    #[test]
    fn test_dangerous_style_dropped() {
        let out = sanitize(r#"<div style="width: expression(alert(1))" class="c">x</div>"#);
        assert_eq!(out.as_str(), r#"<div class="c">x</div>"#);
    }

    #[test]
    fn test_safe_style_kept() {
        let out = sanitize(r#"<span style="color: red">x</span>"#);
        assert_eq!(out.as_str(), r#"<span style="color: red">x</span>"#);
    }

    #[test]
    fn test_tag_specific_attributes() {
        let out = sanitize(r#"<td colspan="2" href="/x">a</td>"#);
        // Outside a table the parser drops the stray <td> tag itself.
        assert_eq!(out.as_str(), "a");

        let out = sanitize(r#"<table><tr><td colspan="2" href="/x">a</td></tr></table>"#);
        assert_eq!(
            out.as_str(),
            r#"<table><tbody><tr><td colspan="2">a</td></tr></tbody></table>"#
        );
    }

    #[test]
    fn test_empty_and_malformed_input() {
        assert!(sanitize("").is_empty());
        assert_eq!(sanitize("<<<>>>").as_str(), "&lt;&lt;&lt;&gt;&gt;&gt;");
        assert_eq!(sanitize("<p>unclosed <b>bold").as_str(), "<p>unclosed <b>bold</b></p>");
    }

    #[test]
    fn test_iframe_and_object_spliced() {
        let out = sanitize(r#"<iframe src="https://evil.example"></iframe>text"#);
        assert_eq!(out.as_str(), "text");
    }

    #[test]
    fn test_custom_policy() {
        let sanitizer = Sanitizer::new(Policy::new().without_tag("b"));
        let out = sanitizer.sanitize("<b>bold</b> <i>it</i>");
        assert_eq!(out.as_str(), "bold <i>it</i>");
    }

    #[test]
    fn test_safe_html_display() {
        let out = sanitize("<em>x</em>");
        assert_eq!(out.to_string(), "<em>x</em>");
        assert_eq!(out.clone().into_string(), "<em>x</em>");
    }
}
