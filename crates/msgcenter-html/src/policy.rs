//! Allow-lists that drive the sanitizer.

use std::collections::{HashMap, HashSet};

/// Tags kept in sanitized output.
const ALLOWED_TAGS: &[&str] = &[
    // Text structure
    "p", "br", "span", "div", "hr", "pre",
    // Emphasis
    "b", "strong", "i", "em", "u", "s", "strike", "small", "sub", "sup", "mark", "abbr",
    // Headings
    "h1", "h2", "h3", "h4", "h5", "h6",
    // Lists
    "ul", "ol", "li", "dl", "dt", "dd",
    // Tables
    "table", "caption", "thead", "tbody", "tfoot", "tr", "th", "td",
    // Links and media
    "a", "img",
    // Quotes and code
    "blockquote", "code", "q", "cite",
    // Sectioning
    "article", "section", "header", "footer", "nav", "aside", "main", "figure", "figcaption",
];

/// Tags removed together with everything inside them.
const CONTENT_DROPPED_TAGS: &[&str] = &["script", "style"];

/// Attributes allowed on every kept tag.
const GLOBAL_ATTRIBUTES: &[&str] = &["class", "id", "style", "title", "dir", "lang"];

/// Extra attributes allowed per tag.
const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href", "target", "rel", "name"]),
    ("img", &["src", "alt", "width", "height"]),
    ("td", &["colspan", "rowspan"]),
    ("th", &["colspan", "rowspan", "scope"]),
    ("blockquote", &["cite"]),
    ("q", &["cite"]),
    ("ol", &["start"]),
];

/// Attributes whose value is a URL and must pass the scheme check.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "cite"];

/// Absolute URL schemes that may be kept.
const URL_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Substrings that disqualify a `style` attribute (matched lowercase).
const DANGEROUS_STYLE_PATTERNS: &[&str] = &[
    "expression",
    "javascript:",
    "vbscript:",
    "behavior:",
    "-moz-binding",
    // CSS escapes can spell any of the above.
    "\\",
];

/// Sanitizer configuration.
///
/// [`Policy::default`] is the message-center policy. Tests and callers can
/// tighten it with the builder-style methods.
#[derive(Debug, Clone)]
pub struct Policy {
    tags: HashSet<String>,
    content_dropped: HashSet<String>,
    global_attributes: HashSet<String>,
    tag_attributes: HashMap<String, HashSet<String>>,
    url_attributes: HashSet<String>,
    url_schemes: HashSet<String>,
    dangerous_style: Vec<String>,
}

fn owned_set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            tags: owned_set(ALLOWED_TAGS),
            content_dropped: owned_set(CONTENT_DROPPED_TAGS),
            global_attributes: owned_set(GLOBAL_ATTRIBUTES),
            tag_attributes: TAG_ATTRIBUTES
                .iter()
                .map(|(tag, attrs)| ((*tag).to_string(), owned_set(attrs)))
                .collect(),
            url_attributes: owned_set(URL_ATTRIBUTES),
            url_schemes: owned_set(URL_SCHEMES),
            dangerous_style: DANGEROUS_STYLE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl Policy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a tag from the allow-list (its children are still kept).
    #[must_use]
    pub fn without_tag(mut self, tag: &str) -> Self {
        self.tags.remove(&tag.to_ascii_lowercase());
        self
    }

    /// Removes a URL scheme from the allowed set.
    #[must_use]
    pub fn without_scheme(mut self, scheme: &str) -> Self {
        self.url_schemes.remove(&scheme.to_ascii_lowercase());
        self
    }

    /// Returns true if the tag is kept.
    #[must_use]
    pub fn allows_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns true if the tag is removed along with its content.
    #[must_use]
    pub fn drops_content(&self, tag: &str) -> bool {
        self.content_dropped.contains(tag)
    }

    /// Returns true if `name` may appear on `tag` at all.
    ///
    /// Event handlers (`on*`) are never allowed, whatever the lists say.
    #[must_use]
    pub fn allows_attribute(&self, tag: &str, name: &str) -> bool {
        if name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on")) {
            return false;
        }
        self.global_attributes.contains(name)
            || self
                .tag_attributes
                .get(tag)
                .is_some_and(|attrs| attrs.contains(name))
    }

    /// Returns true if the attribute carries a URL.
    #[must_use]
    pub fn is_url_attribute(&self, name: &str) -> bool {
        self.url_attributes.contains(name)
    }

    /// Checks a URL against the scheme allow-list.
    ///
    /// Fragments (`#top`) and relative references are always allowed.
    /// Anything the URL parser rejects is refused.
    #[must_use]
    pub fn allows_url(&self, value: &str) -> bool {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return false;
        }
        if trimmed.starts_with('#') {
            return true;
        }

        match url::Url::parse(trimmed) {
            Ok(parsed) => self.url_schemes.contains(parsed.scheme()),
            Err(url::ParseError::RelativeUrlWithoutBase) => true,
            Err(_) => false,
        }
    }

    /// Checks a `style` attribute value against the dangerous patterns.
    #[must_use]
    pub fn allows_style(&self, value: &str) -> bool {
        let lower = value.to_ascii_lowercase();
        !self
            .dangerous_style
            .iter()
            .any(|pattern| lower.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lists() {
        let policy = Policy::default();
        assert!(policy.allows_tag("p"));
        assert!(policy.allows_tag("blockquote"));
        assert!(!policy.allows_tag("script"));
        assert!(!policy.allows_tag("iframe"));
        assert!(policy.drops_content("script"));
        assert!(policy.drops_content("style"));
        assert!(!policy.drops_content("custom"));
    }

    #[test]
    fn test_attribute_lists() {
        let policy = Policy::default();
        assert!(policy.allows_attribute("p", "class"));
        assert!(policy.allows_attribute("a", "href"));
        assert!(policy.allows_attribute("td", "colspan"));
        assert!(!policy.allows_attribute("p", "href"));
        assert!(!policy.allows_attribute("p", "onclick"));
        assert!(!policy.allows_attribute("img", "onerror"));
        assert!(!policy.allows_attribute("a", "data-x"));
    }

    #[test]
    fn test_url_schemes() {
        let policy = Policy::default();
        assert!(policy.allows_url("https://example.com"));
        assert!(policy.allows_url("HTTP://EXAMPLE.COM/a"));
        assert!(policy.allows_url("mailto:me@example.com"));
        assert!(policy.allows_url("tel:+15551234"));
        assert!(policy.allows_url("#section-2"));
        assert!(policy.allows_url("/docs/page.html"));
        assert!(policy.allows_url("page.html?x=1"));

        assert!(!policy.allows_url("javascript:alert(1)"));
        assert!(!policy.allows_url("  JaVaScRiPt:alert(1)"));
        assert!(!policy.allows_url("java\tscript:alert(1)"));
        assert!(!policy.allows_url("data:text/html;base64,PHNjcmlwdD4="));
        assert!(!policy.allows_url("vbscript:msgbox"));
        assert!(!policy.allows_url(""));
    }

    #[test]
    fn test_style_patterns() {
        let policy = Policy::default();
        assert!(policy.allows_style("color: red; font-weight: bold"));
        assert!(!policy.allows_style("width: EXPRESSION(alert(1))"));
        assert!(!policy.allows_style("background: url(JavaScript:alert(1))"));
        assert!(!policy.allows_style("behavior: url(x.htc)"));
        assert!(!policy.allows_style("-moz-binding: url(x.xml#xss)"));
        assert!(!policy.allows_style("width: expr\\65ssion(1)"));
    }

    #[test]
    fn test_policy_builder() {
        let policy = Policy::new().without_tag("img").without_scheme("tel");
        assert!(!policy.allows_tag("img"));
        assert!(!policy.allows_url("tel:123"));
        assert!(policy.allows_url("https://example.com"));
    }
}
