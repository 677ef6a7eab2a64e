//! Generic HTML tree built from an HTML5 parse.
//!
//! The sanitizer and the text helpers work on this tree rather than on the
//! parser's DOM, so the allow-list walk does not depend on the parser crate.

use html5ever::tendril::TendrilSink;
use html5ever::{LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Nesting depth past which elements are flattened to their text.
pub(crate) const MAX_DEPTH: usize = 256;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A node of the generic HTML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with its attributes and children.
    Element(Element),
    /// Decoded character data.
    Text(String),
}

/// An HTML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercase tag name.
    pub tag: String,
    /// Attributes in source order as `(name, value)` pairs.
    pub attributes: Vec<(String, String)>,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Element {
    /// Returns the value of an attribute, matching the name case-insensitively.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl Node {
    /// Creates a text node.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Parses an HTML fragment in `<body>` context.
///
/// Comments, doctypes and processing instructions are dropped. Never fails:
/// the HTML5 algorithm recovers from any input.
#[must_use]
pub fn parse_fragment(html: &str) -> Vec<Node> {
    if html.is_empty() {
        return Vec::new();
    }

    let context = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from("body"),
    );
    let dom = html5ever::parse_fragment(RcDom::default(), ParseOpts::default(), context, vec![])
        .one(html);

    // The fragment parser wraps everything in a synthetic <html> element.
    let document_children = dom.document.children.borrow();
    let mut nodes = Vec::new();
    for child in document_children.iter() {
        match &child.data {
            NodeData::Element { name, .. } if &*name.local == "html" => {
                for grandchild in child.children.borrow().iter() {
                    convert(grandchild, 0, &mut nodes);
                }
            }
            _ => convert(child, 0, &mut nodes),
        }
    }
    nodes
}

fn convert(handle: &Handle, depth: usize, out: &mut Vec<Node>) {
    match &handle.data {
        NodeData::Text { contents } => push_text(out, &contents.borrow()),
        NodeData::Element { name, attrs, .. } => {
            if depth >= MAX_DEPTH {
                flatten_text(handle, out);
                return;
            }

            let attributes = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();

            let mut children = Vec::new();
            for child in handle.children.borrow().iter() {
                convert(child, depth + 1, &mut children);
            }

            out.push(Node::Element(Element {
                tag: name.local.to_ascii_lowercase().to_string(),
                attributes,
                children,
            }));
        }
        NodeData::Document => {
            for child in handle.children.borrow().iter() {
                convert(child, depth, out);
            }
        }
        NodeData::Doctype { .. }
        | NodeData::Comment { .. }
        | NodeData::ProcessingInstruction { .. } => {}
    }
}

/// Collects the text below `handle` without recursion.
///
/// Script and style bodies are skipped so flattening never surfaces code.
fn flatten_text(handle: &Handle, out: &mut Vec<Node>) {
    let mut text = String::new();
    let mut stack = vec![handle.clone()];

    while let Some(node) = stack.pop() {
        match &node.data {
            NodeData::Text { contents } => text.push_str(&contents.borrow()),
            NodeData::Element { name, .. }
                if matches!(&*name.local, "script" | "style") => {}
            _ => {
                // Reverse so the stack pops children in document order.
                for child in node.children.borrow().iter().rev() {
                    stack.push(child.clone());
                }
            }
        }
    }

    push_text(out, &text);
}

fn push_text(out: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(Node::text(text));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn element(node: &Node) -> &Element {
        match node {
            Node::Element(el) => el,
            Node::Text(t) => panic!("expected element, got text {t:?}"),
        }
    }

    #[test]
    fn test_parse_simple_paragraph() {
        let nodes = parse_fragment("<p>hi</p>");
        assert_eq!(nodes.len(), 1);
        let p = element(&nodes[0]);
        assert_eq!(p.tag, "p");
        assert_eq!(p.children, vec![Node::text("hi")]);
    }

    #[test]
    fn test_parse_lowercases_tag_names() {
        let nodes = parse_fragment("<DIV><P>Hi</P></DIV>");
        let div = element(&nodes[0]);
        assert_eq!(div.tag, "div");
        assert_eq!(element(&div.children[0]).tag, "p");
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_fragment("").is_empty());
    }

    #[test]
    fn test_parse_drops_comments() {
        let nodes = parse_fragment("a<!-- hidden -->b");
        assert_eq!(nodes, vec![Node::text("ab")]);
    }

    #[test]
    fn test_parse_decodes_entities_and_keeps_attributes() {
        let nodes = parse_fragment(r#"<a HREF="x?a=1&amp;b=2" title="T">&lt;ok&gt;</a>"#);
        let a = element(&nodes[0]);
        assert_eq!(a.tag, "a");
        assert_eq!(a.attribute("href"), Some("x?a=1&b=2"));
        assert_eq!(a.attribute("title"), Some("T"));
        assert_eq!(a.children, vec![Node::text("<ok>")]);
    }

    #[test]
    fn test_parse_recovers_from_unclosed_tags() {
        let nodes = parse_fragment("<div><b>bold");
        let div = element(&nodes[0]);
        assert_eq!(div.tag, "div");
        let b = element(&div.children[0]);
        assert_eq!(b.children, vec![Node::text("bold")]);
    }

    #[test]
    fn test_deep_nesting_is_flattened() {
        let depth = MAX_DEPTH + 50;
        let html = format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let nodes = parse_fragment(&html);

        let mut current = element(&nodes[0]);
        let mut levels = 1;
        while let Some(Node::Element(child)) = current.children.first() {
            current = child;
            levels += 1;
        }
        assert_eq!(levels, MAX_DEPTH);
        assert_eq!(current.children, vec![Node::text("deep")]);
    }
}
