//! # msgcenter-html
//!
//! Allow-list HTML sanitizer for untrusted message bodies.
//!
//! ## Features
//!
//! - **Sanitizing**: Parse with an HTML5 parser, walk the tree, keep only
//!   allow-listed tags and attributes, splice the children of anything else
//! - **URL gating**: `href`/`src`/`cite` survive only for safe schemes
//! - **Link hardening**: `target="_blank"` anchors always get
//!   `rel="noopener noreferrer"`
//! - **Plain text**: Strip markup for previews and search, truncate safely
//!
//! ## Quick Start
//!
//! ```ignore
//! use msgcenter_html::{sanitize, preview};
//!
//! let safe = sanitize(r#"<p onclick="steal()">Hi <script>alert(1)</script></p>"#);
//! assert_eq!(safe.as_str(), "<p>Hi </p>");
//!
//! let snippet = preview("<p>Hello <b>world</b></p>", 100);
//! assert_eq!(snippet, "Hello world");
//! ```
//!
//! The sanitizer is total: malformed input degrades to a best-effort parse,
//! never to the raw input.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod dom;
mod policy;
mod sanitize;
mod serialize;
mod text;

pub use dom::{Element, Node, parse_fragment};
pub use policy::Policy;
pub use sanitize::{SafeHtml, Sanitizer, sanitize};
pub use serialize::to_html;
pub use text::{preview, strip_to_plain_text, truncate};
