//! Minimal SVG writer.
//!
//! Elements are appended as pre-rendered fragments and joined once in
//! [`SvgWriter::to_svg`]. Attribute values are written as given; callers that
//! put user text into the document should pass it through [`escape_xml`].

use std::fmt::Display;

/// Ordered list of `name="value"` pairs for one element.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pairs: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Attributes { pairs: Vec::new() }
    }

    /// Append an attribute. Insertion order is emission order.
    pub fn with(mut self, name: &str, value: impl Display) -> Self {
        self.pairs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn write_to(&self, out: &mut String) {
        for (name, value) in &self.pairs {
            out.push_str(&format!(r#" {}="{}""#, name, value));
        }
    }
}

/// Accumulates `<rect>` and `<text>` elements inside an SVG 1.1 root.
#[derive(Debug, Clone)]
pub struct SvgWriter {
    fragments: Vec<String>,
}

impl SvgWriter {
    pub fn new(width: impl Display, height: impl Display) -> Self {
        let header = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"{}\" height=\"{}\" xmlns:xlink=\"http://www.w3.org/1999/xlink\">\n",
            width, height
        );
        SvgWriter {
            fragments: vec![header],
        }
    }

    pub fn rect(&mut self, attributes: &Attributes) {
        let mut fragment = String::from("<rect");
        attributes.write_to(&mut fragment);
        fragment.push_str(" />\n");
        self.fragments.push(fragment);
    }

    /// Append a `<text>` element. `content` is inserted verbatim.
    pub fn text(&mut self, content: &str, attributes: &Attributes) {
        let mut fragment = String::from("<text");
        attributes.write_to(&mut fragment);
        fragment.push('>');
        fragment.push_str(content);
        fragment.push_str("</text>");
        self.fragments.push(fragment);
    }

    /// Number of elements written so far, excluding the root.
    pub fn element_count(&self) -> usize {
        self.fragments.len() - 1
    }

    pub fn to_svg(&self) -> String {
        let mut svg = self.fragments.concat();
        svg.push_str("</svg>");
        svg
    }
}

/// Escape special XML characters
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
