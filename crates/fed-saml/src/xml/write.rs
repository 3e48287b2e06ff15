//! Serialization of [`Element`] trees.

use super::{escape_attr, escape_text, Element, Node, NsScope};

impl Element {
    /// Serializes the element without an XML declaration.
    ///
    /// Declarations recorded on elements are kept; any namespace an element or
    /// attribute needs that is not yet in scope is declared where first used.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out, &NsScope::new());
        out
    }

    /// Serializes the element as a standalone UTF-8 document.
    #[must_use]
    pub fn to_document(&self) -> String {
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", self.to_xml())
    }
}

fn write_element(element: &Element, out: &mut String, scope: &NsScope) {
    let mut scope = scope.clone();
    let qname = element.qualified_name();
    out.push('<');
    out.push_str(&qname);

    for (prefix, uri) in &element.declarations {
        declare(out, &mut scope, prefix, uri);
    }
    declare(
        out,
        &mut scope,
        element.prefix.as_deref().unwrap_or(""),
        element.ns.as_deref().unwrap_or(""),
    );
    for attr in &element.attributes {
        if let Some(prefix) = attr.prefix.as_deref().filter(|p| *p != "xml") {
            declare(out, &mut scope, prefix, attr.ns.as_deref().unwrap_or(""));
        }
    }

    for attr in &element.attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        escape_attr(&attr.value, out);
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(e, out, &scope),
            Node::Text(t) => escape_text(t, out),
        }
    }
    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}

fn declare(out: &mut String, scope: &mut NsScope, prefix: &str, uri: &str) {
    let current = scope.get(prefix).map_or("", String::as_str);
    if current == uri || (!prefix.is_empty() && uri.is_empty()) {
        return;
    }
    if prefix.is_empty() {
        out.push_str(" xmlns=\"");
    } else {
        out.push_str(" xmlns:");
        out.push_str(prefix);
        out.push_str("=\"");
    }
    escape_attr(uri, out);
    out.push('"');
    scope.insert(prefix.to_string(), uri.to_string());
}

#[cfg(test)]
mod tests {
    use crate::xml::{parse, Element};

    #[test]
    fn declares_namespaces_once() {
        let el = Element::new("urn:p", "p:Root")
            .with_attr("ID", "_1")
            .with_child(Element::new("urn:p", "p:Child").with_text("a & b"))
            .with_child(Element::new("urn:q", "q:Other"));

        assert_eq!(
            el.to_xml(),
            r#"<p:Root xmlns:p="urn:p" ID="_1"><p:Child>a &amp; b</p:Child><q:Other xmlns:q="urn:q"/></p:Root>"#
        );
    }

    #[test]
    fn output_parses_back_to_same_tree() {
        let el = Element::new("urn:p", "p:Root")
            .with_ns_attr("http://www.w3.org/2001/XMLSchema-instance", "xsi:type", "xs:string")
            .declare("xs", "http://www.w3.org/2001/XMLSchema")
            .with_text("line\nbreak");
        let reparsed = parse(&el.to_xml()).unwrap();

        assert!(reparsed.is("urn:p", "Root"));
        assert_eq!(
            reparsed.ns_attr("http://www.w3.org/2001/XMLSchema-instance", "type"),
            Some("xs:string")
        );
        assert_eq!(reparsed.text(), "line\nbreak");
    }
}
