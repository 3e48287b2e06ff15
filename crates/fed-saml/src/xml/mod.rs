//! Minimal namespace-aware XML tree.
//!
//! Protocol messages are parsed into an owned [`Element`] tree with every
//! element and attribute name resolved to its namespace URI at parse time.
//! That makes exclusive canonicalization a pure function of a subtree, which
//! is what XML Signature and XML Encryption need.
//!
//! Comments and processing instructions are dropped; DOCTYPE is rejected.

mod c14n;
mod parse;
mod write;

use std::collections::BTreeMap;

pub use c14n::canonicalize;
pub use parse::{parse, parse_fragment};

/// In-scope namespace bindings: prefix (`""` for the default namespace) to URI.
pub type NsScope = BTreeMap<String, String>;

/// The reserved `xml` namespace.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// An attribute with its namespace resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local: String,
    /// Namespace URI (unprefixed attributes have none).
    pub ns: Option<String>,
    /// Unescaped value.
    pub value: String,
}

impl Attribute {
    /// Returns the qualified name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local)
    }
}

/// A child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data (already unescaped).
    Text(String),
}

/// An element with resolved names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local: String,
    /// Namespace URI.
    pub ns: Option<String>,
    /// Namespace declarations made on this element.
    pub declarations: Vec<(String, String)>,
    /// Attributes other than namespace declarations, in document order.
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an element in namespace `ns` with a qualified name such as
    /// `samlp:AuthnRequest`.
    #[must_use]
    pub fn new(ns: &str, qualified_name: &str) -> Self {
        let (prefix, local) = split_qname(qualified_name);
        Self {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
            ns: if ns.is_empty() { None } else { Some(ns.to_string()) },
            declarations: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Returns the qualified name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local)
    }

    /// Returns true if the element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local == local && self.ns.as_deref() == Some(ns)
    }

    /// Adds an unqualified attribute.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Adds an unqualified attribute when `value` is present.
    #[must_use]
    pub fn with_opt_attr(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.with_attr(name, v),
            None => self,
        }
    }

    /// Adds a namespaced attribute such as `xsi:type`.
    #[must_use]
    pub fn with_ns_attr(mut self, ns: &str, qualified_name: &str, value: impl Into<String>) -> Self {
        let (prefix, local) = split_qname(qualified_name);
        self.attributes.push(Attribute {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
            ns: Some(ns.to_string()),
            value: value.into(),
        });
        self
    }

    /// Declares a namespace on this element even if nothing uses it.
    #[must_use]
    pub fn declare(mut self, prefix: &str, uri: &str) -> Self {
        self.declarations.push((prefix.to_string(), uri.to_string()));
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Appends a child element when present.
    #[must_use]
    pub fn with_opt_child(self, child: Option<Element>) -> Self {
        match child {
            Some(c) => self.with_child(c),
            None => self,
        }
    }

    /// Appends several child elements.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children.into_iter().map(Node::Element));
        self
    }

    /// Appends character data.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text.into());
        self
    }

    /// Sets (or replaces) an unqualified attribute.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.prefix.is_none() && a.local == name)
        {
            existing.value = value;
            return;
        }
        self.attributes.push(Attribute {
            prefix: None,
            local: name.to_string(),
            ns: None,
            value,
        });
    }

    /// Returns an unqualified attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.ns.is_none() && a.local == name)
            .map(|a| a.value.as_str())
    }

    /// Returns a namespaced attribute value.
    #[must_use]
    pub fn ns_attr(&self, ns: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local == local && a.ns.as_deref() == Some(ns))
            .map(|a| a.value.as_str())
    }

    /// Appends a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Appends text, merging with a preceding text node.
    pub fn push_text(&mut self, text: String) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(Node::Text(text));
        }
    }

    /// Iterates over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Iterates over child elements with the given name.
    pub fn children_named<'a>(
        &'a self,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(ns, local))
    }

    /// Returns the first child element with the given name.
    #[must_use]
    pub fn child(&self, ns: &str, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(ns, local))
    }

    /// Returns the direct character data of this element.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Returns the trimmed text of the first matching child.
    #[must_use]
    pub fn child_text(&self, ns: &str, local: &str) -> Option<String> {
        self.child(ns, local).map(|c| c.text().trim().to_string())
    }

    /// Removes and returns all child elements with the given name.
    pub fn remove_children(&mut self, ns: &str, local: &str) -> Vec<Element> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in std::mem::take(&mut self.children) {
            match node {
                Node::Element(e) if e.is(ns, local) => removed.push(e),
                other => kept.push(other),
            }
        }
        self.children = kept;
        removed
    }

    /// Inserts `child` directly after the first child element named
    /// `ns:local`, or as the first child when there is none.
    pub fn insert_after(&mut self, ns: &str, local: &str, child: Element) {
        let position = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.is(ns, local)))
            .map_or(0, |i| i + 1);
        self.children.insert(position, Node::Element(child));
    }

    /// Returns `scope` extended with the declarations made on this element.
    #[must_use]
    pub fn inner_scope(&self, scope: &NsScope) -> NsScope {
        let mut inner = scope.clone();
        for (prefix, uri) in &self.declarations {
            inner.insert(prefix.clone(), uri.clone());
        }
        inner
    }

    /// Finds the element whose `ID` attribute equals `id`, together with the
    /// namespaces in scope at that element (excluding its own declarations).
    #[must_use]
    pub fn find_by_id(&self, id: &str, scope: &NsScope) -> Option<(&Element, NsScope)> {
        if self.attr("ID") == Some(id) {
            return Some((self, scope.clone()));
        }
        let inner = self.inner_scope(scope);
        self.elements().find_map(|child| child.find_by_id(id, &inner))
    }
}

/// Splits `prefix:local` into its parts.
pub(crate) fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

/// Escapes character data the way canonical XML does.
pub(crate) fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}

/// Escapes an attribute value the way canonical XML does.
pub(crate) fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}
