//! Exclusive XML Canonicalization 1.0 without comments.
//!
//! <https://www.w3.org/TR/xml-exc-c14n/>

use std::collections::BTreeMap;

use super::{escape_attr, escape_text, Element, Node, NsScope};

/// Canonicalizes `element` as the apex of a document subset.
///
/// `scope` holds the namespaces in scope at `element` from its ancestors; it
/// only matters for prefixes listed in `inclusive_prefixes` (the
/// `InclusiveNamespaces PrefixList`, where `#default` names the default
/// namespace). All other declarations are emitted where visibly utilized.
#[must_use]
pub fn canonicalize(element: &Element, scope: &NsScope, inclusive_prefixes: &[String]) -> String {
    let mut out = String::new();
    write_element(element, &mut out, &NsScope::new(), scope, inclusive_prefixes);
    out
}

fn write_element(
    element: &Element,
    out: &mut String,
    rendered: &NsScope,
    scope: &NsScope,
    inclusive: &[String],
) {
    let scope = element.inner_scope(scope);

    let mut utilized: BTreeMap<String, String> = BTreeMap::new();
    utilized.insert(
        element.prefix.clone().unwrap_or_default(),
        element.ns.clone().unwrap_or_default(),
    );
    for attr in &element.attributes {
        if let Some(prefix) = &attr.prefix {
            if prefix != "xml" {
                utilized.insert(prefix.clone(), attr.ns.clone().unwrap_or_default());
            }
        }
    }
    for listed in inclusive {
        let prefix = if listed == "#default" { "" } else { listed.as_str() };
        if let Some(uri) = scope.get(prefix) {
            utilized
                .entry(prefix.to_string())
                .or_insert_with(|| uri.clone());
        }
    }

    let mut rendered = rendered.clone();
    let qname = element.qualified_name();
    out.push('<');
    out.push_str(&qname);

    for (prefix, uri) in utilized {
        let current = rendered.get(&prefix).map_or("", String::as_str);
        let already = if prefix.is_empty() {
            current == uri
        } else {
            rendered.contains_key(&prefix) && current == uri
        };
        if already || (!prefix.is_empty() && uri.is_empty()) {
            continue;
        }
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(&prefix);
            out.push_str("=\"");
        }
        escape_attr(&uri, out);
        out.push('"');
        rendered.insert(prefix, uri);
    }

    let mut attributes: Vec<_> = element.attributes.iter().collect();
    attributes.sort_by(|a, b| {
        let ka = (a.ns.as_deref().unwrap_or(""), a.local.as_str());
        let kb = (b.ns.as_deref().unwrap_or(""), b.local.as_str());
        ka.cmp(&kb)
    });
    for attr in attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        escape_attr(&attr.value, out);
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(e) => write_element(e, out, &rendered, &scope, inclusive),
            Node::Text(t) => escape_text(t, out),
        }
    }

    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}
