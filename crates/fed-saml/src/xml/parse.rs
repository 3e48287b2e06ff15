//! Parsing into [`Element`] trees with `quick-xml`.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{split_qname, Attribute, Element, NsScope, XML_NS};
use crate::error::{SamlError, SamlResult};

/// Parses a complete XML document and returns its root element.
///
/// # Errors
///
/// Returns [`SamlError::XmlParse`] for malformed input, undeclared prefixes,
/// DOCTYPE declarations, or documents without a root element.
pub fn parse(xml: &str) -> SamlResult<Element> {
    parse_with_scope(xml, &NsScope::new())
}

/// Parses a fragment whose namespace prefixes may be declared by an
/// enclosing document (e.g. decrypted `EncryptedData` content).
///
/// # Errors
///
/// Same as [`parse`].
pub fn parse_fragment(xml: &str, scope: &NsScope) -> SamlResult<Element> {
    parse_with_scope(xml, scope)
}

fn parse_with_scope(xml: &str, inherited: &NsScope) -> SamlResult<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<(Element, NsScope)> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let opened = open_element(&start, stack.last().map_or(inherited, |(_, s)| s))?;
                stack.push(opened);
            }
            Event::Empty(start) => {
                let (element, _) =
                    open_element(&start, stack.last().map_or(inherited, |(_, s)| s))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let (element, _) = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unexpected end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let raw = text.into_inner();
                let raw = std::str::from_utf8(&raw)
                    .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}")))?;
                match stack.last_mut() {
                    Some((parent, _)) => {
                        let normalized = normalize_newlines(raw);
                        parent.push_text(unescape(&normalized)?.into_owned());
                    }
                    None if raw.trim().is_empty() => {}
                    None => {
                        return Err(SamlError::XmlParse(
                            "character data outside the root element".to_string(),
                        ))
                    }
                }
            }
            Event::CData(data) => {
                let text = String::from_utf8(data.into_inner().into_owned())
                    .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}")))?;
                if let Some((parent, _)) = stack.last_mut() {
                    parent.push_text(text);
                }
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
            }
            Event::Eof => break,
            // declaration, comments, processing instructions
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unclosed element".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

fn attach(
    stack: &mut [(Element, NsScope)],
    root: &mut Option<Element>,
    element: Element,
) -> SamlResult<()> {
    if let Some((parent, _)) = stack.last_mut() {
        parent.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(SamlError::XmlParse("multiple root elements".to_string()));
    }
    *root = Some(element);
    Ok(())
}

fn open_element(start: &BytesStart<'_>, inherited: &NsScope) -> SamlResult<(Element, NsScope)> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| SamlError::XmlParse(format!("invalid element name: {e}")))?
        .to_string();

    let mut scope = inherited.clone();
    let mut declarations = Vec::new();
    let mut raw_attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| SamlError::XmlParse(format!("invalid attribute name: {e}")))?
            .to_string();
        let raw = std::str::from_utf8(&attr.value)
            .map_err(|e| SamlError::XmlParse(format!("invalid attribute value: {e}")))?;
        let value = unescape(&normalize_attribute(raw))?.into_owned();

        if key == "xmlns" {
            scope.insert(String::new(), value.clone());
            declarations.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.insert(prefix.to_string(), value.clone());
            declarations.push((prefix.to_string(), value));
        } else {
            raw_attributes.push((key, value));
        }
    }

    let (prefix, local) = split_qname(&name);
    let ns = match prefix {
        None => scope.get("").filter(|uri| !uri.is_empty()).cloned(),
        Some(p) => Some(resolve_prefix(&scope, p)?),
    };

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (attr_prefix, attr_local) = split_qname(&key);
        let attr_ns = match attr_prefix {
            None => None,
            Some(p) => Some(resolve_prefix(&scope, p)?),
        };
        attributes.push(Attribute {
            prefix: attr_prefix.map(str::to_string),
            local: attr_local.to_string(),
            ns: attr_ns,
            value,
        });
    }

    let element = Element {
        prefix: prefix.map(str::to_string),
        local: local.to_string(),
        ns,
        declarations,
        attributes,
        children: Vec::new(),
    };
    Ok((element, scope))
}

fn resolve_prefix(scope: &NsScope, prefix: &str) -> SamlResult<String> {
    if prefix == "xml" {
        return Ok(XML_NS.to_string());
    }
    scope
        .get(prefix)
        .filter(|uri| !uri.is_empty())
        .cloned()
        .ok_or_else(|| SamlError::XmlParse(format!("undeclared namespace prefix '{prefix}'")))
}

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Attribute-value normalization: literal whitespace characters become spaces.
fn normalize_attribute(raw: &str) -> String {
    normalize_newlines(raw).replace(['\n', '\t'], " ")
}
