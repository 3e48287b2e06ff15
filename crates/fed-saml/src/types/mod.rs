//! SAML 2.0 types and data structures.
//!
//! Typed views of the protocol messages this engine builds and consumes.
//! Every message converts to and from the [`Element`](crate::xml::Element)
//! tree; signing and encryption work on the tree, everything else on these
//! types.

mod assertion;
mod authn_request;
mod constants;
mod logout;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use logout::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// Formats an instant as `xs:dateTime` in UTC with second precision.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an `xs:dateTime` value.
///
/// # Errors
///
/// Returns [`SamlError::InvalidMessage`] if the value is not RFC 3339.
pub fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidMessage(format!("invalid timestamp '{value}': {e}")))
}

/// Reads an optional timestamp attribute.
pub(crate) fn instant_attr(element: &Element, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    element.attr(name).map(parse_instant).transpose()
}

/// Reads a required attribute.
pub(crate) fn required_attr<'a>(element: &'a Element, name: &str) -> SamlResult<&'a str> {
    element
        .attr(name)
        .ok_or_else(|| SamlError::MissingElement(format!("{}/@{name}", element.qualified_name())))
}

/// Reads an optional boolean attribute (`true`/`false`/`1`/`0`).
pub(crate) fn bool_attr(element: &Element, name: &str) -> SamlResult<Option<bool>> {
    match element.attr(name) {
        None => Ok(None),
        Some("true" | "1") => Ok(Some(true)),
        Some("false" | "0") => Ok(Some(false)),
        Some(other) => Err(SamlError::InvalidMessage(format!(
            "invalid boolean '{other}' in attribute {name}"
        ))),
    }
}

/// Reads an optional unsigned integer attribute.
pub(crate) fn u32_attr(element: &Element, name: &str) -> SamlResult<Option<u32>> {
    element
        .attr(name)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| SamlError::InvalidMessage(format!("invalid integer '{v}' in attribute {name}")))
        })
        .transpose()
}

/// Builds the `<saml:Issuer>` element.
pub(crate) fn issuer_element(issuer: &str) -> Element {
    Element::new(SAML_NS, "saml:Issuer").with_text(issuer)
}

/// Encodes bytes as standard base64.
pub(crate) fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes base64 element content, ignoring embedded whitespace.
pub(crate) fn decode_base64(text: &str) -> SamlResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}
