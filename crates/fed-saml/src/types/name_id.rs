//! SAML Name ID types.
//!
//! Name identifiers are used to identify subjects in SAML assertions.

use serde::{Deserialize, Serialize};

use super::{NameIdFormat, SAML_NS, SAMLP_NS};
use crate::error::{SamlError, SamlResult};
use crate::types::bool_attr;
use crate::xml::Element;

/// SAML Name ID.
///
/// Represents the identifier of a subject in a SAML assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The actual identifier value.
    pub value: String,

    /// The format of the name identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The security or administrative domain that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// A provider identifier for the SP that was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_provided_id: Option<String>,
}

impl NameId {
    /// Creates a new name ID with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
            sp_provided_id: None,
        }
    }

    /// Creates a new persistent name ID.
    #[must_use]
    pub fn persistent(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Persistent)
    }

    /// Creates a new transient name ID.
    #[must_use]
    pub fn transient(value: impl Into<String>) -> Self {
        Self::new(value).with_format(NameIdFormat::Transient)
    }

    /// Sets the format for this name ID.
    #[must_use]
    pub fn with_format(mut self, format: NameIdFormat) -> Self {
        self.format = Some(format.uri().to_string());
        self
    }

    /// Sets the name qualifier.
    #[must_use]
    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Builds the `<saml:NameID>` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new(SAML_NS, "saml:NameID")
            .with_opt_attr("NameQualifier", self.name_qualifier.clone())
            .with_opt_attr("SPNameQualifier", self.sp_name_qualifier.clone())
            .with_opt_attr("Format", self.format.clone())
            .with_opt_attr("SPProvidedID", self.sp_provided_id.clone())
            .with_text(self.value.clone())
    }

    /// Parses a `<saml:NameID>` element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidMessage`] if the element is not a NameID.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        if !element.is(SAML_NS, "NameID") {
            return Err(SamlError::InvalidMessage(format!(
                "expected saml:NameID, found {}",
                element.qualified_name()
            )));
        }
        Ok(Self {
            value: element.text().trim().to_string(),
            format: element.attr("Format").map(str::to_string),
            name_qualifier: element.attr("NameQualifier").map(str::to_string),
            sp_name_qualifier: element.attr("SPNameQualifier").map(str::to_string),
            sp_provided_id: element.attr("SPProvidedID").map(str::to_string),
        })
    }
}

/// Name ID policy for authentication requests.
///
/// Specifies constraints on the name identifier to be returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// The requested name ID format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The SP name qualifier for the name ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// Whether a new identifier may be created for this request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_create: Option<bool>,
}

impl NameIdPolicy {
    /// Creates a policy requesting a specific format.
    #[must_use]
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            sp_name_qualifier: None,
            allow_create: None,
        }
    }

    /// Sets whether new identifiers can be created.
    #[must_use]
    pub const fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = Some(allow);
        self
    }

    /// Builds the `<samlp:NameIDPolicy>` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new(SAMLP_NS, "samlp:NameIDPolicy")
            .with_opt_attr("Format", self.format.clone())
            .with_opt_attr("SPNameQualifier", self.sp_name_qualifier.clone())
            .with_opt_attr("AllowCreate", self.allow_create.map(|b| b.to_string()))
    }

    /// Parses a `<samlp:NameIDPolicy>` element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidMessage`] for a malformed `AllowCreate`.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            format: element.attr("Format").map(str::to_string),
            sp_name_qualifier: element.attr("SPNameQualifier").map(str::to_string),
            allow_create: bool_attr(element, "AllowCreate")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn name_id_with_qualifiers() {
        let name_id = NameId::persistent("user")
            .with_name_qualifier("idp.example.com")
            .with_sp_name_qualifier("sp.example.com");

        let xml = name_id.to_element().to_xml();
        assert!(xml.contains(r#"SPNameQualifier="sp.example.com""#));
        assert_eq!(NameId::from_element(&parse(&xml).unwrap()).unwrap(), name_id);
    }

    #[test]
    fn name_id_value_is_trimmed() {
        let el = parse(r#"<saml:NameID xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">  abc
        </saml:NameID>"#)
        .unwrap();
        assert_eq!(NameId::from_element(&el).unwrap().value, "abc");
    }

    #[test]
    fn wrong_element_is_rejected() {
        let el = Element::new(SAML_NS, "saml:Issuer");
        assert!(NameId::from_element(&el).is_err());
    }

    #[test]
    fn policy_omits_unset_attributes() {
        let policy = NameIdPolicy::with_format(NameIdFormat::Transient.uri());
        let xml = policy.to_element().to_xml();
        assert!(!xml.contains("AllowCreate"));

        let policy = policy.allow_create(true);
        assert!(policy.to_element().to_xml().contains(r#"AllowCreate="true""#));
    }
}
