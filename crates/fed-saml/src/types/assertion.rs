//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer.

use chrono::{DateTime, Utc};

use super::{
    format_instant, instant_attr, issuer_element, required_attr, NameId, SAML_NS, XMLDSIG_NS,
    XSI_NS, XS_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Assertion.
///
/// A package of statements made by a SAML authority (the issuer). Encrypted
/// parts stay as raw `Element`s until decrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this assertion.
    pub issuer: String,

    /// The subject of this assertion.
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    pub conditions: Option<Conditions>,

    /// Authentication statements.
    pub authn_statements: Vec<AuthnStatement>,

    /// Attributes in clear.
    pub attributes: Vec<Attribute>,

    /// `saml:EncryptedAttribute` elements not yet decrypted.
    pub encrypted_attributes: Vec<Element>,

    /// Whether a valid signature covered this assertion.
    pub signed: bool,
}

impl Assertion {
    /// Creates an empty assertion with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>, issue_instant: DateTime<Utc>) -> Self {
        Self {
            id: fed_crypto::random::message_id(),
            issue_instant,
            issuer: issuer.into(),
            subject: None,
            conditions: None,
            authn_statements: Vec::new(),
            attributes: Vec::new(),
            encrypted_attributes: Vec::new(),
            signed: false,
        }
    }

    /// Returns the clear-text NameID of the subject, if any.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        self.subject.as_ref().and_then(|s| s.name_id.as_ref())
    }

    /// Returns the first session index from the authentication statements.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.authn_statements
            .iter()
            .find_map(|s| s.session_index.as_deref())
    }

    /// Returns the earliest `SessionNotOnOrAfter`.
    #[must_use]
    pub fn session_not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.authn_statements
            .iter()
            .filter_map(|s| s.session_not_on_or_after)
            .min()
    }

    /// Returns the values of the named attribute.
    #[must_use]
    pub fn attribute_values(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.values.as_slice())
    }

    /// Builds the `<saml:Assertion>` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut el = Element::new(SAML_NS, "saml:Assertion")
            .declare("xs", XS_NS)
            .declare("xsi", XSI_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", "2.0")
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_child(issuer_element(&self.issuer))
            .with_opt_child(self.subject.as_ref().map(Subject::to_element))
            .with_opt_child(self.conditions.as_ref().map(Conditions::to_element))
            .with_children(self.authn_statements.iter().map(AuthnStatement::to_element));

        if !self.attributes.is_empty() || !self.encrypted_attributes.is_empty() {
            el.push(
                Element::new(SAML_NS, "saml:AttributeStatement")
                    .with_children(self.attributes.iter().map(Attribute::to_element))
                    .with_children(self.encrypted_attributes.iter().cloned()),
            );
        }
        el
    }

    /// Parses a `<saml:Assertion>` element.
    ///
    /// # Errors
    ///
    /// Returns an error if required content is missing or malformed.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        if !element.is(SAML_NS, "Assertion") {
            return Err(SamlError::InvalidMessage(format!(
                "expected saml:Assertion, found {}",
                element.qualified_name()
            )));
        }
        let mut attributes = Vec::new();
        let mut encrypted_attributes = Vec::new();
        for statement in element.children_named(SAML_NS, "AttributeStatement") {
            for child in statement.elements() {
                if child.is(SAML_NS, "Attribute") {
                    attributes.push(Attribute::from_element(child)?);
                } else if child.is(SAML_NS, "EncryptedAttribute") {
                    encrypted_attributes.push(child.clone());
                }
            }
        }

        Ok(Self {
            id: required_attr(element, "ID")?.to_string(),
            issue_instant: instant_attr(element, "IssueInstant")?
                .ok_or_else(|| SamlError::MissingElement("Assertion/@IssueInstant".to_string()))?,
            issuer: element
                .child_text(SAML_NS, "Issuer")
                .ok_or_else(|| SamlError::MissingElement("saml:Issuer".to_string()))?,
            subject: element
                .child(SAML_NS, "Subject")
                .map(Subject::from_element)
                .transpose()?,
            conditions: element
                .child(SAML_NS, "Conditions")
                .map(Conditions::from_element)
                .transpose()?,
            authn_statements: element
                .children_named(SAML_NS, "AuthnStatement")
                .map(AuthnStatement::from_element)
                .collect::<SamlResult<_>>()?,
            attributes,
            encrypted_attributes,
            signed: false,
        })
    }
}

/// Subject of an assertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subject {
    /// The name identifier, in clear.
    pub name_id: Option<NameId>,

    /// The name identifier, encrypted (`saml:EncryptedID`).
    pub encrypted_id: Option<Element>,

    /// Subject confirmations, in document order.
    pub confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    /// Creates a subject with a name ID.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            name_id: Some(name_id),
            encrypted_id: None,
            confirmations: Vec::new(),
        }
    }

    /// Adds a subject confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.confirmations.push(confirmation);
        self
    }

    fn to_element(&self) -> Element {
        let id = match &self.encrypted_id {
            Some(encrypted) => Some(encrypted.clone()),
            None => self.name_id.as_ref().map(NameId::to_element),
        };
        Element::new(SAML_NS, "saml:Subject")
            .with_opt_child(id)
            .with_children(self.confirmations.iter().map(SubjectConfirmation::to_element))
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            name_id: element
                .child(SAML_NS, "NameID")
                .map(NameId::from_element)
                .transpose()?,
            encrypted_id: element.child(SAML_NS, "EncryptedID").cloned(),
            confirmations: element
                .children_named(SAML_NS, "SubjectConfirmation")
                .map(SubjectConfirmation::from_element)
                .collect::<SamlResult<_>>()?,
        })
    }
}

/// Subject confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectConfirmation {
    /// The confirmation method URI.
    pub method: String,

    /// Identifier of the confirming entity.
    pub name_id: Option<NameId>,

    /// Additional confirmation data.
    pub data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Creates a confirmation with the given method.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            name_id: None,
            data: None,
        }
    }

    /// Sets the confirmation data.
    #[must_use]
    pub fn with_data(mut self, data: SubjectConfirmationData) -> Self {
        self.data = Some(data);
        self
    }

    fn to_element(&self) -> Element {
        Element::new(SAML_NS, "saml:SubjectConfirmation")
            .with_attr("Method", self.method.clone())
            .with_opt_child(self.name_id.as_ref().map(NameId::to_element))
            .with_opt_child(self.data.as_ref().map(SubjectConfirmationData::to_element))
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            method: required_attr(element, "Method")?.to_string(),
            name_id: element
                .child(SAML_NS, "NameID")
                .map(NameId::from_element)
                .transpose()?,
            data: element
                .child(SAML_NS, "SubjectConfirmationData")
                .map(SubjectConfirmationData::from_element)
                .transpose()?,
        })
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectConfirmationData {
    /// Earliest time the subject can be confirmed.
    pub not_before: Option<DateTime<Utc>>,

    /// Time at which the subject can no longer be confirmed.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Endpoint the assertion may be delivered to.
    pub recipient: Option<String>,

    /// ID of the request this assertion responds to.
    pub in_response_to: Option<String>,

    /// Network address of the attesting entity.
    pub address: Option<String>,

    /// `ds:KeyInfo` children (Holder-of-Key).
    pub key_infos: Vec<Element>,
}

impl SubjectConfirmationData {
    fn to_element(&self) -> Element {
        Element::new(SAML_NS, "saml:SubjectConfirmationData")
            .with_opt_attr("NotBefore", self.not_before.map(format_instant))
            .with_opt_attr("NotOnOrAfter", self.not_on_or_after.map(format_instant))
            .with_opt_attr("Recipient", self.recipient.clone())
            .with_opt_attr("InResponseTo", self.in_response_to.clone())
            .with_opt_attr("Address", self.address.clone())
            .with_children(self.key_infos.iter().cloned())
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            not_before: instant_attr(element, "NotBefore")?,
            not_on_or_after: instant_attr(element, "NotOnOrAfter")?,
            recipient: element.attr("Recipient").map(str::to_string),
            in_response_to: element.attr("InResponseTo").map(str::to_string),
            address: element.attr("Address").map(str::to_string),
            key_infos: element.children_named(XMLDSIG_NS, "KeyInfo").cloned().collect(),
        })
    }
}

/// Assertion conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions {
    /// Earliest valid time.
    pub not_before: Option<DateTime<Utc>>,

    /// Expiry time.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audiences of each `AudienceRestriction`, in document order.
    pub audience_restrictions: Vec<Vec<String>>,
}

impl Conditions {
    /// Adds an audience restriction.
    #[must_use]
    pub fn with_audience_restriction(mut self, audiences: Vec<String>) -> Self {
        self.audience_restrictions.push(audiences);
        self
    }

    /// Returns the audiences valid under every restriction, or `None` when
    /// the assertion carries no `AudienceRestriction`.
    #[must_use]
    pub fn valid_audiences(&self) -> Option<Vec<String>> {
        let mut restrictions = self.audience_restrictions.iter();
        let first = restrictions.next()?;
        let mut valid = first.clone();
        for restriction in restrictions {
            valid.retain(|a| restriction.contains(a));
        }
        Some(valid)
    }

    fn to_element(&self) -> Element {
        Element::new(SAML_NS, "saml:Conditions")
            .with_opt_attr("NotBefore", self.not_before.map(format_instant))
            .with_opt_attr("NotOnOrAfter", self.not_on_or_after.map(format_instant))
            .with_children(self.audience_restrictions.iter().map(|audiences| {
                Element::new(SAML_NS, "saml:AudienceRestriction").with_children(
                    audiences
                        .iter()
                        .map(|a| Element::new(SAML_NS, "saml:Audience").with_text(a.clone())),
                )
            }))
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            not_before: instant_attr(element, "NotBefore")?,
            not_on_or_after: instant_attr(element, "NotOnOrAfter")?,
            audience_restrictions: element
                .children_named(SAML_NS, "AudienceRestriction")
                .map(|r| {
                    r.children_named(SAML_NS, "Audience")
                        .map(|a| a.text().trim().to_string())
                        .collect()
                })
                .collect(),
        })
    }
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    /// Time of authentication.
    pub authn_instant: DateTime<Utc>,

    /// Session index at the IdP.
    pub session_index: Option<String>,

    /// Session expiry.
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// Authentication context class.
    pub authn_context_class_ref: Option<String>,

    /// Authorities involved in authenticating the subject.
    pub authenticating_authorities: Vec<String>,
}

impl AuthnStatement {
    /// Creates a statement for an authentication at `authn_instant`.
    #[must_use]
    pub fn new(authn_instant: DateTime<Utc>) -> Self {
        Self {
            authn_instant,
            session_index: None,
            session_not_on_or_after: None,
            authn_context_class_ref: None,
            authenticating_authorities: Vec::new(),
        }
    }

    fn to_element(&self) -> Element {
        let context = Element::new(SAML_NS, "saml:AuthnContext")
            .with_opt_child(
                self.authn_context_class_ref
                    .as_ref()
                    .map(|c| Element::new(SAML_NS, "saml:AuthnContextClassRef").with_text(c.clone())),
            )
            .with_children(self.authenticating_authorities.iter().map(|a| {
                Element::new(SAML_NS, "saml:AuthenticatingAuthority").with_text(a.clone())
            }));
        Element::new(SAML_NS, "saml:AuthnStatement")
            .with_attr("AuthnInstant", format_instant(self.authn_instant))
            .with_opt_attr("SessionIndex", self.session_index.clone())
            .with_opt_attr(
                "SessionNotOnOrAfter",
                self.session_not_on_or_after.map(format_instant),
            )
            .with_child(context)
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let context = element.child(SAML_NS, "AuthnContext");
        Ok(Self {
            authn_instant: instant_attr(element, "AuthnInstant")?.ok_or_else(|| {
                SamlError::MissingElement("AuthnStatement/@AuthnInstant".to_string())
            })?,
            session_index: element.attr("SessionIndex").map(str::to_string),
            session_not_on_or_after: instant_attr(element, "SessionNotOnOrAfter")?,
            authn_context_class_ref: context
                .and_then(|c| c.child_text(SAML_NS, "AuthnContextClassRef")),
            authenticating_authorities: context
                .map(|c| {
                    c.children_named(SAML_NS, "AuthenticatingAuthority")
                        .map(|a| a.text().trim().to_string())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

/// SAML Attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute name (typically a URI).
    pub name: String,

    /// The format of the attribute name.
    pub name_format: Option<String>,

    /// A human-readable name for the attribute.
    pub friendly_name: Option<String>,

    /// The attribute values.
    pub values: Vec<String>,
}

impl Attribute {
    /// URI name format.
    pub const NAME_FORMAT_URI: &'static str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";

    /// Basic name format.
    pub const NAME_FORMAT_BASIC: &'static str =
        "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";

    /// Creates a new attribute with multiple values.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            friendly_name: None,
            values,
        }
    }

    /// Builds the `<saml:Attribute>` element with `xs:string` values.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new(SAML_NS, "saml:Attribute")
            .with_attr("Name", self.name.clone())
            .with_opt_attr("NameFormat", self.name_format.clone())
            .with_opt_attr("FriendlyName", self.friendly_name.clone())
            .with_children(self.values.iter().map(|v| {
                Element::new(SAML_NS, "saml:AttributeValue")
                    .declare("xs", XS_NS)
                    .with_ns_attr(XSI_NS, "xsi:type", "xs:string")
                    .with_text(v.clone())
            }))
    }

    /// Parses a `<saml:Attribute>` element.
    ///
    /// Values with element content are kept as serialized XML.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] without a `Name`.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let values = element
            .children_named(SAML_NS, "AttributeValue")
            .map(|v| match v.elements().next() {
                Some(nested) => nested.to_xml(),
                None => v.text(),
            })
            .collect();
        Ok(Self {
            name: required_attr(element, "Name")?.to_string(),
            name_format: element.attr("NameFormat").map(str::to_string),
            friendly_name: element.attr("FriendlyName").map(str::to_string),
            values,
        })
    }
}
