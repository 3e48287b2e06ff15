//! SAML Response types.

use chrono::{DateTime, Utc};

use super::{
    format_instant, instant_attr, issuer_element, required_attr, Status, SAMLP_NS, SAML_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Response.
///
/// Assertions are kept as elements (`saml:Assertion` or
/// `saml:EncryptedAssertion`) since their signatures and encryption are
/// processed on the XML tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the issuer.
    pub issuer: Option<String>,

    /// ID of the request this responds to.
    pub in_response_to: Option<String>,

    /// The endpoint this response is sent to.
    pub destination: Option<String>,

    /// Outcome of the request.
    pub status: Status,

    /// Assertions in document order.
    pub assertions: Vec<Element>,
}

impl Response {
    /// Creates a response with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>, issue_instant: DateTime<Utc>, status: Status) -> Self {
        Self {
            id: fed_crypto::random::message_id(),
            issue_instant,
            issuer: Some(issuer.into()),
            in_response_to: None,
            destination: None,
            status,
            assertions: Vec::new(),
        }
    }

    /// Returns true if the status is success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Builds the `<samlp:Response>` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new(SAMLP_NS, "samlp:Response")
            .declare("saml", SAML_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", "2.0")
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_opt_attr("Destination", self.destination.clone())
            .with_opt_attr("InResponseTo", self.in_response_to.clone())
            .with_opt_child(self.issuer.as_deref().map(issuer_element))
            .with_child(self.status.to_element())
            .with_children(self.assertions.iter().cloned())
    }

    /// Parses a `<samlp:Response>` element.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not a Response or lacks a Status.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        if !element.is(SAMLP_NS, "Response") {
            return Err(SamlError::InvalidMessage(format!(
                "expected samlp:Response, found {}",
                element.qualified_name()
            )));
        }
        let status = element
            .child(SAMLP_NS, "Status")
            .ok_or_else(|| SamlError::MissingElement("samlp:Status".to_string()))?;
        Ok(Self {
            id: required_attr(element, "ID")?.to_string(),
            issue_instant: instant_attr(element, "IssueInstant")?
                .ok_or_else(|| SamlError::MissingElement("Response/@IssueInstant".to_string()))?,
            issuer: element.child_text(SAML_NS, "Issuer"),
            in_response_to: element.attr("InResponseTo").map(str::to_string),
            destination: element.attr("Destination").map(str::to_string),
            status: Status::from_element(status)?,
            assertions: element
                .elements()
                .filter(|e| e.is(SAML_NS, "Assertion") || e.is(SAML_NS, "EncryptedAssertion"))
                .cloned()
                .collect(),
        })
    }
}
