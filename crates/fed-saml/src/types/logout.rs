//! SAML Single Logout types.

use chrono::{DateTime, Utc};

use super::{
    format_instant, instant_attr, issuer_element, required_attr, NameId, Status, SAMLP_NS, SAML_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Logout Request.
#[derive(Debug, Clone, PartialEq)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the issuer.
    pub issuer: String,

    /// The SLO endpoint this request is sent to.
    pub destination: Option<String>,

    /// Subject to log out, in clear.
    pub name_id: Option<NameId>,

    /// Subject to log out, encrypted for the recipient (`saml:EncryptedID`).
    pub encrypted_id: Option<Element>,

    /// Session indexes to terminate.
    pub session_indexes: Vec<String>,

    /// Reason for the logout.
    pub reason: Option<String>,

    /// Time after which the request should be discarded.
    pub not_on_or_after: Option<DateTime<Utc>>,
}

impl LogoutRequest {
    /// User-initiated logout.
    pub const REASON_USER: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:user";

    /// Admin-initiated logout.
    pub const REASON_ADMIN: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:admin";

    /// Creates a new logout request with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>, issue_instant: DateTime<Utc>) -> Self {
        Self {
            id: fed_crypto::random::message_id(),
            issue_instant,
            issuer: issuer.into(),
            destination: None,
            name_id: None,
            encrypted_id: None,
            session_indexes: Vec::new(),
            reason: None,
            not_on_or_after: None,
        }
    }

    /// Builds the `<samlp:LogoutRequest>` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new(SAMLP_NS, "samlp:LogoutRequest")
            .declare("saml", SAML_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", "2.0")
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_opt_attr("Destination", self.destination.clone())
            .with_opt_attr("Reason", self.reason.clone())
            .with_opt_attr("NotOnOrAfter", self.not_on_or_after.map(format_instant))
            .with_child(issuer_element(&self.issuer))
            .with_opt_child(self.encrypted_id.clone())
            .with_opt_child(match &self.encrypted_id {
                Some(_) => None,
                None => self.name_id.as_ref().map(NameId::to_element),
            })
            .with_children(
                self.session_indexes
                    .iter()
                    .map(|s| Element::new(SAMLP_NS, "samlp:SessionIndex").with_text(s.clone())),
            )
    }

    /// Parses a `<samlp:LogoutRequest>` element.
    ///
    /// # Errors
    ///
    /// Returns an error if required attributes are missing or malformed.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        if !element.is(SAMLP_NS, "LogoutRequest") {
            return Err(SamlError::InvalidMessage(format!(
                "expected samlp:LogoutRequest, found {}",
                element.qualified_name()
            )));
        }
        Ok(Self {
            id: required_attr(element, "ID")?.to_string(),
            issue_instant: instant_attr(element, "IssueInstant")?.ok_or_else(|| {
                SamlError::MissingElement("LogoutRequest/@IssueInstant".to_string())
            })?,
            issuer: element.child_text(SAML_NS, "Issuer").unwrap_or_default(),
            destination: element.attr("Destination").map(str::to_string),
            name_id: element
                .child(SAML_NS, "NameID")
                .map(NameId::from_element)
                .transpose()?,
            encrypted_id: element.child(SAML_NS, "EncryptedID").cloned(),
            session_indexes: element
                .children_named(SAMLP_NS, "SessionIndex")
                .map(|s| s.text().trim().to_string())
                .collect(),
            reason: element.attr("Reason").map(str::to_string),
            not_on_or_after: instant_attr(element, "NotOnOrAfter")?,
        })
    }
}

/// SAML Logout Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the issuer.
    pub issuer: String,

    /// ID of the request this responds to.
    pub in_response_to: Option<String>,

    /// The endpoint this response is sent to.
    pub destination: Option<String>,

    /// Outcome of the logout.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a logout response with the given status.
    #[must_use]
    pub fn new(issuer: impl Into<String>, issue_instant: DateTime<Utc>, status: Status) -> Self {
        Self {
            id: fed_crypto::random::message_id(),
            issue_instant,
            issuer: issuer.into(),
            in_response_to: None,
            destination: None,
            status,
        }
    }

    /// Returns true if the logout succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Builds the `<samlp:LogoutResponse>` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new(SAMLP_NS, "samlp:LogoutResponse")
            .declare("saml", SAML_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", "2.0")
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_opt_attr("Destination", self.destination.clone())
            .with_opt_attr("InResponseTo", self.in_response_to.clone())
            .with_child(issuer_element(&self.issuer))
            .with_child(self.status.to_element())
    }

    /// Parses a `<samlp:LogoutResponse>` element.
    ///
    /// # Errors
    ///
    /// Returns an error if required content is missing.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        if !element.is(SAMLP_NS, "LogoutResponse") {
            return Err(SamlError::InvalidMessage(format!(
                "expected samlp:LogoutResponse, found {}",
                element.qualified_name()
            )));
        }
        let status = element
            .child(SAMLP_NS, "Status")
            .ok_or_else(|| SamlError::MissingElement("samlp:Status".to_string()))?;
        Ok(Self {
            id: required_attr(element, "ID")?.to_string(),
            issue_instant: instant_attr(element, "IssueInstant")?.ok_or_else(|| {
                SamlError::MissingElement("LogoutResponse/@IssueInstant".to_string())
            })?,
            issuer: element.child_text(SAML_NS, "Issuer").unwrap_or_default(),
            in_response_to: element.attr("InResponseTo").map(str::to_string),
            destination: element.attr("Destination").map(str::to_string),
            status: Status::from_element(status)?,
        })
    }
}
