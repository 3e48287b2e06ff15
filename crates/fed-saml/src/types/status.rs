//! SAML Status types.
//!
//! Status information returned in SAML protocol responses.

use serde::{Deserialize, Serialize};

use super::{status_codes, SAMLP_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML protocol status.
///
/// Carries the top-level code, an optional second-level code and an optional
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self::new(status_codes::SUCCESS, None, None)
    }

    /// Creates a status from a top-level code and optional sub-code.
    #[must_use]
    pub fn new(top_code: &str, sub_code: Option<&str>, message: Option<String>) -> Self {
        Self {
            status_code: StatusCode {
                value: top_code.to_string(),
                status_code: sub_code.map(|s| Box::new(StatusCode::new(s))),
            },
            status_message: message,
        }
    }

    /// Creates a responder error status.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self::new(status_codes::RESPONDER, None, Some(message.into()))
    }

    /// Returns the top-level status code.
    #[must_use]
    pub fn top_code(&self) -> &str {
        &self.status_code.value
    }

    /// Returns the second-level status code, if any.
    #[must_use]
    pub fn sub_code(&self) -> Option<&str> {
        self.status_code
            .status_code
            .as_deref()
            .map(|c| c.value.as_str())
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Builds the `<samlp:Status>` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new(SAMLP_NS, "samlp:Status")
            .with_child(self.status_code.to_element())
            .with_opt_child(
                self.status_message
                    .as_ref()
                    .map(|m| Element::new(SAMLP_NS, "samlp:StatusMessage").with_text(m.clone())),
            )
    }

    /// Parses a `<samlp:Status>` element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] if there is no `StatusCode`.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let code = element
            .child(SAMLP_NS, "StatusCode")
            .ok_or_else(|| SamlError::MissingElement("samlp:StatusCode".to_string()))?;
        Ok(Self {
            status_code: StatusCode::from_element(code)?,
            status_message: element.child_text(SAMLP_NS, "StatusMessage"),
        })
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// SAML status code, possibly nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI.
    pub value: String,

    /// Optional nested status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a status code without a nested code.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    fn to_element(&self) -> Element {
        Element::new(SAMLP_NS, "samlp:StatusCode")
            .with_attr("Value", self.value.clone())
            .with_opt_child(self.status_code.as_ref().map(|c| c.to_element()))
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let value = element
            .attr("Value")
            .ok_or_else(|| SamlError::MissingElement("StatusCode/@Value".to_string()))?;
        let nested = match element.child(SAMLP_NS, "StatusCode") {
            Some(child) => Some(Box::new(Self::from_element(child)?)),
            None => None,
        };
        Ok(Self {
            value: value.to_string(),
            status_code: nested,
        })
    }
}
