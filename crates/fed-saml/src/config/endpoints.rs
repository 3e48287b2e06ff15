//! Protocol endpoints published in metadata.

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

/// A service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    /// Binding URI.
    #[serde(rename = "Binding")]
    pub binding: String,

    /// Endpoint URL.
    #[serde(rename = "Location")]
    pub location: String,

    /// Separate URL for responses.
    #[serde(rename = "ResponseLocation", default, skip_serializing_if = "Option::is_none")]
    pub response_location: Option<String>,

    /// Index for indexed endpoint types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    /// Marks the default endpoint.
    #[serde(rename = "isDefault", default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,

    /// Protocol binding used by a Holder-of-Key assertion consumer.
    #[serde(rename = "hoksso:ProtocolBinding", default, skip_serializing_if = "Option::is_none")]
    pub hok_protocol_binding: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint for `binding` at `location`.
    #[must_use]
    pub fn new(binding: SamlBinding, location: impl Into<String>) -> Self {
        Self {
            binding: binding.uri().to_string(),
            location: location.into(),
            response_location: None,
            index: None,
            is_default: None,
            hok_protocol_binding: None,
        }
    }

    /// Returns the parsed binding.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        SamlBinding::from_uri(&self.binding)
    }

    /// Returns `ResponseLocation` if set, else `Location`.
    #[must_use]
    pub fn response_url(&self) -> &str {
        self.response_location.as_deref().unwrap_or(&self.location)
    }
}

/// Binding assumed for endpoints configured as a bare URL.
pub(super) fn default_binding(service: &str) -> SamlResult<SamlBinding> {
    match service {
        "AssertionConsumerService" => Ok(SamlBinding::HttpPost),
        "SingleSignOnService" | "SingleLogoutService" => Ok(SamlBinding::HttpRedirect),
        "ArtifactResolutionService" | "AttributeService" => Ok(SamlBinding::Soap),
        other => Err(SamlError::InvalidConfig(format!(
            "no default binding for endpoint type '{other}'"
        ))),
    }
}

pub(super) fn pick_default(endpoints: Vec<Endpoint>) -> Option<Endpoint> {
    if let Some(flagged) = endpoints.iter().find(|e| e.is_default == Some(true)) {
        return Some(flagged.clone());
    }
    if let Some(unflagged) = endpoints.iter().find(|e| e.is_default.is_none()) {
        return Some(unflagged.clone());
    }
    endpoints.into_iter().next()
}
