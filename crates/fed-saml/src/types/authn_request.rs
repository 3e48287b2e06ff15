//! SAML AuthnRequest types.
//!
//! Authentication request message sent by a service provider to an identity provider.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    format_instant, instant_attr, issuer_element, required_attr, u32_attr, NameId, NameIdPolicy,
    SamlBinding, SAMLP_NS, SAML_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::types::bool_attr;
use crate::xml::Element;

/// SAML Authentication Request.
///
/// An authentication request message sent from a service provider to an
/// identity provider requesting authentication of a principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: String,

    /// The endpoint the request is sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The URL where the response should be sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// Index into the SP's assertion consumer service list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_index: Option<u32>,

    /// Index into the SP's attribute consuming service list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_consuming_service_index: Option<u32>,

    /// Binding to use for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,

    /// A human-readable name for the requester.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,

    /// Whether the IdP must authenticate the user directly.
    #[serde(default)]
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    #[serde(default)]
    pub is_passive: bool,

    /// Requested subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<NameId>,

    /// Name ID policy constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_policy: Option<NameIdPolicy>,

    /// Audiences requested for the resulting assertion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,

    /// Requested authentication context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_authn_context: Option<RequestedAuthnContext>,

    /// Proxying constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoping: Option<Scoping>,
}

impl AuthnRequest {
    /// Creates a new authentication request with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>, issue_instant: DateTime<Utc>) -> Self {
        Self {
            id: fed_crypto::random::message_id(),
            issue_instant,
            issuer: issuer.into(),
            destination: None,
            assertion_consumer_service_url: None,
            assertion_consumer_service_index: None,
            attribute_consuming_service_index: None,
            protocol_binding: None,
            provider_name: None,
            force_authn: false,
            is_passive: false,
            subject: None,
            name_id_policy: None,
            audiences: Vec::new(),
            requested_authn_context: None,
            scoping: None,
        }
    }

    /// Returns the parsed protocol binding.
    #[must_use]
    pub fn parsed_binding(&self) -> Option<SamlBinding> {
        self.protocol_binding.as_deref().and_then(SamlBinding::from_uri)
    }

    /// Builds the `<samlp:AuthnRequest>` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut el = Element::new(SAMLP_NS, "samlp:AuthnRequest")
            .declare("saml", SAML_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", "2.0")
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_opt_attr("Destination", self.destination.clone())
            .with_opt_attr("ProviderName", self.provider_name.clone());
        if self.force_authn {
            el.set_attr("ForceAuthn", "true");
        }
        if self.is_passive {
            el.set_attr("IsPassive", "true");
        }
        el = el
            .with_opt_attr(
                "AssertionConsumerServiceURL",
                self.assertion_consumer_service_url.clone(),
            )
            .with_opt_attr(
                "AssertionConsumerServiceIndex",
                self.assertion_consumer_service_index.map(|i| i.to_string()),
            )
            .with_opt_attr(
                "AttributeConsumingServiceIndex",
                self.attribute_consuming_service_index.map(|i| i.to_string()),
            )
            .with_opt_attr("ProtocolBinding", self.protocol_binding.clone())
            .with_child(issuer_element(&self.issuer))
            .with_opt_child(self.subject.as_ref().map(|n| {
                Element::new(SAML_NS, "saml:Subject").with_child(n.to_element())
            }))
            .with_opt_child(self.name_id_policy.as_ref().map(NameIdPolicy::to_element));

        if !self.audiences.is_empty() {
            let restriction = Element::new(SAML_NS, "saml:AudienceRestriction").with_children(
                self.audiences
                    .iter()
                    .map(|a| Element::new(SAML_NS, "saml:Audience").with_text(a.clone())),
            );
            el.push(Element::new(SAML_NS, "saml:Conditions").with_child(restriction));
        }

        el.with_opt_child(
            self.requested_authn_context
                .as_ref()
                .map(RequestedAuthnContext::to_element),
        )
        .with_opt_child(self.scoping.as_ref().map(Scoping::to_element))
    }

    /// Parses a `<samlp:AuthnRequest>` element.
    ///
    /// # Errors
    ///
    /// Returns an error if required attributes are missing or malformed.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        if !element.is(SAMLP_NS, "AuthnRequest") {
            return Err(SamlError::InvalidMessage(format!(
                "expected samlp:AuthnRequest, found {}",
                element.qualified_name()
            )));
        }
        let issue_instant = instant_attr(element, "IssueInstant")?
            .ok_or_else(|| SamlError::MissingElement("AuthnRequest/@IssueInstant".to_string()))?;

        let audiences = element
            .child(SAML_NS, "Conditions")
            .map(|c| {
                c.children_named(SAML_NS, "AudienceRestriction")
                    .flat_map(|r| r.children_named(SAML_NS, "Audience"))
                    .map(|a| a.text().trim().to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: required_attr(element, "ID")?.to_string(),
            issue_instant,
            issuer: element.child_text(SAML_NS, "Issuer").unwrap_or_default(),
            destination: element.attr("Destination").map(str::to_string),
            assertion_consumer_service_url: element
                .attr("AssertionConsumerServiceURL")
                .map(str::to_string),
            assertion_consumer_service_index: u32_attr(element, "AssertionConsumerServiceIndex")?,
            attribute_consuming_service_index: u32_attr(element, "AttributeConsumingServiceIndex")?,
            protocol_binding: element.attr("ProtocolBinding").map(str::to_string),
            provider_name: element.attr("ProviderName").map(str::to_string),
            force_authn: bool_attr(element, "ForceAuthn")?.unwrap_or(false),
            is_passive: bool_attr(element, "IsPassive")?.unwrap_or(false),
            subject: element
                .child(SAML_NS, "Subject")
                .and_then(|s| s.child(SAML_NS, "NameID"))
                .map(NameId::from_element)
                .transpose()?,
            name_id_policy: element
                .child(SAMLP_NS, "NameIDPolicy")
                .map(NameIdPolicy::from_element)
                .transpose()?,
            audiences,
            requested_authn_context: element
                .child(SAMLP_NS, "RequestedAuthnContext")
                .map(RequestedAuthnContext::from_element)
                .transpose()?,
            scoping: element
                .child(SAMLP_NS, "Scoping")
                .map(Scoping::from_element)
                .transpose()?,
        })
    }
}

/// Requested authentication context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAuthnContext {
    /// Acceptable authentication context class references.
    #[serde(default)]
    pub authn_context_class_refs: Vec<String>,

    /// Comparison method, omitted from the wire when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<AuthnContextComparison>,
}

impl RequestedAuthnContext {
    /// Creates a context from class references.
    #[must_use]
    pub fn new(class_refs: Vec<String>) -> Self {
        Self {
            authn_context_class_refs: class_refs,
            comparison: None,
        }
    }

    /// Sets the comparison method.
    #[must_use]
    pub const fn with_comparison(mut self, comparison: AuthnContextComparison) -> Self {
        self.comparison = Some(comparison);
        self
    }

    fn to_element(&self) -> Element {
        Element::new(SAMLP_NS, "samlp:RequestedAuthnContext")
            .with_opt_attr("Comparison", self.comparison.map(|c| c.as_str()))
            .with_children(self.authn_context_class_refs.iter().map(|r| {
                Element::new(SAML_NS, "saml:AuthnContextClassRef").with_text(r.clone())
            }))
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            authn_context_class_refs: element
                .children_named(SAML_NS, "AuthnContextClassRef")
                .map(|c| c.text().trim().to_string())
                .collect(),
            comparison: element.attr("Comparison").map(str::parse).transpose()?,
        })
    }
}

/// Authentication context comparison methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthnContextComparison {
    /// Exact match required.
    #[default]
    Exact,
    /// Match must be at least as strong.
    Minimum,
    /// Match must be at most as strong.
    Maximum,
    /// Match must be stronger than any listed context.
    Better,
}

impl AuthnContextComparison {
    /// Returns the string value for this comparison.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Better => "better",
        }
    }
}

impl FromStr for AuthnContextComparison {
    type Err = SamlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "minimum" => Ok(Self::Minimum),
            "maximum" => Ok(Self::Maximum),
            "better" => Ok(Self::Better),
            other => Err(SamlError::InvalidConfig(format!(
                "invalid AuthnContextComparison '{other}'"
            ))),
        }
    }
}

/// `<samlp:Scoping>`: proxy count, IdP list and requester chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoping {
    /// Maximum number of proxying steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_count: Option<u32>,

    /// Entity IDs of acceptable identity providers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub idp_list: Vec<String>,

    /// Requesters on whose behalf the request is made.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requester_ids: Vec<String>,
}

impl Scoping {
    /// Returns true if nothing would be serialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxy_count.is_none() && self.idp_list.is_empty() && self.requester_ids.is_empty()
    }

    fn to_element(&self) -> Element {
        let mut el = Element::new(SAMLP_NS, "samlp:Scoping")
            .with_opt_attr("ProxyCount", self.proxy_count.map(|c| c.to_string()));
        if !self.idp_list.is_empty() {
            el.push(Element::new(SAMLP_NS, "samlp:IDPList").with_children(
                self.idp_list
                    .iter()
                    .map(|p| Element::new(SAMLP_NS, "samlp:IDPEntry").with_attr("ProviderID", p.clone())),
            ));
        }
        el.with_children(
            self.requester_ids
                .iter()
                .map(|r| Element::new(SAMLP_NS, "samlp:RequesterID").with_text(r.clone())),
        )
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let idp_list = element
            .child(SAMLP_NS, "IDPList")
            .map(|list| {
                list.children_named(SAMLP_NS, "IDPEntry")
                    .map(|e| required_attr(e, "ProviderID").map(str::to_string))
                    .collect::<SamlResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            proxy_count: u32_attr(element, "ProxyCount")?,
            idp_list,
            requester_ids: element
                .children_named(SAMLP_NS, "RequesterID")
                .map(|r| r.text().trim().to_string())
                .collect(),
        })
    }
}
