//! Building outgoing AuthnRequest, LogoutRequest and LogoutResponse
//! messages.
//!
//! Each builder resolves its fields from the two entities' metadata and the
//! caller's [`ProcessingState`], picks the destination endpoint and decides
//! on signing. The result is an [`OutgoingMessage`] that is encoded for its
//! binding only when it is sent.

use serde::Deserialize;
use tracing::{debug, info};

use crate::bindings::{HttpPostBinding, HttpRedirectBinding, SamlMessageType};
use crate::clock::Clock;
use crate::config::{ConfigValue, EntityConfig, MetadataView, Side};
use crate::encryption::Encryptor;
use crate::error::{SamlError, SamlResult};
use crate::keys::KeyResolver;
use crate::signing::{MessageKind, MessageSigner, SigningKey};
use crate::state::ProcessingState;
use crate::types::{
    AuthnContextComparison, AuthnRequest, LogoutRequest, LogoutResponse, NameIdFormat,
    NameIdPolicy, RequestedAuthnContext, SamlBinding, Scoping, Status,
};
use crate::xml::{Element, NsScope};

/// Protocol bindings an SP may ask the IdP to answer on.
const PROTOCOL_BINDINGS: [SamlBinding; 4] = [
    SamlBinding::HttpPost,
    SamlBinding::HolderOfKeySso,
    SamlBinding::HttpArtifact,
    SamlBinding::HttpRedirect,
];

/// Single sign-on endpoint preference.
const SSO_BINDINGS: [SamlBinding; 3] = [
    SamlBinding::HttpArtifact,
    SamlBinding::HttpRedirect,
    SamlBinding::HttpPost,
];

/// Single logout endpoint preference.
const SLO_BINDINGS: [SamlBinding; 2] = [SamlBinding::HttpRedirect, SamlBinding::HttpPost];

/// A message ready to be sent.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Message ID.
    pub id: String,
    /// The unsigned protocol element.
    pub element: Element,
    /// Request or response.
    pub message_type: SamlMessageType,
    /// Endpoint URL.
    pub destination: String,
    /// Binding of the destination endpoint.
    pub binding: SamlBinding,
    /// RelayState to send along.
    pub relay_state: Option<String>,
    /// Key to sign with, if the message is signed.
    pub signing_key: Option<SigningKey>,
}

/// An encoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedMessage {
    /// URL to redirect the user agent to.
    Redirect(String),
    /// Auto-submitting HTML form.
    Post(String),
}

impl OutgoingMessage {
    /// Returns true if the message will be signed.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Returns the element with an enveloped signature when a signing key
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if signing fails.
    pub fn signed_element(&self) -> SamlResult<Element> {
        let mut element = self.element.clone();
        if let Some(key) = &self.signing_key {
            key.signer().sign_element(&mut element, &NsScope::new())?;
        }
        Ok(element)
    }

    /// Encodes the message for its binding.
    ///
    /// HTTP-Redirect carries a detached signature over the query; HTTP-POST
    /// and Holder-of-Key SSO carry an enveloped signature.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnsupportedBinding`] for Artifact and SOAP, or a
    /// signing or compression error.
    pub fn encode(&self) -> SamlResult<EncodedMessage> {
        match self.binding {
            SamlBinding::HttpRedirect => {
                let signer = self.signing_key.as_ref().map(SigningKey::signer);
                HttpRedirectBinding::encode(
                    &self.element.to_xml(),
                    &self.destination,
                    self.relay_state.as_deref(),
                    self.message_type,
                    signer.as_ref(),
                )
                .map(EncodedMessage::Redirect)
            }
            SamlBinding::HttpPost | SamlBinding::HolderOfKeySso => {
                let xml = self.signed_element()?.to_document();
                Ok(EncodedMessage::Post(HttpPostBinding::encode(
                    &xml,
                    &self.destination,
                    self.relay_state.as_deref(),
                    self.message_type,
                )))
            }
            other => Err(SamlError::UnsupportedBinding(other.uri().to_string())),
        }
    }
}

/// `NameIDPolicy` as written in metadata.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NameIdPolicyOption {
    #[serde(rename = "Format")]
    format: Option<String>,
    #[serde(rename = "AllowCreate")]
    allow_create: Option<bool>,
    #[serde(rename = "SPNameQualifier")]
    sp_name_qualifier: Option<String>,
}

/// Builds outgoing protocol messages.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    keys: &'a KeyResolver,
    clock: &'a dyn Clock,
}

impl<'a> RequestBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(keys: &'a KeyResolver, clock: &'a dyn Clock) -> Self {
        Self { keys, clock }
    }

    /// Builds an AuthnRequest from `sp` to `idp`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed options or when the IdP
    /// publishes no usable SSO endpoint, or a key error when signing is
    /// enabled without a key.
    pub fn build_authn_request(
        &self,
        sp: &EntityConfig,
        idp: &EntityConfig,
        state: &ProcessingState,
    ) -> SamlResult<OutgoingMessage> {
        let mut request = AuthnRequest::new(sp.entity_id(), self.clock.now());

        request.name_id_policy = match &state.name_id_policy {
            Some(policy) => Some(policy.clone()),
            None => name_id_policy(sp, idp)?,
        };
        request.force_authn = match state.force_authn {
            Some(force) => force,
            None => sp.get_optional_bool("ForceAuthn", Some(false))?.unwrap_or(false),
        };
        request.is_passive = match state.is_passive {
            Some(passive) => passive,
            None => sp.get_optional_bool("IsPassive", Some(false))?.unwrap_or(false),
        };

        let protocol_binding = protocol_binding(sp)?;
        request.protocol_binding = Some(protocol_binding.uri().to_string());
        request.assertion_consumer_service_index = index_option(sp, "AssertionConsumerServiceIndex")?;
        request.attribute_consuming_service_index = index_option(sp, "AttributeConsumingServiceIndex")?;
        request.provider_name = sp.get_optional_string("ProviderName", None)?;
        request.assertion_consumer_service_url = match &state.assertion_consumer_service_url {
            Some(url) => Some(url.clone()),
            None if request.assertion_consumer_service_index.is_some() => None,
            None => sp
                .default_endpoint("AssertionConsumerService", &[protocol_binding])?
                .map(|endpoint| endpoint.location),
        };

        request.requested_authn_context = requested_authn_context(sp, idp, state)?;
        request.audiences = match &state.audiences {
            Some(audiences) => audiences.clone(),
            None => sp.get_optional_string_list("saml:Audience")?.unwrap_or_default(),
        };
        request.scoping = scoping(sp, idp, state)?;
        request.subject = state.name_id.clone();

        let endpoint = if protocol_binding == SamlBinding::HolderOfKeySso {
            idp.default_endpoint("SingleSignOnService", &[SamlBinding::HolderOfKeySso])?
        } else {
            idp.endpoint_prioritized_by_binding("SingleSignOnService", &SSO_BINDINGS)?
        };
        let endpoint = endpoint.ok_or_else(|| SamlError::ConfigMissing {
            entity: idp.entity_id().to_string(),
            key: "SingleSignOnService".to_string(),
        })?;
        let binding = endpoint.parsed_binding().ok_or_else(|| {
            SamlError::UnsupportedBinding(endpoint.binding.clone())
        })?;
        request.destination = Some(endpoint.location.clone());

        let signing_key = MessageSigner::new(self.keys).add_redirect_sign(sp, idp, MessageKind::AuthnRequest)?;
        debug!(
            entity_id = idp.entity_id(),
            destination = %endpoint.location,
            signed = signing_key.is_some(),
            "built AuthnRequest"
        );

        Ok(OutgoingMessage {
            id: request.id.clone(),
            element: request.to_element(),
            message_type: SamlMessageType::Request,
            destination: endpoint.location,
            binding,
            relay_state: state.relay_state.clone(),
            signing_key,
        })
    }

    /// Builds a LogoutRequest from `source` to `destination`.
    ///
    /// Returns `None` when the destination publishes no single logout
    /// endpoint. The NameID is encrypted when `nameid.encryption` is set on
    /// the destination, else the source.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] without a NameID in `state`, or
    /// an encryption or key error.
    pub fn build_logout_request(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        state: &ProcessingState,
    ) -> SamlResult<Option<OutgoingMessage>> {
        let Some(endpoint) = destination.endpoint_prioritized_by_binding("SingleLogoutService", &SLO_BINDINGS)? else {
            info!(entity_id = destination.entity_id(), "no logout endpoint published, not sending LogoutRequest");
            return Ok(None);
        };
        let binding = endpoint
            .parsed_binding()
            .ok_or_else(|| SamlError::UnsupportedBinding(endpoint.binding.clone()))?;

        let name_id = state
            .logout_name_id
            .clone()
            .ok_or_else(|| SamlError::MissingElement("NameID of the session to log out".to_string()))?;

        let mut request = LogoutRequest::new(source.entity_id(), self.clock.now());
        request.destination = Some(endpoint.location.clone());
        request.session_indexes = state.session_indexes.clone();

        let encrypt = MetadataView::new(source, destination).first_bool(
            &[(Side::Destination, "nameid.encryption"), (Side::Source, "nameid.encryption")],
            false,
        )?;
        if encrypt {
            request.encrypted_id = Some(Encryptor::new(self.keys).encrypt_identifier(&name_id, destination)?);
        } else {
            request.name_id = Some(name_id);
        }

        let signing_key = MessageSigner::new(self.keys).add_redirect_sign(source, destination, MessageKind::Logout)?;
        Ok(Some(OutgoingMessage {
            id: request.id.clone(),
            element: request.to_element(),
            message_type: SamlMessageType::Request,
            destination: endpoint.location,
            binding,
            relay_state: state.relay_state.clone(),
            signing_key,
        }))
    }

    /// Builds a LogoutResponse from `source` to `destination`.
    ///
    /// The endpoint's `ResponseLocation` is preferred over its `Location`.
    /// Returns `None` when the destination publishes no single logout
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration or key error.
    pub fn build_logout_response(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        state: &ProcessingState,
        status: Status,
    ) -> SamlResult<Option<OutgoingMessage>> {
        let Some(endpoint) = destination.endpoint_prioritized_by_binding("SingleLogoutService", &SLO_BINDINGS)? else {
            info!(entity_id = destination.entity_id(), "no logout endpoint published, not sending LogoutResponse");
            return Ok(None);
        };
        let binding = endpoint
            .parsed_binding()
            .ok_or_else(|| SamlError::UnsupportedBinding(endpoint.binding.clone()))?;
        let location = endpoint.response_url().to_string();

        let mut response = LogoutResponse::new(source.entity_id(), self.clock.now(), status);
        response.destination = Some(location.clone());
        response.in_response_to = state.in_response_to.clone();

        let signing_key = MessageSigner::new(self.keys).add_redirect_sign(source, destination, MessageKind::Logout)?;
        Ok(Some(OutgoingMessage {
            id: response.id.clone(),
            element: response.to_element(),
            message_type: SamlMessageType::Response,
            destination: location,
            binding,
            relay_state: state.relay_state.clone(),
            signing_key,
        }))
    }
}

/// `NameIDPolicy` from the IdP, else the SP.
///
/// Unset means transient with `AllowCreate`; an empty string, list or map
/// suppresses the element.
fn name_id_policy(sp: &EntityConfig, idp: &EntityConfig) -> SamlResult<Option<NameIdPolicy>> {
    let view = MetadataView::new(sp, idp);
    let Some((value, key)) = view.resolve(&[
        (Side::Destination, "NameIDPolicy"),
        (Side::Source, "NameIDPolicy"),
    ]) else {
        return Ok(Some(NameIdPolicy::with_format(NameIdFormat::Transient.uri()).allow_create(true)));
    };
    if value.is_empty() {
        return Ok(None);
    }
    match value {
        ConfigValue::String(format) => Ok(Some(NameIdPolicy::with_format(format.clone()).allow_create(true))),
        ConfigValue::Map(_) => {
            let option: NameIdPolicyOption = value.parse(key)?;
            Ok(Some(NameIdPolicy {
                format: Some(option.format.unwrap_or_else(|| NameIdFormat::Transient.uri().to_string())),
                sp_name_qualifier: option.sp_name_qualifier,
                allow_create: Some(option.allow_create.unwrap_or(true)),
            }))
        }
        other => Err(SamlError::InvalidConfig(format!(
            "'{key}' must be a string or a map, found {}",
            other.type_name()
        ))),
    }
}

fn protocol_binding(sp: &EntityConfig) -> SamlResult<SamlBinding> {
    let Some(uri) = sp.get_optional_string("ProtocolBinding", None)? else {
        return Ok(SamlBinding::HttpPost);
    };
    SamlBinding::from_uri(&uri)
        .filter(|binding| PROTOCOL_BINDINGS.contains(binding))
        .ok_or_else(|| SamlError::InvalidConfig(format!("unsupported ProtocolBinding '{uri}'")))
}

fn index_option(config: &EntityConfig, key: &str) -> SamlResult<Option<u32>> {
    config
        .get_optional_integer(key, None)?
        .map(|index| {
            u32::try_from(index).map_err(|_| SamlError::InvalidConfig(format!("'{key}' must be a non-negative integer")))
        })
        .transpose()
}

fn comparison(value: Option<String>) -> SamlResult<Option<AuthnContextComparison>> {
    value.map(|v| v.parse()).transpose()
}

/// RequestedAuthnContext: SP metadata, replaced by IdP metadata, else the
/// caller's state, else the proxied request when
/// `proxymode.passRequestedAuthnContext` is set.
fn requested_authn_context(
    sp: &EntityConfig,
    idp: &EntityConfig,
    state: &ProcessingState,
) -> SamlResult<Option<RequestedAuthnContext>> {
    if let Some(refs) = idp.get_optional_string_list("AuthnContextClassRef")? {
        let comparison = comparison(idp.get_optional_string("AuthnContextComparison", None)?)?;
        return Ok(Some(RequestedAuthnContext {
            authn_context_class_refs: refs,
            comparison: Some(comparison.unwrap_or_default()),
        }));
    }
    if let Some(refs) = &state.authn_context_class_ref {
        let comparison = comparison(state.authn_context_comparison.clone())?;
        return Ok(Some(RequestedAuthnContext {
            authn_context_class_refs: refs.clone(),
            comparison: Some(comparison.unwrap_or_default()),
        }));
    }
    if sp.get_optional_bool("proxymode.passRequestedAuthnContext", Some(false))? == Some(true) {
        if let Some(proxied) = &state.proxied_authn_context {
            return Ok(Some(proxied.clone()));
        }
    }
    match sp.get_optional_string_list("AuthnContextClassRef")? {
        Some(refs) => Ok(Some(RequestedAuthnContext {
            authn_context_class_refs: refs,
            comparison: comparison(sp.get_optional_string("AuthnContextComparison", None)?)?,
        })),
        None => Ok(None),
    }
}

/// Scoping unless `disable_scoping` is set on either side.
fn scoping(sp: &EntityConfig, idp: &EntityConfig, state: &ProcessingState) -> SamlResult<Option<Scoping>> {
    let disabled = sp.get_optional_bool("disable_scoping", Some(false))? == Some(true)
        || idp.get_optional_bool("disable_scoping", Some(false))? == Some(true);
    if disabled {
        debug!(entity_id = idp.entity_id(), "scoping disabled");
        return Ok(None);
    }

    let mut idp_list: Vec<String> = Vec::new();
    let sources = [
        sp.get_optional_string_list("IDPList")?.unwrap_or_default(),
        idp.get_optional_string_list("IDPList")?.unwrap_or_default(),
        state.idp_list.clone(),
    ];
    for entity_id in sources.into_iter().flatten() {
        if !idp_list.contains(&entity_id) {
            idp_list.push(entity_id);
        }
    }

    let proxy_count = match state.proxy_count {
        Some(count) => Some(count),
        None => match index_option(idp, "ProxyCount")? {
            Some(count) => Some(count),
            None => index_option(sp, "ProxyCount")?,
        },
    };

    let mut requester_ids = sp.get_optional_string_list("RequesterID")?.unwrap_or_default();
    requester_ids.extend(state.requester_ids.iter().cloned());
    requester_ids.extend(state.requesting_sp.iter().cloned());

    let scoping = Scoping {
        proxy_count,
        idp_list,
        requester_ids,
    };
    Ok((!scoping.is_empty()).then_some(scoping))
}
