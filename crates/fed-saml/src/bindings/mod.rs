//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded
//!
//! Decoding yields a [`ReceivedMessage`] holding the parsed root element and,
//! for signed redirects, the detached signature together with the query
//! octets it covers.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fed_saml::bindings::{HttpPostBinding, HttpRedirectBinding, SamlMessageType};
//!
//! let html = HttpPostBinding::encode(&xml, "https://idp.example.com/sso", Some("rs"), SamlMessageType::Request);
//! let url = HttpRedirectBinding::encode(&xml, "https://idp.example.com/sso", Some("rs"), SamlMessageType::Request, None)?;
//! let received = HttpRedirectBinding::decode_url(&url)?;
//! ```

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use crate::error::SamlResult;
use crate::types::{SamlBinding, SAMLP_NS};
use crate::xml::{parse, Element};

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// Request message (AuthnRequest, LogoutRequest).
    Request,
    /// Response message (Response, LogoutResponse).
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// HTTP-Redirect signature parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    /// The query octets covered by the signature, as received.
    pub signed_query: String,
    /// The `SigAlg` parameter.
    pub sig_alg: String,
    /// The base64 `Signature` parameter.
    pub signature: String,
}

/// A decoded protocol message.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// The decoded XML.
    pub xml: String,
    /// The parsed root element.
    pub root: Element,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The binding the message arrived on.
    pub binding: SamlBinding,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// Detached signature (redirect binding only).
    pub detached_signature: Option<DetachedSignature>,
}

impl ReceivedMessage {
    pub(crate) fn new(
        xml: String,
        message_type: SamlMessageType,
        binding: SamlBinding,
        relay_state: Option<String>,
    ) -> SamlResult<Self> {
        let root = parse(&xml)?;
        Ok(Self {
            xml,
            root,
            message_type,
            binding,
            relay_state,
            detached_signature: None,
        })
    }

    /// Returns the local name of the protocol element, e.g. `LogoutRequest`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.root.local
    }

    /// Returns true for `samlp:LogoutRequest` and `samlp:LogoutResponse`.
    #[must_use]
    pub fn is_logout(&self) -> bool {
        self.root.is(SAMLP_NS, "LogoutRequest") || self.root.is(SAMLP_NS, "LogoutResponse")
    }

    /// Returns true for `samlp:AuthnRequest`.
    #[must_use]
    pub fn is_authn_request(&self) -> bool {
        self.root.is(SAMLP_NS, "AuthnRequest")
    }
}
