//! SAML error types.
//!
//! [`SamlError`] covers configuration, key resolution, protocol integrity and
//! wire-format failures. Errors received from a peer as a `<samlp:Status>`
//! become [`StatusError`]s through a fixed table so they can be matched by
//! kind and sent back out unchanged.

use std::fmt;

use fed_crypto::CryptoError;
use thiserror::Error;

use crate::types::{status_codes, sub_status_codes, Status};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// A required configuration option is absent.
    #[error("missing required option '{key}' in metadata for '{entity}'")]
    ConfigMissing {
        /// Entity whose configuration was queried.
        entity: String,
        /// Option name.
        key: String,
    },

    /// A configuration option has the wrong type or an invalid value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configured feature variant is not supported.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Required key material is not configured.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Key material is configured but could not be read.
    #[error("unable to load key from '{location}': {reason}")]
    KeyLoadFailed {
        /// Configured location.
        location: String,
        /// Underlying failure.
        reason: String,
    },

    /// The claimed sender publishes no signing certificate.
    #[error("missing certificate in metadata for '{0}'")]
    NoSigningKey(String),

    /// The recipient publishes no usable encryption key.
    #[error("no supported encryption key in '{0}'")]
    NoEncryptionKey(String),

    /// A present signature did not verify.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// Signature validation was required but no valid signature was found.
    #[error("validation of received messages enabled, but no signature found on message")]
    MissingSignature,

    /// Neither the assertion nor the enclosing response was signed.
    #[error("neither the assertion nor the response was signed")]
    NeitherSigned,

    /// A plaintext assertion arrived while encryption is required.
    #[error("received unencrypted assertion, but encryption was enabled")]
    UnencryptedAssertion,

    /// Every decryption candidate failed for an assertion.
    #[error("error decrypting assertion: {0}")]
    DecryptAssertion(#[source] Box<SamlError>),

    /// Every decryption candidate failed for the encrypted attributes.
    #[error("could not decrypt attributes: {0}")]
    DecryptAttributes(#[source] Box<SamlError>),

    /// A single decryption attempt failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The message uses an algorithm the configuration forbids.
    #[error("algorithm '{0}' is blacklisted")]
    BlacklistedAlgorithm(String),

    /// Message destination does not match the receiving endpoint.
    #[error("destination in response doesn't match the current URL: destination is '{actual}', current URL is '{expected}'")]
    InvalidDestination {
        /// The current URL.
        expected: String,
        /// The destination in the message.
        actual: String,
    },

    /// The recipient is not among the assertion's audiences.
    #[error("this SP [{entity_id}] is not a valid audience for the assertion; candidates were: {candidates}")]
    InvalidAudience {
        /// The recipient's entity ID.
        entity_id: String,
        /// Audiences formatted as `[a], [b]`.
        candidates: String,
    },

    /// NotBefore lies in the future beyond the allowed skew.
    #[error("received an assertion that is valid in the future; check clock synchronization on IdP and SP")]
    AssertionNotYetValid,

    /// NotOnOrAfter lies in the past beyond the allowed skew.
    #[error("received an assertion that has expired; check clock synchronization on IdP and SP")]
    AssertionExpired,

    /// SessionNotOnOrAfter lies in the past beyond the allowed skew.
    #[error("received an assertion with a session that has expired; check clock synchronization on IdP and SP")]
    SessionExpired,

    /// No subject confirmation could be satisfied.
    #[error("Error validating SubjectConfirmation in Assertion: {0}")]
    SubjectConfirmation(String),

    /// The response carries no assertions.
    #[error("no assertions found in response from IdP")]
    NoAssertions,

    /// The peer reported an error status.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Structurally invalid message content.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Unknown or unsupported binding.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl SamlError {
    /// Returns the SAML top-level status code for this error.
    #[must_use]
    pub fn status_code(&self) -> &str {
        match self {
            Self::Status(e) => &e.top_code,
            Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::InvalidMessage(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::SignatureInvalid(_)
            | Self::MissingSignature
            | Self::InvalidDestination { .. }
            | Self::UnsupportedBinding(_) => status_codes::REQUESTER,
            _ => status_codes::RESPONDER,
        }
    }

    /// Returns a second-level status code if applicable.
    #[must_use]
    pub fn sub_status_code(&self) -> Option<&str> {
        match self {
            Self::Status(e) => e.sub_code.as_deref(),
            Self::SignatureInvalid(_) | Self::MissingSignature => {
                Some(sub_status_codes::REQUEST_DENIED)
            }
            Self::UnsupportedBinding(_) => Some(sub_status_codes::UNSUPPORTED_BINDING),
            _ => None,
        }
    }

    /// Converts the error into a `<samlp:Status>` for sending to the peer.
    #[must_use]
    pub fn to_status(&self) -> Status {
        match self {
            Self::Status(e) => e.to_status(),
            other => Status::new(
                other.status_code(),
                other.sub_status_code(),
                Some(other.to_string()),
            ),
        }
    }

    /// Converts a received non-success status into a typed error.
    #[must_use]
    pub fn from_status(status: &Status) -> Self {
        Self::Status(StatusError::from_status(status))
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::escape::EscapeError> for SamlError {
    fn from(err: quick_xml::escape::EscapeError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

// ============================================================================
// Status errors
// ============================================================================

/// Classification of a peer-reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusErrorKind {
    /// `Responder/NoPassive`: passive authentication was not possible.
    NoPassive,
    /// `Responder/NoAvailableIDP`.
    NoAvailableIdp,
    /// `Responder/NoSupportedIDP`.
    NoSupportedIdp,
    /// `Responder/ProxyCountExceeded`.
    ProxyCountExceeded,
    /// `Responder/AuthnFailed`.
    AuthnFailed,
    /// `Responder/NoAuthnContext`.
    NoAuthnContext,
    /// `Requester/UnknownPrincipal`.
    UnknownPrincipal,
    /// `Requester/RequestDenied`.
    RequestDenied,
    /// Any other combination.
    Generic,
}

/// Top code, sub code and kind; the table is consulted in both directions.
const STATUS_TABLE: &[(&str, &str, StatusErrorKind)] = &[
    (status_codes::RESPONDER, sub_status_codes::NO_PASSIVE, StatusErrorKind::NoPassive),
    (status_codes::RESPONDER, sub_status_codes::NO_AVAILABLE_IDP, StatusErrorKind::NoAvailableIdp),
    (status_codes::RESPONDER, sub_status_codes::NO_SUPPORTED_IDP, StatusErrorKind::NoSupportedIdp),
    (status_codes::RESPONDER, sub_status_codes::PROXY_COUNT_EXCEEDED, StatusErrorKind::ProxyCountExceeded),
    (status_codes::RESPONDER, sub_status_codes::AUTHN_FAILED, StatusErrorKind::AuthnFailed),
    (status_codes::RESPONDER, sub_status_codes::NO_AUTHN_CONTEXT, StatusErrorKind::NoAuthnContext),
    (status_codes::REQUESTER, sub_status_codes::UNKNOWN_PRINCIPAL, StatusErrorKind::UnknownPrincipal),
    (status_codes::REQUESTER, sub_status_codes::REQUEST_DENIED, StatusErrorKind::RequestDenied),
];

/// An error status received from (or destined for) a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    kind: StatusErrorKind,
    top_code: String,
    sub_code: Option<String>,
    message: Option<String>,
}

impl StatusError {
    /// Creates an error of a mapped kind; `Generic` yields a bare `Responder`.
    #[must_use]
    pub fn new(kind: StatusErrorKind, message: Option<String>) -> Self {
        let (top, sub) = STATUS_TABLE
            .iter()
            .find(|(_, _, k)| *k == kind)
            .map_or((status_codes::RESPONDER, None), |(top, sub, _)| (*top, Some(*sub)));
        Self {
            kind,
            top_code: top.to_string(),
            sub_code: sub.map(str::to_string),
            message,
        }
    }

    /// Shortcut for a `Responder/NoPassive` error.
    #[must_use]
    pub fn no_passive(message: impl Into<String>) -> Self {
        Self::new(StatusErrorKind::NoPassive, Some(message.into()))
    }

    /// Translates a status into a typed error using the status table.
    #[must_use]
    pub fn from_status(status: &Status) -> Self {
        let top = status.top_code();
        let sub = status.sub_code();
        let kind = STATUS_TABLE
            .iter()
            .find(|(t, s, _)| *t == top && Some(*s) == sub)
            .map_or(StatusErrorKind::Generic, |(_, _, k)| *k);
        Self {
            kind,
            top_code: top.to_string(),
            sub_code: sub.map(str::to_string),
            message: status.status_message.clone(),
        }
    }

    /// Converts back into a status with the same code pairing.
    #[must_use]
    pub fn to_status(&self) -> Status {
        Status::new(&self.top_code, self.sub_code.as_deref(), self.message.clone())
    }

    /// Returns the classification.
    #[must_use]
    pub fn kind(&self) -> StatusErrorKind {
        self.kind
    }

    /// Returns the top-level status code.
    #[must_use]
    pub fn top_code(&self) -> &str {
        &self.top_code
    }

    /// Returns the second-level status code.
    #[must_use]
    pub fn sub_code(&self) -> Option<&str> {
        self.sub_code.as_deref()
    }

    /// Returns the status message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_code(&self.top_code))?;
        if let Some(sub) = &self.sub_code {
            write!(f, "/{}", short_code(sub))?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for StatusError {}

fn short_code(code: &str) -> &str {
    code.strip_prefix("urn:oasis:names:tc:SAML:2.0:status:")
        .unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_passive_status_maps_to_kind_and_back() {
        let status = Status::new(
            status_codes::RESPONDER,
            Some(sub_status_codes::NO_PASSIVE),
            Some("user interaction required".to_string()),
        );

        let err = SamlError::from_status(&status);
        let SamlError::Status(status_err) = &err else {
            panic!("expected a status error, got {err:?}");
        };
        assert_eq!(status_err.kind(), StatusErrorKind::NoPassive);
        assert_eq!(err.to_status(), status);
    }

    #[test]
    fn every_table_entry_roundtrips() {
        for (top, sub, kind) in STATUS_TABLE {
            let built = StatusError::new(*kind, None);
            let status = built.to_status();
            assert_eq!(status.top_code(), *top);
            assert_eq!(status.sub_code(), Some(*sub));
            assert_eq!(StatusError::from_status(&status), built);
        }
    }

    #[test]
    fn unmapped_pair_is_generic_and_preserved() {
        let status = Status::new(
            status_codes::REQUESTER,
            Some(sub_status_codes::INVALID_NAMEID_POLICY),
            None,
        );
        let err = StatusError::from_status(&status);
        assert_eq!(err.kind(), StatusErrorKind::Generic);
        assert_eq!(err.to_status(), status);
        assert_eq!(err.to_string(), "Requester/InvalidNameIDPolicy");
    }

    #[test]
    fn local_errors_become_responder_status() {
        let status = SamlError::NoAssertions.to_status();
        assert_eq!(status.top_code(), status_codes::RESPONDER);
        assert_eq!(status.sub_code(), None);
        assert!(status.status_message.unwrap().contains("no assertions"));

        let status = SamlError::MissingSignature.to_status();
        assert_eq!(status.top_code(), status_codes::REQUESTER);
        assert_eq!(status.sub_code(), Some(sub_status_codes::REQUEST_DENIED));
    }

    #[test]
    fn decryption_wrapper_keeps_cause() {
        let err = SamlError::DecryptAssertion(Box::new(SamlError::Decryption("bad tag".into())));
        assert_eq!(err.to_string(), "error decrypting assertion: decryption failed: bad tag");
        assert!(std::error::Error::source(&err).is_some());
    }
}
