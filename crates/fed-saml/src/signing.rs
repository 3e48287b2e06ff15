//! Choosing signing keys and verifying received signatures.
//!
//! [`MessageSigner`] decides which key and algorithm sign a message and
//! whether a redirect-bound message is signed at all. [`MessageVerifier`]
//! checks embedded or detached signatures against every signing
//! certificate a peer publishes.

use fed_crypto::{PKey, Private, SignatureAlgorithm};
use tracing::debug;

use crate::bindings::{DetachedSignature, ReceivedMessage};
use crate::candidates::{try_each, Outcome};
use crate::config::{EntityConfig, KeyUsage, MetadataView, Side};
use crate::error::{SamlError, SamlResult};
use crate::keys::KeyResolver;
use crate::signature::{find_signature, XmlSignatureValidator, XmlSigner};
use crate::xml::{Element, NsScope};

/// Key, certificate and algorithm to sign with.
#[derive(Debug, Clone)]
pub struct SigningKey {
    /// Private key.
    pub key: PKey<Private>,
    /// Base64 DER certificate to attach, when one is configured.
    pub certificate: Option<String>,
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
}

impl SigningKey {
    /// Returns an [`XmlSigner`] for this key.
    #[must_use]
    pub fn signer(&self) -> XmlSigner {
        let signer = XmlSigner::new(self.key.clone(), self.algorithm);
        match &self.certificate {
            Some(cert) => signer.with_certificate(cert.clone()),
            None => signer,
        }
    }
}

/// Message families with their own redirect signing and validation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `AuthnRequest`.
    AuthnRequest,
    /// `LogoutRequest` and `LogoutResponse`.
    Logout,
}

impl MessageKind {
    /// Option enabling signatures on outgoing messages of this kind.
    #[must_use]
    pub const fn sign_flag(self) -> &'static str {
        match self {
            Self::AuthnRequest => "sign.authnrequest",
            Self::Logout => "sign.logout",
        }
    }

    /// Option requiring signatures on incoming messages of this kind.
    #[must_use]
    pub const fn validate_flag(self) -> &'static str {
        match self {
            Self::AuthnRequest => "validate.authnrequest",
            Self::Logout => "validate.logout",
        }
    }

    fn of(message: &ReceivedMessage) -> Option<Self> {
        if message.is_logout() {
            Some(Self::Logout)
        } else if message.is_authn_request() {
            Some(Self::AuthnRequest)
        } else {
            None
        }
    }
}

/// Chooses signing keys for outgoing messages.
#[derive(Debug, Clone, Copy)]
pub struct MessageSigner<'a> {
    keys: &'a KeyResolver,
}

impl<'a> MessageSigner<'a> {
    /// Creates a signer resolving keys through `keys`.
    #[must_use]
    pub const fn new(keys: &'a KeyResolver) -> Self {
        Self { keys }
    }

    /// Returns the key `source` signs messages to `destination` with.
    ///
    /// A `signature.privatekey` configured for the destination takes
    /// precedence over the source's own `privatekey`. The algorithm is
    /// `signature.algorithm` of the destination, else of the source, else
    /// RSA-SHA256.
    ///
    /// # Errors
    ///
    /// Returns a key resolution error if no private key can be loaded.
    pub fn add_sign(&self, source: &EntityConfig, destination: &EntityConfig) -> SamlResult<SigningKey> {
        let (owner, prefix) = if destination.has_value("signature.privatekey") {
            (destination, "signature.")
        } else {
            (source, "")
        };

        let material = self
            .keys
            .load_private_key(owner, true, prefix, false)?
            .ok_or_else(|| SamlError::KeyNotFound(format!("no private key for '{}'", owner.entity_id())))?;
        let certificate = self
            .keys
            .load_public_key(owner, false, prefix)?
            .and_then(|cert| cert.cert_data);

        let algorithm = MetadataView::new(source, destination)
            .first_string(&[
                (Side::Destination, "signature.algorithm"),
                (Side::Source, "signature.algorithm"),
            ])?
            .map(|uri| SignatureAlgorithm::from_uri(&uri))
            .transpose()?
            .unwrap_or_default();

        Ok(SigningKey {
            key: material.private_key()?,
            certificate,
            algorithm,
        })
    }

    /// Returns the signing key for a redirect-bound message of `kind`, or
    /// `None` when it goes unsigned.
    ///
    /// Signed when either `redirect.sign` (destination, then source) or the
    /// kind's flag (source, then destination) is on. Both default to off.
    ///
    /// # Errors
    ///
    /// Returns a configuration or key resolution error.
    pub fn add_redirect_sign(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        kind: MessageKind,
    ) -> SamlResult<Option<SigningKey>> {
        let view = MetadataView::new(source, destination);
        let enabled = view.first_bool(
            &[(Side::Destination, "redirect.sign"), (Side::Source, "redirect.sign")],
            false,
        )? || view.first_bool(
            &[(Side::Source, kind.sign_flag()), (Side::Destination, kind.sign_flag())],
            false,
        )?;
        if !enabled {
            return Ok(None);
        }
        self.add_sign(source, destination).map(Some)
    }
}

/// What a signature check looks at.
#[derive(Debug, Clone, Copy)]
pub enum SignedTarget<'m> {
    /// An element carrying an enveloped signature, with the namespaces in
    /// scope from its ancestors.
    Element(&'m Element, &'m NsScope),
    /// A detached HTTP-Redirect signature.
    Redirect(&'m DetachedSignature),
}

impl SignedTarget<'_> {
    fn is_signed(&self) -> bool {
        match self {
            Self::Element(element, _) => find_signature(element).is_some(),
            Self::Redirect(_) => true,
        }
    }
}

/// Verifies signatures on received messages.
#[derive(Debug, Clone, Copy)]
pub struct MessageVerifier<'a> {
    keys: &'a KeyResolver,
}

impl<'a> MessageVerifier<'a> {
    /// Creates a verifier resolving keys through `keys`.
    #[must_use]
    pub const fn new(keys: &'a KeyResolver) -> Self {
        Self { keys }
    }

    /// Checks the signature of `target` against the signing certificates
    /// published by `sender`.
    ///
    /// Returns `Ok(false)` when the target carries no signature.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoSigningKey`] when the sender publishes no
    /// signing certificate, or the last verification error when every
    /// certificate failed.
    pub fn check_sign(&self, sender: &EntityConfig, target: SignedTarget<'_>) -> SamlResult<bool> {
        let certificates: Vec<String> = self
            .keys
            .public_keys(sender, Some(KeyUsage::Signing), false, "")?
            .into_iter()
            .filter(|key| key.is_certificate())
            .map(|key| key.certificate_data)
            .collect();
        if certificates.is_empty() {
            return Err(SamlError::NoSigningKey(sender.entity_id().to_string()));
        }
        if !target.is_signed() {
            debug!(entity_id = sender.entity_id(), "message carries no signature");
            return Ok(false);
        }

        let outcome = try_each("signature", certificates, |data| {
            let validator = XmlSignatureValidator::from_certificate_data(&data)?;
            match target {
                SignedTarget::Element(element, scope) => validator.validate(element, scope).map(|_| Some(())),
                SignedTarget::Redirect(detached) => validator
                    .validate_redirect(&detached.signed_query, &detached.sig_alg, &detached.signature)
                    .map(Some),
            }
        });
        match outcome {
            Outcome::Success(()) => Ok(true),
            Outcome::Exhausted { last_error: Some(error) } => Err(error),
            Outcome::Exhausted { last_error: None } => Ok(false),
        }
    }

    /// Enforces the signature policy for a received request or logout
    /// message sent by `source` to `destination`.
    ///
    /// The kind's validate flag is read from the source, then the
    /// destination. When unset, a signed message is always checked;
    /// otherwise `redirect.validate` of the source, then the destination,
    /// decides (default off).
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingSignature`] when validation is enforced
    /// but no valid signature was found, or any [`check_sign`](Self::check_sign)
    /// error.
    pub fn validate_message(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        message: &ReceivedMessage,
    ) -> SamlResult<()> {
        let view = MetadataView::new(source, destination);
        let kind_flag = match MessageKind::of(message) {
            Some(kind) => view.optional_bool(&[
                (Side::Source, kind.validate_flag()),
                (Side::Destination, kind.validate_flag()),
            ])?,
            None => None,
        };

        let scope = NsScope::new();
        let target = match &message.detached_signature {
            Some(detached) => SignedTarget::Redirect(detached),
            None => SignedTarget::Element(&message.root, &scope),
        };

        let enabled = match kind_flag {
            Some(flag) => flag,
            None if target.is_signed() => true,
            None => view.first_bool(
                &[(Side::Source, "redirect.validate"), (Side::Destination, "redirect.validate")],
                false,
            )?,
        };
        if !enabled {
            return Ok(());
        }

        if self.check_sign(source, target)? {
            Ok(())
        } else {
            Err(SamlError::MissingSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{HttpPostBinding, HttpRedirectBinding, SamlMessageType};
    use crate::config::FederationConfig;
    use crate::types::{SAMLP_NS, SAML_NS};
    use fed_crypto::keys::{generate_self_signed, KeyPair};
    use std::sync::OnceLock;

    fn idp_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| generate_self_signed("signing-idp", 2048).unwrap())
    }

    fn other_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| generate_self_signed("signing-other", 2048).unwrap())
    }

    fn keys() -> KeyResolver {
        KeyResolver::new(&FederationConfig::default())
    }

    fn idp() -> EntityConfig {
        EntityConfig::new("https://idp.example.com")
            .with("privatekey", idp_pair().private_key_pem().unwrap())
            .with("certData", idp_pair().certificate_data().unwrap())
    }

    fn sp() -> EntityConfig {
        EntityConfig::new("https://sp.example.com")
    }

    fn logout_request(signing: Option<&SigningKey>) -> String {
        let mut element = Element::new(SAMLP_NS, "samlp:LogoutRequest")
            .declare("saml", SAML_NS)
            .with_attr("ID", "_lr1")
            .with_child(Element::new(SAML_NS, "saml:Issuer").with_text("https://idp.example.com"))
            .with_child(Element::new(SAML_NS, "saml:NameID").with_text("alice"));
        if let Some(key) = signing {
            key.signer().sign_element(&mut element, &NsScope::new()).unwrap();
        }
        element.to_document()
    }

    fn posted(xml: &str) -> ReceivedMessage {
        let html = HttpPostBinding::encode(xml, "https://sp", None, SamlMessageType::Request);
        let marker = "name=\"SAMLRequest\" value=\"";
        let start = html.find(marker).unwrap() + marker.len();
        let end = html[start..].find('"').unwrap();
        HttpPostBinding::decode(Some(&html[start..start + end]), None, None).unwrap()
    }

    #[test]
    fn add_sign_uses_source_key_and_default_algorithm() {
        let keys = keys();
        let key = MessageSigner::new(&keys).add_sign(&idp(), &sp()).unwrap();
        assert_eq!(key.algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(key.certificate, Some(idp_pair().certificate_data().unwrap()));
    }

    #[test]
    fn destination_signature_key_and_algorithm_win() {
        let keys = keys();
        let sp = sp()
            .with("signature.privatekey", other_pair().private_key_pem().unwrap())
            .with("signature.certData", other_pair().certificate_data().unwrap())
            .with("signature.algorithm", SignatureAlgorithm::RsaSha512.uri());
        let idp = idp().with("signature.algorithm", SignatureAlgorithm::RsaSha384.uri());

        let key = MessageSigner::new(&keys).add_sign(&idp, &sp).unwrap();
        assert_eq!(key.algorithm, SignatureAlgorithm::RsaSha512);
        assert_eq!(key.certificate, Some(other_pair().certificate_data().unwrap()));
    }

    #[test]
    fn redirect_sign_flag_precedence() {
        let keys = keys();
        let signer = MessageSigner::new(&keys);

        assert!(signer.add_redirect_sign(&idp(), &sp(), MessageKind::Logout).unwrap().is_none());

        let sp_redirect = sp().with("redirect.sign", true);
        assert!(signer.add_redirect_sign(&idp(), &sp_redirect, MessageKind::Logout).unwrap().is_some());

        let idp_off = idp().with("sign.logout", false);
        assert!(signer.add_redirect_sign(&idp_off, &sp_redirect, MessageKind::Logout).unwrap().is_some());
        let sp_on = sp().with("sign.logout", true);
        assert!(signer.add_redirect_sign(&idp_off, &sp_on, MessageKind::Logout).unwrap().is_none());

        let dst_on = sp().with("sign.authnrequest", true);
        assert!(signer
            .add_redirect_sign(&idp(), &dst_on, MessageKind::AuthnRequest)
            .unwrap()
            .is_some());
    }

    #[test]
    fn check_sign_accepts_any_published_certificate() {
        let keys = keys();
        let signing = MessageSigner::new(&keys).add_sign(&idp(), &sp()).unwrap();
        let message = posted(&logout_request(Some(&signing)));

        let sender = idp().with(
            "keys",
            vec![
                crate::config::PublicKeyEntry::certificate(other_pair().certificate_data().unwrap()),
                crate::config::PublicKeyEntry::certificate(idp_pair().certificate_data().unwrap()),
            ],
        );
        let scope = NsScope::new();
        let verified = MessageVerifier::new(&keys)
            .check_sign(&sender, SignedTarget::Element(&message.root, &scope))
            .unwrap();
        assert!(verified);
    }

    #[test]
    fn check_sign_reports_last_error_and_missing_keys() {
        let keys = keys();
        let signing = MessageSigner::new(&keys).add_sign(&idp(), &sp()).unwrap();
        let message = posted(&logout_request(Some(&signing)));
        let scope = NsScope::new();
        let verifier = MessageVerifier::new(&keys);

        let impostor = EntityConfig::new("https://idp.example.com")
            .with("certData", other_pair().certificate_data().unwrap());
        assert!(matches!(
            verifier.check_sign(&impostor, SignedTarget::Element(&message.root, &scope)),
            Err(SamlError::SignatureInvalid(_))
        ));

        assert!(matches!(
            verifier.check_sign(&sp(), SignedTarget::Element(&message.root, &scope)),
            Err(SamlError::NoSigningKey(_))
        ));

        let unsigned = posted(&logout_request(None));
        assert!(!verifier
            .check_sign(&idp(), SignedTarget::Element(&unsigned.root, &scope))
            .unwrap());
    }

    #[test]
    fn validate_message_policy() {
        let keys = keys();
        let verifier = MessageVerifier::new(&keys);
        let unsigned = posted(&logout_request(None));

        verifier.validate_message(&idp(), &sp(), &unsigned).unwrap();

        let enforcing = sp().with("validate.logout", true);
        assert!(matches!(
            verifier.validate_message(&idp(), &enforcing, &unsigned),
            Err(SamlError::MissingSignature)
        ));

        let redirect_validate = idp().with("redirect.validate", true);
        assert!(matches!(
            verifier.validate_message(&redirect_validate, &sp(), &unsigned),
            Err(SamlError::MissingSignature)
        ));
    }

    #[test]
    fn signed_message_is_checked_even_without_flags() {
        let keys = keys();
        let signing = SigningKey {
            key: other_pair().private_key.clone(),
            certificate: None,
            algorithm: SignatureAlgorithm::RsaSha256,
        };
        let url = HttpRedirectBinding::encode(
            &logout_request(None),
            "https://sp.example.com/slo",
            None,
            SamlMessageType::Request,
            Some(&signing.signer()),
        )
        .unwrap();
        let message = HttpRedirectBinding::decode_url(&url).unwrap();

        assert!(MessageVerifier::new(&keys)
            .validate_message(&idp(), &sp(), &message)
            .is_err());
    }
}
