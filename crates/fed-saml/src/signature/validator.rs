//! XML Signature validation.
//!
//! Provides functionality for validating signatures on SAML documents
//! against a single trusted key. Trying several published keys is the
//! caller's job.

use fed_crypto::hash::digest;
use fed_crypto::keys::{pem_from_base64, public_key_from_pem};
use fed_crypto::{signature, CryptoError, PKey, Public, SignatureAlgorithm};
use tracing::warn;

use super::XmlSignature;
use crate::error::{SamlError, SamlResult};
use crate::types::{decode_base64, transforms, XMLDSIG_NS};
use crate::xml::{canonicalize, Element, Node, NsScope};

/// XML signature validator.
#[derive(Debug, Clone)]
pub struct XmlSignatureValidator {
    key: PKey<Public>,
}

impl XmlSignatureValidator {
    /// Creates a validator trusting `key`.
    #[must_use]
    pub fn new(key: PKey<Public>) -> Self {
        Self { key }
    }

    /// Creates a validator from base64 DER certificate data.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if the data is not a certificate.
    pub fn from_certificate_data(certificate_data: &str) -> SamlResult<Self> {
        let pem = pem_from_base64("CERTIFICATE", certificate_data);
        Ok(Self::new(public_key_from_pem(pem.as_bytes())?))
    }

    /// Validates the enveloped signature of `element`.
    ///
    /// `scope` holds the namespaces declared by the element's ancestors.
    /// The reference must point at the element itself (`#ID`, or empty for
    /// a document root) and only the enveloped-signature and exclusive C14N
    /// transforms are allowed.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the signature is malformed,
    /// references another element, or does not verify.
    pub fn validate(&self, element: &Element, scope: &NsScope) -> SamlResult<XmlSignature> {
        let (position, signature_element) = element
            .children
            .iter()
            .enumerate()
            .find_map(|(i, node)| match node {
                Node::Element(e) if e.is(XMLDSIG_NS, "Signature") => Some((i, e)),
                _ => None,
            })
            .ok_or(SamlError::MissingSignature)?;
        let signature = XmlSignature::from_element(signature_element)?;

        let referenced = signature.reference_uri.strip_prefix('#');
        match (referenced, element.attr("ID")) {
            (None, _) if signature.reference_uri.is_empty() => {}
            (Some(id), Some(own)) if id == own => {}
            _ => {
                return Err(SamlError::SignatureInvalid(format!(
                    "reference '{}' does not point to the signed element",
                    signature.reference_uri
                )))
            }
        }

        for transform in &signature.transforms {
            if transform != transforms::ENVELOPED_SIGNATURE && transform != transforms::EXCLUSIVE_C14N {
                return Err(SamlError::SignatureInvalid(format!("unsupported transform '{transform}'")));
            }
        }
        if signature.canonicalization != transforms::EXCLUSIVE_C14N {
            return Err(SamlError::SignatureInvalid(format!(
                "unsupported canonicalization method '{}'",
                signature.canonicalization
            )));
        }

        if signature.algorithm.is_deprecated() {
            warn!(algorithm = signature.algorithm.uri(), "accepting deprecated signature algorithm");
        }

        let mut enveloping = element.clone();
        enveloping.children.remove(position);
        let computed = digest(
            signature.digest_algorithm,
            canonicalize(&enveloping, scope, &signature.reference_prefixes).as_bytes(),
        )?;
        if computed.len() != signature.digest_value.len()
            || !openssl::memcmp::eq(&computed, &signature.digest_value)
        {
            return Err(SamlError::SignatureInvalid("digest value mismatch".to_string()));
        }

        let signature_scope = signature_element.inner_scope(&element.inner_scope(scope));
        let signed_info = signature_element
            .child(XMLDSIG_NS, "SignedInfo")
            .ok_or_else(|| SamlError::MissingElement("ds:SignedInfo".to_string()))?;
        let signed_info_c14n = canonicalize(signed_info, &signature_scope, &signature.signed_info_prefixes);
        verify_value(
            signature.algorithm,
            &self.key,
            signed_info_c14n.as_bytes(),
            &signature.signature_value,
        )?;

        Ok(signature)
    }

    /// Validates a detached HTTP-Redirect signature.
    ///
    /// `signed_query` is the raw query string as received up to (excluding)
    /// the `Signature` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the signature does not
    /// verify, or a crypto error for an unknown algorithm.
    pub fn validate_redirect(&self, signed_query: &str, sig_alg: &str, signature_b64: &str) -> SamlResult<()> {
        let algorithm = SignatureAlgorithm::from_uri(sig_alg)?;
        if algorithm.is_deprecated() {
            warn!(algorithm = sig_alg, "accepting deprecated signature algorithm");
        }
        let signature = decode_base64(signature_b64)?;
        verify_value(algorithm, &self.key, signed_query.as_bytes(), &signature)
    }
}

fn verify_value(algorithm: SignatureAlgorithm, key: &PKey<Public>, data: &[u8], value: &[u8]) -> SamlResult<()> {
    signature::verify(algorithm, key, data, value).map_err(|e| match e {
        CryptoError::Verification => SamlError::SignatureInvalid("signature value does not verify".to_string()),
        other => SamlError::Crypto(other),
    })
}
