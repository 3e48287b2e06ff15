//! XML Signature support for SAML.
//!
//! This module provides XML Digital Signature (XML-DSig) support for
//! signing and validating SAML messages and assertions.
//!
//! Only the profile SAML uses is supported: one enveloped signature per
//! signed element, referencing that element by `#ID`, with exclusive
//! canonicalization. HTTP-Redirect detached signatures over the query string
//! are handled here as well.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512
//!
//! RSA-SHA1 is accepted on received messages with a deprecation warning.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use fed_crypto::{HashAlgorithm, SignatureAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::types::{decode_base64, EXC_C14N_NS, XMLDSIG_NS};
use crate::xml::Element;

/// Parsed `<ds:Signature>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSignature {
    /// The signature algorithm used.
    pub algorithm: SignatureAlgorithm,

    /// Canonicalization method URI of `SignedInfo`.
    pub canonicalization: String,

    /// `InclusiveNamespaces PrefixList` of the canonicalization method.
    pub signed_info_prefixes: Vec<String>,

    /// The reference URI (`#ID`, or empty for the whole document).
    pub reference_uri: String,

    /// Transform URIs applied to the reference, in order.
    pub transforms: Vec<String>,

    /// `InclusiveNamespaces PrefixList` of the reference's C14N transform.
    pub reference_prefixes: Vec<String>,

    /// Digest algorithm of the reference.
    pub digest_algorithm: HashAlgorithm,

    /// Decoded digest value.
    pub digest_value: Vec<u8>,

    /// Decoded signature value.
    pub signature_value: Vec<u8>,

    /// Base64 certificates from `KeyInfo/X509Data`.
    pub certificates: Vec<String>,
}

impl XmlSignature {
    /// Parses a `<ds:Signature>` element.
    ///
    /// # Errors
    ///
    /// Returns an error if a required part is missing, an algorithm is
    /// unknown, or the signature carries more than one reference.
    pub fn from_element(signature: &Element) -> SamlResult<Self> {
        let signed_info = ds_child(signature, "SignedInfo")?;
        let c14n = ds_child(signed_info, "CanonicalizationMethod")?;
        let method = ds_child(signed_info, "SignatureMethod")?;

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references
            .next()
            .ok_or_else(|| SamlError::MissingElement("ds:Reference".to_string()))?;
        if references.next().is_some() {
            return Err(SamlError::SignatureInvalid(
                "signature has more than one reference".to_string(),
            ));
        }

        let mut transforms = Vec::new();
        let mut reference_prefixes = Vec::new();
        if let Some(list) = reference.child(XMLDSIG_NS, "Transforms") {
            for transform in list.children_named(XMLDSIG_NS, "Transform") {
                transforms.push(algorithm_attr(transform)?.to_string());
                reference_prefixes.extend(inclusive_prefixes(transform));
            }
        }

        let digest_method = ds_child(reference, "DigestMethod")?;
        let certificates = signature
            .child(XMLDSIG_NS, "KeyInfo")
            .into_iter()
            .flat_map(|info| info.children_named(XMLDSIG_NS, "X509Data"))
            .flat_map(|data| data.children_named(XMLDSIG_NS, "X509Certificate"))
            .map(|cert| cert.text().chars().filter(|c| !c.is_ascii_whitespace()).collect())
            .collect();

        Ok(Self {
            algorithm: SignatureAlgorithm::from_uri(algorithm_attr(method)?)?,
            canonicalization: algorithm_attr(c14n)?.to_string(),
            signed_info_prefixes: inclusive_prefixes(c14n),
            reference_uri: reference.attr("URI").unwrap_or_default().to_string(),
            transforms,
            reference_prefixes,
            digest_algorithm: HashAlgorithm::from_uri(algorithm_attr(digest_method)?)?,
            digest_value: decode_base64(&ds_child(reference, "DigestValue")?.text())?,
            signature_value: decode_base64(&ds_child(signature, "SignatureValue")?.text())?,
            certificates,
        })
    }
}

/// Returns the enveloped `<ds:Signature>` of `element`, if any.
#[must_use]
pub fn find_signature(element: &Element) -> Option<&Element> {
    element.child(XMLDSIG_NS, "Signature")
}

fn ds_child<'a>(parent: &'a Element, local: &str) -> SamlResult<&'a Element> {
    parent
        .child(XMLDSIG_NS, local)
        .ok_or_else(|| SamlError::MissingElement(format!("ds:{local}")))
}

fn algorithm_attr(element: &Element) -> SamlResult<&str> {
    element
        .attr("Algorithm")
        .ok_or_else(|| SamlError::MissingElement(format!("{}/@Algorithm", element.qualified_name())))
}

fn inclusive_prefixes(method: &Element) -> Vec<String> {
    method
        .child(EXC_C14N_NS, "InclusiveNamespaces")
        .and_then(|list| list.attr("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    const SIGNATURE: &str = r##"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:ec="http://www.w3.org/2001/10/xml-exc-c14n#">
  <ds:SignedInfo>
    <ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>
    <ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>
    <ds:Reference URI="#_abc">
      <ds:Transforms>
        <ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/>
        <ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"><ec:InclusiveNamespaces PrefixList="xs saml"/></ds:Transform>
      </ds:Transforms>
      <ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
      <ds:DigestValue>AAEC</ds:DigestValue>
    </ds:Reference>
  </ds:SignedInfo>
  <ds:SignatureValue>
    AwQF
  </ds:SignatureValue>
  <ds:KeyInfo><ds:X509Data><ds:X509Certificate>MIIB
  AAAA</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
</ds:Signature>"##;

    #[test]
    fn parses_signature_parts() {
        let sig = XmlSignature::from_element(&parse(SIGNATURE).unwrap()).unwrap();
        assert_eq!(sig.algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(sig.reference_uri, "#_abc");
        assert_eq!(sig.transforms.len(), 2);
        assert_eq!(sig.reference_prefixes, ["xs", "saml"]);
        assert!(sig.signed_info_prefixes.is_empty());
        assert_eq!(sig.digest_algorithm, HashAlgorithm::Sha256);
        assert_eq!(sig.digest_value, [0, 1, 2]);
        assert_eq!(sig.signature_value, [3, 4, 5]);
        assert_eq!(sig.certificates, ["MIIBAAAA"]);
    }

    #[test]
    fn unknown_signature_method_is_rejected() {
        let xml = SIGNATURE.replace("xmldsig-more#rsa-sha256", "xmldsig-more#ecdsa-sha256");
        assert!(matches!(
            XmlSignature::from_element(&parse(&xml).unwrap()),
            Err(SamlError::Crypto(_))
        ));
    }
}
