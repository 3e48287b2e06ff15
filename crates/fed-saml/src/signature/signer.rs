//! XML Signature creation.
//!
//! Provides functionality for signing SAML documents using XML-DSig.

use fed_crypto::hash::digest;
use fed_crypto::{signature, PKey, Private, SignatureAlgorithm};

use crate::error::SamlResult;
use crate::types::{encode_base64, required_attr, transforms, SAML_NS, XMLDSIG_NS};
use crate::xml::{canonicalize, Element, NsScope};

/// XML document signer.
///
/// Signs SAML documents using the configured private key.
#[derive(Debug, Clone)]
pub struct XmlSigner {
    /// The private key.
    key: PKey<Private>,
    /// Base64 DER certificate attached as `KeyInfo` (optional).
    certificate: Option<String>,
    /// Signature algorithm.
    algorithm: SignatureAlgorithm,
}

impl XmlSigner {
    /// Creates a new signer.
    #[must_use]
    pub fn new(key: PKey<Private>, algorithm: SignatureAlgorithm) -> Self {
        Self {
            key,
            certificate: None,
            algorithm,
        }
    }

    /// Attaches a certificate (base64 DER) to produced signatures.
    #[must_use]
    pub fn with_certificate(mut self, certificate_data: impl Into<String>) -> Self {
        self.certificate = Some(certificate_data.into());
        self
    }

    /// Returns the signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Returns the attached certificate, if any.
    #[must_use]
    pub fn certificate(&self) -> Option<&str> {
        self.certificate.as_deref()
    }

    /// Signs `element` in place with an enveloped signature.
    ///
    /// The element must carry an `ID` attribute. `scope` holds the namespaces
    /// declared by its ancestors. The signature is inserted directly after
    /// `saml:Issuer`, or as the first child when there is none. Existing
    /// signatures are replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the element has no `ID` or signing fails.
    pub fn sign_element(&self, element: &mut Element, scope: &NsScope) -> SamlResult<()> {
        let id = required_attr(element, "ID")?.to_string();
        element.remove_children(XMLDSIG_NS, "Signature");

        let hash = self.algorithm.hash_algorithm();
        let digest_value = digest(hash, canonicalize(element, scope, &[]).as_bytes())?;

        let signed_info = Element::new(XMLDSIG_NS, "ds:SignedInfo")
            .with_child(
                Element::new(XMLDSIG_NS, "ds:CanonicalizationMethod")
                    .with_attr("Algorithm", transforms::EXCLUSIVE_C14N),
            )
            .with_child(
                Element::new(XMLDSIG_NS, "ds:SignatureMethod")
                    .with_attr("Algorithm", self.algorithm.uri()),
            )
            .with_child(
                Element::new(XMLDSIG_NS, "ds:Reference")
                    .with_attr("URI", format!("#{id}"))
                    .with_child(
                        Element::new(XMLDSIG_NS, "ds:Transforms")
                            .with_child(
                                Element::new(XMLDSIG_NS, "ds:Transform")
                                    .with_attr("Algorithm", transforms::ENVELOPED_SIGNATURE),
                            )
                            .with_child(
                                Element::new(XMLDSIG_NS, "ds:Transform")
                                    .with_attr("Algorithm", transforms::EXCLUSIVE_C14N),
                            ),
                    )
                    .with_child(
                        Element::new(XMLDSIG_NS, "ds:DigestMethod").with_attr("Algorithm", hash.uri()),
                    )
                    .with_child(
                        Element::new(XMLDSIG_NS, "ds:DigestValue")
                            .with_text(encode_base64(&digest_value)),
                    ),
            );

        let signed_info_c14n = canonicalize(&signed_info, &NsScope::new(), &[]);
        let signature_value = signature::sign(self.algorithm, &self.key, signed_info_c14n.as_bytes())?;

        let key_info = self.certificate.as_ref().map(|cert| {
            Element::new(XMLDSIG_NS, "ds:KeyInfo").with_child(
                Element::new(XMLDSIG_NS, "ds:X509Data")
                    .with_child(Element::new(XMLDSIG_NS, "ds:X509Certificate").with_text(cert.clone())),
            )
        });

        let signature = Element::new(XMLDSIG_NS, "ds:Signature")
            .declare("ds", XMLDSIG_NS)
            .with_child(signed_info)
            .with_child(
                Element::new(XMLDSIG_NS, "ds:SignatureValue").with_text(encode_base64(&signature_value)),
            )
            .with_opt_child(key_info);

        element.insert_after(SAML_NS, "Issuer", signature);
        Ok(())
    }

    /// Creates a detached signature for the HTTP-Redirect binding.
    ///
    /// `message_param` is `SAMLRequest` or `SAMLResponse`; `encoded_message`
    /// is the deflated, base64-encoded message before URL encoding. Returns
    /// the signed query string (without `Signature`) and the base64
    /// signature.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_redirect(
        &self,
        message_param: &str,
        encoded_message: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<(String, String)> {
        let query = redirect_signed_query(message_param, encoded_message, relay_state, self.algorithm.uri());
        let signature = signature::sign(self.algorithm, &self.key, query.as_bytes())?;
        Ok((query, encode_base64(&signature)))
    }
}

/// Builds `<param>=..[&RelayState=..]&SigAlg=..`, the octets a redirect
/// signature covers.
#[must_use]
pub fn redirect_signed_query(
    message_param: &str,
    encoded_message: &str,
    relay_state: Option<&str>,
    sig_alg: &str,
) -> String {
    let mut query = format!("{message_param}={}", urlencoding::encode(encoded_message));
    if let Some(relay_state) = relay_state {
        query.push_str("&RelayState=");
        query.push_str(&urlencoding::encode(relay_state));
    }
    query.push_str("&SigAlg=");
    query.push_str(&urlencoding::encode(sig_alg));
    query
}
