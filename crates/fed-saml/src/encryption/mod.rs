//! XML Encryption of assertions, attributes and name identifiers.
//!
//! Encrypted elements use `xenc:EncryptedData` of type `#Element`. The
//! session key travels in `ds:KeyInfo/xenc:EncryptedKey` (RSA-OAEP-MGF1P or
//! RSA-1_5) unless both sides hold a pre-distributed shared key. The
//! `CipherValue` is `IV || ciphertext [|| tag]`.

mod decryptor;
mod encryptor;

pub use decryptor::*;
pub use encryptor::*;

use fed_crypto::{HashAlgorithm, KeyTransportAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::types::{decode_base64, encode_base64, XMLDSIG_NS, XMLENC_ELEMENT, XMLENC_NS};
use crate::xml::Element;

/// Wrapped session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedKeyParts {
    /// Key transport algorithm URI.
    pub algorithm: String,
    /// Wrapped key bytes.
    pub cipher_value: Vec<u8>,
}

/// Contents of an `xenc:EncryptedData` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedDataParts {
    /// Data encryption algorithm URI, if declared.
    pub method: Option<String>,
    /// Wrapped session key, if present.
    pub encrypted_key: Option<EncryptedKeyParts>,
    /// `IV || ciphertext [|| tag]`.
    pub cipher_value: Vec<u8>,
}

impl EncryptedDataParts {
    /// Reads the `xenc:EncryptedData` inside a `saml:Encrypted*` container.
    ///
    /// The `EncryptedKey` is looked up in the data's `KeyInfo` first, then
    /// among the container's children.
    ///
    /// # Errors
    ///
    /// Returns an error if `EncryptedData` or a `CipherValue` is missing or
    /// not valid base64.
    pub fn from_container(container: &Element) -> SamlResult<Self> {
        let data = container
            .child(XMLENC_NS, "EncryptedData")
            .ok_or_else(|| SamlError::MissingElement("xenc:EncryptedData".to_string()))?;

        let encrypted_key = data
            .child(XMLDSIG_NS, "KeyInfo")
            .and_then(|info| info.child(XMLENC_NS, "EncryptedKey"))
            .or_else(|| container.child(XMLENC_NS, "EncryptedKey"))
            .map(|key| {
                Ok::<_, SamlError>(EncryptedKeyParts {
                    algorithm: key
                        .child(XMLENC_NS, "EncryptionMethod")
                        .and_then(|m| m.attr("Algorithm"))
                        .ok_or_else(|| SamlError::MissingElement("EncryptedKey/EncryptionMethod".to_string()))?
                        .to_string(),
                    cipher_value: cipher_value(key)?,
                })
            })
            .transpose()?;

        Ok(Self {
            method: data
                .child(XMLENC_NS, "EncryptionMethod")
                .and_then(|m| m.attr("Algorithm"))
                .map(str::to_string),
            encrypted_key,
            cipher_value: cipher_value(data)?,
        })
    }

    /// Builds the `xenc:EncryptedData` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let key_info = self.encrypted_key.as_ref().map(|key| {
            let mut method = Element::new(XMLENC_NS, "xenc:EncryptionMethod").with_attr("Algorithm", key.algorithm.clone());
            if key.algorithm == KeyTransportAlgorithm::RsaOaepMgf1p.uri() {
                method.push(Element::new(XMLDSIG_NS, "ds:DigestMethod").with_attr("Algorithm", HashAlgorithm::Sha1.uri()));
            }
            Element::new(XMLDSIG_NS, "ds:KeyInfo")
                .declare("ds", XMLDSIG_NS)
                .with_child(
                    Element::new(XMLENC_NS, "xenc:EncryptedKey")
                        .with_child(method)
                        .with_child(cipher_data(&key.cipher_value)),
                )
        });

        Element::new(XMLENC_NS, "xenc:EncryptedData")
            .declare("xenc", XMLENC_NS)
            .with_attr("Type", XMLENC_ELEMENT)
            .with_opt_child(
                self.method
                    .as_ref()
                    .map(|m| Element::new(XMLENC_NS, "xenc:EncryptionMethod").with_attr("Algorithm", m.clone())),
            )
            .with_opt_child(key_info)
            .with_child(cipher_data(&self.cipher_value))
    }
}

fn cipher_value(parent: &Element) -> SamlResult<Vec<u8>> {
    let value = parent
        .child(XMLENC_NS, "CipherData")
        .and_then(|d| d.child(XMLENC_NS, "CipherValue"))
        .ok_or_else(|| SamlError::MissingElement(format!("{}/CipherData/CipherValue", parent.local)))?;
    decode_base64(&value.text())
}

fn cipher_data(bytes: &[u8]) -> Element {
    Element::new(XMLENC_NS, "xenc:CipherData")
        .with_child(Element::new(XMLENC_NS, "xenc:CipherValue").with_text(encode_base64(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SAML_NS;
    use crate::xml::parse;

    #[test]
    fn encrypted_key_as_sibling_is_found() {
        let xml = r#"<saml:EncryptedAssertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:xenc="http://www.w3.org/2001/04/xmlenc#">
            <xenc:EncryptedData Type="http://www.w3.org/2001/04/xmlenc#Element">
                <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes256-cbc"/>
                <xenc:CipherData><xenc:CipherValue>AAEC
                AwQF</xenc:CipherValue></xenc:CipherData>
            </xenc:EncryptedData>
            <xenc:EncryptedKey>
                <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#rsa-1_5"/>
                <xenc:CipherData><xenc:CipherValue>BgcI</xenc:CipherValue></xenc:CipherData>
            </xenc:EncryptedKey>
        </saml:EncryptedAssertion>"#;
        let parts = EncryptedDataParts::from_container(&parse(xml).unwrap()).unwrap();
        assert_eq!(parts.method.as_deref(), Some("http://www.w3.org/2001/04/xmlenc#aes256-cbc"));
        assert_eq!(parts.cipher_value, [0, 1, 2, 3, 4, 5]);
        let key = parts.encrypted_key.unwrap();
        assert_eq!(key.algorithm, KeyTransportAlgorithm::Rsa15.uri());
        assert_eq!(key.cipher_value, [6, 7, 8]);
    }

    #[test]
    fn element_layout_survives_reparse() {
        let parts = EncryptedDataParts {
            method: Some("http://www.w3.org/2001/04/xmlenc#aes128-cbc".to_string()),
            encrypted_key: Some(EncryptedKeyParts {
                algorithm: KeyTransportAlgorithm::RsaOaepMgf1p.uri().to_string(),
                cipher_value: vec![9; 4],
            }),
            cipher_value: vec![1; 32],
        };
        let container = Element::new(SAML_NS, "saml:EncryptedID").with_child(parts.to_element());
        let reparsed = parse(&container.to_xml()).unwrap();

        let data = reparsed.child(XMLENC_NS, "EncryptedData").unwrap();
        assert_eq!(data.attr("Type"), Some(XMLENC_ELEMENT));
        assert!(data
            .child(XMLDSIG_NS, "KeyInfo")
            .and_then(|k| k.child(XMLENC_NS, "EncryptedKey"))
            .and_then(|k| k.child(XMLENC_NS, "EncryptionMethod"))
            .and_then(|m| m.child(XMLDSIG_NS, "DigestMethod"))
            .is_some());
        assert_eq!(EncryptedDataParts::from_container(&reparsed).unwrap(), parts);
    }

    #[test]
    fn missing_cipher_value_is_reported() {
        let xml = r#"<saml:EncryptedID xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"><xenc:EncryptedData/></saml:EncryptedID>"#;
        assert!(matches!(
            EncryptedDataParts::from_container(&parse(xml).unwrap()),
            Err(SamlError::MissingElement(_))
        ));
    }
}
