//! Encrypting elements for a recipient.

use fed_crypto::{cipher, BlockAlgorithm};

use super::{EncryptedDataParts, EncryptedKeyParts};
use crate::config::EntityConfig;
use crate::error::{SamlError, SamlResult};
use crate::keys::{EncryptionKey, KeyResolver};
use crate::types::{Attribute, NameId, SAML_NS};
use crate::xml::Element;

/// Encrypts elements for a recipient entity.
#[derive(Debug, Clone, Copy)]
pub struct Encryptor<'a> {
    keys: &'a KeyResolver,
}

impl<'a> Encryptor<'a> {
    /// Creates an encryptor resolving keys through `keys`.
    #[must_use]
    pub const fn new(keys: &'a KeyResolver) -> Self {
        Self { keys }
    }

    /// Encrypts a name identifier for `destination` into `saml:EncryptedID`.
    ///
    /// A shared key uses the destination's `sharedkey_algorithm` (default
    /// AES-128-GCM). Otherwise an AES-128-CBC session key is wrapped with
    /// RSA-OAEP-MGF1P for the destination's first encryption certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoEncryptionKey`] if the destination has neither
    /// a shared key nor an encryption certificate.
    pub fn encrypt_identifier(&self, name_id: &NameId, destination: &EntityConfig) -> SamlResult<Element> {
        let key = match self.keys.encryption_key(destination)? {
            EncryptionKey::Shared { key, .. } => {
                let algorithm = destination
                    .get_optional_string("sharedkey_algorithm", None)?
                    .map(|uri| BlockAlgorithm::from_uri(&uri))
                    .transpose()?
                    .unwrap_or(BlockAlgorithm::Aes128Gcm);
                EncryptionKey::Shared { algorithm, key }
            }
            public @ EncryptionKey::Public { .. } => public,
        };
        let data = encrypt_with(&key, &name_id.to_element(), BlockAlgorithm::Aes128Cbc)?;
        Ok(Element::new(SAML_NS, "saml:EncryptedID").with_child(data))
    }

    /// Encrypts a (possibly signed) assertion for `destination` into
    /// `saml:EncryptedAssertion`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoEncryptionKey`] if the destination has no
    /// usable key.
    pub fn encrypt_assertion(&self, assertion: &Element, destination: &EntityConfig) -> SamlResult<Element> {
        if !assertion.is(SAML_NS, "Assertion") {
            return Err(SamlError::InvalidMessage(format!(
                "expected saml:Assertion, found {}",
                assertion.qualified_name()
            )));
        }
        let key = self.keys.encryption_key(destination)?;
        let data = encrypt_with(&key, assertion, BlockAlgorithm::Aes128Cbc)?;
        Ok(Element::new(SAML_NS, "saml:EncryptedAssertion").with_child(data))
    }

    /// Encrypts an attribute for `destination` into `saml:EncryptedAttribute`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoEncryptionKey`] if the destination has no
    /// usable key.
    pub fn encrypt_attribute(&self, attribute: &Attribute, destination: &EntityConfig) -> SamlResult<Element> {
        let key = self.keys.encryption_key(destination)?;
        let data = encrypt_with(&key, &attribute.to_element(), BlockAlgorithm::Aes128Cbc)?;
        Ok(Element::new(SAML_NS, "saml:EncryptedAttribute").with_child(data))
    }
}

/// Encrypts `element`; `session_algorithm` is used for key transport.
fn encrypt_with(key: &EncryptionKey, element: &Element, session_algorithm: BlockAlgorithm) -> SamlResult<Element> {
    let plaintext = element.to_xml();
    let parts = match key {
        EncryptionKey::Shared { algorithm, key } => EncryptedDataParts {
            method: Some(algorithm.uri().to_string()),
            encrypted_key: None,
            cipher_value: cipher::encrypt(*algorithm, key, plaintext.as_bytes())?,
        },
        EncryptionKey::Public { transport, public_key } => {
            let session_key = cipher::generate_key(session_algorithm);
            EncryptedDataParts {
                method: Some(session_algorithm.uri().to_string()),
                encrypted_key: Some(EncryptedKeyParts {
                    algorithm: transport.uri().to_string(),
                    cipher_value: cipher::wrap_key(*transport, public_key, &session_key)?,
                }),
                cipher_value: cipher::encrypt(session_algorithm, &session_key, plaintext.as_bytes())?,
            }
        }
    };
    Ok(parts.to_element())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FederationConfig;
    use crate::encryption::EncryptedDataParts;
    use crate::types::XMLENC_NS;
    use fed_crypto::keys::generate_self_signed;
    use fed_crypto::KeyTransportAlgorithm;

    fn keys() -> KeyResolver {
        KeyResolver::new(&FederationConfig::default())
    }

    #[test]
    fn identifier_with_certificate_uses_rsa_oaep() {
        let pair = generate_self_signed("enc", 2048).unwrap();
        let sp = EntityConfig::new("sp").with("certData", pair.certificate_data().unwrap());
        let keys = keys();

        let encrypted = Encryptor::new(&keys).encrypt_identifier(&NameId::transient("_u"), &sp).unwrap();
        assert!(encrypted.is(SAML_NS, "EncryptedID"));
        let parts = EncryptedDataParts::from_container(&encrypted).unwrap();
        assert_eq!(parts.method.as_deref(), Some(BlockAlgorithm::Aes128Cbc.uri()));
        assert_eq!(
            parts.encrypted_key.unwrap().algorithm,
            KeyTransportAlgorithm::RsaOaepMgf1p.uri()
        );
    }

    #[test]
    fn identifier_with_shared_key_defaults_to_gcm() {
        let sp = EntityConfig::new("sp").with("sharedkey", "0123456789abcdef");
        let keys = keys();

        let encrypted = Encryptor::new(&keys).encrypt_identifier(&NameId::transient("_u"), &sp).unwrap();
        let parts = EncryptedDataParts::from_container(&encrypted).unwrap();
        assert_eq!(parts.method.as_deref(), Some(BlockAlgorithm::Aes128Gcm.uri()));
        assert!(parts.encrypted_key.is_none());
        assert!(encrypted.child(XMLENC_NS, "EncryptedData").is_some());
    }

    #[test]
    fn no_key_means_no_encryption() {
        let keys = keys();
        assert!(matches!(
            Encryptor::new(&keys).encrypt_identifier(&NameId::transient("_u"), &EntityConfig::new("sp")),
            Err(SamlError::NoEncryptionKey(_))
        ));
    }

    #[test]
    fn only_assertions_are_encrypted_as_assertions() {
        let keys = keys();
        let sp = EntityConfig::new("sp").with("sharedkey", "0123456789abcdef");
        let not_assertion = Element::new(SAML_NS, "saml:Subject");
        assert!(Encryptor::new(&keys).encrypt_assertion(&not_assertion, &sp).is_err());
    }
}
