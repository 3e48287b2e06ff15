//! Decrypting received assertions, attributes and name identifiers.

use fed_crypto::{cipher, BlockAlgorithm, KeyTransportAlgorithm};

use super::EncryptedDataParts;
use crate::candidates::try_each;
use crate::config::{EntityConfig, MetadataView, Side};
use crate::error::{SamlError, SamlResult};
use crate::keys::{DecryptionKey, KeyResolver};
use crate::types::{Assertion, Attribute, NameId, SAML_NS};
use crate::xml::{parse_fragment, Element, NsScope};

/// Decrypts data an IdP encrypted for an SP.
#[derive(Debug, Clone, Copy)]
pub struct Decryptor<'a> {
    keys: &'a KeyResolver,
}

impl<'a> Decryptor<'a> {
    /// Creates a decryptor resolving keys through `keys`.
    #[must_use]
    pub const fn new(keys: &'a KeyResolver) -> Self {
        Self { keys }
    }

    /// Returns the plaintext `saml:Assertion` for `element`.
    ///
    /// A plaintext assertion is returned as is unless `assertion.encryption`
    /// (IdP, then SP) requires encryption. An `EncryptedAssertion` is
    /// decrypted with the first working candidate key.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnencryptedAssertion`], or
    /// [`SamlError::DecryptAssertion`] wrapping the last candidate failure.
    pub fn decrypt_assertion(
        &self,
        idp: &EntityConfig,
        sp: &EntityConfig,
        element: &Element,
        scope: &NsScope,
    ) -> SamlResult<Element> {
        if element.is(SAML_NS, "Assertion") {
            let required = MetadataView::new(idp, sp).first_bool(
                &[(Side::Source, "assertion.encryption"), (Side::Destination, "assertion.encryption")],
                false,
            )?;
            if required {
                return Err(SamlError::UnencryptedAssertion);
            }
            return Ok(element.clone());
        }

        let decrypted = self
            .decrypt_container(idp, sp, element, scope, "assertion")
            .map_err(|e| SamlError::DecryptAssertion(Box::new(e)))?;
        if !decrypted.is(SAML_NS, "Assertion") {
            return Err(SamlError::DecryptAssertion(Box::new(SamlError::InvalidMessage(format!(
                "encrypted content is {}, not saml:Assertion",
                decrypted.qualified_name()
            )))));
        }
        Ok(decrypted)
    }

    /// Decrypts every `EncryptedAttribute` of `assertion` in place.
    ///
    /// All attributes are decrypted with the same key; the first candidate
    /// that decrypts all of them wins. `scope` holds the namespaces in scope
    /// at the assertion.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::DecryptAttributes`] wrapping the last failure.
    pub fn decrypt_attributes(
        &self,
        idp: &EntityConfig,
        sp: &EntityConfig,
        assertion: &mut Assertion,
        scope: &NsScope,
    ) -> SamlResult<()> {
        if assertion.encrypted_attributes.is_empty() {
            return Ok(());
        }

        let wrap = |e: SamlError| SamlError::DecryptAttributes(Box::new(e));
        let candidates = self.keys.decryption_keys(idp, sp, None).map_err(wrap)?;
        let blacklist = self.keys.blacklisted_algorithms(idp, sp).map_err(wrap)?;

        let encrypted = &assertion.encrypted_attributes;
        let decrypted = try_each("attribute decryption", candidates, |key| {
            encrypted
                .iter()
                .map(|container| {
                    let parts = EncryptedDataParts::from_container(container)?;
                    let element = decrypt_with_key(&parts, &key, &blacklist, scope)?;
                    if !element.is(SAML_NS, "Attribute") {
                        return Err(SamlError::InvalidMessage(format!(
                            "encrypted content is {}, not saml:Attribute",
                            element.qualified_name()
                        )));
                    }
                    Attribute::from_element(&element)
                })
                .collect::<SamlResult<Vec<_>>>()
                .map(Some)
        })
        .or_else(|last| wrap(last.unwrap_or_else(no_candidates)))?;

        assertion.attributes.extend(decrypted);
        assertion.encrypted_attributes.clear();
        Ok(())
    }

    /// Replaces an `EncryptedID` in the subject of `assertion` with the
    /// decrypted name identifier.
    ///
    /// # Errors
    ///
    /// Returns the last candidate failure unchanged.
    pub fn decrypt_name_id(
        &self,
        idp: &EntityConfig,
        sp: &EntityConfig,
        assertion: &mut Assertion,
        scope: &NsScope,
    ) -> SamlResult<()> {
        let Some(subject) = assertion.subject.as_mut() else {
            return Ok(());
        };
        let Some(encrypted) = subject.encrypted_id.take() else {
            return Ok(());
        };
        let element = self.decrypt_container(idp, sp, &encrypted, scope, "name ID")?;
        subject.name_id = Some(NameId::from_element(&element)?);
        Ok(())
    }

    /// Decrypts a `saml:EncryptedID` received outside an assertion, e.g. in
    /// a `LogoutRequest`.
    ///
    /// # Errors
    ///
    /// Returns the last candidate failure unchanged.
    pub fn decrypt_identifier(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        encrypted_id: &Element,
        scope: &NsScope,
    ) -> SamlResult<NameId> {
        let element = self.decrypt_container(source, destination, encrypted_id, scope, "name ID")?;
        NameId::from_element(&element)
    }

    fn decrypt_container(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        container: &Element,
        scope: &NsScope,
        what: &str,
    ) -> SamlResult<Element> {
        let parts = EncryptedDataParts::from_container(container)?;
        let method = parts.method.as_deref().map(BlockAlgorithm::from_uri).transpose()?;
        let candidates = self.keys.decryption_keys(source, destination, method)?;
        let blacklist = self.keys.blacklisted_algorithms(source, destination)?;
        let scope = container.inner_scope(scope);

        try_each(what, candidates, |key| {
            decrypt_with_key(&parts, &key, &blacklist, &scope).map(Some)
        })
        .or_else(|last| last.unwrap_or_else(no_candidates))
    }
}

fn no_candidates() -> SamlError {
    SamlError::Decryption("no decryption keys available".to_string())
}

/// One decryption attempt with a single candidate key.
fn decrypt_with_key(
    parts: &EncryptedDataParts,
    key: &DecryptionKey,
    blacklist: &[String],
    scope: &NsScope,
) -> SamlResult<Element> {
    let check = |uri: &str| {
        if blacklist.iter().any(|b| b == uri) {
            Err(SamlError::BlacklistedAlgorithm(uri.to_string()))
        } else {
            Ok(())
        }
    };

    let declared = parts.method.as_deref().map(BlockAlgorithm::from_uri).transpose()?;
    let (algorithm, session_key) = match key {
        DecryptionKey::Shared { algorithm, key } => (declared.unwrap_or(*algorithm), key.clone()),
        DecryptionKey::Private(private_key) => {
            let wrapped = parts
                .encrypted_key
                .as_ref()
                .ok_or_else(|| SamlError::Decryption("no EncryptedKey to unwrap".to_string()))?;
            check(&wrapped.algorithm)?;
            let transport = KeyTransportAlgorithm::from_uri(&wrapped.algorithm)?;
            let algorithm = declared
                .ok_or_else(|| SamlError::Decryption("EncryptedData declares no EncryptionMethod".to_string()))?;
            let session_key = cipher::unwrap_key(transport, private_key, &wrapped.cipher_value)
                .map_err(|e| SamlError::Decryption(e.to_string()))?;
            (algorithm, session_key)
        }
    };
    check(algorithm.uri())?;

    let plaintext = cipher::decrypt(algorithm, &session_key, &parts.cipher_value)
        .map_err(|e| SamlError::Decryption(e.to_string()))?;
    let xml = String::from_utf8(plaintext)
        .map_err(|_| SamlError::Decryption("decrypted data is not UTF-8".to_string()))?;
    parse_fragment(&xml, scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FederationConfig;
    use crate::encryption::{EncryptedDataParts, EncryptedKeyParts, Encryptor};
    use crate::types::Subject;
    use chrono::Utc;
    use fed_crypto::keys::{generate_self_signed, KeyPair};
    use std::sync::OnceLock;

    fn sp_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| generate_self_signed("decrypt-sp", 2048).unwrap())
    }

    fn new_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| generate_self_signed("decrypt-sp-new", 2048).unwrap())
    }

    fn keys() -> KeyResolver {
        KeyResolver::new(&FederationConfig::default())
    }

    fn idp() -> EntityConfig {
        EntityConfig::new("https://idp.example.com")
    }

    /// SP metadata as the IdP sees it.
    fn sp_remote(pair: &KeyPair) -> EntityConfig {
        EntityConfig::new("https://sp.example.com").with("certData", pair.certificate_data().unwrap())
    }

    /// SP hosted configuration.
    fn sp_hosted() -> EntityConfig {
        EntityConfig::new("https://sp.example.com").with("privatekey", sp_pair().private_key_pem().unwrap())
    }

    fn assertion() -> Assertion {
        let mut assertion = Assertion::new("https://idp.example.com", Utc::now());
        assertion.subject = Some(Subject::new(NameId::transient("_user")));
        assertion
    }

    #[test]
    fn assertion_round_trip_with_certificate() {
        let keys = keys();
        let encrypted = Encryptor::new(&keys)
            .encrypt_assertion(&assertion().to_element(), &sp_remote(sp_pair()))
            .unwrap();

        let decrypted = Decryptor::new(&keys)
            .decrypt_assertion(&idp(), &sp_hosted(), &encrypted, &NsScope::new())
            .unwrap();
        let parsed = Assertion::from_element(&decrypted).unwrap();
        assert_eq!(parsed.name_id().map(|n| n.value.as_str()), Some("_user"));
    }

    #[test]
    fn rollover_key_is_tried_first_and_current_key_still_works() {
        let keys = keys();
        let encrypted = Encryptor::new(&keys)
            .encrypt_assertion(&assertion().to_element(), &sp_remote(sp_pair()))
            .unwrap();
        let sp = sp_hosted().with("new_privatekey", new_pair().private_key_pem().unwrap());

        assert!(Decryptor::new(&keys)
            .decrypt_assertion(&idp(), &sp, &encrypted, &NsScope::new())
            .is_ok());
    }

    #[test]
    fn wrong_key_is_wrapped_as_assertion_error() {
        let keys = keys();
        let encrypted = Encryptor::new(&keys)
            .encrypt_assertion(&assertion().to_element(), &sp_remote(new_pair()))
            .unwrap();

        let err = Decryptor::new(&keys)
            .decrypt_assertion(&idp(), &sp_hosted(), &encrypted, &NsScope::new())
            .unwrap_err();
        assert!(matches!(err, SamlError::DecryptAssertion(_)));
        assert!(err.to_string().starts_with("error decrypting assertion"));
    }

    #[test]
    fn plaintext_assertion_with_encryption_required() {
        let keys = keys();
        let decryptor = Decryptor::new(&keys);
        let plain = assertion().to_element();

        assert!(decryptor.decrypt_assertion(&idp(), &sp_hosted(), &plain, &NsScope::new()).is_ok());

        let sp = sp_hosted().with("assertion.encryption", true);
        assert!(matches!(
            decryptor.decrypt_assertion(&idp(), &sp, &plain, &NsScope::new()),
            Err(SamlError::UnencryptedAssertion)
        ));
    }

    #[test]
    fn rsa_1_5_is_blacklisted_by_default() {
        let keys = keys();
        let plaintext = assertion().to_element().to_xml();
        let session_key = cipher::generate_key(BlockAlgorithm::Aes128Cbc);
        let public_key = sp_pair().certificate.public_key().unwrap();
        let parts = EncryptedDataParts {
            method: Some(BlockAlgorithm::Aes128Cbc.uri().to_string()),
            encrypted_key: Some(EncryptedKeyParts {
                algorithm: KeyTransportAlgorithm::Rsa15.uri().to_string(),
                cipher_value: cipher::wrap_key(KeyTransportAlgorithm::Rsa15, &public_key, &session_key).unwrap(),
            }),
            cipher_value: cipher::encrypt(BlockAlgorithm::Aes128Cbc, &session_key, plaintext.as_bytes()).unwrap(),
        };
        let encrypted = Element::new(SAML_NS, "saml:EncryptedAssertion").with_child(parts.to_element());

        let err = Decryptor::new(&keys)
            .decrypt_assertion(&idp(), &sp_hosted(), &encrypted, &NsScope::new())
            .unwrap_err();
        let SamlError::DecryptAssertion(inner) = err else {
            panic!("expected DecryptAssertion, got {err:?}");
        };
        assert!(matches!(*inner, SamlError::BlacklistedAlgorithm(_)));

        let permissive = sp_hosted().with("encryption.blacklisted-algorithms", Vec::<String>::new());
        assert!(Decryptor::new(&keys)
            .decrypt_assertion(&idp(), &permissive, &encrypted, &NsScope::new())
            .is_ok());
    }

    #[test]
    fn attributes_are_decrypted_in_place() {
        let keys = keys();
        let encryptor = Encryptor::new(&keys);
        let mut assertion = assertion();
        assertion.attributes.push(Attribute::new("plain", vec!["p".into()]));
        assertion.encrypted_attributes.push(
            encryptor
                .encrypt_attribute(&Attribute::new("mail", vec!["a@example.com".into()]), &sp_remote(sp_pair()))
                .unwrap(),
        );

        Decryptor::new(&keys)
            .decrypt_attributes(&idp(), &sp_hosted(), &mut assertion, &NsScope::new())
            .unwrap();
        assert!(assertion.encrypted_attributes.is_empty());
        assert_eq!(assertion.attribute_values("mail"), Some(&["a@example.com".to_string()][..]));
        assert_eq!(assertion.attribute_values("plain"), Some(&["p".to_string()][..]));
    }

    #[test]
    fn undecryptable_attributes() {
        let keys = keys();
        let mut assertion = assertion();
        assertion.encrypted_attributes.push(
            Encryptor::new(&keys)
                .encrypt_attribute(&Attribute::new("mail", vec!["x".into()]), &sp_remote(new_pair()))
                .unwrap(),
        );
        let err = Decryptor::new(&keys)
            .decrypt_attributes(&idp(), &sp_hosted(), &mut assertion, &NsScope::new())
            .unwrap_err();
        assert!(matches!(err, SamlError::DecryptAttributes(_)));
    }

    #[test]
    fn name_id_with_shared_key() {
        let keys = keys();
        let shared = "0123456789abcdef";
        let sp_remote = EntityConfig::new("https://sp.example.com")
            .with("sharedkey", shared)
            .with("sharedkey_algorithm", BlockAlgorithm::Aes128Gcm.uri());
        let idp = idp().with("sharedkey", shared);

        let mut assertion = assertion();
        let encrypted = Encryptor::new(&keys)
            .encrypt_identifier(&NameId::persistent("alice"), &sp_remote)
            .unwrap();
        if let Some(subject) = assertion.subject.as_mut() {
            subject.name_id = None;
            subject.encrypted_id = Some(encrypted);
        }

        Decryptor::new(&keys)
            .decrypt_name_id(&idp, &sp_hosted(), &mut assertion, &NsScope::new())
            .unwrap();
        assert_eq!(assertion.name_id().map(|n| n.value.as_str()), Some("alice"));
        assert!(assertion.subject.unwrap().encrypted_id.is_none());
    }

    #[test]
    fn name_id_failure_is_not_wrapped() {
        let keys = keys();
        let encrypted = Encryptor::new(&keys)
            .encrypt_identifier(&NameId::persistent("alice"), &sp_remote(new_pair()))
            .unwrap();
        let err = Decryptor::new(&keys)
            .decrypt_identifier(&idp(), &sp_hosted(), &encrypted, &NsScope::new())
            .unwrap_err();
        assert!(matches!(err, SamlError::Decryption(_)));
    }
}
