//! Key resolution.
//!
//! [`KeyResolver`] turns the key options of an entity into key material:
//! private keys from a file, a database row or inline PEM; certificates
//! from published key entries or certificate files; shared symmetric keys.
//! Key material is resolved per call and never cached.

mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fed_crypto::keys::{pem_body, pem_from_base64, private_key_from_pem, public_key_from_pem};
use fed_crypto::{BlockAlgorithm, KeyTransportAlgorithm, PKey, Private, Public};
use tracing::debug;

pub use storage::{FileKeyStorage, KeyDatabase, KeyStorage, KeyTable, MemoryKeyDatabase};

use crate::config::{EntityConfig, FederationConfig, KeyUsage, MetadataView, PublicKeyEntry, Side};
use crate::error::{SamlError, SamlResult};

const FILE_SCHEME: &str = "file://";
const DATABASE_SCHEME: &str = "pdo://";

/// Raw key material as loaded from its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// PEM-encoded key or certificate.
    pub pem: Vec<u8>,

    /// Passphrase of an encrypted private key.
    pub password: Option<String>,

    /// Base64 DER certificate data, for certificates.
    pub cert_data: Option<String>,

    /// Key name from metadata.
    pub name: Option<String>,
}

impl KeyMaterial {
    /// Parses the material as a private key.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if the PEM or passphrase is wrong.
    pub fn private_key(&self) -> SamlResult<PKey<Private>> {
        Ok(private_key_from_pem(&self.pem, self.password.as_deref())?)
    }

    /// Parses the material as a certificate or public key.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if the PEM does not hold a public key.
    pub fn public_key(&self) -> SamlResult<PKey<Public>> {
        Ok(public_key_from_pem(&self.pem)?)
    }
}

/// Key used to encrypt for a recipient.
#[derive(Debug, Clone)]
pub enum EncryptionKey {
    /// Pre-distributed symmetric key.
    Shared {
        /// Block algorithm.
        algorithm: BlockAlgorithm,
        /// Raw key bytes.
        key: Vec<u8>,
    },
    /// Recipient certificate for key transport.
    Public {
        /// Key transport algorithm.
        transport: KeyTransportAlgorithm,
        /// Recipient public key.
        public_key: PKey<Public>,
    },
}

/// Candidate key for decrypting received data.
#[derive(Debug, Clone)]
pub enum DecryptionKey {
    /// Pre-distributed symmetric key.
    Shared {
        /// Block algorithm.
        algorithm: BlockAlgorithm,
        /// Raw key bytes.
        key: Vec<u8>,
    },
    /// Own RSA private key.
    Private(PKey<Private>),
}

/// Resolves key options to key material.
#[derive(Clone)]
pub struct KeyResolver {
    cert_dir: PathBuf,
    key_table: KeyTable,
    storage: Arc<dyn KeyStorage>,
    database: Option<Arc<dyn KeyDatabase>>,
}

impl std::fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver")
            .field("cert_dir", &self.cert_dir)
            .field("key_table", &self.key_table)
            .field("database", &self.database.is_some())
            .finish_non_exhaustive()
    }
}

impl KeyResolver {
    /// Creates a resolver reading files below `config.certdir`.
    #[must_use]
    pub fn new(config: &FederationConfig) -> Self {
        Self {
            cert_dir: config.certdir.clone(),
            key_table: config.keystore.clone(),
            storage: Arc::new(FileKeyStorage),
            database: None,
        }
    }

    /// Replaces the file storage backend.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn KeyStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Enables `pdo://` locations.
    #[must_use]
    pub fn with_database(mut self, database: Arc<dyn KeyDatabase>) -> Self {
        self.database = Some(database);
        self
    }

    /// Returns the certificate directory.
    #[must_use]
    pub fn cert_dir(&self) -> &Path {
        &self.cert_dir
    }

    /// Loads the private key named by `<prefix>privatekey`.
    ///
    /// The location is a path (relative to the certificate directory unless
    /// absolute or `full_path`), a `file://` path, a `pdo://<id>` database
    /// reference or inline PEM. `<prefix>privatekey_pass` is the passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::KeyNotFound`] if `required` and unset, or
    /// [`SamlError::KeyLoadFailed`] if the location cannot be read.
    pub fn load_private_key(
        &self,
        config: &EntityConfig,
        required: bool,
        prefix: &str,
        full_path: bool,
    ) -> SamlResult<Option<KeyMaterial>> {
        let key = format!("{prefix}privatekey");
        let Some(location) = config.get_optional_string(&key, None)? else {
            if required {
                return Err(SamlError::KeyNotFound(format!(
                    "no private key '{key}' configured for '{}'",
                    config.entity_id()
                )));
            }
            return Ok(None);
        };

        let pem = self.read_location(&location, full_path)?;
        Ok(Some(KeyMaterial {
            pem,
            password: config.get_optional_string(&format!("{prefix}privatekey_pass"), None)?,
            cert_data: None,
            name: None,
        }))
    }

    /// Loads the first signing certificate of an entity.
    ///
    /// Published key entries are preferred over a `<prefix>certificate` file.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::KeyNotFound`] if `required` and nothing is found.
    pub fn load_public_key(
        &self,
        config: &EntityConfig,
        required: bool,
        prefix: &str,
    ) -> SamlResult<Option<KeyMaterial>> {
        let published = config
            .get_public_keys(Some(KeyUsage::Signing), false, prefix)?
            .into_iter()
            .find(PublicKeyEntry::is_certificate);
        if let Some(entry) = published {
            return Ok(Some(certificate_material(entry.certificate_data, entry.name)));
        }

        if let Some(data) = self.certificate_file_data(config, prefix)? {
            return Ok(Some(certificate_material(data, None)));
        }

        if required {
            return Err(SamlError::KeyNotFound(format!(
                "no certificate configured for '{}'",
                config.entity_id()
            )));
        }
        Ok(None)
    }

    /// Returns the published public keys of an entity for `usage`.
    ///
    /// Falls back to a `<prefix>certificate` file when no keys are published.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::KeyNotFound`] if `required` and nothing is found.
    pub fn public_keys(
        &self,
        config: &EntityConfig,
        usage: Option<KeyUsage>,
        required: bool,
        prefix: &str,
    ) -> SamlResult<Vec<PublicKeyEntry>> {
        let mut keys = config.get_public_keys(usage, false, prefix)?;
        if keys.is_empty() {
            if let Some(data) = self.certificate_file_data(config, prefix)? {
                keys.push(PublicKeyEntry::certificate(data));
            }
        }
        if required && keys.is_empty() {
            return Err(SamlError::KeyNotFound(format!(
                "no public key in metadata for '{}'",
                config.entity_id()
            )));
        }
        Ok(keys)
    }

    /// Returns the key to encrypt data for `config`.
    ///
    /// A configured `sharedkey` wins (algorithm `sharedkey_algorithm`,
    /// default AES-128-CBC); otherwise the first encryption certificate is
    /// used with RSA-OAEP key transport.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::NoEncryptionKey`] if neither is available.
    pub fn encryption_key(&self, config: &EntityConfig) -> SamlResult<EncryptionKey> {
        if let Some(shared) = config.get_optional_string("sharedkey", None)? {
            let algorithm = config
                .get_optional_string("sharedkey_algorithm", Some(BlockAlgorithm::Aes128Cbc.uri()))?
                .map(|uri| BlockAlgorithm::from_uri(&uri))
                .transpose()?
                .unwrap_or(BlockAlgorithm::Aes128Cbc);
            return Ok(EncryptionKey::Shared {
                algorithm,
                key: shared.into_bytes(),
            });
        }

        let entry = self
            .public_keys(config, Some(KeyUsage::Encryption), false, "")?
            .into_iter()
            .find(PublicKeyEntry::is_certificate)
            .ok_or_else(|| SamlError::NoEncryptionKey(config.entity_id().to_string()))?;
        let pem = pem_from_base64("CERTIFICATE", &entry.certificate_data);
        Ok(EncryptionKey::Public {
            transport: KeyTransportAlgorithm::RsaOaepMgf1p,
            public_key: public_key_from_pem(pem.as_bytes())?,
        })
    }

    /// Returns the ordered decryption candidates for data sent by `source`
    /// to `destination`.
    ///
    /// With a shared key the algorithm is the declared `method`, else the
    /// source's `sharedkey_algorithm`, else the destination's, else
    /// AES-128-GCM. Otherwise the destination's rollover key
    /// (`new_privatekey`) comes before its current key.
    ///
    /// # Errors
    ///
    /// Returns a key resolution error if the current private key is missing
    /// or unreadable.
    pub fn decryption_keys(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        method: Option<BlockAlgorithm>,
    ) -> SamlResult<Vec<DecryptionKey>> {
        if let Some(shared) = source.get_optional_string("sharedkey", None)? {
            let algorithm = match method {
                Some(declared) => declared,
                None => MetadataView::new(source, destination)
                    .first_string(&[
                        (Side::Source, "sharedkey_algorithm"),
                        (Side::Destination, "sharedkey_algorithm"),
                    ])?
                    .map(|uri| BlockAlgorithm::from_uri(&uri))
                    .transpose()?
                    .unwrap_or(BlockAlgorithm::Aes128Gcm),
            };
            return Ok(vec![DecryptionKey::Shared {
                algorithm,
                key: shared.into_bytes(),
            }]);
        }

        let mut keys = Vec::with_capacity(2);
        if let Some(rollover) = self.load_private_key(destination, false, "new_", false)? {
            debug!(entity_id = destination.entity_id(), "adding rollover decryption key");
            keys.push(DecryptionKey::Private(rollover.private_key()?));
        }
        if let Some(current) = self.load_private_key(destination, true, "", false)? {
            keys.push(DecryptionKey::Private(current.private_key()?));
        }
        Ok(keys)
    }

    /// Returns the algorithms that must not be accepted in data from
    /// `source`: `encryption.blacklisted-algorithms` of the source, else of
    /// the destination, else RSA-1_5.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] on a malformed option.
    pub fn blacklisted_algorithms(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
    ) -> SamlResult<Vec<String>> {
        let configured = MetadataView::new(source, destination).first_list(&[
            (Side::Source, "encryption.blacklisted-algorithms"),
            (Side::Destination, "encryption.blacklisted-algorithms"),
        ])?;
        Ok(configured.unwrap_or_else(|| vec![KeyTransportAlgorithm::Rsa15.uri().to_string()]))
    }

    /// Reads `<prefix>certificate` and returns its base64 body.
    fn certificate_file_data(&self, config: &EntityConfig, prefix: &str) -> SamlResult<Option<String>> {
        let Some(location) = config.get_optional_string(&format!("{prefix}certificate"), None)? else {
            return Ok(None);
        };
        let pem = self.read_location(&location, false)?;
        Ok(Some(pem_body(&String::from_utf8_lossy(&pem))))
    }

    fn read_location(&self, location: &str, full_path: bool) -> SamlResult<Vec<u8>> {
        if location.trim_start().starts_with("-----BEGIN") {
            return Ok(location.as_bytes().to_vec());
        }

        if let Some(id) = location.strip_prefix(DATABASE_SCHEME) {
            let database = self.database.as_ref().ok_or_else(|| SamlError::KeyLoadFailed {
                location: location.to_string(),
                reason: "no key database configured".to_string(),
            })?;
            return match database.fetch_key(&self.key_table, id) {
                Ok(Some(data)) => Ok(data),
                Ok(None) => Err(SamlError::KeyLoadFailed {
                    location: location.to_string(),
                    reason: "no such key".to_string(),
                }),
                Err(e) => Err(SamlError::KeyLoadFailed {
                    location: location.to_string(),
                    reason: e.to_string(),
                }),
            };
        }

        let path = location.strip_prefix(FILE_SCHEME).unwrap_or(location);
        let path = Path::new(path);
        let resolved = if full_path || path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cert_dir.join(path)
        };
        self.storage
            .read(&resolved)
            .map_err(|e| SamlError::KeyLoadFailed {
                location: resolved.display().to_string(),
                reason: e.to_string(),
            })
    }
}

fn certificate_material(data: String, name: Option<String>) -> KeyMaterial {
    KeyMaterial {
        pem: pem_from_base64("CERTIFICATE", &data).into_bytes(),
        password: None,
        cert_data: Some(data),
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fed_crypto::keys::{generate_self_signed, KeyPair};
    use std::sync::OnceLock;

    fn pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| generate_self_signed("keys-test", 2048).unwrap())
    }

    fn rollover() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| generate_self_signed("keys-rollover", 2048).unwrap())
    }

    fn resolver(dir: &Path) -> KeyResolver {
        let config = FederationConfig {
            certdir: dir.to_path_buf(),
            ..FederationConfig::default()
        };
        KeyResolver::new(&config)
    }

    #[test]
    fn relative_path_resolves_in_cert_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sp.pem"), pair().private_key_pem().unwrap()).unwrap();
        let sp = EntityConfig::new("sp").with("privatekey", "sp.pem");

        let key = resolver(dir.path()).load_private_key(&sp, true, "", false).unwrap().unwrap();
        assert!(key.private_key().is_ok());
    }

    #[test]
    fn file_scheme_and_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enc.pem");
        std::fs::write(&path, pair().encrypted_private_key_pem("secret").unwrap()).unwrap();
        let sp = EntityConfig::new("sp")
            .with("privatekey", format!("file://{}", path.display()))
            .with("privatekey_pass", "secret");

        let key = resolver(Path::new("/nonexistent"))
            .load_private_key(&sp, true, "", false)
            .unwrap()
            .unwrap();
        assert_eq!(key.password.as_deref(), Some("secret"));
        assert!(key.private_key().is_ok());
    }

    #[test]
    fn database_scheme() {
        let pem = pair().private_key_pem().unwrap();
        let db = MemoryKeyDatabase::new().with_key("sp-signing", pem.clone().into_bytes());
        let resolver = resolver(Path::new("cert")).with_database(Arc::new(db));
        let sp = EntityConfig::new("sp").with("signature.privatekey", "pdo://sp-signing");

        let key = resolver.load_private_key(&sp, true, "signature.", false).unwrap().unwrap();
        assert_eq!(key.pem, pem.into_bytes());

        let missing = EntityConfig::new("sp").with("privatekey", "pdo://other");
        assert!(matches!(
            resolver.load_private_key(&missing, true, "", false),
            Err(SamlError::KeyLoadFailed { .. })
        ));
    }

    #[test]
    fn absent_key_required_vs_optional() {
        let resolver = resolver(Path::new("cert"));
        let sp = EntityConfig::new("sp");
        assert!(resolver.load_private_key(&sp, false, "", false).unwrap().is_none());
        assert!(matches!(
            resolver.load_private_key(&sp, true, "", false),
            Err(SamlError::KeyNotFound(_))
        ));
    }

    #[test]
    fn unreadable_file_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sp = EntityConfig::new("sp").with("privatekey", "missing.pem");
        assert!(matches!(
            resolver(dir.path()).load_private_key(&sp, true, "", false),
            Err(SamlError::KeyLoadFailed { .. })
        ));
    }

    #[test]
    fn public_key_from_published_keys_or_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = pair().certificate_data().unwrap();
        let resolver = resolver(dir.path());

        let idp = EntityConfig::new("idp").with("certData", data.clone());
        let key = resolver.load_public_key(&idp, true, "").unwrap().unwrap();
        assert_eq!(key.cert_data.as_deref(), Some(data.as_str()));
        assert!(key.public_key().is_ok());

        std::fs::write(dir.path().join("idp.crt"), pair().certificate_pem().unwrap()).unwrap();
        let idp = EntityConfig::new("idp").with("certificate", "idp.crt");
        let key = resolver.load_public_key(&idp, true, "").unwrap().unwrap();
        assert_eq!(key.cert_data.as_deref(), Some(data.as_str()));

        assert!(resolver.load_public_key(&EntityConfig::new("x"), true, "").is_err());
    }

    #[test]
    fn encryption_key_prefers_shared_key() {
        let resolver = resolver(Path::new("cert"));
        let sp = EntityConfig::new("sp")
            .with("sharedkey", "0123456789abcdef")
            .with("certData", pair().certificate_data().unwrap());
        match resolver.encryption_key(&sp).unwrap() {
            EncryptionKey::Shared { algorithm, key } => {
                assert_eq!(algorithm, BlockAlgorithm::Aes128Cbc);
                assert_eq!(key, b"0123456789abcdef");
            }
            other => panic!("expected shared key, got {other:?}"),
        }

        let sp = EntityConfig::new("sp").with("certData", pair().certificate_data().unwrap());
        assert!(matches!(
            resolver.encryption_key(&sp).unwrap(),
            EncryptionKey::Public { transport: KeyTransportAlgorithm::RsaOaepMgf1p, .. }
        ));

        assert!(matches!(
            resolver.encryption_key(&EntityConfig::new("sp")),
            Err(SamlError::NoEncryptionKey(_))
        ));
    }

    #[test]
    fn decryption_keys_put_rollover_first() {
        let sp = EntityConfig::new("sp")
            .with("privatekey", pair().private_key_pem().unwrap())
            .with("new_privatekey", rollover().private_key_pem().unwrap());
        let idp = EntityConfig::new("idp");

        let keys = resolver(Path::new("cert")).decryption_keys(&idp, &sp, None).unwrap();
        assert_eq!(keys.len(), 2);
        let DecryptionKey::Private(first) = &keys[0] else {
            panic!("expected private key");
        };
        let expected = rollover().private_key.public_key_to_der().unwrap();
        assert_eq!(first.public_key_to_der().unwrap(), expected);
    }

    #[test]
    fn shared_decryption_algorithm_precedence() {
        let resolver = resolver(Path::new("cert"));
        let idp = EntityConfig::new("idp").with("sharedkey", "k");
        let sp = EntityConfig::new("sp").with("sharedkey_algorithm", BlockAlgorithm::Aes256Cbc.uri());

        let algorithm = |method| match &resolver.decryption_keys(&idp, &sp, method).unwrap()[0] {
            DecryptionKey::Shared { algorithm, .. } => *algorithm,
            DecryptionKey::Private(_) => panic!("expected shared key"),
        };
        assert_eq!(algorithm(Some(BlockAlgorithm::Aes128Cbc)), BlockAlgorithm::Aes128Cbc);
        assert_eq!(algorithm(None), BlockAlgorithm::Aes256Cbc);

        let bare = EntityConfig::new("sp");
        match &resolver.decryption_keys(&idp, &bare, None).unwrap()[0] {
            DecryptionKey::Shared { algorithm, .. } => assert_eq!(*algorithm, BlockAlgorithm::Aes128Gcm),
            DecryptionKey::Private(_) => panic!("expected shared key"),
        }
    }

    #[test]
    fn blacklist_defaults_to_rsa_1_5() {
        let resolver = resolver(Path::new("cert"));
        let idp = EntityConfig::new("idp");
        let sp = EntityConfig::new("sp");
        assert_eq!(
            resolver.blacklisted_algorithms(&idp, &sp).unwrap(),
            [KeyTransportAlgorithm::Rsa15.uri()]
        );

        let sp = sp.with("encryption.blacklisted-algorithms", Vec::<String>::new());
        assert!(resolver.blacklisted_algorithms(&idp, &sp).unwrap().is_empty());
    }
}
