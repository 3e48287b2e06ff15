//! Loading and generating RSA keys and X.509 certificates.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use openssl::x509::{X509Builder, X509NameBuilder, X509};

use crate::error::{CryptoError, CryptoResult};

/// Parses a PEM private key, decrypting it with `passphrase` when given.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if the PEM is malformed or the
/// passphrase is wrong.
pub fn private_key_from_pem(pem: &[u8], passphrase: Option<&str>) -> CryptoResult<PKey<Private>> {
    let parsed = match passphrase {
        Some(pass) => PKey::private_key_from_pem_passphrase(pem, pass.as_bytes()),
        None => PKey::private_key_from_pem(pem),
    };
    parsed.map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Parses a PEM certificate.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if the PEM is not a certificate.
pub fn certificate_from_pem(pem: &[u8]) -> CryptoResult<X509> {
    X509::from_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Parses a DER certificate.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if the bytes are not a certificate.
pub fn certificate_from_der(der: &[u8]) -> CryptoResult<X509> {
    X509::from_der(der).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Extracts a public key from a PEM certificate or a PEM public key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if neither form parses.
pub fn public_key_from_pem(pem: &[u8]) -> CryptoResult<PKey<Public>> {
    if pem.windows(17).any(|w| w == b"BEGIN CERTIFICATE") {
        let cert = certificate_from_pem(pem)?;
        return cert
            .public_key()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()));
    }
    PKey::public_key_from_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Returns the base64 body of a PEM block (armor lines and whitespace removed).
#[must_use]
pub fn pem_body(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.chars().filter(|c| !c.is_whitespace()))
        .collect()
}

/// Wraps base64 data into a PEM block with 64 column lines.
#[must_use]
pub fn pem_from_base64(label: &str, body: &str) -> String {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pem = format!("-----BEGIN {label}-----\n");
    for chunk in compact.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

/// A private key with a matching self-signed certificate.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// RSA private key.
    pub private_key: PKey<Private>,
    /// Self-signed certificate for the key.
    pub certificate: X509,
}

impl KeyPair {
    /// Returns the private key as unencrypted PKCS#8 PEM.
    ///
    /// # Errors
    ///
    /// Returns an error if OpenSSL cannot serialize the key.
    pub fn private_key_pem(&self) -> CryptoResult<String> {
        let pem = self.private_key.private_key_to_pem_pkcs8()?;
        Ok(String::from_utf8_lossy(&pem).into_owned())
    }

    /// Returns the private key as PEM encrypted with AES-256-CBC.
    ///
    /// # Errors
    ///
    /// Returns an error if OpenSSL cannot serialize the key.
    pub fn encrypted_private_key_pem(&self, passphrase: &str) -> CryptoResult<String> {
        let pem = self
            .private_key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase.as_bytes())?;
        Ok(String::from_utf8_lossy(&pem).into_owned())
    }

    /// Returns the certificate as PEM.
    ///
    /// # Errors
    ///
    /// Returns an error if OpenSSL cannot serialize the certificate.
    pub fn certificate_pem(&self) -> CryptoResult<String> {
        let pem = self.certificate.to_pem()?;
        Ok(String::from_utf8_lossy(&pem).into_owned())
    }

    /// Returns the base64 DER body of the certificate, as published in metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if OpenSSL cannot serialize the certificate.
    pub fn certificate_data(&self) -> CryptoResult<String> {
        Ok(pem_body(&self.certificate_pem()?))
    }
}

/// Generates an RSA key and a self-signed certificate valid for one year.
///
/// # Errors
///
/// Returns an error if key generation or certificate signing fails.
pub fn generate_self_signed(common_name: &str, bits: u32) -> CryptoResult<KeyPair> {
    let rsa = Rsa::generate(bits)?;
    let private_key = PKey::from_rsa(rsa)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", common_name)?;
    let name = name.build();

    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&private_key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(365)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.sign(&private_key, MessageDigest::sha256())?;

    Ok(KeyPair {
        private_key,
        certificate: builder.build(),
    })
}
