//! Algorithm identifiers used by XML Signature and XML Encryption.
//!
//! Every algorithm is identified on the wire by a URI; the enums here map
//! those URIs to the OpenSSL primitives that implement them.

use openssl::hash::MessageDigest;
use openssl::symm::Cipher;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// Digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-1 (legacy).
    #[serde(rename = "SHA1")]
    Sha1,

    /// SHA-256.
    #[serde(rename = "SHA256")]
    Sha256,

    /// SHA-384.
    #[serde(rename = "SHA384")]
    Sha384,

    /// SHA-512.
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashAlgorithm {
    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the XML-DSig digest method URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses a digest method URI.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownAlgorithm`] for unrecognised URIs.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#sha1" => Ok(Self::Sha1),
            "http://www.w3.org/2001/04/xmlenc#sha256" => Ok(Self::Sha256),
            "http://www.w3.org/2001/04/xmldsig-more#sha384" => Ok(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" => Ok(Self::Sha512),
            _ => Err(CryptoError::UnknownAlgorithm(uri.to_string())),
        }
    }

    pub(crate) fn message_digest(self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Sha384 => MessageDigest::sha384(),
            Self::Sha512 => MessageDigest::sha512(),
        }
    }
}

/// RSA signature algorithms (PKCS#1 v1.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-1 (deprecated).
    #[serde(rename = "RSA-SHA1")]
    RsaSha1,

    /// RSA with SHA-256.
    #[default]
    #[serde(rename = "RSA-SHA256")]
    RsaSha256,

    /// RSA with SHA-384.
    #[serde(rename = "RSA-SHA384")]
    RsaSha384,

    /// RSA with SHA-512.
    #[serde(rename = "RSA-SHA512")]
    RsaSha512,
}

impl SignatureAlgorithm {
    /// Returns the XML-DSig signature method URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Parses a signature method URI.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownAlgorithm`] for unrecognised URIs.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#rsa-sha1" => Ok(Self::RsaSha1),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Ok(Self::RsaSha256),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" => Ok(Self::RsaSha384),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => Ok(Self::RsaSha512),
            _ => Err(CryptoError::UnknownAlgorithm(uri.to_string())),
        }
    }

    /// Returns the digest paired with this signature algorithm.
    ///
    /// Used for both the signature itself and the reference digest.
    #[must_use]
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::RsaSha1 => HashAlgorithm::Sha1,
            Self::RsaSha256 => HashAlgorithm::Sha256,
            Self::RsaSha384 => HashAlgorithm::Sha384,
            Self::RsaSha512 => HashAlgorithm::Sha512,
        }
    }

    /// Returns true for algorithms kept only for legacy peers.
    #[must_use]
    pub const fn is_deprecated(self) -> bool {
        matches!(self, Self::RsaSha1)
    }
}

/// Key transport algorithms wrapping a session key for a recipient certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyTransportAlgorithm {
    /// RSA-OAEP with MGF1/SHA-1.
    #[default]
    #[serde(rename = "RSA-OAEP-MGF1P")]
    RsaOaepMgf1p,

    /// RSA PKCS#1 v1.5 (weak; blacklisted by default at the protocol layer).
    #[serde(rename = "RSA-1_5")]
    Rsa15,
}

impl KeyTransportAlgorithm {
    /// Returns the XML-Enc URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaOaepMgf1p => "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p",
            Self::Rsa15 => "http://www.w3.org/2001/04/xmlenc#rsa-1_5",
        }
    }

    /// Parses an XML-Enc key transport URI.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownAlgorithm`] for unrecognised URIs.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p" => Ok(Self::RsaOaepMgf1p),
            "http://www.w3.org/2001/04/xmlenc#rsa-1_5" => Ok(Self::Rsa15),
            _ => Err(CryptoError::UnknownAlgorithm(uri.to_string())),
        }
    }
}

/// Block encryption algorithms for `EncryptedData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockAlgorithm {
    /// AES-128 in CBC mode.
    #[serde(rename = "AES-128-CBC")]
    Aes128Cbc,

    /// AES-192 in CBC mode.
    #[serde(rename = "AES-192-CBC")]
    Aes192Cbc,

    /// AES-256 in CBC mode.
    #[serde(rename = "AES-256-CBC")]
    Aes256Cbc,

    /// AES-128 in GCM mode.
    #[serde(rename = "AES-128-GCM")]
    Aes128Gcm,

    /// AES-192 in GCM mode.
    #[serde(rename = "AES-192-GCM")]
    Aes192Gcm,

    /// AES-256 in GCM mode.
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,

    /// Triple DES in CBC mode.
    #[serde(rename = "3DES-CBC")]
    TripleDesCbc,
}

impl BlockAlgorithm {
    /// Returns the XML-Enc URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::Aes192Cbc => "http://www.w3.org/2001/04/xmlenc#aes192-cbc",
            Self::Aes256Cbc => "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
            Self::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            Self::Aes192Gcm => "http://www.w3.org/2009/xmlenc11#aes192-gcm",
            Self::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
            Self::TripleDesCbc => "http://www.w3.org/2001/04/xmlenc#tripledes-cbc",
        }
    }

    /// Parses an XML-Enc block encryption URI.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownAlgorithm`] for unrecognised URIs.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#aes128-cbc" => Ok(Self::Aes128Cbc),
            "http://www.w3.org/2001/04/xmlenc#aes192-cbc" => Ok(Self::Aes192Cbc),
            "http://www.w3.org/2001/04/xmlenc#aes256-cbc" => Ok(Self::Aes256Cbc),
            "http://www.w3.org/2009/xmlenc11#aes128-gcm" => Ok(Self::Aes128Gcm),
            "http://www.w3.org/2009/xmlenc11#aes192-gcm" => Ok(Self::Aes192Gcm),
            "http://www.w3.org/2009/xmlenc11#aes256-gcm" => Ok(Self::Aes256Gcm),
            "http://www.w3.org/2001/04/xmlenc#tripledes-cbc" => Ok(Self::TripleDesCbc),
            _ => Err(CryptoError::UnknownAlgorithm(uri.to_string())),
        }
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes192Cbc | Self::Aes192Gcm | Self::TripleDesCbc => 24,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }

    /// Returns the IV length in bytes as carried in front of the ciphertext.
    #[must_use]
    pub const fn iv_len(self) -> usize {
        match self {
            Self::Aes128Gcm | Self::Aes192Gcm | Self::Aes256Gcm => 12,
            Self::TripleDesCbc => 8,
            Self::Aes128Cbc | Self::Aes192Cbc | Self::Aes256Cbc => 16,
        }
    }

    /// Returns the cipher block size in bytes.
    #[must_use]
    pub const fn block_len(self) -> usize {
        match self {
            Self::TripleDesCbc => 8,
            _ => 16,
        }
    }

    /// Returns true for authenticated (GCM) modes.
    #[must_use]
    pub const fn is_aead(self) -> bool {
        matches!(self, Self::Aes128Gcm | Self::Aes192Gcm | Self::Aes256Gcm)
    }

    pub(crate) fn cipher(self) -> Cipher {
        match self {
            Self::Aes128Cbc => Cipher::aes_128_cbc(),
            Self::Aes192Cbc => Cipher::aes_192_cbc(),
            Self::Aes256Cbc => Cipher::aes_256_cbc(),
            Self::Aes128Gcm => Cipher::aes_128_gcm(),
            Self::Aes192Gcm => Cipher::aes_192_gcm(),
            Self::Aes256Gcm => Cipher::aes_256_gcm(),
            Self::TripleDesCbc => Cipher::des_ede3_cbc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_uris_roundtrip() {
        for alg in [
            SignatureAlgorithm::RsaSha1,
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha384,
            SignatureAlgorithm::RsaSha512,
        ] {
            assert_eq!(SignatureAlgorithm::from_uri(alg.uri()).unwrap(), alg);
        }
    }

    #[test]
    fn default_signature_is_rsa_sha256() {
        assert_eq!(SignatureAlgorithm::default(), SignatureAlgorithm::RsaSha256);
        assert_eq!(
            SignatureAlgorithm::default().hash_algorithm(),
            HashAlgorithm::Sha256
        );
    }

    #[test]
    fn unknown_uri_is_rejected() {
        assert!(matches!(
            BlockAlgorithm::from_uri("urn:nope"),
            Err(CryptoError::UnknownAlgorithm(_))
        ));
        assert!(KeyTransportAlgorithm::from_uri("urn:nope").is_err());
    }

    #[test]
    fn block_parameters() {
        assert_eq!(BlockAlgorithm::Aes128Gcm.key_len(), 16);
        assert_eq!(BlockAlgorithm::Aes128Gcm.iv_len(), 12);
        assert!(BlockAlgorithm::Aes256Gcm.is_aead());
        assert_eq!(BlockAlgorithm::TripleDesCbc.block_len(), 8);
        assert!(!BlockAlgorithm::Aes128Cbc.is_aead());
    }
}
