//! Error type for cryptographic operations.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Algorithm URI not recognised.
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Key could not be parsed or does not fit the algorithm.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Block cipher failure (bad padding, authentication tag mismatch, ...).
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Key wrapping or unwrapping failed.
    #[error("key transport error: {0}")]
    KeyTransport(String),

    /// Error reported by OpenSSL.
    #[error("openssl: {0}")]
    Openssl(#[from] openssl::error::ErrorStack),
}
