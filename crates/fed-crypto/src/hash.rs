//! Message digests.

use crate::algorithm::HashAlgorithm;
use crate::error::CryptoResult;

/// Computes a digest of the input data.
///
/// # Errors
///
/// Returns an error if OpenSSL fails to compute the digest.
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> CryptoResult<Vec<u8>> {
    let bytes = openssl::hash::hash(algorithm.message_digest(), data)?;
    Ok(bytes.to_vec())
}

/// Computes a SHA-256 digest of the input data.
///
/// # Errors
///
/// Returns an error if OpenSSL fails to compute the digest.
pub fn sha256(data: &[u8]) -> CryptoResult<Vec<u8>> {
    digest(HashAlgorithm::Sha256, data)
}

/// Computes the lowercase hex SHA-1 fingerprint of a DER certificate.
///
/// # Errors
///
/// Returns an error if OpenSSL fails to compute the digest.
pub fn sha1_fingerprint(der: &[u8]) -> CryptoResult<String> {
    let bytes = digest(HashAlgorithm::Sha1, der)?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}
