//! RSA signatures.

use openssl::pkey::{HasPublic, PKey, PKeyRef, Private};
use openssl::sign::{Signer, Verifier};

use crate::algorithm::SignatureAlgorithm;
use crate::error::{CryptoError, CryptoResult};

/// Signs `data` with an RSA private key.
///
/// # Errors
///
/// Returns [`CryptoError::Signing`] if the key cannot be used for the algorithm.
pub fn sign(
    algorithm: SignatureAlgorithm,
    key: &PKey<Private>,
    data: &[u8],
) -> CryptoResult<Vec<u8>> {
    let md = algorithm.hash_algorithm().message_digest();
    let mut signer = Signer::new(md, key).map_err(|e| CryptoError::Signing(e.to_string()))?;
    signer
        .update(data)
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
    signer
        .sign_to_vec()
        .map_err(|e| CryptoError::Signing(e.to_string()))
}

/// Verifies a signature over `data`.
///
/// Accepts any key handle carrying a public component, so a private key can
/// verify its own signatures.
///
/// # Errors
///
/// Returns [`CryptoError::Verification`] when the signature does not match and
/// an OpenSSL error when the key is unusable.
pub fn verify<T: HasPublic>(
    algorithm: SignatureAlgorithm,
    key: &PKeyRef<T>,
    data: &[u8],
    signature: &[u8],
) -> CryptoResult<()> {
    let md = algorithm.hash_algorithm().message_digest();
    let mut verifier = Verifier::new(md, key)?;
    verifier.update(data)?;
    if verifier.verify(signature).unwrap_or(false) {
        Ok(())
    } else {
        Err(CryptoError::Verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_self_signed;

    #[test]
    fn sign_and_verify() {
        let pair = generate_self_signed("signer", 2048).unwrap();
        let signature = sign(SignatureAlgorithm::RsaSha256, &pair.private_key, b"payload").unwrap();

        let public = pair.certificate.public_key().unwrap();
        verify(SignatureAlgorithm::RsaSha256, &public, b"payload", &signature).unwrap();
    }

    #[test]
    fn tampered_data_fails() {
        let pair = generate_self_signed("signer", 2048).unwrap();
        let signature = sign(SignatureAlgorithm::RsaSha512, &pair.private_key, b"payload").unwrap();

        let public = pair.certificate.public_key().unwrap();
        let result = verify(SignatureAlgorithm::RsaSha512, &public, b"payload!", &signature);
        assert!(matches!(result, Err(CryptoError::Verification)));
    }

    #[test]
    fn other_key_fails() {
        let a = generate_self_signed("a", 2048).unwrap();
        let b = generate_self_signed("b", 2048).unwrap();
        let signature = sign(SignatureAlgorithm::RsaSha256, &a.private_key, b"payload").unwrap();

        let public = b.certificate.public_key().unwrap();
        assert!(verify(SignatureAlgorithm::RsaSha256, &public, b"payload", &signature).is_err());
    }
}
