//! Block encryption and RSA key transport as used by XML Encryption.
//!
//! Ciphertexts use the XML-Enc layout: `IV || ciphertext` for CBC modes
//! (ISO 10126 padding) and `IV || ciphertext || tag` for GCM modes.

use openssl::encrypt::{Decrypter, Encrypter};
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private};
use openssl::rsa::Padding;
use openssl::symm::{self, Crypter, Mode};

use crate::algorithm::{BlockAlgorithm, KeyTransportAlgorithm};
use crate::error::{CryptoError, CryptoResult};
use crate::random::random_bytes;

const GCM_TAG_LEN: usize = 16;

/// Generates a random session key sized for `algorithm`.
#[must_use]
pub fn generate_key(algorithm: BlockAlgorithm) -> Vec<u8> {
    random_bytes(algorithm.key_len())
}

/// Encrypts `plaintext`, returning `IV || ciphertext [|| tag]`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the key length does not match the
/// algorithm, or [`CryptoError::Cipher`] when encryption fails.
pub fn encrypt(algorithm: BlockAlgorithm, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    check_key(algorithm, key)?;
    let iv = random_bytes(algorithm.iv_len());

    let mut out = iv.clone();
    if algorithm.is_aead() {
        let mut tag = [0u8; GCM_TAG_LEN];
        let ciphertext = symm::encrypt_aead(algorithm.cipher(), key, Some(&iv), &[], plaintext, &mut tag)
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
    } else {
        let padded = iso10126_pad(plaintext, algorithm.block_len());
        let ciphertext = run_crypter(algorithm, Mode::Encrypt, key, &iv, &padded)?;
        out.extend_from_slice(&ciphertext);
    }
    Ok(out)
}

/// Decrypts `IV || ciphertext [|| tag]`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] for a key of the wrong length and
/// [`CryptoError::Cipher`] for truncated input, bad padding or a tag mismatch.
pub fn decrypt(algorithm: BlockAlgorithm, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    check_key(algorithm, key)?;
    let iv_len = algorithm.iv_len();

    if algorithm.is_aead() {
        if data.len() < iv_len + GCM_TAG_LEN {
            return Err(CryptoError::Cipher("ciphertext too short".to_string()));
        }
        let (iv, rest) = data.split_at(iv_len);
        let (ciphertext, tag) = rest.split_at(rest.len() - GCM_TAG_LEN);
        return symm::decrypt_aead(algorithm.cipher(), key, Some(iv), &[], ciphertext, tag)
            .map_err(|_| CryptoError::Cipher("authentication tag mismatch".to_string()));
    }

    let block = algorithm.block_len();
    if data.len() < iv_len + block || (data.len() - iv_len) % block != 0 {
        return Err(CryptoError::Cipher("ciphertext length is not a multiple of the block size".to_string()));
    }
    let (iv, ciphertext) = data.split_at(iv_len);
    let mut plaintext = run_crypter(algorithm, Mode::Decrypt, key, iv, ciphertext)?;

    let pad = usize::from(plaintext.last().copied().unwrap_or(0));
    if pad == 0 || pad > block || pad > plaintext.len() {
        return Err(CryptoError::Cipher("invalid padding".to_string()));
    }
    plaintext.truncate(plaintext.len() - pad);
    Ok(plaintext)
}

/// Wraps a session key for the holder of `public_key`.
///
/// # Errors
///
/// Returns [`CryptoError::KeyTransport`] if the key cannot be wrapped.
pub fn wrap_key<T: HasPublic>(
    algorithm: KeyTransportAlgorithm,
    public_key: &PKeyRef<T>,
    session_key: &[u8],
) -> CryptoResult<Vec<u8>> {
    let mut encrypter = Encrypter::new(public_key)?;
    encrypter.set_rsa_padding(padding(algorithm))?;
    let len = encrypter.encrypt_len(session_key)?;
    let mut out = vec![0u8; len];
    let written = encrypter
        .encrypt(session_key, &mut out)
        .map_err(|e| CryptoError::KeyTransport(e.to_string()))?;
    out.truncate(written);
    Ok(out)
}

/// Unwraps a session key with `private_key`.
///
/// # Errors
///
/// Returns [`CryptoError::KeyTransport`] if the wrapped key was not produced
/// for this private key.
pub fn unwrap_key(
    algorithm: KeyTransportAlgorithm,
    private_key: &PKey<Private>,
    wrapped: &[u8],
) -> CryptoResult<Vec<u8>> {
    let mut decrypter = Decrypter::new(private_key)?;
    decrypter.set_rsa_padding(padding(algorithm))?;
    let len = decrypter.decrypt_len(wrapped)?;
    let mut out = vec![0u8; len];
    let written = decrypter
        .decrypt(wrapped, &mut out)
        .map_err(|e| CryptoError::KeyTransport(e.to_string()))?;
    out.truncate(written);
    Ok(out)
}

fn padding(algorithm: KeyTransportAlgorithm) -> Padding {
    match algorithm {
        KeyTransportAlgorithm::RsaOaepMgf1p => Padding::PKCS1_OAEP,
        KeyTransportAlgorithm::Rsa15 => Padding::PKCS1,
    }
}

fn check_key(algorithm: BlockAlgorithm, key: &[u8]) -> CryptoResult<()> {
    if key.len() == algorithm.key_len() {
        Ok(())
    } else {
        Err(CryptoError::InvalidKey(format!(
            "{} expects a {}-byte key, got {} bytes",
            algorithm.uri(),
            algorithm.key_len(),
            key.len()
        )))
    }
}

fn run_crypter(
    algorithm: BlockAlgorithm,
    mode: Mode,
    key: &[u8],
    iv: &[u8],
    input: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = algorithm.cipher();
    let mut crypter = Crypter::new(cipher, mode, key, Some(iv))?;
    crypter.pad(false);
    let mut out = vec![0u8; input.len() + cipher.block_size()];
    let mut count = crypter
        .update(input, &mut out)
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    count += crypter
        .finalize(&mut out[count..])
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    out.truncate(count);
    Ok(out)
}

/// ISO 10126: random filler, last byte holds the pad length (1..=block).
fn iso10126_pad(data: &[u8], block: usize) -> Vec<u8> {
    let pad = block - data.len() % block;
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.extend(random_bytes(pad - 1));
    // pad <= block <= 16
    out.push(pad as u8);
    out
}
