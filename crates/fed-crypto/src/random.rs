//! Cryptographically secure random generation.
//!
//! Used for IVs, session keys, ISO 10126 padding and protocol message IDs.

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Generates `len` cryptographically secure random bytes.
///
/// Uses the thread-local random number generator which is cryptographically
/// secure by default.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a random alphanumeric string of `len` characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates an XML `ID` value for a protocol message.
///
/// IDs must be valid `xs:ID` (NCName), so they start with an underscore
/// followed by 160 bits of hex-encoded randomness.
#[must_use]
pub fn message_id() -> String {
    let bytes = random_bytes(20);
    let mut id = String::with_capacity(41);
    id.push('_');
    for b in bytes {
        id.push_str(&format!("{b:02x}"));
    }
    id
}
