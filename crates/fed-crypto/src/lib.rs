//! # fed-crypto
//!
//! Cryptographic primitives for the federation SAML engine, backed by OpenSSL.
//!
//! The protocol layer never touches OpenSSL directly for anything beyond
//! key handles; it goes through the functions in this crate:
//!
//! - [`algorithm`] - XML-DSig / XML-Enc algorithm identifiers
//! - [`hash`] - message digests
//! - [`signature`] - RSA PKCS#1 v1.5 signatures
//! - [`cipher`] - block encryption and RSA key transport
//! - [`keys`] - PEM/DER loading of private keys and certificates
//! - [`random`] - session keys, IVs and identifiers
//!
//! ## Algorithm policy
//!
//! SHA-1 based algorithms and RSA PKCS#1 v1.5 key transport are supported for
//! interoperability only; callers decide whether to accept them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod cipher;
pub mod error;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signature;

pub use algorithm::{BlockAlgorithm, HashAlgorithm, KeyTransportAlgorithm, SignatureAlgorithm};
pub use error::{CryptoError, CryptoResult};
pub use openssl::pkey::{PKey, Private, Public};
pub use openssl::x509::X509;
