//! End-to-end scenarios across the SP and IdP roles.
//!
//! Each scenario plays both sides in-process with freshly generated keys
//! and a frozen clock.

mod common;
mod logout;
mod metadata;
mod sso;
