//! End-to-end scenarios for `fed-saml` live under `tests/`.
