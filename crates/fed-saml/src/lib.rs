//! SAML 2.0 protocol engine for identity federation.
//!
//! This crate builds, signs, validates and decrypts the protocol messages
//! exchanged between a Service Provider and an Identity Provider:
//!
//! - **AuthnRequest / LogoutRequest / LogoutResponse building** - from
//!   entity metadata and caller state, signed per policy
//! - **Response processing** - signature, decryption, validity window,
//!   audience and subject confirmation checks
//! - **Metadata generation** - `EntityDescriptor` documents, optionally signed
//! - **XML-DSig and XML-Enc** - exclusive C14N, enveloped and detached
//!   signatures, encrypted assertions, attributes and identifiers
//! - **HTTP-Redirect and HTTP-POST bindings**
//!
//! # Architecture
//!
//! - [`config`] - entity configuration and source/destination precedence
//! - [`keys`] - key and certificate resolution
//! - [`signing`] - signing policy for outgoing and received messages
//! - [`encryption`] - encryption and candidate-key decryption
//! - [`request`] - outgoing request builders
//! - [`processor`] - Response validation
//! - [`metadata`] - metadata documents
//! - [`federation`] - the [`Federation`] facade bundling the above
//!
//! # Example
//!
//! ```rust,ignore
//! use fed_saml::{EntityConfig, Federation, FederationConfig, ProcessingState, RequestContext};
//!
//! let federation = Federation::new(FederationConfig::load("federation.toml")?);
//! let request = federation.build_authn_request(&sp, &idp, &ProcessingState::default())?;
//! // ... redirect the browser, receive the Response ...
//! let assertions = federation.process_response(&sp, &idp, &RequestContext::new(acs_url), &response)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod candidates;
pub mod clock;
pub mod config;
pub mod context;
pub mod encryption;
pub mod error;
pub mod federation;
pub mod keys;
pub mod metadata;
pub mod processor;
pub mod request;
pub mod signature;
pub mod signing;
pub mod state;
pub mod types;
pub mod xml;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EntityConfig, FederationConfig};
pub use context::RequestContext;
pub use error::{SamlError, SamlResult};
pub use federation::Federation;
pub use request::{EncodedMessage, OutgoingMessage};
pub use state::ProcessingState;
pub use types::*;
