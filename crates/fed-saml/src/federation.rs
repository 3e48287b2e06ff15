//! Entry points of the engine.

use std::sync::Arc;

use crate::bindings::ReceivedMessage;
use crate::clock::{Clock, SystemClock};
use crate::config::{EntityConfig, FederationConfig};
use crate::context::RequestContext;
use crate::error::SamlResult;
use crate::keys::KeyResolver;
use crate::metadata::{MetadataBuilder, MetadataDocument};
use crate::processor::ResponseProcessor;
use crate::request::{OutgoingMessage, RequestBuilder};
use crate::signing::MessageVerifier;
use crate::state::ProcessingState;
use crate::types::{Assertion, Status};
use crate::xml::Element;

/// Global configuration, key resolution and time source bundled together.
///
/// All operations take the entity configurations they need as arguments;
/// nothing is cached between calls, so one instance can be shared across
/// threads behind an [`Arc`].
#[derive(Debug, Clone)]
pub struct Federation {
    config: FederationConfig,
    keys: KeyResolver,
    clock: Arc<dyn Clock>,
}

impl Federation {
    /// Creates an engine using the system clock and the filesystem for
    /// key locations.
    #[must_use]
    pub fn new(config: FederationConfig) -> Self {
        let keys = KeyResolver::new(&config);
        Self {
            config,
            keys,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the key resolver, e.g. to attach a key database.
    #[must_use]
    pub fn with_keys(mut self, keys: KeyResolver) -> Self {
        self.keys = keys;
        self
    }

    /// Returns the global configuration.
    #[must_use]
    pub const fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Returns the key resolver.
    #[must_use]
    pub const fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    fn requests(&self) -> RequestBuilder<'_> {
        RequestBuilder::new(&self.keys, self.clock.as_ref())
    }

    /// Builds an AuthnRequest from `sp` to `idp`.
    ///
    /// # Errors
    ///
    /// See [`RequestBuilder::build_authn_request`].
    pub fn build_authn_request(
        &self,
        sp: &EntityConfig,
        idp: &EntityConfig,
        state: &ProcessingState,
    ) -> SamlResult<OutgoingMessage> {
        self.requests().build_authn_request(sp, idp, state)
    }

    /// Builds a LogoutRequest, or `None` when `destination` publishes no
    /// logout endpoint.
    ///
    /// # Errors
    ///
    /// See [`RequestBuilder::build_logout_request`].
    pub fn build_logout_request(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        state: &ProcessingState,
    ) -> SamlResult<Option<OutgoingMessage>> {
        self.requests().build_logout_request(source, destination, state)
    }

    /// Builds a LogoutResponse, or `None` when `destination` publishes no
    /// logout endpoint.
    ///
    /// # Errors
    ///
    /// See [`RequestBuilder::build_logout_response`].
    pub fn build_logout_response(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        state: &ProcessingState,
        status: Status,
    ) -> SamlResult<Option<OutgoingMessage>> {
        self.requests().build_logout_response(source, destination, state, status)
    }

    /// Validates a Response received by `sp` from `idp` and returns its
    /// assertions.
    ///
    /// # Errors
    ///
    /// See [`ResponseProcessor::process_response`].
    pub fn process_response(
        &self,
        sp: &EntityConfig,
        idp: &EntityConfig,
        ctx: &RequestContext,
        response: &Element,
    ) -> SamlResult<Vec<Assertion>> {
        ResponseProcessor::new(&self.keys, self.clock.as_ref(), self.config.allowed_clock_skew())
            .process_response(sp, idp, ctx, response)
    }

    /// Enforces the signature policy on a received request or logout
    /// message.
    ///
    /// # Errors
    ///
    /// See [`MessageVerifier::validate_message`].
    pub fn validate_message(
        &self,
        source: &EntityConfig,
        destination: &EntityConfig,
        message: &ReceivedMessage,
    ) -> SamlResult<()> {
        MessageVerifier::new(&self.keys).validate_message(source, destination, message)
    }

    /// Builds the metadata document of `entity`.
    ///
    /// # Errors
    ///
    /// See [`MetadataBuilder::build`].
    pub fn build_metadata(&self, entity: &EntityConfig) -> SamlResult<MetadataDocument> {
        MetadataBuilder::new(&self.config, &self.keys).build(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn shareable_across_threads() {
        assert_send_sync::<Federation>();
    }

    #[test]
    fn builds_metadata_through_facade() {
        let federation = Federation::new(FederationConfig::default());
        let entity = EntityConfig::new("https://sp.example/")
            .with("metadata-set", "saml20-sp-hosted")
            .with("AssertionConsumerService", "https://sp.example/acs");
        let document = federation.build_metadata(&entity).unwrap();
        assert_eq!(document.entity_id, "https://sp.example/");
    }
}
