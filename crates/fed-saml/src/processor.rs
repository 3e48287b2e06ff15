//! Validation of Responses received by a service provider.
//!
//! [`ResponseProcessor::process_response`] runs every check in a fixed
//! order and stops at the first failure. Each assertion is decrypted,
//! checked for a signature, a validity window, the audience and a
//! satisfiable subject confirmation before it is returned.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::config::{EntityConfig, MetadataView, Side};
use crate::context::RequestContext;
use crate::encryption::Decryptor;
use crate::error::{SamlError, SamlResult};
use crate::keys::KeyResolver;
use crate::signing::{MessageVerifier, SignedTarget};
use crate::types::{
    confirmation_methods, decode_base64, Assertion, Response, SubjectConfirmation, XMLDSIG_NS,
};
use crate::xml::{Element, NsScope};

/// Skew tolerated on `SubjectConfirmationData` validity.
const CONFIRMATION_SKEW_SECONDS: i64 = 60;

const VALID_METHODS: [&str; 3] = [
    confirmation_methods::BEARER,
    confirmation_methods::HOLDER_OF_KEY,
    confirmation_methods::SENDER_VOUCHES,
];

/// Validates Responses sent by an IdP to an SP.
#[derive(Debug, Clone, Copy)]
pub struct ResponseProcessor<'a> {
    keys: &'a KeyResolver,
    clock: &'a dyn Clock,
    skew: Duration,
}

impl<'a> ResponseProcessor<'a> {
    /// Creates a processor tolerating `skew` on assertion validity.
    #[must_use]
    pub fn new(keys: &'a KeyResolver, clock: &'a dyn Clock, skew: std::time::Duration) -> Self {
        Self {
            keys,
            clock,
            skew: Duration::from_std(skew).unwrap_or_else(|_| Duration::seconds(180)),
        }
    }

    /// Validates `response` received at `ctx` by `sp` from `idp` and returns
    /// its assertions in document order.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Status`] for a non-success status, or the error
    /// of the first failed check.
    pub fn process_response(
        &self,
        sp: &EntityConfig,
        idp: &EntityConfig,
        ctx: &RequestContext,
        response: &Element,
    ) -> SamlResult<Vec<Assertion>> {
        let parsed = Response::from_element(response)?;
        if !parsed.is_success() {
            return Err(SamlError::from_status(&parsed.status));
        }

        if let Some(destination) = &parsed.destination {
            if *destination != ctx.current_url {
                return Err(SamlError::InvalidDestination {
                    expected: ctx.current_url.clone(),
                    actual: destination.clone(),
                });
            }
        }

        let verifier = MessageVerifier::new(self.keys);
        let root_scope = NsScope::new();
        let response_signed = verifier.check_sign(idp, SignedTarget::Element(response, &root_scope))?;
        debug!(entity_id = idp.entity_id(), response_signed, "evaluated response signature");

        if parsed.assertions.is_empty() {
            return Err(SamlError::NoAssertions);
        }

        let scope = response.inner_scope(&root_scope);
        parsed
            .assertions
            .iter()
            .map(|element| self.process_assertion(sp, idp, ctx, &parsed, response_signed, element, &scope))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn process_assertion(
        &self,
        sp: &EntityConfig,
        idp: &EntityConfig,
        ctx: &RequestContext,
        response: &Response,
        response_signed: bool,
        element: &Element,
        scope: &NsScope,
    ) -> SamlResult<Assertion> {
        let decryptor = Decryptor::new(self.keys);
        let element = decryptor.decrypt_assertion(idp, sp, element, scope)?;
        let mut assertion = Assertion::from_element(&element)?;
        decryptor.decrypt_attributes(idp, sp, &mut assertion, scope)?;

        let assertion_signed =
            MessageVerifier::new(self.keys).check_sign(idp, SignedTarget::Element(&element, scope))?;
        if !assertion_signed && !response_signed {
            return Err(SamlError::NeitherSigned);
        }
        assertion.signed = true;

        self.check_validity(&assertion)?;
        check_audience(sp, &assertion)?;
        self.check_subject_confirmation(sp, idp, ctx, response, &assertion)?;

        if idp.get_optional_bool("base64attributes", Some(false))? == Some(true) {
            decode_base64_attributes(&mut assertion)?;
        }

        decryptor.decrypt_name_id(idp, sp, &mut assertion, scope)?;
        debug!(assertion_id = %assertion.id, assertion_signed, "accepted assertion");
        Ok(assertion)
    }

    fn check_validity(&self, assertion: &Assertion) -> SamlResult<()> {
        let now = self.clock.now();
        let conditions = assertion.conditions.as_ref();

        if let Some(not_before) = conditions.and_then(|c| c.not_before) {
            if not_before > now + self.skew {
                return Err(SamlError::AssertionNotYetValid);
            }
        }
        if let Some(not_on_or_after) = conditions.and_then(|c| c.not_on_or_after) {
            if not_on_or_after <= now - self.skew {
                return Err(SamlError::AssertionExpired);
            }
        }
        if let Some(session_end) = assertion.session_not_on_or_after() {
            if session_end <= now - self.skew {
                return Err(SamlError::SessionExpired);
            }
        }
        Ok(())
    }

    fn check_subject_confirmation(
        &self,
        sp: &EntityConfig,
        idp: &EntityConfig,
        ctx: &RequestContext,
        response: &Response,
        assertion: &Assertion,
    ) -> SamlResult<()> {
        let hok_enabled = MetadataView::new(idp, sp).first_bool(
            &[(Side::Source, "saml20.hok.assertion"), (Side::Destination, "saml20.hok.assertion")],
            false,
        )?;
        let now = self.clock.now();

        let mut last_reason = "No SubjectConfirmation element in Subject.".to_string();
        let confirmations = assertion.subject.iter().flat_map(|s| s.confirmations.iter());
        for (index, confirmation) in confirmations.enumerate() {
            match check_confirmation(confirmation, hok_enabled, ctx, response, now) {
                Ok(()) => return Ok(()),
                Err(reason) => {
                    debug!(candidate = index, %reason, "subject confirmation rejected");
                    last_reason = reason;
                }
            }
        }
        Err(SamlError::SubjectConfirmation(last_reason))
    }
}

/// The SP must be among the audiences valid under every restriction.
fn check_audience(sp: &EntityConfig, assertion: &Assertion) -> SamlResult<()> {
    let Some(conditions) = &assertion.conditions else {
        return Ok(());
    };
    let Some(valid) = conditions.valid_audiences() else {
        return Ok(());
    };
    if conditions.audience_restrictions.iter().all(Vec::is_empty) {
        return Ok(());
    }
    let entity_id = sp.entity_id();
    if valid.iter().any(|audience| audience == entity_id) {
        return Ok(());
    }
    Err(SamlError::InvalidAudience {
        entity_id: entity_id.to_string(),
        candidates: valid
            .iter()
            .map(|audience| format!("[{audience}]"))
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Checks one `SubjectConfirmation`; the error is the reason for skipping it.
fn check_confirmation(
    confirmation: &SubjectConfirmation,
    hok_enabled: bool,
    ctx: &RequestContext,
    response: &Response,
    now: DateTime<Utc>,
) -> Result<(), String> {
    let method = confirmation.method.as_str();
    if !VALID_METHODS.contains(&method) {
        return Err(format!("Invalid Method on SubjectConfirmation: '{method}'"));
    }
    if method == confirmation_methods::BEARER && hok_enabled {
        return Err("Bearer SubjectConfirmation received, but Holder-of-Key SubjectConfirmation needed".to_string());
    }
    if method == confirmation_methods::HOLDER_OF_KEY {
        if !hok_enabled {
            return Err(
                "Holder-of-Key SubjectConfirmation received, but the Holder-of-Key profile is not enabled".to_string(),
            );
        }
        check_holder_of_key(confirmation, ctx)?;
    }

    let Some(data) = &confirmation.data else {
        return Err("No SubjectConfirmationData provided".to_string());
    };
    let skew = Duration::seconds(CONFIRMATION_SKEW_SECONDS);
    if let Some(not_before) = data.not_before {
        if not_before > now + skew {
            return Err(format!("NotBefore in SubjectConfirmationData is in the future: {not_before}"));
        }
    }
    if let Some(not_on_or_after) = data.not_on_or_after {
        if not_on_or_after <= now - skew {
            return Err(format!("NotOnOrAfter in SubjectConfirmationData is in the past: {not_on_or_after}"));
        }
    }
    if let Some(recipient) = &data.recipient {
        if *recipient != ctx.current_url {
            return Err(format!(
                "Recipient in SubjectConfirmationData does not match the current URL. Recipient is '{recipient}', current URL is '{}'.",
                ctx.current_url
            ));
        }
    }
    if let (Some(expected), Some(actual)) = (&response.in_response_to, &data.in_response_to) {
        if expected != actual {
            return Err(format!(
                "InResponseTo in SubjectConfirmationData does not match the Response. Response has '{expected}', SubjectConfirmationData has '{actual}'."
            ));
        }
    }
    Ok(())
}

/// The confirmation must carry exactly one certificate, equal to the TLS
/// client certificate.
fn check_holder_of_key(confirmation: &SubjectConfirmation, ctx: &RequestContext) -> Result<(), String> {
    if !ctx.https {
        return Err("No HTTPS connection, but Holder-of-Key SubjectConfirmation requires HTTPS".to_string());
    }
    let Some(client_certificate) = ctx.client_certificate.as_deref().filter(|c| !c.is_empty()) else {
        return Err("No client certificate provided during TLS Handshake with SP".to_string());
    };

    let key_infos = confirmation.data.as_ref().map_or(&[][..], |d| d.key_infos.as_slice());
    let [key_info] = key_infos else {
        return Err(
            "Error validating Holder-of-Key assertion: Only one <ds:KeyInfo> element in <SubjectConfirmationData> allowed"
                .to_string(),
        );
    };
    let x509_data = exactly_one(key_info, "X509Data").ok_or_else(|| {
        "Error validating Holder-of-Key assertion: Only one <ds:X509Data> element in <ds:KeyInfo> within <SubjectConfirmationData> allowed".to_string()
    })?;
    let certificate = exactly_one(x509_data, "X509Certificate").ok_or_else(|| {
        "Error validating Holder-of-Key assertion: Only one <ds:X509Certificate> element in <ds:X509Data> within <SubjectConfirmationData> allowed".to_string()
    })?;

    let bound = decode_base64(&certificate.text())
        .map_err(|e| format!("Error validating Holder-of-Key assertion: {e}"))?;
    if bound != client_certificate {
        return Err(
            "Provided client certificate does not match the certificate bound to the Holder-of-Key assertion"
                .to_string(),
        );
    }
    Ok(())
}

fn exactly_one<'e>(parent: &'e Element, local: &str) -> Option<&'e Element> {
    let mut children = parent.elements().filter(|e| e.is(XMLDSIG_NS, local));
    match (children.next(), children.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Splits every attribute value on `_` and base64-decodes each part.
fn decode_base64_attributes(assertion: &mut Assertion) -> SamlResult<()> {
    for attribute in &mut assertion.attributes {
        let mut decoded = Vec::with_capacity(attribute.values.len());
        for value in &attribute.values {
            for part in value.split('_') {
                let bytes = decode_base64(part)?;
                decoded.push(String::from_utf8(bytes).map_err(|_| {
                    SamlError::InvalidMessage(format!("attribute '{}' is not UTF-8 after base64 decoding", attribute.name))
                })?);
            }
        }
        attribute.values = decoded;
    }
    Ok(())
}
