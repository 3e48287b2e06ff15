//! Common test utilities and fixtures.

use std::sync::{Arc, OnceLock};

use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use fed_crypto::keys::{generate_self_signed, KeyPair};
use fed_crypto::SignatureAlgorithm;
use fed_saml::bindings::{HttpPostBinding, ReceivedMessage};
use fed_saml::encryption::Encryptor;
use fed_saml::signature::XmlSigner;
use fed_saml::types::{
    confirmation_methods, Assertion, Attribute, AuthnStatement, Conditions, NameId, Response, Status, Subject,
    SubjectConfirmation, SubjectConfirmationData,
};
use fed_saml::xml::{Element, NsScope};
use fed_saml::{EntityConfig, Federation, FederationConfig, FixedClock};

pub const SP_ENTITY_ID: &str = "https://sp.example.org/metadata";
pub const IDP_ENTITY_ID: &str = "https://idp.example.org/metadata";
pub const ACS_URL: &str = "https://sp.example.org/acs";
pub const SSO_URL: &str = "https://idp.example.org/sso";
pub const SP_SLO_URL: &str = "https://sp.example.org/slo";
pub const IDP_SLO_URL: &str = "https://idp.example.org/slo";

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pair(slot: &'static OnceLock<KeyPair>, name: &str) -> &'static KeyPair {
    slot.get_or_init(|| generate_self_signed(name, 2048).expect("key generation"))
}

/// Key pair of the IdP.
pub fn idp_keys() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    pair(&PAIR, "integration-idp")
}

/// Current key pair of the SP.
pub fn sp_keys() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    pair(&PAIR, "integration-sp")
}

/// Rollover key pair of the SP.
pub fn sp_rollover_keys() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    pair(&PAIR, "integration-sp-rollover")
}

/// Fixed "now" used by every scenario.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2031, 3, 14, 9, 26, 53).unwrap()
}

/// A federation frozen at `at`.
pub fn federation_at(at: DateTime<Utc>) -> Federation {
    Federation::new(FederationConfig::default()).with_clock(Arc::new(FixedClock(at)))
}

/// The hosted SP, as it sees itself.
pub fn sp_hosted() -> anyhow::Result<EntityConfig> {
    Ok(EntityConfig::new(SP_ENTITY_ID)
        .with("metadata-set", "saml20-sp-hosted")
        .with("privatekey", sp_keys().private_key_pem()?)
        .with("certData", sp_keys().certificate_data()?)
        .with("AssertionConsumerService", ACS_URL)
        .with("SingleLogoutService", SP_SLO_URL))
}

/// The SP as published to the IdP.
pub fn sp_remote() -> anyhow::Result<EntityConfig> {
    Ok(EntityConfig::new(SP_ENTITY_ID)
        .with("certData", sp_keys().certificate_data()?)
        .with("AssertionConsumerService", ACS_URL)
        .with("SingleLogoutService", SP_SLO_URL))
}

/// The IdP as configured at the SP.
pub fn idp_remote() -> anyhow::Result<EntityConfig> {
    Ok(EntityConfig::new(IDP_ENTITY_ID)
        .with("certData", idp_keys().certificate_data()?)
        .with("SingleSignOnService", SSO_URL)
        .with("SingleLogoutService", IDP_SLO_URL))
}

/// The hosted IdP, as it sees itself.
pub fn idp_hosted() -> anyhow::Result<EntityConfig> {
    Ok(idp_remote()?.with("privatekey", idp_keys().private_key_pem()?))
}

/// What the IdP puts in an assertion.
#[derive(Debug, Clone)]
pub struct Issue {
    pub in_response_to: Option<String>,
    pub name_id: NameId,
    pub attributes: Vec<Attribute>,
    pub lifetime: Duration,
    pub sign_assertion: bool,
    pub sign_response: bool,
    pub encrypt_for: Option<EntityConfig>,
}

impl Default for Issue {
    fn default() -> Self {
        Self {
            in_response_to: None,
            name_id: NameId::transient("_9f3c1a"),
            attributes: vec![Attribute::new("mail", vec!["alice@example.org".to_string()])],
            lifetime: Duration::minutes(5),
            sign_assertion: true,
            sign_response: false,
            encrypt_for: None,
        }
    }
}

fn idp_signer() -> anyhow::Result<XmlSigner> {
    Ok(XmlSigner::new(idp_keys().private_key.clone(), SignatureAlgorithm::RsaSha256)
        .with_certificate(idp_keys().certificate_data()?))
}

/// Plays the IdP: issues a Response at `now()` as the form value of an
/// HTTP-POST delivery.
pub fn issue_response(issue: &Issue) -> anyhow::Result<String> {
    let issued = now();
    let mut assertion = Assertion::new(IDP_ENTITY_ID, issued);
    assertion.subject = Some(
        Subject::new(issue.name_id.clone()).with_confirmation(
            SubjectConfirmation::new(confirmation_methods::BEARER).with_data(SubjectConfirmationData {
                not_on_or_after: Some(issued + issue.lifetime),
                recipient: Some(ACS_URL.to_string()),
                in_response_to: issue.in_response_to.clone(),
                ..SubjectConfirmationData::default()
            }),
        ),
    );
    assertion.conditions = Some(
        Conditions {
            not_before: Some(issued - Duration::seconds(30)),
            not_on_or_after: Some(issued + issue.lifetime),
            ..Conditions::default()
        }
        .with_audience_restriction(vec![SP_ENTITY_ID.to_string()]),
    );
    let mut statement = AuthnStatement::new(issued);
    statement.session_index = Some("_session-42".to_string());
    assertion.authn_statements.push(statement);
    assertion.attributes = issue.attributes.clone();

    let mut assertion_element = assertion.to_element();
    if issue.sign_assertion {
        idp_signer()?.sign_element(&mut assertion_element, &NsScope::new())?;
    }
    if let Some(recipient) = &issue.encrypt_for {
        let keys = fed_saml::keys::KeyResolver::new(&FederationConfig::default());
        assertion_element = Encryptor::new(&keys).encrypt_assertion(&assertion_element, recipient)?;
    }

    let mut response = Response::new(IDP_ENTITY_ID, issued, Status::success());
    response.destination = Some(ACS_URL.to_string());
    response.in_response_to = issue.in_response_to.clone();
    response.assertions = vec![assertion_element];
    let mut element = response.to_element();
    if issue.sign_response {
        idp_signer()?.sign_element(&mut element, &NsScope::new())?;
    }
    Ok(post_value(&element))
}

/// Base64 form value of an HTTP-POST message.
pub fn post_value(element: &Element) -> String {
    base64::engine::general_purpose::STANDARD.encode(element.to_document())
}

/// Plays the SP's ACS endpoint receiving the form.
pub fn receive_post(saml_response: &str) -> anyhow::Result<ReceivedMessage> {
    Ok(HttpPostBinding::decode(None, Some(saml_response), None)?)
}
