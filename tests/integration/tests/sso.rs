//! Web browser SSO: AuthnRequest out, Response back.

use base64::Engine;
use chrono::Duration;
use fed_saml::bindings::HttpRedirectBinding;
use fed_saml::error::StatusErrorKind;
use fed_saml::types::{status_codes, sub_status_codes, AuthnRequest, Response, Status};
use fed_saml::{EncodedMessage, EntityConfig, ProcessingState, RequestContext, SamlError};

use crate::common::*;

fn acs() -> RequestContext {
    RequestContext::new(ACS_URL)
}

#[test]
fn signed_redirect_request_and_encrypted_response() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());
    let sp = sp_hosted()?
        .with("sign.authnrequest", true)
        .with("assertion.encryption", true);
    let idp = idp_remote()?;

    let state = ProcessingState {
        relay_state: Some("/app/home".to_string()),
        ..ProcessingState::default()
    };
    let request = federation.build_authn_request(&sp, &idp, &state)?;
    assert_eq!(request.destination, SSO_URL);
    assert!(request.is_signed());
    let EncodedMessage::Redirect(url) = request.encode()? else {
        anyhow::bail!("AuthnRequest to a redirect endpoint must use HTTP-Redirect");
    };

    // IdP side
    let received = HttpRedirectBinding::decode_url(&url)?;
    assert_eq!(received.relay_state.as_deref(), Some("/app/home"));
    let sp_seen_by_idp = sp_remote()?.with("validate.authnrequest", true);
    federation.validate_message(&sp_seen_by_idp, &idp_hosted()?, &received)?;
    let authn_request = AuthnRequest::from_element(&received.root)?;
    assert_eq!(authn_request.id, request.id);
    assert_eq!(authn_request.assertion_consumer_service_url.as_deref(), Some(ACS_URL));

    let form = issue_response(&Issue {
        in_response_to: Some(authn_request.id.clone()),
        encrypt_for: Some(sp_remote()?),
        ..Issue::default()
    })?;

    // SP side
    let received = receive_post(&form)?;
    let assertions = federation.process_response(&sp, &idp, &acs(), &received.root)?;
    assert_eq!(assertions.len(), 1);
    let assertion = &assertions[0];
    assert_eq!(assertion.name_id().map(|n| n.value.as_str()), Some("_9f3c1a"));
    assert_eq!(assertion.session_index(), Some("_session-42"));
    assert_eq!(
        assertion.attribute_values("mail"),
        Some(&["alice@example.org".to_string()][..])
    );
    Ok(())
}

#[test]
fn tampered_response_is_rejected() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());
    let form = issue_response(&Issue::default())?;

    let engine = base64::engine::general_purpose::STANDARD;
    let xml = String::from_utf8(engine.decode(&form)?)?;
    let forged = engine.encode(xml.replace("alice@example.org", "mallory@example.org"));

    let received = receive_post(&forged)?;
    let err = federation
        .process_response(&sp_hosted()?, &idp_remote()?, &acs(), &received.root)
        .unwrap_err();
    assert!(matches!(err, SamlError::SignatureInvalid(_)), "{err}");
    Ok(())
}

#[test]
fn a_signed_response_covers_an_unsigned_assertion() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());

    let unsigned = receive_post(&issue_response(&Issue {
        sign_assertion: false,
        ..Issue::default()
    })?)?;
    let err = federation
        .process_response(&sp_hosted()?, &idp_remote()?, &acs(), &unsigned.root)
        .unwrap_err();
    assert!(matches!(err, SamlError::NeitherSigned));

    let signed_response = receive_post(&issue_response(&Issue {
        sign_assertion: false,
        sign_response: true,
        ..Issue::default()
    })?)?;
    let assertions = federation.process_response(&sp_hosted()?, &idp_remote()?, &acs(), &signed_response.root)?;
    assert!(assertions[0].signed);
    Ok(())
}

#[test]
fn unencrypted_assertion_is_refused_when_encryption_is_required() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());
    let sp = sp_hosted()?.with("assertion.encryption", true);
    let received = receive_post(&issue_response(&Issue::default())?)?;

    let err = federation
        .process_response(&sp, &idp_remote()?, &acs(), &received.root)
        .unwrap_err();
    assert!(matches!(err, SamlError::UnencryptedAssertion));
    Ok(())
}

#[test]
fn rollover_key_is_tried_before_current_key() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());
    let sp = sp_hosted()?.with("new_privatekey", sp_rollover_keys().private_key_pem()?);

    let for_new_key = EntityConfig::new(SP_ENTITY_ID).with("certData", sp_rollover_keys().certificate_data()?);
    let received = receive_post(&issue_response(&Issue {
        encrypt_for: Some(for_new_key),
        ..Issue::default()
    })?)?;
    assert_eq!(federation.process_response(&sp, &idp_remote()?, &acs(), &received.root)?.len(), 1);

    let received = receive_post(&issue_response(&Issue {
        encrypt_for: Some(sp_remote()?),
        ..Issue::default()
    })?)?;
    assert_eq!(federation.process_response(&sp, &idp_remote()?, &acs(), &received.root)?.len(), 1);
    Ok(())
}

#[test]
fn validity_window_allows_configured_skew() -> anyhow::Result<()> {
    init_tracing();
    let received = receive_post(&issue_response(&Issue::default())?)?;
    let (sp, idp) = (sp_hosted()?, idp_remote()?);

    let late_but_fine = federation_at(now() + Duration::minutes(4));
    assert!(late_but_fine.process_response(&sp, &idp, &acs(), &received.root).is_ok());

    let too_late = federation_at(now() + Duration::minutes(5) + Duration::seconds(181));
    let err = too_late.process_response(&sp, &idp, &acs(), &received.root).unwrap_err();
    assert!(matches!(err, SamlError::AssertionExpired));
    Ok(())
}

#[test]
fn assertion_for_another_sp_is_rejected() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());
    let other_sp = EntityConfig::new("https://other-sp.example.org/metadata");
    let received = receive_post(&issue_response(&Issue::default())?)?;

    let err = federation
        .process_response(&other_sp, &idp_remote()?, &acs(), &received.root)
        .unwrap_err();
    assert!(matches!(err, SamlError::InvalidAudience { .. }));
    assert!(err.to_string().contains(SP_ENTITY_ID));
    Ok(())
}

#[test]
fn idp_status_becomes_typed_error() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());
    let mut response = Response::new(
        IDP_ENTITY_ID,
        now(),
        Status::new(
            status_codes::RESPONDER,
            Some(sub_status_codes::NO_PASSIVE),
            Some("passive authentication not possible".to_string()),
        ),
    );
    response.destination = Some(ACS_URL.to_string());
    let received = receive_post(&post_value(&response.to_element()))?;

    let err = federation
        .process_response(&sp_hosted()?, &idp_remote()?, &acs(), &received.root)
        .unwrap_err();
    let SamlError::Status(status) = &err else {
        anyhow::bail!("expected a status error, got {err}");
    };
    assert_eq!(status.kind(), StatusErrorKind::NoPassive);
    assert_eq!(err.to_status().sub_code(), Some(sub_status_codes::NO_PASSIVE));
    Ok(())
}
