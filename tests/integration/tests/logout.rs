//! Single logout between the SP and the IdP.

use fed_saml::bindings::HttpRedirectBinding;
use fed_saml::encryption::Decryptor;
use fed_saml::types::{LogoutRequest, LogoutResponse, Status};
use fed_saml::xml::NsScope;
use fed_saml::{EncodedMessage, EntityConfig, NameId, ProcessingState, SamlError};

use crate::common::*;

fn logout_state() -> ProcessingState {
    ProcessingState {
        logout_name_id: Some(NameId::persistent("f8b1d7a0")),
        session_indexes: vec!["_session-42".to_string()],
        relay_state: Some("/bye".to_string()),
        ..ProcessingState::default()
    }
}

#[test]
fn sp_initiated_logout_with_encrypted_name_id() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());
    let sp = sp_hosted()?.with("sign.logout", true);
    let idp = idp_remote()?.with("nameid.encryption", true);

    let request = federation
        .build_logout_request(&sp, &idp, &logout_state())?
        .ok_or_else(|| anyhow::anyhow!("IdP publishes a logout endpoint"))?;
    assert_eq!(request.destination, IDP_SLO_URL);
    let EncodedMessage::Redirect(url) = request.encode()? else {
        anyhow::bail!("the first SingleLogoutService is HTTP-Redirect");
    };

    // IdP side
    let received = HttpRedirectBinding::decode_url(&url)?;
    assert!(received.detached_signature.is_some());
    assert_eq!(received.relay_state.as_deref(), Some("/bye"));
    let sp_seen_by_idp = sp_remote()?.with("validate.logout", true);
    federation.validate_message(&sp_seen_by_idp, &idp_hosted()?, &received)?;

    let logout = LogoutRequest::from_element(&received.root)?;
    assert_eq!(logout.id, request.id);
    assert!(logout.name_id.is_none());
    assert_eq!(logout.session_indexes, vec!["_session-42".to_string()]);
    let encrypted = logout
        .encrypted_id
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("NameID should be encrypted"))?;

    let scope = received.root.inner_scope(&NsScope::new());
    let name_id = Decryptor::new(federation.keys()).decrypt_identifier(&sp_seen_by_idp, &idp_hosted()?, encrypted, &scope)?;
    assert_eq!(name_id.value, "f8b1d7a0");

    // IdP answers
    let answer_state = ProcessingState {
        in_response_to: Some(logout.id.clone()),
        relay_state: received.relay_state.clone(),
        ..ProcessingState::default()
    };
    let idp_signing = idp_hosted()?.with("sign.logout", true);
    let response = federation
        .build_logout_response(&idp_signing, &sp_seen_by_idp, &answer_state, Status::success())?
        .ok_or_else(|| anyhow::anyhow!("SP publishes a logout endpoint"))?;
    assert_eq!(response.destination, SP_SLO_URL);
    let EncodedMessage::Redirect(url) = response.encode()? else {
        anyhow::bail!("the SP's SingleLogoutService is HTTP-Redirect");
    };

    // SP side
    let received = HttpRedirectBinding::decode_url(&url)?;
    federation.validate_message(&idp_remote()?.with("validate.logout", true), &sp, &received)?;
    let logout_response = LogoutResponse::from_element(&received.root)?;
    assert!(logout_response.is_success());
    assert_eq!(logout_response.in_response_to.as_deref(), Some(request.id.as_str()));
    assert_eq!(received.relay_state.as_deref(), Some("/bye"));
    Ok(())
}

#[test]
fn unsigned_logout_is_refused_when_validation_is_required() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());

    let request = federation
        .build_logout_request(&sp_hosted()?, &idp_remote()?, &logout_state())?
        .ok_or_else(|| anyhow::anyhow!("IdP publishes a logout endpoint"))?;
    assert!(!request.is_signed());
    let EncodedMessage::Redirect(url) = request.encode()? else {
        anyhow::bail!("the first SingleLogoutService is HTTP-Redirect");
    };
    let received = HttpRedirectBinding::decode_url(&url)?;

    federation.validate_message(&sp_remote()?, &idp_hosted()?, &received)?;
    let err = federation
        .validate_message(&sp_remote()?.with("validate.logout", true), &idp_hosted()?, &received)
        .unwrap_err();
    assert!(matches!(err, SamlError::MissingSignature));

    let logout = LogoutRequest::from_element(&received.root)?;
    assert_eq!(logout.name_id.map(|n| n.value), Some("f8b1d7a0".to_string()));
    Ok(())
}

#[test]
fn no_logout_endpoint_means_nothing_to_send() -> anyhow::Result<()> {
    init_tracing();
    let federation = federation_at(now());
    let idp_without_slo = EntityConfig::new(IDP_ENTITY_ID).with("SingleSignOnService", SSO_URL);

    assert!(federation
        .build_logout_request(&sp_hosted()?, &idp_without_slo, &logout_state())?
        .is_none());
    assert!(federation
        .build_logout_response(&sp_hosted()?, &idp_without_slo, &ProcessingState::default(), Status::success())?
        .is_none());
    Ok(())
}
