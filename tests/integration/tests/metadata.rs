//! Publishing entity metadata.

use fed_saml::signature::XmlSignatureValidator;
use fed_saml::types::{SamlBinding, MDUI_NS, MD_NS};
use fed_saml::xml::{parse, NsScope};
use fed_saml::{EntityConfig, Federation, FederationConfig};

use crate::common::*;

const SP_TOML: &str = r#"
entityid = "https://sp.example.org/metadata"
metadata-set = "saml20-sp-hosted"
SingleLogoutService = "https://sp.example.org/slo"
name = "Example SP"
attributes = ["mail", "eduPersonPrincipalName"]

[[AssertionConsumerService]]
Binding = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
Location = "https://sp.example.org/acs"
index = 1

[[AssertionConsumerService]]
Binding = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact"
Location = "https://sp.example.org/acs-artifact"

[[AssertionConsumerService]]
Binding = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"
Location = "https://sp.example.org/acs-redirect"

[UIInfo.DisplayName]
en = "Example"
nl = "Voorbeeld"
"#;

#[test]
fn sp_metadata_fills_in_missing_indexes() -> anyhow::Result<()> {
    init_tracing();
    let entity = EntityConfig::from_toml(SP_TOML)?.with("certData", sp_keys().certificate_data()?);
    let document = federation_at(now()).build_metadata(&entity)?;
    assert_eq!(document.entity_id, SP_ENTITY_ID);
    assert!(!document.signed);

    let root = parse(&document.to_xml())?;
    let sp = root
        .child(MD_NS, "SPSSODescriptor")
        .ok_or_else(|| anyhow::anyhow!("SPSSODescriptor missing"))?;
    let indexes: Vec<_> = sp
        .children_named(MD_NS, "AssertionConsumerService")
        .map(|acs| (acs.attr("Binding").unwrap_or_default(), acs.attr("index").unwrap_or_default()))
        .collect();
    assert_eq!(
        indexes,
        vec![
            (SamlBinding::HttpPost.uri(), "1"),
            (SamlBinding::HttpArtifact.uri(), "0"),
            (SamlBinding::HttpRedirect.uri(), "2"),
        ]
    );

    let acs_service = sp
        .child(MD_NS, "AttributeConsumingService")
        .ok_or_else(|| anyhow::anyhow!("AttributeConsumingService missing"))?;
    assert_eq!(acs_service.children_named(MD_NS, "RequestedAttribute").count(), 2);

    let names: Vec<String> = sp
        .child(MD_NS, "Extensions")
        .and_then(|ext| ext.child(MDUI_NS, "UIInfo"))
        .map(|ui| ui.children_named(MDUI_NS, "DisplayName").map(|n| n.text()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["Example".to_string(), "Voorbeeld".to_string()]);
    Ok(())
}

#[test]
fn metadata_signed_with_key_from_cert_dir() -> anyhow::Result<()> {
    init_tracing();
    let certdir = tempfile::tempdir()?;
    std::fs::write(certdir.path().join("metadata.pem"), idp_keys().private_key_pem()?)?;
    std::fs::write(certdir.path().join("metadata.crt"), idp_keys().certificate_pem()?)?;

    let config = FederationConfig::from_toml_str(&format!(
        r#"
        certdir = {:?}

        [metadata.sign]
        enable = true
        privatekey = "metadata.pem"
        certificate = "metadata.crt"
        algorithm = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512"
        "#,
        certdir.path().display().to_string()
    ))?;
    let federation = Federation::new(config);
    let entity = idp_remote()?.with("metadata-set", "saml20-idp-hosted");

    let document = federation.build_metadata(&entity)?;
    assert!(document.signed);

    let root = parse(&document.to_xml())?;
    assert!(root.attr("ID").is_some());
    let signature = XmlSignatureValidator::new(idp_keys().certificate.public_key()?).validate(&root, &NsScope::new())?;
    assert_eq!(signature.algorithm.uri(), "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512");
    Ok(())
}

#[test]
fn malformed_extension_does_not_block_publication() -> anyhow::Result<()> {
    init_tracing();
    let entity = idp_remote()?
        .with("metadata-set", "saml20-idp-hosted")
        .with("RegistrationInfo", "not a map")
        .with("scope", vec!["example.org"]);

    let document = federation_at(now()).build_metadata(&entity)?;
    let root = parse(&document.to_xml())?;
    assert!(root.child(MD_NS, "IDPSSODescriptor").is_some());
    let entity_extensions = root.child(MD_NS, "Extensions");
    assert!(entity_extensions.map_or(true, |ext| ext.elements().next().is_none()));
    Ok(())
}
