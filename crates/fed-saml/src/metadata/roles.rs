//! Role descriptors by metadata set.

use std::collections::BTreeSet;

use super::{extensions, localized};
use crate::config::{Endpoint, EntityConfig};
use crate::error::{SamlError, SamlResult};
use crate::keys::KeyResolver;
use crate::types::{SamlBinding, FED_NS, MD_NS, SAMLP_NS, WSA_NS, XMLDSIG_NS, XSI_NS};
use crate::xml::{Element, XML_NS};

/// Namespace of the `hoksso:ProtocolBinding` endpoint attribute.
const HOKSSO_NS: &str = "urn:oasis:names:tc:SAML:2.0:profiles:holder-of-key:SSO:browser";

/// Builds the role descriptors for an entity of `metadata_set`.
pub(super) fn role_descriptors(
    keys: &KeyResolver,
    entity: &EntityConfig,
    metadata_set: &str,
) -> SamlResult<Vec<Element>> {
    match metadata_set {
        set if set.starts_with("saml20-sp-") => Ok(vec![sp_descriptor(keys, entity, &[SAMLP_NS])?]),
        set if set.starts_with("saml20-idp-") => Ok(vec![idp_descriptor(keys, entity)?]),
        "attributeauthority-remote" => Ok(vec![attribute_authority_descriptor(keys, entity)?]),
        "adfs-sp-remote" => Ok(vec![sp_descriptor(keys, entity, &[SAMLP_NS, FED_NS])?]),
        "adfs-idp-hosted" => Ok(vec![
            idp_descriptor(keys, entity)?,
            security_token_service(keys, entity)?,
        ]),
        other => Err(SamlError::NotImplemented(format!("metadata for metadata set '{other}'"))),
    }
}

fn role(name: &str, protocols: &[&str]) -> Element {
    Element::new(MD_NS, name).with_attr("protocolSupportEnumeration", protocols.join(" "))
}

fn sp_descriptor(keys: &KeyResolver, entity: &EntityConfig, protocols: &[&str]) -> SamlResult<Element> {
    let mut descriptor = role("md:SPSSODescriptor", protocols);
    if let Some(signed) = entity.get_optional_bool("redirect.sign", None)? {
        descriptor.set_attr("AuthnRequestsSigned", signed.to_string());
    }
    if let Some(signed) = entity.get_optional_bool("saml20.sign.assertion", None)? {
        descriptor.set_attr("WantAssertionsSigned", signed.to_string());
    }

    Ok(descriptor
        .with_opt_child(extensions::role_extensions(entity, false))
        .with_children(key_descriptors(keys, entity)?)
        .with_children(endpoints(entity, "SingleLogoutService", false)?)
        .with_children(name_id_formats(entity)?)
        .with_children(endpoints(entity, "AssertionConsumerService", true)?)
        .with_opt_child(attribute_consuming_service(entity)?))
}

fn idp_descriptor(keys: &KeyResolver, entity: &EntityConfig) -> SamlResult<Element> {
    let mut descriptor = role("md:IDPSSODescriptor", &[SAMLP_NS]);
    if let Some(signed) = entity.get_optional_bool("redirect.sign", None)? {
        descriptor.set_attr("WantAuthnRequestsSigned", signed.to_string());
    }

    Ok(descriptor
        .with_opt_child(extensions::role_extensions(entity, true))
        .with_children(key_descriptors(keys, entity)?)
        .with_children(endpoints(entity, "ArtifactResolutionService", true)?)
        .with_children(endpoints(entity, "SingleLogoutService", false)?)
        .with_children(name_id_formats(entity)?)
        .with_children(endpoints(entity, "SingleSignOnService", false)?))
}

fn attribute_authority_descriptor(keys: &KeyResolver, entity: &EntityConfig) -> SamlResult<Element> {
    Ok(role("md:AttributeAuthorityDescriptor", &[SAMLP_NS])
        .with_opt_child(extensions::role_extensions(entity, true))
        .with_children(key_descriptors(keys, entity)?)
        .with_children(endpoints(entity, "AttributeService", false)?)
        .with_children(name_id_formats(entity)?))
}

/// WS-Federation passive requestor role of a hosted ADFS IdP.
fn security_token_service(keys: &KeyResolver, entity: &EntityConfig) -> SamlResult<Element> {
    let endpoint = entity
        .default_endpoint(
            "SingleSignOnService",
            &[SamlBinding::HttpRedirect, SamlBinding::HttpPost],
        )?
        .ok_or_else(|| SamlError::ConfigMissing {
            entity: entity.entity_id().to_string(),
            key: "SingleSignOnService".to_string(),
        })?;

    Ok(role("md:RoleDescriptor", &[FED_NS])
        .declare("fed", FED_NS)
        .with_ns_attr(XSI_NS, "xsi:type", "fed:SecurityTokenServiceType")
        .with_children(key_descriptors(keys, entity)?)
        .with_child(
            Element::new(FED_NS, "fed:PassiveRequestorEndpoint").with_child(
                Element::new(WSA_NS, "wsa:EndpointReference")
                    .with_child(Element::new(WSA_NS, "wsa:Address").with_text(endpoint.location)),
            ),
        ))
}

/// One `KeyDescriptor` per published certificate and declared usage.
fn key_descriptors(keys: &KeyResolver, entity: &EntityConfig) -> SamlResult<Vec<Element>> {
    let entries = keys.public_keys(entity, None, false, "")?;
    let mut descriptors = Vec::new();
    for entry in entries.iter().filter(|e| e.is_certificate()) {
        for (usage, declared) in [("signing", entry.signing), ("encryption", entry.encryption)] {
            if declared {
                descriptors.push(
                    Element::new(MD_NS, "md:KeyDescriptor").with_attr("use", usage).with_child(
                        Element::new(XMLDSIG_NS, "ds:KeyInfo").with_child(
                            Element::new(XMLDSIG_NS, "ds:X509Data").with_child(
                                Element::new(XMLDSIG_NS, "ds:X509Certificate")
                                    .with_text(entry.certificate_data.clone()),
                            ),
                        ),
                    ),
                );
            }
        }
    }
    Ok(descriptors)
}

fn name_id_formats(entity: &EntityConfig) -> SamlResult<Vec<Element>> {
    Ok(entity
        .get_optional_string_list("NameIDFormat")?
        .unwrap_or_default()
        .into_iter()
        .map(|format| Element::new(MD_NS, "md:NameIDFormat").with_text(format))
        .collect())
}

fn endpoints(entity: &EntityConfig, service: &str, indexed: bool) -> SamlResult<Vec<Element>> {
    let mut endpoints = entity.get_endpoints(service)?;
    if indexed {
        assign_indexes(&mut endpoints);
    }
    Ok(endpoints
        .into_iter()
        .map(|endpoint| {
            let mut element = Element::new(MD_NS, &format!("md:{service}"))
                .with_attr("Binding", endpoint.binding)
                .with_attr("Location", endpoint.location)
                .with_opt_attr("ResponseLocation", endpoint.response_location);
            if indexed {
                element = element.with_opt_attr("index", endpoint.index.map(|i| i.to_string()));
                element = element.with_opt_attr("isDefault", endpoint.is_default.map(|d| d.to_string()));
            }
            if let Some(binding) = endpoint.hok_protocol_binding {
                element = element.with_ns_attr(HOKSSO_NS, "hoksso:ProtocolBinding", binding);
            }
            element
        })
        .collect())
}

/// Gives every endpoint without an index the lowest index not yet taken.
pub(super) fn assign_indexes(endpoints: &mut [Endpoint]) {
    let mut used: BTreeSet<u32> = endpoints.iter().filter_map(|e| e.index).collect();
    let mut next = 0;
    for endpoint in endpoints.iter_mut().filter(|e| e.index.is_none()) {
        while used.contains(&next) {
            next += 1;
        }
        endpoint.index = Some(next);
        used.insert(next);
    }
}

fn attribute_consuming_service(entity: &EntityConfig) -> SamlResult<Option<Element>> {
    let attributes = entity.get_optional_string_list("attributes")?.unwrap_or_default();
    let Some(name) = entity.get_value("name") else {
        return Ok(None);
    };
    if attributes.is_empty() {
        return Ok(None);
    }

    let name_format = entity.get_optional_string("attributes.NameFormat", None)?;
    let required = entity.get_optional_string_list("attributes.required")?.unwrap_or_default();
    let index = entity.get_optional_integer("attributes.index", Some(0))?.unwrap_or(0);

    let mut service = Element::new(MD_NS, "md:AttributeConsumingService").with_attr("index", index.to_string());
    for (lang, text) in localized(name, "name")? {
        service.push(
            Element::new(MD_NS, "md:ServiceName")
                .with_ns_attr(XML_NS, "xml:lang", lang)
                .with_text(text),
        );
    }
    if let Some(description) = entity.get_value("description") {
        for (lang, text) in localized(description, "description")? {
            service.push(
                Element::new(MD_NS, "md:ServiceDescription")
                    .with_ns_attr(XML_NS, "xml:lang", lang)
                    .with_text(text),
            );
        }
    }
    for attribute in attributes {
        let is_required = required.contains(&attribute);
        service.push(
            Element::new(MD_NS, "md:RequestedAttribute")
                .with_attr("Name", attribute)
                .with_opt_attr("NameFormat", name_format.clone())
                .with_opt_attr("isRequired", is_required.then_some("true")),
        );
    }
    Ok(Some(service))
}
