//! Metadata documents (`md:EntityDescriptor`) built from configuration.
//!
//! The role descriptors published depend on the entity's `metadata-set`.
//! Organization and contact information, extensions and key descriptors
//! are taken from the same configuration. The document is signed when
//! `metadata.sign.enable` is set on the entity or globally.

mod extensions;
mod roles;

use std::borrow::Cow;

use chrono::DateTime;
use fed_crypto::random::message_id;
use fed_crypto::SignatureAlgorithm;
use serde::Deserialize;
use tracing::debug;

use crate::config::{ConfigValue, EntityConfig, FederationConfig};
use crate::error::{SamlError, SamlResult};
use crate::keys::KeyResolver;
use crate::signing::SigningKey;
use crate::types::{format_instant, MD_NS};
use crate::xml::{Element, NsScope, XML_NS};

/// A built metadata document.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDocument {
    /// The described entity.
    pub entity_id: String,
    /// The `md:EntityDescriptor` element.
    pub element: Element,
    /// Whether an enveloped signature was added.
    pub signed: bool,
}

impl MetadataDocument {
    /// Serializes the document with an XML declaration.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.element.to_document()
    }
}

/// Builds metadata documents.
#[derive(Debug, Clone, Copy)]
pub struct MetadataBuilder<'a> {
    config: &'a FederationConfig,
    keys: &'a KeyResolver,
}

impl<'a> MetadataBuilder<'a> {
    /// Creates a builder using the global metadata signing options of
    /// `config`.
    #[must_use]
    pub const fn new(config: &'a FederationConfig, keys: &'a KeyResolver) -> Self {
        Self { config, keys }
    }

    /// Builds the `EntityDescriptor` of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigMissing`] without `entityid` or
    /// `metadata-set`, [`SamlError::NotImplemented`] for an unknown metadata
    /// set, or a key error when signing is enabled without a usable key.
    pub fn build(&self, entity: &EntityConfig) -> SamlResult<MetadataDocument> {
        let entity_id = entity.get_string("entityid")?;
        let metadata_set = entity.get_string("metadata-set")?;

        let mut descriptor = Element::new(MD_NS, "md:EntityDescriptor")
            .declare("md", MD_NS)
            .with_attr("entityID", entity_id.clone());
        if let Some(expire) = entity.get_optional_integer("expire", None)? {
            let valid_until = DateTime::from_timestamp(expire, 0)
                .ok_or_else(|| SamlError::InvalidConfig(format!("'expire' {expire} is out of range")))?;
            descriptor.set_attr("validUntil", format_instant(valid_until));
        }
        if let Some(cache_duration) = entity.get_optional_string("cacheDuration", None)? {
            descriptor.set_attr("cacheDuration", cache_duration);
        }

        let mut descriptor = descriptor
            .with_opt_child(extensions::entity_extensions(entity))
            .with_children(roles::role_descriptors(self.keys, entity, &metadata_set)?)
            .with_opt_child(organization(entity)?)
            .with_children(contacts(entity)?);

        let signed = match self.signing_key(entity)? {
            Some(key) => {
                descriptor.set_attr("ID", message_id());
                key.signer().sign_element(&mut descriptor, &NsScope::new())?;
                true
            }
            None => false,
        };
        debug!(entity_id = %entity_id, metadata_set = %metadata_set, signed, "built metadata");

        Ok(MetadataDocument {
            entity_id,
            element: descriptor,
            signed,
        })
    }

    /// Resolves the metadata signing key, or `None` when signing is off.
    ///
    /// The key and certificate come from the entity's `metadata.sign.*`
    /// options, else the global ones, else the entity's own `privatekey`
    /// and `certificate`.
    fn signing_key(&self, entity: &EntityConfig) -> SamlResult<Option<SigningKey>> {
        let global = &self.config.metadata.sign;
        let enabled = entity
            .get_optional_bool("metadata.sign.enable", Some(global.enable))?
            .unwrap_or(false);
        if !enabled {
            return Ok(None);
        }

        let (owner, prefix): (Cow<'_, EntityConfig>, &str) = if entity.has_value("metadata.sign.privatekey") {
            (Cow::Borrowed(entity), "metadata.sign.")
        } else if let Some(privatekey) = &global.privatekey {
            let mut owner = EntityConfig::new(entity.entity_id()).with("privatekey", privatekey.as_str());
            if let Some(pass) = &global.privatekey_pass {
                owner = owner.with("privatekey_pass", pass.as_str());
            }
            if let Some(certificate) = &global.certificate {
                owner = owner.with("certificate", certificate.as_str());
            }
            (Cow::Owned(owner), "")
        } else {
            (Cow::Borrowed(entity), "")
        };

        let material = self
            .keys
            .load_private_key(&owner, true, prefix, false)?
            .ok_or_else(|| SamlError::KeyNotFound(format!("no metadata signing key for '{}'", entity.entity_id())))?;
        let certificate = self
            .keys
            .load_public_key(&owner, false, prefix)?
            .and_then(|cert| cert.cert_data);

        let algorithm = match entity.get_optional_string("metadata.sign.algorithm", global.algorithm.as_deref())? {
            Some(uri) => SignatureAlgorithm::from_uri(&uri)?,
            None => SignatureAlgorithm::default(),
        };

        Ok(Some(SigningKey {
            key: material.private_key()?,
            certificate,
            algorithm,
        }))
    }
}

/// Reads a string or a language map as `(lang, text)` pairs. A plain
/// string is English.
fn localized(value: &ConfigValue, key: &str) -> SamlResult<Vec<(String, String)>> {
    match value {
        ConfigValue::String(text) => Ok(vec![("en".to_string(), text.clone())]),
        ConfigValue::Map(entries) => entries
            .iter()
            .map(|(lang, text)| Ok((lang.clone(), text.as_string(key)?)))
            .collect(),
        other => Err(SamlError::InvalidConfig(format!(
            "'{key}' must be a string or a language map, found {}",
            other.type_name()
        ))),
    }
}

/// The `Organization` block, present only when name, display name and URL
/// are all configured.
fn organization(entity: &EntityConfig) -> SamlResult<Option<Element>> {
    let (Some(name), Some(display_name), Some(url)) = (
        entity.get_value("OrganizationName"),
        entity.get_value("OrganizationDisplayName"),
        entity.get_value("OrganizationURL"),
    ) else {
        return Ok(None);
    };

    let mut organization = Element::new(MD_NS, "md:Organization");
    for (key, element_name, value) in [
        ("OrganizationName", "md:OrganizationName", name),
        ("OrganizationDisplayName", "md:OrganizationDisplayName", display_name),
        ("OrganizationURL", "md:OrganizationURL", url),
    ] {
        for (lang, text) in localized(value, key)? {
            organization.push(
                Element::new(MD_NS, element_name)
                    .with_ns_attr(XML_NS, "xml:lang", lang)
                    .with_text(text),
            );
        }
    }
    Ok(Some(organization))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Contact {
    #[serde(rename = "contactType", default)]
    contact_type: Option<String>,
    #[serde(rename = "emailAddress", default)]
    email_address: Option<ConfigValue>,
    #[serde(default)]
    company: Option<String>,
    #[serde(rename = "givenName", default)]
    given_name: Option<String>,
    #[serde(rename = "surName", default)]
    sur_name: Option<String>,
    #[serde(rename = "telephoneNumber", default)]
    telephone_number: Option<ConfigValue>,
}

/// Contact persons having both a type and an e-mail address.
fn contacts(entity: &EntityConfig) -> SamlResult<Vec<Element>> {
    let Some(value) = entity.get_value("contacts") else {
        return Ok(Vec::new());
    };
    let contacts: Vec<Contact> = value.parse("contacts")?;

    let mut elements = Vec::new();
    for contact in contacts {
        let (Some(contact_type), Some(emails)) = (contact.contact_type, contact.email_address) else {
            continue;
        };
        let mut person = Element::new(MD_NS, "md:ContactPerson")
            .with_attr("contactType", contact_type)
            .with_opt_child(contact.company.map(|c| Element::new(MD_NS, "md:Company").with_text(c)))
            .with_opt_child(contact.given_name.map(|n| Element::new(MD_NS, "md:GivenName").with_text(n)))
            .with_opt_child(contact.sur_name.map(|n| Element::new(MD_NS, "md:SurName").with_text(n)));
        for email in emails.as_string_list("emailAddress")? {
            let email = if email.starts_with("mailto:") {
                email
            } else {
                format!("mailto:{email}")
            };
            person.push(Element::new(MD_NS, "md:EmailAddress").with_text(email));
        }
        if let Some(phones) = contact.telephone_number {
            for phone in phones.as_string_list("telephoneNumber")? {
                person.push(Element::new(MD_NS, "md:TelephoneNumber").with_text(phone));
            }
        }
        elements.push(person);
    }
    Ok(elements)
}
