//! Metadata extensions.
//!
//! Every block is built on its own. A malformed block is logged and left
//! out; it never fails the document.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::Deserialize;
use tracing::warn;

use super::localized;
use crate::config::{ConfigValue, EntityConfig};
use crate::error::{SamlError, SamlResult};
use crate::types::{format_instant, Attribute, MDATTR_NS, MDRPI_NS, MDUI_NS, MD_NS, SHIBMD_NS};
use crate::xml::{Element, XML_NS};

/// Characters marking a scope as a regular expression.
const REGEXP_MARKERS: &[char] = &['$', '^', ')', '(', '*', '|', '\\'];

/// Extensions of the `EntityDescriptor`.
pub(super) fn entity_extensions(entity: &EntityConfig) -> Option<Element> {
    let mut children = Vec::new();
    children.extend(isolated(entity, "EntityAttributes", entity_attributes(entity)));
    children.extend(isolated(entity, "RegistrationInfo", registration_info(entity)));
    wrap(children)
}

/// Extensions of a role descriptor. Scopes only apply to roles that
/// assert attributes.
pub(super) fn role_extensions(entity: &EntityConfig, with_scope: bool) -> Option<Element> {
    let mut children = Vec::new();
    if with_scope {
        children.extend(isolated(entity, "scope", scopes(entity)).unwrap_or_default());
    }
    children.extend(isolated(entity, "UIInfo", ui_info(entity)));
    children.extend(isolated(entity, "DiscoHints", disco_hints(entity)));
    wrap(children)
}

fn wrap(children: Vec<Element>) -> Option<Element> {
    (!children.is_empty()).then(|| Element::new(MD_NS, "md:Extensions").with_children(children))
}

fn isolated<T>(entity: &EntityConfig, block: &str, built: SamlResult<Option<T>>) -> Option<T> {
    built.unwrap_or_else(|error| {
        warn!(entity_id = entity.entity_id(), block, %error, "omitting malformed metadata extension");
        None
    })
}

fn scopes(entity: &EntityConfig) -> SamlResult<Option<Vec<Element>>> {
    let Some(scopes) = entity.get_optional_string_list("scope")? else {
        return Ok(None);
    };
    Ok(Some(
        scopes
            .into_iter()
            .map(|scope| {
                let regexp = scope.contains(REGEXP_MARKERS);
                Element::new(SHIBMD_NS, "shibmd:Scope")
                    .with_attr("regexp", if regexp { "true" } else { "false" })
                    .with_text(scope)
            })
            .collect(),
    ))
}

fn entity_attributes(entity: &EntityConfig) -> SamlResult<Option<Element>> {
    let Some(value) = entity.get_value("EntityAttributes") else {
        return Ok(None);
    };
    let ConfigValue::Map(attributes) = value else {
        return Err(SamlError::InvalidConfig(format!(
            "'EntityAttributes' must be a map, found {}",
            value.type_name()
        )));
    };

    let mut element = Element::new(MDATTR_NS, "mdattr:EntityAttributes");
    for (name, values) in attributes {
        let mut attribute = Attribute::new(name.clone(), values.as_string_list(name)?);
        attribute.name_format = Some(Attribute::NAME_FORMAT_URI.to_string());
        element.push(attribute.to_element());
    }
    Ok(Some(element))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RegistrationInfo {
    registration_authority: String,
    #[serde(default)]
    registration_instant: Option<i64>,
    #[serde(default)]
    policies: BTreeMap<String, String>,
}

fn registration_info(entity: &EntityConfig) -> SamlResult<Option<Element>> {
    let Some(value) = entity.get_value("RegistrationInfo") else {
        return Ok(None);
    };
    let info: RegistrationInfo = value.parse("RegistrationInfo")?;
    let instant = info
        .registration_instant
        .map(|secs| {
            DateTime::from_timestamp(secs, 0)
                .map(format_instant)
                .ok_or_else(|| SamlError::InvalidConfig(format!("registrationInstant {secs} is out of range")))
        })
        .transpose()?;

    Ok(Some(
        Element::new(MDRPI_NS, "mdrpi:RegistrationInfo")
            .with_attr("registrationAuthority", info.registration_authority)
            .with_opt_attr("registrationInstant", instant)
            .with_children(info.policies.into_iter().map(|(lang, url)| {
                Element::new(MDRPI_NS, "mdrpi:RegistrationPolicy")
                    .with_ns_attr(XML_NS, "xml:lang", lang)
                    .with_text(url)
            })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Logo {
    url: String,
    height: u32,
    width: u32,
    #[serde(default)]
    lang: Option<String>,
}

fn ui_info(entity: &EntityConfig) -> SamlResult<Option<Element>> {
    let Some(value) = entity.get_value("UIInfo") else {
        return Ok(None);
    };
    let ConfigValue::Map(info) = value else {
        return Err(SamlError::InvalidConfig(format!("'UIInfo' must be a map, found {}", value.type_name())));
    };

    let mut element = Element::new(MDUI_NS, "mdui:UIInfo");
    for (key, name) in [
        ("DisplayName", "mdui:DisplayName"),
        ("Description", "mdui:Description"),
        ("InformationURL", "mdui:InformationURL"),
        ("PrivacyStatementURL", "mdui:PrivacyStatementURL"),
    ] {
        if let Some(value) = info.get(key) {
            for (lang, text) in localized(value, key)? {
                element.push(
                    Element::new(MDUI_NS, name)
                        .with_ns_attr(XML_NS, "xml:lang", lang)
                        .with_text(text),
                );
            }
        }
    }
    if let Some(ConfigValue::Map(keywords)) = info.get("Keywords") {
        for (lang, words) in keywords {
            element.push(
                Element::new(MDUI_NS, "mdui:Keywords")
                    .with_ns_attr(XML_NS, "xml:lang", lang.clone())
                    .with_text(words.as_string_list("Keywords")?.join(" ")),
            );
        }
    }
    if let Some(logos) = info.get("Logo") {
        let logos: Vec<Logo> = logos.parse("Logo")?;
        for logo in logos {
            let mut logo_element = Element::new(MDUI_NS, "mdui:Logo")
                .with_attr("height", logo.height.to_string())
                .with_attr("width", logo.width.to_string())
                .with_text(logo.url);
            if let Some(lang) = logo.lang {
                logo_element = logo_element.with_ns_attr(XML_NS, "xml:lang", lang);
            }
            element.push(logo_element);
        }
    }

    let populated = element.elements().next().is_some();
    Ok(populated.then_some(element))
}

fn disco_hints(entity: &EntityConfig) -> SamlResult<Option<Element>> {
    let Some(value) = entity.get_value("DiscoHints") else {
        return Ok(None);
    };
    let ConfigValue::Map(hints) = value else {
        return Err(SamlError::InvalidConfig(format!("'DiscoHints' must be a map, found {}", value.type_name())));
    };

    let mut element = Element::new(MDUI_NS, "mdui:DiscoHints");
    for key in ["IPHint", "DomainHint", "GeolocationHint"] {
        if let Some(values) = hints.get(key) {
            for hint in values.as_string_list(key)? {
                element.push(Element::new(MDUI_NS, &format!("mdui:{key}")).with_text(hint));
            }
        }
    }
    let populated = element.elements().next().is_some();
    Ok(populated.then_some(element))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_detect_regular_expressions() {
        let entity = EntityConfig::new("idp").with("scope", vec!["example.org", "^.*\\.example\\.org$"]);
        let scopes = scopes(&entity).unwrap().unwrap();
        assert_eq!(scopes[0].attr("regexp"), Some("false"));
        assert_eq!(scopes[1].attr("regexp"), Some("true"));
        assert_eq!(scopes[1].text(), "^.*\\.example\\.org$");
    }

    #[test]
    fn malformed_block_is_omitted_and_others_kept() {
        let entity = EntityConfig::new("sp")
            .with("RegistrationInfo", [("unexpected", "value")])
            .with("EntityAttributes", [("http://macedir.org/entity-category", vec!["http://refeds.org/category/research-and-scholarship"])]);

        let extensions = entity_extensions(&entity).unwrap();
        assert!(extensions.child(MDATTR_NS, "EntityAttributes").is_some());
        assert!(extensions.child(MDRPI_NS, "RegistrationInfo").is_none());
    }

    #[test]
    fn registration_info_with_policies() {
        let entity = EntityConfig::new("sp").with(
            "RegistrationInfo",
            [
                ("registrationAuthority", ConfigValue::from("https://fed.example/")),
                ("registrationInstant", ConfigValue::from(1_700_000_000_i64)),
                ("policies", ConfigValue::from([("en", "https://fed.example/policy")])),
            ],
        );
        let info = registration_info(&entity).unwrap().unwrap();
        assert_eq!(info.attr("registrationAuthority"), Some("https://fed.example/"));
        assert_eq!(info.attr("registrationInstant"), Some("2023-11-14T22:13:20Z"));
        let policy = info.child(MDRPI_NS, "RegistrationPolicy").unwrap();
        assert_eq!(policy.ns_attr(XML_NS, "lang"), Some("en"));
    }

    #[test]
    fn ui_info_and_disco_hints() {
        let entity = EntityConfig::new("idp")
            .with(
                "UIInfo",
                [
                    ("DisplayName", ConfigValue::from([("en", "Example"), ("nb", "Eksempel")])),
                    ("Keywords", ConfigValue::from([("en", vec!["university", "research"])])),
                ],
            )
            .with("DiscoHints", [("DomainHint", vec!["example.org"])]);

        let extensions = role_extensions(&entity, false).unwrap();
        let ui = extensions.child(MDUI_NS, "UIInfo").unwrap();
        assert_eq!(ui.children_named(MDUI_NS, "DisplayName").count(), 2);
        assert_eq!(ui.child_text(MDUI_NS, "Keywords").as_deref(), Some("university research"));
        let hints = extensions.child(MDUI_NS, "DiscoHints").unwrap();
        assert_eq!(hints.child_text(MDUI_NS, "DomainHint").as_deref(), Some("example.org"));
    }

    #[test]
    fn nothing_configured_means_no_extensions() {
        assert!(entity_extensions(&EntityConfig::new("sp")).is_none());
        assert!(role_extensions(&EntityConfig::new("sp"), true).is_none());
    }
}
