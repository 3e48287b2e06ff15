//! Entity and federation configuration.
//!
//! [`EntityConfig`] is one entity's metadata (own or partner) as an immutable
//! key/value map with dotted keys such as `signature.privatekey`.
//! [`MetadataView`] pairs a source and a destination entity and resolves
//! per-flag precedence. [`FederationConfig`] holds the typed global options.

mod endpoints;
mod federation;
mod view;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use endpoints::Endpoint;
pub use federation::{AssertionConfig, FederationConfig, MetadataConfig, MetadataSignConfig};
pub use view::{MetadataView, Side};

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Explicit null; treated as absent.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// String.
    String(String),
    /// Ordered list.
    List(Vec<ConfigValue>),
    /// Nested map.
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Returns a short name of the value's type for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Returns true for empty strings, lists and maps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Map(m) => m.is_empty(),
            Self::Bool(_) | Self::Integer(_) => false,
        }
    }

    /// Deserializes the value into a typed structure.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] if the shape does not match.
    pub fn parse<T: DeserializeOwned>(&self, key: &str) -> SamlResult<T> {
        let json = serde_json::to_value(self)
            .map_err(|e| SamlError::InvalidConfig(format!("'{key}': {e}")))?;
        serde_json::from_value(json).map_err(|e| SamlError::InvalidConfig(format!("'{key}': {e}")))
    }

    pub(crate) fn as_bool(&self, key: &str) -> SamlResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(type_error(key, "boolean", other)),
        }
    }

    pub(crate) fn as_string(&self, key: &str) -> SamlResult<String> {
        match self {
            Self::String(s) => Ok(s.clone()),
            other => Err(type_error(key, "string", other)),
        }
    }

    pub(crate) fn as_integer(&self, key: &str) -> SamlResult<i64> {
        match self {
            Self::Integer(i) => Ok(*i),
            other => Err(type_error(key, "integer", other)),
        }
    }

    /// A single string counts as a one-element list.
    pub(crate) fn as_string_list(&self, key: &str) -> SamlResult<Vec<String>> {
        match self {
            Self::String(s) => Ok(vec![s.clone()]),
            Self::List(items) => items.iter().map(|i| i.as_string(key)).collect(),
            other => Err(type_error(key, "list of strings", other)),
        }
    }
}

fn type_error(key: &str, expected: &str, found: &ConfigValue) -> SamlError {
    SamlError::InvalidConfig(format!(
        "'{key}' must be a {expected}, found {}",
        found.type_name()
    ))
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<ConfigValue>, const N: usize> From<[(K, V); N]> for ConfigValue {
    fn from(entries: [(K, V); N]) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Key usage of a published certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    /// Signature verification.
    Signing,
    /// Key transport for encryption.
    Encryption,
}

/// A public key entry from the `keys` option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublicKeyEntry {
    /// Key type; only `X509Certificate` is used.
    #[serde(rename = "type", default = "default_key_type")]
    pub key_type: String,

    /// Base64 DER certificate.
    #[serde(rename = "X509Certificate")]
    pub certificate_data: String,

    /// Usable for signature verification.
    #[serde(default = "default_true")]
    pub signing: bool,

    /// Usable for encryption.
    #[serde(default = "default_true")]
    pub encryption: bool,

    /// Optional key name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_key_type() -> String {
    "X509Certificate".to_string()
}

const fn default_true() -> bool {
    true
}

impl PublicKeyEntry {
    /// Creates a certificate entry usable for both signing and encryption.
    #[must_use]
    pub fn certificate(certificate_data: impl Into<String>) -> Self {
        Self {
            key_type: default_key_type(),
            certificate_data: certificate_data.into(),
            signing: true,
            encryption: true,
            name: None,
        }
    }

    /// Returns true if the entry is declared for `usage`.
    #[must_use]
    pub const fn has_usage(&self, usage: KeyUsage) -> bool {
        match usage {
            KeyUsage::Signing => self.signing,
            KeyUsage::Encryption => self.encryption,
        }
    }

    /// Returns true for X.509 certificate entries.
    #[must_use]
    pub fn is_certificate(&self) -> bool {
        self.key_type == "X509Certificate"
    }
}

impl From<PublicKeyEntry> for ConfigValue {
    fn from(entry: PublicKeyEntry) -> Self {
        let mut map = BTreeMap::new();
        map.insert("type".to_string(), Self::String(entry.key_type));
        map.insert("X509Certificate".to_string(), Self::String(entry.certificate_data));
        map.insert("signing".to_string(), Self::Bool(entry.signing));
        map.insert("encryption".to_string(), Self::Bool(entry.encryption));
        if let Some(name) = entry.name {
            map.insert("name".to_string(), Self::String(name));
        }
        Self::Map(map)
    }
}

/// One entity's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl EntityConfig {
    /// Creates a configuration holding only the entity ID.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        let entity_id: String = entity_id.into();
        Self::default().with("entityid", entity_id)
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] on malformed input.
    pub fn from_toml(text: &str) -> SamlResult<Self> {
        toml::from_str(text).map_err(|e| SamlError::InvalidConfig(e.to_string()))
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] on malformed input.
    pub fn from_json(text: &str) -> SamlResult<Self> {
        serde_json::from_str(text).map_err(|e| SamlError::InvalidConfig(e.to_string()))
    }

    /// Returns a copy with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Returns the entity ID, or an empty string when unset.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        match self.values.get("entityid") {
            Some(ConfigValue::String(id)) => id,
            _ => "",
        }
    }

    /// Returns the value of `key` unless absent or null.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&ConfigValue> {
        self.values
            .get(key)
            .filter(|v| !matches!(v, ConfigValue::Null))
    }

    /// Returns true if `key` is set to a non-null value.
    #[must_use]
    pub fn has_value(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }

    fn missing(&self, key: &str) -> SamlError {
        SamlError::ConfigMissing {
            entity: self.entity_id().to_string(),
            key: key.to_string(),
        }
    }

    /// Returns a boolean option, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] if the value is not a boolean.
    pub fn get_optional_bool(&self, key: &str, default: Option<bool>) -> SamlResult<Option<bool>> {
        self.get_value(key)
            .map_or(Ok(default), |v| v.as_bool(key).map(Some))
    }

    /// Returns a string option, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] if the value is not a string.
    pub fn get_optional_string(&self, key: &str, default: Option<&str>) -> SamlResult<Option<String>> {
        self.get_value(key).map_or_else(
            || Ok(default.map(str::to_string)),
            |v| v.as_string(key).map(Some),
        )
    }

    /// Returns an integer option, or `default` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] if the value is not an integer.
    pub fn get_optional_integer(&self, key: &str, default: Option<i64>) -> SamlResult<Option<i64>> {
        self.get_value(key)
            .map_or(Ok(default), |v| v.as_integer(key).map(Some))
    }

    /// Returns a required string option.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::ConfigMissing`] when unset, or
    /// [`SamlError::InvalidConfig`] if it is not a string.
    pub fn get_string(&self, key: &str) -> SamlResult<String> {
        self.get_value(key)
            .ok_or_else(|| self.missing(key))?
            .as_string(key)
    }

    /// Returns a list of strings; a single string is a one-element list.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] on other value types.
    pub fn get_optional_string_list(&self, key: &str) -> SamlResult<Option<Vec<String>>> {
        self.get_value(key)
            .map(|v| v.as_string_list(key))
            .transpose()
    }

    /// Returns the public keys published under `<prefix>keys` or, failing
    /// that, the single certificate in `<prefix>certData`.
    ///
    /// Entries are filtered by `usage` when given.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::KeyNotFound`] if `required` and nothing matches.
    pub fn get_public_keys(
        &self,
        usage: Option<KeyUsage>,
        required: bool,
        prefix: &str,
    ) -> SamlResult<Vec<PublicKeyEntry>> {
        let keys_key = format!("{prefix}keys");
        let cert_key = format!("{prefix}certData");

        let mut keys: Vec<PublicKeyEntry> = if let Some(value) = self.get_value(&keys_key) {
            value.parse(&keys_key)?
        } else if let Some(value) = self.get_value(&cert_key) {
            vec![PublicKeyEntry::certificate(value.as_string(&cert_key)?)]
        } else {
            Vec::new()
        };
        if let Some(usage) = usage {
            keys.retain(|k| k.has_usage(usage));
        }

        if required && keys.is_empty() {
            return Err(SamlError::KeyNotFound(format!(
                "no public key in metadata for '{}'",
                self.entity_id()
            )));
        }
        Ok(keys)
    }

    /// Returns the endpoints of `service`.
    ///
    /// A plain string is one endpoint with the service's default binding.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] on malformed entries.
    pub fn get_endpoints(&self, service: &str) -> SamlResult<Vec<Endpoint>> {
        let Some(value) = self.get_value(service) else {
            return Ok(Vec::new());
        };
        let items: Vec<&ConfigValue> = match value {
            ConfigValue::List(items) => items.iter().collect(),
            other => vec![other],
        };
        items
            .into_iter()
            .map(|item| match item {
                ConfigValue::String(location) => Ok(Endpoint::new(
                    endpoints::default_binding(service)?,
                    location.clone(),
                )),
                other => other.parse::<Endpoint>(service),
            })
            .collect()
    }

    /// Returns the default endpoint of `service` among `bindings`.
    ///
    /// The first endpoint flagged `isDefault = true` wins, then the first
    /// without an `isDefault` flag, then the first.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] on malformed entries.
    pub fn default_endpoint(
        &self,
        service: &str,
        bindings: &[SamlBinding],
    ) -> SamlResult<Option<Endpoint>> {
        let candidates: Vec<Endpoint> = self
            .get_endpoints(service)?
            .into_iter()
            .filter(|e| bindings.iter().any(|b| b.uri() == e.binding))
            .collect();
        Ok(endpoints::pick_default(candidates))
    }

    /// Returns the first endpoint of `service` for the first binding in
    /// `bindings` that has one.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] on malformed entries.
    pub fn endpoint_prioritized_by_binding(
        &self,
        service: &str,
        bindings: &[SamlBinding],
    ) -> SamlResult<Option<Endpoint>> {
        let endpoints = self.get_endpoints(service)?;
        Ok(bindings.iter().find_map(|binding| {
            endpoints
                .iter()
                .find(|e| e.binding == binding.uri())
                .cloned()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> EntityConfig {
        EntityConfig::from_toml(
            r#"
            entityid = "https://sp.example.com"
            "sign.authnrequest" = true
            "assertion.lifetime" = 300
            NameIDPolicy = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent"
            "saml:Audience" = ["urn:a", "urn:b"]
            AssertionConsumerService = "https://sp.example.com/acs"

            [[keys]]
            X509Certificate = "AAAA"
            encryption = false

            [[keys]]
            X509Certificate = "BBBB"
            signing = false

            [[SingleLogoutService]]
            Binding = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
            Location = "https://sp.example.com/slo-post"

            [[SingleLogoutService]]
            Binding = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"
            Location = "https://sp.example.com/slo"
            ResponseLocation = "https://sp.example.com/slo-response"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn typed_getters() {
        let cfg = entity();
        assert_eq!(cfg.entity_id(), "https://sp.example.com");
        assert_eq!(cfg.get_optional_bool("sign.authnrequest", None).unwrap(), Some(true));
        assert_eq!(cfg.get_optional_bool("sign.logout", Some(false)).unwrap(), Some(false));
        assert_eq!(cfg.get_optional_integer("assertion.lifetime", None).unwrap(), Some(300));
        assert_eq!(
            cfg.get_optional_string_list("saml:Audience").unwrap(),
            Some(vec!["urn:a".to_string(), "urn:b".to_string()])
        );
        assert!(cfg.has_value("NameIDPolicy"));
        assert!(!cfg.has_value("sharedkey"));
    }

    #[test]
    fn wrong_type_is_invalid_config() {
        let cfg = entity();
        assert!(matches!(
            cfg.get_optional_bool("assertion.lifetime", None),
            Err(SamlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_required_string() {
        let err = entity().get_string("privatekey").unwrap_err();
        assert!(matches!(err, SamlError::ConfigMissing { ref key, .. } if key == "privatekey"));
    }

    #[test]
    fn null_counts_as_absent() {
        let cfg = EntityConfig::from_json(r#"{"entityid": "x", "sharedkey": null}"#).unwrap();
        assert!(!cfg.has_value("sharedkey"));
    }

    #[test]
    fn public_keys_by_usage() {
        let cfg = entity();
        let signing = cfg.get_public_keys(Some(KeyUsage::Signing), false, "").unwrap();
        assert_eq!(signing.len(), 1);
        assert_eq!(signing[0].certificate_data, "AAAA");

        let all = cfg.get_public_keys(None, true, "").unwrap();
        assert_eq!(all.len(), 2);

        assert!(cfg.get_public_keys(None, true, "new_").is_err());
        assert!(cfg.get_public_keys(None, false, "new_").unwrap().is_empty());
    }

    #[test]
    fn cert_data_fallback_is_dual_use() {
        let cfg = EntityConfig::new("idp").with("certData", "CCCC");
        let keys = cfg.get_public_keys(Some(KeyUsage::Encryption), true, "").unwrap();
        assert_eq!(keys, [PublicKeyEntry::certificate("CCCC")]);
    }

    #[test]
    fn unknown_key_entry_fields_are_rejected() {
        let cfg = EntityConfig::new("idp").with(
            "keys",
            vec![ConfigValue::from([("X509Certificate", "A"), ("usage", "sign")])],
        );
        assert!(matches!(
            cfg.get_public_keys(None, false, ""),
            Err(SamlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn string_endpoint_gets_default_binding() {
        let acs = entity().get_endpoints("AssertionConsumerService").unwrap();
        assert_eq!(acs.len(), 1);
        assert_eq!(acs[0].binding, SamlBinding::HttpPost.uri());
    }

    #[test]
    fn endpoint_priority_follows_binding_order() {
        let cfg = entity();
        let slo = cfg
            .endpoint_prioritized_by_binding(
                "SingleLogoutService",
                &[SamlBinding::HttpRedirect, SamlBinding::HttpPost],
            )
            .unwrap()
            .unwrap();
        assert_eq!(slo.location, "https://sp.example.com/slo");
        assert_eq!(slo.response_location.as_deref(), Some("https://sp.example.com/slo-response"));

        let none = cfg
            .endpoint_prioritized_by_binding("SingleLogoutService", &[SamlBinding::HttpArtifact])
            .unwrap();
        assert!(none.is_none());
    }
}
