//! Global federation options.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::keys::KeyTable;

/// Smallest and largest accepted clock skew, in seconds.
const CLOCK_SKEW_RANGE: std::ops::RangeInclusive<i64> = 180..=300;
const DEFAULT_CLOCK_SKEW: i64 = 180;

/// Global configuration shared by every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FederationConfig {
    /// Directory relative key and certificate paths are resolved against.
    pub certdir: PathBuf,

    /// Assertion processing options.
    pub assertion: AssertionConfig,

    /// Metadata publication options.
    pub metadata: MetadataConfig,

    /// Table holding keys addressed as `pdo://<id>`.
    pub keystore: KeyTable,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            certdir: PathBuf::from("cert"),
            assertion: AssertionConfig::default(),
            metadata: MetadataConfig::default(),
            keystore: KeyTable::default(),
        }
    }
}

impl FederationConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] on malformed input, unknown keys
    /// or invalid keystore identifiers.
    pub fn from_toml_str(text: &str) -> SamlResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SamlError::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.keystore.validate()?;
        Ok(config)
    }

    /// Loads a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> SamlResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SamlError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Returns the allowed clock skew, falling back to 180 seconds when the
    /// configured value lies outside 180..=300.
    #[must_use]
    pub fn allowed_clock_skew(&self) -> Duration {
        let configured = self.assertion.allowed_clock_skew;
        let seconds = if CLOCK_SKEW_RANGE.contains(&configured) {
            configured
        } else {
            DEFAULT_CLOCK_SKEW
        };
        Duration::from_secs(seconds.unsigned_abs())
    }
}

/// `[assertion]` options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssertionConfig {
    /// Clock skew tolerated in validity checks, in seconds.
    pub allowed_clock_skew: i64,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            allowed_clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

/// `[metadata]` options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    /// `[metadata.sign]` options.
    pub sign: MetadataSignConfig,
}

/// Global metadata signing options, overridden per entity by
/// `metadata.sign.*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataSignConfig {
    /// Sign generated metadata.
    pub enable: bool,

    /// Private key location.
    pub privatekey: Option<String>,

    /// Private key passphrase.
    pub privatekey_pass: Option<String>,

    /// Certificate location.
    pub certificate: Option<String>,

    /// Signature algorithm URI.
    pub algorithm: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FederationConfig::default();
        assert_eq!(config.certdir, PathBuf::from("cert"));
        assert_eq!(config.allowed_clock_skew(), Duration::from_secs(180));
        assert!(!config.metadata.sign.enable);
    }

    #[test]
    fn parses_toml() {
        let config = FederationConfig::from_toml_str(
            r#"
            certdir = "/etc/federation/cert"

            [assertion]
            allowed_clock_skew = 240

            [metadata.sign]
            enable = true
            privatekey = "metadata.pem"
            certificate = "metadata.crt"

            [keystore]
            table = "saml_keys"
            "#,
        )
        .unwrap();
        assert_eq!(config.allowed_clock_skew(), Duration::from_secs(240));
        assert_eq!(config.metadata.sign.privatekey.as_deref(), Some("metadata.pem"));
        assert_eq!(config.keystore.table, "saml_keys");
        assert_eq!(config.keystore.id_column, "id");
    }

    #[test]
    fn skew_outside_range_falls_back() {
        for skew in [0, 179, 301, 3600] {
            let mut config = FederationConfig::default();
            config.assertion.allowed_clock_skew = skew;
            assert_eq!(config.allowed_clock_skew(), Duration::from_secs(180), "skew {skew}");
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = FederationConfig::from_toml_str("[assertion]\nallowed_skew = 200").unwrap_err();
        assert!(matches!(err, SamlError::InvalidConfig(_)));
    }

    #[test]
    fn keystore_identifiers_are_validated() {
        let err = FederationConfig::from_toml_str("[keystore]\ntable = \"keys; drop table x\"");
        assert!(err.is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("federation.toml");
        std::fs::write(&path, "certdir = \"keys\"\n").unwrap();
        assert_eq!(FederationConfig::load(&path).unwrap().certdir, PathBuf::from("keys"));
        assert!(FederationConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
