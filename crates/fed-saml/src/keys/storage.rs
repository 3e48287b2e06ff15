//! Key storage backends.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SamlError, SamlResult};

/// Reads key files.
///
/// Implementations must be thread-safe.
pub trait KeyStorage: Send + Sync {
    /// Reads the whole file at `path`.
    ///
    /// ## Errors
    ///
    /// Returns the underlying I/O error.
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Reads key files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileKeyStorage;

impl KeyStorage for FileKeyStorage {
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Looks up keys stored in a database table (`pdo://<id>` locations).
///
/// Implementations must be thread-safe.
pub trait KeyDatabase: Send + Sync {
    /// Fetches the key data stored under `id`.
    ///
    /// Returns `Ok(None)` when no row matches.
    ///
    /// ## Errors
    ///
    /// Returns an error if the database cannot be queried.
    fn fetch_key(&self, table: &KeyTable, id: &str) -> SamlResult<Option<Vec<u8>>>;
}

/// Table and columns holding database-stored keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyTable {
    /// Table name.
    pub table: String,

    /// Column matched against the key identifier.
    pub id_column: String,

    /// Column holding the PEM data.
    pub data_column: String,
}

impl Default for KeyTable {
    fn default() -> Self {
        Self {
            table: "keys".to_string(),
            id_column: "id".to_string(),
            data_column: "data".to_string(),
        }
    }
}

impl KeyTable {
    /// Checks that every name is a plain SQL identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] for anything else.
    pub fn validate(&self) -> SamlResult<()> {
        for (what, name) in [
            ("table", &self.table),
            ("id_column", &self.id_column),
            ("data_column", &self.data_column),
        ] {
            if !is_identifier(name) {
                return Err(SamlError::InvalidConfig(format!(
                    "keystore {what} '{name}' is not a valid SQL identifier"
                )));
            }
        }
        Ok(())
    }

    /// Returns the parameterized lookup query.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`] if a name is not an identifier.
    pub fn select_sql(&self) -> SamlResult<String> {
        self.validate()?;
        Ok(format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.data_column, self.table, self.id_column
        ))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// In-memory [`KeyDatabase`].
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyDatabase {
    rows: BTreeMap<String, Vec<u8>>,
}

impl MemoryKeyDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with a key stored under `id`.
    #[must_use]
    pub fn with_key(mut self, id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.rows.insert(id.into(), data.into());
        self
    }
}

impl KeyDatabase for MemoryKeyDatabase {
    fn fetch_key(&self, table: &KeyTable, id: &str) -> SamlResult<Option<Vec<u8>>> {
        let sql = table.select_sql()?;
        debug!(%sql, id, "key lookup");
        Ok(self.rows.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_sql_uses_configured_names() {
        let table = KeyTable {
            table: "saml_keys".into(),
            id_column: "key_id".into(),
            data_column: "pem".into(),
        };
        assert_eq!(table.select_sql().unwrap(), "SELECT pem FROM saml_keys WHERE key_id = ?");
    }

    #[test]
    fn identifiers_are_checked() {
        for bad in ["", "1keys", "keys;", "a b", "k\"ey"] {
            let table = KeyTable {
                table: bad.into(),
                ..KeyTable::default()
            };
            assert!(table.validate().is_err(), "{bad:?} accepted");
        }
        assert!(KeyTable::default().validate().is_ok());
    }

    #[test]
    fn memory_database_lookup() {
        let db = MemoryKeyDatabase::new().with_key("sp-key", b"PEM".to_vec());
        let table = KeyTable::default();
        assert_eq!(db.fetch_key(&table, "sp-key").unwrap().as_deref(), Some(&b"PEM"[..]));
        assert!(db.fetch_key(&table, "other").unwrap().is_none());
    }

    #[test]
    fn file_storage_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.pem");
        std::fs::write(&path, "data").unwrap();
        assert_eq!(FileKeyStorage.read(&path).unwrap(), b"data");
        assert!(FileKeyStorage.read(&dir.path().join("missing")).is_err());
    }
}
