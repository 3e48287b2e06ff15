//! Two-sided configuration lookups.
//!
//! Every policy decision names its own lookup order as a list of
//! `(side, key)` pairs; the first non-null value wins.

use super::{ConfigValue, EntityConfig};
use crate::error::SamlResult;

/// Which entity of a [`MetadataView`] to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The sender of the message.
    Source,
    /// The recipient of the message.
    Destination,
}

/// Source and destination configuration of one exchange.
#[derive(Debug, Clone, Copy)]
pub struct MetadataView<'a> {
    /// The sender.
    pub source: &'a EntityConfig,
    /// The recipient.
    pub destination: &'a EntityConfig,
}

impl<'a> MetadataView<'a> {
    /// Creates a view over a sender and a recipient.
    #[must_use]
    pub const fn new(source: &'a EntityConfig, destination: &'a EntityConfig) -> Self {
        Self { source, destination }
    }

    /// Returns the configuration of `side`.
    #[must_use]
    pub const fn side(&self, side: Side) -> &'a EntityConfig {
        match side {
            Side::Source => self.source,
            Side::Destination => self.destination,
        }
    }

    /// Returns the first non-null value along `order`.
    #[must_use]
    pub fn resolve<'k>(&self, order: &[(Side, &'k str)]) -> Option<(&'a ConfigValue, &'k str)> {
        order.iter().find_map(|(side, key)| {
            self.side(*side).get_value(key).map(|v| (v, *key))
        })
    }

    /// Resolves a boolean flag, `default` when unset on both sides.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidConfig`](crate::SamlError::InvalidConfig)
    /// if the winning value is not a boolean.
    pub fn first_bool(&self, order: &[(Side, &str)], default: bool) -> SamlResult<bool> {
        self.resolve(order)
            .map_or(Ok(default), |(v, key)| v.as_bool(key))
    }

    /// Resolves an optional boolean flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the winning value is not a boolean.
    pub fn optional_bool(&self, order: &[(Side, &str)]) -> SamlResult<Option<bool>> {
        self.resolve(order)
            .map(|(v, key)| v.as_bool(key))
            .transpose()
    }

    /// Resolves a string option.
    ///
    /// # Errors
    ///
    /// Returns an error if the winning value is not a string.
    pub fn first_string(&self, order: &[(Side, &str)]) -> SamlResult<Option<String>> {
        self.resolve(order)
            .map(|(v, key)| v.as_string(key))
            .transpose()
    }

    /// Resolves an integer option.
    ///
    /// # Errors
    ///
    /// Returns an error if the winning value is not an integer.
    pub fn first_integer(&self, order: &[(Side, &str)]) -> SamlResult<Option<i64>> {
        self.resolve(order)
            .map(|(v, key)| v.as_integer(key))
            .transpose()
    }

    /// Resolves a string list option.
    ///
    /// # Errors
    ///
    /// Returns an error if the winning value is not a string or list of strings.
    pub fn first_list(&self, order: &[(Side, &str)]) -> SamlResult<Option<Vec<String>>> {
        self.resolve(order)
            .map(|(v, key)| v.as_string_list(key))
            .transpose()
    }
}
