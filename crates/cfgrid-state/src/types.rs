//! Domain types for the cfgrid state layer.
//!
//! These types are JSON-serialized as the values stored under the keys
//! produced by [`crate::keys`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Arbitrary key/value labels attached to a configuration.
pub type Labels = HashMap<String, String>;

/// Version number of a configuration or group.
pub type Version = u32;

// ── Configuration ──────────────────────────────────────────────────

/// A named, versioned configuration record.
///
/// Identity is `(name, version)`. Stored records are only ever replaced
/// whole; there is no partial update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub name: String,
    pub version: Version,
    /// Configuration parameters.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Labels used to index the configuration inside groups.
    #[serde(default)]
    pub labels: Labels,
}

impl Config {
    /// Build the storage key for the flat config keyspace.
    pub fn table_key(&self) -> String {
        crate::keys::encode_config_key(&self.name, self.version)
    }

    /// Check that the name and labels encode into keys that parse back.
    pub fn check_keys(&self) -> Result<(), String> {
        crate::keys::check_name("config", &self.name)?;
        for (key, value) in &self.labels {
            crate::keys::check_label(key, value)?;
        }
        Ok(())
    }
}

// ── Configuration group ────────────────────────────────────────────

/// A named, versioned group of configurations.
///
/// Members are embedded copies keyed by their member key. Later changes
/// to the standalone configuration do not reach a group that already
/// embedded it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigGroup {
    pub name: String,
    pub version: Version,
    #[serde(rename = "configs", default)]
    pub members: HashMap<String, Config>,
}

impl ConfigGroup {
    /// An empty group.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            members: HashMap::new(),
        }
    }

    /// Build the storage key for this group record.
    pub fn table_key(&self) -> String {
        crate::keys::encode_group_key(&self.name, self.version)
    }

    /// Member key that `config` occupies inside this group.
    pub fn member_key(&self, config: &Config) -> String {
        crate::keys::encode_member_key(
            &self.name,
            self.version,
            &config.labels,
            &config.name,
            config.version,
        )
    }

    /// Insert (or replace) `config`, returning its member key.
    pub fn insert_member(&mut self, config: Config) -> String {
        let key = self.member_key(&config);
        self.members.insert(key.clone(), config);
        key
    }

    /// Check the group name and every member, including that each member
    /// sits under the key derived from it.
    pub fn check_keys(&self) -> Result<(), String> {
        crate::keys::check_name("group", &self.name)?;
        for (key, config) in &self.members {
            config.check_keys()?;
            let expected = self.member_key(config);
            if *key != expected {
                return Err(format!("member {key:?} must be keyed {expected:?}"));
            }
        }
        Ok(())
    }

    /// Remove `config` if present. Returns true if it was a member.
    pub fn remove_member(&mut self, config: &Config) -> bool {
        let key = self.member_key(config);
        self.members.remove(&key).is_some()
    }
}
