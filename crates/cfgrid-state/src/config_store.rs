//! ConfigStore — standalone configurations under `config/{name}/{version}`.

use tracing::{debug, info};

use crate::error::{map_err, StateError, StateResult};
use crate::idempotency::{Applied, IdempotencyGate};
use crate::keys::{encode_config_key, parse_config_key, CONFIG_ROOT};
use crate::kv::SharedKv;
use crate::types::{Config, Version};

/// CRUD over standalone configurations.
#[derive(Clone)]
pub struct ConfigStore {
    kv: SharedKv,
    gate: IdempotencyGate,
}

impl ConfigStore {
    pub fn new(kv: SharedKv, gate: IdempotencyGate) -> Self {
        Self { kv, gate }
    }

    /// Get a configuration by identity.
    pub fn get_config(&self, name: &str, version: Version) -> StateResult<Config> {
        let key = encode_config_key(name, version);
        match self.kv.get(&key)? {
            Some(pair) => decode(&pair.value),
            None => Err(StateError::NotFound(key)),
        }
    }

    /// All configurations, in key order.
    pub fn get_all_configs(&self) -> StateResult<Vec<Config>> {
        let mut results = Vec::new();
        for pair in self.kv.list(CONFIG_ROOT)? {
            if parse_config_key(&pair.key).is_none() {
                debug!(key = %pair.key, "skipping non-config key under config root");
                continue;
            }
            results.push(decode(&pair.value)?);
        }
        Ok(results)
    }

    /// Store `config`, at most once per non-empty `token`.
    ///
    /// The write replaces any record with the same identity; only the token
    /// protects against duplicates.
    pub fn add_config(&self, config: &Config, token: &str) -> StateResult<Applied<Config>> {
        let key = config.table_key();
        let value = serde_json::to_vec(config).map_err(map_err!(Serialize))?;
        let outcome = self.gate.apply(token, &key, || {
            self.kv.put(&key, &value)?;
            Ok(config.clone())
        })?;
        if !outcome.is_already_applied() {
            info!(%key, "config stored");
        }
        Ok(outcome)
    }

    /// Delete a configuration by identity.
    pub fn delete_config(&self, name: &str, version: Version) -> StateResult<()> {
        let key = encode_config_key(name, version);
        if !self.kv.delete(&key)? {
            return Err(StateError::NotFound(key));
        }
        info!(%key, "config deleted");
        Ok(())
    }

    /// Delete every configuration. Returns the number removed.
    pub fn delete_all_configs(&self) -> StateResult<u32> {
        let count = self.kv.delete_prefix(CONFIG_ROOT)?;
        info!(count, "all configs deleted");
        Ok(count)
    }
}

fn decode(bytes: &[u8]) -> StateResult<Config> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}
