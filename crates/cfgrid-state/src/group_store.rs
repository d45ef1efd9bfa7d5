//! ConfigGroupStore — configuration groups under `configGroups/{name}/{version}`.
//!
//! A group and all of its members are one stored value. Membership changes
//! are read-modify-write cycles on that value, guarded by a conditional put
//! on the revision that was read and retried on conflict.

use tracing::{debug, info};

use crate::error::{map_err, StateError, StateResult};
use crate::idempotency::{Applied, IdempotencyGate};
use crate::keys::{encode_group_key, parse_group_key, GROUP_ROOT};
use crate::kv::{KvPair, SharedKv};
use crate::labels::{filter_by_labels, key_has_prefix, prefix_filter};
use crate::types::{Config, ConfigGroup, Labels, Version};

/// Default number of retries after a lost conditional put.
pub const DEFAULT_MAX_CAS_RETRIES: u32 = 8;

/// CRUD and membership operations over configuration groups.
#[derive(Clone)]
pub struct ConfigGroupStore {
    kv: SharedKv,
    gate: IdempotencyGate,
    max_cas_retries: u32,
}

impl ConfigGroupStore {
    pub fn new(kv: SharedKv, gate: IdempotencyGate) -> Self {
        Self {
            kv,
            gate,
            max_cas_retries: DEFAULT_MAX_CAS_RETRIES,
        }
    }

    pub fn with_max_cas_retries(mut self, retries: u32) -> Self {
        self.max_cas_retries = retries;
        self
    }

    /// Get a group by identity.
    pub fn get_group(&self, name: &str, version: Version) -> StateResult<ConfigGroup> {
        let key = encode_group_key(name, version);
        match self.kv.get(&key)? {
            Some(pair) => decode(&pair.value),
            None => Err(StateError::NotFound(key)),
        }
    }

    /// All groups, in key order.
    pub fn get_all_groups(&self) -> StateResult<Vec<ConfigGroup>> {
        let mut results = Vec::new();
        for pair in self.kv.list(GROUP_ROOT)? {
            if parse_group_key(&pair.key).is_some() {
                results.push(decode(&pair.value)?);
            }
        }
        Ok(results)
    }

    /// Store `group` whole, at most once per non-empty `token`.
    pub fn add_group(&self, group: &ConfigGroup, token: &str) -> StateResult<Applied<ConfigGroup>> {
        let key = group.table_key();
        let value = encode(group)?;
        let outcome = self.gate.apply(token, &key, || {
            self.kv.put(&key, &value)?;
            Ok(group.clone())
        })?;
        if !outcome.is_already_applied() {
            info!(%key, members = group.members.len(), "group stored");
        }
        Ok(outcome)
    }

    /// Delete a group by identity.
    pub fn delete_group(&self, name: &str, version: Version) -> StateResult<()> {
        let key = encode_group_key(name, version);
        if !self.kv.delete(&key)? {
            return Err(StateError::NotFound(key));
        }
        info!(%key, "group deleted");
        Ok(())
    }

    /// Embed a copy of `config` in the stored group identified by `group`.
    ///
    /// The member key is derived from the group identity and the config's
    /// labels, name and version. Returns the updated group.
    pub fn add_config_to_group(
        &self,
        group: &ConfigGroup,
        config: &Config,
        token: &str,
    ) -> StateResult<Applied<ConfigGroup>> {
        let key = group.table_key();
        self.gate.apply(token, &key, || {
            self.update_group(&key, |stored| {
                let member = stored.insert_member(config.clone());
                debug!(%member, "member inserted");
                true
            })
        })
    }

    /// Remove `config` from the stored group identified by `group`.
    ///
    /// Removing a config that is not a member succeeds without writing.
    pub fn remove_config_from_group(
        &self,
        group: &ConfigGroup,
        config: &Config,
        token: &str,
    ) -> StateResult<Applied<ConfigGroup>> {
        let key = group.table_key();
        self.gate.apply(token, &key, || {
            self.update_group(&key, |stored| stored.remove_member(config))
        })
    }

    /// Members of groups under `group_prefix` whose member key matches `member_prefix`.
    ///
    /// Both prefixes match on whole path segments. Results are ordered by
    /// group key, then member key.
    pub fn get_configs_by_labels(
        &self,
        group_prefix: &str,
        member_prefix: &str,
    ) -> StateResult<Vec<Config>> {
        let mut results = Vec::new();
        for pair in self.scan_groups(group_prefix)? {
            let group = decode(&pair.value)?;
            let mut keys: Vec<&String> = group.members.keys().collect();
            keys.sort();
            results.extend(prefix_filter(keys, member_prefix).map(|k| group.members[k].clone()));
        }
        debug!(%member_prefix, found = results.len(), "configs by labels");
        Ok(results)
    }

    /// Remove matching members from every group under `group_prefix`.
    ///
    /// Each modified group is re-persisted. Returns the number of members
    /// removed. Groups deleted concurrently are skipped.
    pub fn delete_configs_by_labels(&self, group_prefix: &str, member_prefix: &str) -> StateResult<u32> {
        let mut removed = 0u32;
        for pair in self.scan_groups(group_prefix)? {
            let mut dropped = 0u32;
            let result = self.update_group(&pair.key, |group| {
                let before = group.members.len();
                group
                    .members
                    .retain(|key, _| !key_has_prefix(key, member_prefix));
                dropped = (before - group.members.len()) as u32;
                dropped > 0
            });
            match result {
                Ok(_) => removed += dropped,
                Err(e) if e.is_not_found() => {
                    debug!(key = %pair.key, "group vanished during label delete");
                }
                Err(e) => return Err(e),
            }
        }
        info!(%member_prefix, removed, "configs deleted by labels");
        Ok(removed)
    }

    /// Members of one group whose labels are a superset of `filter`, in key order.
    pub fn find_group_members(
        &self,
        name: &str,
        version: Version,
        filter: &Labels,
    ) -> StateResult<Vec<Config>> {
        let group = self.get_group(name, version)?;
        let mut keys: Vec<&String> = group.members.keys().collect();
        keys.sort();
        Ok(filter_by_labels(keys.into_iter().map(|k| &group.members[k]), filter)
            .cloned()
            .collect())
    }

    /// Group records (not nested keys) under `group_prefix`.
    fn scan_groups(&self, group_prefix: &str) -> StateResult<Vec<KvPair>> {
        Ok(self
            .kv
            .list(group_prefix)?
            .into_iter()
            .filter(|pair| {
                parse_group_key(&pair.key).is_some() && key_has_prefix(&pair.key, group_prefix)
            })
            .collect())
    }

    /// Read-modify-write of one group record under a revision check.
    ///
    /// `mutate` returns whether it changed the group; unchanged groups are
    /// not written. `mutate` runs again on every retry.
    fn update_group<F>(&self, key: &str, mut mutate: F) -> StateResult<ConfigGroup>
    where
        F: FnMut(&mut ConfigGroup) -> bool,
    {
        let attempts = self.max_cas_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let pair = self
                .kv
                .get(key)?
                .ok_or_else(|| StateError::NotFound(key.to_string()))?;
            let mut group = decode(&pair.value)?;
            if !mutate(&mut group) {
                return Ok(group);
            }
            if self.kv.put_if(key, &encode(&group)?, Some(pair.revision))? {
                debug!(%key, attempt, members = group.members.len(), "group updated");
                return Ok(group);
            }
            debug!(%key, attempt, "group changed underneath update, retrying");
        }
        Err(StateError::Conflict {
            key: key.to_string(),
            attempts,
        })
    }
}

fn encode(group: &ConfigGroup) -> StateResult<Vec<u8>> {
    serde_json::to_vec(group).map_err(map_err!(Serialize))
}

fn decode(bytes: &[u8]) -> StateResult<ConfigGroup> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}
