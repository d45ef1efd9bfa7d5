//! At-most-once application of creating writes.
//!
//! A client-supplied token is claimed by creating a marker record under
//! `idempotency/{token}` with a conditional put that requires the key to be
//! absent. Only the request that creates the marker performs the write;
//! every later request with the same token gets [`Applied::AlreadyApplied`].
//! An empty token disables the gate.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{map_err, StateResult};
use crate::keys::encode_idempotency_key;
use crate::kv::SharedKv;

/// Outcome of a gated write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied<T> {
    /// The write ran under this request.
    Applied(T),
    /// An earlier request with the same token already ran it; nothing was written.
    AlreadyApplied,
}

impl<T> Applied<T> {
    pub fn is_already_applied(&self) -> bool {
        matches!(self, Applied::AlreadyApplied)
    }

    /// The written value, if the write ran.
    pub fn applied(self) -> Option<T> {
        match self {
            Applied::Applied(value) => Some(value),
            Applied::AlreadyApplied => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Applied<U> {
        match self {
            Applied::Applied(value) => Applied::Applied(f(value)),
            Applied::AlreadyApplied => Applied::AlreadyApplied,
        }
    }
}

/// Value stored under a marker key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdempotencyMarker {
    pub token: String,
    /// Storage key of the entity the token was spent on.
    pub target: String,
    /// Unix timestamp (seconds) of the claim.
    pub created_at: u64,
}

/// Gate that claims idempotency tokens in the KV store.
#[derive(Clone)]
pub struct IdempotencyGate {
    kv: SharedKv,
    ttl: Option<Duration>,
}

impl IdempotencyGate {
    /// A gate whose markers never expire.
    pub fn new(kv: SharedKv) -> Self {
        Self { kv, ttl: None }
    }

    /// Treat markers older than `ttl` as absent.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Run `write` unless `token` was already spent.
    ///
    /// The marker is placed before `write` runs. If `write` fails the marker
    /// is released so the client can retry with the same token.
    pub fn apply<T>(
        &self,
        token: &str,
        target: &str,
        write: impl FnOnce() -> StateResult<T>,
    ) -> StateResult<Applied<T>> {
        if token.is_empty() {
            return write().map(Applied::Applied);
        }

        let marker_key = encode_idempotency_key(token);
        if !self.claim(&marker_key, token, target)? {
            debug!(%token, %target, "idempotency token already applied");
            return Ok(Applied::AlreadyApplied);
        }

        match write() {
            Ok(value) => Ok(Applied::Applied(value)),
            Err(e) => {
                if let Err(release) = self.kv.delete(&marker_key) {
                    warn!(%token, error = %release, "failed to release idempotency marker");
                }
                Err(e)
            }
        }
    }

    /// Look up the marker for `token`, if any.
    pub fn marker(&self, token: &str) -> StateResult<Option<IdempotencyMarker>> {
        match self.kv.get(&encode_idempotency_key(token))? {
            Some(pair) => serde_json::from_slice(&pair.value)
                .map(Some)
                .map_err(map_err!(Deserialize)),
            None => Ok(None),
        }
    }

    fn claim(&self, marker_key: &str, token: &str, target: &str) -> StateResult<bool> {
        let marker = IdempotencyMarker {
            token: token.to_string(),
            target: target.to_string(),
            created_at: unix_now(),
        };
        let value =
            serde_json::to_vec(&marker).map_err(map_err!(Serialize))?;

        if self.kv.put_if(marker_key, &value, None)? {
            return Ok(true);
        }

        let Some(ttl) = self.ttl else {
            return Ok(false);
        };
        let Some(existing) = self.kv.get(marker_key)? else {
            // Released since our first attempt.
            return self.kv.put_if(marker_key, &value, None);
        };
        let stored: IdempotencyMarker = serde_json::from_slice(&existing.value)
            .map_err(map_err!(Deserialize))?;
        if marker.created_at.saturating_sub(stored.created_at) < ttl.as_secs() {
            return Ok(false);
        }
        debug!(%token, created_at = stored.created_at, "reclaiming expired idempotency marker");
        self.kv.put_if(marker_key, &value, Some(existing.revision))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
