//! cfgrid-state — versioned configuration records and groups over a KV store.
//!
//! # Architecture
//!
//! Every record lives under one deterministic storage key:
//!
//! | Record | Key |
//! |---|---|
//! | Configuration | `config/{name}/{version}` |
//! | Configuration group | `configGroups/{name}/{version}` |
//! | Group member (inside the group value) | `configGroups/{group}/{gversion}/config/{labels}/{name}/{version}` |
//! | Idempotency marker | `idempotency/{token}` |
//!
//! `{labels}` is the sorted `key:value` rendering produced by
//! [`keys::encode_label_segment`], so a label subset that is a sorted
//! prefix of a member's labels is also a string prefix of its member key.
//! Label search and bulk delete are prefix scans over those keys.
//!
//! All values are JSON-serialized. The backing store is reached only
//! through the [`KvStore`] trait; [`RedbKv`] is the shipped backend. Stores
//! hold no mutable in-process state and are `Clone` + `Send` + `Sync`.

pub mod config_store;
pub mod error;
pub mod group_store;
pub mod idempotency;
pub mod keys;
pub mod kv;
pub mod labels;
pub mod tables;
pub mod types;

pub use config_store::ConfigStore;
pub use error::{StateError, StateResult};
pub use group_store::ConfigGroupStore;
pub use idempotency::{Applied, IdempotencyGate};
pub use kv::{KvPair, KvStore, RedbKv, SharedKv};
pub use types::*;
