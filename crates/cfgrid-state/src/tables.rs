//! redb table definitions for the [`RedbKv`](crate::RedbKv) backend.
//!
//! The backend presents a single flat keyspace; revisions live in a
//! side table so that values stay plain JSON.

use redb::TableDefinition;

/// Values keyed by full storage key.
pub const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Revision of the last write to each key in [`KV`].
pub const REVISIONS: TableDefinition<&str, u64> = TableDefinition::new("revisions");

/// Store-wide counters.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in [`META`] holding the last issued revision.
pub const REVISION_COUNTER: &str = "revision";
