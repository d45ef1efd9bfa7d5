//! Label matching over group members.
//!
//! Two strategies select members by label:
//!
//! - [`filter_by_labels`] compares decoded label maps (superset match).
//! - [`prefix_filter`] tests encoded member keys against a scan prefix
//!   built by [`build_scan_prefix`](crate::keys::build_scan_prefix).
//!
//! They agree whenever the filter's sorted label segment is a leading run of
//! each candidate's sorted label segment, which is the case label search is
//! built around.

use crate::keys::LABEL_PATH_SEPARATOR;
use crate::types::{Config, Labels};

/// True if every `(key, value)` of `filter` appears in `labels`.
///
/// Exact, case-sensitive comparison; extra labels are ignored.
pub fn matches_labels(labels: &Labels, filter: &Labels) -> bool {
    filter
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
}

/// Members whose labels are a superset of `filter`.
pub fn filter_by_labels<'a, I>(members: I, filter: &'a Labels) -> impl Iterator<Item = &'a Config>
where
    I: IntoIterator<Item = &'a Config>,
    I::IntoIter: 'a,
{
    members
        .into_iter()
        .filter(move |config| matches_labels(&config.labels, filter))
}

/// Path-aware prefix test.
///
/// `key` matches when it equals `prefix`, or extends it at a `/`
/// boundary. A prefix ending in `/` matches any extension.
pub fn key_has_prefix(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Keys that match `prefix` under [`key_has_prefix`].
pub fn prefix_filter<'a, I, S>(keys: I, prefix: &'a str) -> impl Iterator<Item = S> + 'a
where
    I: IntoIterator<Item = S>,
    I::IntoIter: 'a,
    S: AsRef<str>,
{
    keys.into_iter()
        .filter(move |key| key_has_prefix(key.as_ref(), prefix))
}

/// Parse an external label path `k1:v1;k2:v2` into a label map.
///
/// Returns `None` if any pair lacks a `:` or has an empty key. An empty
/// path yields an empty map.
pub fn parse_label_path(path: &str) -> Option<Labels> {
    let mut labels = Labels::new();
    for pair in path.split(LABEL_PATH_SEPARATOR).filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once(':')?;
        if k.is_empty() {
            return None;
        }
        labels.insert(k.to_string(), v.to_string());
    }
    Some(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{build_scan_prefix, encode_label_segment};
    use crate::types::ConfigGroup;
    use std::collections::{BTreeSet, HashMap};

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config(name: &str, version: u32, pairs: &[(&str, &str)]) -> Config {
        Config {
            name: name.to_string(),
            version,
            params: HashMap::new(),
            labels: labels(pairs),
        }
    }

    fn sample_group() -> ConfigGroup {
        let mut group = ConfigGroup::new("db_cg", 2);
        group.insert_member(config("db_config", 2, &[("l1", "v1"), ("l2", "v2")]));
        group.insert_member(config("db_config2", 3, &[("l1", "v1")]));
        group.insert_member(config("cache", 1, &[("l1", "v10")]));
        group
    }

    fn names_by_filter(group: &ConfigGroup, filter: &Labels) -> BTreeSet<String> {
        filter_by_labels(group.members.values(), filter)
            .map(|c| c.name.clone())
            .collect()
    }

    fn names_by_prefix(group: &ConfigGroup, filter: &Labels) -> BTreeSet<String> {
        let prefix = build_scan_prefix(
            &group.name,
            group.version,
            &encode_label_segment(filter),
            None,
            None,
        );
        prefix_filter(group.members.keys(), &prefix)
            .map(|k| group.members[k].name.clone())
            .collect()
    }

    #[test]
    fn superset_match() {
        let have = labels(&[("l1", "v1"), ("l2", "v2")]);
        assert!(matches_labels(&have, &labels(&[("l1", "v1")])));
        assert!(matches_labels(&have, &labels(&[])));
        assert!(!matches_labels(&have, &labels(&[("l1", "V1")])));
        assert!(!matches_labels(&have, &labels(&[("l3", "v3")])));
        assert!(!matches_labels(&labels(&[("l1", "v1")]), &have));
    }

    #[test]
    fn prefix_and_filter_agree() {
        let group = sample_group();

        let single = labels(&[("l1", "v1")]);
        let expected: BTreeSet<String> =
            ["db_config", "db_config2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names_by_filter(&group, &single), expected);
        assert_eq!(names_by_prefix(&group, &single), expected);

        let both = labels(&[("l2", "v2"), ("l1", "v1")]);
        let expected: BTreeSet<String> = ["db_config"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names_by_filter(&group, &both), expected);
        assert_eq!(names_by_prefix(&group, &both), expected);

        let none = labels(&[("l1", "missing")]);
        assert!(names_by_filter(&group, &none).is_empty());
        assert!(names_by_prefix(&group, &none).is_empty());
    }

    #[test]
    fn empty_filter_selects_whole_group() {
        let group = sample_group();
        let empty = Labels::new();
        assert_eq!(names_by_filter(&group, &empty).len(), 3);
        assert_eq!(names_by_prefix(&group, &empty).len(), 3);
    }

    #[test]
    fn prefix_respects_segment_boundaries() {
        assert!(key_has_prefix("a/l1:v1/c/1", "a/l1:v1"));
        assert!(!key_has_prefix("a/l1:v10/c/1", "a/l1:v1"));
        assert!(key_has_prefix("a/c/2", "a/c/2"));
        assert!(!key_has_prefix("a/c/20", "a/c/2"));
        assert!(key_has_prefix("a/anything", "a/"));
        assert!(!key_has_prefix("b/c", "a/"));
    }

    #[test]
    fn filters_are_restartable() {
        let group = sample_group();
        let filter = labels(&[("l1", "v1")]);
        let first: Vec<_> = filter_by_labels(group.members.values(), &filter).collect();
        let second: Vec<_> = filter_by_labels(group.members.values(), &filter).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn label_path_parsing() {
        assert_eq!(
            parse_label_path("l1:v1;l2:v2"),
            Some(labels(&[("l1", "v1"), ("l2", "v2")]))
        );
        assert_eq!(parse_label_path(""), Some(Labels::new()));
        assert_eq!(parse_label_path("l1"), None);
        assert_eq!(parse_label_path(":v1"), None);
    }
}
