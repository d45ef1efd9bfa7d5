//! Storage key codec.
//!
//! Pure functions mapping entity identities onto canonical storage keys,
//! plus the inverse parsing used when walking scan results. Keys are
//! `/`-separated paths. Names and labels that would add or hide a path
//! segment are refused by [`check_name`] and [`check_label`] before they
//! reach the stores.

use crate::types::Version;

/// Prefix of every standalone configuration key.
pub const CONFIG_ROOT: &str = "config/";

/// Prefix of every configuration group key.
pub const GROUP_ROOT: &str = "configGroups/";

/// Prefix of every idempotency marker key.
pub const IDEMPOTENCY_ROOT: &str = "idempotency/";

/// Path segment separating a group key from its member keys.
const MEMBERS_SEGMENT: &str = "config";

/// Separator between label pairs in external label paths.
pub const LABEL_PATH_SEPARATOR: char = ';';

/// `config/{name}/{version}`
pub fn encode_config_key(name: &str, version: Version) -> String {
    format!("{CONFIG_ROOT}{name}/{version}")
}

/// `configGroups/{name}/{version}`
pub fn encode_group_key(name: &str, version: Version) -> String {
    format!("{GROUP_ROOT}{name}/{version}")
}

/// `idempotency/{token}`
pub fn encode_idempotency_key(token: &str) -> String {
    format!("{IDEMPOTENCY_ROOT}{token}")
}

/// Render a label mapping as `k1:v1/k2:v2`, sorted by key.
///
/// The output depends only on the set of pairs, never on iteration order.
/// An empty mapping renders as the empty string.
pub fn encode_label_segment<K, V, I>(labels: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(K, V)> = labels.into_iter().collect();
    pairs.sort_by(|a, b| {
        (a.0.as_ref(), a.1.as_ref()).cmp(&(b.0.as_ref(), b.1.as_ref()))
    });
    pairs
        .iter()
        .map(|(k, v)| format!("{}:{}", k.as_ref(), v.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

/// Key a configuration occupies inside a group:
/// `configGroups/{group}/{gversion}/config/{labels}/{name}/{version}`.
///
/// An empty label set leaves an empty path segment, giving
/// `.../config//{name}/{version}`.
pub fn encode_member_key<K, V, I>(
    group_name: &str,
    group_version: Version,
    labels: I,
    member_name: &str,
    member_version: Version,
) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    format!(
        "{}/{}/{}/{}",
        members_root(group_name, group_version),
        encode_label_segment(labels),
        member_name,
        member_version
    )
}

/// `configGroups/{group}/{gversion}/config`, the parent of every member key.
pub fn members_root(group_name: &str, group_version: Version) -> String {
    format!(
        "{}/{MEMBERS_SEGMENT}",
        encode_group_key(group_name, group_version)
    )
}

/// Build a member-key prefix for label scans.
///
/// `label_path` is the label segment in external form (`k1:v1;k2:v2`) or
/// internal form (`k1:v1/k2:v2`); `;` is rewritten to `/`. Narrowing:
///
/// - no name: all members whose labels start with `label_path`
///   (an empty `label_path` yields [`members_root`], the whole group)
/// - name: members with exactly those labels and that name
/// - name + version: the single full member key
///
/// `member_version` is ignored when `member_name` is `None`.
pub fn build_scan_prefix(
    group_name: &str,
    group_version: Version,
    label_path: &str,
    member_name: Option<&str>,
    member_version: Option<Version>,
) -> String {
    let labels = label_path.replace(LABEL_PATH_SEPARATOR, "/");
    let mut prefix = members_root(group_name, group_version);
    if labels.is_empty() && member_name.is_none() {
        return prefix;
    }
    prefix.push('/');
    prefix.push_str(&labels);
    if let Some(name) = member_name {
        prefix.push('/');
        prefix.push_str(name);
        if let Some(version) = member_version {
            prefix.push('/');
            prefix.push_str(&version.to_string());
        }
    }
    prefix
}

/// Check that `name` fits in one key segment: non-empty and without `/`.
pub fn check_name(kind: &str, name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{kind} name must not be empty"));
    }
    if name.contains('/') {
        return Err(format!("{kind} name {name:?} must not contain '/'"));
    }
    Ok(())
}

/// Check that a label pair survives the label segment and label path forms.
///
/// Keys must be non-empty and free of `/`, `:` and `;`; values free of `/`
/// and `;`.
pub fn check_label(key: &str, value: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("label key must not be empty".to_string());
    }
    if key.contains(['/', ':', LABEL_PATH_SEPARATOR]) {
        return Err(format!("label key {key:?} must not contain '/', ':' or ';'"));
    }
    if value.contains(['/', LABEL_PATH_SEPARATOR]) {
        return Err(format!("label value {value:?} must not contain '/' or ';'"));
    }
    Ok(())
}

/// Split `config/{name}/{version}` into its identity.
pub fn parse_config_key(key: &str) -> Option<(&str, Version)> {
    parse_identity(key.strip_prefix(CONFIG_ROOT)?)
}

/// Split `configGroups/{name}/{version}` into its identity.
///
/// Member keys and anything else nested below a group do not parse.
pub fn parse_group_key(key: &str) -> Option<(&str, Version)> {
    parse_identity(key.strip_prefix(GROUP_ROOT)?)
}

fn parse_identity(rest: &str) -> Option<(&str, Version)> {
    let (name, version) = rest.split_once('/')?;
    if name.is_empty() {
        return None;
    }
    let version = version.parse().ok()?;
    Some((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn entity_keys() {
        assert_eq!(encode_config_key("db_config", 2), "config/db_config/2");
        assert_eq!(encode_group_key("db_cg", 2), "configGroups/db_cg/2");
        assert_eq!(encode_idempotency_key("tok-A"), "idempotency/tok-A");
    }

    #[test]
    fn label_segment_is_order_independent() {
        let a = vec![("l2", "v2"), ("l1", "v1")];
        let b = vec![("l1", "v1"), ("l2", "v2")];
        assert_eq!(encode_label_segment(a), "l1:v1/l2:v2");
        assert_eq!(encode_label_segment(b), "l1:v1/l2:v2");

        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        for i in 0..32 {
            forward.insert(format!("k{i:02}"), format!("v{i}"));
        }
        for i in (0..32).rev() {
            backward.insert(format!("k{i:02}"), format!("v{i}"));
        }
        let sorted: BTreeMap<_, _> = forward.iter().collect();
        let expected = sorted
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("/");
        assert_eq!(encode_label_segment(&forward), expected);
        assert_eq!(encode_label_segment(&backward), expected);
    }

    #[test]
    fn empty_label_segment_has_no_separator() {
        let empty: HashMap<String, String> = HashMap::new();
        assert_eq!(encode_label_segment(&empty), "");
        assert_eq!(
            encode_member_key("g", 1, &empty, "c", 3),
            "configGroups/g/1/config//c/3"
        );
    }

    #[test]
    fn member_key_layout() {
        let labels = HashMap::from([
            ("l2".to_string(), "v2".to_string()),
            ("l1".to_string(), "v1".to_string()),
        ]);
        assert_eq!(
            encode_member_key("db_cg", 2, &labels, "db_config", 2),
            "configGroups/db_cg/2/config/l1:v1/l2:v2/db_config/2"
        );
    }

    #[test]
    fn scan_prefix_narrowing() {
        assert_eq!(
            build_scan_prefix("db_cg", 2, "", None, None),
            "configGroups/db_cg/2/config"
        );
        assert_eq!(build_scan_prefix("db_cg", 2, "", None, None), members_root("db_cg", 2));
        // An unlabelled member is still reachable by name.
        assert_eq!(
            build_scan_prefix("db_cg", 2, "", Some("c"), Some(1)),
            "configGroups/db_cg/2/config//c/1"
        );
        assert_eq!(
            build_scan_prefix("db_cg", 2, "l1:v1;l2:v2", None, None),
            "configGroups/db_cg/2/config/l1:v1/l2:v2"
        );
        assert_eq!(
            build_scan_prefix("db_cg", 2, "l1:v1", Some("db_config"), None),
            "configGroups/db_cg/2/config/l1:v1/db_config"
        );
        assert_eq!(
            build_scan_prefix("db_cg", 2, "l1:v1", Some("db_config"), Some(2)),
            "configGroups/db_cg/2/config/l1:v1/db_config/2"
        );
        // Version without a name cannot narrow anything.
        assert_eq!(
            build_scan_prefix("db_cg", 2, "l1:v1", None, Some(2)),
            "configGroups/db_cg/2/config/l1:v1"
        );
    }

    #[test]
    fn full_scan_prefix_equals_member_key() {
        let labels = HashMap::from([("env".to_string(), "prod".to_string())]);
        assert_eq!(
            build_scan_prefix("g", 1, "env:prod", Some("c"), Some(4)),
            encode_member_key("g", 1, &labels, "c", 4)
        );
    }

    #[test]
    fn parse_keys() {
        assert_eq!(parse_config_key("config/db_config/2"), Some(("db_config", 2)));
        assert_eq!(parse_group_key("configGroups/db_cg/7"), Some(("db_cg", 7)));
        assert_eq!(parse_group_key("configGroups/db_cg/7/config/l1:v1/c/1"), None);
        assert_eq!(parse_config_key("config/db_config/two"), None);
        assert_eq!(parse_config_key("configGroups/db_cg/7"), None);
        assert_eq!(parse_config_key("config//1"), None);
    }

    #[test]
    fn names_must_fit_one_segment() {
        assert!(check_name("config", "db_config").is_ok());
        assert!(check_name("config", "").is_err());
        let err = check_name("group", "team/cg").unwrap_err();
        assert!(err.contains("team/cg"));
    }

    #[test]
    fn labels_must_survive_encoding() {
        assert!(check_label("l1", "v1").is_ok());
        assert!(check_label("l1", "").is_ok());
        assert!(check_label("l1", "a:b").is_ok());
        assert!(check_label("", "v1").is_err());
        assert!(check_label("l:1", "v1").is_err());
        assert!(check_label("l1", "a/b").is_err());
        assert!(check_label("l1", "a;b").is_err());
    }

    #[test]
    fn valid_names_parse_back() {
        check_name("config", "db_config").unwrap();
        let key = encode_config_key("db_config", 4);
        assert_eq!(parse_config_key(&key), Some(("db_config", 4)));
    }
}
