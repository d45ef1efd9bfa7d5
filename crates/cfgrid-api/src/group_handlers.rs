//! REST API handlers for configuration groups.
//!
//! Membership and label endpoints resolve path segments into store
//! identities and scan prefixes; the stores do the rest.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use cfgrid_state::keys::{build_scan_prefix, check_label, encode_group_key, encode_label_segment};
use cfgrid_state::labels::parse_label_path;
use cfgrid_state::*;

use crate::ApiState;
use crate::handlers::{
    applied_response, error_response, idempotency_token, parse_version, state_error, ApiResponse,
};

/// Path of the label endpoints; `cname` and `cversion` are optional.
#[derive(serde::Deserialize)]
pub struct LabelPath {
    pub name: String,
    pub version: String,
    pub labels: String,
    #[serde(default)]
    pub cname: Option<String>,
    #[serde(default)]
    pub cversion: Option<String>,
}

/// Group and member prefixes resolved from a [`LabelPath`].
struct LabelScan {
    group_prefix: String,
    member_prefix: String,
}

impl LabelPath {
    fn resolve(&self) -> Result<LabelScan, Response> {
        let version = parse_version(&self.version)?;
        let invalid = |msg: String| error_response(&msg, StatusCode::BAD_REQUEST);
        let labels = parse_label_path(&self.labels).ok_or_else(|| {
            invalid(format!("invalid labels {:?}: expected k1:v1;k2:v2", self.labels))
        })?;
        for (key, value) in &labels {
            check_label(key, value).map_err(invalid)?;
        }
        let member_version = match &self.cversion {
            Some(raw) => Some(parse_version(raw)?),
            None => None,
        };
        Ok(LabelScan {
            group_prefix: encode_group_key(&self.name, version),
            member_prefix: build_scan_prefix(
                &self.name,
                version,
                &encode_label_segment(&labels),
                self.cname.as_deref(),
                member_version,
            ),
        })
    }
}

// ── Groups ─────────────────────────────────────────────────────

/// GET /configGroups
pub async fn list_groups(State(state): State<ApiState>) -> Response {
    match state.groups.get_all_groups() {
        Ok(groups) => ApiResponse::ok(groups).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /configGroups/{name}/{version}
pub async fn get_group(
    State(state): State<ApiState>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    let version = match parse_version(&version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.groups.get_group(&name, version) {
        Ok(group) => ApiResponse::ok(group).into_response(),
        Err(e) => state_error(&e),
    }
}

/// POST /configGroups
pub async fn add_group(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(group): Json<ConfigGroup>,
) -> Response {
    if let Err(msg) = group.check_keys() {
        return error_response(&msg, StatusCode::BAD_REQUEST);
    }
    match state.groups.add_group(&group, idempotency_token(&headers)) {
        Ok(outcome) => applied_response(outcome, StatusCode::CREATED),
        Err(e) => state_error(&e),
    }
}

/// DELETE /configGroups/{name}/{version}
pub async fn delete_group(
    State(state): State<ApiState>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    let version = match parse_version(&version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.groups.delete_group(&name, version) {
        Ok(()) => ApiResponse::ok("deleted").into_response(),
        Err(e) => state_error(&e),
    }
}

// ── Membership ─────────────────────────────────────────────────

/// Look up the group and the standalone config a membership call names.
fn resolve_member(
    state: &ApiState,
    (name, version, cname, cversion): &(String, String, String, String),
) -> Result<(ConfigGroup, Config), Response> {
    let version = parse_version(version)?;
    let cversion = parse_version(cversion)?;
    let group = state.groups.get_group(name, version).map_err(|e| state_error(&e))?;
    let config = state.configs.get_config(cname, cversion).map_err(|e| state_error(&e))?;
    Ok((group, config))
}

/// PUT /configGroups/{name}/{version}/configs/{cname}/{cversion}
pub async fn add_config_to_group(
    State(state): State<ApiState>,
    Path(ids): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let (group, config) = match resolve_member(&state, &ids) {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    match state
        .groups
        .add_config_to_group(&group, &config, idempotency_token(&headers))
    {
        Ok(outcome) => applied_response(outcome, StatusCode::OK),
        Err(e) => state_error(&e),
    }
}

/// DELETE /configGroups/{name}/{version}/configs/{cname}/{cversion}
pub async fn remove_config_from_group(
    State(state): State<ApiState>,
    Path(ids): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let (group, config) = match resolve_member(&state, &ids) {
        Ok(found) => found,
        Err(resp) => return resp,
    };
    match state
        .groups
        .remove_config_from_group(&group, &config, idempotency_token(&headers))
    {
        Ok(outcome) => applied_response(outcome, StatusCode::OK),
        Err(e) => state_error(&e),
    }
}

// ── Label search ───────────────────────────────────────────────

/// GET /configGroups/{name}/{version}/members?k=v
pub async fn find_members(
    State(state): State<ApiState>,
    Path((name, version)): Path<(String, String)>,
    Query(filter): Query<HashMap<String, String>>,
) -> Response {
    let version = match parse_version(&version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.groups.find_group_members(&name, version, &filter) {
        Ok(configs) => ApiResponse::ok(configs).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /configGroups/{name}/{version}/labels/{labels}[/{cname}[/{cversion}]]
pub async fn get_configs_by_labels(
    State(state): State<ApiState>,
    Path(path): Path<LabelPath>,
) -> Response {
    let scan = match path.resolve() {
        Ok(scan) => scan,
        Err(resp) => return resp,
    };
    match state
        .groups
        .get_configs_by_labels(&scan.group_prefix, &scan.member_prefix)
    {
        Ok(configs) => ApiResponse::ok(configs).into_response(),
        Err(e) => state_error(&e),
    }
}

/// DELETE /configGroups/{name}/{version}/labels/{labels}[/{cname}[/{cversion}]]
pub async fn delete_configs_by_labels(
    State(state): State<ApiState>,
    Path(path): Path<LabelPath>,
) -> Response {
    let scan = match path.resolve() {
        Ok(scan) => scan,
        Err(resp) => return resp,
    };
    match state
        .groups
        .delete_configs_by_labels(&scan.group_prefix, &scan.member_prefix)
    {
        Ok(removed) => ApiResponse::ok(serde_json::json!({ "deleted": removed })).into_response(),
        Err(e) => state_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ApiState {
        let kv = RedbKv::open_in_memory().unwrap().shared();
        let gate = IdempotencyGate::new(kv.clone());
        ApiState::new(
            ConfigStore::new(kv.clone(), gate.clone()),
            ConfigGroupStore::new(kv, gate),
        )
    }

    fn test_config(name: &str, version: Version, labels: &[(&str, &str)]) -> Config {
        Config {
            name: name.to_string(),
            version,
            params: HashMap::new(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn member_path(g: &str, gv: &str, c: &str, cv: &str) -> Path<(String, String, String, String)> {
        Path((g.to_string(), gv.to_string(), c.to_string(), cv.to_string()))
    }

    fn label_path(labels: &str, cname: Option<&str>, cversion: Option<&str>) -> Path<LabelPath> {
        Path(LabelPath {
            name: "db_cg".to_string(),
            version: "2".to_string(),
            labels: labels.to_string(),
            cname: cname.map(str::to_string),
            cversion: cversion.map(str::to_string),
        })
    }

    /// `db_cg/2` with `db_config/2 {l1:v1,l2:v2}` and `db_config2/3 {l1:v1}` attached.
    fn seeded_state() -> ApiState {
        let state = test_state();
        state.groups.add_group(&ConfigGroup::new("db_cg", 2), "").unwrap();
        let group = ConfigGroup::new("db_cg", 2);
        for config in [
            test_config("db_config", 2, &[("l1", "v1"), ("l2", "v2")]),
            test_config("db_config2", 3, &[("l1", "v1")]),
        ] {
            state.configs.add_config(&config, "").unwrap();
            state.groups.add_config_to_group(&group, &config, "").unwrap();
        }
        state
    }

    #[tokio::test]
    async fn add_and_get_group() {
        let state = test_state();
        let resp = add_group(
            State(state.clone()),
            HeaderMap::new(),
            Json(ConfigGroup::new("db_cg", 2)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = get_group(State(state), Path(("db_cg".to_string(), "2".to_string()))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unreadable_group_names_are_rejected() {
        let state = test_state();
        let resp = add_group(State(state.clone()), HeaderMap::new(), Json(ConfigGroup::new("team/cg", 1))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Member keys must be the ones derived from the member.
        let mut group = ConfigGroup::new("cg", 1);
        group
            .members
            .insert("configGroups/cg/1/config/x".to_string(), test_config("c", 1, &[]));
        let resp = add_group(State(state.clone()), HeaderMap::new(), Json(group)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert!(state.groups.get_all_groups().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_group() {
        let resp = delete_group(State(test_state()), Path(("g".to_string(), "1".to_string()))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn membership_requires_both_records() {
        let state = test_state();
        state.groups.add_group(&ConfigGroup::new("g", 1), "").unwrap();

        let resp = add_config_to_group(State(state.clone()), member_path("g", "1", "c", "1"), HeaderMap::new()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        state.configs.add_config(&test_config("c", 1, &[]), "").unwrap();
        let resp = add_config_to_group(State(state.clone()), member_path("g", "1", "c", "1"), HeaderMap::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.groups.get_group("g", 1).unwrap().members.len(), 1);

        let resp = remove_config_from_group(State(state.clone()), member_path("g", "1", "c", "1"), HeaderMap::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.groups.get_group("g", 1).unwrap().members.is_empty());
    }

    #[tokio::test]
    async fn labels_endpoints() {
        let state = seeded_state();

        let resp = get_configs_by_labels(State(state.clone()), label_path("l1:v1", None, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_configs_by_labels(State(state.clone()), label_path("l1", None, None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = get_configs_by_labels(State(state.clone()), label_path("l1:v1", Some("db_config2"), Some("x"))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = get_configs_by_labels(State(state.clone()), label_path("l1:v1;zone:a/b", None, None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = delete_configs_by_labels(State(state.clone()), label_path("l2:v2;l1:v1", None, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let left = state.groups.get_group("db_cg", 2).unwrap();
        assert_eq!(left.members.len(), 1);
        assert_eq!(left.members.values().next().unwrap().name, "db_config2");
    }

    #[tokio::test]
    async fn members_by_query() {
        let state = seeded_state();
        let resp = find_members(
            State(state),
            Path(("db_cg".to_string(), "2".to_string())),
            Query(HashMap::from([("l2".to_string(), "v2".to_string())])),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
