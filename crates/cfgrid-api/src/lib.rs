//! cfgrid-api — REST API for cfgrid.
//!
//! Parses path, query and header parameters into store calls and renders
//! the results as JSON envelopes.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/configs` | List all configs |
//! | POST | `/configs` | Add a config |
//! | DELETE | `/configs` | Delete all configs |
//! | GET | `/configs/{name}/{version}` | Get a config |
//! | DELETE | `/configs/{name}/{version}` | Delete a config |
//! | GET | `/configGroups` | List all groups |
//! | POST | `/configGroups` | Add a group |
//! | GET | `/configGroups/{name}/{version}` | Get a group |
//! | DELETE | `/configGroups/{name}/{version}` | Delete a group |
//! | PUT | `/configGroups/{name}/{version}/configs/{cname}/{cversion}` | Add a stored config to a group |
//! | DELETE | `/configGroups/{name}/{version}/configs/{cname}/{cversion}` | Remove a config from a group |
//! | GET | `/configGroups/{name}/{version}/members?k=v` | Members whose labels include the query pairs |
//! | GET | `/configGroups/{name}/{version}/labels/{labels}[/{cname}[/{cversion}]]` | Members by label prefix |
//! | DELETE | `/configGroups/{name}/{version}/labels/{labels}[/{cname}[/{cversion}]]` | Remove members by label prefix |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! Creating writes honor an `Idempotency-Key` header. `{labels}` is
//! `k1:v1;k2:v2`. Every route except `/metrics` is counted by
//! [`telemetry::track_requests`] and, when a [`RateLimit`] is set, shares
//! one token bucket.

pub mod group_handlers;
pub mod handlers;
pub mod rate_limit;
pub mod telemetry;

use axum::Router;
use axum::middleware;
use axum::routing::{get, put};
use cfgrid_state::{ConfigGroupStore, ConfigStore};
use metrics_exporter_prometheus::PrometheusHandle;

pub use rate_limit::RateLimit;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub configs: ConfigStore,
    pub groups: ConfigGroupStore,
    pub metrics: PrometheusHandle,
    pub rate_limit: Option<RateLimit>,
}

impl ApiState {
    /// State with the process-wide metrics recorder and no rate limit.
    pub fn new(configs: ConfigStore, groups: ConfigGroupStore) -> Self {
        Self {
            configs,
            groups,
            metrics: telemetry::prometheus_handle(),
            rate_limit: None,
        }
    }

    pub fn with_rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let mut api = Router::new()
        .route(
            "/configs",
            get(handlers::list_configs)
                .post(handlers::add_config)
                .delete(handlers::delete_all_configs),
        )
        .route(
            "/configs/{name}/{version}",
            get(handlers::get_config).delete(handlers::delete_config),
        )
        .route(
            "/configGroups",
            get(group_handlers::list_groups).post(group_handlers::add_group),
        )
        .route(
            "/configGroups/{name}/{version}",
            get(group_handlers::get_group).delete(group_handlers::delete_group),
        )
        .route(
            "/configGroups/{name}/{version}/configs/{cname}/{cversion}",
            put(group_handlers::add_config_to_group).delete(group_handlers::remove_config_from_group),
        )
        .route(
            "/configGroups/{name}/{version}/members",
            get(group_handlers::find_members),
        )
        .route(
            "/configGroups/{name}/{version}/labels/{labels}",
            get(group_handlers::get_configs_by_labels).delete(group_handlers::delete_configs_by_labels),
        )
        .route(
            "/configGroups/{name}/{version}/labels/{labels}/{cname}",
            get(group_handlers::get_configs_by_labels).delete(group_handlers::delete_configs_by_labels),
        )
        .route(
            "/configGroups/{name}/{version}/labels/{labels}/{cname}/{cversion}",
            get(group_handlers::get_configs_by_labels).delete(group_handlers::delete_configs_by_labels),
        );

    if let Some(limit) = state.rate_limit.clone() {
        api = api.route_layer(middleware::from_fn_with_state(limit, rate_limit::enforce));
    }

    api.route_layer(middleware::from_fn(telemetry::track_requests))
        .route("/metrics", get(telemetry::prometheus_metrics))
        .with_state(state)
}
