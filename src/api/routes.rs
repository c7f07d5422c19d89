//! Router assembly: wires every handler in [`crate::api::handlers`] onto
//! its path and method, and layers on CORS per [`crate::config::ServerConfig`].

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::handlers::{audit_log, auth, cluster, distributor, fleet, health, license};
use crate::api::state::AppState;
use crate::config::settings::ServerConfig;

pub fn build_router(state: AppState, server_config: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::readiness_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/clusters", get(cluster::list_clusters_handler).post(cluster::create_cluster_handler))
        .route("/clusters/{cluster_id}/rotate-key", post(cluster::rotate_api_key_handler))
        .route("/clusters/{cluster_id}/proxies", get(fleet::list_proxies_handler))
        .route("/audit-logs", get(audit_log::list_recent_handler))
        .route("/audit-logs/{target_type}/{target_id}", get(audit_log::list_for_target_handler))
        .route("/license/status", get(license::license_status_handler))
        .route("/license/validate", post(license::validate_license_handler))
        .route("/license/features", get(license::check_feature_handler))
        .route("/proxy/register", post(fleet::register_handler))
        .route("/proxy/heartbeat", post(fleet::heartbeat_handler))
        .route("/config/cluster", get(distributor::get_cluster_config_handler))
        .route("/config/proxy/{proxy_name}", get(distributor::get_proxy_config_handler))
        .route("/config/poll", get(distributor::poll_config_handler))
        .with_state(state);

    router.layer(build_cors_layer(server_config))
}

fn build_cors_layer(server_config: &ServerConfig) -> CorsLayer {
    if !server_config.enable_cors {
        return CorsLayer::new();
    }

    if server_config.cors_origins.is_empty() {
        return CorsLayer::new().allow_methods([Method::GET, Method::POST]).allow_headers(tower_http::cors::Any);
    }

    let origins: Vec<HeaderValue> =
        server_config.cors_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
