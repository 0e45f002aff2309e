// Presentation layer - HTTP routes and handlers
pub mod app_state;
pub mod handlers;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/taglist", get(get_taglist))
        .route("/tree", get(get_tree))
        .route("/tree/filter", post(set_filter))
        .route("/tree/view", post(set_view))
        .route("/tree/toggle_group", post(toggle_group))
        .route("/selection/toggle", post(toggle_tag))
        .route("/selection/select_all", post(select_all))
        .route("/selection/deselect_all", post(deselect_all))
        .route("/fetch_data", post(fetch_data))
        .route("/working_table", post(working_table))
        .route("/export_csv", post(export_csv))
        .route("/auto_refresh", get(auto_refresh_status).post(auto_refresh))
        .route("/site_settings", get(get_site_settings).post(save_site_settings))
        .route("/tag_settings", get(get_tag_settings).post(save_tag_settings))
        .route("/clear_cache", post(clear_cache))
        .route("/log_event", post(log_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
