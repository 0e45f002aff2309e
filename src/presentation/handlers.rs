// HTTP request handlers
use crate::application::session::SessionError;
use crate::domain::grouping::{GroupingDepth, SortOrder};
use crate::domain::header::MultiLevelHeader;
use crate::domain::settings::{SiteSettings, TagSettings};
use crate::domain::table::RowRecord;
use crate::domain::telemetry::TimeWindow;
use crate::infrastructure::csv_export::to_csv_bytes;
use crate::infrastructure::http_response::{accepts_brotli, attachment_response, json_response};
use crate::infrastructure::logging::{SCRIPT_LOG_TARGET, USER_LOG_TARGET};
use crate::presentation::app_state::AppState;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

type HandlerResponse = Response<Body>;

async fn respond<T: Serialize>(headers: &HeaderMap, data: &T) -> HandlerResponse {
    match json_response(data, accepts_brotli(headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> HandlerResponse {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn session_error_response(e: SessionError) -> HandlerResponse {
    let status = match &e {
        SessionError::NoTagsSelected | SessionError::InvalidWindow { .. } => StatusCode::BAD_REQUEST,
        SessionError::TagSource(_) | SessionError::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
    };
    tracing::error!("Request failed: {}", e);
    error_response(status, e.to_string())
}

fn internal_error(context: &str, e: anyhow::Error) -> HandlerResponse {
    tracing::error!("{}: {:#}", context, e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, context)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
pub struct TagListQuery {
    #[serde(default)]
    pub refresh: bool,
}

pub async fn get_taglist(
    headers: HeaderMap,
    Query(query): Query<TagListQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mut session = state.controller.session().await;
    if let Err(e) = session.load_tags(query.refresh).await {
        return session_error_response(e);
    }
    respond(&headers, &session.tags()).await
}

pub async fn get_tree(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = state.controller.session().await.tree_view();
    respond(&headers, &view).await
}

#[derive(Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    pub filter: String,
}

pub async fn set_filter(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<FilterRequest>,
) -> impl IntoResponse {
    let view = {
        let mut session = state.controller.session().await;
        session.set_filter(&request.filter);
        session.tree_view()
    };
    respond(&headers, &view).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRequest {
    pub grouping_mode: Option<GroupingDepth>,
    pub sort_order: Option<SortOrder>,
}

/// Change grouping/sort and persist it to the site settings
pub async fn set_view(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ViewRequest>,
) -> impl IntoResponse {
    let ViewRequest { grouping_mode, sort_order } = request;
    let change = Box::new(move |site: &mut SiteSettings| {
        if let Some(grouping) = grouping_mode {
            site.grouping_mode = grouping;
        }
        if let Some(order) = sort_order {
            site.sort_order = order;
        }
    });
    let site = match state.settings.update_site_settings(change).await {
        Ok(site) => site,
        Err(e) => return internal_error("Failed to save site settings", e),
    };

    let view = {
        let mut session = state.controller.session().await;
        session.apply_site_settings(&site);
        session.tree_view()
    };
    respond(&headers, &view).await
}

#[derive(Deserialize)]
pub struct ToggleGroupRequest {
    pub path: String,
}

pub async fn toggle_group(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ToggleGroupRequest>,
) -> impl IntoResponse {
    let expanded = state.controller.session().await.toggle_group(&request.path);
    respond(&headers, &json!({ "path": request.path, "expanded": expanded })).await
}

#[derive(Deserialize)]
pub struct ToggleTagRequest {
    pub tag: String,
}

pub async fn toggle_tag(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ToggleTagRequest>,
) -> impl IntoResponse {
    let (selected, summary) = {
        let mut session = state.controller.session().await;
        let selected = session.toggle_tag(&request.tag);
        (selected, session.tree_view().summary())
    };
    tracing::debug!("Tag {} selected={}", request.tag, selected);
    respond(
        &headers,
        &json!({ "tag": request.tag, "selected": selected, "summary": summary }),
    )
    .await
}

pub async fn select_all(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = {
        let mut session = state.controller.session().await;
        session.select_displayed();
        session.tree_view()
    };
    respond(&headers, &view).await
}

pub async fn deselect_all(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = {
        let mut session = state.controller.session().await;
        session.deselect_displayed();
        session.tree_view()
    };
    respond(&headers, &view).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub start_date_unix_seconds: i64,
    pub end_date_unix_seconds: i64,
}

pub async fn fetch_data(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<FetchRequest>,
) -> impl IntoResponse {
    let (start, end) = (request.start_date_unix_seconds, request.end_date_unix_seconds);
    let Some(window) = TimeWindow::checked_from_unix_seconds(start, end) else {
        return session_error_response(SessionError::InvalidWindow {
            start_ms: start.saturating_mul(1000),
            end_ms: end.saturating_mul(1000),
        });
    };
    match state.controller.graph(window).await {
        Ok(result) => respond(&headers, &result).await,
        Err(e) => session_error_response(e),
    }
}

#[derive(Deserialize, Default)]
pub struct WorkingTableRequest {
    /// Optional display range in shifted epoch milliseconds (chart zoom)
    pub min: Option<i64>,
    pub max: Option<i64>,
}

#[derive(Serialize)]
struct WorkingTableResponse<'a> {
    header: &'a MultiLevelHeader,
    columns: Vec<String>,
    rows: Vec<RowRecord<'a>>,
}

async fn load_settings(state: &AppState) -> anyhow::Result<(SiteSettings, TagSettings)> {
    let site = state.settings.load_site_settings().await?;
    let tags = state.settings.load_tag_settings().await?;
    Ok((site, tags))
}

pub async fn working_table(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    request: Option<Json<WorkingTableRequest>>,
) -> impl IntoResponse {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let (site, tag_settings) = match load_settings(&state).await {
        Ok(settings) => settings,
        Err(e) => return internal_error("Failed to load settings", e),
    };

    let session = state.controller.session().await;
    let view = match (request.min, request.max) {
        (Some(min), Some(max)) => Some(TimeWindow::new(min, max)),
        _ => None,
    };
    let working = session.working_table(&site, &tag_settings, view);
    drop(session);

    let response = WorkingTableResponse {
        header: &working.header,
        columns: working.table.header(),
        rows: working.table.records(),
    };
    respond(&headers, &response).await
}

pub async fn export_csv(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (site, tag_settings) = match load_settings(&state).await {
        Ok(settings) => settings,
        Err(e) => return internal_error("Failed to load settings", e),
    };

    let working = state
        .controller
        .session()
        .await
        .working_table(&site, &tag_settings, None);
    if working.table.columns.is_empty() || working.table.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No data to export");
    }

    let bytes = match to_csv_bytes(&working.header, &working.table) {
        Ok(bytes) => bytes,
        Err(e) => return internal_error("Failed to build CSV", e),
    };
    let filename = site.export_file_name();
    tracing::info!("Exporting {} rows as {}", working.table.rows.len(), filename);
    match attachment_response(bytes, "text/csv; charset=utf-8", &filename, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[derive(Deserialize)]
pub struct AutoRefreshRequest {
    pub enabled: bool,
}

pub async fn auto_refresh(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<AutoRefreshRequest>,
) -> impl IntoResponse {
    let running = if request.enabled {
        let site = match state.settings.load_site_settings().await {
            Ok(site) => site,
            Err(e) => return internal_error("Failed to load site settings", e),
        };
        state
            .controller
            .start_auto_refresh(Duration::from_millis(site.poll_interval))
            .await
    } else {
        state.controller.stop_auto_refresh().await;
        false
    };
    respond(&headers, &json!({ "running": running })).await
}

pub async fn auto_refresh_status(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let running = state.controller.auto_refresh_running().await;
    respond(&headers, &json!({ "running": running })).await
}

pub async fn get_site_settings(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.settings.load_site_settings().await {
        Ok(site) => respond(&headers, &site).await,
        Err(e) => internal_error("Failed to load site settings", e),
    }
}

pub async fn save_site_settings(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(site): Json<SiteSettings>,
) -> impl IntoResponse {
    if let Err(e) = state.settings.save_site_settings(&site).await {
        return internal_error("Failed to save site settings", e);
    }
    state.controller.session().await.apply_site_settings(&site);
    respond(&headers, &json!({ "status": "success" })).await
}

pub async fn get_tag_settings(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.settings.load_tag_settings().await {
        Ok(tags) => respond(&headers, &tags).await,
        Err(e) => internal_error("Failed to load tag settings", e),
    }
}

pub async fn save_tag_settings(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(tags): Json<TagSettings>,
) -> impl IntoResponse {
    if let Err(e) = state.settings.save_tag_settings(&tags).await {
        return internal_error("Failed to save tag settings", e);
    }
    respond(&headers, &json!({ "status": "success" })).await
}

pub async fn clear_cache(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = state.controller.clear_cache().await {
        return internal_error("Failed to clear cache", e);
    }
    tracing::info!("Session and caches cleared");
    respond(&headers, &json!({ "status": "Cache cleared" })).await
}

#[derive(Deserialize)]
pub struct LogEventRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Client-side log lines, routed to the user or script log target
pub async fn log_event(Json(request): Json<LogEventRequest>) -> impl IntoResponse {
    match request.kind.as_str() {
        "user" => tracing::info!(target: USER_LOG_TARGET, "{}", request.message),
        "script" => tracing::info!(target: SCRIPT_LOG_TARGET, "{}", request.message),
        other => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid log type: {}", other));
        }
    }
    Json(json!({ "status": "logged" })).into_response()
}
