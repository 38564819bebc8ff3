use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::AppState;
use crate::error::Error;
use crate::models::dashboard::{
    CreateDashboardRequest, DashboardListFilter, DuplicateDashboardRequest,
    ImportDashboardRequest, LayoutItem, UpdateDashboardRequest, Widget,
};

/// Caller identity, when the gateway in front of us forwards one.
fn user_id(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-user-id").and_then(|v| v.to_str().ok())
}

pub async fn list_dashboards(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(filter): Query<DashboardListFilter>,
) -> Result<impl IntoResponse, Error> {
    let page = state.dashboards.list_dashboards(&project_id, &filter)?;
    Ok(Json(page))
}

pub async fn create_dashboard(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateDashboardRequest>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state
        .dashboards
        .create_dashboard(&project_id, user_id(&headers), req)?;
    Ok((StatusCode::CREATED, Json(dashboard)))
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state.dashboards.get_dashboard_by_project(&project_id, &id)?;
    Ok(Json(dashboard))
}

pub async fn update_dashboard(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
    Json(req): Json<UpdateDashboardRequest>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state.dashboards.update_dashboard(&project_id, &id, req)?;
    Ok(Json(dashboard))
}

pub async fn delete_dashboard(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    state.dashboards.delete_dashboard(&project_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_widget(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
    Json(widget): Json<Widget>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state.dashboards.add_widget(&project_id, &id, widget)?;
    Ok((StatusCode::CREATED, Json(dashboard)))
}

pub async fn update_widget(
    State(state): State<AppState>,
    Path((project_id, id, widget_id)): Path<(String, String, String)>,
    Json(widget): Json<Widget>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state
        .dashboards
        .update_widget(&project_id, &id, &widget_id, widget)?;
    Ok(Json(dashboard))
}

pub async fn remove_widget(
    State(state): State<AppState>,
    Path((project_id, id, widget_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state.dashboards.remove_widget(&project_id, &id, &widget_id)?;
    Ok(Json(dashboard))
}

pub async fn update_layout(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
    Json(layout): Json<Vec<LayoutItem>>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state.dashboards.update_layout(&project_id, &id, layout)?;
    Ok(Json(dashboard))
}

pub async fn duplicate_dashboard(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
    Json(req): Json<DuplicateDashboardRequest>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state
        .dashboards
        .duplicate_dashboard(&project_id, &id, &req.name)?;
    Ok((StatusCode::CREATED, Json(dashboard)))
}

pub async fn lock_dashboard(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state.dashboards.set_locked(&project_id, &id, true)?;
    Ok(Json(dashboard))
}

pub async fn unlock_dashboard(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state.dashboards.set_locked(&project_id, &id, false)?;
    Ok(Json(dashboard))
}

pub async fn export_dashboard(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    let export = state.dashboards.export_dashboard(&project_id, &id)?;
    Ok(Json(export))
}

pub async fn import_dashboard(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ImportDashboardRequest>,
) -> Result<impl IntoResponse, Error> {
    let dashboard = state
        .dashboards
        .import_dashboard(&project_id, user_id(&headers), req)?;
    Ok((StatusCode::CREATED, Json(dashboard)))
}
