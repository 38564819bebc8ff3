use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::AppState;
use crate::error::Error;
use crate::models::template::{CreateFromTemplateRequest, TemplateListFilter};

pub async fn list_templates(
    State(state): State<AppState>,
    Query(filter): Query<TemplateListFilter>,
) -> Result<impl IntoResponse, Error> {
    let templates = state.templates.list_templates(&filter)?;
    Ok(Json(serde_json::json!({ "templates": templates })))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let template = state.templates.get_template(&id)?;
    Ok(Json(template))
}

pub async fn create_from_template(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateFromTemplateRequest>,
) -> Result<impl IntoResponse, Error> {
    let user_id = headers.get("x-user-id").and_then(|v| v.to_str().ok());
    let dashboard = state
        .templates
        .create_from_template(&project_id, user_id, req)?;
    Ok((StatusCode::CREATED, Json(dashboard)))
}
