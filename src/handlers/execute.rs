use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::Error;
use crate::models::query::QueryExecutionRequest;

pub async fn execute_dashboard(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(String, String)>,
    Json(req): Json<QueryExecutionRequest>,
) -> Result<impl IntoResponse, Error> {
    let results = state.engine.execute_dashboard(&project_id, &id, &req).await?;
    Ok(Json(results))
}

pub async fn execute_widget(
    State(state): State<AppState>,
    Path((project_id, id, widget_id)): Path<(String, String, String)>,
    Json(req): Json<QueryExecutionRequest>,
) -> Result<impl IntoResponse, Error> {
    let result = state
        .engine
        .execute_widget(&project_id, &id, &widget_id, &req)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct VariableOptionsParams {
    pub view: String,
    pub dimension: String,
    #[serde(default)]
    pub limit: Option<u64>,
}

pub async fn variable_options(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<VariableOptionsParams>,
) -> Result<impl IntoResponse, Error> {
    let options = state
        .variables
        .get_variable_options(&project_id, &params.view, &params.dimension, params.limit)
        .await?;
    Ok(Json(serde_json::json!({ "options": options })))
}

pub async fn view_definitions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog.all().clone())
}
