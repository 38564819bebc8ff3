pub mod catalog;
pub mod ch_query;
pub mod compiler;
pub mod config;
pub mod config_db;
pub mod dashboard_service;
pub mod error;
pub mod handlers;
pub mod models;
pub mod query_engine;
pub mod repository;
pub mod template_service;
pub mod variable_service;

use std::sync::Arc;

use catalog::ViewCatalog;
use dashboard_service::DashboardService;
use query_engine::QueryEngine;
use template_service::TemplateService;
use variable_service::VariableService;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ViewCatalog>,
    pub dashboards: Arc<DashboardService>,
    pub templates: Arc<TemplateService>,
    pub engine: Arc<QueryEngine>,
    pub variables: Arc<VariableService>,
}
