mod catalog;
mod ch_query;
mod compiler;
mod config;
mod config_db;
mod dashboard_service;
mod error;
mod handlers;
mod models;
mod query_engine;
mod repository;
mod template_service;
mod variable_service;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post, routing::put};
use clickhouse::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use catalog::ViewCatalog;
use ch_query::ChQueryRepository;
use compiler::QueryCompiler;
use config::DashConfig;
use config_db::ConfigDb;
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("dash_api=debug,tower_http=debug")
        }))
        .init();

    let config = DashConfig::load(
        std::env::var("DASH_CONFIG").unwrap_or_else(|_| "./dash.toml".to_string()),
    )?;

    let clickhouse_url =
        std::env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
    let clickhouse_db =
        std::env::var("CLICKHOUSE_DATABASE").unwrap_or_else(|_| "observability".to_string());
    let clickhouse_user =
        std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
    let clickhouse_password = std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();

    let ch = Client::default()
        .with_url(&clickhouse_url)
        .with_database(&clickhouse_db)
        .with_user(&clickhouse_user)
        .with_password(&clickhouse_password);

    let config_db_path =
        std::env::var("DASH_CONFIG_DB").unwrap_or_else(|_| "./dash_config.db".to_string());
    let store = Arc::new(ConfigDb::open(&config_db_path)?);
    tracing::info!("config db opened at {config_db_path}");

    let catalog = Arc::new(ViewCatalog::default());
    let compiler = QueryCompiler::new(catalog.clone());
    let queries = Arc::new(ChQueryRepository::new(ch));

    let dashboards = Arc::new(DashboardService::new(store.clone(), compiler.clone()));
    let templates = Arc::new(TemplateService::new(store.clone(), store.clone()));
    templates.seed_builtin_templates()?;
    let engine = Arc::new(QueryEngine::new(
        store.clone(),
        queries.clone(),
        compiler.clone(),
        config.query.max_concurrent_widgets,
    ));
    let variables = Arc::new(VariableService::new(queries, compiler));

    let state = AppState { catalog, dashboards, templates, engine, variables };

    let app = Router::new()
        // Dashboard CRUD
        .route(
            "/api/v1/projects/{project_id}/dashboards",
            get(handlers::dashboards::list_dashboards).post(handlers::dashboards::create_dashboard),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}",
            get(handlers::dashboards::get_dashboard)
                .put(handlers::dashboards::update_dashboard)
                .delete(handlers::dashboards::delete_dashboard),
        )
        // Widgets & layout
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/widgets",
            post(handlers::dashboards::add_widget),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/widgets/{wid}",
            put(handlers::dashboards::update_widget).delete(handlers::dashboards::remove_widget),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/layout",
            put(handlers::dashboards::update_layout),
        )
        // Lifecycle
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/duplicate",
            post(handlers::dashboards::duplicate_dashboard),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/lock",
            post(handlers::dashboards::lock_dashboard),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/unlock",
            post(handlers::dashboards::unlock_dashboard),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/export",
            get(handlers::dashboards::export_dashboard),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/import",
            post(handlers::dashboards::import_dashboard),
        )
        // Execution
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/execute",
            post(handlers::execute::execute_dashboard),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/{id}/widgets/{wid}/execute",
            post(handlers::execute::execute_widget),
        )
        .route(
            "/api/v1/projects/{project_id}/dashboards/variable-options",
            get(handlers::execute::variable_options),
        )
        .route(
            "/api/v1/dashboards/view-definitions",
            get(handlers::execute::view_definitions),
        )
        // Templates
        .route("/api/v1/templates", get(handlers::templates::list_templates))
        .route("/api/v1/templates/{id}", get(handlers::templates::get_template))
        .route(
            "/api/v1/projects/{project_id}/dashboards/from-template",
            post(handlers::templates::create_from_template),
        )
        // Health
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("dash-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
