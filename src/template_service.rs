use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::dashboard::{Dashboard, DashboardConfig, LayoutItem, Widget, WidgetType};
use crate::models::query::WidgetQuery;
use crate::models::template::{CreateFromTemplateRequest, Template, TemplateListFilter};
use crate::repository::{DashboardRepository, TemplateRepository};

/// Curated dashboard templates: list/get plus materializing a project
/// dashboard from one. Templates are read-only from the user surface;
/// seeding upserts by name.
pub struct TemplateService {
    templates: Arc<dyn TemplateRepository>,
    dashboards: Arc<dyn DashboardRepository>,
}

impl TemplateService {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        dashboards: Arc<dyn DashboardRepository>,
    ) -> Self {
        Self { templates, dashboards }
    }

    pub fn list_templates(&self, filter: &TemplateListFilter) -> Result<Vec<Template>> {
        self.templates.list(filter)
    }

    pub fn get_template(&self, id: &str) -> Result<Template> {
        self.templates.get_by_id(id)
    }

    /// Materialize a dashboard from a template: fresh widget ids, layout
    /// references remapped, description carried over.
    pub fn create_from_template(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        req: CreateFromTemplateRequest,
    ) -> Result<Dashboard> {
        let template = self.templates.get_by_id(&req.template_id)?;
        let name = req.name.trim();
        if name.is_empty() {
            return Err(Error::validation("dashboard name must not be empty"));
        }
        match self.dashboards.get_by_name_and_project(project_id, name) {
            Ok(_) => {
                return Err(Error::conflict(format!(
                    "a dashboard named '{name}' already exists in this project"
                )));
            }
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let mut config = template.config.clone();
        let mut id_map = HashMap::new();
        for widget in &mut config.widgets {
            let fresh = Uuid::new_v4().to_string();
            id_map.insert(widget.id.clone(), fresh.clone());
            widget.id = fresh;
        }
        let layout: Vec<LayoutItem> = template
            .layout
            .iter()
            .map(|item| LayoutItem {
                widget_id: id_map
                    .get(&item.widget_id)
                    .cloned()
                    .unwrap_or_else(|| item.widget_id.clone()),
                ..item.clone()
            })
            .collect();

        let now = Utc::now();
        let dashboard = Dashboard {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            description: template.description.clone(),
            config,
            layout,
            is_locked: false,
            created_by: user_id.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.dashboards.create(&dashboard)?;
        tracing::info!(
            "dashboard '{}' created from template '{}'",
            dashboard.id,
            template.name
        );
        Ok(dashboard)
    }

    /// Upsert the built-in templates. Run once at startup; safe to repeat.
    pub fn seed_builtin_templates(&self) -> Result<()> {
        for template in builtin_templates() {
            self.templates.upsert(&template)?;
        }
        Ok(())
    }
}

fn query_widget(id: &str, widget_type: WidgetType, title: &str, query: WidgetQuery) -> Widget {
    Widget {
        id: id.to_string(),
        widget_type,
        title: title.to_string(),
        description: String::new(),
        query: Some(query),
        config: Default::default(),
    }
}

fn builtin_templates() -> Vec<Template> {
    let now = Utc::now();

    let overview_config = DashboardConfig {
        widgets: vec![
            query_widget("requests", WidgetType::TimeSeries, "Requests", WidgetQuery {
                view: "traces".into(),
                measures: vec!["count".into(), "error_count".into()],
                dimensions: vec!["time".into()],
                ..Default::default()
            }),
            query_widget("latency", WidgetType::TimeSeries, "Latency", WidgetQuery {
                view: "traces".into(),
                measures: vec!["p50_duration".into(), "p95_duration".into(), "p99_duration".into()],
                dimensions: vec!["time".into()],
                ..Default::default()
            }),
            query_widget("error_rate", WidgetType::Stat, "Error Rate", WidgetQuery {
                view: "traces".into(),
                measures: vec!["error_rate".into()],
                ..Default::default()
            }),
            query_widget("recent_traces", WidgetType::TraceList, "Recent Traces", WidgetQuery {
                view: "traces".into(),
                ..Default::default()
            }),
        ],
        refresh_rate: Some(60),
        time_range: None,
        variables: Vec::new(),
    };
    let overview_layout = vec![
        LayoutItem { widget_id: "requests".into(), x: 0, y: 0, w: 8, h: 3 },
        LayoutItem { widget_id: "error_rate".into(), x: 8, y: 0, w: 4, h: 3 },
        LayoutItem { widget_id: "latency".into(), x: 0, y: 3, w: 12, h: 3 },
        LayoutItem { widget_id: "recent_traces".into(), x: 0, y: 6, w: 12, h: 4 },
    ];

    let cost_config = DashboardConfig {
        widgets: vec![
            query_widget("total_cost", WidgetType::Stat, "Total Cost", WidgetQuery {
                view: "traces".into(),
                measures: vec!["total_cost".into()],
                ..Default::default()
            }),
            query_widget("cost_over_time", WidgetType::TimeSeries, "Cost Over Time", WidgetQuery {
                view: "traces".into(),
                measures: vec!["total_cost".into()],
                dimensions: vec!["time".into()],
                ..Default::default()
            }),
            query_widget("tokens_by_model", WidgetType::Bar, "Tokens by Model", WidgetQuery {
                view: "traces".into(),
                measures: vec!["total_input_tokens".into(), "total_output_tokens".into()],
                dimensions: vec!["model_name".into()],
                ..Default::default()
            }),
            query_widget("cost_by_provider", WidgetType::Table, "Cost by Provider", WidgetQuery {
                view: "traces".into(),
                measures: vec!["total_cost".into(), "count".into()],
                dimensions: vec!["provider_name".into()],
                order_by: Some("total_cost".into()),
                order_dir: Some(crate::models::query::OrderDir::Desc),
                ..Default::default()
            }),
        ],
        refresh_rate: None,
        time_range: None,
        variables: Vec::new(),
    };
    let cost_layout = vec![
        LayoutItem { widget_id: "total_cost".into(), x: 0, y: 0, w: 4, h: 3 },
        LayoutItem { widget_id: "cost_over_time".into(), x: 4, y: 0, w: 8, h: 3 },
        LayoutItem { widget_id: "tokens_by_model".into(), x: 0, y: 3, w: 6, h: 4 },
        LayoutItem { widget_id: "cost_by_provider".into(), x: 6, y: 3, w: 6, h: 4 },
    ];

    vec![
        Template {
            id: Uuid::now_v7().to_string(),
            name: "LLM Overview".to_string(),
            description: Some("Traffic, latency and errors at a glance".to_string()),
            category: Some("llm".to_string()),
            is_active: true,
            config: overview_config,
            layout: overview_layout,
            created_at: now,
            updated_at: now,
        },
        Template {
            id: Uuid::now_v7().to_string(),
            name: "Cost & Usage".to_string(),
            description: Some("Spend and token consumption by model and provider".to_string()),
            category: Some("cost".to_string()),
            is_active: true,
            config: cost_config,
            layout: cost_layout,
            created_at: now,
            updated_at: now,
        },
    ]
}
