use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::compiler::SqlArg;
use crate::error::Result;
use crate::models::dashboard::{Dashboard, DashboardListFilter};
use crate::models::query::{HistogramData, TraceListItem};
use crate::models::template::{Template, TemplateListFilter};

/// Persistence contract for dashboards. Implementations serialize access
/// per row; the service layer supplies the domain rules.
pub trait DashboardRepository: Send + Sync {
    fn create(&self, dashboard: &Dashboard) -> Result<()>;
    fn get_by_id(&self, id: &str) -> Result<Dashboard>;
    fn update(&self, dashboard: &Dashboard) -> Result<()>;
    /// Hard delete. Normal removal goes through `soft_delete`.
    fn delete(&self, id: &str) -> Result<()>;
    fn soft_delete(&self, id: &str) -> Result<()>;
    fn get_by_project(&self, project_id: &str, filter: &DashboardListFilter) -> Result<Vec<Dashboard>>;
    /// Errors with NotFound when absent, never Ok-with-nothing.
    fn get_by_name_and_project(&self, project_id: &str, name: &str) -> Result<Dashboard>;
    fn count_by_project(&self, project_id: &str, filter: &DashboardListFilter) -> Result<u64>;
}

pub trait TemplateRepository: Send + Sync {
    fn list(&self, filter: &TemplateListFilter) -> Result<Vec<Template>>;
    fn get_by_id(&self, id: &str) -> Result<Template>;
    fn get_by_name(&self, name: &str) -> Result<Template>;
    fn get_by_category(&self, category: &str) -> Result<Vec<Template>>;
    fn create(&self, template: &Template) -> Result<()>;
    fn update(&self, template: &Template) -> Result<()>;
    fn delete(&self, id: &str) -> Result<()>;
    /// Insert-or-replace by name; the seeding path.
    fn upsert(&self, template: &Template) -> Result<()>;
}

/// Executor for compiled widget SQL against the columnar store. Every call
/// honors caller cancellation: dropping the future aborts the query.
#[async_trait]
pub trait WidgetQueryRepository: Send + Sync {
    /// Free-shape query; one map per row, keyed by SELECT alias.
    async fn execute_query(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<Map<String, Value>>>;
    async fn execute_trace_list(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<TraceListItem>>;
    async fn execute_histogram(&self, sql: &str, args: &[SqlArg]) -> Result<HistogramData>;
}
