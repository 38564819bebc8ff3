use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::query::{TimeRange, WidgetQuery};

/// A project-scoped dashboard: a named container of widgets, their grid
/// layout, and dashboard-level variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub config: DashboardConfig,
    #[serde(default)]
    pub layout: Vec<LayoutItem>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub widgets: Vec<Widget>,
    /// Auto-refresh interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<u64>,
    /// Dashboard-default time range, overridable per widget and per request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    /// Unique within the dashboard; minted when the widget is added.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Required for every type except `text`.
    #[serde(default)]
    pub query: Option<WidgetQuery>,
    /// Type-specific hints, e.g. `bucket_count` for histogram widgets or
    /// `content` for text widgets.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    Stat,
    TimeSeries,
    Table,
    Bar,
    Pie,
    Heatmap,
    Histogram,
    TraceList,
    Text,
}

/// A grid placement binding a widget id to a cell rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutItem {
    pub widget_id: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Static options for `select` variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Source for `query` variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_config: Option<VariableQueryConfig>,
    #[serde(default)]
    pub multi: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Number,
    Select,
    Query,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableQueryConfig {
    pub view: String,
    pub dimension: String,
    #[serde(default)]
    pub limit: Option<u64>,
}

// ── Request / response documents ──

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDashboardRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<DashboardConfig>,
    #[serde(default)]
    pub layout: Option<Vec<LayoutItem>>,
}

/// Partial update: absent fields leave the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDashboardRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<DashboardConfig>,
    #[serde(default)]
    pub layout: Option<Vec<LayoutItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DuplicateDashboardRequest {
    pub name: String,
}

/// Portable dashboard document produced by export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub config: DashboardConfig,
    #[serde(default)]
    pub layout: Vec<LayoutItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportDashboardRequest {
    /// Overrides the name embedded in the export when present.
    #[serde(default)]
    pub name: Option<String>,
    pub data: DashboardExport,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardListFilter {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    /// Case-insensitive name substring match.
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardPage {
    pub dashboards: Vec<Dashboard>,
    pub total: u64,
}
