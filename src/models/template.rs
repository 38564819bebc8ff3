use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::dashboard::{DashboardConfig, LayoutItem};

/// A curated dashboard template. Unscoped (no project), immutable from the
/// user surface; upsert-by-name is the seeding path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    /// Globally unique.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub is_active: bool,
    pub config: DashboardConfig,
    #[serde(default)]
    pub layout: Vec<LayoutItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFromTemplateRequest {
    pub template_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateListFilter {
    #[serde(default)]
    pub category: Option<String>,
}
