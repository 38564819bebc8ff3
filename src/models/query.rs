use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// The semantic query a widget declares: what it wants to see, not how to
/// fetch it. The compiler turns this into ClickHouse SQL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WidgetQuery {
    /// Logical data source: "traces", "spans" or "scores".
    pub view: String,
    pub measures: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    /// Widget-level override of the dashboard time range.
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub limit: Option<u64>,
    /// Must name a known measure or dimension of the view.
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_dir: Option<OrderDir>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDir {
    Asc,
    Desc,
}

impl OrderDir {
    pub fn as_sql(self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub operator: FilterOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    In,
}

/// Absolute bounds, a named relative window, or nothing (caller default).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// One of 15m, 30m, 1h, 3h, 6h, 12h, 24h, 7d, 14d, 30d.
    #[serde(default)]
    pub relative: Option<String>,
}

/// Request to execute all (or one) of a dashboard's widgets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryExecutionRequest {
    #[serde(default)]
    pub widget_id: Option<String>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// Carried for a future cache layer; never branched on today.
    #[serde(default)]
    pub force_refresh: bool,
    /// Carried for a future variable-substitution pass; never read today.
    #[serde(default)]
    pub variable_values: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryMetadata {
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub row_count: usize,
    pub cached: bool,
    pub cache_expires_at: Option<DateTime<Utc>>,
}

/// Outcome of one widget's execution. A failed widget carries `error` and
/// no data; the dashboard-level call still succeeds.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetResult {
    pub widget_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Serialize)]
pub struct DashboardQueryResults {
    pub dashboard_id: String,
    pub executed_at: DateTime<Utc>,
    pub results: HashMap<String, WidgetResult>,
}

/// Fixed projection returned by the trace-list shape.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct TraceListItem {
    pub trace_id: String,
    pub name: String,
    pub start_time: i64,
    pub duration_nano: u64,
    pub status_code: u8,
    pub total_cost: f64,
    pub model_name: String,
    pub provider_name: String,
    pub service_name: String,
}

/// One `histogram()` bucket: [lower, upper) with a (possibly fractional)
/// height.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistogramData {
    pub buckets: Vec<HistogramBucket>,
}

/// Raw row shape of `histogram(N)(col) AS buckets`.
#[derive(Debug, Deserialize, Row)]
pub struct HistogramRow {
    pub buckets: Vec<(f64, f64, f64)>,
}

impl From<HistogramRow> for HistogramData {
    fn from(row: HistogramRow) -> Self {
        HistogramData {
            buckets: row
                .buckets
                .into_iter()
                .map(|(lower, upper, count)| HistogramBucket { lower, upper, count })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_query_deserializes_with_defaults() {
        let q: WidgetQuery =
            serde_json::from_str(r#"{"view": "traces", "measures": ["count"]}"#).unwrap();
        assert_eq!(q.view, "traces");
        assert_eq!(q.measures, vec!["count"]);
        assert!(q.dimensions.is_empty());
        assert!(q.filters.is_empty());
        assert!(q.limit.is_none());
    }

    #[test]
    fn filter_op_rejects_unknown_operator() {
        let bad = serde_json::from_str::<QueryFilter>(
            r#"{"field": "model_name", "operator": "regex", "value": ".*"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn filter_op_parses_all_known_operators() {
        for op in ["eq", "neq", "gt", "lt", "gte", "lte", "contains", "in"] {
            let json = format!(r#"{{"field": "f", "operator": "{op}", "value": 1}}"#);
            assert!(serde_json::from_str::<QueryFilter>(&json).is_ok(), "{op}");
        }
    }
}
