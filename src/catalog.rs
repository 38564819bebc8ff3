use std::collections::BTreeMap;

use serde::Serialize;

/// A logical data source: backing table, time column, an always-applied base
/// predicate, and the catalogs of measures and dimensions users may query.
///
/// Every SQL fragment in here is hand-authored and trusted. Nothing
/// user-provided reaches query text except through this catalog or through
/// bound `?` parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ViewDefinition {
    pub name: String,
    #[serde(skip_serializing)]
    pub table: String,
    #[serde(skip_serializing)]
    pub time_column: String,
    pub description: String,
    /// AND'd into every PREWHERE; empty means none.
    #[serde(skip_serializing)]
    pub base_filter: String,
    pub measures: BTreeMap<String, MeasureConfig>,
    pub dimensions: BTreeMap<String, DimensionConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasureConfig {
    pub id: String,
    pub label: String,
    pub description: String,
    /// Aggregate expression over view columns.
    #[serde(skip_serializing)]
    pub sql: String,
    #[serde(rename = "type")]
    pub measure_type: MeasureType,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Column/expression fed to the histogram builder.
    #[serde(skip_serializing)]
    pub histogram_column: Option<String>,
    /// Non-aggregated column backing this measure, for ordering in list
    /// shapes.
    #[serde(skip_serializing)]
    pub base_column: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureType {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    P50,
    P75,
    P95,
    P99,
    Distinct,
    Rate,
    Histogram,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionConfig {
    pub id: String,
    pub label: String,
    pub description: String,
    #[serde(skip_serializing)]
    pub sql: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Timestamp dimensions get rewritten with a bucket function.
    pub bucketable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Datetime,
}

/// Process-lifetime registry of view definitions, keyed by view name.
/// Built once at startup, read-only afterwards.
#[derive(Debug)]
pub struct ViewCatalog {
    views: BTreeMap<String, ViewDefinition>,
}

impl ViewCatalog {
    pub fn get(&self, view: &str) -> Option<&ViewDefinition> {
        self.views.get(view)
    }

    pub fn all(&self) -> &BTreeMap<String, ViewDefinition> {
        &self.views
    }

    pub fn valid_measures(&self, view: &str) -> Vec<String> {
        self.views
            .get(view)
            .map(|v| v.measures.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn valid_dimensions(&self, view: &str) -> Vec<String> {
        self.views
            .get(view)
            .map(|v| v.dimensions.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for ViewCatalog {
    fn default() -> Self {
        let mut views = BTreeMap::new();
        for v in [traces_view(), spans_view(), scores_view()] {
            views.insert(v.name.clone(), v);
        }
        ViewCatalog { views }
    }
}

fn measure(id: &str, label: &str, description: &str, sql: &str, t: MeasureType, unit: &str) -> MeasureConfig {
    MeasureConfig {
        id: id.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        sql: sql.to_string(),
        measure_type: t,
        unit: unit.to_string(),
        format: None,
        dependencies: Vec::new(),
        histogram_column: None,
        base_column: None,
    }
}

fn dimension(id: &str, label: &str, description: &str, sql: &str, t: ColumnType) -> DimensionConfig {
    DimensionConfig {
        id: id.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        sql: sql.to_string(),
        column_type: t,
        bucketable: false,
    }
}

fn insert_measure(map: &mut BTreeMap<String, MeasureConfig>, m: MeasureConfig) {
    map.insert(m.id.clone(), m);
}

fn insert_dimension(map: &mut BTreeMap<String, DimensionConfig>, d: DimensionConfig) {
    map.insert(d.id.clone(), d);
}

/// Measures shared by the `traces` and `spans` views (same backing table).
fn span_measures() -> BTreeMap<String, MeasureConfig> {
    let mut m = BTreeMap::new();

    insert_measure(&mut m, measure(
        "count", "Count", "Number of matching rows", "count()", MeasureType::Count, "",
    ));

    let mut avg_duration = measure(
        "avg_duration", "Avg Duration", "Average span duration",
        "avgOrNull(duration_nano)", MeasureType::Avg, "ns",
    );
    avg_duration.histogram_column = Some("duration_nano".to_string());
    avg_duration.base_column = Some("duration_nano".to_string());
    insert_measure(&mut m, avg_duration);

    for (id, label, q) in [
        ("p50_duration", "P50 Duration", "0.50"),
        ("p95_duration", "P95 Duration", "0.95"),
        ("p99_duration", "P99 Duration", "0.99"),
    ] {
        let mut p = measure(
            id, label, "Duration quantile",
            &format!("quantileOrNull({q})(duration_nano)"),
            match id {
                "p50_duration" => MeasureType::P50,
                "p95_duration" => MeasureType::P95,
                _ => MeasureType::P99,
            },
            "ns",
        );
        p.histogram_column = Some("duration_nano".to_string());
        p.base_column = Some("duration_nano".to_string());
        insert_measure(&mut m, p);
    }

    let mut total_cost = measure(
        "total_cost", "Total Cost", "Summed request cost",
        "sum(total_cost)", MeasureType::Sum, "USD",
    );
    total_cost.base_column = Some("total_cost".to_string());
    insert_measure(&mut m, total_cost);

    let mut avg_cost = measure(
        "avg_cost", "Avg Cost", "Average request cost",
        "avgOrNull(total_cost)", MeasureType::Avg, "USD",
    );
    avg_cost.base_column = Some("total_cost".to_string());
    insert_measure(&mut m, avg_cost);

    let mut in_tokens = measure(
        "total_input_tokens", "Input Tokens", "Summed prompt tokens",
        "sum(input_tokens)", MeasureType::Sum, "tokens",
    );
    in_tokens.base_column = Some("input_tokens".to_string());
    insert_measure(&mut m, in_tokens);

    let mut out_tokens = measure(
        "total_output_tokens", "Output Tokens", "Summed completion tokens",
        "sum(output_tokens)", MeasureType::Sum, "tokens",
    );
    out_tokens.base_column = Some("output_tokens".to_string());
    insert_measure(&mut m, out_tokens);

    let mut total_tokens = measure(
        "total_tokens", "Total Tokens", "Summed prompt + completion tokens",
        "sum(input_tokens + output_tokens)", MeasureType::Sum, "tokens",
    );
    total_tokens.base_column = Some("input_tokens + output_tokens".to_string());
    insert_measure(&mut m, total_tokens);

    insert_measure(&mut m, measure(
        "error_count", "Error Count", "Rows with error status",
        "countIf(status_code = 2)", MeasureType::Count, "",
    ));

    let mut error_rate = measure(
        "error_rate", "Error Rate", "Percentage of rows with error status",
        "if(count() = 0, null, countIf(status_code = 2) * 100.0 / count())",
        MeasureType::Rate, "%",
    );
    error_rate.format = Some("percent".to_string());
    insert_measure(&mut m, error_rate);

    insert_measure(&mut m, measure(
        "unique_users", "Unique Users", "Distinct end users",
        "uniq(span_attributes['user_id'])", MeasureType::Distinct, "",
    ));
    insert_measure(&mut m, measure(
        "unique_sessions", "Unique Sessions", "Distinct sessions",
        "uniq(session_id)", MeasureType::Distinct, "",
    ));

    m
}

/// Dimensions shared by the `traces` and `spans` views.
fn span_dimensions() -> BTreeMap<String, DimensionConfig> {
    let mut d = BTreeMap::new();

    let mut time = dimension("time", "Time", "Bucketed event time", "start_time", ColumnType::Datetime);
    time.bucketable = true;
    insert_dimension(&mut d, time);

    insert_dimension(&mut d, dimension("model_name", "Model", "LLM model name", "model_name", ColumnType::String));
    insert_dimension(&mut d, dimension("provider_name", "Provider", "LLM provider", "provider_name", ColumnType::String));
    insert_dimension(&mut d, dimension("service_name", "Service", "Instrumented service", "service_name", ColumnType::String));
    insert_dimension(&mut d, dimension("status_code", "Status", "OTel status code", "status_code", ColumnType::Number));
    insert_dimension(&mut d, dimension("span_name", "Span Name", "Operation name", "span_name", ColumnType::String));
    insert_dimension(&mut d, dimension("span_type", "Span Type", "Instrumentation span kind", "span_type", ColumnType::String));
    insert_dimension(&mut d, dimension(
        "user_id", "User", "End-user id from span attributes",
        "span_attributes['user_id']", ColumnType::String,
    ));
    insert_dimension(&mut d, dimension("session_id", "Session", "Session id", "session_id", ColumnType::String));
    insert_dimension(&mut d, dimension("trace_id", "Trace", "Trace id", "trace_id", ColumnType::String));
    insert_dimension(&mut d, dimension("duration_nano", "Duration", "Span duration in ns", "duration_nano", ColumnType::Number));

    d
}

fn traces_view() -> ViewDefinition {
    ViewDefinition {
        name: "traces".to_string(),
        table: "otel_traces".to_string(),
        time_column: "start_time".to_string(),
        description: "Root spans of gateway traces".to_string(),
        base_filter: "parent_span_id IS NULL AND deleted_at IS NULL".to_string(),
        measures: span_measures(),
        dimensions: span_dimensions(),
    }
}

fn spans_view() -> ViewDefinition {
    let mut dimensions = span_dimensions();
    insert_dimension(&mut dimensions, dimension(
        "span_level", "Span Level", "Depth within the trace tree", "span_level", ColumnType::Number,
    ));
    ViewDefinition {
        name: "spans".to_string(),
        table: "otel_traces".to_string(),
        time_column: "start_time".to_string(),
        description: "All spans, root and child".to_string(),
        base_filter: "deleted_at IS NULL".to_string(),
        measures: span_measures(),
        dimensions,
    }
}

fn scores_view() -> ViewDefinition {
    let mut measures = BTreeMap::new();
    insert_measure(&mut measures, measure(
        "count", "Count", "Number of scores", "count()", MeasureType::Count, "",
    ));
    let mut avg_score = measure(
        "avg_score", "Avg Score", "Average score value",
        "avgOrNull(value)", MeasureType::Avg, "",
    );
    avg_score.base_column = Some("value".to_string());
    insert_measure(&mut measures, avg_score);
    let mut passing_rate = measure(
        "passing_rate", "Passing Rate", "Percentage of scores at or above 0.5",
        "if(count() = 0, null, countIf(value >= 0.5) * 100.0 / count())",
        MeasureType::Rate, "%",
    );
    passing_rate.format = Some("percent".to_string());
    insert_measure(&mut measures, passing_rate);
    insert_measure(&mut measures, measure(
        "unique_traces", "Unique Traces", "Distinct traces scored",
        "uniq(trace_id)", MeasureType::Distinct, "",
    ));

    let mut dimensions = BTreeMap::new();
    let mut time = dimension("time", "Time", "Bucketed score time", "timestamp", ColumnType::Datetime);
    time.bucketable = true;
    insert_dimension(&mut dimensions, time);
    insert_dimension(&mut dimensions, dimension("name", "Score Name", "Evaluator name", "name", ColumnType::String));
    insert_dimension(&mut dimensions, dimension("source", "Source", "Score origin (api, eval, annotation)", "source", ColumnType::String));
    insert_dimension(&mut dimensions, dimension("data_type", "Data Type", "Score value type", "data_type", ColumnType::String));
    insert_dimension(&mut dimensions, dimension("trace_id", "Trace", "Scored trace id", "trace_id", ColumnType::String));

    ViewDefinition {
        name: "scores".to_string(),
        table: "scores".to_string(),
        time_column: "timestamp".to_string(),
        description: "Quality scores attached to traces".to_string(),
        base_filter: String::new(),
        measures,
        dimensions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_all_three_views() {
        let catalog = ViewCatalog::default();
        for view in ["traces", "spans", "scores"] {
            assert!(catalog.get(view).is_some(), "missing view {view}");
        }
        assert!(catalog.get("logs").is_none());
        assert_eq!(catalog.all().len(), 3);
    }

    #[test]
    fn traces_view_shape() {
        let catalog = ViewCatalog::default();
        let traces = catalog.get("traces").unwrap();
        assert_eq!(traces.table, "otel_traces");
        assert_eq!(traces.time_column, "start_time");
        assert_eq!(traces.base_filter, "parent_span_id IS NULL AND deleted_at IS NULL");
        for id in [
            "count", "avg_duration", "p50_duration", "p95_duration", "p99_duration",
            "total_cost", "avg_cost", "total_input_tokens", "total_output_tokens",
            "total_tokens", "error_count", "error_rate", "unique_users", "unique_sessions",
        ] {
            assert!(traces.measures.contains_key(id), "missing measure {id}");
        }
        for id in [
            "time", "model_name", "provider_name", "service_name", "status_code",
            "span_name", "span_type", "user_id", "session_id", "trace_id", "duration_nano",
        ] {
            assert!(traces.dimensions.contains_key(id), "missing dimension {id}");
        }
        assert!(traces.dimensions["time"].bucketable);
        assert!(!traces.dimensions["model_name"].bucketable);
    }

    #[test]
    fn spans_view_drops_root_predicate_and_adds_level() {
        let catalog = ViewCatalog::default();
        let spans = catalog.get("spans").unwrap();
        assert_eq!(spans.table, "otel_traces");
        assert_eq!(spans.base_filter, "deleted_at IS NULL");
        assert!(spans.dimensions.contains_key("span_level"));
        assert!(!catalog.get("traces").unwrap().dimensions.contains_key("span_level"));
    }

    #[test]
    fn scores_view_shape() {
        let catalog = ViewCatalog::default();
        let scores = catalog.get("scores").unwrap();
        assert_eq!(scores.table, "scores");
        assert_eq!(scores.time_column, "timestamp");
        assert!(scores.base_filter.is_empty());
        for id in ["avg_score", "passing_rate", "unique_traces"] {
            assert!(scores.measures.contains_key(id), "missing measure {id}");
        }
        for id in ["name", "source", "data_type", "trace_id"] {
            assert!(scores.dimensions.contains_key(id), "missing dimension {id}");
        }
    }

    #[test]
    fn valid_ids_track_catalog_content() {
        let catalog = ViewCatalog::default();
        assert!(catalog.valid_measures("traces").contains(&"error_rate".to_string()));
        assert!(catalog.valid_dimensions("scores").contains(&"source".to_string()));
        assert!(catalog.valid_measures("unknown").is_empty());
    }

    #[test]
    fn duration_measures_carry_histogram_column() {
        let catalog = ViewCatalog::default();
        let traces = catalog.get("traces").unwrap();
        assert_eq!(traces.measures["p95_duration"].histogram_column.as_deref(), Some("duration_nano"));
        // Cost and token measures rely on the legacy fallback instead.
        assert!(traces.measures["avg_cost"].histogram_column.is_none());
        assert!(traces.measures["total_tokens"].histogram_column.is_none());
    }

    #[test]
    fn wire_format_hides_sql_fragments() {
        let catalog = ViewCatalog::default();
        let json = serde_json::to_string(catalog.get("traces").unwrap()).unwrap();
        assert!(!json.contains("countIf"));
        assert!(!json.contains("otel_traces"));
        assert!(json.contains("\"error_rate\""));
    }
}
