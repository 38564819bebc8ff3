//! Semantic → SQL compiler.
//!
//! Takes a widget's semantic query (view + measures + dimensions + filters)
//! and emits parameterized ClickHouse SQL. Four shapes: aggregation,
//! trace list, histogram, and variable options. Every non-literal value is
//! bound through a `?` placeholder; user input reaches query text only via
//! catalog lookup.

pub mod bucket;
pub mod filter;

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};

use crate::catalog::{MeasureConfig, ViewCatalog, ViewDefinition};
use crate::error::{Error, Result};
use crate::models::dashboard::{Widget, WidgetType};
use crate::models::query::{OrderDir, QueryFilter, WidgetQuery};

pub use filter::{build_filter_condition, is_safe_identifier};

const AGG_DEFAULT_LIMIT: u64 = 1_000;
const AGG_MAX_LIMIT: u64 = 10_000;
const LIST_DEFAULT_LIMIT: u64 = 50;
const LIST_MAX_LIMIT: u64 = 1_000;
const VAR_DEFAULT_LIMIT: u64 = 100;
const VAR_MAX_LIMIT: u64 = 1_000;

pub const DEFAULT_HISTOGRAM_BUCKETS: u64 = 20;

/// Fixed projection of the trace-list shape.
const TRACE_LIST_PROJECTION: &str = "trace_id, span_name AS name, start_time, duration_nano, \
     status_code, total_cost, model_name, provider_name, service_name";

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl SqlArg {
    pub fn try_from_json(value: &serde_json::Value, field: &str) -> Result<SqlArg> {
        match value {
            serde_json::Value::String(s) => Ok(SqlArg::Str(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlArg::I64(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(SqlArg::U64(u))
                } else {
                    Ok(SqlArg::F64(n.as_f64().unwrap_or(0.0)))
                }
            }
            serde_json::Value::Bool(b) => Ok(SqlArg::Bool(*b)),
            _ => Err(Error::validation(format!(
                "unsupported filter value for '{field}'"
            ))),
        }
    }
}

/// SQL plus its positional arguments. The number of `?` placeholders in
/// `sql` always equals `args.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

#[derive(Clone)]
pub struct QueryCompiler {
    catalog: Arc<ViewCatalog>,
}

impl QueryCompiler {
    pub fn new(catalog: Arc<ViewCatalog>) -> Self {
        QueryCompiler { catalog }
    }

    /// Write-time lint: reject widgets whose type or query could never
    /// compile, so bad definitions never reach storage.
    pub fn validate_widget(&self, widget: &Widget) -> Result<()> {
        if widget.widget_type == WidgetType::Text {
            return Ok(());
        }
        let query = widget.query.as_ref().ok_or_else(|| {
            Error::validation(format!("widget '{}' requires a query", widget.title))
        })?;
        match widget.widget_type {
            WidgetType::Histogram => {
                let view = self.validate_aggregation(query)?;
                self.histogram_measure(view, query).map(|_| ())
            }
            WidgetType::TraceList => self.validate_trace_list(query).map(|_| ()),
            _ => self.validate_aggregation(query).map(|_| ()),
        }
    }

    /// The default shape: grouped aggregates over a view.
    pub fn compile_aggregation(
        &self,
        query: &WidgetQuery,
        project_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<CompiledQuery> {
        let view = self.validate_aggregation(query)?;
        let time_bucket = bucket::bucket_for_window(start, end);

        let mut select = Vec::new();
        let mut group_by = Vec::new();
        let mut time_dimension: Option<&str> = None;
        for dim_id in &query.dimensions {
            let dim = &view.dimensions[dim_id];
            let expr = if dim.bucketable {
                if time_dimension.is_none() {
                    time_dimension = Some(dim_id);
                }
                bucket::apply(time_bucket, &dim.sql)
            } else {
                dim.sql.clone()
            };
            select.push(format!("{expr} AS {dim_id}"));
            group_by.push(expr);
        }
        for measure_id in &query.measures {
            let m = &view.measures[measure_id];
            select.push(format!("{} AS {measure_id}", m.sql));
        }

        let mut sql = format!("SELECT {} FROM {}", select.join(", "), view.table);
        let mut args = Vec::new();

        let (prewhere, mut prewhere_args) = standard_prewhere(view, project_id, start, end);
        sql.push_str(" PREWHERE ");
        sql.push_str(&prewhere);
        args.append(&mut prewhere_args);

        append_where(&mut sql, &mut args, view, &query.filters)?;

        if !group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by.join(", "));
        }

        if let Some(order_by) = &query.order_by {
            let dir = query.order_dir.unwrap_or(OrderDir::Asc);
            sql.push_str(&format!(" ORDER BY {order_by} {}", dir.as_sql()));
        } else if let Some(time_id) = time_dimension {
            sql.push_str(&format!(" ORDER BY {time_id} ASC"));
        } else if let Some(first) = query.measures.first() {
            sql.push_str(&format!(" ORDER BY {first} DESC"));
        }

        sql.push_str(" LIMIT ?");
        args.push(SqlArg::U64(clamp_limit(query.limit, AGG_DEFAULT_LIMIT, AGG_MAX_LIMIT)));

        Ok(CompiledQuery { sql, args })
    }

    /// Non-aggregated list of root traces with a fixed projection.
    pub fn compile_trace_list(
        &self,
        query: &WidgetQuery,
        project_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<CompiledQuery> {
        let view = self.validate_trace_list(query)?;

        let mut sql = format!("SELECT {TRACE_LIST_PROJECTION} FROM {}", view.table);
        let mut args = Vec::new();

        // Root-span predicate leads so index skipping kicks in before the
        // per-project scan.
        let mut prewhere = Vec::new();
        if !view.base_filter.is_empty() {
            prewhere.push(view.base_filter.clone());
        }
        prewhere.push("project_id = ?".to_string());
        args.push(SqlArg::Str(project_id.to_string()));
        if let Some(s) = start {
            prewhere.push(format!("{} >= ?", view.time_column));
            args.push(SqlArg::DateTime(s));
        }
        if let Some(e) = end {
            prewhere.push(format!("{} <= ?", view.time_column));
            args.push(SqlArg::DateTime(e));
        }
        sql.push_str(" PREWHERE ");
        sql.push_str(&prewhere.join(" AND "));

        append_where(&mut sql, &mut args, view, &query.filters)?;

        match &query.order_by {
            Some(order_by) => {
                let column = self.trace_list_order_column(view, order_by)?;
                let dir = query.order_dir.unwrap_or(OrderDir::Asc);
                sql.push_str(&format!(" ORDER BY {column} {}", dir.as_sql()));
            }
            None => sql.push_str(&format!(" ORDER BY {} DESC", view.time_column)),
        }

        sql.push_str(" LIMIT ?");
        args.push(SqlArg::U64(clamp_limit(query.limit, LIST_DEFAULT_LIMIT, LIST_MAX_LIMIT)));

        Ok(CompiledQuery { sql, args })
    }

    /// Value-distribution shape: `histogram(N)(col)`, exactly one measure.
    pub fn compile_histogram(
        &self,
        query: &WidgetQuery,
        project_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        bucket_count: u64,
    ) -> Result<CompiledQuery> {
        let view = self.validate_aggregation(query)?;
        let measure = self.histogram_measure(view, query)?;
        let column = histogram_input(measure)?;
        let buckets = bucket_count.max(1);

        let mut sql = format!("SELECT histogram({buckets})({column}) AS buckets FROM {}", view.table);
        let mut args = Vec::new();

        let (prewhere, mut prewhere_args) = standard_prewhere(view, project_id, start, end);
        sql.push_str(" PREWHERE ");
        sql.push_str(&prewhere);
        args.append(&mut prewhere_args);

        append_where(&mut sql, &mut args, view, &query.filters)?;

        Ok(CompiledQuery { sql, args })
    }

    /// Distinct values of one dimension, for variable dropdowns.
    pub fn compile_variable_options(
        &self,
        view_name: &str,
        dimension: &str,
        project_id: &str,
        limit: Option<u64>,
    ) -> Result<CompiledQuery> {
        let view = self
            .catalog
            .get(view_name)
            .ok_or_else(|| Error::validation(format!("unknown view '{view_name}'")))?;
        let dim = view
            .dimensions
            .get(dimension)
            .ok_or_else(|| {
                Error::validation(format!("unknown dimension '{dimension}' for view '{view_name}'"))
            })?;

        let mut sql = format!(
            "SELECT DISTINCT {} AS value FROM {} PREWHERE project_id = ?",
            dim.sql, view.table
        );
        if !view.base_filter.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(&view.base_filter);
        }
        sql.push_str(&format!(
            " WHERE {col} IS NOT NULL AND {col} != '' ORDER BY value ASC LIMIT ?",
            col = dim.sql
        ));

        let args = vec![
            SqlArg::Str(project_id.to_string()),
            SqlArg::U64(clamp_limit(limit, VAR_DEFAULT_LIMIT, VAR_MAX_LIMIT)),
        ];
        Ok(CompiledQuery { sql, args })
    }

    // ── Validation (rules applied in order; first failure reported) ──

    fn validate_aggregation(&self, query: &WidgetQuery) -> Result<&ViewDefinition> {
        let view = self
            .catalog
            .get(&query.view)
            .ok_or_else(|| Error::validation(format!("unknown view '{}'", query.view)))?;

        if query.measures.is_empty() {
            return Err(Error::validation("at least one measure is required"));
        }
        for measure in &query.measures {
            if !view.measures.contains_key(measure) {
                return Err(Error::validation(format!(
                    "unknown measure '{measure}' for view '{}'",
                    view.name
                )));
            }
        }
        for dim in &query.dimensions {
            if !view.dimensions.contains_key(dim) {
                return Err(Error::validation(format!(
                    "unknown dimension '{dim}' for view '{}'",
                    view.name
                )));
            }
        }
        validate_filter_fields(view, &query.filters)?;
        if let Some(order_by) = &query.order_by
            && !view.measures.contains_key(order_by)
            && !view.dimensions.contains_key(order_by)
        {
            return Err(Error::validation(format!(
                "order_by '{order_by}' is not a measure or dimension of view '{}'",
                view.name
            )));
        }
        Ok(view)
    }

    fn validate_trace_list(&self, query: &WidgetQuery) -> Result<&ViewDefinition> {
        if self.catalog.get(&query.view).is_none() {
            return Err(Error::validation(format!("unknown view '{}'", query.view)));
        }
        // The projection is fixed to root traces, so the shape always
        // compiles against the traces view.
        let view = self
            .catalog
            .get("traces")
            .ok_or_else(|| Error::Internal(anyhow!("traces view missing from catalog")))?;
        validate_filter_fields(view, &query.filters)?;
        if let Some(order_by) = &query.order_by {
            self.trace_list_order_column(view, order_by)?;
        }
        Ok(view)
    }

    fn trace_list_order_column(&self, view: &ViewDefinition, order_by: &str) -> Result<String> {
        if let Some(dim) = view.dimensions.get(order_by) {
            return Ok(dim.sql.clone());
        }
        if let Some(measure) = view.measures.get(order_by) {
            return measure.base_column.clone().ok_or_else(|| {
                Error::validation(format!(
                    "measure '{order_by}' is aggregate-only and cannot order a trace list"
                ))
            });
        }
        Err(Error::validation(format!(
            "order_by '{order_by}' is not a measure or dimension of view '{}'",
            view.name
        )))
    }

    fn histogram_measure<'a>(
        &self,
        view: &'a ViewDefinition,
        query: &WidgetQuery,
    ) -> Result<&'a MeasureConfig> {
        if query.measures.len() != 1 {
            return Err(Error::validation(
                "histogram widgets require exactly one measure",
            ));
        }
        Ok(&view.measures[&query.measures[0]])
    }
}

/// Column expression fed to `histogram()`. Prefers the measure's explicit
/// `histogram_column`; falls back to the legacy substring match on the
/// measure id for catalogs that predate the field.
fn histogram_input(measure: &MeasureConfig) -> Result<String> {
    if let Some(column) = &measure.histogram_column
        && !column.is_empty()
    {
        return Ok(column.clone());
    }
    let id = measure.id.as_str();
    if id.contains("duration") {
        Ok("duration_nano".to_string())
    } else if id.contains("cost") {
        Ok("total_cost".to_string())
    } else if id.contains("token") {
        Ok("input_tokens + output_tokens".to_string())
    } else {
        Err(Error::validation(format!(
            "measure '{id}' has no histogram column"
        )))
    }
}

fn validate_filter_fields(view: &ViewDefinition, filters: &[QueryFilter]) -> Result<()> {
    for f in filters {
        if !view.dimensions.contains_key(&f.field)
            && !view.measures.contains_key(&f.field)
            && !is_safe_identifier(&f.field)
        {
            return Err(Error::validation(format!("invalid filter field '{}'", f.field)));
        }
    }
    Ok(())
}

/// PREWHERE for aggregation-family shapes: project scope, time bounds, then
/// the view's base predicate. Argument order mirrors predicate order.
fn standard_prewhere(
    view: &ViewDefinition,
    project_id: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> (String, Vec<SqlArg>) {
    let mut parts = vec!["project_id = ?".to_string()];
    let mut args = vec![SqlArg::Str(project_id.to_string())];
    if let Some(s) = start {
        parts.push(format!("{} >= ?", view.time_column));
        args.push(SqlArg::DateTime(s));
    }
    if let Some(e) = end {
        parts.push(format!("{} <= ?", view.time_column));
        args.push(SqlArg::DateTime(e));
    }
    if !view.base_filter.is_empty() {
        parts.push(view.base_filter.clone());
    }
    (parts.join(" AND "), args)
}

fn append_where(
    sql: &mut String,
    args: &mut Vec<SqlArg>,
    view: &ViewDefinition,
    filters: &[QueryFilter],
) -> Result<()> {
    if filters.is_empty() {
        return Ok(());
    }
    let mut conditions = Vec::with_capacity(filters.len());
    for f in filters {
        let (condition, mut filter_args) = build_filter_condition(view, f)?;
        conditions.push(condition);
        args.append(&mut filter_args);
    }
    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
    Ok(())
}

fn clamp_limit(limit: Option<u64>, default: u64, max: u64) -> u64 {
    limit.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(Arc::new(ViewCatalog::default()))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn filter(field: &str, operator: crate::models::query::FilterOp, value: serde_json::Value) -> QueryFilter {
        QueryFilter { field: field.to_string(), operator, value }
    }

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn aggregation_with_time_series() {
        // Six-hour window: five-minute buckets.
        let end = t0();
        let start = end - Duration::hours(6);
        let query = WidgetQuery {
            view: "traces".into(),
            measures: vec!["count".into(), "error_rate".into()],
            dimensions: vec!["time".into(), "model_name".into()],
            filters: vec![filter("model_name", crate::models::query::FilterOp::Eq, json!("gpt-4"))],
            limit: Some(500),
            ..Default::default()
        };
        let compiled = compiler()
            .compile_aggregation(&query, "proj-1", Some(start), Some(end))
            .unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT toStartOfFiveMinutes(start_time) AS time, model_name AS model_name, \
             count() AS count, \
             if(count() = 0, null, countIf(status_code = 2) * 100.0 / count()) AS error_rate \
             FROM otel_traces \
             PREWHERE project_id = ? AND start_time >= ? AND start_time <= ? \
             AND parent_span_id IS NULL AND deleted_at IS NULL \
             WHERE model_name = ? \
             GROUP BY toStartOfFiveMinutes(start_time), model_name \
             ORDER BY time ASC LIMIT ?"
        );
        assert_eq!(
            compiled.args,
            vec![
                SqlArg::Str("proj-1".into()),
                SqlArg::DateTime(start),
                SqlArg::DateTime(end),
                SqlArg::Str("gpt-4".into()),
                SqlArg::U64(500),
            ]
        );
        assert_eq!(placeholders(&compiled.sql), compiled.args.len());
    }

    #[test]
    fn trace_list_defaults() {
        let end = t0();
        let start = end - Duration::hours(1);
        let query = WidgetQuery {
            view: "traces".into(),
            filters: vec![filter("status_code", crate::models::query::FilterOp::Eq, json!(2))],
            ..Default::default()
        };
        let compiled = compiler()
            .compile_trace_list(&query, "proj-1", Some(start), Some(end))
            .unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT trace_id, span_name AS name, start_time, duration_nano, status_code, \
             total_cost, model_name, provider_name, service_name \
             FROM otel_traces \
             PREWHERE parent_span_id IS NULL AND deleted_at IS NULL AND project_id = ? \
             AND start_time >= ? AND start_time <= ? \
             WHERE status_code = ? \
             ORDER BY start_time DESC LIMIT ?"
        );
        assert_eq!(
            compiled.args,
            vec![
                SqlArg::Str("proj-1".into()),
                SqlArg::DateTime(start),
                SqlArg::DateTime(end),
                SqlArg::I64(2),
                SqlArg::U64(50),
            ]
        );
    }

    #[test]
    fn histogram_uses_legacy_fallback_column() {
        let end = t0();
        let start = end - Duration::hours(6);
        let query = WidgetQuery {
            view: "spans".into(),
            measures: vec!["avg_cost".into()],
            ..Default::default()
        };
        let compiled = compiler()
            .compile_histogram(&query, "proj-1", Some(start), Some(end), 30)
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT histogram(30)(total_cost) AS buckets FROM otel_traces \
             PREWHERE project_id = ? AND start_time >= ? AND start_time <= ? \
             AND deleted_at IS NULL"
        );
        assert_eq!(compiled.args.len(), 3);
        assert_eq!(placeholders(&compiled.sql), compiled.args.len());
    }

    #[test]
    fn histogram_prefers_explicit_column() {
        let query = WidgetQuery {
            view: "traces".into(),
            measures: vec!["p95_duration".into()],
            ..Default::default()
        };
        let compiled = compiler()
            .compile_histogram(&query, "p", None, None, 20)
            .unwrap();
        assert!(compiled.sql.starts_with("SELECT histogram(20)(duration_nano) AS buckets"));
    }

    #[test]
    fn histogram_rejects_measure_counts() {
        let c = compiler();
        for measures in [vec![], vec!["count".to_string(), "avg_cost".to_string()]] {
            let query = WidgetQuery { view: "traces".into(), measures, ..Default::default() };
            let err = c.compile_histogram(&query, "p", None, None, 20).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
    }

    #[test]
    fn histogram_rejects_measure_without_input_column() {
        // `count` has no histogram column and no substring fallback.
        let query = WidgetQuery {
            view: "traces".into(),
            measures: vec!["count".into()],
            ..Default::default()
        };
        let err = compiler().compile_histogram(&query, "p", None, None, 20).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Token measures resolve through the fallback's token sum.
        let query = WidgetQuery {
            view: "traces".into(),
            measures: vec!["total_tokens".into()],
            ..Default::default()
        };
        let compiled = compiler().compile_histogram(&query, "p", None, None, 20).unwrap();
        assert!(
            compiled
                .sql
                .starts_with("SELECT histogram(20)(input_tokens + output_tokens) AS buckets")
        );
    }

    #[test]
    fn variable_options_shape() {
        let compiled = compiler()
            .compile_variable_options("traces", "model_name", "proj-1", None)
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT DISTINCT model_name AS value FROM otel_traces \
             PREWHERE project_id = ? AND parent_span_id IS NULL AND deleted_at IS NULL \
             WHERE model_name IS NOT NULL AND model_name != '' \
             ORDER BY value ASC LIMIT ?"
        );
        assert_eq!(
            compiled.args,
            vec![SqlArg::Str("proj-1".into()), SqlArg::U64(100)]
        );
    }

    #[test]
    fn variable_options_without_base_filter() {
        let compiled = compiler()
            .compile_variable_options("scores", "name", "proj-1", Some(25))
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT DISTINCT name AS value FROM scores PREWHERE project_id = ? \
             WHERE name IS NOT NULL AND name != '' ORDER BY value ASC LIMIT ?"
        );
        assert_eq!(compiled.args[1], SqlArg::U64(25));
    }

    #[test]
    fn placeholder_count_always_matches_args() {
        let end = t0();
        let start = end - Duration::hours(3);
        let c = compiler();
        let queries = [
            WidgetQuery {
                view: "traces".into(),
                measures: vec!["count".into()],
                ..Default::default()
            },
            WidgetQuery {
                view: "traces".into(),
                measures: vec!["total_cost".into(), "avg_duration".into()],
                dimensions: vec!["time".into(), "provider_name".into()],
                filters: vec![
                    filter("model_name", crate::models::query::FilterOp::In, json!(["a", "b", "c"])),
                    filter("duration_nano", crate::models::query::FilterOp::Gte, json!(5)),
                    filter("span_name", crate::models::query::FilterOp::Contains, json!("chat")),
                ],
                limit: Some(10),
                ..Default::default()
            },
            WidgetQuery {
                view: "scores".into(),
                measures: vec!["avg_score".into()],
                dimensions: vec!["name".into()],
                ..Default::default()
            },
        ];
        for (i, q) in queries.iter().enumerate() {
            let compiled = c.compile_aggregation(q, "p", Some(start), Some(end)).unwrap();
            assert_eq!(placeholders(&compiled.sql), compiled.args.len(), "query {i}");
            let compiled = c.compile_aggregation(q, "p", None, None).unwrap();
            assert_eq!(placeholders(&compiled.sql), compiled.args.len(), "query {i} unbounded");
        }
    }

    #[test]
    fn hostile_values_never_reach_sql_text() {
        let hostile = "x'; DROP TABLE otel_traces; --";
        let query = WidgetQuery {
            view: "traces".into(),
            measures: vec!["count".into()],
            filters: vec![filter("model_name", crate::models::query::FilterOp::Eq, json!(hostile))],
            ..Default::default()
        };
        let compiled = compiler().compile_aggregation(&query, "p", None, None).unwrap();
        assert!(!compiled.sql.contains("DROP"));
        assert!(compiled.args.contains(&SqlArg::Str(hostile.into())));
    }

    #[test]
    fn validation_rejects_unknown_ids() {
        let c = compiler();
        let base = WidgetQuery {
            view: "traces".into(),
            measures: vec!["count".into()],
            ..Default::default()
        };

        let q = WidgetQuery { view: "metrics".into(), ..base.clone() };
        assert!(matches!(c.compile_aggregation(&q, "p", None, None), Err(Error::Validation(_))));

        let q = WidgetQuery { measures: vec![], ..base.clone() };
        assert!(matches!(c.compile_aggregation(&q, "p", None, None), Err(Error::Validation(_))));

        let q = WidgetQuery { measures: vec!["p42_duration".into()], ..base.clone() };
        assert!(matches!(c.compile_aggregation(&q, "p", None, None), Err(Error::Validation(_))));

        let q = WidgetQuery { dimensions: vec!["region".into()], ..base.clone() };
        assert!(matches!(c.compile_aggregation(&q, "p", None, None), Err(Error::Validation(_))));

        let q = WidgetQuery { order_by: Some("rowid".into()), ..base.clone() };
        assert!(matches!(c.compile_aggregation(&q, "p", None, None), Err(Error::Validation(_))));
    }

    #[test]
    fn explicit_order_by_overrides_time_default() {
        let query = WidgetQuery {
            view: "traces".into(),
            measures: vec!["count".into()],
            dimensions: vec!["time".into()],
            order_by: Some("count".into()),
            order_dir: Some(OrderDir::Desc),
            ..Default::default()
        };
        let compiled = compiler().compile_aggregation(&query, "p", None, None).unwrap();
        assert!(compiled.sql.contains("ORDER BY count DESC"));
        assert!(!compiled.sql.contains("ORDER BY time ASC"));
    }

    #[test]
    fn time_dimension_defaults_order_to_time_asc() {
        let query = WidgetQuery {
            view: "traces".into(),
            measures: vec!["count".into()],
            dimensions: vec!["model_name".into(), "time".into()],
            ..Default::default()
        };
        let compiled = compiler().compile_aggregation(&query, "p", None, None).unwrap();
        assert!(compiled.sql.contains("ORDER BY time ASC"));
    }

    #[test]
    fn no_dimensions_defaults_order_to_first_measure() {
        let query = WidgetQuery {
            view: "traces".into(),
            measures: vec!["total_cost".into(), "count".into()],
            ..Default::default()
        };
        let compiled = compiler().compile_aggregation(&query, "p", None, None).unwrap();
        assert!(compiled.sql.contains("ORDER BY total_cost DESC"));
        assert!(!compiled.sql.contains("GROUP BY"));
    }

    #[test]
    fn aggregation_limit_clamps() {
        let c = compiler();
        let base = WidgetQuery {
            view: "traces".into(),
            measures: vec!["count".into()],
            ..Default::default()
        };
        let cases = [
            (None, 1_000u64),
            (Some(0), 1),
            (Some(200), 200),
            (Some(50_000), 10_000),
        ];
        for (limit, want) in cases {
            let q = WidgetQuery { limit, ..base.clone() };
            let compiled = c.compile_aggregation(&q, "p", None, None).unwrap();
            assert_eq!(*compiled.args.last().unwrap(), SqlArg::U64(want), "{limit:?}");
        }
    }

    #[test]
    fn trace_list_limit_clamps_to_one_thousand() {
        let c = compiler();
        let q = WidgetQuery { view: "traces".into(), limit: Some(5_000), ..Default::default() };
        let compiled = c.compile_trace_list(&q, "p", None, None).unwrap();
        assert_eq!(*compiled.args.last().unwrap(), SqlArg::U64(1_000));
    }

    #[test]
    fn trace_list_order_by_aggregate_only_measure_fails() {
        let c = compiler();
        let q = WidgetQuery {
            view: "traces".into(),
            order_by: Some("error_rate".into()),
            ..Default::default()
        };
        let err = c.compile_trace_list(&q, "p", None, None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // A measure with a base column orders by that column.
        let q = WidgetQuery {
            view: "traces".into(),
            order_by: Some("avg_duration".into()),
            order_dir: Some(OrderDir::Desc),
            ..Default::default()
        };
        let compiled = c.compile_trace_list(&q, "p", None, None).unwrap();
        assert!(compiled.sql.contains("ORDER BY duration_nano DESC"));
    }

    #[test]
    fn validate_widget_lints_by_type() {
        let c = compiler();
        let text = Widget {
            id: "w1".into(),
            widget_type: WidgetType::Text,
            title: "notes".into(),
            description: String::new(),
            query: None,
            config: Default::default(),
        };
        assert!(c.validate_widget(&text).is_ok());

        let missing_query = Widget { widget_type: WidgetType::Stat, ..text.clone() };
        assert!(matches!(c.validate_widget(&missing_query), Err(Error::Validation(_))));

        let histogram = Widget {
            widget_type: WidgetType::Histogram,
            query: Some(WidgetQuery {
                view: "traces".into(),
                measures: vec!["count".into(), "avg_cost".into()],
                ..Default::default()
            }),
            ..text.clone()
        };
        assert!(matches!(c.validate_widget(&histogram), Err(Error::Validation(_))));

        let good = Widget {
            widget_type: WidgetType::TimeSeries,
            query: Some(WidgetQuery {
                view: "traces".into(),
                measures: vec!["count".into()],
                dimensions: vec!["time".into()],
                ..Default::default()
            }),
            ..text
        };
        assert!(c.validate_widget(&good).is_ok());
    }
}
