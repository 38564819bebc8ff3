use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use serde_json::{Value, json};

use crate::compiler::{DEFAULT_HISTOGRAM_BUCKETS, QueryCompiler};
use crate::error::{Error, Result};
use crate::models::dashboard::{Widget, WidgetType};
use crate::models::query::{
    DashboardQueryResults, QueryExecutionRequest, QueryMetadata, TimeRange, WidgetQuery,
    WidgetResult,
};
use crate::repository::{DashboardRepository, WidgetQueryRepository};

/// Default cap on widget executions in flight for one dashboard call.
pub const DEFAULT_MAX_CONCURRENT_WIDGETS: usize = 10;

/// Fans a dashboard's widget queries out in parallel under a bounded
/// concurrency budget and assembles the per-widget results. One widget's
/// failure never fails the dashboard call; it is captured on that widget's
/// result instead.
pub struct QueryEngine {
    dashboards: Arc<dyn DashboardRepository>,
    queries: Arc<dyn WidgetQueryRepository>,
    compiler: QueryCompiler,
    max_concurrent: usize,
}

impl QueryEngine {
    pub fn new(
        dashboards: Arc<dyn DashboardRepository>,
        queries: Arc<dyn WidgetQueryRepository>,
        compiler: QueryCompiler,
        max_concurrent: usize,
    ) -> Self {
        Self { dashboards, queries, compiler, max_concurrent: max_concurrent.max(1) }
    }

    pub async fn execute_dashboard(
        &self,
        project_id: &str,
        dashboard_id: &str,
        req: &QueryExecutionRequest,
    ) -> Result<DashboardQueryResults> {
        let dashboard = self.dashboards.get_by_id(dashboard_id)?;
        if dashboard.project_id != project_id {
            return Err(Error::not_found("dashboard"));
        }

        let widgets: Vec<Widget> = match &req.widget_id {
            Some(widget_id) => vec![
                dashboard
                    .config
                    .widgets
                    .iter()
                    .find(|w| &w.id == widget_id)
                    .cloned()
                    .ok_or_else(|| Error::not_found("widget"))?,
            ],
            None => dashboard.config.widgets.clone(),
        };

        let request_range = req.time_range.clone();
        let effective = request_range.clone().or_else(|| dashboard.config.time_range.clone());
        let (start, end) = resolve_time_range(effective.as_ref());
        let request_has_range = request_range.is_some();
        let executed_at = Utc::now();

        let results: HashMap<String, WidgetResult> = stream::iter(
            widgets
                .into_iter()
                .map(|w| self.run_widget(w, project_id, start, end, request_has_range)),
        )
        .buffer_unordered(self.max_concurrent)
        .map(|result| (result.widget_id.clone(), result))
        .collect()
        .await;

        Ok(DashboardQueryResults { dashboard_id: dashboard.id, executed_at, results })
    }

    /// Single-widget execution: unlike the dashboard call, any compile or
    /// execution failure fails the call.
    pub async fn execute_widget(
        &self,
        project_id: &str,
        dashboard_id: &str,
        widget_id: &str,
        req: &QueryExecutionRequest,
    ) -> Result<WidgetResult> {
        let dashboard = self.dashboards.get_by_id(dashboard_id)?;
        if dashboard.project_id != project_id {
            return Err(Error::not_found("dashboard"));
        }
        let widget = dashboard
            .config
            .widgets
            .iter()
            .find(|w| w.id == widget_id)
            .cloned()
            .ok_or_else(|| Error::not_found("widget"))?;

        let effective = req.time_range.clone().or_else(|| dashboard.config.time_range.clone());
        let (start, end) = resolve_time_range(effective.as_ref());

        let executed_at = Utc::now();
        let started = Instant::now();
        let (data, row_count) = self
            .widget_data(&widget, project_id, start, end, req.time_range.is_some())
            .await?;
        Ok(WidgetResult {
            widget_id: widget.id,
            data: Some(data),
            error: None,
            metadata: QueryMetadata {
                executed_at,
                duration_ms: started.elapsed().as_millis() as u64,
                row_count,
                cached: false,
                cache_expires_at: None,
            },
        })
    }

    async fn run_widget(
        &self,
        widget: Widget,
        project_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        request_has_range: bool,
    ) -> WidgetResult {
        let executed_at = Utc::now();
        let started = Instant::now();
        let outcome = self
            .widget_data(&widget, project_id, start, end, request_has_range)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((data, row_count)) => WidgetResult {
                widget_id: widget.id,
                data: Some(data),
                error: None,
                metadata: QueryMetadata {
                    executed_at,
                    duration_ms,
                    row_count,
                    cached: false,
                    cache_expires_at: None,
                },
            },
            Err(e) => {
                tracing::warn!("widget '{}' failed: {e}", widget.id);
                WidgetResult {
                    widget_id: widget.id,
                    data: None,
                    error: Some(e.to_string()),
                    metadata: QueryMetadata {
                        executed_at,
                        duration_ms,
                        row_count: 0,
                        cached: false,
                        cache_expires_at: None,
                    },
                }
            }
        }
    }

    async fn widget_data(
        &self,
        widget: &Widget,
        project_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        request_has_range: bool,
    ) -> Result<(Value, usize)> {
        if widget.widget_type == WidgetType::Text {
            let content = widget
                .config
                .get("content")
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            return Ok((json!([{ "content": content }]), 1));
        }

        let query = require_query(widget)?;
        // A widget-level range wins over the dashboard default but not over
        // an explicit per-request range.
        let (start, end) = match &query.time_range {
            Some(tr) if !request_has_range => resolve_time_range(Some(tr)),
            _ => (start, end),
        };

        match widget.widget_type {
            WidgetType::TraceList => {
                let compiled =
                    self.compiler.compile_trace_list(query, project_id, Some(start), Some(end))?;
                let rows = self.queries.execute_trace_list(&compiled.sql, &compiled.args).await?;
                let row_count = rows.len();
                Ok((serde_json::to_value(rows)?, row_count))
            }
            WidgetType::Histogram => {
                let bucket_count = widget
                    .config
                    .get("bucket_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_HISTOGRAM_BUCKETS);
                let compiled = self.compiler.compile_histogram(
                    query,
                    project_id,
                    Some(start),
                    Some(end),
                    bucket_count,
                )?;
                let data = self.queries.execute_histogram(&compiled.sql, &compiled.args).await?;
                let row_count = data.buckets.len();
                Ok((serde_json::to_value(data)?, row_count))
            }
            _ => {
                let compiled =
                    self.compiler.compile_aggregation(query, project_id, Some(start), Some(end))?;
                let rows = self.queries.execute_query(&compiled.sql, &compiled.args).await?;
                let row_count = rows.len();
                Ok((Value::Array(rows.into_iter().map(Value::Object).collect()), row_count))
            }
        }
    }
}

fn require_query(widget: &Widget) -> Result<&WidgetQuery> {
    widget
        .query
        .as_ref()
        .ok_or_else(|| Error::validation(format!("widget '{}' has no query", widget.id)))
}

/// Resolve a time range to present bounds. Absent or partial ranges fall
/// back to the last 24 hours; unknown relative windows do the same.
pub fn resolve_time_range(tr: Option<&TimeRange>) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    if let Some(tr) = tr {
        if let (Some(from), Some(to)) = (tr.from, tr.to) {
            return (from, to);
        }
        if let Some(relative) = tr.relative.as_deref() {
            let window = relative_window(relative).unwrap_or_else(|| {
                tracing::debug!("unknown relative window '{relative}', defaulting to 24h");
                Duration::hours(24)
            });
            return (now - window, now);
        }
    }
    (now - Duration::hours(24), now)
}

fn relative_window(relative: &str) -> Option<Duration> {
    match relative {
        "15m" => Some(Duration::minutes(15)),
        "30m" => Some(Duration::minutes(30)),
        "1h" => Some(Duration::hours(1)),
        "3h" => Some(Duration::hours(3)),
        "6h" => Some(Duration::hours(6)),
        "12h" => Some(Duration::hours(12)),
        "24h" => Some(Duration::hours(24)),
        "7d" => Some(Duration::days(7)),
        "14d" => Some(Duration::days(14)),
        "30d" => Some(Duration::days(30)),
        _ => None,
    }
}
