use async_trait::async_trait;
use clickhouse::Client;
use serde_json::{Map, Value};

use crate::compiler::SqlArg;
use crate::error::Result;
use crate::models::query::{HistogramData, HistogramRow, TraceListItem};
use crate::repository::WidgetQueryRepository;

/// ClickHouse-backed executor for compiled widget SQL.
///
/// Typed shapes (trace list, histogram) go through the row API; the
/// free-shape aggregation path fetches JSONEachRow bytes because its SELECT
/// list is only known at runtime.
#[derive(Clone)]
pub struct ChQueryRepository {
    client: Client,
}

impl ChQueryRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn bound_query(&self, sql: &str, args: &[SqlArg]) -> clickhouse::query::Query {
        let mut query = self.client.query(sql);
        for arg in args {
            query = match arg {
                SqlArg::Str(s) => query.bind(s.as_str()),
                SqlArg::I64(i) => query.bind(*i),
                SqlArg::U64(u) => query.bind(*u),
                SqlArg::F64(f) => query.bind(*f),
                SqlArg::Bool(b) => query.bind(*b),
                // DateTime64 columns compare fine against a formatted UTC
                // string literal.
                SqlArg::DateTime(dt) => query.bind(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            };
        }
        query
    }
}

#[async_trait]
impl WidgetQueryRepository for ChQueryRepository {
    async fn execute_query(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<Map<String, Value>>> {
        let bytes = self
            .bound_query(sql, args)
            .fetch_bytes("JSONEachRow")?
            .collect()
            .await?;

        let mut rows = Vec::new();
        for line in bytes.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            rows.push(serde_json::from_slice::<Map<String, Value>>(line)?);
        }
        Ok(rows)
    }

    async fn execute_trace_list(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<TraceListItem>> {
        let rows = self.bound_query(sql, args).fetch_all::<TraceListItem>().await?;
        Ok(rows)
    }

    async fn execute_histogram(&self, sql: &str, args: &[SqlArg]) -> Result<HistogramData> {
        let rows = self.bound_query(sql, args).fetch_all::<HistogramRow>().await?;
        Ok(rows.into_iter().next().map(HistogramData::from).unwrap_or_default())
    }
}
