use std::sync::Arc;

use serde_json::Value;

use crate::compiler::QueryCompiler;
use crate::error::Result;
use crate::repository::WidgetQueryRepository;

/// Produces distinct-value option lists for dashboard variable dropdowns.
pub struct VariableService {
    queries: Arc<dyn WidgetQueryRepository>,
    compiler: QueryCompiler,
}

impl VariableService {
    pub fn new(queries: Arc<dyn WidgetQueryRepository>, compiler: QueryCompiler) -> Self {
        Self { queries, compiler }
    }

    /// Options are string-valued only: numeric cells get standard decimal
    /// rendering, nulls and empty strings are dropped.
    pub async fn get_variable_options(
        &self,
        project_id: &str,
        view: &str,
        dimension: &str,
        limit: Option<u64>,
    ) -> Result<Vec<String>> {
        let compiled = self.compiler.compile_variable_options(view, dimension, project_id, limit)?;
        let rows = self.queries.execute_query(&compiled.sql, &compiled.args).await?;

        let mut options = Vec::with_capacity(rows.len());
        for row in rows {
            match row.get("value") {
                Some(Value::String(s)) if !s.is_empty() => options.push(s.clone()),
                Some(Value::Number(n)) => options.push(n.to_string()),
                _ => {}
            }
        }
        Ok(options)
    }
}
