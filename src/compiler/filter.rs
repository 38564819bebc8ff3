use std::sync::LazyLock;

use regex::Regex;

use super::SqlArg;
use crate::catalog::ViewDefinition;
use crate::error::{Error, Result};
use crate::models::query::{FilterOp, QueryFilter};

/// Identifier allow-list. Belt-and-braces: normal paths resolve the field
/// through the catalog, so this only ever gates fields the catalog does not
/// know.
static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.]*$").expect("field regex"));

const MAX_FIELD_LEN: usize = 200;

pub fn is_safe_identifier(field: &str) -> bool {
    field.len() <= MAX_FIELD_LEN && FIELD_RE.is_match(field)
}

/// Resolve a filter's target expression: catalog dimension SQL, then catalog
/// measure SQL, then (for allow-listed identifiers only) the raw field.
pub fn resolve_filter_target(view: &ViewDefinition, field: &str) -> Result<String> {
    if let Some(dim) = view.dimensions.get(field) {
        return Ok(dim.sql.clone());
    }
    if let Some(measure) = view.measures.get(field) {
        return Ok(measure.sql.clone());
    }
    if is_safe_identifier(field) {
        return Ok(field.to_string());
    }
    Err(Error::validation(format!("invalid filter field '{field}'")))
}

/// Lower one filter to a predicate with bound arguments.
pub fn build_filter_condition(
    view: &ViewDefinition,
    filter: &QueryFilter,
) -> Result<(String, Vec<SqlArg>)> {
    let target = resolve_filter_target(view, &filter.field)?;

    let condition = match filter.operator {
        FilterOp::Eq => (format!("{target} = ?"), vec![scalar_arg(filter)?]),
        FilterOp::Neq => (format!("{target} != ?"), vec![scalar_arg(filter)?]),
        FilterOp::Gt => (format!("{target} > ?"), vec![scalar_arg(filter)?]),
        FilterOp::Lt => (format!("{target} < ?"), vec![scalar_arg(filter)?]),
        FilterOp::Gte => (format!("{target} >= ?"), vec![scalar_arg(filter)?]),
        FilterOp::Lte => (format!("{target} <= ?"), vec![scalar_arg(filter)?]),
        FilterOp::Contains => {
            let needle = match &filter.value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => {
                    return Err(Error::validation(format!(
                        "'contains' filter on '{}' requires a string value",
                        filter.field
                    )));
                }
            };
            (format!("{target} LIKE ?"), vec![SqlArg::Str(format!("%{needle}%"))])
        }
        FilterOp::In => {
            let serde_json::Value::Array(items) = &filter.value else {
                return Err(Error::validation(format!(
                    "'in' filter on '{}' requires an array value",
                    filter.field
                )));
            };
            if items.is_empty() {
                return Err(Error::validation(format!(
                    "'in' filter on '{}' requires a non-empty array",
                    filter.field
                )));
            }
            let args = items
                .iter()
                .map(|v| SqlArg::try_from_json(v, &filter.field))
                .collect::<Result<Vec<_>>>()?;
            let placeholders = vec!["?"; items.len()].join(", ");
            (format!("{target} IN ({placeholders})"), args)
        }
    };

    Ok(condition)
}

fn scalar_arg(filter: &QueryFilter) -> Result<SqlArg> {
    SqlArg::try_from_json(&filter.value, &filter.field)
}
