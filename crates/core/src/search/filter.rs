//! Metadata filtering engine.
//!
//! Evaluates [`FilterClause`] predicates against document metadata.
//! `must` conditions are AND-ed and `must_not` conditions are AND-NOT-ed.
//! A condition on a missing field never matches.

use crate::document::MetadataValue;
use crate::filter_types::{FilterClause, FilterCondition, FilterOperator};
use std::collections::HashMap;

/// Check if a document's metadata matches the given filter clause.
pub fn matches_filter(metadata: &HashMap<String, MetadataValue>, filter: &FilterClause) -> bool {
    for cond in &filter.must {
        if !evaluate_condition(metadata, cond) {
            return false;
        }
    }
    for cond in &filter.must_not {
        if evaluate_condition(metadata, cond) {
            return false;
        }
    }
    true
}

fn evaluate_condition(metadata: &HashMap<String, MetadataValue>, cond: &FilterCondition) -> bool {
    let field_value = match metadata.get(&cond.field) {
        Some(v) => v,
        None => return false,
    };

    match cond.op {
        FilterOperator::Eq => cond
            .value
            .as_ref()
            .is_some_and(|val| matches_value(field_value, val)),
        FilterOperator::Ne => cond
            .value
            .as_ref()
            .is_some_and(|val| !matches_value(field_value, val)),
        FilterOperator::In => cond
            .values
            .as_ref()
            .is_some_and(|vals| vals.iter().any(|v| matches_value(field_value, v))),
    }
}

/// Equality, extended to membership when the stored value is a list and the
/// probe is a scalar.
fn matches_value(meta: &MetadataValue, json: &serde_json::Value) -> bool {
    match (meta, json) {
        (MetadataValue::List(items), serde_json::Value::Array(_)) => json_eq(meta, json)
            || items.iter().any(|item| json_eq(item, json)),
        (MetadataValue::List(items), _) => items.iter().any(|item| json_eq(item, json)),
        _ => json_eq(meta, json),
    }
}

/// Compare a MetadataValue with a serde_json::Value for equality.
fn json_eq(meta: &MetadataValue, json: &serde_json::Value) -> bool {
    match (meta, json) {
        (MetadataValue::String(s), serde_json::Value::String(js)) => s == js,
        (MetadataValue::Boolean(b), serde_json::Value::Bool(jb)) => b == jb,
        (MetadataValue::Integer(i), serde_json::Value::Number(n)) => {
            n.as_i64().is_some_and(|ni| *i == ni)
                || n.as_f64()
                    .is_some_and(|nf| (*i as f64 - nf).abs() < f64::EPSILON)
        }
        (MetadataValue::Float(f), serde_json::Value::Number(n)) => {
            n.as_f64().is_some_and(|nf| (*f - nf).abs() < f64::EPSILON)
        }
        (MetadataValue::List(items), serde_json::Value::Array(js)) => {
            items.len() == js.len() && items.iter().zip(js).all(|(m, j)| json_eq(m, j))
        }
        _ => false,
    }
}
