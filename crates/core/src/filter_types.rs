//! Metadata filter types for collection predicates.
//!
//! Defines the filter clause structure used by `delete_by_filter`,
//! `filter_query`, and filtered batch queries. Predicates are plain
//! equality and membership tests over metadata keys.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Metadata filter clause with `must` (AND) and `must_not` (AND-NOT) conditions.
///
/// An empty clause matches every document.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    #[serde(default)]
    pub must: Vec<FilterCondition>,
    #[serde(default)]
    pub must_not: Vec<FilterCondition>,
}

/// A single filter condition on a metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOperator,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub values: Option<Vec<serde_json::Value>>,
}

/// Comparison operator for filter conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Field equals the value, or (for list fields) contains it.
    Eq,
    /// Field is present and not equal to the value.
    Ne,
    /// Field equals any of `values`.
    In,
}

impl FilterClause {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    /// Require `field == value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.must.push(FilterCondition {
            field: field.into(),
            op: FilterOperator::Eq,
            value: Some(value),
            values: None,
        });
        self
    }

    /// Require `field` to equal one of `values`.
    pub fn where_in(mut self, field: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.must.push(FilterCondition {
            field: field.into(),
            op: FilterOperator::In,
            value: None,
            values: Some(values),
        });
        self
    }

    /// Exclude documents where `field == value`.
    pub fn where_not_eq(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.must_not.push(FilterCondition {
            field: field.into(),
            op: FilterOperator::Eq,
            value: Some(value),
            values: None,
        });
        self
    }

    /// Parse a filter from JSON.
    ///
    /// Accepts either the full `{"must": [...], "must_not": [...]}` form or a
    /// shorthand object `{"field": value, ...}` where array values become
    /// membership tests and scalars become equality tests.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            Error::Validation("filter must be a JSON object".to_string())
        })?;
        let structured = !obj.is_empty()
            && obj.keys().all(|k| k == "must" || k == "must_not")
            && obj.values().all(|v| v.is_array());
        if structured {
            return serde_json::from_value(value.clone())
                .map_err(|e| Error::Validation(format!("malformed filter: {e}")));
        }

        let mut clause = FilterClause::default();
        for (field, v) in obj {
            clause = match v {
                serde_json::Value::Array(items) => clause.where_in(field.as_str(), items.clone()),
                serde_json::Value::Object(_) | serde_json::Value::Null => {
                    return Err(Error::Validation(format!(
                        "filter value for '{field}' must be a scalar or an array of scalars"
                    )))
                }
                scalar => clause.where_eq(field.as_str(), scalar.clone()),
            };
        }
        Ok(clause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shorthand_object() {
        let clause = FilterClause::from_json(&json!({"lang": "it", "tag": ["a", "b"]})).unwrap();
        assert_eq!(clause.must.len(), 2);
        let lang = clause.must.iter().find(|c| c.field == "lang").unwrap();
        assert_eq!(lang.op, FilterOperator::Eq);
        let tag = clause.must.iter().find(|c| c.field == "tag").unwrap();
        assert_eq!(tag.op, FilterOperator::In);
        assert_eq!(tag.values.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_structured_object() {
        let clause = FilterClause::from_json(&json!({
            "must": [{"field": "a", "op": "eq", "value": 1}],
            "must_not": [{"field": "b", "op": "in", "values": [1, 2]}]
        }))
        .unwrap();
        assert_eq!(clause.must[0].op, FilterOperator::Eq);
        assert_eq!(clause.must_not[0].op, FilterOperator::In);
    }

    #[test]
    fn test_empty_object_matches_all() {
        let clause = FilterClause::from_json(&json!({})).unwrap();
        assert!(clause.is_empty());
    }

    #[test]
    fn test_rejects_non_object_and_nested() {
        assert!(matches!(
            FilterClause::from_json(&json!([1, 2])),
            Err(Error::Validation(_))
        ));
        assert!(FilterClause::from_json(&json!({"a": {"b": 1}})).is_err());
        assert!(FilterClause::from_json(&json!({"must": [{"field": "a"}]})).is_err());
    }
}
