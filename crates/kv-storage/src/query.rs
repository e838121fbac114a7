//! Typed query AST executed against one secondary index.
//!
//! A query names an index, a sequence of per-field conditions (evaluated in
//! the index's declared field order), a sort direction, an optional result
//! limit, and the topic set to search. Because index keys are built from an
//! ordered concatenation of field encodings (see `keys.rs`), a query whose
//! leading conditions are all equality collapses to one or more contiguous
//! key-range scans; anything after the first non-equality condition is
//! applied as an in-memory filter over the scanned rows.

use crate::keys::FieldValue;
use crate::model::IndexSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    Eq(FieldValue),
    Neq(FieldValue),
    Gt(FieldValue),
    Gte(FieldValue),
    Lt(FieldValue),
    Lte(FieldValue),
    In(Vec<FieldValue>),
}

/// A condition on the index field at `field_index` (position within
/// `IndexSpec::fields`).
#[derive(Debug, Clone)]
pub struct Condition {
    pub field_index: usize,
    pub op: QueryOp,
}

impl Condition {
    pub fn matches(&self, value: &FieldValue) -> bool {
        match &self.op {
            QueryOp::Eq(v) => value == v,
            QueryOp::Neq(v) => value != v,
            QueryOp::Gt(v) => compare(value, v) == std::cmp::Ordering::Greater,
            QueryOp::Gte(v) => compare(value, v) != std::cmp::Ordering::Less,
            QueryOp::Lt(v) => compare(value, v) == std::cmp::Ordering::Less,
            QueryOp::Lte(v) => compare(value, v) != std::cmp::Ordering::Greater,
            QueryOp::In(values) => values.contains(value),
        }
    }
}

fn compare(a: &FieldValue, b: &FieldValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(y),
        (FieldValue::Uint(x), FieldValue::Uint(y)) => x.cmp(y),
        (FieldValue::Int(x), FieldValue::Int(y)) => x.cmp(y),
        (FieldValue::Float(x), FieldValue::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (FieldValue::Str(x), FieldValue::Str(y)) => x.cmp(y),
        (FieldValue::DateTimeMillis(x), FieldValue::DateTimeMillis(y)) => x.cmp(y),
        (FieldValue::ObjectId(x), FieldValue::ObjectId(y)) => x.cmp(y),
        (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
        _ => Ordering::Equal,
    }
}

/// A query against one model's index.
pub struct Query {
    pub index: IndexSpec,
    pub conditions: Vec<Condition>,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub topic: Option<String>,
}

impl Query {
    pub fn new(index: IndexSpec) -> Self {
        Self {
            index,
            conditions: Vec::new(),
            order: SortOrder::Asc,
            limit: None,
            topic: None,
        }
    }

    pub fn eq(mut self, field_index: usize, value: FieldValue) -> Self {
        self.conditions.push(Condition {
            field_index,
            op: QueryOp::Eq(value),
        });
        self
    }

    pub fn condition(mut self, field_index: usize, op: QueryOp) -> Self {
        self.conditions.push(Condition { field_index, op });
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// The leading run of equality conditions, in field order, usable as a
    /// common key prefix for the scan.
    pub fn equality_prefix(&self) -> Vec<FieldValue> {
        let mut prefix = Vec::new();
        for i in 0..self.index.fields.len() {
            match self.conditions.iter().find(|c| c.field_index == i) {
                Some(Condition { op: QueryOp::Eq(v), .. }) => prefix.push(v.clone()),
                _ => break,
            }
        }
        prefix
    }

    /// Conditions not absorbed into the equality prefix; applied in-memory
    /// against each scanned row's decoded field values.
    pub fn residual_conditions(&self) -> Vec<&Condition> {
        let prefix_len = self.equality_prefix().len();
        self.conditions
            .iter()
            .filter(|c| c.field_index >= prefix_len)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> IndexSpec {
        IndexSpec::new(1, "by_org_age", &["org_id", "age"], false)
    }

    #[test]
    fn equality_prefix_stops_at_first_non_equality() {
        let q = Query::new(spec())
            .eq(0, FieldValue::Str("acme".into()))
            .condition(1, QueryOp::Gt(FieldValue::Int(18)));
        assert_eq!(q.equality_prefix(), vec![FieldValue::Str("acme".into())]);
        assert_eq!(q.residual_conditions().len(), 1);
    }

    #[test]
    fn full_equality_query_has_no_residual_conditions() {
        let q = Query::new(spec())
            .eq(0, FieldValue::Str("acme".into()))
            .eq(1, FieldValue::Int(30));
        assert_eq!(q.equality_prefix().len(), 2);
        assert!(q.residual_conditions().is_empty());
    }

    #[test]
    fn in_condition_matches_any_listed_value() {
        let cond = Condition {
            field_index: 0,
            op: QueryOp::In(vec![FieldValue::Int(1), FieldValue::Int(2)]),
        };
        assert!(cond.matches(&FieldValue::Int(2)));
        assert!(!cond.matches(&FieldValue::Int(3)));
    }
}
