//! Typed metadata filters.
//!
//! A [`FilterExpr`] is built by the caller and by retrievers (which add their
//! own isolation terms), then either evaluated in process by
//! [`FilterExpr::matches`] or translated into the store's JSON filter syntax by
//! [`FilterExpr::to_store_json`]. Nothing outside the store boundary inspects
//! raw filter dictionaries.

use crate::types::{Metadata, MetadataValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;

/// An enum representing the nodes of a filter expression AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
  /// A comparison between a field and a value, like `category == "Shoes"`.
  Compare {
    field: String,
    op: CompareOp,
    value: MetadataValue,
  },
  /// True only if every sub-expression is true. An empty `And` is true.
  And(Vec<FilterExpr>),
  /// True if at least one sub-expression is true. An empty `Or` is false.
  Or(Vec<FilterExpr>),
}

/// The set of comparison operators available for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

impl CompareOp {
  fn store_operator(self) -> &'static str {
    match self {
      CompareOp::Eq => "$eq",
      CompareOp::Ne => "$ne",
      CompareOp::Lt => "$lt",
      CompareOp::Le => "$lte",
      CompareOp::Gt => "$gt",
      CompareOp::Ge => "$gte",
    }
  }
}

impl FilterExpr {
  /// `field == value`
  pub fn eq(field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
    Self::compare(field, CompareOp::Eq, value)
  }

  pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<MetadataValue>) -> Self {
    FilterExpr::Compare {
      field: field.into(),
      op,
      value: value.into(),
    }
  }

  /// Conjunction of `self` and `other`, flattening nested `And`s.
  pub fn and(self, other: FilterExpr) -> Self {
    let mut terms = match self {
      FilterExpr::And(terms) => terms,
      single => vec![single],
    };
    match other {
      FilterExpr::And(more) => terms.extend(more),
      single => terms.push(single),
    }
    FilterExpr::And(terms)
  }

  /// ANDs two optional filters, returning `None` only if both are absent.
  pub fn merge(left: Option<FilterExpr>, right: Option<FilterExpr>) -> Option<FilterExpr> {
    match (left, right) {
      (Some(l), Some(r)) => Some(l.and(r)),
      (Some(f), None) | (None, Some(f)) => Some(f),
      (None, None) => None,
    }
  }

  /// Evaluates the expression against a metadata map.
  ///
  /// A comparison on a missing field is false, except `Ne`, which is true.
  pub fn matches(&self, metadata: &Metadata) -> bool {
    match self {
      FilterExpr::Compare { field, op, value } => match metadata.get(field) {
        Some(actual) => compare_values(actual, *op, value),
        None => *op == CompareOp::Ne,
      },
      FilterExpr::And(terms) => terms.iter().all(|t| t.matches(metadata)),
      FilterExpr::Or(terms) => terms.iter().any(|t| t.matches(metadata)),
    }
  }

  /// Translates the expression into the `$eq` / `$and` JSON dialect used by
  /// hosted vector databases.
  pub fn to_store_json(&self) -> Value {
    match self {
      FilterExpr::Compare { field, op, value } => {
        json!({ field.as_str(): { op.store_operator(): value } })
      }
      FilterExpr::And(terms) => {
        json!({ "$and": terms.iter().map(FilterExpr::to_store_json).collect::<Vec<_>>() })
      }
      FilterExpr::Or(terms) => {
        json!({ "$or": terms.iter().map(FilterExpr::to_store_json).collect::<Vec<_>>() })
      }
    }
  }
}

fn compare_values(actual: &MetadataValue, op: CompareOp, expected: &MetadataValue) -> bool {
  let ordering = match (actual, expected) {
    (MetadataValue::String(a), MetadataValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
    (MetadataValue::Number(a), MetadataValue::Number(b)) => a.partial_cmp(b),
    (MetadataValue::Bool(a), MetadataValue::Bool(b)) => Some(a.cmp(b)),
    _ => None,
  };

  match (op, ordering) {
    (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
    (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
    (CompareOp::Ne, None) => true,
    // Ordering between bools is not meaningful for filters.
    (_, Some(_)) if matches!(actual, MetadataValue::Bool(_)) => false,
    (CompareOp::Lt, Some(o)) => o == Ordering::Less,
    (CompareOp::Le, Some(o)) => o != Ordering::Greater,
    (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
    (CompareOp::Ge, Some(o)) => o != Ordering::Less,
    (_, None) => false,
  }
}
