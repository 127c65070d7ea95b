//! Query expression evaluation for in-memory documents.
//!
//! This module provides filtering, ordering and projection over BSON documents.
//! Comparison follows the document database conventions the MongoDB backend
//! relies on: an array field matches when any of its elements matches, and a
//! missing field compares like `null`.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docsession_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Projection, QueryVisitor, Sort, SortDirection},
};

use crate::path::{lookup, remove_path, set_path};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(HashMap<&'a str, Comparable<'a>>),
    Array(Vec<Comparable<'a>>),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    /// Values with no ordering of their own; equal when the raw values are.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Canonical cross-type order: null, numbers, strings, documents, arrays,
    /// object ids, booleans, dates, everything else.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Total order used for sorting and min/max. NaN sorts below every other number.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            _ => self
                .partial_cmp(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Compares two BSON values with [`Comparable::total_cmp`].
pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.total_cmp(&right)
}

/// Equality that treats numerically equal integers and doubles as the same value.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Orders documents by a list of sort keys. Missing fields sort as `null`.
pub(crate) fn compare_documents(left: &Document, right: &Document, sort: &[Sort]) -> Ordering {
    for key in sort {
        let ordering = compare_values(lookup(left, &key.field), lookup(right, &key.field));
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Shapes a document according to a projection.
///
/// The projection must already have passed [`Projection::validate`].
pub(crate) fn apply_projection(
    document: Document,
    projection: &Projection,
) -> DocumentStoreResult<Document> {
    if projection.is_inclusion() {
        let mut projected = Document::new();

        if !projection.excludes_id() {
            if let Some(id) = document.get("_id") {
                projected.insert("_id", id.clone());
            }
        }

        for (field, _) in projection.fields().iter().filter(|(field, include)| *include && field != "_id") {
            if let Some(value) = lookup(&document, field) {
                set_path(&mut projected, field, value.clone())
                    .map_err(DocumentStoreError::InvalidDocument)?;
            }
        }

        return Ok(projected);
    }

    let mut projected = document;

    for (field, _) in projection.fields() {
        remove_path(&mut projected, field);
    }

    Ok(projected)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Whether `document` matches `filter`. `None` matches everything.
    pub fn matches(document: &'a Document, filter: Option<&Expr>) -> DocumentStoreResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::matches(document, filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }
}

fn any_element<F>(value: &Bson, mut predicate: F) -> bool
where
    F: FnMut(&Bson) -> bool,
{
    match value {
        Bson::Array(items) => predicate(value) || items.iter().any(predicate),
        _ => predicate(value),
    }
}

fn contains_text(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn compare_op(op: &FieldOp, ordering: Ordering) -> bool {
    match op {
        FieldOp::Gt => ordering == Ordering::Greater,
        FieldOp::Gte => ordering != Ordering::Less,
        FieldOp::Lt => ordering == Ordering::Less,
        FieldOp::Lte => ordering != Ordering::Greater,
        _ => false,
    }
}

impl<'a> DocumentEvaluator<'a> {
    fn equals(field_value: Option<&Bson>, value: &Bson) -> bool {
        match field_value {
            Some(field_value) => any_element(field_value, |item| values_equal(item, value)),
            None => matches!(value, Bson::Null),
        }
    }

    fn contains(field_value: Option<&Bson>, value: &Bson) -> bool {
        match (field_value, value) {
            (Some(Bson::String(left)), Bson::String(right)) => contains_text(left, right),
            (Some(Bson::Array(items)), Bson::String(right)) => items
                .iter()
                .any(|item| matches!(item, Bson::String(s) if contains_text(s, right))),
            (_, Bson::String(_)) => false,
            (field_value, Bson::Array(wanted)) => {
                !wanted.is_empty()
                    && wanted
                        .iter()
                        .all(|want| DocumentEvaluator::equals(field_value, want))
            }
            (field_value, single) => DocumentEvaluator::equals(field_value, single),
        }
    }

    fn any_of(field_value: Option<&Bson>, value: &Bson) -> bool {
        let candidates = match value {
            Bson::Array(values) => values.as_slice(),
            single => std::slice::from_ref(single),
        };

        candidates
            .iter()
            .any(|candidate| DocumentEvaluator::equals(field_value, candidate))
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let field_value = lookup(self.document, field);

        Ok(match op {
            FieldOp::Eq => DocumentEvaluator::equals(field_value, value),
            FieldOp::Ne => !DocumentEvaluator::equals(field_value, value),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => match field_value {
                Some(field_value) => any_element(field_value, |item| {
                    Comparable::from(item)
                        .partial_cmp(&Comparable::from(value))
                        .is_some_and(|ordering| compare_op(op, ordering))
                }),
                None => false,
            },
            FieldOp::Contains => DocumentEvaluator::contains(field_value, value),
            FieldOp::NotContains => !DocumentEvaluator::contains(field_value, value),
            FieldOp::StartsWith => match (field_value, value) {
                (Some(Bson::String(left)), Bson::String(right)) => {
                    left.to_lowercase().starts_with(&right.to_lowercase())
                }
                _ => false,
            },
            FieldOp::EndsWith => match (field_value, value) {
                (Some(Bson::String(left)), Bson::String(right)) => {
                    left.to_lowercase().ends_with(&right.to_lowercase())
                }
                _ => false,
            },
            FieldOp::AnyOf => DocumentEvaluator::any_of(field_value, value),
            FieldOp::NoneOf => !DocumentEvaluator::any_of(field_value, value),
        })
    }
}
