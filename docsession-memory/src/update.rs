//! Application of native update operators to in-memory documents.

use std::cmp::Ordering;

use bson::{Bson, Document, oid::ObjectId};

use docsession_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::Expr,
};

use crate::{
    evaluator::compare_values,
    path::{lookup, remove_path, set_path},
};

/// Rejects update documents that are empty or contain non-operator keys.
pub(crate) fn validate_update(update: &Document) -> DocumentStoreResult<()> {
    if update.is_empty() {
        return Err(DocumentStoreError::InvalidArgument(
            "update document must not be empty".to_string(),
        ));
    }

    for (operator, fields) in update {
        if !operator.starts_with('$') {
            return Err(DocumentStoreError::InvalidArgument(format!(
                "update document may only contain operators, found {operator}"
            )));
        }

        if !matches!(fields, Bson::Document(_)) {
            return Err(DocumentStoreError::InvalidArgument(format!(
                "{operator} expects a document of fields"
            )));
        }
    }

    Ok(())
}

/// Applies `update` to `document`. `$setOnInsert` only takes effect when `inserting`.
///
/// Returns whether the document changed.
pub(crate) fn apply_update(
    document: &mut Document,
    update: &Document,
    inserting: bool,
) -> DocumentStoreResult<bool> {
    validate_update(update)?;

    let before = document.clone();

    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            continue;
        };

        for (field, value) in fields {
            match operator.as_str() {
                "$set" => set(document, field, value.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        set(document, field, value.clone())?;
                    }
                }
                "$unset" => {
                    remove_path(document, field);
                }
                "$inc" => {
                    let current = lookup(document, field).cloned();
                    set(document, field, increment(field, current, value)?)?;
                }
                "$push" => {
                    let pushed = match lookup(document, field) {
                        None => Bson::Array(vec![value.clone()]),
                        Some(Bson::Array(items)) => {
                            let mut items = items.clone();
                            items.push(value.clone());
                            Bson::Array(items)
                        }
                        Some(_) => {
                            return Err(DocumentStoreError::InvalidDocument(format!(
                                "$push target {field} is not an array"
                            )));
                        }
                    };
                    set(document, field, pushed)?;
                }
                "$min" | "$max" => {
                    let wanted = if operator == "$min" { Ordering::Less } else { Ordering::Greater };
                    let replace = match lookup(document, field) {
                        None => true,
                        Some(current) => compare_values(Some(value), Some(current)) == wanted,
                    };

                    if replace {
                        set(document, field, value.clone())?;
                    }
                }
                other => {
                    return Err(DocumentStoreError::Unsupported(format!(
                        "update operator {other}"
                    )));
                }
            }
        }
    }

    if before.get("_id").is_some() && before.get("_id") != document.get("_id") {
        return Err(DocumentStoreError::InvalidDocument(
            "the _id field cannot be modified".to_string(),
        ));
    }

    Ok(before != *document)
}

/// Builds the document inserted by an upsert: equality predicates of the
/// filter, then the update applied as an insert.
pub(crate) fn upsert_document(filter: Option<&Expr>, update: &Document) -> DocumentStoreResult<Document> {
    let mut document = Document::new();

    if let Some(filter) = filter {
        for (field, value) in filter.equalities() {
            set(&mut document, field, value.clone())?;
        }
    }

    apply_update(&mut document, update, true)?;

    Ok(with_id(document))
}

/// Ensures the document has an `_id`, generating an `ObjectId` as the first field.
pub(crate) fn with_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }

    let mut identified = Document::new();
    identified.insert("_id", ObjectId::new());
    identified.extend(document);
    identified
}

fn set(document: &mut Document, field: &str, value: Bson) -> DocumentStoreResult<()> {
    set_path(document, field, value).map_err(DocumentStoreError::InvalidDocument)
}

fn increment(field: &str, current: Option<Bson>, amount: &Bson) -> DocumentStoreResult<Bson> {
    let not_numeric =
        || DocumentStoreError::InvalidDocument(format!("$inc on {field} requires numeric values"));

    let current = current.unwrap_or(Bson::Int32(0));

    Ok(match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(a).checked_add(*b).ok_or_else(not_numeric)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(not_numeric)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(not_numeric)?),
        (Bson::Double(a), b) => Bson::Double(a + as_f64(b).ok_or_else(not_numeric)?),
        (a, Bson::Double(b)) => Bson::Double(as_f64(&a).ok_or_else(not_numeric)? + b),
        _ => return Err(not_numeric()),
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}
