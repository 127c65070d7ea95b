//! Local execution of typed aggregation pipelines.

use std::cmp::Ordering;

use bson::{Bson, Document};

use docsession_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::{Accumulator, Group, Pipeline, Stage},
};

use crate::{
    evaluator::{DocumentEvaluator, apply_projection, compare_documents, compare_values, values_equal},
    path::{field_reference, lookup, set_path},
};

/// Runs every stage of `pipeline` over `documents`, in order.
pub(crate) fn run_pipeline(
    documents: Vec<Document>,
    pipeline: &Pipeline,
) -> DocumentStoreResult<Vec<Document>> {
    let mut documents = documents;

    for stage in pipeline.stages() {
        documents = run_stage(documents, stage)?;
    }

    Ok(documents)
}

fn run_stage(documents: Vec<Document>, stage: &Stage) -> DocumentStoreResult<Vec<Document>> {
    match stage {
        Stage::Match(expr) => DocumentEvaluator::filter_documents(documents.iter(), Some(expr)),
        Stage::Sort(keys) => {
            let mut documents = documents;
            documents.sort_by(|a, b| compare_documents(a, b, keys));
            Ok(documents)
        }
        Stage::Skip(skip) => Ok(documents
            .into_iter()
            .skip(usize::try_from(*skip).unwrap_or(usize::MAX))
            .collect()),
        Stage::Limit(limit) => {
            if *limit <= 0 {
                return Err(DocumentStoreError::InvalidArgument(format!(
                    "pipeline limit must be positive, got {limit}"
                )));
            }

            Ok(documents
                .into_iter()
                .take(usize::try_from(*limit).unwrap_or(usize::MAX))
                .collect())
        }
        Stage::Project(projection) => {
            projection.validate()?;
            documents
                .into_iter()
                .map(|document| apply_projection(document, projection))
                .collect()
        }
        Stage::Unwind(field) => unwind(documents, field_reference(field)),
        Stage::Group(group) => run_group(documents, group),
        Stage::Count(output) => {
            if documents.is_empty() {
                return Ok(Vec::new());
            }

            let count = i32::try_from(documents.len()).map_err(|_| {
                DocumentStoreError::InvalidDocument("count does not fit in i32".to_string())
            })?;
            let mut document = Document::new();
            document.insert(output.as_str(), count);
            Ok(vec![document])
        }
        Stage::Raw(stage) => Err(DocumentStoreError::Unsupported(format!(
            "raw pipeline stage {stage}"
        ))),
    }
}

fn unwind(documents: Vec<Document>, field: &str) -> DocumentStoreResult<Vec<Document>> {
    let mut unwound = Vec::new();

    for document in documents {
        match lookup(&document, field).cloned() {
            Some(Bson::Array(items)) => {
                for item in items {
                    let mut copy = document.clone();
                    set_path(&mut copy, field, item).map_err(DocumentStoreError::InvalidDocument)?;
                    unwound.push(copy);
                }
            }
            Some(Bson::Null) | None => {}
            Some(_) => unwound.push(document),
        }
    }

    Ok(unwound)
}

fn run_group(documents: Vec<Document>, group: &Group) -> DocumentStoreResult<Vec<Document>> {
    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();

    for document in documents {
        let key = group
            .key
            .as_deref()
            .and_then(|key| lookup(&document, field_reference(key)).cloned())
            .unwrap_or(Bson::Null);

        match groups.iter_mut().find(|(existing, _)| values_equal(existing, &key)) {
            Some((_, members)) => members.push(document),
            None => groups.push((key, vec![document])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut output = Document::new();
            output.insert("_id", key);

            for (name, accumulator) in &group.accumulators {
                output.insert(name.as_str(), accumulate(accumulator, &members));
            }

            Ok(output)
        })
        .collect()
}

fn values<'a>(members: &'a [Document], field: &'a str) -> impl Iterator<Item = &'a Bson> + 'a {
    let field = field_reference(field);

    members
        .iter()
        .filter_map(move |document| lookup(document, field))
        .filter(|value| !matches!(value, Bson::Null))
}

fn accumulate(accumulator: &Accumulator, members: &[Document]) -> Bson {
    match accumulator {
        Accumulator::Count => Bson::Int32(i32::try_from(members.len()).unwrap_or(i32::MAX)),
        Accumulator::Sum(field) => sum(values(members, field)),
        Accumulator::Avg(field) => {
            let numbers: Vec<f64> = values(members, field).filter_map(as_f64).collect();

            if numbers.is_empty() {
                Bson::Null
            } else {
                Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Accumulator::Min(field) => extreme(values(members, field), Ordering::Less),
        Accumulator::Max(field) => extreme(values(members, field), Ordering::Greater),
        Accumulator::First(field) => members
            .first()
            .and_then(|document| lookup(document, field_reference(field)))
            .cloned()
            .unwrap_or(Bson::Null),
        Accumulator::Last(field) => members
            .last()
            .and_then(|document| lookup(document, field_reference(field)))
            .cloned()
            .unwrap_or(Bson::Null),
        Accumulator::Push(field) => Bson::Array(values(members, field).cloned().collect()),
        Accumulator::AddToSet(field) => {
            let mut set: Vec<Bson> = Vec::new();

            for value in values(members, field) {
                if !set.iter().any(|existing| values_equal(existing, value)) {
                    set.push(value.clone());
                }
            }

            Bson::Array(set)
        }
    }
}

fn sum<'a>(values: impl Iterator<Item = &'a Bson>) -> Bson {
    let mut integer: i64 = 0;
    let mut double: Option<f64> = None;

    for value in values {
        match value {
            Bson::Int32(v) => integer = integer.saturating_add(i64::from(*v)),
            Bson::Int64(v) => integer = integer.saturating_add(*v),
            Bson::Double(v) => *double.get_or_insert(0.0) += v,
            _ => {}
        }
    }

    match double {
        Some(double) => Bson::Double(double + integer as f64),
        None => match i32::try_from(integer) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(integer),
        },
    }
}

fn extreme<'a>(values: impl Iterator<Item = &'a Bson>, wanted: Ordering) -> Bson {
    values
        .fold(None::<&Bson>, |best, value| match best {
            Some(best) if compare_values(Some(value), Some(best)) != wanted => Some(best),
            _ => Some(value),
        })
        .cloned()
        .unwrap_or(Bson::Null)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}
