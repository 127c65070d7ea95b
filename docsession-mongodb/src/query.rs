//! Query translation from the docsession AST to MongoDB query syntax.
//!
//! This module translates filter expressions, sort keys and aggregation
//! pipelines into the BSON documents the MongoDB driver sends to the server.

use bson::{Bson, Document, doc};

use docsession_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::{Accumulator, Group, Pipeline, Stage},
    query::{Expr, FieldOp, QueryVisitor, Sort},
};

/// Translates docsession query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates an optional filter. `None` becomes the empty predicate.
    pub fn filter(filter: Option<&Expr>) -> DocumentStoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }
}

fn escape_regex(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

fn regex(pattern: String) -> Document {
    doc! { "$regex": pattern, "$options": "i" }
}

fn as_list(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        single => Bson::Array(vec![single.clone()]),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! { "$expr": false });
        }

        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => regex(escape_regex(s)),
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$eq": other },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": regex(escape_regex(s)) },
                    Bson::Array(arr) => doc! { "$not": { "$all": arr } },
                    other => doc! { "$ne": other },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => regex(format!("^{}", escape_regex(s))),
                    _ => return Err(DocumentStoreError::InvalidArgument("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => regex(format!("{}$", escape_regex(s))),
                    _ => return Err(DocumentStoreError::InvalidArgument("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => doc! { "$in": as_list(value) },
                FieldOp::NoneOf => doc! { "$nin": as_list(value) },
            }
        })
    }
}

/// Native sort document, keys in precedence order.
pub(crate) fn sort_document(sort: &[Sort]) -> Document {
    sort.iter()
        .map(|key| (key.field.clone(), Bson::Int32(key.direction.as_i32())))
        .collect()
}

fn field_path(field: &str) -> String {
    if field.starts_with('$') {
        field.to_string()
    } else {
        format!("${field}")
    }
}

fn group_document(group: &Group) -> Document {
    let mut document = doc! {
        "_id": group.key.as_deref().map(field_path).map(Bson::String).unwrap_or(Bson::Null),
    };

    for (name, accumulator) in &group.accumulators {
        let expression = match accumulator {
            Accumulator::Sum(field) => doc! { "$sum": field_path(field) },
            Accumulator::Count => doc! { "$sum": 1 },
            Accumulator::Avg(field) => doc! { "$avg": field_path(field) },
            Accumulator::Min(field) => doc! { "$min": field_path(field) },
            Accumulator::Max(field) => doc! { "$max": field_path(field) },
            Accumulator::First(field) => doc! { "$first": field_path(field) },
            Accumulator::Last(field) => doc! { "$last": field_path(field) },
            Accumulator::Push(field) => doc! { "$push": field_path(field) },
            Accumulator::AddToSet(field) => doc! { "$addToSet": field_path(field) },
        };
        document.insert(name.as_str(), expression);
    }

    document
}

/// Native aggregation stages.
pub(crate) fn pipeline_documents(pipeline: &Pipeline) -> DocumentStoreResult<Vec<Document>> {
    pipeline
        .stages()
        .iter()
        .map(|stage| {
            Ok(match stage {
                Stage::Match(expr) => doc! { "$match": MongoQueryTranslator.visit_expr(expr)? },
                Stage::Sort(keys) => doc! { "$sort": sort_document(keys) },
                Stage::Skip(skip) => doc! { "$skip": i64::try_from(*skip).unwrap_or(i64::MAX) },
                Stage::Limit(limit) => doc! { "$limit": *limit },
                Stage::Project(projection) => {
                    projection.validate()?;
                    doc! { "$project": projection.to_document() }
                }
                Stage::Unwind(field) => doc! { "$unwind": field_path(field) },
                Stage::Group(group) => doc! { "$group": group_document(group) },
                Stage::Count(output) => doc! { "$count": output.as_str() },
                Stage::Raw(stage) => stage.clone(),
            })
        })
        .collect()
}
