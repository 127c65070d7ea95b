//! Query construction and filtering API for document stores.
//!
//! This module provides the building blocks every read and write is expressed with:
//! filter expressions, projections, sort keys, update operators, and a visitor
//! used by each store to evaluate or translate filters.
//!
//! # Query Building
//!
//! ```ignore
//! use docsession::query::{Query, Filter, Projection, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("name", "Alice"))
//!     .projection(Projection::new().include("name").include("age"))
//!     .sort("created_at", SortDirection::Desc)
//!     .limit(10)
//!     .skip(20)
//!     .build();
//! ```
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides a collection of static methods for building filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`, `all`
//!
//! An absent filter and an empty `And` both match every document.

use bson::{Bson, Document, doc};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The native sort key value (`1` or `-1`).
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// A single sort key. Queries hold an ordered list of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by. Dotted paths are allowed.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match). An array field matches when any element is equal.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String contains value (case-insensitive), array contains all values,
    /// or any other value equals the field.
    Contains,
    /// Negation of [`FieldOp::Contains`].
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field value (or any element of it) is one of the values.
    AnyOf,
    /// Field value (and every element of it) is none of the values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
///
/// # Example
///
/// ```ignore
/// use docsession::query::{Expr, Filter};
///
/// let adults = Filter::and(vec![
///     Filter::eq("status", "active"),
///     Filter::gte("age", 18),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match). Empty matches everything.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Whether this expression is the empty predicate.
    pub fn matches_all(&self) -> bool {
        matches!(self, Expr::And(list) if list.is_empty())
    }

    /// Top level equality predicates, used to seed documents created by an upsert.
    pub fn equalities(&self) -> Vec<(&str, &Bson)> {
        match self {
            Expr::Field { field, op: FieldOp::Eq, value } => vec![(field.as_str(), value)],
            Expr::And(list) => list
                .iter()
                .flat_map(Expr::equalities)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A structured query for retrieving documents.
///
/// A `limit` of zero means "no limit". A negative limit asks the store for a
/// single batch of `|limit|` documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Optional projection applied to every returned document.
    pub projection: Option<Projection>,
    /// Ordered sort keys.
    pub sort: Vec<Sort>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
}

impl Query {
    /// Creates a new empty query that matches every document.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Creates a query with only a filter.
    pub fn filtered(filter: impl Into<Option<Expr>>) -> Self {
        Query { filter: filter.into(), ..Query::default() }
    }
}

/// Helper struct for constructing filter expressions.
///
/// # Example
///
/// ```ignore
/// use docsession::query::Filter;
///
/// let expr = Filter::eq("name", "Alice")
///     .and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// The empty predicate. Matches every document.
    pub fn all() -> Expr {
        Expr::And(Vec::new())
    }

    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the specified value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches documents where the string field ends with the specified value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches documents where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Matches documents where the field (string or array) does not contain the specified value.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is missing.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field is one of the specified values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Matches documents where the field is none of the specified values.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

/// Field inclusion/exclusion list limiting the shape of returned documents.
///
/// An inclusion projection keeps `_id` unless [`Projection::exclude_id`] is used.
/// Including some fields while excluding others (other than `_id`) is rejected
/// by [`Projection::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Vec<(String, bool)>,
}

impl Projection {
    pub fn new() -> Self {
        Projection::default()
    }

    /// Builds an inclusion projection from a list of fields.
    pub fn including<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fields
            .into_iter()
            .fold(Projection::new(), |projection, field| projection.include(field))
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.set(field.into(), true);
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.set(field.into(), false);
        self
    }

    pub fn exclude_id(self) -> Self {
        self.exclude("_id")
    }

    fn set(&mut self, field: String, include: bool) {
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = include,
            None => self.fields.push((field, include)),
        }
    }

    /// The ordered `(field, include)` pairs.
    pub fn fields(&self) -> &[(String, bool)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any field other than `_id` is included.
    pub fn is_inclusion(&self) -> bool {
        self.fields
            .iter()
            .any(|(field, include)| *include && field != "_id")
    }

    /// Whether `_id` is explicitly excluded.
    pub fn excludes_id(&self) -> bool {
        self.fields
            .iter()
            .any(|(field, include)| !*include && field == "_id")
    }

    /// Rejects projections mixing inclusion and exclusion of regular fields.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        let excludes_other = self
            .fields
            .iter()
            .any(|(field, include)| !*include && field != "_id");

        if self.is_inclusion() && excludes_other {
            return Err(DocumentStoreError::InvalidArgument(
                "projection cannot mix inclusion and exclusion".to_string(),
            ));
        }

        Ok(())
    }

    /// Native projection document (`{field: 1|0}`).
    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(field, include)| (field.clone(), Bson::Int32(i32::from(*include))))
            .collect()
    }
}

/// A set of native update operators (`$set`, `$inc`, ...).
///
/// # Example
///
/// ```ignore
/// use docsession::query::Update;
///
/// let update = Update::new()
///     .set("status", "archived")
///     .inc("revision", 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    operators: Document,
}

impl Update {
    pub fn new() -> Self {
        Update::default()
    }

    /// Uses an operator document verbatim.
    pub fn raw(operators: Document) -> Self {
        Update { operators }
    }

    /// Wraps a plain field map in `$set`.
    pub fn fields(fields: Document) -> Self {
        Update { operators: doc! { "$set": fields } }
    }

    pub fn set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator("$set", field.into(), value.into())
    }

    pub fn unset(self, field: impl Into<String>) -> Self {
        self.operator("$unset", field.into(), Bson::String(String::new()))
    }

    pub fn inc(self, field: impl Into<String>, amount: impl Into<Bson>) -> Self {
        self.operator("$inc", field.into(), amount.into())
    }

    pub fn push(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator("$push", field.into(), value.into())
    }

    /// Sets a field only when the update inserts a new document.
    pub fn set_on_insert(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator("$setOnInsert", field.into(), value.into())
    }

    pub fn min(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator("$min", field.into(), value.into())
    }

    pub fn max(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator("$max", field.into(), value.into())
    }

    fn operator(mut self, operator: &str, field: String, value: Bson) -> Self {
        match self.operators.get_mut(operator) {
            Some(Bson::Document(fields)) => {
                fields.insert(field, value);
            }
            _ => {
                self.operators.insert(operator, doc! { field: value });
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn as_document(&self) -> &Document {
        &self.operators
    }

    pub fn into_document(self) -> Document {
        self.operators
    }
}

impl From<Document> for Update {
    fn from(operators: Document) -> Self {
        Update::raw(operators)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression for this query.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Sets the projection applied to returned documents.
    pub fn projection(mut self, projection: Projection) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: i64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    /// Appends a sort key. Earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_builder_groups_fields_per_operator() {
        let update = Update::new()
            .set("a", 1)
            .set("b", "x")
            .inc("count", 2);

        assert_eq!(
            update.into_document(),
            doc! { "$set": { "a": 1, "b": "x" }, "$inc": { "count": 2 } }
        );
    }

    #[test]
    fn update_fields_wraps_in_set() {
        assert_eq!(
            Update::fields(doc! { "name": "n" }).as_document(),
            &doc! { "$set": { "name": "n" } }
        );
    }

    #[test]
    fn projection_rejects_mixed_modes() {
        assert!(Projection::new().include("a").exclude_id().validate().is_ok());
        assert!(Projection::new().exclude("a").exclude("b").validate().is_ok());
        assert!(matches!(
            Projection::new().include("a").exclude("b").validate(),
            Err(DocumentStoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn projection_later_entries_replace_earlier() {
        let projection = Projection::new().include("a").exclude("a");

        assert_eq!(projection.fields(), &[("a".to_string(), false)]);
        assert_eq!(projection.to_document(), doc! { "a": 0 });
    }

    #[test]
    fn builder_appends_sort_keys_in_order() {
        let query = Query::builder()
            .sort("a", SortDirection::Asc)
            .sort("b", SortDirection::Desc)
            .build();

        assert_eq!(query.sort, vec![Sort::asc("a"), Sort::desc("b")]);
    }

    #[test]
    fn equalities_flatten_nested_and() {
        let expr = Filter::and(vec![
            Filter::eq("_id", "orders"),
            Filter::and(vec![Filter::eq("kind", "k"), Filter::gt("n", 1)]),
        ]);

        let pairs = expr.equalities();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("_id", &Bson::String("orders".into())));
        assert_eq!(pairs[1].0, "kind");
        assert!(Filter::all().matches_all());
    }
}
