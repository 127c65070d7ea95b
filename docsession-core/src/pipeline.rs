//! Typed aggregation pipelines.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Stores that speak the native
//! pipeline language translate it stage by stage. Stores that evaluate locally
//! run the typed stages themselves and reject [`Stage::Raw`].
//!
//! # Example
//!
//! ```ignore
//! use docsession::pipeline::{Pipeline, Group, Accumulator};
//! use docsession::query::{Filter, SortDirection};
//!
//! let pipeline = Pipeline::new()
//!     .matching(Filter::eq("status", "paid"))
//!     .group(Group::by("customer").accumulate("total", Accumulator::Sum("amount".into())))
//!     .sort("total", SortDirection::Desc)
//!     .limit(10);
//! ```

use bson::Document;

use crate::query::{Expr, Projection, Sort, SortDirection};

/// Accumulator applied to every document of a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum of a numeric field.
    Sum(String),
    /// Number of documents in the group.
    Count,
    Avg(String),
    Min(String),
    Max(String),
    First(String),
    Last(String),
    /// All values of a field, in input order.
    Push(String),
    /// Distinct values of a field.
    AddToSet(String),
}

/// A `$group` stage: group key plus named accumulators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    /// Field to group by. `None` collapses every input into one group.
    pub key: Option<String>,
    /// Output field name and accumulator, in output order.
    pub accumulators: Vec<(String, Accumulator)>,
}

impl Group {
    pub fn by(field: impl Into<String>) -> Self {
        Group { key: Some(field.into()), accumulators: Vec::new() }
    }

    /// A single group holding every input document.
    pub fn all() -> Self {
        Group::default()
    }

    pub fn accumulate(mut self, output: impl Into<String>, accumulator: Accumulator) -> Self {
        self.accumulators.push((output.into(), accumulator));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Expr),
    Sort(Vec<Sort>),
    Skip(u64),
    Limit(i64),
    Project(Projection),
    /// Emits one document per element of an array field.
    Unwind(String),
    Group(Group),
    /// Replaces the input with a single `{<field>: n}` document.
    Count(String),
    /// A native stage passed through verbatim.
    Raw(Document),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn matching(self, expr: Expr) -> Self {
        self.stage(Stage::Match(expr))
    }

    /// Adds a sort key. Consecutive calls extend the same sort stage.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        let key = Sort { field: field.into(), direction };

        match self.stages.last_mut() {
            Some(Stage::Sort(keys)) => keys.push(key),
            _ => self.stages.push(Stage::Sort(vec![key])),
        }
        self
    }

    pub fn skip(self, skip: u64) -> Self {
        self.stage(Stage::Skip(skip))
    }

    pub fn limit(self, limit: i64) -> Self {
        self.stage(Stage::Limit(limit))
    }

    pub fn project(self, projection: Projection) -> Self {
        self.stage(Stage::Project(projection))
    }

    pub fn unwind(self, field: impl Into<String>) -> Self {
        self.stage(Stage::Unwind(field.into()))
    }

    pub fn group(self, group: Group) -> Self {
        self.stage(Stage::Group(group))
    }

    pub fn count(self, output: impl Into<String>) -> Self {
        self.stage(Stage::Count(output.into()))
    }

    pub fn raw(self, stage: Document) -> Self {
        self.stage(Stage::Raw(stage))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FromIterator<Stage> for Pipeline {
    fn from_iter<T: IntoIterator<Item = Stage>>(iter: T) -> Self {
        Pipeline { stages: iter.into_iter().collect() }
    }
}

/// Options for running a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Allow stages to spill to temporary files.
    pub allow_disk_use: bool,
    /// Cursor batch size.
    pub batch_size: Option<u32>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        AggregateOptions { allow_disk_use: true, batch_size: None }
    }
}
