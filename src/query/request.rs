//! Query requests: statement text, the datasets to stage, bound parameters
//! and options.

use crate::table::{TabularDataset, Value};

use super::options::QueryOptions;

/// One positional argument of a request.
#[derive(Clone, Debug)]
pub enum Argument<'a> {
    /// A dataset staged under its own name.
    Dataset(&'a TabularDataset),
    /// Datasets staged under the given names, in order.
    Named(Vec<(String, &'a TabularDataset)>),
    /// Positional statement parameters.
    Params(Vec<Value>),
}

impl<'a> From<&'a TabularDataset> for Argument<'a> {
    fn from(dataset: &'a TabularDataset) -> Self {
        Argument::Dataset(dataset)
    }
}

impl From<Vec<Value>> for Argument<'_> {
    fn from(params: Vec<Value>) -> Self {
        Argument::Params(params)
    }
}

/// A dataset queued for staging. `name` is `None` when the dataset was
/// passed without an explicit name and carries none of its own.
#[derive(Clone, Debug)]
pub(crate) struct QueuedDataset<'a> {
    pub(crate) name: Option<String>,
    pub(crate) dataset: &'a TabularDataset,
}

/// Query text, the datasets it reads, parameters, and options.
#[derive(Clone, Debug, Default)]
pub struct QueryRequest<'a> {
    sql: Option<String>,
    datasets: Vec<QueuedDataset<'a>>,
    params: Vec<Value>,
    options: QueryOptions,
}

impl<'a> QueryRequest<'a> {
    /// Request that runs `sql` after staging.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            ..Self::default()
        }
    }

    /// Request that only stages and loads, returning no result.
    pub fn load_only() -> Self {
        Self::default()
    }

    /// Stages `dataset` under its own name.
    pub fn dataset(mut self, dataset: &'a TabularDataset) -> Self {
        self.datasets.push(QueuedDataset {
            name: dataset.name().map(str::to_string),
            dataset,
        });
        self
    }

    /// Stages `dataset` as `name`.
    pub fn named(mut self, name: impl Into<String>, dataset: &'a TabularDataset) -> Self {
        self.datasets.push(QueuedDataset {
            name: Some(name.into()),
            dataset,
        });
        self
    }

    /// Appends one positional parameter.
    pub fn param(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Appends positional parameters.
    pub fn params<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params.extend(values.into_iter().map(Into::into));
        self
    }

    /// Routes a mixed positional argument to datasets or parameters.
    pub fn arg(self, argument: impl Into<Argument<'a>>) -> Self {
        match argument.into() {
            Argument::Dataset(dataset) => self.dataset(dataset),
            Argument::Named(entries) => entries
                .into_iter()
                .fold(self, |req, (name, dataset)| req.named(name, dataset)),
            Argument::Params(values) => self.params(values),
        }
    }

    /// Replaces the options.
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Mutable access to the options.
    pub fn options_mut(&mut self) -> &mut QueryOptions {
        &mut self.options
    }

    /// Query text, if any.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// Positional parameters.
    pub fn bound_params(&self) -> &[Value] {
        &self.params
    }

    /// Current options.
    pub fn current_options(&self) -> &QueryOptions {
        &self.options
    }

    /// Number of queued datasets.
    pub fn num_datasets(&self) -> usize {
        self.datasets.len()
    }

    pub(crate) fn queued(&self) -> &[QueuedDataset<'a>] {
        &self.datasets
    }
}
