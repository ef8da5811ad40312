use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Value;

/// One row returned by [`Driver::query`](crate::driver::Driver::query).
///
/// Column names (and their lookup index) are shared by every row of a result so drivers build
/// them once per statement with [`RowShape`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    shape: RowShape,
    /// The cell values, in column order
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(shape: RowShape, values: Vec<Value>) -> Self {
        Self { shape, values }
    }

    /// Build a standalone row, mostly useful for tests and hand-written drivers.
    #[must_use]
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self::new(RowShape::new(names), values)
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.shape.names()
    }

    /// Get a value by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        self.shape
            .index_of(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column names of a result plus a name → index cache, cheap to clone.
#[derive(Debug, Clone)]
pub struct RowShape {
    names: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
}

impl RowShape {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        // first occurrence wins for duplicated column names
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self {
            names: Arc::new(names),
            index: Arc::new(index),
        }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn index_of(&self, column_name: &str) -> Option<usize> {
        self.index.get(column_name).copied()
    }
}

impl PartialEq for RowShape {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}
