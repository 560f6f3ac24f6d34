use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

// Representing one projected output row of a statement.
//
// A column holds `None` when an aggregate has no value yet, e.g. the max of an empty window.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub columns: IndexMap<String, Option<Value>>,
    pub timestamp: i64,
}

impl ResultRow {
    pub fn new(columns: IndexMap<String, Option<Value>>, ts: i64) -> Self {
        Self {
            columns,
            timestamp: ts,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn add(&mut self, column: impl Into<String>, value: Option<Value>) {
        self.columns.insert(column.into(), value);
    }

    /// The value of `column`, `None` if the column is absent or holds no value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column).and_then(Option::as_ref)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Some(value) => write!(f, "{}: {}", name, value)?,
                None => write!(f, "{}: null", name)?,
            }
        }
        Ok(())
    }
}
