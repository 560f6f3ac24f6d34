use crate::error::{CepError, Result};
use crate::value::{Value, ValueKind};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Ordered field layout of an event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeSchema {
    fields: IndexMap<String, ValueKind>,
}

impl EventTypeSchema {
    pub fn builder() -> EventTypeSchemaBuilder {
        EventTypeSchemaBuilder::default()
    }

    /// Build a schema from `(field, type name)` pairs such as `("Price", "double")`.
    pub fn from_type_names<'a, I>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut builder = Self::builder();
        for (name, type_name) in fields {
            builder = builder.field(name, type_name.parse::<ValueKind>()?);
        }
        builder.build()
    }

    pub fn field_kind(&self, name: &str) -> Option<ValueKind> {
        self.fields.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, ValueKind)> {
        self.fields.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct EventTypeSchemaBuilder {
    fields: Vec<(String, ValueKind)>,
}

impl EventTypeSchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.fields.push((name.into(), kind));
        self
    }

    /// Rejects empty field lists, blank names and duplicated names.
    pub fn build(self) -> Result<EventTypeSchema> {
        let invalid = |reason: String| CepError::InvalidSchema {
            name: String::new(),
            reason,
        };

        if self.fields.is_empty() {
            return Err(invalid("schema declares no fields".to_string()));
        }

        let mut fields = IndexMap::with_capacity(self.fields.len());
        for (name, kind) in self.fields {
            if name.trim().is_empty() {
                return Err(invalid("field names must not be blank".to_string()));
            }
            if fields.insert(name.clone(), kind).is_some() {
                return Err(invalid(format!("field '{}' is declared twice", name)));
            }
        }

        Ok(EventTypeSchema { fields })
    }
}

/// Field values offered to [`crate::CEPEngine::send`], before validation
#[derive(Debug, Clone, Default)]
pub struct FieldValues {
    values: Vec<(String, Value)>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.push((name.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for FieldValues {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut values = FieldValues::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }
}

/// An immutable, validated event stamped with its arrival time
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    type_name: Arc<str>,
    fields: IndexMap<String, Value>,
    timestamp: i64,
    sequence: u64,
}

/// Events are shared between the windows of every statement that admits them.
pub type SharedEvent = Arc<Event>;

impl Event {
    pub(crate) fn new(
        type_name: Arc<str>,
        fields: IndexMap<String, Value>,
        timestamp: i64,
        sequence: u64,
    ) -> Self {
        Self {
            type_name,
            fields,
            timestamp,
            sequence,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Arrival timestamp assigned by the engine, in milliseconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Arrival order among events, breaks timestamp ties
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.type_name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}
