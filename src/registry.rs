use crate::error::{CepError, FieldMismatch, Result};
use crate::event::{EventTypeSchema, FieldValues};
use crate::value::{Value, ValueKind};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Event types known to an engine, by name
#[derive(Debug, Default)]
pub struct EventTypeRegistry {
    types: HashMap<Arc<str>, Arc<EventTypeSchema>>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` under `name`. Registering an identical schema again is a no-op.
    pub fn register(&mut self, name: &str, schema: EventTypeSchema) -> Result<()> {
        if name.trim().is_empty() {
            return Err(CepError::InvalidSchema {
                name: name.to_string(),
                reason: "event type name must not be blank".to_string(),
            });
        }

        match self.types.get(name) {
            Some(existing) if **existing == schema => Ok(()),
            Some(_) => Err(CepError::DuplicateType(name.to_string())),
            None => {
                self.types.insert(Arc::from(name), Arc::new(schema));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<EventTypeSchema>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| CepError::UnknownType(name.to_string()))
    }

    /// The interned name of a registered type, shared by every event of that type
    pub(crate) fn interned_name(&self, name: &str) -> Result<Arc<str>> {
        self.types
            .get_key_value(name)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| CepError::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types.keys().map(|name| name.to_string()).collect()
    }

    /// Check `values` against the schema of `name` and return them in schema order.
    ///
    /// Every offending field is reported at once. Integers offered for float fields are
    /// widened; NaN floats are rejected.
    pub fn validate(&self, name: &str, values: &FieldValues) -> Result<IndexMap<String, Value>> {
        let schema = self.lookup(name)?;
        let mut offered: HashMap<&str, &Value> = HashMap::with_capacity(values.len());
        let mut mismatches = Vec::new();

        for (field, value) in values.iter() {
            if !schema.contains(field) || offered.insert(field, value).is_some() {
                mismatches.push(FieldMismatch::Unexpected(field.to_string()));
            }
        }

        let mut validated = IndexMap::with_capacity(schema.len());
        for (field, expected) in schema.fields() {
            let Some(value) = offered.get(field) else {
                mismatches.push(FieldMismatch::Missing(field.to_string()));
                continue;
            };

            let value = match (expected, *value) {
                (ValueKind::Float, Value::Integer(n)) => Value::Float(*n as f64),
                (ValueKind::Float, Value::Float(n)) if n.is_nan() => {
                    return Err(CepError::InvalidValue {
                        field: field.to_string(),
                        reason: "NaN is not a valid value".to_string(),
                    });
                }
                (expected, value) if value.kind() == expected => value.clone(),
                (expected, value) => {
                    mismatches.push(FieldMismatch::WrongKind {
                        field: field.to_string(),
                        expected,
                        actual: value.kind(),
                    });
                    continue;
                }
            };
            validated.insert(field.to_string(), value);
        }

        if mismatches.is_empty() {
            Ok(validated)
        } else {
            Err(CepError::SchemaMismatch {
                type_name: name.to_string(),
                mismatches,
            })
        }
    }
}
