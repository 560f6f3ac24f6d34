use crate::error::{CepError, Result};
use crate::value::{OrderedValue, Value, ValueKind};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::str::FromStr;

/// Aggregate functions a statement may compute over its window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Max,
    Min,
    Sum,
    Avg,
    Count,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Max => "max",
            AggregateFunction::Min => "min",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Count => "count",
        }
    }

    pub fn requires_numeric(&self) -> bool {
        matches!(self, AggregateFunction::Sum | AggregateFunction::Avg)
    }
}

impl FromStr for AggregateFunction {
    type Err = CepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(AggregateFunction::Max),
            "min" => Ok(AggregateFunction::Min),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "count" => Ok(AggregateFunction::Count),
            other => Err(CepError::Parse(format!(
                "unknown aggregate function '{}'",
                other
            ))),
        }
    }
}

/// An aggregate over one field (or over whole events for `count(*)`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSpec {
    pub function: AggregateFunction,
    pub field: Option<String>,
}

impl AggregationSpec {
    pub fn new(function: AggregateFunction, field: impl Into<String>) -> Self {
        Self {
            function,
            field: Some(field.into()),
        }
    }

    pub fn count_all() -> Self {
        Self {
            function: AggregateFunction::Count,
            field: None,
        }
    }

    /// Output column name, e.g. `max(Price)`
    pub fn column_name(&self) -> String {
        format!(
            "{}({})",
            self.function.name(),
            self.field.as_deref().unwrap_or("*")
        )
    }

    /// Create the incremental aggregator for a field of kind `kind`.
    pub fn create_aggregator(&self, kind: Option<ValueKind>) -> Box<dyn Aggregator> {
        match self.function {
            AggregateFunction::Max => Box::new(ExtremeAggregator::max()),
            AggregateFunction::Min => Box::new(ExtremeAggregator::min()),
            AggregateFunction::Sum => Box::new(SumAggregator::new(kind, false)),
            AggregateFunction::Avg => Box::new(SumAggregator::new(kind, true)),
            AggregateFunction::Count => Box::new(CountAggregator::default()),
        }
    }
}

impl fmt::Display for AggregationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column_name())
    }
}

/// Incrementally maintained aggregate.
///
/// Driven by the same insert/remove stream as the window it belongs to, so removing a
/// value that was never inserted is an engine bug and reported as
/// [`CepError::InternalConsistency`].
pub trait Aggregator: Send {
    fn on_insert(&mut self, value: &Value);

    fn on_remove(&mut self, value: &Value) -> Result<()>;

    /// Current aggregate, `None` when there is no value
    fn current(&self) -> Option<Value>;

    /// Number of values currently contributing
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Max,
    Min,
}

/// Running max/min over a multiset of values.
///
/// `BTreeMap` provides O(log n) insert, removal of an arbitrary value and extreme lookup;
/// the map value counts duplicates.
#[derive(Debug)]
pub struct ExtremeAggregator {
    extreme: Extreme,
    values: BTreeMap<OrderedValue, usize>,
    len: usize,
}

impl ExtremeAggregator {
    pub fn max() -> Self {
        Self::new(Extreme::Max)
    }

    pub fn min() -> Self {
        Self::new(Extreme::Min)
    }

    fn new(extreme: Extreme) -> Self {
        Self {
            extreme,
            values: BTreeMap::new(),
            len: 0,
        }
    }
}

impl Aggregator for ExtremeAggregator {
    fn on_insert(&mut self, value: &Value) {
        *self.values.entry(OrderedValue(value.clone())).or_insert(0) += 1;
        self.len += 1;
    }

    fn on_remove(&mut self, value: &Value) -> Result<()> {
        match self.values.entry(OrderedValue(value.clone())) {
            Entry::Occupied(mut entry) => {
                let count = entry.get_mut();
                if *count > 1 {
                    *count -= 1;
                } else {
                    entry.remove();
                }
                self.len -= 1;
                Ok(())
            }
            Entry::Vacant(_) => Err(CepError::InternalConsistency(format!(
                "removed value {} is not held by the aggregate",
                value
            ))),
        }
    }

    fn current(&self) -> Option<Value> {
        let extreme = match self.extreme {
            Extreme::Max => self.values.last_key_value(),
            Extreme::Min => self.values.first_key_value(),
        };
        extreme.map(|(key, _)| key.0.clone())
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Running sum, or average when `average` is set.
///
/// Integer fields are summed exactly; float sums reset to zero whenever the window
/// empties so rounding drift does not accumulate across quiet periods.
#[derive(Debug)]
pub struct SumAggregator {
    integral: bool,
    average: bool,
    int_sum: i128,
    float_sum: f64,
    count: usize,
}

impl SumAggregator {
    pub fn new(kind: Option<ValueKind>, average: bool) -> Self {
        Self {
            integral: kind == Some(ValueKind::Integer),
            average,
            int_sum: 0,
            float_sum: 0.0,
            count: 0,
        }
    }

    fn total(&self) -> f64 {
        if self.integral {
            self.int_sum as f64
        } else {
            self.float_sum
        }
    }
}

impl Aggregator for SumAggregator {
    fn on_insert(&mut self, value: &Value) {
        match value {
            Value::Integer(n) => self.int_sum += *n as i128,
            other => self.float_sum += other.as_f64().unwrap_or(0.0),
        }
        self.count += 1;
    }

    fn on_remove(&mut self, value: &Value) -> Result<()> {
        if self.count == 0 {
            return Err(CepError::InternalConsistency(format!(
                "removed value {} from an empty sum",
                value
            )));
        }
        match value {
            Value::Integer(n) => self.int_sum -= *n as i128,
            other => self.float_sum -= other.as_f64().unwrap_or(0.0),
        }
        self.count -= 1;
        if self.count == 0 {
            self.int_sum = 0;
            self.float_sum = 0.0;
        }
        Ok(())
    }

    fn current(&self) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        if self.average {
            return Some(Value::Float(self.total() / self.count as f64));
        }
        if self.integral {
            Some(
                i64::try_from(self.int_sum)
                    .map(Value::Integer)
                    .unwrap_or(Value::Float(self.int_sum as f64)),
            )
        } else {
            Some(Value::Float(self.float_sum))
        }
    }

    fn len(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Default)]
pub struct CountAggregator {
    count: usize,
}

impl Aggregator for CountAggregator {
    fn on_insert(&mut self, _value: &Value) {
        self.count += 1;
    }

    fn on_remove(&mut self, value: &Value) -> Result<()> {
        if self.count == 0 {
            return Err(CepError::InternalConsistency(format!(
                "removed value {} from an empty count",
                value
            )));
        }
        self.count -= 1;
        Ok(())
    }

    fn current(&self) -> Option<Value> {
        Some(Value::Integer(self.count as i64))
    }

    fn len(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_tracks_arbitrary_removal() {
        let mut max = ExtremeAggregator::max();
        assert_eq!(max.current(), None);

        for v in [5.0, 3.0, 7.0, 7.0, 1.0] {
            max.on_insert(&Value::Float(v));
        }
        assert_eq!(max.current(), Some(Value::Float(7.0)));

        max.on_remove(&Value::Float(7.0)).unwrap();
        assert_eq!(max.current(), Some(Value::Float(7.0)));
        max.on_remove(&Value::Float(7.0)).unwrap();
        assert_eq!(max.current(), Some(Value::Float(5.0)));
        max.on_remove(&Value::Float(3.0)).unwrap();
        assert_eq!(max.len(), 2);
    }

    #[test]
    fn test_min_over_integers() {
        let mut min = ExtremeAggregator::min();
        for v in [40, -2, 17] {
            min.on_insert(&Value::Integer(v));
        }
        assert_eq!(min.current(), Some(Value::Integer(-2)));
        min.on_remove(&Value::Integer(-2)).unwrap();
        assert_eq!(min.current(), Some(Value::Integer(17)));
    }

    #[test]
    fn test_remove_missing_value_is_inconsistent() {
        let mut max = ExtremeAggregator::max();
        max.on_insert(&Value::Float(1.0));
        let err = max.on_remove(&Value::Float(2.0)).unwrap_err();
        assert!(matches!(err, CepError::InternalConsistency(_)));
        assert_eq!(max.current(), Some(Value::Float(1.0)));

        let mut count = CountAggregator::default();
        assert!(count.on_remove(&Value::Integer(1)).is_err());
    }

    #[test]
    fn test_sum_and_avg() {
        let mut sum = SumAggregator::new(Some(ValueKind::Integer), false);
        let mut avg = SumAggregator::new(Some(ValueKind::Float), true);
        assert_eq!(sum.current(), None);
        assert_eq!(avg.current(), None);

        for v in [100, 200, 300] {
            sum.on_insert(&Value::Integer(v));
            avg.on_insert(&Value::Float(v as f64));
        }
        assert_eq!(sum.current(), Some(Value::Integer(600)));
        assert_eq!(avg.current(), Some(Value::Float(200.0)));

        sum.on_remove(&Value::Integer(100)).unwrap();
        avg.on_remove(&Value::Float(100.0)).unwrap();
        assert_eq!(sum.current(), Some(Value::Integer(500)));
        assert_eq!(avg.current(), Some(Value::Float(250.0)));
    }

    #[test]
    fn test_count_reports_zero_when_empty() {
        let mut count = AggregationSpec::count_all().create_aggregator(None);
        assert_eq!(count.current(), Some(Value::Integer(0)));
        count.on_insert(&Value::Boolean(true));
        assert_eq!(count.current(), Some(Value::Integer(1)));
    }

    #[test]
    fn test_column_names() {
        assert_eq!(
            AggregationSpec::new(AggregateFunction::Max, "Price").column_name(),
            "max(Price)"
        );
        assert_eq!(AggregationSpec::count_all().column_name(), "count(*)");
        assert_eq!(
            "AVG".parse::<AggregateFunction>().unwrap(),
            AggregateFunction::Avg
        );
    }
}
