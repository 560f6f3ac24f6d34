use crate::aggregation::AggregationSpec;
use crate::event::Event;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// Which rows of the insert/remove stream a statement delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamSelector {
    /// Inserted rows only
    IStream,
    /// Removed rows only
    RStream,
    /// Both inserted and removed rows
    #[default]
    IRStream,
}

impl StreamSelector {
    pub fn includes_new(&self) -> bool {
        matches!(self, StreamSelector::IStream | StreamSelector::IRStream)
    }

    pub fn includes_old(&self) -> bool {
        matches!(self, StreamSelector::RStream | StreamSelector::IRStream)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            "=" | "==" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            _ => None,
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
        }
    }
}

/// Boolean filter over the fields of one event
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare {
        field: String,
        op: Operator,
        value: Value,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    pub fn compare(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        FilterExpr::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn and(self, other: FilterExpr) -> Self {
        FilterExpr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: FilterExpr) -> Self {
        FilterExpr::Or(Box::new(self), Box::new(other))
    }

    /// Missing fields and incomparable kinds evaluate to false.
    pub fn evaluate(&self, event: &Event) -> bool {
        match self {
            FilterExpr::Compare { field, op, value } => event
                .get(field)
                .and_then(|actual| actual.partial_compare(value))
                .is_some_and(|ordering| op.holds(ordering)),
            FilterExpr::And(left, right) => left.evaluate(event) && right.evaluate(event),
            FilterExpr::Or(left, right) => left.evaluate(event) || right.evaluate(event),
        }
    }

    /// Every `(field, literal)` pair the expression compares
    pub fn comparisons(&self) -> Vec<(&str, &Value)> {
        match self {
            FilterExpr::Compare { field, value, .. } => vec![(field.as_str(), value)],
            FilterExpr::And(left, right) | FilterExpr::Or(left, right) => {
                let mut comparisons = left.comparisons();
                comparisons.extend(right.comparisons());
                comparisons
            }
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Compare { field, op, value } => match value {
                Value::String(s) => write!(f, "{} {} '{}'", field, op.symbol(), s),
                other => write!(f, "{} {} {}", field, op.symbol(), other),
            },
            FilterExpr::And(left, right) => write!(f, "({} and {})", left, right),
            FilterExpr::Or(left, right) => write!(f, "({} or {})", left, right),
        }
    }
}

/// One entry of a select list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Field {
        name: String,
        alias: Option<String>,
    },
    Aggregate {
        spec: AggregationSpec,
        alias: Option<String>,
    },
}

/// A time window over the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDefinition {
    /// Window length in milliseconds
    pub width: i64,
}

impl WindowDefinition {
    pub fn time(width: i64) -> Self {
        Self { width }
    }
}

/// Result of parsing statement text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub stream: StreamSelector,
    pub select: Vec<SelectItem>,
    pub input_type: String,
    pub window: Option<WindowDefinition>,
    pub filter: Option<FilterExpr>,
}

impl ParsedStatement {
    pub fn aggregation(&self) -> Option<&AggregationSpec> {
        self.select.iter().find_map(|item| match item {
            SelectItem::Aggregate { spec, .. } => Some(spec),
            _ => None,
        })
    }
}
