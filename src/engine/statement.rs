use crate::aggregation::{AggregationSpec, Aggregator};
use crate::engine::dispatch::{StatementUpdate, UpdateListener};
use crate::engine::{lock, read, write};
use crate::error::{CepError, Result};
use crate::event::{Event, EventTypeSchema, SharedEvent};
use crate::parsed_statement::{
    FilterExpr, ParsedStatement, SelectItem, StreamSelector, WindowDefinition,
};
use crate::result_row::ResultRow;
use crate::value::Value;
use crate::window_entry::WindowEntry;
use crate::windowing::{TimeWindow, WindowDelta};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::error;

// count(*) counts events, so every event contributes the same placeholder value.
const COUNT_ALL_INPUT: Value = Value::Integer(1);

/// Identifier of a registered statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub u64);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt-{}", self.0)
    }
}

/// User supplied filter over an event
pub type Predicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Filter of a statement, either a parsed expression or a closure
#[derive(Clone)]
pub enum Filter {
    Expr(FilterExpr),
    Predicate(Predicate),
}

impl Filter {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Filter::Expr(expr) => expr.evaluate(event),
            Filter::Predicate(predicate) => predicate(event),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Expr(expr) => write!(f, "Expr({})", expr),
            Filter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Everything needed to register a continuous query.
///
/// An empty projection selects every field of the input type.
#[derive(Debug, Clone)]
pub struct StatementDefinition {
    pub name: Option<String>,
    pub input_type: String,
    pub stream: StreamSelector,
    pub projection: Vec<SelectItem>,
    pub filter: Option<Filter>,
    pub window: Option<WindowDefinition>,
}

impl StatementDefinition {
    pub fn new(input_type: impl Into<String>) -> Self {
        Self {
            name: None,
            input_type: input_type.into(),
            stream: StreamSelector::default(),
            projection: Vec::new(),
            filter: None,
            window: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn select_all(mut self) -> Self {
        self.projection.push(SelectItem::Wildcard);
        self
    }

    pub fn select_field(mut self, name: impl Into<String>) -> Self {
        self.projection.push(SelectItem::Field {
            name: name.into(),
            alias: None,
        });
        self
    }

    pub fn select_field_as(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.projection.push(SelectItem::Field {
            name: name.into(),
            alias: Some(alias.into()),
        });
        self
    }

    /// Add an aggregate column; a statement supports at most one.
    pub fn aggregate(mut self, spec: AggregationSpec) -> Self {
        self.projection
            .push(SelectItem::Aggregate { spec, alias: None });
        self
    }

    pub fn aggregate_as(mut self, spec: AggregationSpec, alias: impl Into<String>) -> Self {
        self.projection.push(SelectItem::Aggregate {
            spec,
            alias: Some(alias.into()),
        });
        self
    }

    pub fn where_expr(mut self, expr: FilterExpr) -> Self {
        self.filter = Some(Filter::Expr(expr));
        self
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Filter::Predicate(Arc::new(predicate)));
        self
    }

    /// Sliding time window of `width` milliseconds
    pub fn time_window(mut self, width: i64) -> Self {
        self.window = Some(WindowDefinition::time(width));
        self
    }

    pub fn time_window_duration(self, duration: Duration) -> Self {
        let width = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.time_window(width)
    }

    pub fn stream(mut self, stream: StreamSelector) -> Self {
        self.stream = stream;
        self
    }

    pub fn aggregation(&self) -> Option<&AggregationSpec> {
        self.projection.iter().find_map(|item| match item {
            SelectItem::Aggregate { spec, .. } => Some(spec),
            _ => None,
        })
    }
}

impl From<ParsedStatement> for StatementDefinition {
    fn from(parsed: ParsedStatement) -> Self {
        Self {
            name: None,
            input_type: parsed.input_type,
            stream: parsed.stream,
            projection: parsed.select,
            filter: parsed.filter.map(Filter::Expr),
            window: parsed.window,
        }
    }
}

struct StatementState {
    window: Option<TimeWindow>,
    aggregator: Option<Box<dyn Aggregator>>,
}

/// A registered continuous query.
///
/// Owns its window and aggregator; both are released when the statement is unregistered.
pub struct Statement {
    id: StatementId,
    name: String,
    definition: StatementDefinition,
    aggregation: Option<AggregationSpec>,
    state: Mutex<Option<StatementState>>,
    listeners: RwLock<Vec<UpdateListener>>,
    active: AtomicBool,
}

impl Statement {
    /// Validate `definition` against the schema of its input type and build the statement.
    pub(crate) fn compile(
        id: StatementId,
        mut definition: StatementDefinition,
        schema: &EventTypeSchema,
    ) -> Result<Self> {
        let invalid = |reason: String| CepError::InvalidStatement(reason);

        if definition.projection.is_empty() {
            definition.projection.push(SelectItem::Wildcard);
        }

        if let Some(Filter::Expr(expr)) = &definition.filter {
            for (field, literal) in expr.comparisons() {
                let Some(kind) = schema.field_kind(field) else {
                    return Err(invalid(format!(
                        "filter references unknown field '{}' of '{}'",
                        field, definition.input_type
                    )));
                };
                let literal_kind = literal.kind();
                if kind != literal_kind && !(kind.is_numeric() && literal_kind.is_numeric()) {
                    return Err(invalid(format!(
                        "filter compares {} field '{}' with {} literal {}",
                        kind, field, literal_kind, literal
                    )));
                }
            }
        }

        let mut aggregation = None;
        for item in &definition.projection {
            match item {
                SelectItem::Wildcard => {}
                SelectItem::Field { name, .. } => {
                    if !schema.contains(name) {
                        return Err(invalid(format!(
                            "unknown field '{}' of '{}'",
                            name, definition.input_type
                        )));
                    }
                }
                SelectItem::Aggregate { spec, .. } => {
                    if aggregation.replace(spec.clone()).is_some() {
                        return Err(invalid(
                            "at most one aggregate function per statement is supported"
                                .to_string(),
                        ));
                    }
                }
            }
        }

        let mut columns = HashSet::new();
        for item in &definition.projection {
            let names: Vec<String> = match item {
                SelectItem::Wildcard => {
                    schema.fields().map(|(name, _)| name.to_string()).collect()
                }
                SelectItem::Field { name, alias } => {
                    vec![alias.clone().unwrap_or_else(|| name.clone())]
                }
                SelectItem::Aggregate { spec, alias } => {
                    vec![alias.clone().unwrap_or_else(|| spec.column_name())]
                }
            };
            for name in names {
                if !columns.insert(name.clone()) {
                    return Err(invalid(format!("duplicate output column '{}'", name)));
                }
            }
        }

        let mut aggregator = None;
        if let Some(spec) = &aggregation {
            let kind = match &spec.field {
                Some(field) => Some(schema.field_kind(field).ok_or_else(|| {
                    invalid(format!(
                        "aggregate {} references unknown field '{}'",
                        spec, field
                    ))
                })?),
                None => None,
            };
            if spec.function.requires_numeric() && !kind.is_some_and(|k| k.is_numeric()) {
                return Err(invalid(format!("{} requires a numeric field", spec)));
            }
            aggregator = Some(spec.create_aggregator(kind));
        }

        let name = definition
            .name
            .clone()
            .unwrap_or_else(|| id.to_string());

        let window = match definition.window {
            Some(window) if window.width < 0 => {
                return Err(invalid(format!(
                    "window length must not be negative, got {}",
                    window.width
                )));
            }
            Some(window) => Some(TimeWindow::new(
                format!("{}:{}", name, definition.input_type),
                window.width,
            )),
            None => None,
        };

        Ok(Self {
            id,
            name,
            definition,
            aggregation,
            state: Mutex::new(Some(StatementState { window, aggregator })),
            listeners: RwLock::new(Vec::new()),
            active: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> StatementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_type(&self) -> &str {
        &self.definition.input_type
    }

    pub fn definition(&self) -> &StatementDefinition {
        &self.definition
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        read(&self.listeners).len()
    }

    /// Events currently held by the window, oldest first. Empty for unwindowed statements.
    pub fn window_events(&self) -> Vec<SharedEvent> {
        lock(&self.state)
            .as_ref()
            .and_then(|state| state.window.as_ref())
            .map(|window| window.entries().map(|entry| entry.event.clone()).collect())
            .unwrap_or_default()
    }

    pub fn window_len(&self) -> usize {
        lock(&self.state)
            .as_ref()
            .and_then(|state| state.window.as_ref())
            .map_or(0, TimeWindow::len)
    }

    /// Current aggregate value, `None` without an aggregate or without a value
    pub fn current_aggregate(&self) -> Option<Value> {
        lock(&self.state)
            .as_ref()
            .and_then(|state| state.aggregator.as_ref())
            .and_then(|aggregator| aggregator.current())
    }

    pub(crate) fn add_listener(&self, listener: UpdateListener) {
        write(&self.listeners).push(listener);
    }

    /// Snapshot of the listener list; registering during delivery affects the next update.
    pub(crate) fn listeners(&self) -> Vec<UpdateListener> {
        read(&self.listeners).clone()
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        lock(&self.state).take();
        write(&self.listeners).clear();
    }

    /// Evaluate `event` arriving at `timestamp`.
    pub(crate) fn process(
        &self,
        event: &SharedEvent,
        timestamp: i64,
    ) -> Result<Option<StatementUpdate>> {
        let mut guard = lock(&self.state);
        let Some(state) = guard.as_mut() else {
            return Ok(None);
        };

        let matches = self
            .definition
            .filter
            .as_ref()
            .is_none_or(|filter| filter.matches(event));

        let delta = match state.window.as_mut() {
            Some(window) if matches => window.tick(event.clone(), timestamp),
            Some(window) => window.expire(timestamp),
            None if matches => WindowDelta {
                evicted: Vec::new(),
                inserted: Some(WindowEntry::new(event.clone(), timestamp)),
            },
            None => return Ok(None),
        };

        self.apply(state, delta)
    }

    /// Expire window contents at `timestamp` without a triggering event.
    pub(crate) fn advance_time(&self, timestamp: i64) -> Result<Option<StatementUpdate>> {
        let mut guard = lock(&self.state);
        let Some(state) = guard.as_mut() else {
            return Ok(None);
        };
        let Some(window) = state.window.as_mut() else {
            return Ok(None);
        };

        let delta = window.expire(timestamp);
        self.apply(state, delta)
    }

    fn apply(
        &self,
        state: &mut StatementState,
        delta: WindowDelta,
    ) -> Result<Option<StatementUpdate>> {
        if delta.is_empty() {
            return Ok(None);
        }

        // Removals precede the insertion, matching the window's own order.
        if let Some(aggregator) = state.aggregator.as_mut() {
            for entry in &delta.evicted {
                if let Some(value) = self.aggregate_input(&entry.event) {
                    aggregator.on_remove(&value).inspect_err(|e| {
                        error!(statement = %self.id, error = %e, "Aggregate out of sync with window");
                    })?;
                }
            }
            if let Some(entry) = &delta.inserted {
                if let Some(value) = self.aggregate_input(&entry.event) {
                    aggregator.on_insert(&value);
                }
            }
        }

        let aggregate = state
            .aggregator
            .as_ref()
            .and_then(|aggregator| aggregator.current());

        let new_rows: Vec<ResultRow> = if self.definition.stream.includes_new() {
            delta
                .inserted
                .iter()
                .map(|entry| self.project(entry, aggregate.as_ref()))
                .collect()
        } else {
            Vec::new()
        };

        let old_rows: Vec<ResultRow> = if self.definition.stream.includes_old() {
            delta
                .evicted
                .iter()
                .map(|entry| self.project(entry, aggregate.as_ref()))
                .collect()
        } else {
            Vec::new()
        };

        let update = StatementUpdate {
            statement_id: self.id,
            new_rows,
            old_rows,
        };
        Ok((!update.is_empty()).then_some(update))
    }

    fn aggregate_input(&self, event: &Event) -> Option<Value> {
        let spec = self.aggregation.as_ref()?;
        match &spec.field {
            Some(field) => event.get(field).cloned(),
            None => Some(COUNT_ALL_INPUT),
        }
    }

    fn project(&self, entry: &WindowEntry, aggregate: Option<&Value>) -> ResultRow {
        let event = &entry.event;
        let mut columns = IndexMap::new();

        for item in &self.definition.projection {
            match item {
                SelectItem::Wildcard => {
                    for (name, value) in event.fields() {
                        columns.insert(name.to_string(), Some(value.clone()));
                    }
                }
                SelectItem::Field { name, alias } => {
                    columns.insert(
                        alias.clone().unwrap_or_else(|| name.clone()),
                        event.get(name).cloned(),
                    );
                }
                SelectItem::Aggregate { spec, alias } => {
                    columns.insert(
                        alias.clone().unwrap_or_else(|| spec.column_name()),
                        aggregate.cloned(),
                    );
                }
            }
        }

        ResultRow::new(columns, entry.timestamp)
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("definition", &self.definition)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
