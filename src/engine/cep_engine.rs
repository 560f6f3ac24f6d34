use crate::config::{Clock, EngineConfig};
use crate::engine::dispatch::{self, ListenerResult, StatementUpdate};
use crate::engine::statement::{Statement, StatementDefinition, StatementId};
use crate::engine::{lock, read, write};
use crate::epl_parser::EplParser;
use crate::error::{CepError, Result};
use crate::event::{Event, EventTypeSchema, FieldValues};
use crate::registry::EventTypeRegistry;
use crate::result_row::ResultRow;
use std::cell::RefCell;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, mpsc};
use tracing::{debug, info};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Engines currently dispatching on this thread.
    static DISPATCHING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks an engine as dispatching on the current thread for the guard's lifetime.
struct DispatchGuard {
    engine_id: u64,
}

impl DispatchGuard {
    fn enter(engine_id: u64) -> Result<Self> {
        DISPATCHING.with(|engines| {
            let mut engines = engines.borrow_mut();
            if engines.contains(&engine_id) {
                return Err(CepError::ReentrantSend);
            }
            engines.push(engine_id);
            Ok(Self { engine_id })
        })
    }
}

fn is_dispatching(engine_id: u64) -> bool {
    DISPATCHING.with(|engines| engines.borrow().contains(&engine_id))
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|engines| {
            engines.borrow_mut().retain(|id| *id != self.engine_id);
        });
    }
}

/// Arrival order, owned by whoever holds the dispatch lock
struct DispatchState {
    sequence: u64,
}

impl DispatchState {
    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }
}

/// The main CEP (Complex Event Processing) Engine
///
/// `send` and `tick` are serialised: each event is processed to completion, through every
/// statement and listener, before the next one starts. Statements may be registered and
/// unregistered at any time, including from listeners; an in-flight dispatch keeps working
/// on the statement list it started with.
pub struct CEPEngine {
    id: u64,
    name: String,
    clock: Arc<dyn Clock>,
    registry: RwLock<EventTypeRegistry>,
    statements: RwLock<Arc<Vec<Arc<Statement>>>>,
    next_statement_id: AtomicU64,
    dispatch: Mutex<DispatchState>,
    // Written only while holding `dispatch`; readable from listeners.
    time: AtomicI64,
}

impl CEPEngine {
    /// Create an engine driven by the system clock
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Create an engine from `config`, registering its event types
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        let event_types = config.event_types.clone();
        let engine = Self::build(config);
        for (name, schema) in event_types {
            engine.register_event_type(&name, schema)?;
        }
        Ok(engine)
    }

    fn build(config: EngineConfig) -> Self {
        info!(engine = %config.name, "Creating CEP engine");
        Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            name: config.name,
            clock: config.clock,
            registry: RwLock::new(EventTypeRegistry::new()),
            statements: RwLock::new(Arc::new(Vec::new())),
            next_statement_id: AtomicU64::new(1),
            dispatch: Mutex::new(DispatchState { sequence: 0 }),
            time: AtomicI64::new(i64::MIN),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an event type; re-registering an identical schema is a no-op
    pub fn register_event_type(&self, name: &str, schema: EventTypeSchema) -> Result<()> {
        let mut registry = write(&self.registry);
        let known = registry.contains(name);
        registry.register(name, schema)?;
        if !known {
            info!(engine = %self.name, event_type = name, "Registered event type");
        }
        Ok(())
    }

    pub fn event_type(&self, name: &str) -> Result<Arc<EventTypeSchema>> {
        read(&self.registry).lookup(name)
    }

    /// Register a continuous query over its input type
    pub fn register_statement(&self, definition: StatementDefinition) -> Result<StatementId> {
        let schema = self.event_type(&definition.input_type)?;
        let id = StatementId(self.next_statement_id.fetch_add(1, Ordering::Relaxed));
        let statement = Arc::new(Statement::compile(id, definition, &schema)?);

        info!(
            engine = %self.name,
            statement = %id,
            name = statement.name(),
            input_type = statement.input_type(),
            "Registered statement"
        );

        let mut statements = write(&self.statements);
        let mut updated = statements.as_ref().clone();
        updated.push(statement);
        *statements = Arc::new(updated);
        Ok(id)
    }

    /// Parse statement text and register it, e.g.
    /// `select irstream *, max(Price) from TradeEvent.win:time(5 sec)`
    pub fn create_epl(&self, text: &str) -> Result<StatementId> {
        let parsed = EplParser::new(text.to_string()).parse()?;
        self.register_statement(parsed.into())
    }

    /// Stop all delivery for `id` and release its window and aggregate.
    ///
    /// Unknown or already removed ids are ignored. Returns whether a statement was removed.
    /// Called from another thread, it waits for the in-flight dispatch to finish; called from
    /// a listener, the remaining listeners of the statement are skipped.
    pub fn unregister_statement(&self, id: StatementId) -> bool {
        // The dispatching thread already holds the lock.
        let _dispatch = (!is_dispatching(self.id)).then(|| lock(&self.dispatch));

        let removed = {
            let mut statements = write(&self.statements);
            let Some(position) = statements.iter().position(|s| s.id() == id) else {
                return false;
            };
            let mut updated = statements.as_ref().clone();
            let removed = updated.remove(position);
            *statements = Arc::new(updated);
            removed
        };

        removed.deactivate();
        info!(engine = %self.name, statement = %id, "Unregistered statement");
        true
    }

    /// Append a listener to the statement's ordered listener list
    pub fn add_listener<F>(&self, id: StatementId, listener: F) -> Result<()>
    where
        F: Fn(&[ResultRow], &[ResultRow]) -> ListenerResult + Send + Sync + 'static,
    {
        let statement = self
            .statement(id)
            .ok_or(CepError::UnknownStatement(id.0))?;
        statement.add_listener(Arc::new(listener));
        Ok(())
    }

    /// Receive the statement's updates over a channel instead of a callback
    pub fn subscribe(&self, id: StatementId) -> Result<mpsc::Receiver<StatementUpdate>> {
        let (tx, rx) = mpsc::channel();
        self.add_listener(id, move |new_rows, old_rows| {
            tx.send(StatementUpdate {
                statement_id: id,
                new_rows: new_rows.to_vec(),
                old_rows: old_rows.to_vec(),
            })
            .map_err(|_| "subscriber disconnected".into())
        })?;
        Ok(rx)
    }

    /// Get a registered statement by id
    pub fn statement(&self, id: StatementId) -> Option<Arc<Statement>> {
        self.snapshot().iter().find(|s| s.id() == id).cloned()
    }

    /// Ids of all registered statements, in registration order
    pub fn statement_ids(&self) -> Vec<StatementId> {
        self.snapshot().iter().map(|s| s.id()).collect()
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Statement>>> {
        read(&self.statements).clone()
    }

    /// Engine time of the last dispatch, `None` before the first one
    pub fn current_time(&self) -> Option<i64> {
        let time = self.time.load(Ordering::SeqCst);
        (time != i64::MIN).then_some(time)
    }

    /// Engine time never goes backwards, even if the clock does.
    fn advance_time(&self, _dispatch: &DispatchState) -> i64 {
        let time = self.time.load(Ordering::SeqCst).max(self.clock.now());
        self.time.store(time, Ordering::SeqCst);
        time
    }

    /// Validate and stamp an event, then deliver it to every matching statement.
    ///
    /// Returns the event's arrival timestamp once all listeners have run. Schema and value
    /// errors reject the event before any state changes.
    pub fn send(&self, type_name: &str, values: FieldValues) -> Result<i64> {
        let _guard = DispatchGuard::enter(self.id)?;

        let (type_name, fields) = {
            let registry = read(&self.registry);
            let fields = registry.validate(type_name, &values)?;
            (registry.interned_name(type_name)?, fields)
        };

        let mut dispatch = lock(&self.dispatch);
        let timestamp = self.advance_time(&dispatch);
        let sequence = dispatch.next_sequence();
        let event = Arc::new(Event::new(type_name, fields, timestamp, sequence));

        debug!(engine = %self.name, %event, timestamp, sequence, "Received event");

        let statements = self.snapshot();
        for statement in statements
            .iter()
            .filter(|s| s.input_type() == event.type_name())
        {
            if !statement.is_active() {
                continue;
            }
            if let Some(update) = statement.process(&event, timestamp)? {
                dispatch::deliver(&update, &statement.listeners(), || statement.is_active());
            }
        }

        Ok(timestamp)
    }

    /// Advance engine time to the clock without an event, expiring window contents.
    ///
    /// Expired events are delivered as old rows. Returns the engine time.
    pub fn tick(&self) -> Result<i64> {
        let _guard = DispatchGuard::enter(self.id)?;

        let dispatch = lock(&self.dispatch);
        let timestamp = self.advance_time(&dispatch);

        let statements = self.snapshot();
        for statement in statements.iter().filter(|s| s.is_active()) {
            if let Some(update) = statement.advance_time(timestamp)? {
                dispatch::deliver(&update, &statement.listeners(), || statement.is_active());
            }
        }

        Ok(timestamp)
    }
}

impl Default for CEPEngine {
    fn default() -> Self {
        Self::new()
    }
}
