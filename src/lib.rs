mod aggregation;
mod config;
mod engine;
mod epl_parser;
mod error;
mod event;
mod parsed_statement;
mod registry;
mod result_row;
mod value;
mod window_entry;
mod windowing;

pub use aggregation::{
    AggregateFunction, AggregationSpec, Aggregator, CountAggregator, ExtremeAggregator,
    SumAggregator,
};
pub use config::{Clock, EngineConfig, ManualClock, SystemClock};
pub use engine::{
    CEPEngine, Filter, ListenerResult, Predicate, Statement, StatementDefinition, StatementId,
    StatementUpdate, UpdateListener,
};
pub use epl_parser::EplParser;
pub use error::{CepError, ErrorKind, FieldMismatch, Result};
pub use event::{Event, EventTypeSchema, EventTypeSchemaBuilder, FieldValues, SharedEvent};
pub use parsed_statement::{
    FilterExpr, Operator, ParsedStatement, SelectItem, StreamSelector, WindowDefinition,
};
pub use registry::EventTypeRegistry;
pub use result_row::ResultRow;
pub use value::{OrderedValue, Value, ValueKind};
pub use window_entry::WindowEntry;
pub use windowing::{TimeWindow, WindowDelta};
