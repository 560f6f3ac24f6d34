use cep_rs::{
    AggregateFunction, AggregationSpec, CEPEngine, CepError, EngineConfig, ErrorKind,
    EventTypeSchema, FieldMismatch, FieldValues, FilterExpr, ManualClock, Operator, ResultRow,
    StatementDefinition, StreamSelector, Value, ValueKind,
};
use std::sync::{Arc, Mutex};

type Updates = Arc<Mutex<Vec<(Vec<ResultRow>, Vec<ResultRow>)>>>;

fn trade_schema() -> EventTypeSchema {
    EventTypeSchema::builder()
        .field("Symbol", ValueKind::String)
        .field("Price", ValueKind::Float)
        .field("Quantity", ValueKind::Integer)
        .build()
        .unwrap()
}

fn trade(symbol: &str, price: f64, quantity: i64) -> FieldValues {
    FieldValues::new()
        .with("Symbol", symbol)
        .with("Price", price)
        .with("Quantity", quantity)
}

fn engine_with_clock(clock: &ManualClock) -> CEPEngine {
    let config = EngineConfig::new("test")
        .with_clock(clock.clone())
        .add_event_type("TradeEvent", trade_schema());
    CEPEngine::with_config(config).unwrap()
}

fn record(engine: &CEPEngine, id: cep_rs::StatementId) -> Updates {
    let updates: Updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    engine
        .add_listener(id, move |new_rows, old_rows| {
            sink.lock()
                .unwrap()
                .push((new_rows.to_vec(), old_rows.to_vec()));
            Ok(())
        })
        .unwrap();
    updates
}

#[test]
fn test_register_event_type_is_idempotent() {
    let engine = CEPEngine::new();
    engine.register_event_type("TradeEvent", trade_schema()).unwrap();
    engine.register_event_type("TradeEvent", trade_schema()).unwrap();

    let other = EventTypeSchema::builder()
        .field("Symbol", ValueKind::String)
        .build()
        .unwrap();
    let err = engine.register_event_type("TradeEvent", other).unwrap_err();
    assert!(matches!(err, CepError::DuplicateType(ref name) if name == "TradeEvent"));

    // The original schema is still in place
    assert_eq!(engine.event_type("TradeEvent").unwrap().len(), 3);
}

#[test]
fn test_send_rejects_unknown_type_and_bad_fields() {
    let engine = CEPEngine::new();
    engine.register_event_type("TradeEvent", trade_schema()).unwrap();

    let err = engine.send("QuoteEvent", trade("GOOG", 1.0, 1)).unwrap_err();
    assert!(matches!(err, CepError::UnknownType(_)));
    assert_eq!(err.kind(), ErrorKind::Schema);

    let values = FieldValues::new()
        .with("Symbol", 7)
        .with("Price", 1.0)
        .with("Volume", 3);
    let err = engine.send("TradeEvent", values).unwrap_err();
    let CepError::SchemaMismatch { mismatches, .. } = err else {
        panic!("expected a schema mismatch");
    };
    assert!(mismatches.contains(&FieldMismatch::Unexpected("Volume".to_string())));
    assert!(mismatches.contains(&FieldMismatch::Missing("Quantity".to_string())));
    assert!(mismatches.contains(&FieldMismatch::WrongKind {
        field: "Symbol".to_string(),
        expected: ValueKind::String,
        actual: ValueKind::Integer,
    }));

    let err = engine
        .send("TradeEvent", trade("GOOG", f64::NAN, 1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn test_integer_price_is_widened() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine
        .register_statement(StatementDefinition::new("TradeEvent"))
        .unwrap();
    let updates = record(&engine, id);

    let values = FieldValues::new()
        .with("Symbol", "GOOG")
        .with("Price", 700)
        .with("Quantity", 100);
    engine.send("TradeEvent", values).unwrap();

    let updates = updates.lock().unwrap();
    assert_eq!(updates[0].0[0].get("Price"), Some(&Value::Float(700.0)));
}

#[test]
fn test_filter_statement_delivers_only_matching_trades() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine
        .create_epl("select * from TradeEvent where Price > 700.0")
        .unwrap();
    let updates = record(&engine, id);

    engine.send("TradeEvent", trade("GOOG", 650.0, 100)).unwrap();
    assert!(updates.lock().unwrap().is_empty());

    engine.send("TradeEvent", trade("GOOG", 705.0, 200)).unwrap();
    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 1);

    let (new_rows, old_rows) = &updates[0];
    assert!(old_rows.is_empty());
    assert_eq!(new_rows.len(), 1);
    assert_eq!(new_rows[0].get("Symbol"), Some(&Value::from("GOOG")));
    assert_eq!(new_rows[0].get_f64("Price"), Some(705.0));
    assert_eq!(new_rows[0].get("Quantity"), Some(&Value::Integer(200)));
}

#[test]
fn test_sliding_window_reports_expired_trade_and_max() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine
        .create_epl("select irstream *, max(Price) from TradeEvent.win:time(5 sec)")
        .unwrap();
    let updates = record(&engine, id);

    for (time, price) in [(0, 1.0), (1000, 2.0), (2000, 3.0), (6000, 4.0)] {
        clock.set(time);
        engine.send("TradeEvent", trade("GOOG", price, 100)).unwrap();
    }

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 4);

    let maxima: Vec<Option<f64>> = updates
        .iter()
        .map(|(new_rows, _)| new_rows[0].get_f64("max(Price)"))
        .collect();
    assert_eq!(maxima, vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
    assert!(updates[..3].iter().all(|(_, old_rows)| old_rows.is_empty()));

    let (new_rows, old_rows) = &updates[3];
    assert_eq!(new_rows.len(), 1);
    assert_eq!(new_rows[0].timestamp, 6000);
    assert_eq!(old_rows.len(), 1);
    assert_eq!(old_rows[0].get_f64("Price"), Some(1.0));
    assert_eq!(old_rows[0].timestamp, 0);
    assert_eq!(old_rows[0].get_f64("max(Price)"), Some(4.0));

    let statement = engine.statement(id).unwrap();
    let prices: Vec<f64> = statement
        .window_events()
        .iter()
        .filter_map(|event| event.get_f64("Price"))
        .collect();
    assert_eq!(prices, vec![2.0, 3.0, 4.0]);
}

#[test]
fn test_max_recovers_after_maximum_expires() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine
        .register_statement(
            StatementDefinition::new("TradeEvent")
                .select_all()
                .aggregate(AggregationSpec::new(AggregateFunction::Max, "Price"))
                .time_window(5000),
        )
        .unwrap();

    for (time, price) in [(0, 9.0), (1000, 2.0), (2000, 7.0)] {
        clock.set(time);
        engine.send("TradeEvent", trade("GOOG", price, 1)).unwrap();
    }
    let statement = engine.statement(id).unwrap();
    assert_eq!(statement.current_aggregate(), Some(Value::Float(9.0)));

    clock.set(5500);
    engine.tick().unwrap();
    assert_eq!(statement.current_aggregate(), Some(Value::Float(7.0)));

    clock.set(20_000);
    engine.tick().unwrap();
    assert_eq!(statement.window_len(), 0);
    assert_eq!(statement.current_aggregate(), None);
}

#[test]
fn test_zero_width_window_holds_one_event() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine
        .register_statement(StatementDefinition::new("TradeEvent").time_window(0))
        .unwrap();
    let updates = record(&engine, id);

    engine.send("TradeEvent", trade("GOOG", 1.0, 1)).unwrap();
    engine.send("TradeEvent", trade("GOOG", 2.0, 1)).unwrap();
    clock.set(1);
    engine.send("TradeEvent", trade("GOOG", 3.0, 1)).unwrap();

    assert_eq!(engine.statement(id).unwrap().window_len(), 1);

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 3);
    for (index, (new_rows, old_rows)) in updates.iter().enumerate().skip(1) {
        assert_eq!(new_rows.len(), 1);
        assert_eq!(old_rows.len(), 1);
        assert_eq!(old_rows[0].get_f64("Price"), Some(index as f64));
    }
}

#[test]
fn test_tick_expires_without_new_events() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine
        .create_epl("select rstream Symbol, Price from TradeEvent.win:time(1 sec)")
        .unwrap();
    let updates = record(&engine, id);

    engine.send("TradeEvent", trade("GOOG", 1.0, 1)).unwrap();
    assert!(updates.lock().unwrap().is_empty());

    clock.set(500);
    assert_eq!(engine.tick().unwrap(), 500);
    assert!(updates.lock().unwrap().is_empty());

    clock.set(2000);
    engine.tick().unwrap();
    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].0.is_empty());
    assert_eq!(updates[0].1[0].get_f64("Price"), Some(1.0));
    assert_eq!(updates[0].1[0].len(), 2);
}

#[test]
fn test_istream_and_aggregate_without_window() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine
        .register_statement(
            StatementDefinition::new("TradeEvent")
                .select_field("Symbol")
                .aggregate_as(AggregationSpec::new(AggregateFunction::Sum, "Quantity"), "total")
                .where_expr(FilterExpr::compare("Symbol", Operator::Eq, "GOOG"))
                .stream(StreamSelector::IStream),
        )
        .unwrap();
    let updates = record(&engine, id);

    engine.send("TradeEvent", trade("GOOG", 1.0, 100)).unwrap();
    engine.send("TradeEvent", trade("MSFT", 1.0, 500)).unwrap();
    engine.send("TradeEvent", trade("GOOG", 1.0, 200)).unwrap();

    let totals: Vec<Option<Value>> = updates
        .lock()
        .unwrap()
        .iter()
        .map(|(new_rows, _)| new_rows[0].get("total").cloned())
        .collect();
    assert_eq!(totals, vec![Some(Value::Integer(100)), Some(Value::Integer(300))]);
}

#[test]
fn test_unregister_stops_delivery_and_is_idempotent() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine.create_epl("select * from TradeEvent").unwrap();
    let updates = record(&engine, id);

    engine.send("TradeEvent", trade("GOOG", 1.0, 1)).unwrap();
    assert!(engine.unregister_statement(id));
    assert!(!engine.unregister_statement(id));
    assert!(engine.statement(id).is_none());
    assert!(engine.statement_ids().is_empty());

    engine.send("TradeEvent", trade("GOOG", 2.0, 1)).unwrap();
    assert_eq!(updates.lock().unwrap().len(), 1);

    let err = engine.add_listener(id, |_, _| Ok(())).unwrap_err();
    assert!(matches!(err, CepError::UnknownStatement(_)));
}

#[test]
fn test_failing_listener_does_not_block_others() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine.create_epl("select * from TradeEvent").unwrap();

    engine
        .add_listener(id, |_, _| Err("downstream unavailable".into()))
        .unwrap();
    engine
        .add_listener(id, |_, _| panic!("listener bug"))
        .unwrap();
    let updates = record(&engine, id);

    engine.send("TradeEvent", trade("GOOG", 1.0, 1)).unwrap();
    engine.send("TradeEvent", trade("GOOG", 2.0, 1)).unwrap();

    assert_eq!(updates.lock().unwrap().len(), 2);
    assert_eq!(engine.statement(id).unwrap().listener_count(), 3);
}

#[test]
fn test_subscribe_receives_updates() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let id = engine.create_epl("select Price from TradeEvent").unwrap();
    let receiver = engine.subscribe(id).unwrap();

    engine.send("TradeEvent", trade("GOOG", 42.0, 1)).unwrap();

    let update = receiver.try_recv().unwrap();
    assert_eq!(update.statement_id, id);
    assert_eq!(update.new_rows[0].get_f64("Price"), Some(42.0));
    assert!(update.old_rows.is_empty());

    // A dropped receiver only fails its own listener
    drop(receiver);
    engine.send("TradeEvent", trade("GOOG", 43.0, 1)).unwrap();
}

#[test]
fn test_statements_see_events_in_registration_order() {
    let clock = ManualClock::new(0);
    let engine = engine_with_clock(&clock);
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let id = engine
            .register_statement(StatementDefinition::new("TradeEvent").named(name))
            .unwrap();
        let order = order.clone();
        engine
            .add_listener(id, move |_, _| {
                order.lock().unwrap().push(name);
                Ok(())
            })
            .unwrap();
    }

    engine.send("TradeEvent", trade("GOOG", 1.0, 1)).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn test_invalid_statements_are_rejected() {
    let engine = CEPEngine::new();
    engine.register_event_type("TradeEvent", trade_schema()).unwrap();

    let err = engine.create_epl("select * from QuoteEvent").unwrap_err();
    assert!(matches!(err, CepError::UnknownType(_)));

    let err = engine.create_epl("select Volume from TradeEvent").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);

    let err = engine.create_epl("select avg(Symbol) from TradeEvent").unwrap_err();
    assert!(matches!(err, CepError::InvalidStatement(_)));

    let err = engine
        .create_epl("select * from TradeEvent where Symbol > 700.0")
        .unwrap_err();
    assert!(matches!(err, CepError::InvalidStatement(_)));

    let err = engine
        .create_epl("select * from TradeEvent where Price = 'GOOG'")
        .unwrap_err();
    assert!(matches!(err, CepError::InvalidStatement(_)));

    let err = engine
        .create_epl("select Price, max(Price) as Price from TradeEvent")
        .unwrap_err();
    assert!(matches!(err, CepError::InvalidStatement(_)));

    let err = engine.create_epl("delete from TradeEvent").unwrap_err();
    assert!(matches!(err, CepError::Parse(_)));

    assert!(engine.statement_ids().is_empty());
}
