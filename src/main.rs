use cep_rs::{CEPEngine, EngineConfig, EventTypeSchema, FieldValues, ResultRow, ValueKind};
use clap::{Parser, ValueEnum};
use rand::Rng;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Demo {
    /// Every trade passes through
    Simple,
    /// Only trades priced above 700
    Filter,
    /// Five second sliding window with a running max
    Sliding,
}

#[derive(Parser, Debug)]
#[command(name = "cep-rs", about = "Continuous queries over a generated trade stream")]
struct Args {
    /// Which statement to run
    #[arg(long, value_enum, default_value_t = Demo::Simple)]
    demo: Demo,

    /// Milliseconds between generated trades
    #[arg(long, default_value_t = 250, env = "CEP_INTERVAL_MS")]
    interval_ms: u64,

    /// Stop after this many trades instead of waiting for Enter
    #[arg(long)]
    count: Option<u64>,
}

impl Demo {
    fn statement(&self) -> &'static str {
        match self {
            Demo::Simple => "select * from TradeEvent",
            Demo::Filter => "select * from TradeEvent where Price > 700.0",
            Demo::Sliding => "select irstream *, max(Price) from TradeEvent.win:time(5 sec)",
        }
    }

    /// Price and quantity of the `sequence`-th generated trade
    fn trade(&self, sequence: u64, rng: &mut impl Rng) -> (f64, i64) {
        match self {
            Demo::Sliding => {
                let sin = (sequence as f64).to_radians().sin();
                (700.0 + (100.0 * sin).round(), 100 + (100.0 * sin).round() as i64)
            }
            _ => {
                let price = 700.0 + (rng.gen_range(0.0..10.0_f64) * 10.0).round() / 10.0;
                (price, 100 + rng.gen_range(1..10) * 100)
            }
        }
    }
}

fn print_rows(prefix: &str, rows: &[ResultRow]) {
    for row in rows {
        println!("{} TradeEvent - {}", prefix, row);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cep_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let schema = EventTypeSchema::builder()
        .field("Symbol", ValueKind::String)
        .field("Price", ValueKind::Float)
        .field("Quantity", ValueKind::Integer)
        .build()?;
    let config = EngineConfig::new("demo").add_event_type("TradeEvent", schema);
    let engine = Arc::new(CEPEngine::with_config(config)?);

    let statement = engine.create_epl(args.demo.statement())?;
    engine.add_listener(statement, |new_rows, old_rows| {
        print_rows("<<", old_rows);
        print_rows(">>", new_rows);
        Ok(())
    })?;

    info!(demo = ?args.demo, statement = args.demo.statement(), "Starting demo");

    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let engine = engine.clone();
        let running = running.clone();
        let demo = args.demo;
        let interval = Duration::from_millis(args.interval_ms);
        let count = args.count;

        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut sequence = 0;
            while running.load(Ordering::SeqCst) && count.is_none_or(|count| sequence < count) {
                let (price, quantity) = demo.trade(sequence, &mut rng);
                let trade = FieldValues::new()
                    .with("Symbol", "GOOG")
                    .with("Price", price)
                    .with("Quantity", quantity);
                if let Err(e) = engine.send("TradeEvent", trade) {
                    error!(error = %e, "Failed to send trade");
                    break;
                }
                sequence += 1;
                thread::sleep(interval);
            }
        })
    };

    if args.count.is_none() {
        println!("Press Enter to stop");
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        running.store(false, Ordering::SeqCst);
    }

    producer
        .join()
        .map_err(|_| "trade producer thread panicked")?;

    engine.unregister_statement(statement);
    Ok(())
}
