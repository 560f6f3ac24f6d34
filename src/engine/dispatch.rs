use crate::engine::StatementId;
use crate::result_row::ResultRow;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a listener invocation. Errors are logged by the engine and never abort delivery.
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Callback type receiving `(new rows, old rows)` for one statement
pub type UpdateListener = Arc<dyn Fn(&[ResultRow], &[ResultRow]) -> ListenerResult + Send + Sync>;

/// One result batch of a statement
#[derive(Debug, Clone, PartialEq)]
pub struct StatementUpdate {
    pub statement_id: StatementId,
    pub new_rows: Vec<ResultRow>,
    pub old_rows: Vec<ResultRow>,
}

impl StatementUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_rows.is_empty() && self.old_rows.is_empty()
    }
}

/// Invoke every listener once, in registration order, isolating failures.
///
/// `active` is checked before each listener; delivery stops as soon as it reports false.
/// Returns the number of listeners that failed.
pub(crate) fn deliver<F>(
    update: &StatementUpdate,
    listeners: &[UpdateListener],
    active: F,
) -> usize
where
    F: Fn() -> bool,
{
    let mut failures = 0;

    for (index, listener) in listeners.iter().enumerate() {
        if !active() {
            debug!(
                statement = %update.statement_id,
                skipped = listeners.len() - index,
                "Statement unregistered during delivery"
            );
            break;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            listener(&update.new_rows, &update.old_rows)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                warn!(
                    statement = %update.statement_id,
                    listener = index,
                    error = %e,
                    "Listener returned an error"
                );
            }
            Err(payload) => {
                failures += 1;
                warn!(
                    statement = %update.statement_id,
                    listener = index,
                    panic = panic_message(payload.as_ref()),
                    "Listener panicked"
                );
            }
        }
    }

    debug!(
        statement = %update.statement_id,
        new_rows = update.new_rows.len(),
        old_rows = update.old_rows.len(),
        listeners = listeners.len(),
        failures,
        "Dispatched update"
    );

    failures
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
