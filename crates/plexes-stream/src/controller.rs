use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{ControllerError, Result};
use crate::reason::Reason;

/// Mutation surface over one direction of data flow.
///
/// Implementations report misuse (signalling a finished stream) as a
/// [`ControllerError`] and never panic.
pub trait Controller<T> {
    /// Queue an item for the consumer.
    fn enqueue(&self, item: T) -> Result<()>;

    /// Fail the stream. Queued items are discarded.
    fn error(&self, reason: Option<Reason>) -> Result<()>;

    /// Finish the stream once queued items have been consumed.
    fn close(&self) -> Result<()>;

    /// Backpressure hint: how many more items the consumer is ready for.
    ///
    /// `None` when the stream has errored.
    fn desired_size(&self) -> Option<isize> {
        None
    }
}

/// Absorb a controller failure on a best-effort path.
///
/// Returns whether the operation went through.
pub fn settle(op: &'static str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::trace!(op, error = %err, "controller operation absorbed");
            false
        }
    }
}

/// Terminal status shared between a controller and its endpoint.
#[derive(Debug, Clone, Default)]
pub(crate) enum Flow {
    #[default]
    Open,
    Closed,
    Errored(Option<Reason>),
}

impl Flow {
    /// Error to report for an operation attempted in this state.
    pub(crate) fn check(&self) -> Result<()> {
        match self {
            Flow::Open => Ok(()),
            Flow::Closed => Err(ControllerError::Closed),
            Flow::Errored(reason) => Err(ControllerError::Errored(reason.clone())),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Flow::Open)
    }

    /// Move to `next` if still open; otherwise report why not.
    pub(crate) fn finish(&mut self, next: Flow) -> Result<()> {
        self.check()?;
        *self = next;
        Ok(())
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
