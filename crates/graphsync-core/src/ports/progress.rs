//! Progress reporting port

use crate::domain::ProgressEvent;

/// Sink for transfer progress
///
/// Implementations must be cheap and non-blocking: they are called from
/// transfer workers while bytes are in flight.
pub trait IProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}
