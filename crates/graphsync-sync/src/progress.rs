//! Progress dispatch
//!
//! ```text
//! worker ──┐
//! worker ──┼──► unbounded queue ──► dispatch thread ──► registered callback
//! worker ──┘
//! ```
//!
//! All transfer workers feed one queue drained by a single dedicated
//! thread, so the registered callback is never invoked from two threads
//! at once. At most one callback is registered; registering again
//! replaces it and clearing it drops events until a new one arrives.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use graphsync_core::domain::{
    percent_of, GraphId, OperationId, ProgressEvent, RelativePath, TransferDirection,
};
use graphsync_core::ports::{ByteProgress, IProgressReporter};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Host callback receiving progress events
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

type CallbackSlot = Arc<RwLock<Option<ProgressCallback>>>;

/// Process-wide progress queue with a single consumer thread
///
/// The dispatch thread exits once the hub and every [`ProgressSender`]
/// have been dropped.
pub struct ProgressHub {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    callback: CallbackSlot,
}

impl ProgressHub {
    /// Start the dispatch thread
    ///
    /// # Errors
    /// Returns an error if the OS refuses to spawn the thread
    pub fn new() -> std::io::Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ProgressEvent>();
        let callback: CallbackSlot = Arc::new(RwLock::new(None));
        let slot = callback.clone();

        std::thread::Builder::new()
            .name("graphsync-progress".to_string())
            .spawn(move || {
                while let Some(event) = receiver.blocking_recv() {
                    let current = slot.read().ok().and_then(|guard| guard.clone());
                    match current {
                        Some(cb) => cb(event),
                        None => debug!(file = %event.file, "No progress callback registered"),
                    }
                }
                debug!("Progress dispatch thread exiting");
            })?;

        Ok(Self { sender, callback })
    }

    /// Register `callback`, replacing any previous one; `None` clears it
    pub fn set_callback(&self, callback: Option<ProgressCallback>) {
        match self.callback.write() {
            Ok(mut slot) => *slot = callback,
            Err(poisoned) => *poisoned.into_inner() = callback,
        }
    }

    #[must_use]
    pub fn has_callback(&self) -> bool {
        self.callback.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// A cloneable handle workers use to enqueue events
    #[must_use]
    pub fn sender(&self) -> ProgressSender {
        ProgressSender {
            sender: self.sender.clone(),
        }
    }
}

/// Producer side of the [`ProgressHub`] queue
#[derive(Debug, Clone)]
pub struct ProgressSender {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl IProgressReporter for ProgressSender {
    fn report(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            warn!("Progress dispatch thread is gone, dropping event");
        }
    }
}

// ============================================================================
// Per-transfer throttling
// ============================================================================

/// Byte counter for one transfer that reports on each new 10% step
///
/// Completion is always reported, exactly once.
pub struct TransferProgress {
    reporter: Arc<dyn IProgressReporter>,
    graph_id: GraphId,
    operation_id: OperationId,
    file: RelativePath,
    direction: TransferDirection,
    /// Last reported step + 1; 0 before the first report
    last_mark: AtomicU8,
}

impl TransferProgress {
    pub fn new(
        reporter: Arc<dyn IProgressReporter>,
        graph_id: GraphId,
        operation_id: OperationId,
        file: RelativePath,
        direction: TransferDirection,
    ) -> Arc<Self> {
        Arc::new(Self {
            reporter,
            graph_id,
            operation_id,
            file,
            direction,
            last_mark: AtomicU8::new(0),
        })
    }

    pub fn update(&self, done: u64, total: u64) {
        let mark = percent_of(done, total) / 10 + 1;
        if self.last_mark.fetch_max(mark, Ordering::AcqRel) < mark {
            self.reporter.report(ProgressEvent::new(
                self.graph_id,
                self.operation_id,
                self.file.clone(),
                self.direction,
                done,
                total,
            ));
        }
    }

    /// Adapter for the byte callbacks of the remote store
    pub fn byte_progress(self: &Arc<Self>) -> ByteProgress {
        let this = self.clone();
        Arc::new(move |done, total| this.update(done, total))
    }
}
