//! Public types for the session state machines.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use shata_protocol::FileMetadata;
use shata_transfer::{ReceivedFile, SessionState, TransferProgress};

use crate::error::{ErrorKind, SessionError};

/// Progress snapshots a session queues for an unread consumer before newer
/// snapshots are dropped. Other events are never dropped.
pub const SESSION_EVENT_CAPACITY: usize = 64;

/// Events emitted by a session for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session moved to a new lifecycle state.
    StateChanged(SessionState),
    /// The sender registered under this pairing code.
    CodeAssigned(String),
    /// The receiver learned what it is about to receive.
    MetadataReceived(FileMetadata),
    /// Progress after a chunk. Dropped rather than queued when the consumer lags.
    Progress(TransferProgress),
    /// The transfer finished. The receiver attaches the file.
    Completed(Option<ReceivedFile>),
    /// The session failed and is now in `Error`.
    Failed { kind: ErrorKind, message: String },
}

impl SessionEvent {
    pub(crate) fn failed(err: &SessionError) -> Self {
        SessionEvent::Failed {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}

/// Producer half of a session's event stream.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
    queued_progress: Arc<AtomicUsize>,
    progress_capacity: usize,
}

/// Events of one session, in emission order.
///
/// Lifecycle events are always delivered. Progress snapshots are bounded: while
/// `SESSION_EVENT_CAPACITY` of them sit unread, newer ones are dropped.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    queued_progress: Arc<AtomicUsize>,
}

pub(crate) fn event_channel(progress_capacity: usize) -> (EventSender, SessionEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queued_progress = Arc::new(AtomicUsize::new(0));
    (
        EventSender {
            tx,
            queued_progress: queued_progress.clone(),
            progress_capacity,
        },
        SessionEvents {
            rx,
            queued_progress,
        },
    )
}

impl EventSender {
    pub(crate) fn emit(&self, event: SessionEvent) {
        if matches!(event, SessionEvent::Progress(_)) {
            let reserved = self
                .queued_progress
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < self.progress_capacity).then_some(n + 1)
                })
                .is_ok();
            if !reserved {
                return;
            }
        }
        // A dropped consumer means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl SessionEvents {
    /// Waits for the next event. Returns `None` once the session is dropped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        let event = self.rx.recv().await?;
        Some(self.consumed(event))
    }

    pub fn try_recv(&mut self) -> Result<SessionEvent, TryRecvError> {
        self.rx.try_recv().map(|event| self.consumed(event))
    }

    fn consumed(&self, event: SessionEvent) -> SessionEvent {
        if matches!(event, SessionEvent::Progress(_)) {
            self.queued_progress.fetch_sub(1, Ordering::AcqRel);
        }
        event
    }
}
