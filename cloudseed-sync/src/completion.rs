//! Single-shot completion for event-driven record writes.
//!
//! Transports report a write through callbacks: one per saved record and one
//! for the batch as a whole. [`write_completion`] bridges those callbacks into
//! a future that resolves exactly once. Whichever callback fires first wins;
//! later calls are ignored. If every [`WriteCompletion`] handle is dropped
//! without reporting, the waiter receives an `OperationCancelled` error.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use cloudseed_core::{ErrorCode, RemoteError, RemoteRecord};

/// Why a low-level write did not produce a confirmed record.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteFailure {
    Remote(RemoteError),
    /// The batch succeeded but no per-record confirmation arrived.
    Unconfirmed,
}

pub type WriteResult = Result<RemoteRecord, WriteFailure>;

/// Callback side of a pending write, handed to the transport.
#[derive(Clone)]
pub struct WriteCompletion {
    inner: Arc<Slot>,
}

struct Slot {
    sender: Mutex<Option<oneshot::Sender<WriteResult>>>,
}

impl Slot {
    fn resolve(&self, result: WriteResult) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(sender) => {
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let sender = match self.sender.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            let _ = sender.send(Err(WriteFailure::Remote(cancelled())));
        }
    }
}

impl WriteCompletion {
    /// Per-record callback. Returns `false` if the write already resolved.
    pub fn record_saved(&self, result: Result<RemoteRecord, RemoteError>) -> bool {
        self.inner.resolve(result.map_err(WriteFailure::Remote))
    }

    /// Batch-level callback. A bare success here means the store never told
    /// us which record it persisted.
    pub fn finished(&self, result: Result<(), RemoteError>) -> bool {
        let outcome = match result {
            Ok(()) => Err(WriteFailure::Unconfirmed),
            Err(err) => Err(WriteFailure::Remote(err)),
        };
        self.inner.resolve(outcome)
    }

    /// Abandon the write, e.g. on shutdown.
    pub fn cancel(&self) -> bool {
        self.inner.resolve(Err(WriteFailure::Remote(cancelled())))
    }
}

/// Waiting side of a pending write.
pub struct PendingWrite {
    receiver: oneshot::Receiver<WriteResult>,
}

impl PendingWrite {
    pub async fn wait(self) -> WriteResult {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(WriteFailure::Remote(cancelled())),
        }
    }
}

/// Create a linked completion / waiter pair.
pub fn write_completion() -> (WriteCompletion, PendingWrite) {
    let (sender, receiver) = oneshot::channel();
    let completion = WriteCompletion {
        inner: Arc::new(Slot {
            sender: Mutex::new(Some(sender)),
        }),
    };
    (completion, PendingWrite { receiver })
}

fn cancelled() -> RemoteError {
    RemoteError::new(
        ErrorCode::OperationCancelled,
        "write was cancelled before the store reported a result",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudseed_core::RecordId;

    fn record() -> RemoteRecord {
        RemoteRecord::new("Note", RecordId::new("n", "Z"))
    }

    #[tokio::test]
    async fn per_record_result_wins_over_batch() {
        let (completion, pending) = write_completion();
        assert!(completion.record_saved(Ok(record())));
        assert!(!completion.finished(Ok(())));
        assert_eq!(pending.wait().await, Ok(record()));
    }

    #[tokio::test]
    async fn batch_success_without_record_is_unconfirmed() {
        let (completion, pending) = write_completion();
        completion.finished(Ok(()));
        assert_eq!(pending.wait().await, Err(WriteFailure::Unconfirmed));
    }

    #[tokio::test]
    async fn batch_failure_is_reported() {
        let (completion, pending) = write_completion();
        let err = RemoteError::new(ErrorCode::ZoneBusy, "busy");
        completion.finished(Err(err.clone()));
        assert_eq!(pending.wait().await, Err(WriteFailure::Remote(err)));
    }

    #[tokio::test]
    async fn dropping_every_handle_cancels_once() {
        let (completion, pending) = write_completion();
        let clone = completion.clone();
        drop(completion);
        drop(clone);
        match pending.wait().await {
            Err(WriteFailure::Remote(err)) => assert_eq!(err.code, ErrorCode::OperationCancelled),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolves_from_another_thread() {
        let (completion, pending) = write_completion();
        std::thread::spawn(move || {
            completion.record_saved(Ok(record()));
        });
        assert_eq!(pending.wait().await, Ok(record()));
    }
}
