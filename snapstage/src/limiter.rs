//! A counting admission gate bounding how many entry uploads run at once.
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of concurrently running entry uploads, independent of how many entries the
/// archive contains.
///
/// Callers that ask for admission while at capacity wait in arrival order; the underlying
/// semaphore is fair, so admission is FIFO.  The returned [`UploadPermit`] releases its slot when
/// dropped, so a permit moved into an entry task is released on every exit path of that task,
/// success, failure, or panic alike.
#[derive(Clone, Debug)]
pub(crate) struct UploadLimiter {
    semaphore: Arc<Semaphore>,
}

/// An admission slot held for the duration of one entry upload.
#[derive(Debug)]
pub(crate) struct UploadPermit {
    _permit: OwnedSemaphorePermit,
}

impl UploadLimiter {
    pub fn new(capacity: usize) -> Self {
        // A zero-capacity limiter would deadlock the first acquire
        assert!(capacity > 0, "BUG: upload concurrency must be at least 1");

        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for an admission slot.
    pub async fn acquire(&self) -> UploadPermit {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("BUG: the upload limiter semaphore is never closed");

        UploadPermit { _permit: permit }
    }

    /// The number of slots not currently held.  Exposed for tests and debug logging.
    #[allow(dead_code)]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
