use crate::error::EnqueueError;
use burrow_core::DeleteRequest;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

/// Producer handle for the delete pipeline.
///
/// Cheap to clone; every clone feeds the same bounded channel.
#[derive(Debug, Clone)]
pub struct DeleteIntake {
    tx: mpsc::Sender<DeleteRequest>,
    enqueue_timeout: Duration,
}

impl DeleteIntake {
    pub(crate) fn new(tx: mpsc::Sender<DeleteRequest>, enqueue_timeout: Duration) -> Self {
        Self {
            tx,
            enqueue_timeout,
        }
    }

    /// Queues a request without waiting; rejects it if the intake is full.
    pub fn try_enqueue(&self, request: DeleteRequest) -> Result<(), EnqueueError> {
        self.tx.try_send(request).map_err(|err| match err {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Queues a request, waiting at most the configured enqueue timeout for
    /// a free slot.
    pub async fn enqueue(&self, request: DeleteRequest) -> Result<(), EnqueueError> {
        self.tx
            .send_timeout(request, self.enqueue_timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => EnqueueError::Timeout,
                SendTimeoutError::Closed(_) => EnqueueError::Closed,
            })
    }

    /// Free slots left in the intake.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
