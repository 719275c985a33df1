use thiserror::Error;

/// Why a delete request was not accepted by the intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("delete intake is full")]
    Full,
    #[error("timed out waiting for room in the delete intake")]
    Timeout,
    #[error("delete batcher is shut down")]
    Closed,
}
