//! Asynchronous soft-delete pipeline.
//!
//! Delete requests are posted to a bounded [`DeleteIntake`]. A single
//! consumer task queues them and hands batches to a [`DeleteSink`] once the
//! queue reaches the flush threshold or the flush interval elapses.
//! [`DeleteBatcher::shutdown`] drains the intake, flushes what is left and
//! waits for every flush to finish.
//!
//! [`DeleteSink`]: burrow_core::DeleteSink

mod batcher;
pub mod error;
mod intake;
pub mod settings;

pub use batcher::{BatcherState, DeleteBatcher};
pub use error::EnqueueError;
pub use intake::DeleteIntake;
pub use settings::BatcherSettings;
