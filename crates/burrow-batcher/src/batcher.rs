use crate::intake::DeleteIntake;
use crate::settings::{BatcherSettings, MIN_FLUSH_INTERVAL};
use burrow_core::{DeleteRequest, DeleteSink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`DeleteBatcher`].
///
/// Flushing is not a separate state: flushes run concurrently with the
/// consumer loop and are reported by [`DeleteBatcher::flushes_in_flight`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatcherState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Handle to the background delete consumer.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) still
/// drains and flushes in the background, but nothing waits for it.
#[derive(Debug)]
pub struct DeleteBatcher {
    intake: DeleteIntake,
    shutdown_tx: oneshot::Sender<()>,
    worker: JoinHandle<()>,
    state: watch::Receiver<BatcherState>,
    in_flight: Arc<AtomicUsize>,
}

impl DeleteBatcher {
    /// Starts the consumer task on the current tokio runtime.
    pub fn spawn<S>(sink: Arc<S>, settings: BatcherSettings) -> Self
    where
        S: DeleteSink + ?Sized,
    {
        let (tx, rx) = mpsc::channel(settings.intake_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (state_tx, state) = watch::channel(BatcherState::Running);
        let in_flight = Arc::new(AtomicUsize::new(0));
        // A zero period would panic the ticker.
        let flush_interval = settings.flush_interval.max(MIN_FLUSH_INTERVAL);

        let worker = Worker {
            sink,
            rx,
            queue: Vec::with_capacity(settings.flush_threshold),
            flush_threshold: settings.flush_threshold.max(1),
            permits: Arc::new(Semaphore::new(settings.max_in_flight_flushes.max(1))),
            flushes: JoinSet::new(),
            in_flight: Arc::clone(&in_flight),
            state: state_tx,
        };

        info!(
            intake_capacity = settings.intake_capacity,
            flush_threshold = settings.flush_threshold,
            flush_interval_ms = flush_interval.as_millis() as u64,
            "delete batcher started"
        );

        Self {
            intake: DeleteIntake::new(tx, settings.enqueue_timeout),
            shutdown_tx,
            worker: tokio::spawn(worker.run(flush_interval, shutdown_rx)),
            state,
            in_flight,
        }
    }

    /// Returns a producer handle.
    pub fn intake(&self) -> DeleteIntake {
        self.intake.clone()
    }

    pub fn state(&self) -> BatcherState {
        *self.state.borrow()
    }

    /// Receiver that observes state changes, including the final `Stopped`.
    pub fn subscribe_state(&self) -> watch::Receiver<BatcherState> {
        self.state.clone()
    }

    /// Flushes handed to the sink that have not completed yet.
    pub fn flushes_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stops the timer, closes the intake, flushes everything still queued
    /// and waits until every flush has completed.
    ///
    /// Requests accepted by the intake before this call are all handed to
    /// the sink before it returns.
    pub async fn shutdown(self) {
        info!("delete batcher shutting down");

        // An error means the worker already exited, which `worker` reports.
        let _ = self.shutdown_tx.send(());

        if let Err(err) = self.worker.await {
            error!(error = %err, "delete batcher worker failed");
        }
        info!("delete batcher stopped");
    }
}

struct Worker<S: ?Sized> {
    sink: Arc<S>,
    rx: mpsc::Receiver<DeleteRequest>,
    queue: Vec<DeleteRequest>,
    flush_threshold: usize,
    permits: Arc<Semaphore>,
    flushes: JoinSet<()>,
    in_flight: Arc<AtomicUsize>,
    state: watch::Sender<BatcherState>,
}

impl<S: DeleteSink + ?Sized> Worker<S> {
    async fn run(mut self, flush_interval: Duration, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // A dropped handle counts as a shutdown request.
                _ = &mut shutdown => break,
                received = self.rx.recv() => match received {
                    Some(request) => self.push(request),
                    None => break,
                },
                _ = ticker.tick() => self.flush("interval"),
                Some(joined) = self.flushes.join_next(), if !self.flushes.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(ticker);
        self.drain().await;
    }

    fn push(&mut self, request: DeleteRequest) {
        self.queue.push(request);
        if self.queue.len() >= self.flush_threshold {
            self.flush("size");
        }
    }

    /// Hands the current queue to a new flush task and starts a fresh one.
    fn flush(&mut self, trigger: &'static str) {
        if self.queue.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.queue, Vec::with_capacity(self.flush_threshold));
        let sink = Arc::clone(&self.sink);
        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);

        debug!(trigger, batch = batch.len(), "flushing delete batch");
        in_flight.fetch_add(1, Ordering::SeqCst);

        self.flushes.spawn(async move {
            // The semaphore is never closed.
            if let Ok(_permit) = permits.acquire().await {
                match sink.apply_deletes(&batch).await {
                    Ok(()) => info!(batch = batch.len(), "delete batch applied"),
                    Err(err) => {
                        error!(batch = batch.len(), error = %err, "delete batch failed, dropping it")
                    }
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn drain(mut self) {
        self.state.send_replace(BatcherState::ShuttingDown);

        // Requests already buffered stay readable after close.
        self.rx.close();
        let mut drained = 0usize;
        while let Some(request) = self.rx.recv().await {
            drained += 1;
            self.push(request);
        }
        debug!(drained, queued = self.queue.len(), "delete intake closed");

        self.flush("shutdown");
        while let Some(joined) = self.flushes.join_next().await {
            log_join(joined);
        }

        self.state.send_replace(BatcherState::Stopped);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        warn!(error = %err, "delete flush task did not complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnqueueError;
    use async_trait::async_trait;
    use burrow_core::{ShortCode, StorageError, UserId};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tokio::time::sleep;

    const TICK: Duration = Duration::from_secs(1);

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<Vec<DeleteRequest>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Vec<DeleteRequest>> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl DeleteSink for RecordingSink {
        async fn apply_deletes(&self, requests: &[DeleteRequest]) -> burrow_core::error::Result<()> {
            self.calls.lock().push(requests.to_vec());
            if self.fail {
                return Err(StorageError::Io("disk on fire".into()));
            }
            Ok(())
        }
    }

    /// Blocks every flush until the test hands out permits.
    struct GatedSink {
        gate: Semaphore,
        active: AtomicUsize,
        max_active: AtomicUsize,
        completed: AtomicUsize,
    }

    impl GatedSink {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DeleteSink for GatedSink {
        async fn apply_deletes(&self, _requests: &[DeleteRequest]) -> burrow_core::error::Result<()> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request(i: usize) -> DeleteRequest {
        DeleteRequest::new(
            UserId::new("u1"),
            ShortCode::new_unchecked(format!("CODE{:04}", i)),
        )
    }

    fn settings() -> BatcherSettings {
        BatcherSettings::builder().flush_interval(TICK).build()
    }

    #[tokio::test(start_paused = true)]
    async fn tick_flushes_pending_requests_once() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(Arc::clone(&sink), settings());
        let intake = batcher.intake();

        let requests: Vec<_> = (0..5).map(request).collect();
        for r in &requests {
            intake.enqueue(r.clone()).await.unwrap();
        }

        sleep(TICK / 2).await;
        assert!(sink.calls().is_empty());

        sleep(TICK / 2 + Duration::from_millis(10)).await;
        assert_eq!(sink.calls(), vec![requests]);

        batcher.shutdown().await;
        assert_eq!(sink.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_ticks_do_not_flush() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(Arc::clone(&sink), settings());

        sleep(TICK * 3).await;
        batcher.shutdown().await;

        assert!(sink.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_threshold_flushes_before_tick() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(Arc::clone(&sink), settings());
        let intake = batcher.intake();

        for i in 0..150 {
            intake.enqueue(request(i)).await.unwrap();
        }
        sleep(Duration::from_millis(100)).await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 100);

        batcher.shutdown().await;

        let flushed: HashSet<_> = sink.calls().into_iter().flatten().collect();
        let enqueued: HashSet<_> = (0..150).map(request).collect();
        assert_eq!(flushed, enqueued);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_everything_enqueued() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(Arc::clone(&sink), settings());
        let intake = batcher.intake();

        for i in 0..7 {
            intake.try_enqueue(request(i)).unwrap();
        }
        batcher.shutdown().await;

        let flushed: Vec<_> = sink.calls().into_iter().flatten().collect();
        assert_eq!(flushed, (0..7).map(request).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn intake_rejects_after_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(Arc::clone(&sink), settings());
        let intake = batcher.intake();

        batcher.shutdown().await;

        assert_eq!(intake.try_enqueue(request(0)), Err(EnqueueError::Closed));
        assert_eq!(intake.enqueue(request(1)).await, Err(EnqueueError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn full_intake_rejects_without_waiting() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(
            Arc::clone(&sink),
            BatcherSettings::builder().intake_capacity(2).build(),
        );
        let intake = batcher.intake();

        // The consumer has not been polled yet on this single-threaded runtime.
        intake.try_enqueue(request(0)).unwrap();
        intake.try_enqueue(request(1)).unwrap();
        assert_eq!(intake.try_enqueue(request(2)), Err(EnqueueError::Full));

        batcher.shutdown().await;
        let flushed: Vec<_> = sink.calls().into_iter().flatten().collect();
        assert_eq!(flushed, vec![request(0), request(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_is_dropped_not_retried() {
        let sink = Arc::new(RecordingSink::failing());
        let batcher = DeleteBatcher::spawn(Arc::clone(&sink), settings());
        let intake = batcher.intake();

        for i in 0..3 {
            intake.enqueue(request(i)).await.unwrap();
        }
        sleep(TICK + Duration::from_millis(10)).await;

        for i in 3..5 {
            intake.enqueue(request(i)).await.unwrap();
        }
        sleep(TICK).await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (0..3).map(request).collect::<Vec<_>>());
        assert_eq!(calls[1], (3..5).map(request).collect::<Vec<_>>());

        batcher.shutdown().await;
        assert_eq!(sink.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_run_one_at_a_time() {
        let sink = Arc::new(GatedSink::new());
        let batcher = DeleteBatcher::spawn(
            Arc::clone(&sink),
            BatcherSettings::builder()
                .flush_threshold(2)
                .flush_interval(TICK)
                .build(),
        );
        let intake = batcher.intake();

        for i in 0..6 {
            intake.enqueue(request(i)).await.unwrap();
        }
        sleep(Duration::from_millis(10)).await;

        // Three batches were cut; only one may be inside the sink.
        assert_eq!(batcher.flushes_in_flight(), 3);
        assert_eq!(sink.active.load(Ordering::SeqCst), 1);

        sink.gate.add_permits(3);
        batcher.shutdown().await;

        assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(sink.completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_flush_interval_still_runs() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(
            Arc::clone(&sink),
            BatcherSettings::builder()
                .flush_interval(Duration::ZERO)
                .build(),
        );
        let intake = batcher.intake();

        intake.enqueue(request(0)).await.unwrap();
        sleep(Duration::from_millis(5)).await;

        assert_eq!(batcher.state(), BatcherState::Running);
        assert_eq!(sink.calls(), vec![vec![request(0)]]);

        intake.enqueue(request(1)).await.unwrap();
        batcher.shutdown().await;

        let flushed: Vec<_> = sink.calls().into_iter().flatten().collect();
        assert_eq!(flushed, vec![request(0), request(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn state_moves_to_stopped() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(Arc::clone(&sink), settings());
        let states = batcher.subscribe_state();

        assert_eq!(batcher.state(), BatcherState::Running);
        batcher.shutdown().await;

        assert_eq!(*states.borrow(), BatcherState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_still_flushes() {
        let sink = Arc::new(RecordingSink::default());
        let batcher = DeleteBatcher::spawn(Arc::clone(&sink), settings());
        let intake = batcher.intake();
        let mut states = batcher.subscribe_state();

        intake.enqueue(request(0)).await.unwrap();
        drop(batcher);

        states
            .wait_for(|state| *state == BatcherState::Stopped)
            .await
            .unwrap();
        assert_eq!(sink.calls(), vec![vec![request(0)]]);
    }
}
