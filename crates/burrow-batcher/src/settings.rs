use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_INTAKE_CAPACITY: usize = 10;
pub const DEFAULT_FLUSH_THRESHOLD: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_IN_FLIGHT_FLUSHES: usize = 1;
/// Shortest flush period the batcher runs with; smaller values are raised to it.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Tuning for a [`DeleteBatcher`](crate::DeleteBatcher).
#[derive(Debug, Clone, TypedBuilder)]
pub struct BatcherSettings {
    /// Number of requests the intake buffers before producers have to wait.
    #[builder(default = DEFAULT_INTAKE_CAPACITY)]
    pub intake_capacity: usize,
    /// Queue length that triggers an immediate flush.
    #[builder(default = DEFAULT_FLUSH_THRESHOLD)]
    pub flush_threshold: usize,
    /// Period of the timer-driven flush. Raised to [`MIN_FLUSH_INTERVAL`]
    /// if smaller.
    #[builder(default = DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: Duration,
    /// Longest time [`DeleteIntake::enqueue`](crate::DeleteIntake::enqueue)
    /// waits for a free slot.
    #[builder(default = DEFAULT_ENQUEUE_TIMEOUT)]
    pub enqueue_timeout: Duration,
    /// Flushes allowed to call the sink at the same time. Later flushes wait
    /// for a permit without blocking the consumer loop.
    #[builder(default = DEFAULT_MAX_IN_FLIGHT_FLUSHES)]
    pub max_in_flight_flushes: usize,
}

impl Default for BatcherSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
