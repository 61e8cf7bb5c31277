//! Publish Dispatcher
//!
//! Decouples broker publication from the receive loop. Records go into a
//! bounded queue drained by a fixed pool of worker tasks; each worker makes at
//! most one broker call per record. Publication order across records is not
//! preserved.
//!
//! When the queue is full the configured [`BackpressurePolicy`] decides
//! whether the oldest record is evicted, the new record is rejected, or the
//! submitter waits for space.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::application::ports::{BrokerPublisher, DropReason, RelayTelemetry};
use crate::domain::session::RelayHealth;
use crate::domain::tick::PublishRecord;

// =============================================================================
// Configuration
// =============================================================================

/// What to do with a record when the publish queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Evict the oldest queued record. Never stalls the receive loop.
    #[default]
    DropOldest,
    /// Reject the incoming record.
    DropNewest,
    /// Wait until a worker frees a slot.
    Block,
}

impl BackpressurePolicy {
    /// Parse a policy name, ignoring case. Returns `None` for unknown names.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "drop_oldest" | "drop-oldest" => Some(Self::DropOldest),
            "drop_newest" | "drop-newest" => Some(Self::DropNewest),
            "block" => Some(Self::Block),
            _ => None,
        }
    }

    /// Policy name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DropOldest => "drop_oldest",
            Self::DropNewest => "drop_newest",
            Self::Block => "block",
        }
    }
}

/// Dispatcher sizing.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of publish workers (maximum concurrent broker calls).
    pub workers: usize,
    /// Maximum queued records.
    pub queue_capacity: usize,
    /// Full-queue behavior.
    pub backpressure: BackpressurePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 32,
            queue_capacity: 10_000,
            backpressure: BackpressurePolicy::DropOldest,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of handing a record to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued without loss.
    Queued,
    /// Queued after evicting the oldest record.
    EvictedOldest,
    /// Not queued; the queue was full.
    Rejected,
    /// Not queued; the dispatcher is shut down.
    Closed,
}

/// Summary of a dispatcher shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Records still queued or in flight when the grace period ended.
    pub abandoned: u64,
    /// Whether every worker finished inside the grace period.
    pub completed: bool,
}

// =============================================================================
// Bounded Queue
// =============================================================================

#[derive(Debug)]
struct PublishQueue {
    records: Mutex<VecDeque<PublishRecord>>,
    capacity: usize,
    closed: AtomicBool,
    items: Notify,
    space: Notify,
}

impl PublishQueue {
    fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            items: Notify::new(),
            space: Notify::new(),
        }
    }

    async fn push(&self, record: PublishRecord, policy: BackpressurePolicy) -> SubmitOutcome {
        loop {
            let space = self.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                if self.closed.load(Ordering::Acquire) {
                    return SubmitOutcome::Closed;
                }

                let mut records = self.records.lock();
                if records.len() < self.capacity {
                    records.push_back(record);
                    drop(records);
                    self.items.notify_one();
                    return SubmitOutcome::Queued;
                }

                match policy {
                    BackpressurePolicy::DropOldest => {
                        records.pop_front();
                        records.push_back(record);
                        drop(records);
                        self.items.notify_one();
                        return SubmitOutcome::EvictedOldest;
                    }
                    BackpressurePolicy::DropNewest => return SubmitOutcome::Rejected,
                    BackpressurePolicy::Block => {}
                }
            }

            space.await;
        }
    }

    async fn pop(&self) -> Option<PublishRecord> {
        loop {
            let item = self.items.notified();
            tokio::pin!(item);
            item.as_mut().enable();

            let next = self.records.lock().pop_front();
            if let Some(record) = next {
                self.space.notify_one();
                return Some(record);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            item.await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.items.notify_waiters();
        self.space.notify_waiters();
    }

    fn clear(&self) -> usize {
        let mut records = self.records.lock();
        let count = records.len();
        records.clear();
        count
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Bounded worker pool publishing records to the broker.
pub struct PublishDispatcher {
    queue: Arc<PublishQueue>,
    policy: BackpressurePolicy,
    telemetry: Arc<dyn RelayTelemetry>,
    health: Arc<RelayHealth>,
    in_flight: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PublishDispatcher {
    /// Spawn the worker pool. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn start(
        config: &DispatchConfig,
        publisher: Arc<dyn BrokerPublisher>,
        telemetry: Arc<dyn RelayTelemetry>,
        health: Arc<RelayHealth>,
    ) -> Self {
        let queue = Arc::new(PublishQueue::new(config.queue_capacity));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let workers = (0..config.workers.max(1))
            .map(|_| {
                tokio::spawn(worker_loop(
                    Arc::clone(&queue),
                    Arc::clone(&publisher),
                    Arc::clone(&telemetry),
                    Arc::clone(&health),
                    Arc::clone(&in_flight),
                ))
            })
            .collect();

        tracing::debug!(
            workers = config.workers.max(1),
            queue_capacity = config.queue_capacity,
            backpressure = config.backpressure.as_str(),
            "Publish dispatcher started"
        );

        Self {
            queue,
            policy: config.backpressure,
            telemetry,
            health,
            in_flight,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a record for publication.
    ///
    /// Only waits under [`BackpressurePolicy::Block`] with a full queue.
    pub async fn submit(&self, record: PublishRecord) -> SubmitOutcome {
        let outcome = self.queue.push(record, self.policy).await;

        match outcome {
            SubmitOutcome::EvictedOldest => self.record_drop(DropReason::QueueFullOldest, 1),
            SubmitOutcome::Rejected => self.record_drop(DropReason::QueueFullNewest, 1),
            SubmitOutcome::Queued | SubmitOutcome::Closed => {}
        }
        self.telemetry.queue_depth(self.queue.len());

        outcome
    }

    /// Records waiting for a worker.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Broker calls currently outstanding.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stop accepting records and let workers drain for at most `grace`.
    ///
    /// Anything still queued or in flight afterwards is abandoned and counted
    /// as dropped. Calling this twice is harmless.
    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        self.queue.close();

        let handles = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return DrainReport {
                abandoned: 0,
                completed: true,
            };
        }
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            tracing::info!("Publish queue drained");
            return DrainReport {
                abandoned: 0,
                completed: true,
            };
        }

        let queued = self.queue.clear();
        let in_flight = self.in_flight.load(Ordering::Acquire);
        for abort in aborts {
            abort.abort();
        }

        let abandoned = (queued + in_flight) as u64;
        tracing::warn!(
            queued,
            in_flight,
            grace_ms = grace.as_millis(),
            "Shutdown grace period elapsed, abandoning pending publishes"
        );
        self.record_drop(DropReason::ShutdownAbandoned, abandoned);

        DrainReport {
            abandoned,
            completed: false,
        }
    }

    fn record_drop(&self, reason: DropReason, count: u64) {
        if count == 0 {
            return;
        }
        self.health.record_dropped(count);
        self.telemetry.ticks_dropped(reason, count);
    }
}

async fn worker_loop(
    queue: Arc<PublishQueue>,
    publisher: Arc<dyn BrokerPublisher>,
    telemetry: Arc<dyn RelayTelemetry>,
    health: Arc<RelayHealth>,
    in_flight: Arc<AtomicUsize>,
) {
    while let Some(record) = queue.pop().await {
        in_flight.fetch_add(1, Ordering::AcqRel);
        let started = Instant::now();

        match publisher.publish(std::slice::from_ref(&record)).await {
            Ok(()) => {
                health.record_published();
                telemetry.tick_published(&record, started.elapsed());
            }
            Err(e) => {
                health.record_publish_failure();
                telemetry.publish_failed(&record, &e);
            }
        }

        in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
