//! Subscription Registry
//!
//! Fixed table of bounded subscriber queues. The ingestion side publishes with
//! `try_send` under a short-held lock and never waits on a consumer; a full
//! queue drops the frame for that subscriber only.

use crate::frame::TimestampedFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Maximum number of concurrently live subscriptions
pub const MAX_SUBSCRIPTIONS: usize = 10;

/// Default per-subscriber queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Minimum spacing between "queue full" warnings
const DROP_WARN_INTERVAL: Duration = Duration::from_secs(1);

type Slots = [Option<mpsc::Sender<TimestampedFrame>>; MAX_SUBSCRIPTIONS];

/// Result of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the frame
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
}

/// Point-in-time registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub live: usize,
    pub capacity: usize,
    pub published: u64,
    pub dropped: u64,
    /// "Queue full" warnings actually logged
    pub drop_warnings: u64,
}

#[derive(Debug, Default)]
struct DropWarning {
    last: Option<Instant>,
    suppressed: u64,
    emitted: u64,
}

impl DropWarning {
    /// Accumulate drops; returns the count to report once a warning is due
    fn record(&mut self, dropped: u64, now: Instant) -> Option<u64> {
        self.suppressed += dropped;
        if self
            .last
            .is_some_and(|last| now.duration_since(last) < DROP_WARN_INTERVAL)
        {
            return None;
        }
        self.last = Some(now);
        self.emitted += 1;
        Some(std::mem::take(&mut self.suppressed))
    }
}

struct RegistryInner {
    slots: Mutex<Slots>,
    published: AtomicU64,
    dropped: AtomicU64,
    drop_warning: Mutex<DropWarning>,
}

impl RegistryInner {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, slot: usize) {
        let mut slots = self.slots();
        slots[slot] = None;
        let live = slots.iter().filter(|s| s.is_some()).count();
        drop(slots);
        metrics::gauge!("can_subscriptions_live").set(live as f64);
        debug!("Released subscription slot {} ({} live)", slot, live);
    }

    fn note_drops(&self, dropped: usize) {
        self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        metrics::counter!("can_frames_dropped_total").increment(dropped as u64);

        let report = self.drop_warning().record(dropped as u64, Instant::now());
        if let Some(count) = report {
            warn!("rx buffer full, {} frame(s) dropped", count);
        }
    }

    fn drop_warning(&self) -> MutexGuard<'_, DropWarning> {
        self.drop_warning.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to the subscriber table.
///
/// Cloning is cheap; every clone refers to the same slots.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                slots: Mutex::new(std::array::from_fn(|_| None)),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                drop_warning: Mutex::new(DropWarning::default()),
            }),
        }
    }

    /// Claim a free slot with a queue of `capacity` frames.
    ///
    /// Returns `None` without side effects when every slot is taken.
    pub fn create(&self, capacity: usize) -> Option<Subscription> {
        let mut slots = self.inner.slots();
        let slot = slots.iter().position(|s| s.is_none())?;
        let (tx, rx) = mpsc::channel(capacity.max(1));
        slots[slot] = Some(tx);
        let live = slots.iter().filter(|s| s.is_some()).count();
        drop(slots);

        metrics::gauge!("can_subscriptions_live").set(live as f64);
        debug!("Created subscription slot {} ({} live)", slot, live);
        Some(Subscription {
            inner: Arc::clone(&self.inner),
            slot,
            rx,
        })
    }

    /// Release a subscription's slot
    pub fn destroy(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Offer a frame to every live subscriber without blocking
    pub fn publish(&self, frame: TimestampedFrame) -> PublishReport {
        let mut report = PublishReport::default();
        {
            let mut slots = self.inner.slots();
            for slot in slots.iter_mut() {
                let Some(tx) = slot else { continue };
                match tx.try_send(frame) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => report.dropped += 1,
                    // Receiver vanished without releasing; reclaim the slot
                    Err(TrySendError::Closed(_)) => *slot = None,
                }
            }
        }

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        if report.dropped > 0 {
            self.inner.note_drops(report.dropped);
        }
        report
    }

    /// Number of live subscriptions
    pub fn live(&self) -> usize {
        self.inner.slots().iter().filter(|s| s.is_some()).count()
    }

    /// Snapshot of registry counters
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.live(),
            capacity: MAX_SUBSCRIPTIONS,
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            drop_warnings: self.inner.drop_warning().emitted,
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A live slot in the registry with its receiving queue.
///
/// Dropping the handle releases the slot.
pub struct Subscription {
    inner: Arc<RegistryInner>,
    slot: usize,
    rx: mpsc::Receiver<TimestampedFrame>,
}

impl Subscription {
    /// Slot index held by this subscription
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Wait up to `wait` for the next frame
    pub async fn recv_timeout(&mut self, wait: Duration) -> Option<TimestampedFrame> {
        tokio::time::timeout(wait, self.rx.recv()).await.ok().flatten()
    }

    /// Take a queued frame without waiting
    pub fn try_recv(&mut self) -> Option<TimestampedFrame> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
        self.inner.release(self.slot);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("slot", &self.slot).finish()
    }
}
