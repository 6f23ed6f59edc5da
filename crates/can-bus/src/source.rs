//! Frame Source
//!
//! Long-lived ingestion loop: receive from the bus driver, admit through the
//! rate limiter, publish to the subscription registry. Any driver error or a
//! controller leaving the running state ends the loop.

use crate::driver::{BusDriver, BusState, BusStatus};
use crate::error::BusError;
use crate::frame::{Frame, MonotonicClock};
use crate::rate_limit::{Admission, RateLimiter};
use crate::registry::SubscriptionRegistry;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Interval between health checks and throughput reports
pub const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Running ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub forwarded: u64,
    /// Not listed or throttled
    pub filtered: u64,
    /// Per-subscriber queue-full drops
    pub dropped: u64,
}

pub struct FrameSource<D> {
    driver: D,
    limiter: RateLimiter,
    registry: SubscriptionRegistry,
    clock: MonotonicClock,
    stats: IngestStats,
    report_interval: Duration,
    last_report: Instant,
    last_report_stats: IngestStats,
    last_status: Option<BusStatus>,
}

impl<D: BusDriver> FrameSource<D> {
    pub fn new(driver: D, registry: SubscriptionRegistry, clock: MonotonicClock) -> Self {
        Self {
            driver,
            limiter: RateLimiter::default(),
            registry,
            clock,
            stats: IngestStats::default(),
            report_interval: REPORT_INTERVAL,
            last_report: Instant::now(),
            last_report_stats: IngestStats::default(),
            last_status: None,
        }
    }

    /// Change how often health is checked and throughput reported
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Admit one received frame and fan it out if forwarded
    pub fn ingest(&mut self, frame: Frame) -> Admission {
        self.stats.received += 1;
        metrics::counter!("can_frames_received_total").increment(1);

        let stamped = self.clock.stamp(frame);
        let admission = self.limiter.admit(frame.id(), stamped.timestamp_us);
        if admission.is_forward() {
            let report = self.registry.publish(stamped);
            self.stats.forwarded += 1;
            self.stats.dropped += report.dropped as u64;
            metrics::counter!("can_frames_forwarded_total").increment(1);
        } else {
            self.stats.filtered += 1;
            metrics::counter!("can_frames_filtered_total").increment(1);
        }
        admission
    }

    /// Poll driver alerts and status, logging throughput since the last poll.
    ///
    /// Fails when the controller is no longer running.
    pub fn check_health(&mut self) -> Result<(), BusError> {
        let alerts = self.driver.read_alerts();
        if alerts != 0 {
            warn!("CAN alerts raised: 0x{:08X}", alerts);
        }

        let status = self.driver.status();
        if status.state != BusState::Running {
            error!("CAN controller not running: {:?}", status.state);
            return Err(match status.state {
                BusState::BusOff => BusError::BusOff,
                state => BusError::NotRunning(state),
            });
        }

        let elapsed = self.last_report.elapsed().as_secs_f64().max(f64::EPSILON);
        let previous = self.last_report_stats;
        let prev_status = self.last_status.unwrap_or(BusStatus::with_state(status.state));
        info!(
            "{:.1} msg/s total, {:.1} msg/s forwarded, rx queued {}, missed +{}, rx errors +{}, bus errors +{}",
            (self.stats.received - previous.received) as f64 / elapsed,
            (self.stats.forwarded - previous.forwarded) as f64 / elapsed,
            status.msgs_to_rx,
            status.rx_missed.wrapping_sub(prev_status.rx_missed),
            status.rx_errors.wrapping_sub(prev_status.rx_errors),
            status.bus_errors.wrapping_sub(prev_status.bus_errors),
        );

        self.last_report = Instant::now();
        self.last_report_stats = self.stats;
        self.last_status = Some(status);
        Ok(())
    }

    /// Run until a fatal bus condition
    pub async fn run(mut self) -> Result<IngestStats, BusError> {
        self.driver.install().await?;
        self.driver.start().await?;
        info!(
            "CAN ingestion started, min interval {} us per identifier",
            self.limiter.min_interval_us()
        );
        self.last_report = Instant::now();

        loop {
            match self.driver.receive(None).await {
                Ok(Some(frame)) => {
                    self.ingest(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("CAN receive failed: {}", e);
                    return Err(e);
                }
            }

            if self.last_report.elapsed() >= self.report_interval {
                self.check_health()?;
            }
        }
    }
}

impl<D: BusDriver + 'static> FrameSource<D> {
    /// Run the ingestion loop on its own task
    pub fn spawn(self) -> JoinHandle<Result<IngestStats, BusError>> {
        tokio::spawn(self.run())
    }
}
