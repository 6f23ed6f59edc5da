//! Monitor Engine
//!
//! Transient per-session task streaming filtered bus frames to the session's
//! writer. It subscribes to the registry on start and releases the
//! subscription on every exit path. Stopping is cooperative: the task notices
//! a stop request at its next poll and hands the writer back through its
//! join handle.

use crate::filter::FilterChain;
use crate::token;
use crate::transport::{write_all, TransportWriter};
use can_bus::{Frame, SubscriptionRegistry, DEFAULT_QUEUE_CAPACITY};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{error, info, warn};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Engine tuning shared by every session
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Subscriber queue depth
    pub queue_capacity: usize,
    /// Longest wait on the queue between liveness checks
    pub poll_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Monitor line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
    pub headers: bool,
    pub spaces: bool,
    pub dlc: bool,
    pub newline: &'static str,
}

/// Why a monitor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Session asked it to stop
    Stopped,
    /// No accepted frame within the liveness timeout
    TimedOut,
    /// Writing to the session failed
    WriteFailed,
    /// Registry had no free slot
    NoSubscription,
}

/// Render one frame as `[ID ][DLC ]B0 B1 ... Bn` plus the line terminator
pub fn format_frame(frame: &Frame, display: &DisplayOptions) -> String {
    let separator = if display.spaces { " " } else { "" };
    let mut fields: Vec<String> = Vec::with_capacity(2 + frame.payload().len());
    if display.headers {
        fields.push(format!("{:03X}", frame.id()));
    }
    if display.dlc {
        fields.push(format!("{:02X}", frame.dlc()));
    }
    fields.extend(frame.payload().iter().map(|b| format!("{:02X}", b)));

    let mut line = fields.join(separator);
    line.push_str(display.newline);
    line
}

/// Running monitor owned by a session
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<(Box<dyn TransportWriter>, MonitorExit)>,
}

impl MonitorHandle {
    /// True once the task has exited on its own
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request a stop and wait for the writer to come back
    pub async fn stop(self) -> Result<(Box<dyn TransportWriter>, MonitorExit), JoinError> {
        let _ = self.stop.send(true);
        self.task.await
    }
}

/// Start streaming frames accepted by `filters` to `writer`
pub fn spawn_monitor(
    registry: SubscriptionRegistry,
    filters: FilterChain,
    display: DisplayOptions,
    timeout: Duration,
    settings: MonitorSettings,
    writer: Box<dyn TransportWriter>,
) -> MonitorHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_monitor(
        registry, filters, display, timeout, settings, writer, stop_rx,
    ));
    MonitorHandle {
        stop: stop_tx,
        task,
    }
}

async fn run_monitor(
    registry: SubscriptionRegistry,
    filters: FilterChain,
    display: DisplayOptions,
    timeout: Duration,
    settings: MonitorSettings,
    mut writer: Box<dyn TransportWriter>,
    mut stop: watch::Receiver<bool>,
) -> (Box<dyn TransportWriter>, MonitorExit) {
    let exit = match registry.create(settings.queue_capacity) {
        None => {
            error!("Monitor: no free subscription slot");
            MonitorExit::NoSubscription
        }
        Some(mut subscription) => {
            info!("Monitor started on slot {}", subscription.slot());
            let mut last_accepted = Instant::now();
            let mut stats_since = Instant::now();
            let mut count = 0u64;

            let exit = loop {
                if *stop.borrow() {
                    break MonitorExit::Stopped;
                }

                let received = tokio::select! {
                    changed = stop.changed() => {
                        // Handle dropped without a stop request
                        if changed.is_err() {
                            break MonitorExit::Stopped;
                        }
                        continue;
                    }
                    received = subscription.recv_timeout(settings.poll_interval) => received,
                };

                if let Some(stamped) = received {
                    if filters.accept(stamped.frame.id()) {
                        let line = format_frame(&stamped.frame, &display);
                        if let Err(e) = write_all(writer.as_mut(), line.as_bytes()).await {
                            error!("Monitor write error: {}", e);
                            break MonitorExit::WriteFailed;
                        }
                        last_accepted = Instant::now();
                        count += 1;
                        metrics::counter!("elm_monitor_lines_total").increment(1);
                    }
                }

                if last_accepted.elapsed() >= timeout {
                    warn!("Monitor timeout");
                    let line = format!("{}{}", token::NO_DATA, display.newline);
                    if write_all(writer.as_mut(), line.as_bytes()).await.is_err() {
                        break MonitorExit::WriteFailed;
                    }
                    break MonitorExit::TimedOut;
                }

                let elapsed = stats_since.elapsed();
                if elapsed >= STATS_INTERVAL {
                    info!(
                        "Monitor stat: count={} {:.0}/s",
                        count,
                        count as f64 / elapsed.as_secs_f64()
                    );
                    count = 0;
                    stats_since = Instant::now();
                }
            };
            registry.destroy(subscription);
            exit
        }
    };

    if exit != MonitorExit::WriteFailed {
        let tail = format!("{}{}", display.newline, token::PROMPT);
        if let Err(e) = write_all(writer.as_mut(), tail.as_bytes()).await {
            warn!("Monitor could not write prompt: {}", e);
        }
    }
    info!("Monitor ended: {:?}", exit);
    (writer, exit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::filter::FilterRule;
    use async_trait::async_trait;
    use can_bus::{MonotonicClock, MAX_SUBSCRIPTIONS};
    use std::sync::{Arc, Mutex};

    const DISPLAY: DisplayOptions = DisplayOptions {
        headers: true,
        spaces: true,
        dlc: false,
        newline: "\r\n",
    };

    #[derive(Clone, Default)]
    struct Capture {
        out: Arc<Mutex<Vec<u8>>>,
        fail: bool,
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.out.lock().unwrap().clone()).unwrap()
        }
    }

    #[async_trait]
    impl TransportWriter for Capture {
        async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.out.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn frame(id: u32, payload: &[u8]) -> Frame {
        Frame::new(id, payload).unwrap()
    }

    #[test]
    fn test_format_options() {
        let f = frame(0x257, &[0x00, 0xC3, 0x49]);
        assert_eq!(format_frame(&f, &DISPLAY), "257 00 C3 49\r\n");

        let compact = DisplayOptions { spaces: false, dlc: true, newline: "\r", ..DISPLAY };
        assert_eq!(format_frame(&f, &compact), "2570300C349\r");

        let bare = DisplayOptions { headers: false, ..DISPLAY };
        assert_eq!(format_frame(&f, &bare), "00 C3 49\r\n");

        let wide = frame(0x18DA_F110, &[0x01]);
        assert_eq!(format_frame(&wide, &DISPLAY), "18DAF110 01\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_writes_no_data_once() {
        let registry = SubscriptionRegistry::new();
        let capture = Capture::default();
        let handle = spawn_monitor(
            registry.clone(),
            FilterChain::new(),
            DISPLAY,
            Duration::from_millis(5000),
            MonitorSettings::default(),
            Box::new(capture.clone()),
        );

        tokio::time::sleep(Duration::from_millis(5200)).await;
        assert!(handle.is_finished());
        let (_, exit) = handle.stop().await.unwrap();
        assert_eq!(exit, MonitorExit::TimedOut);
        assert_eq!(capture.text(), "NO DATA\r\n\r\n>");
        assert_eq!(registry.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_accepted_frames_and_stops() {
        let registry = SubscriptionRegistry::new();
        let clock = MonotonicClock::new();
        let capture = Capture::default();
        let mut filters = FilterChain::new();
        filters.block.push(FilterRule::new(0x132, 0x7FF)).unwrap();

        let handle = spawn_monitor(
            registry.clone(),
            filters,
            DISPLAY,
            Duration::from_secs(5),
            MonitorSettings::default(),
            Box::new(capture.clone()),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.live(), 1);

        registry.publish(clock.stamp(frame(0x132, &[0xAA])));
        registry.publish(clock.stamp(frame(0x257, &[0x01, 0x02])));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (_, exit) = handle.stop().await.unwrap();
        assert_eq!(exit, MonitorExit::Stopped);
        assert_eq!(capture.text(), "257 01 02\r\n\r\n>");
        assert_eq!(registry.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_exhausted() {
        let registry = SubscriptionRegistry::new();
        let _held: Vec<_> = (0..MAX_SUBSCRIPTIONS)
            .map(|_| registry.create(1).unwrap())
            .collect();
        let capture = Capture::default();
        let handle = spawn_monitor(
            registry.clone(),
            FilterChain::new(),
            DISPLAY,
            Duration::from_secs(5),
            MonitorSettings::default(),
            Box::new(capture.clone()),
        );
        let (_, exit) = handle.stop().await.unwrap();
        assert_eq!(exit, MonitorExit::NoSubscription);
        assert_eq!(capture.text(), "\r\n>");
        assert_eq!(registry.live(), MAX_SUBSCRIPTIONS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_exits_without_prompt() {
        let registry = SubscriptionRegistry::new();
        let clock = MonotonicClock::new();
        let capture = Capture { fail: true, ..Capture::default() };
        let handle = spawn_monitor(
            registry.clone(),
            FilterChain::new(),
            DISPLAY,
            Duration::from_secs(5),
            MonitorSettings::default(),
            Box::new(capture.clone()),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.publish(clock.stamp(frame(0x257, &[0x01])));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(handle.is_finished());
        let (_, exit) = handle.stop().await.unwrap();
        assert_eq!(exit, MonitorExit::WriteFailed);
        assert_eq!(registry.live(), 0);
    }
}
