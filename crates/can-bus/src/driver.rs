//! Bus Driver Abstraction
//!
//! The Frame Source talks to the controller only through [`BusDriver`]. Three
//! drivers ship with the crate: an in-process channel (tests and bridging), a
//! candump log replayer, and a null driver that never yields frames.

use crate::error::BusError;
use crate::frame::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Controller state as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusState {
    Stopped,
    Running,
    BusOff,
    Recovering,
}

/// Controller status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStatus {
    pub state: BusState,
    /// Frames waiting in the driver's receive queue
    pub msgs_to_rx: u32,
    /// Frames lost to receive queue overflow
    pub rx_missed: u32,
    pub rx_errors: u32,
    pub bus_errors: u32,
}

impl BusStatus {
    /// Status with all counters zero
    pub fn with_state(state: BusState) -> Self {
        Self {
            state,
            msgs_to_rx: 0,
            rx_missed: 0,
            rx_errors: 0,
            bus_errors: 0,
        }
    }
}

/// Receive-only CAN controller.
#[async_trait]
pub trait BusDriver: Send {
    /// Prepare the controller (listen-only, accept-all filter)
    async fn install(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    async fn start(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    /// Wait for the next frame.
    ///
    /// `None` waits indefinitely. `Ok(None)` means the timeout elapsed; any
    /// error is fatal to the caller.
    async fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, BusError>;

    /// Drain pending alert flags
    fn read_alerts(&mut self) -> u32 {
        0
    }

    fn status(&self) -> BusStatus;
}

async fn wait_for<F, T>(timeout: Option<Duration>, fut: F) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Driver fed from an in-process channel.
///
/// Closing every sender is reported as a driver failure, the same way a
/// controller dropping off the bus would be.
pub struct ChannelDriver {
    rx: mpsc::Receiver<Frame>,
    status: BusStatus,
    alerts: u32,
}

impl ChannelDriver {
    /// Create a driver and the sender that feeds it
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let driver = Self {
            rx,
            status: BusStatus::with_state(BusState::Stopped),
            alerts: 0,
        };
        (driver, tx)
    }

    /// Force a controller state, for exercising health checks
    pub fn set_state(&mut self, state: BusState) {
        self.status.state = state;
    }

    /// Raise alert flags returned by the next `read_alerts`
    pub fn raise_alerts(&mut self, alerts: u32) {
        self.alerts |= alerts;
    }
}

#[async_trait]
impl BusDriver for ChannelDriver {
    async fn start(&mut self) -> Result<(), BusError> {
        self.status.state = BusState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BusError> {
        self.status.state = BusState::Stopped;
        Ok(())
    }

    async fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, BusError> {
        match wait_for(timeout, self.rx.recv()).await {
            None => Ok(None),
            Some(Some(frame)) => Ok(Some(frame)),
            Some(None) => Err(BusError::Driver("frame channel closed".to_string())),
        }
    }

    fn read_alerts(&mut self) -> u32 {
        std::mem::take(&mut self.alerts)
    }

    fn status(&self) -> BusStatus {
        BusStatus {
            msgs_to_rx: self.rx.len() as u32,
            ..self.status
        }
    }
}

/// Parse one candump log line.
///
/// Accepts `(1699999999.123456) can0 123#DEADBEEF` as well as bare
/// `123#DEADBEEF`. Returns `None` for comments, blank lines, remote frames
/// and malformed records.
pub fn parse_candump_line(line: &str) -> Option<Frame> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let record = line.split_whitespace().rev().find(|tok| tok.contains('#'))?;
    let (id, data) = record.split_once('#')?;
    let id = u32::from_str_radix(id, 16).ok()?;
    if data.starts_with('R') || data.len() % 2 != 0 {
        return None;
    }

    let payload = (0..data.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(data.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    Frame::new(id, &payload)
}

/// Driver replaying a candump log at a fixed frame interval.
pub struct ReplayDriver {
    path: PathBuf,
    interval: Duration,
    looping: bool,
    frames: Vec<Frame>,
    cursor: usize,
    status: BusStatus,
}

impl ReplayDriver {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, looping: bool) -> Self {
        Self {
            path: path.into(),
            interval,
            looping,
            frames: Vec::new(),
            cursor: 0,
            status: BusStatus::with_state(BusState::Stopped),
        }
    }

    /// Build a replayer over frames already in memory
    pub fn from_frames(frames: Vec<Frame>, interval: Duration, looping: bool) -> Self {
        Self {
            frames,
            ..Self::new(PathBuf::new(), interval, looping)
        }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor];
        self.cursor += 1;
        Some(frame)
    }
}

#[async_trait]
impl BusDriver for ReplayDriver {
    async fn install(&mut self) -> Result<(), BusError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let text = tokio::fs::read_to_string(&self.path).await?;
        let mut skipped = 0usize;
        self.frames = text
            .lines()
            .filter_map(|line| {
                let frame = parse_candump_line(line);
                if frame.is_none() && !line.trim().is_empty() {
                    skipped += 1;
                }
                frame
            })
            .collect();
        if skipped > 0 {
            warn!("Skipped {} unparseable replay line(s)", skipped);
        }
        info!(
            "Loaded {} frame(s) from {}",
            self.frames.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn start(&mut self) -> Result<(), BusError> {
        self.cursor = 0;
        self.status.state = BusState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BusError> {
        self.status.state = BusState::Stopped;
        Ok(())
    }

    async fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, BusError> {
        if self.status.state != BusState::Running {
            return Err(BusError::NotRunning(self.status.state));
        }
        let interval = self.interval;
        let Some(frame) = self.next_frame() else {
            debug!("Replay exhausted");
            // Idle like a silent bus
            wait_for(timeout, std::future::pending::<()>()).await;
            return Ok(None);
        };
        if let Some(limit) = timeout.filter(|t| *t < interval) {
            tokio::time::sleep(limit).await;
            self.cursor -= 1;
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
        Ok(Some(frame))
    }

    fn status(&self) -> BusStatus {
        self.status
    }
}

/// Driver for hosts without a bus: never yields a frame.
#[derive(Debug, Default)]
pub struct NullDriver;

#[async_trait]
impl BusDriver for NullDriver {
    async fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, BusError> {
        wait_for(timeout, std::future::pending::<()>()).await;
        Ok(None)
    }

    fn status(&self) -> BusStatus {
        BusStatus::with_state(BusState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candump_formats() {
        let frame = parse_candump_line("(1699999999.123456) can0 257#00C349000200").unwrap();
        assert_eq!(frame.id(), 0x257);
        assert_eq!(frame.payload(), &[0x00, 0xC3, 0x49, 0x00, 0x02, 0x00]);

        let bare = parse_candump_line("132#").unwrap();
        assert_eq!(bare.id(), 0x132);
        assert_eq!(bare.dlc(), 0);
    }

    #[test]
    fn test_parse_candump_rejects_garbage() {
        assert!(parse_candump_line("").is_none());
        assert!(parse_candump_line("# comment").is_none());
        assert!(parse_candump_line("can0 12G#00").is_none());
        assert!(parse_candump_line("can0 123#0").is_none());
        assert!(parse_candump_line("can0 123#R").is_none());
        assert!(parse_candump_line("can0 123#000102030405060708").is_none());
    }

    #[tokio::test]
    async fn test_channel_driver_delivers_and_closes() {
        let (mut driver, tx) = ChannelDriver::new(4);
        driver.start().await.unwrap();
        tx.send(Frame::new(0x132, &[1]).unwrap()).await.unwrap();
        assert_eq!(driver.status().msgs_to_rx, 1);

        let frame = driver.receive(None).await.unwrap().unwrap();
        assert_eq!(frame.id(), 0x132);

        drop(tx);
        assert!(matches!(
            driver.receive(None).await,
            Err(BusError::Driver(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_driver_timeout() {
        let (mut driver, _tx) = ChannelDriver::new(4);
        let got = driver
            .receive(Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_channel_driver_alerts_drain() {
        let (mut driver, _tx) = ChannelDriver::new(1);
        driver.raise_alerts(0b101);
        assert_eq!(driver.read_alerts(), 0b101);
        assert_eq!(driver.read_alerts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_loops() {
        let frames = vec![
            Frame::new(0x132, &[1]).unwrap(),
            Frame::new(0x257, &[2]).unwrap(),
        ];
        let mut driver = ReplayDriver::from_frames(frames, Duration::from_millis(10), true);
        driver.install().await.unwrap();
        driver.start().await.unwrap();

        let ids: Vec<u32> = {
            let mut ids = Vec::new();
            for _ in 0..3 {
                ids.push(driver.receive(None).await.unwrap().unwrap().id());
            }
            ids
        };
        assert_eq!(ids, vec![0x132, 0x257, 0x132]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_exhausted_times_out() {
        let frames = vec![Frame::new(0x132, &[1]).unwrap()];
        let mut driver = ReplayDriver::from_frames(frames, Duration::from_millis(1), false);
        driver.start().await.unwrap();
        assert!(driver.receive(None).await.unwrap().is_some());
        let idle = driver
            .receive(Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert!(idle.is_none());
    }

    #[tokio::test]
    async fn test_replay_requires_start() {
        let mut driver = ReplayDriver::from_frames(Vec::new(), Duration::from_millis(1), false);
        assert!(matches!(
            driver.receive(None).await,
            Err(BusError::NotRunning(BusState::Stopped))
        ));
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let mut driver = ReplayDriver::new(
            "/nonexistent/canelm/replay.log",
            Duration::from_millis(1),
            false,
        );
        assert!(matches!(driver.install().await, Err(BusError::Replay(_))));
    }
}
