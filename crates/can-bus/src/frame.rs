//! Bus Frame Types

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// One bus message: identifier plus up to eight payload bytes.
///
/// Fields are private so a constructed frame can never hold an out-of-range
/// identifier or length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    id: u32,
    dlc: u8,
    data: [u8; 8],
}

impl Frame {
    /// Largest identifier representable in the 29-bit extended format
    pub const MAX_ID: u32 = 0x1FFF_FFFF;
    /// Maximum payload length
    pub const MAX_DLC: usize = 8;

    /// Build a frame, or `None` if the identifier or payload is out of range
    pub fn new(id: u32, payload: &[u8]) -> Option<Self> {
        if id > Self::MAX_ID || payload.len() > Self::MAX_DLC {
            return None;
        }
        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            id,
            dlc: payload.len() as u8,
            data,
        })
    }

    /// Frame identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Data length code
    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// Valid payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

/// A frame stamped with the monotonic time it was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedFrame {
    pub frame: Frame,
    /// Microseconds since the producing clock's epoch
    pub timestamp_us: u64,
}

/// Microsecond clock shared by every frame producer.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Microseconds elapsed since the clock was created
    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Stamp a frame with the current time
    pub fn stamp(&self, frame: Frame) -> TimestampedFrame {
        TimestampedFrame {
            frame,
            timestamp_us: self.now_us(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_payload_length() {
        let frame = Frame::new(0x257, &[0x00, 0xC3, 0x49]).unwrap();
        assert_eq!(frame.id(), 0x257);
        assert_eq!(frame.dlc(), 3);
        assert_eq!(frame.payload(), &[0x00, 0xC3, 0x49]);
    }

    #[test]
    fn test_frame_rejects_out_of_range() {
        assert!(Frame::new(0x2000_0000, &[]).is_none());
        assert!(Frame::new(0x123, &[0; 9]).is_none());
        assert!(Frame::new(Frame::MAX_ID, &[0; 8]).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances() {
        let clock = MonotonicClock::new();
        tokio::time::advance(std::time::Duration::from_millis(250)).await;
        let stamped = clock.stamp(Frame::default());
        assert_eq!(stamped.timestamp_us, 250_000);
    }
}
