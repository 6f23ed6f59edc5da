//! CAN Bus Error Types

use crate::driver::BusState;
use thiserror::Error;

/// Fatal conditions reported by a bus driver or the ingestion loop.
///
/// Any of these terminates the Frame Source; recovery requires restarting the
/// subsystem.
#[derive(Debug, Error)]
pub enum BusError {
    /// Controller entered bus-off
    #[error("CAN bus off")]
    BusOff,

    /// Controller left the running state
    #[error("CAN controller not running (state: {0:?})")]
    NotRunning(BusState),

    /// Driver-level failure
    #[error("CAN driver error: {0}")]
    Driver(String),

    /// Replay log could not be read
    #[error("Replay log error: {0}")]
    Replay(#[from] std::io::Error),
}
