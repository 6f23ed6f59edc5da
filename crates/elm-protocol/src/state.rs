//! Per-Session Interpreter State
//!
//! Volatile: created with compiled-in defaults when a session starts and
//! dropped when it ends. Never shared between sessions.

use crate::filter::FilterChain;
use crate::monitor::DisplayOptions;
use crate::protocol::Protocol;
use std::time::Duration;

const DEFAULT_ECHO: bool = true;
const DEFAULT_LINEFEED: bool = true;
const DEFAULT_HEADERS: bool = true;
const DEFAULT_SPACES: bool = true;
const DEFAULT_DLC: bool = false;
const DEFAULT_MEMORY: bool = true;
const DEFAULT_ADAPTIVE_TIMING: u8 = 1;
const DEFAULT_CAN_AUTO_FORMAT: bool = false;
const DEFAULT_CAN_FLOW_CONTROL: bool = true;
const DEFAULT_CAN_SILENT_MODE: bool = true;
const DEFAULT_LONG_MESSAGE: bool = false;

/// Monitor liveness timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub echo: bool,
    pub linefeed: bool,
    pub headers: bool,
    pub spaces: bool,
    pub dlc: bool,
    pub timeout_ms: u32,
    pub protocol: Protocol,
    pub protocol_auto: bool,

    // Accepted and stored; no effect on a listen-only bridge
    pub memory: bool,
    pub adaptive_timing: u8,
    pub can_auto_format: bool,
    pub can_flow_control: bool,
    pub can_silent_mode: bool,
    pub long_message: bool,

    /// Free-form `AT@3` identifier; survives resets
    pub device_identifier: String,
    /// Line re-executed on an empty submission
    pub previous_command: String,
    pub monitor_active: bool,
    pub filters: FilterChain,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            echo: DEFAULT_ECHO,
            linefeed: DEFAULT_LINEFEED,
            headers: DEFAULT_HEADERS,
            spaces: DEFAULT_SPACES,
            dlc: DEFAULT_DLC,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            protocol: Protocol::Auto,
            protocol_auto: true,
            memory: DEFAULT_MEMORY,
            adaptive_timing: DEFAULT_ADAPTIVE_TIMING,
            can_auto_format: DEFAULT_CAN_AUTO_FORMAT,
            can_flow_control: DEFAULT_CAN_FLOW_CONTROL,
            can_silent_mode: DEFAULT_CAN_SILENT_MODE,
            long_message: DEFAULT_LONG_MESSAGE,
            device_identifier: String::new(),
            previous_command: String::new(),
            monitor_active: false,
            filters: FilterChain::new(),
        }
    }

    /// Restore compiled-in defaults, keeping the device identifier
    pub fn reset(&mut self) {
        let device_identifier = std::mem::take(&mut self.device_identifier);
        *self = Self {
            device_identifier,
            ..Self::new()
        };
    }

    /// Output line terminator
    pub fn newline(&self) -> &'static str {
        if self.linefeed {
            "\r\n"
        } else {
            "\r"
        }
    }

    /// Monitor line layout
    pub fn display(&self) -> DisplayOptions {
        DisplayOptions {
            headers: self.headers,
            spaces: self.spaces,
            dlc: self.dlc,
            newline: self.newline(),
        }
    }

    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
