//! ELM327 Adapter Emulation
//!
//! Line-oriented command interpreter speaking the ELM327/STN dialect used by
//! OBD-II scan tools. Each connected byte stream gets its own [`Session`];
//! monitor commands stream filtered bus frames from the shared
//! [`can_bus::SubscriptionRegistry`] until the client sends a byte or the bus
//! goes quiet.

mod command;
mod control;
mod error;
mod filter;
mod monitor;
mod protocol;
mod session;
mod state;
mod transport;

pub use command::{parse_command, read_hex, Command};
pub use control::{ControlReply, MaintenanceCommand, NullControl, SystemControl};
pub use error::{CommandError, SessionError, TransportError};
pub use filter::{FilterChain, FilterList, FilterRule, FILTER_CAPACITY};
pub use monitor::{format_frame, spawn_monitor, DisplayOptions, MonitorExit, MonitorHandle, MonitorSettings};
pub use protocol::Protocol;
pub use session::{Reply, Session, SessionContext};
pub use state::SessionState;
pub use transport::{write_all, StreamTransport, Transport, TransportReader, TransportWriter};

/// Response tokens
pub mod token {
    pub const PROMPT: &str = ">";
    pub const OK: &str = "OK";
    pub const ERROR: &str = "ERROR";
    pub const UNKNOWN: &str = "?";
    pub const NO_DATA: &str = "NO DATA";
}

/// Identification strings
pub mod ident {
    /// `ATI`, `ATZ`, `ATWS`
    pub const ELM_VERSION: &str = "ELM327 v1.3a CanBridge";
    /// `STDI`
    pub const ST_VERSION: &str = "STN1110 r0.1 CanBridge";
    /// `AT@1`
    pub const DEVICE_DESCRIPTION: &str = "CanBridge";
}
