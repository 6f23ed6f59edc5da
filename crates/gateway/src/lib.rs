//! CAN-to-ELM327 Gateway
//!
//! Wires the CAN ingestion pipeline, the drive-profile simulator and the
//! ELM327 protocol sessions to TCP and serial transports.

pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod server;

pub use config::{BusDriverKind, Settings};
pub use control::GatewayControl;
pub use error::GatewayError;
pub use logging::{init_logging, LogControl};
pub use server::{bind_tcp, run_serial, serve_tcp, SessionTable};
