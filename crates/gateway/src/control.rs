//! Host Services for Maintenance Commands

use crate::logging::LogControl;
use crate::server::SessionTable;
use can_bus::SubscriptionRegistry;
use elm_protocol::{ControlReply, MaintenanceCommand, SystemControl};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// [`SystemControl`] backed by the running gateway
pub struct GatewayControl {
    sessions: SessionTable,
    registry: SubscriptionRegistry,
    log: Option<Arc<LogControl>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl GatewayControl {
    pub fn new(
        sessions: SessionTable,
        registry: SubscriptionRegistry,
        log: Option<Arc<LogControl>>,
        shutdown: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            sessions,
            registry,
            log,
            shutdown,
        }
    }

    fn process_list(&self) -> ControlReply {
        let mut lines = vec![format!("{:>4} {:>8} {}", "ID", "UPTIME", "SESSION")];
        lines.extend(self.sessions.list().into_iter().map(|entry| {
            format!(
                "{:>4} {:>7}s {}",
                entry.id,
                entry.started.elapsed().as_secs(),
                entry.label
            )
        }));
        ControlReply::Lines(lines)
    }

    fn memory_info(&self) -> ControlReply {
        let stats = self.registry.stats();
        ControlReply::Lines(vec![
            format!("SUBSCRIPTIONS {}/{}", stats.live, stats.capacity),
            format!("SESSIONS {}", self.sessions.len()),
            format!("FRAMES PUBLISHED {}", stats.published),
            format!("FRAMES DROPPED {}", stats.dropped),
        ])
    }

    fn set_log_level(&self, level: u32, target: Option<&str>) -> ControlReply {
        let Some(log) = &self.log else {
            return ControlReply::Error;
        };
        match log.set_level(level, target) {
            Ok(()) => ControlReply::Silent,
            Err(e) => {
                warn!("ELOG failed: {}", e);
                ControlReply::Error
            }
        }
    }
}

impl SystemControl for GatewayControl {
    fn execute(&self, command: &MaintenanceCommand) -> ControlReply {
        match command {
            MaintenanceCommand::Restart => {
                info!("Restart requested by client");
                self.shutdown.send_replace(true);
                ControlReply::Silent
            }
            MaintenanceCommand::ProcessList => self.process_list(),
            MaintenanceCommand::MemoryInfo => self.memory_info(),
            MaintenanceCommand::LogLevel { level, target } => {
                self.set_log_level(*level, target.as_deref())
            }
            MaintenanceCommand::Network(args) => {
                warn!(args = %args, "Network configuration is not managed by this gateway");
                ControlReply::Error
            }
            MaintenanceCommand::FirmwareUpdate(url) => {
                warn!(url = ?url, "Firmware update is not supported");
                ControlReply::Error
            }
        }
    }
}
