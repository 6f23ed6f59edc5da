//! Maintenance Command Collaborator
//!
//! Host-level commands (restart, process list, memory, logging, network,
//! firmware update) are parsed by the interpreter and carried out by whoever
//! embeds it.

/// Host-level command parsed from a session line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceCommand {
    /// `RESTART` / `REBOOT`
    Restart,
    /// `PS`
    ProcessList,
    /// `FREE`
    MemoryInfo,
    /// `ELOG [level] [target]`; level 0 off through 5 trace
    LogLevel { level: u32, target: Option<String> },
    /// `WIFI ...` with its arguments
    Network(String),
    /// `OTA [url]`
    FirmwareUpdate(Option<String>),
}

impl MaintenanceCommand {
    /// Whether running the command invalidates the repeat-last-command memory.
    /// Only network changes do: `WIFI STA`/`WIFI AP` with credentials and
    /// `WIFI STOP`.
    pub fn clears_previous(&self) -> bool {
        let MaintenanceCommand::Network(args) = self else {
            return false;
        };
        let args = args.to_ascii_uppercase();
        let configures = |mode: &str| {
            args.strip_prefix(mode)
                .is_some_and(|rest| !rest.trim_start().is_empty())
        };
        configures("STA") || configures("AP") || args.starts_with("STOP")
    }
}

/// Outcome reported back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// Nothing besides the prompt
    Silent,
    Ok,
    Error,
    Lines(Vec<String>),
}

/// Host services behind the maintenance commands.
pub trait SystemControl: Send + Sync {
    fn execute(&self, command: &MaintenanceCommand) -> ControlReply;
}

/// Control for embeds without host services: everything answers `ERROR`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullControl;

impl SystemControl for NullControl {
    fn execute(&self, _command: &MaintenanceCommand) -> ControlReply {
        ControlReply::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clears_previous() {
        let network = |args: &str| MaintenanceCommand::Network(args.to_string());
        assert!(network("STOP").clears_previous());
        assert!(network("sta home secret").clears_previous());
        assert!(network("AP bridge pass").clears_previous());
        assert!(!network("").clears_previous());
        assert!(!network("SCAN").clears_previous());
        assert!(!network("STA").clears_previous());
        assert!(!network("AP ").clears_previous());
        assert!(!MaintenanceCommand::ProcessList.clears_previous());
    }

    #[test]
    fn test_null_control() {
        assert_eq!(NullControl.execute(&MaintenanceCommand::Restart), ControlReply::Error);
    }
}
