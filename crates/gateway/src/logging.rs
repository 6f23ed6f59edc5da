//! Logging Setup
//!
//! `tracing-subscriber` registry with a reloadable `EnvFilter`, so the
//! `ELOG` maintenance command can change verbosity at runtime.

use crate::config::LogSettings;
use crate::error::GatewayError;
use std::sync::{Mutex, PoisonError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Map an `ELOG` level number to a filter level; out-of-range values clamp
/// to the most verbose.
pub fn level_name(level: u32) -> &'static str {
    match level {
        0 => "off",
        1 => "error",
        2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    }
}

/// Apply a level either globally or to a single target on top of `current`.
/// A `*` target means every target.
pub fn compose_directives(current: &str, level: &str, target: Option<&str>) -> String {
    match target {
        None | Some("*") => level.to_string(),
        Some(target) => {
            let prefix = format!("{}=", target);
            let mut directives: Vec<String> = current
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty() && !d.starts_with(&prefix))
                .map(String::from)
                .collect();
            directives.push(format!("{}{}", prefix, level));
            directives.join(",")
        }
    }
}

/// Handle for changing the active filter after startup
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    current: Mutex<String>,
}

impl LogControl {
    /// Current filter directives
    pub fn directives(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the level globally, or for one target when given
    pub fn set_level(&self, level: u32, target: Option<&str>) -> Result<(), GatewayError> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let directives = compose_directives(&current, level_name(level), target);
        let filter = EnvFilter::try_new(&directives)
            .map_err(|e| GatewayError::Logging(e.to_string()))?;
        self.handle
            .reload(filter)
            .map_err(|e| GatewayError::Logging(e.to_string()))?;
        tracing::info!(filter = %directives, "Log filter changed");
        *current = directives;
        Ok(())
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(settings: &LogSettings) -> Result<LogControl, GatewayError> {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| settings.level.clone());
    let filter =
        EnvFilter::try_new(&directives).map_err(|e| GatewayError::Logging(e.to_string()))?;
    let (filter, handle) = reload::Layer::new(filter);

    let json = settings.json.then(|| fmt::layer().json().with_target(true));
    let text = (!settings.json).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| GatewayError::Logging(e.to_string()))?;

    Ok(LogControl {
        handle,
        current: Mutex::new(directives),
    })
}
