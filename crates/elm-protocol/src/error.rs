//! Interpreter Error Types

use thiserror::Error;

/// Failures on a session's byte stream. Fatal to the session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer closed the stream
    #[error("transport closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Command rejections. Each maps onto a response token; none ends a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    Unrecognized(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// Pass or block list at capacity
    #[error("filter list full")]
    FilterFull,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl CommandError {
    /// Response token sent to the client
    pub fn token(&self) -> &'static str {
        match self {
            CommandError::Unrecognized(_) | CommandError::MissingArgument(_) => crate::token::UNKNOWN,
            CommandError::FilterFull | CommandError::Unsupported(_) => crate::token::ERROR,
        }
    }
}

/// Errors ending a session task
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("monitor task failed: {0}")]
    MonitorJoin(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        assert_eq!(CommandError::Unrecognized("ATXX".into()).token(), "?");
        assert_eq!(CommandError::MissingArgument("mask").token(), "?");
        assert_eq!(CommandError::FilterFull.token(), "ERROR");
        assert_eq!(CommandError::Unsupported("OTA".into()).token(), "ERROR");
    }
}
