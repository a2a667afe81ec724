//! Error types for the agent client.
//!
//! All fallible library operations return [`KickoffError`]. Integrator code
//! (listeners, bots, hiveminds, scripts) returns [`anyhow::Result`]; those
//! errors are wrapped into [`KickoffError::Dispatch`] when they escape a
//! listener callback.
//!
//! ## Error Categories
//!
//! - **Connection establishment**: retried until the configured timeout, then
//!   [`KickoffError::ConnectionTimeout`]
//! - **Frame I/O**: [`KickoffError::Io`] and [`KickoffError::ConnectionClosed`],
//!   fatal for the run loop
//! - **Envelope decode/dispatch**: [`KickoffError::Parse`] and
//!   [`KickoffError::Dispatch`], fatal for the current connection
//! - **Encoding**: [`KickoffError::EncodingTooLarge`], the message is dropped
//!   and the connection stays alive
//! - **Configuration**: [`KickoffError::Config`] and
//!   [`KickoffError::MissingAgentId`], fatal at startup
//!
//! ```rust
//! use kickoff::KickoffError;
//!
//! let error = KickoffError::NotConnected;
//! if !error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::MessageKind;

/// Result type alias for client operations.
pub type Result<T, E = KickoffError> = std::result::Result<T, E>;

/// Main error type for client operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KickoffError {
    #[error("Failed to connect to the host on port {port} within {duration:?}")]
    ConnectionTimeout { port: u16, duration: Duration },

    #[error("Connection has not been established")]
    NotConnected,

    #[error("Message handling is already running")]
    AlreadyRunning,

    #[error("Connection closed by the host")]
    ConnectionClosed,

    #[error("Encoded {kind} message is {size} bytes, exceeding the {max} byte frame limit")]
    EncodingTooLarge { kind: MessageKind, size: usize, max: usize },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Listener failed while handling {kind} message")]
    Dispatch {
        kind: MessageKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration for {key}: {details}")]
    Config { key: String, details: String },

    #[error("No agent id: RLBOT_AGENT_ID is not set and no default agent id was provided")]
    MissingAgentId,

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Socket I/O error")]
    Io(#[from] std::io::Error),
}

impl KickoffError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            KickoffError::ConnectionTimeout { .. } => true,
            KickoffError::NotConnected => true,
            KickoffError::ConnectionClosed => true,
            KickoffError::Io(_) => true,
            KickoffError::EncodingTooLarge { .. } => false,
            KickoffError::AlreadyRunning => false,
            KickoffError::Parse { .. } => false,
            KickoffError::Dispatch { .. } => false,
            KickoffError::Config { .. } => false,
            KickoffError::MissingAgentId => false,
            KickoffError::File { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            KickoffError::ConnectionTimeout { .. } => vec![
                "Ensure the host server is running",
                "Check RLBOT_SERVER_PORT matches the host's port",
                "Increase the connection timeout",
            ],
            KickoffError::NotConnected => {
                vec!["Call connect() before sending or receiving", "Reconnect after a disconnect"]
            }
            KickoffError::AlreadyRunning => vec![
                "Only run one message loop per connection",
                "Call stop_running() before starting a new loop",
            ],
            KickoffError::ConnectionClosed | KickoffError::Io(_) => vec![
                "Check whether the host process is still alive",
                "Reconnect and wait for the session to be re-sent",
            ],
            KickoffError::EncodingTooLarge { .. } => vec![
                "Split the message into smaller messages",
                "Reduce the number of render items per group",
            ],
            KickoffError::Parse { .. } => vec![
                "Verify the host and client agree on the protocol version",
                "Check the host for malformed output",
            ],
            KickoffError::Dispatch { .. } => vec![
                "Handle errors inside listener callbacks to keep the loop alive",
                "Inspect the error source for the failing listener",
            ],
            KickoffError::Config { .. } => {
                vec!["Check environment variables and config file values"]
            }
            KickoffError::MissingAgentId => vec![
                "Set the RLBOT_AGENT_ID environment variable",
                "Pass a default agent id when building the runner",
            ],
            KickoffError::File { .. } => {
                vec!["Check the file exists and is readable", "Check file permissions"]
            }
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        KickoffError::File { path, source }
    }

    /// Helper constructor for payload parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        KickoffError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(key: impl Into<String>, details: impl Into<String>) -> Self {
        KickoffError::Config { key: key.into(), details: details.into() }
    }

    /// Helper constructor for listener failures.
    pub fn dispatch(kind: MessageKind, source: anyhow::Error) -> Self {
        KickoffError::Dispatch { kind, source }
    }

    /// Whether this error is an I/O timeout from a short poll.
    pub(crate) fn is_poll_timeout(&self) -> bool {
        matches!(
            self,
            KickoffError::Io(e)
                if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
        )
    }
}
