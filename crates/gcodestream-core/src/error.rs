//! Error handling for GCodeStream
//!
//! Provides error types for every layer of the streaming engine:
//! - G-Code errors (per-line parsing and arc geometry)
//! - Controller errors (stream state machine, timeouts, firmware rejections)
//! - Connection errors (transport)
//! - Configuration errors (rejected before any streaming begins)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// G-Code error type
///
/// Malformed-line errors. These are recovered at the line level by the job
/// loader and never abort a stream on their own.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// Arc geometry cannot be resolved (negative discriminant, no center)
    #[error("Invalid arc at line {line_number} '{command}': {reason}")]
    InvalidArc {
        /// The line number where the arc was found.
        line_number: u32,
        /// The offending command text.
        command: String,
        /// Why the arc could not be resolved.
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter '{param}' at line {line_number}: {reason}")]
    InvalidParameter {
        /// The line number where the invalid parameter was found.
        line_number: u32,
        /// The parameter name.
        param: String,
        /// The reason the parameter is invalid.
        reason: String,
    },

    /// Missing required parameter
    #[error("Missing required parameter '{param}' at line {line_number}")]
    MissingParameter {
        /// The line number where the parameter was missing.
        line_number: u32,
        /// The name of the missing parameter.
        param: String,
    },

    /// Command longer than the controller accepts
    #[error("Command at line {line_number} is {length} characters (max {max})")]
    CommandTooLong {
        /// The line number of the command.
        line_number: u32,
        /// Length of the normalized command.
        length: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Spooled job file is unreadable or truncated
    #[error("Spool error: {reason}")]
    Spool {
        /// What went wrong while reading or writing the spool.
        reason: String,
    },

    /// Generic G-Code error
    #[error("G-Code error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

impl GcodeError {
    /// Attach a line number to errors produced before the line was known
    pub fn at_line(self, line: u32) -> Self {
        match self {
            Self::InvalidArc {
                command, reason, ..
            } => Self::InvalidArc {
                line_number: line,
                command,
                reason,
            },
            Self::InvalidParameter { param, reason, .. } => Self::InvalidParameter {
                line_number: line,
                param,
                reason,
            },
            Self::MissingParameter { param, .. } => Self::MissingParameter {
                line_number: line,
                param,
            },
            Self::CommandTooLong { length, max, .. } => Self::CommandTooLong {
                line_number: line,
                length,
                max,
            },
            other => other,
        }
    }
}

/// Controller error type
///
/// Errors raised by the streaming controller: precondition violations,
/// timeouts, and capacity/protocol failures reported by the firmware.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Controller is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// Operation is not legal in the current stream state
    #[error("Cannot {operation} while {current}")]
    NotInCorrectState {
        /// The current state name.
        current: String,
        /// The operation that was requested.
        operation: String,
    },

    /// Awaited command completion never arrived
    #[error("Timed out after {elapsed_ms}ms waiting for '{command}'")]
    Timeout {
        /// The command that was being awaited.
        command: String,
        /// How long the caller waited, in milliseconds.
        elapsed_ms: u64,
    },

    /// Command was rejected by controller
    #[error("Command '{command}' rejected: {reason}")]
    CommandRejected {
        /// The rejected command.
        command: String,
        /// The reason the command was rejected.
        reason: String,
    },

    /// Buffer overflow reported by firmware or detected locally
    #[error("Buffer overflow: {message}")]
    BufferOverflow {
        /// A message describing the buffer overflow.
        message: String,
    },

    /// Acknowledgement arrived with nothing in flight
    #[error("Unexpected command completion: {message}")]
    UnexpectedCommand {
        /// Description of the stray response.
        message: String,
    },

    /// Alarm condition detected
    #[error("Alarm: {code} - {message}")]
    Alarm {
        /// The alarm code.
        code: u32,
        /// The alarm message.
        message: String,
    },

    /// Generic controller error
    #[error("Controller error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Connection error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Configuration error type
///
/// Raised at configuration time, before any streaming starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A configuration value is out of its valid range
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// The reason the value was rejected.
        reason: String,
    },

    /// Unknown enumeration value in a config file
    #[error("Unknown {kind}: {value}")]
    Unknown {
        /// What was being looked up (firmware, arc mode, ...).
        kind: String,
        /// The value that did not match.
        value: String,
    },
}

impl ConfigError {
    /// Shorthand for an out-of-range field
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Main error type for GCodeStream
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Precondition failure for a stream operation
    pub fn not_in_state(current: impl ToString, operation: impl Into<String>) -> Self {
        Error::Controller(ControllerError::NotInCorrectState {
            current: current.to_string(),
            operation: operation.into(),
        })
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::Timeout { .. }))
    }

    /// Check if this is a "not in correct state" precondition error
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::Controller(ControllerError::NotInCorrectState { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
