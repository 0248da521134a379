//! Failure taxonomy and the per-driver "last error" record.
//!
//! Every failure raised by the driver is one of four kinds. Transport
//! backends never leak their underlying error types; they classify into
//! [`Error`] at the transport boundary, and the facade additionally mirrors
//! each failure into the driver's [`EquipmentError`] record before
//! returning it to the caller.

/// `code` value when no error is recorded.
pub const CODE_NO_ERROR: i32 = 0;
/// `code` value for connection establishment or loss.
pub const CODE_CONNECTION: i32 = -1;
/// `code` value for a protocol-level failure without a device exception
/// code. When the device reports a Modbus exception, its raw code (1-255)
/// is recorded instead.
pub const CODE_PROTOCOL: i32 = -2;
/// `code` value for timeouts and uncategorized failures.
pub const CODE_UNEXPECTED: i32 = -3;

/// All failures surfaced by the driver.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport could not be established or was lost mid-session.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport is open but the request failed: a device-reported
    /// Modbus exception (raw code in `exception`) or a malformed exchange.
    #[error("communication error: {message}")]
    Communication {
        exception: Option<u8>,
        message: String,
    },

    /// Invalid parameters, detected eagerly at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// No response within the configured timeout.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    pub(crate) fn communication(message: impl Into<String>) -> Self {
        Error::Communication {
            exception: None,
            message: message.into(),
        }
    }

    /// Numeric code recorded into [`EquipmentError`] for this failure.
    pub fn equipment_code(&self) -> i32 {
        match self {
            Error::Connection(_) => CODE_CONNECTION,
            Error::Communication {
                exception: Some(code),
                ..
            } => *code as i32,
            Error::Communication { exception: None, .. } => CODE_PROTOCOL,
            Error::Timeout(_) | Error::Configuration(_) => CODE_UNEXPECTED,
        }
    }
}

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Snapshot of the most recent failure, one live instance per driver.
///
/// Overwritten on every failure; a successful operation does not clear it.
/// Readable via `Driver::get_last_error`, reset via `Driver::clear_error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EquipmentError {
    /// True while a failure is recorded.
    pub status: bool,
    /// Numeric failure code, see the `CODE_*` constants.
    pub code: i32,
    /// Free-text description of the failure source.
    pub source: String,
}

impl EquipmentError {
    /// The cleared record.
    pub fn none() -> Self {
        Self::default()
    }

    pub(crate) fn from_error(err: &Error) -> Self {
        Self {
            status: true,
            code: err.equipment_code(),
            source: err.to_string(),
        }
    }
}

impl std::fmt::Display for EquipmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.status {
            write!(f, "Error {}: {}", self.code, self.source)
        } else {
            write!(f, "No error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equipment_codes() {
        assert_eq!(Error::Connection("x".into()).equipment_code(), CODE_CONNECTION);
        assert_eq!(Error::communication("x").equipment_code(), CODE_PROTOCOL);
        assert_eq!(
            Error::Communication {
                exception: Some(2),
                message: "illegal data address".into()
            }
            .equipment_code(),
            2
        );
        assert_eq!(Error::Timeout("x".into()).equipment_code(), CODE_UNEXPECTED);
    }

    #[test]
    fn record_from_error() {
        let record = EquipmentError::from_error(&Error::Connection("refused".into()));
        assert!(record.status);
        assert_eq!(record.code, CODE_CONNECTION);
        assert!(record.source.contains("refused"));
        assert_eq!(record.to_string(), "Error -1: connection error: refused");
    }

    #[test]
    fn cleared_record() {
        let record = EquipmentError::none();
        assert!(!record.status);
        assert_eq!(record.code, CODE_NO_ERROR);
        assert_eq!(record.to_string(), "No error");
    }
}
