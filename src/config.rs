//! Driver configuration, validated eagerly at construction.
//!
//! A [`ConnectionConfig`] is built once, validated by `Driver::new`, and
//! never mutated afterwards. Invalid values fail with
//! [`Error::Configuration`](crate::Error::Configuration) before any
//! connection attempt.

use crate::error::{Error, Result};
use crate::protocol::{
    DEFAULT_BAUD_RATE, DEFAULT_DATA_BITS, DEFAULT_STOP_BITS, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT,
    SLAVE_ID_MAX, SLAVE_ID_MIN,
};
use std::time::Duration;

/// Baud rates accepted for the serial transport.
pub const VALID_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Transport selected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    Tcp,
    Rtu,
    Mock,
}

/// Serial parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl TryFrom<char> for Parity {
    type Error = Error;

    fn try_from(value: char) -> Result<Self> {
        match value.to_ascii_uppercase() {
            'N' => Ok(Parity::None),
            'E' => Ok(Parity::Even),
            'O' => Ok(Parity::Odd),
            other => Err(Error::Configuration(format!(
                "invalid parity '{other}', use 'N', 'E' or 'O'"
            ))),
        }
    }
}

/// Modbus TCP endpoint parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_TCP_PORT,
        }
    }
}

/// Modbus RTU serial line parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RtuSettings {
    /// Serial port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl Default for RtuSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            parity: Parity::None,
            stop_bits: DEFAULT_STOP_BITS,
        }
    }
}

/// Immutable driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionConfig {
    pub protocol: Protocol,
    pub tcp: TcpSettings,
    pub rtu: RtuSettings,
    /// Modbus slave/unit address, 1-247.
    pub slave_id: u8,
    /// Per-request timeout, must be non-zero.
    pub timeout: Duration,
    /// Retry lost connections lazily on the next operation.
    pub auto_reconnect: bool,
    /// Sleep between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Upper bound on reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl ConnectionConfig {
    fn with_protocol(protocol: Protocol) -> Self {
        Self {
            protocol,
            tcp: TcpSettings::default(),
            rtu: RtuSettings::default(),
            slave_id: 1,
            timeout: DEFAULT_TIMEOUT,
            auto_reconnect: false,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 3,
        }
    }

    /// Configuration for a Modbus TCP device.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        let mut config = Self::with_protocol(Protocol::Tcp);
        config.tcp = TcpSettings {
            host: host.into(),
            port,
        };
        config
    }

    /// Configuration for a Modbus RTU device with 8N1 framing.
    pub fn rtu(port: impl Into<String>, baud_rate: u32) -> Self {
        let mut config = Self::with_protocol(Protocol::Rtu);
        config.rtu.port = port.into();
        config.rtu.baud_rate = baud_rate;
        config
    }

    /// Configuration for the in-memory mock backend.
    pub fn mock() -> Self {
        Self::with_protocol(Protocol::Mock)
    }

    pub fn with_slave_id(mut self, slave_id: u8) -> Self {
        self.slave_id = slave_id;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Checks every field, called by `Driver::new` before anything else.
    pub fn validate(&self) -> Result<()> {
        if !(SLAVE_ID_MIN..=SLAVE_ID_MAX).contains(&self.slave_id) {
            return Err(Error::Configuration(format!(
                "invalid slave id {}, must be between {SLAVE_ID_MIN} and {SLAVE_ID_MAX}",
                self.slave_id
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }
        match self.protocol {
            Protocol::Tcp => {
                if self.tcp.host.is_empty() {
                    return Err(Error::Configuration("TCP host must not be empty".to_string()));
                }
            }
            Protocol::Rtu => {
                if self.rtu.port.is_empty() {
                    return Err(Error::Configuration(
                        "serial port name must not be empty".to_string(),
                    ));
                }
                if !VALID_BAUD_RATES.contains(&self.rtu.baud_rate) {
                    return Err(Error::Configuration(format!(
                        "invalid baud rate {}, valid rates: {VALID_BAUD_RATES:?}",
                        self.rtu.baud_rate
                    )));
                }
                if !matches!(self.rtu.data_bits, 7 | 8) {
                    return Err(Error::Configuration(format!(
                        "invalid data bits {}, must be 7 or 8",
                        self.rtu.data_bits
                    )));
                }
                if !matches!(self.rtu.stop_bits, 1 | 2) {
                    return Err(Error::Configuration(format!(
                        "invalid stop bits {}, must be 1 or 2",
                        self.rtu.stop_bits
                    )));
                }
            }
            Protocol::Mock => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        assert_matches!(ConnectionConfig::mock().validate(), Ok(()));
        assert_matches!(ConnectionConfig::tcp("192.168.1.100", 502).validate(), Ok(()));
        assert_matches!(ConnectionConfig::rtu("/dev/ttyUSB0", 9600).validate(), Ok(()));
    }

    #[test]
    fn slave_id_bounds() {
        let ok = ConnectionConfig::mock().with_slave_id(247);
        assert_matches!(ok.validate(), Ok(()));
        let low = ConnectionConfig::mock().with_slave_id(0);
        assert_matches!(low.validate(), Err(Error::Configuration(_)));
        let high = ConnectionConfig::tcp("127.0.0.1", 502).with_slave_id(250);
        assert_matches!(high.validate(), Err(Error::Configuration(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = ConnectionConfig::mock().with_timeout(Duration::ZERO);
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }

    #[test]
    fn rtu_line_parameters() {
        assert_matches!(
            ConnectionConfig::rtu("/dev/ttyUSB0", 1234).validate(),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            ConnectionConfig::rtu("", 9600).validate(),
            Err(Error::Configuration(_))
        );
        let mut bad_bits = ConnectionConfig::rtu("/dev/ttyUSB0", 9600);
        bad_bits.rtu.data_bits = 6;
        assert_matches!(bad_bits.validate(), Err(Error::Configuration(_)));
        let mut bad_stop = ConnectionConfig::rtu("/dev/ttyUSB0", 9600);
        bad_stop.rtu.stop_bits = 3;
        assert_matches!(bad_stop.validate(), Err(Error::Configuration(_)));
    }

    #[test]
    fn empty_tcp_host_rejected() {
        assert_matches!(
            ConnectionConfig::tcp("", 502).validate(),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn parity_from_char() {
        assert_matches!(Parity::try_from('n'), Ok(Parity::None));
        assert_matches!(Parity::try_from('E'), Ok(Parity::Even));
        assert_matches!(Parity::try_from('O'), Ok(Parity::Odd));
        assert_matches!(Parity::try_from('X'), Err(Error::Configuration(_)));
    }
}
