//! Transport backends and the capability set they share.
//!
//! The driver core only depends on the [`Transport`] trait: open/close a
//! channel and move raw registers over it. Modbus framing, CRC and socket
//! handling are delegated to `tokio-modbus` underneath the TCP and RTU
//! backends; the mock backend (see [`crate::mock`]) touches no I/O at all.
//! The concrete backend is a closed set of variants ([`Backend`]) selected
//! once at construction from the configured protocol.

use crate::config::ConnectionConfig;
#[cfg(feature = "tokio-rtu-sync")]
use crate::config::Parity;
use crate::config::Protocol;
use crate::error::{Error, Result};
use crate::mock::MockTransport;
use crate::protocol::RegisterKind;

#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
use std::time::Duration;
#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
use tokio_modbus::prelude::{SyncReader, SyncWriter};
#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
use tokio_modbus::Slave;

/// Capability set every backend provides.
///
/// `read_registers` and `write_registers` may only be called between a
/// successful `open` and the next `close`; they fail with
/// [`Error::Connection`] otherwise.
pub trait Transport {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn read_registers(&mut self, kind: RegisterKind, address: u16, count: u16) -> Result<Vec<u16>>;
    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()>;
}

#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
fn not_open() -> Error {
    Error::Connection("transport is not open".to_string())
}

/// Folds the nested `tokio-modbus` result into the crate taxonomy. A
/// device-reported exception keeps its raw code.
#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
fn map_sync_result<T>(result: tokio_modbus::Result<T>, what: &str) -> Result<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(Error::Communication {
            exception: Some(u8::from(exception)),
            message: format!("{what} rejected by device: {exception}"),
        }),
        Err(err) => Err(classify_transport_error(err, what)),
    }
}

#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
fn classify_transport_error(err: tokio_modbus::Error, what: &str) -> Error {
    match err {
        tokio_modbus::Error::Transport(io) => classify_io_error(io, what),
        #[allow(unreachable_patterns)]
        other => Error::communication(format!("{what}: {other}")),
    }
}

#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
fn classify_io_error(err: std::io::Error, what: &str) -> Error {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => Error::Timeout(format!("{what}: {err}")),
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionRefused
        | ErrorKind::NotConnected
        | ErrorKind::UnexpectedEof => Error::Connection(format!("{what}: {err}")),
        _ => Error::communication(format!("{what}: {err}")),
    }
}

#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
fn context_read(
    ctx: &mut tokio_modbus::client::sync::Context,
    kind: RegisterKind,
    address: u16,
    count: u16,
) -> Result<Vec<u16>> {
    let result = match kind {
        RegisterKind::Holding => ctx.read_holding_registers(address, count),
        RegisterKind::Input => ctx.read_input_registers(address, count),
    };
    map_sync_result(result, "register read")
}

#[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
fn context_write(
    ctx: &mut tokio_modbus::client::sync::Context,
    address: u16,
    values: &[u16],
) -> Result<()> {
    // Single values go out as function 0x06, blocks as 0x10.
    let result = if values.len() == 1 {
        ctx.write_single_register(address, values[0])
    } else {
        ctx.write_multiple_registers(address, values)
    };
    map_sync_result(result, "register write")
}

/// Modbus TCP backend over the synchronous `tokio-modbus` client.
#[cfg(feature = "tokio-tcp-sync")]
pub struct TcpTransport {
    settings: crate::config::TcpSettings,
    slave_id: u8,
    timeout: Duration,
    ctx: Option<tokio_modbus::client::sync::Context>,
}

#[cfg(feature = "tokio-tcp-sync")]
impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("settings", &self.settings)
            .field("slave_id", &self.slave_id)
            .field("timeout", &self.timeout)
            .field("open", &self.ctx.is_some())
            .finish()
    }
}

#[cfg(feature = "tokio-tcp-sync")]
impl TcpTransport {
    pub fn new(settings: crate::config::TcpSettings, slave_id: u8, timeout: Duration) -> Self {
        Self {
            settings,
            slave_id,
            timeout,
            ctx: None,
        }
    }
}

#[cfg(feature = "tokio-tcp-sync")]
impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        if self.ctx.is_some() {
            return Ok(());
        }
        use std::net::ToSocketAddrs;
        let endpoint = format!("{}:{}", self.settings.host, self.settings.port);
        let address = (self.settings.host.as_str(), self.settings.port)
            .to_socket_addrs()
            .map_err(|err| Error::Connection(format!("cannot resolve {endpoint}: {err}")))?
            .next()
            .ok_or_else(|| Error::Connection(format!("no address found for {endpoint}")))?;
        log::info!("connecting to Modbus TCP device at {endpoint}");
        let mut ctx =
            tokio_modbus::client::sync::tcp::connect_slave(address, Slave(self.slave_id))
                .map_err(|err| Error::Connection(format!("cannot connect to {endpoint}: {err}")))?;
        ctx.set_timeout(Some(self.timeout));
        self.ctx = Some(ctx);
        Ok(())
    }

    fn close(&mut self) {
        self.ctx = None;
    }

    fn is_open(&self) -> bool {
        self.ctx.is_some()
    }

    fn read_registers(&mut self, kind: RegisterKind, address: u16, count: u16) -> Result<Vec<u16>> {
        let ctx = self.ctx.as_mut().ok_or_else(not_open)?;
        context_read(ctx, kind, address, count)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        let ctx = self.ctx.as_mut().ok_or_else(not_open)?;
        context_write(ctx, address, values)
    }
}

/// Modbus RTU backend over a serial line.
#[cfg(feature = "tokio-rtu-sync")]
pub struct RtuTransport {
    settings: crate::config::RtuSettings,
    slave_id: u8,
    timeout: Duration,
    ctx: Option<tokio_modbus::client::sync::Context>,
}

#[cfg(feature = "tokio-rtu-sync")]
impl std::fmt::Debug for RtuTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtuTransport")
            .field("settings", &self.settings)
            .field("slave_id", &self.slave_id)
            .field("timeout", &self.timeout)
            .field("open", &self.ctx.is_some())
            .finish()
    }
}

#[cfg(feature = "tokio-rtu-sync")]
impl RtuTransport {
    pub fn new(settings: crate::config::RtuSettings, slave_id: u8, timeout: Duration) -> Self {
        Self {
            settings,
            slave_id,
            timeout,
            ctx: None,
        }
    }

    fn builder(&self) -> tokio_serial::SerialPortBuilder {
        let parity = match self.settings.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        };
        let data_bits = match self.settings.data_bits {
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let stop_bits = match self.settings.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };
        tokio_serial::new(self.settings.port.as_str(), self.settings.baud_rate)
            .parity(parity)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .flow_control(tokio_serial::FlowControl::None)
    }
}

#[cfg(feature = "tokio-rtu-sync")]
impl Transport for RtuTransport {
    fn open(&mut self) -> Result<()> {
        if self.ctx.is_some() {
            return Ok(());
        }
        log::info!(
            "opening Modbus RTU port {} at {} baud",
            self.settings.port,
            self.settings.baud_rate
        );
        let mut ctx =
            tokio_modbus::client::sync::rtu::connect_slave(&self.builder(), Slave(self.slave_id))
                .map_err(|err| {
                    Error::Connection(format!("cannot open {}: {err}", self.settings.port))
                })?;
        ctx.set_timeout(Some(self.timeout));
        self.ctx = Some(ctx);
        Ok(())
    }

    fn close(&mut self) {
        self.ctx = None;
    }

    fn is_open(&self) -> bool {
        self.ctx.is_some()
    }

    fn read_registers(&mut self, kind: RegisterKind, address: u16, count: u16) -> Result<Vec<u16>> {
        let ctx = self.ctx.as_mut().ok_or_else(not_open)?;
        context_read(ctx, kind, address, count)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        let ctx = self.ctx.as_mut().ok_or_else(not_open)?;
        context_write(ctx, address, values)
    }
}

/// The closed set of backends a driver can own.
#[derive(Debug)]
pub enum Backend {
    #[cfg(feature = "tokio-tcp-sync")]
    Tcp(TcpTransport),
    #[cfg(feature = "tokio-rtu-sync")]
    Rtu(RtuTransport),
    Mock(MockTransport),
}

impl Backend {
    /// Builds the backend selected by the configured protocol. Requesting
    /// a transport that was not compiled in is a configuration error.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        match config.protocol {
            Protocol::Mock => Ok(Backend::Mock(MockTransport::new())),
            #[cfg(feature = "tokio-tcp-sync")]
            Protocol::Tcp => Ok(Backend::Tcp(TcpTransport::new(
                config.tcp.clone(),
                config.slave_id,
                config.timeout,
            ))),
            #[cfg(not(feature = "tokio-tcp-sync"))]
            Protocol::Tcp => Err(Error::Configuration(
                "TCP transport support is not compiled into this build".to_string(),
            )),
            #[cfg(feature = "tokio-rtu-sync")]
            Protocol::Rtu => Ok(Backend::Rtu(RtuTransport::new(
                config.rtu.clone(),
                config.slave_id,
                config.timeout,
            ))),
            #[cfg(not(feature = "tokio-rtu-sync"))]
            Protocol::Rtu => Err(Error::Configuration(
                "RTU transport support is not compiled into this build".to_string(),
            )),
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Backend::Mock(_))
    }

    pub fn as_mock_mut(&mut self) -> Option<&mut MockTransport> {
        match self {
            Backend::Mock(mock) => Some(mock),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    fn inner(&self) -> &dyn Transport {
        match self {
            #[cfg(feature = "tokio-tcp-sync")]
            Backend::Tcp(transport) => transport,
            #[cfg(feature = "tokio-rtu-sync")]
            Backend::Rtu(transport) => transport,
            Backend::Mock(transport) => transport,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Transport {
        match self {
            #[cfg(feature = "tokio-tcp-sync")]
            Backend::Tcp(transport) => transport,
            #[cfg(feature = "tokio-rtu-sync")]
            Backend::Rtu(transport) => transport,
            Backend::Mock(transport) => transport,
        }
    }
}

impl Transport for Backend {
    fn open(&mut self) -> Result<()> {
        self.inner_mut().open()
    }

    fn close(&mut self) {
        self.inner_mut().close();
    }

    fn is_open(&self) -> bool {
        self.inner().is_open()
    }

    fn read_registers(&mut self, kind: RegisterKind, address: u16, count: u16) -> Result<Vec<u16>> {
        self.inner_mut().read_registers(kind, address, count)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        self.inner_mut().write_registers(address, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn backend_selection_follows_protocol() {
        let mock = Backend::from_config(&ConnectionConfig::mock()).unwrap();
        assert!(mock.is_mock());

        #[cfg(feature = "tokio-tcp-sync")]
        {
            let tcp = Backend::from_config(&ConnectionConfig::tcp("127.0.0.1", 502)).unwrap();
            assert!(!tcp.is_mock());
            assert!(!tcp.is_open());
        }
    }

    #[test]
    fn mock_accessor() {
        let mut backend = Backend::from_config(&ConnectionConfig::mock()).unwrap();
        backend.as_mock_mut().unwrap().set_register(10, 99);
        let values = backend.read_registers(RegisterKind::Holding, 10, 1).unwrap();
        assert_eq!(values, [99]);
    }

    #[cfg(feature = "tokio-tcp-sync")]
    #[test]
    fn closed_tcp_transport_rejects_io() {
        let mut backend = Backend::from_config(&ConnectionConfig::tcp("127.0.0.1", 502)).unwrap();
        assert_matches!(
            backend.read_registers(RegisterKind::Holding, 0, 1),
            Err(Error::Connection(_))
        );
        assert_matches!(
            backend.write_registers(0, &[1]),
            Err(Error::Connection(_))
        );
    }

    #[cfg(any(feature = "tokio-tcp-sync", feature = "tokio-rtu-sync"))]
    #[test]
    fn io_error_classification() {
        use std::io;
        assert_matches!(
            classify_io_error(io::Error::new(io::ErrorKind::TimedOut, "t"), "read"),
            Error::Timeout(_)
        );
        assert_matches!(
            classify_io_error(io::Error::new(io::ErrorKind::ConnectionReset, "r"), "read"),
            Error::Connection(_)
        );
        assert_matches!(
            classify_io_error(io::Error::new(io::ErrorKind::InvalidData, "d"), "read"),
            Error::Communication { exception: None, .. }
        );
    }
}
