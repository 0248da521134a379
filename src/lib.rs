//! A client library for the SA32 acquisition unit via Modbus.
//!
//! The crate is organized around a single high-level entry point, the
//! [`driver::Driver`]: a stateful, thread-safe facade that owns the
//! connection, serializes register access and dispatches lifecycle
//! events. Everything else is plumbing beneath it.
//!
//! ## Features
//!
//! - **Thread-Safe Driver**: One handle, clonable and shareable across
//!   threads; every operation runs under a reentrant lock.
//! - **Three Transports**: Modbus TCP, Modbus RTU over a serial line, and
//!   an in-memory mock for tests and demos (selected by
//!   [`config::Protocol`], TCP/RTU behind cargo features).
//! - **32-Bit Float Codec**: Reads and writes IEEE 754 floats across
//!   register pairs with explicit byte and word order
//!   ([`protocol::ByteOrder`], [`protocol::WordOrder`]).
//! - **Lifecycle Events**: Synchronous callbacks for connect, disconnect,
//!   error and data-received.
//! - **Structured Errors**: A typed [`error::Error`] plus the
//!   [`error::EquipmentError`] record with numeric equipment codes.
//!
//! ## Quick Start
//!
//! The mock backend needs no hardware, so this example runs as-is:
//!
//! ```
//! use sa32_lib::{
//!     config::ConnectionConfig,
//!     driver::Driver,
//!     protocol::{ByteOrder, RegisterKind, WordOrder},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = Driver::new(ConnectionConfig::mock())?;
//!     driver.connect()?;
//!
//!     driver.write_float(2000, 25.5, ByteOrder::Big, WordOrder::Big)?;
//!     let value = driver.read_float(2000, RegisterKind::Holding, ByteOrder::Big, WordOrder::Big)?;
//!     assert_eq!(value, 25.5);
//!
//!     driver.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! For a real instrument, build the configuration with
//! [`config::ConnectionConfig::tcp`] or [`config::ConnectionConfig::rtu`]
//! instead; the rest of the API is identical.

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod event;
pub mod mock;
pub mod protocol;
pub mod transport;

pub use config::{ConnectionConfig, Parity, Protocol, RtuSettings, TcpSettings};
pub use connection::ConnectionState;
pub use driver::{Driver, Session};
pub use error::{EquipmentError, Error, Result};
pub use event::{CallbackId, Event, EventKind};
pub use protocol::{decode_float, encode_float, ByteOrder, RegisterKind, WordOrder};
