//! Thread-safe register access facade.
//!
//! [`Driver`] is the only component callers touch. Every public operation
//! runs under one reentrant lock covering the connectivity check, the
//! transport call and the callback dispatch, so concurrent callers are
//! fully serialized onto the single physical channel. The lock is
//! reentrant so a callback invoked inside an operation may call back into
//! the driver without deadlocking; per-field `RefCell` borrows are always
//! released before any subscriber runs.

use crate::config::ConnectionConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{EquipmentError, Error, Result};
use crate::event::{dispatch, CallbackId, CallbackRegistry, Event, EventKind};
use crate::protocol::{
    decode_float, encode_float, ByteOrder, RegisterKind, WordOrder, FLOAT_REGISTER_COUNT,
};
use crate::transport::{Backend, Transport};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

struct DriverState {
    conn: RefCell<ConnectionManager<Backend>>,
    callbacks: RefCell<CallbackRegistry>,
    last_error: RefCell<EquipmentError>,
}

/// Client driver for an SA32 acquisition unit over Modbus TCP, RTU or the
/// in-memory mock backend.
///
/// Cloning yields another handle onto the same connection, register bank
/// and callback registry; clones may be used from multiple threads.
#[derive(Clone)]
pub struct Driver {
    config: Arc<ConnectionConfig>,
    shared: Arc<ReentrantMutex<DriverState>>,
}

impl Driver {
    /// Builds a driver from a validated configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if any parameter is invalid or the
    /// requested transport is not compiled in. No connection is attempted
    /// here.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let backend = Backend::from_config(&config)?;
        let conn = ConnectionManager::new(backend, &config);
        log::info!(
            "driver initialized: protocol={:?}, slave id={}",
            config.protocol,
            config.slave_id
        );
        Ok(Self {
            config: Arc::new(config),
            shared: Arc::new(ReentrantMutex::new(DriverState {
                conn: RefCell::new(conn),
                callbacks: RefCell::new(CallbackRegistry::new()),
                last_error: RefCell::new(EquipmentError::none()),
            })),
        })
    }

    /// The configuration the driver was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Establishes the connection. Fires `on_connect` on a fresh
    /// transition; connecting twice is a warning, not an error.
    pub fn connect(&self) -> Result<bool> {
        let state = self.shared.lock();
        let result = {
            let mut conn = state.conn.borrow_mut();
            conn.connect()
        };
        match result {
            Ok(newly_connected) => {
                if newly_connected {
                    self.emit(&state, Event::Connected);
                }
                Ok(true)
            }
            Err(err) => {
                self.report_failure(&state, &err);
                Err(err)
            }
        }
    }

    /// Closes the connection. Always succeeds, idempotent; fires
    /// `on_disconnect` only if a connection was actually open.
    pub fn disconnect(&self) {
        let state = self.shared.lock();
        let was_connected = state.conn.borrow_mut().disconnect();
        if was_connected {
            self.emit(&state, Event::Disconnected);
        }
    }

    /// Pure state query, no side effects.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().conn.borrow().is_connected()
    }

    /// Current connection lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().conn.borrow().state()
    }

    /// Connects and returns a guard that disconnects on every exit path,
    /// including early returns and panics.
    pub fn session(&self) -> Result<Session<'_>> {
        self.connect()?;
        Ok(Session { driver: self })
    }

    /// Reads one holding register.
    pub fn read_holding_register(&self, address: u16) -> Result<u16> {
        self.read_single(RegisterKind::Holding, address)
    }

    /// Reads `count` consecutive holding registers (function 0x03).
    pub fn read_holding_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read_registers_impl(RegisterKind::Holding, address, count)
    }

    /// Reads one input register.
    pub fn read_input_register(&self, address: u16) -> Result<u16> {
        self.read_single(RegisterKind::Input, address)
    }

    /// Reads `count` consecutive input registers (function 0x04).
    pub fn read_input_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read_registers_impl(RegisterKind::Input, address, count)
    }

    /// Reads a 32-bit float from two consecutive registers.
    pub fn read_float(
        &self,
        address: u16,
        kind: RegisterKind,
        byte_order: ByteOrder,
        word_order: WordOrder,
    ) -> Result<f32> {
        let state = self.shared.lock();
        let values = self.read_registers_impl(kind, address, FLOAT_REGISTER_COUNT)?;
        if values.len() != FLOAT_REGISTER_COUNT as usize {
            let err = Error::communication(format!(
                "expected {FLOAT_REGISTER_COUNT} registers, got {}",
                values.len()
            ));
            self.report_failure(&state, &err);
            return Err(err);
        }
        Ok(decode_float([values[0], values[1]], byte_order, word_order))
    }

    /// Writes one holding register (function 0x06).
    pub fn write_register(&self, address: u16, value: u16) -> Result<()> {
        self.write_registers(address, &[value])
    }

    /// Writes a block of holding registers (function 0x10 for more than
    /// one value).
    pub fn write_registers(&self, address: u16, values: &[u16]) -> Result<()> {
        let state = self.shared.lock();
        if values.is_empty() {
            let err = Error::communication("write requires at least one value");
            self.report_failure(&state, &err);
            return Err(err);
        }
        if values.len() > u16::MAX as usize {
            let err = Error::communication("write block exceeds the register address space");
            self.report_failure(&state, &err);
            return Err(err);
        }
        if let Err(err) = validate_span(address, values.len() as u16) {
            self.report_failure(&state, &err);
            return Err(err);
        }
        log::debug!("writing {} register(s) at {address}", values.len());
        self.run_transport_op(&state, |transport| {
            transport.write_registers(address, values)
        })
    }

    /// Encodes a 32-bit float and writes it into two consecutive
    /// registers.
    ///
    /// Both registers go out in a single write request, but the device may
    /// still apply the first register when the second fails: the operation
    /// is not atomic and there is no rollback.
    pub fn write_float(
        &self,
        address: u16,
        value: f32,
        byte_order: ByteOrder,
        word_order: WordOrder,
    ) -> Result<()> {
        let registers = encode_float(value, byte_order, word_order);
        self.write_registers(address, &registers)
    }

    /// Snapshot of the most recent failure. Not cleared by successful
    /// operations; only [`Driver::clear_error`] or the next failure
    /// changes it.
    pub fn get_last_error(&self) -> EquipmentError {
        self.shared.lock().last_error.borrow().clone()
    }

    /// Resets the last-error record.
    pub fn clear_error(&self) {
        *self.shared.lock().last_error.borrow_mut() = EquipmentError::none();
    }

    /// Subscribes to one event kind. Subscribers run synchronously on the
    /// thread performing the triggering operation, in registration order;
    /// duplicate registrations are invoked once per registration.
    pub fn register_callback(
        &self,
        kind: EventKind,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) -> CallbackId {
        self.shared
            .lock()
            .callbacks
            .borrow_mut()
            .register(kind, Arc::new(callback))
    }

    /// Removes a subscription; returns false for an unknown handle.
    pub fn unregister_callback(&self, kind: EventKind, id: CallbackId) -> bool {
        self.shared.lock().callbacks.borrow_mut().unregister(kind, id)
    }

    /// Seeds a register of the mock backend for test setup.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when the driver is not using the mock
    /// backend.
    pub fn set_mock_register(&self, address: u16, value: u16) -> Result<()> {
        let state = self.shared.lock();
        let mut conn = state.conn.borrow_mut();
        match conn.transport_mut().as_mock_mut() {
            Some(mock) => {
                mock.set_register(address, value);
                Ok(())
            }
            None => Err(Error::Configuration(
                "set_mock_register is only available with the mock backend".to_string(),
            )),
        }
    }

    fn read_single(&self, kind: RegisterKind, address: u16) -> Result<u16> {
        let state = self.shared.lock();
        let values = self.read_registers_impl(kind, address, 1)?;
        match values.first() {
            Some(&value) => Ok(value),
            None => {
                let err = Error::communication("device returned an empty response");
                self.report_failure(&state, &err);
                Err(err)
            }
        }
    }

    fn read_registers_impl(
        &self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        let state = self.shared.lock();
        if let Err(err) = validate_span(address, count) {
            self.report_failure(&state, &err);
            return Err(err);
        }
        log::debug!("reading {count} {kind:?} register(s) at {address}");
        let values =
            self.run_transport_op(&state, |transport| transport.read_registers(kind, address, count))?;
        self.emit(
            &state,
            Event::DataReceived {
                address,
                values: values.clone(),
            },
        );
        Ok(values)
    }

    /// Runs one transport operation with the full connectivity contract:
    /// lazy reconnect before the call, one transparent reconnect-and-retry
    /// after a mid-session connection loss (auto-reconnect only), error
    /// recording and `on_error` dispatch for every surfaced failure.
    fn run_transport_op<R>(
        &self,
        state: &DriverState,
        op: impl Fn(&mut Backend) -> Result<R>,
    ) -> Result<R> {
        let was_connected = state.conn.borrow().is_connected();
        let ensured = {
            let mut conn = state.conn.borrow_mut();
            conn.ensure_connected()
        };
        if let Err(err) = ensured {
            self.report_failure(state, &err);
            return Err(err);
        }
        if !was_connected {
            self.emit(state, Event::Connected);
        }

        let first = {
            let mut conn = state.conn.borrow_mut();
            op(conn.transport_mut())
        };
        let lost = match first {
            Ok(value) => return Ok(value),
            Err(err @ Error::Connection(_)) => err,
            Err(err) => {
                self.report_failure(state, &err);
                return Err(err);
            }
        };

        let auto_reconnect = {
            let mut conn = state.conn.borrow_mut();
            conn.mark_lost();
            conn.auto_reconnect()
        };
        if !auto_reconnect {
            self.report_failure(state, &lost);
            return Err(lost);
        }

        log::warn!("connection lost mid-operation ({lost}), attempting reconnect");
        let reconnected = {
            let mut conn = state.conn.borrow_mut();
            conn.attempt_reconnect()
        };
        if let Err(err) = reconnected {
            self.report_failure(state, &err);
            return Err(err);
        }
        self.emit(state, Event::Connected);

        let retry = {
            let mut conn = state.conn.borrow_mut();
            op(conn.transport_mut())
        };
        match retry {
            Ok(value) => Ok(value),
            Err(err) => {
                if matches!(err, Error::Connection(_)) {
                    state.conn.borrow_mut().mark_lost();
                }
                self.report_failure(state, &err);
                Err(err)
            }
        }
    }

    /// Dispatches an event. The registry borrow is released before any
    /// subscriber runs so subscribers may re-enter the driver.
    fn emit(&self, state: &DriverState, event: Event) {
        let subscribers = state.callbacks.borrow().subscribers(event.kind());
        dispatch(&subscribers, &event);
    }

    fn report_failure(&self, state: &DriverState, err: &Error) {
        log::error!("{err}");
        let record = EquipmentError::from_error(err);
        *state.last_error.borrow_mut() = record.clone();
        self.emit(state, Event::Error(record));
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("protocol", &self.config.protocol)
            .field("slave_id", &self.config.slave_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn validate_span(address: u16, count: u16) -> Result<()> {
    if count == 0 {
        return Err(Error::communication("register count must be at least 1"));
    }
    if address as u32 + count as u32 - 1 > u16::MAX as u32 {
        return Err(Error::communication(format!(
            "register span {address}+{count} exceeds the 16-bit address space"
        )));
    }
    Ok(())
}

/// Scoped connection: dropping the guard disconnects the driver.
///
/// Obtained from [`Driver::session`]; dereferences to the driver so the
/// guard can be used directly for register operations.
pub struct Session<'a> {
    driver: &'a Driver,
}

impl Deref for Session<'_> {
    type Target = Driver;

    fn deref(&self) -> &Driver {
        self.driver
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.driver.disconnect();
    }
}
