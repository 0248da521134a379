//! In-memory transport for deterministic testing without an instrument.
//!
//! The mock keeps a single register bank shared by holding and input
//! reads. Writes land directly in the bank and are visible to every
//! subsequent read (read-your-writes). An address that was never written
//! gets a pseudo-random value on first access and keeps it afterwards, so
//! unseeded reads look like a live instrument but stay stable.

use crate::error::Result;
use crate::protocol::RegisterKind;
use crate::transport::Transport;
use std::collections::HashMap;

/// Mock transport backed by a register bank.
///
/// `open` and `close` never fail and the mock never raises a connection
/// error, so everything layered above it can be tested deterministically.
#[derive(Debug, Default)]
pub struct MockTransport {
    bank: HashMap<u16, u16>,
    open: bool,
    #[cfg(test)]
    truncate_reads: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a register for test setup.
    pub fn set_register(&mut self, address: u16, value: u16) {
        self.bank.insert(address, value);
    }

    /// Makes every read return one register fewer than requested,
    /// simulating a device that replies with a short frame.
    #[cfg(test)]
    pub(crate) fn set_truncate_reads(&mut self, truncate: bool) {
        self.truncate_reads = truncate;
    }

    fn value_at(&mut self, address: u16) -> u16 {
        *self
            .bank
            .entry(address)
            .or_insert_with(rand::random::<u16>)
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        log::debug!("mock transport opened");
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        log::debug!("mock transport closed");
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_registers(&mut self, _kind: RegisterKind, address: u16, count: u16) -> Result<Vec<u16>> {
        let mut values: Vec<u16> = (0..count)
            .map(|offset| self.value_at(address.wrapping_add(offset)))
            .collect();
        #[cfg(test)]
        if self.truncate_reads {
            values.pop();
        }
        log::debug!("mock read: address={address}, values={values:?}");
        Ok(values)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        for (offset, &value) in values.iter().enumerate() {
            self.bank.insert(address.wrapping_add(offset as u16), value);
        }
        log::debug!("mock write: address={address}, count={}", values.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn open_close_never_fail() {
        let mut mock = MockTransport::new();
        assert!(!mock.is_open());
        assert_matches!(mock.open(), Ok(()));
        assert!(mock.is_open());
        mock.close();
        assert!(!mock.is_open());
        assert_matches!(mock.open(), Ok(()));
    }

    #[test]
    fn read_your_writes() {
        let mut mock = MockTransport::new();
        mock.set_register(1000, 12345);
        let values = mock.read_registers(RegisterKind::Holding, 1000, 1).unwrap();
        assert_eq!(values, [12345]);

        mock.write_registers(2000, &[1, 2, 3]).unwrap();
        let values = mock.read_registers(RegisterKind::Holding, 2000, 3).unwrap();
        assert_eq!(values, [1, 2, 3]);
    }

    #[test]
    fn unseeded_reads_are_idempotent() {
        let mut mock = MockTransport::new();
        let first = mock.read_registers(RegisterKind::Input, 5000, 4).unwrap();
        let second = mock.read_registers(RegisterKind::Input, 5000, 4).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn truncated_reads_come_up_short() {
        let mut mock = MockTransport::new();
        mock.set_truncate_reads(true);
        let values = mock.read_registers(RegisterKind::Holding, 0, 2).unwrap();
        assert_eq!(values.len(), 1);
        mock.set_truncate_reads(false);
        let values = mock.read_registers(RegisterKind::Holding, 0, 2).unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn holding_and_input_share_the_bank() {
        let mut mock = MockTransport::new();
        mock.set_register(42, 7);
        let holding = mock.read_registers(RegisterKind::Holding, 42, 1).unwrap();
        let input = mock.read_registers(RegisterKind::Input, 42, 1).unwrap();
        assert_eq!(holding, input);
    }
}
