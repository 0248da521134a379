//! Connection state machine and reconnect policy.
//!
//! The manager owns the transport backend and is the only place the
//! [`ConnectionState`] is mutated. Reconnection is caller-driven: a lost
//! connection is retried lazily when the next operation asks
//! [`ConnectionManager::ensure_connected`], never from a background timer.

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::transport::Transport;
use std::time::Duration;

/// Lifecycle of one driver session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Connect or reconnect gave up. Terminal unless auto-reconnect is
    /// enabled, in which case the next operation retries.
    Failed,
}

/// Owns the transport and drives connect/disconnect/reconnect.
#[derive(Debug)]
pub struct ConnectionManager<T: Transport> {
    transport: T,
    state: ConnectionState,
    auto_reconnect: bool,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, config: &ConnectionConfig) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            auto_reconnect: config.auto_reconnect,
            reconnect_delay: config.reconnect_delay,
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Opens the transport. Returns `Ok(true)` on a fresh transition to
    /// `Connected`, `Ok(false)` when already connected.
    pub fn connect(&mut self) -> Result<bool> {
        if self.is_connected() {
            log::warn!("already connected");
            return Ok(false);
        }
        self.state = ConnectionState::Connecting;
        match self.transport.open() {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                log::info!("connection established");
                Ok(true)
            }
            Err(err) => {
                self.state = ConnectionState::Failed;
                log::error!("connection failed: {err}");
                Err(err)
            }
        }
    }

    /// Closes the transport from any state. Returns whether a connection
    /// was actually open.
    pub fn disconnect(&mut self) -> bool {
        let was_connected = self.is_connected();
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        if was_connected {
            log::info!("connection closed");
        }
        was_connected
    }

    /// Records a mid-session transport loss.
    pub fn mark_lost(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Failed;
    }

    /// Runs the bounded reconnect loop: up to `max_reconnect_attempts`
    /// re-opens with `reconnect_delay` sleeps between failed attempts.
    pub fn attempt_reconnect(&mut self) -> Result<()> {
        let max = self.max_reconnect_attempts;
        for attempt in 1..=max {
            self.state = ConnectionState::Reconnecting;
            log::info!("reconnect attempt {attempt}/{max}");
            match self.transport.open() {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    log::info!("reconnected");
                    return Ok(());
                }
                Err(err) => {
                    log::warn!("reconnect attempt {attempt}/{max} failed: {err}");
                    if attempt < max {
                        std::thread::sleep(self.reconnect_delay);
                    }
                }
            }
        }
        self.state = ConnectionState::Failed;
        Err(Error::Connection(format!(
            "reconnect failed after {max} attempts"
        )))
    }

    /// Guarantees a live connection before an operation, applying the
    /// lazy reconnect policy.
    pub fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        if self.auto_reconnect {
            log::warn!("no active connection, attempting automatic reconnect");
            self.attempt_reconnect()
        } else {
            Err(Error::Connection(
                "no active connection, call connect() first".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::protocol::RegisterKind;
    use assert_matches::assert_matches;

    /// Transport whose `open` always fails, counting the attempts.
    #[derive(Default)]
    struct FailingTransport {
        opens: u32,
    }

    impl Transport for FailingTransport {
        fn open(&mut self) -> Result<()> {
            self.opens += 1;
            Err(Error::Connection("device unreachable".to_string()))
        }

        fn close(&mut self) {}

        fn is_open(&self) -> bool {
            false
        }

        fn read_registers(&mut self, _: RegisterKind, _: u16, _: u16) -> Result<Vec<u16>> {
            Err(Error::Connection("device unreachable".to_string()))
        }

        fn write_registers(&mut self, _: u16, _: &[u16]) -> Result<()> {
            Err(Error::Connection("device unreachable".to_string()))
        }
    }

    fn reconnecting_config(max_attempts: u32) -> ConnectionConfig {
        ConnectionConfig::mock()
            .with_auto_reconnect(true)
            .with_reconnect_delay(Duration::ZERO)
            .with_max_reconnect_attempts(max_attempts)
    }

    #[test]
    fn connect_disconnect_transitions() {
        let mut manager = ConnectionManager::new(MockTransport::new(), &ConnectionConfig::mock());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());

        assert_matches!(manager.connect(), Ok(true));
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.is_connected());

        // Second connect is a no-op.
        assert_matches!(manager.connect(), Ok(false));

        assert!(manager.disconnect());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        // Idempotent.
        assert!(!manager.disconnect());
    }

    #[test]
    fn failed_connect_leaves_failed_state() {
        let mut manager =
            ConnectionManager::new(FailingTransport::default(), &ConnectionConfig::mock());
        assert_matches!(manager.connect(), Err(Error::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(manager.transport_mut().opens, 1);
    }

    #[test]
    fn reconnect_attempts_are_bounded() {
        let mut manager = ConnectionManager::new(FailingTransport::default(), &reconnecting_config(3));
        assert_matches!(manager.attempt_reconnect(), Err(Error::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(manager.transport_mut().opens, 3);
    }

    #[test]
    fn zero_max_attempts_fails_immediately() {
        let mut manager = ConnectionManager::new(FailingTransport::default(), &reconnecting_config(0));
        assert_matches!(manager.attempt_reconnect(), Err(Error::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(manager.transport_mut().opens, 0);
    }

    #[test]
    fn ensure_connected_without_auto_reconnect() {
        let mut manager = ConnectionManager::new(MockTransport::new(), &ConnectionConfig::mock());
        assert_matches!(manager.ensure_connected(), Err(Error::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn ensure_connected_reconnects_lazily() {
        let mut manager = ConnectionManager::new(MockTransport::new(), &reconnecting_config(3));
        assert_matches!(manager.ensure_connected(), Ok(()));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn mark_lost_closes_transport() {
        let mut manager = ConnectionManager::new(MockTransport::new(), &ConnectionConfig::mock());
        manager.connect().unwrap();
        manager.mark_lost();
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert!(!manager.transport_mut().is_open());
    }
}
