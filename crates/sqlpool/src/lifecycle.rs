//! Connection lifecycle bookkeeping.
//!
//! The pool tracks each physical connection's state and usage so that
//! maintenance can evict connections that have been idle too long or have
//! outlived their maximum lifetime.

use std::time::{Duration, Instant};

/// Connection state tracked by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is idle and available for use.
    Idle,
    /// Connection is checked out.
    InUse,
    /// Connection is being torn down; interceptors are releasing resources.
    Closing,
    /// Connection is closed and must not be used.
    Closed,
}

impl ConnectionState {
    /// Check if the connection is available for checkout.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if the connection is being or has been torn down.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Unique identifier for this connection within its pool.
    pub id: u64,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
    /// Current state of the connection.
    pub state: ConnectionState,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection.
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
            state: ConnectionState::Idle,
        }
    }

    /// Check if the connection has exceeded its maximum lifetime.
    #[must_use]
    pub fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }

    /// Check if the connection has been idle too long.
    #[must_use]
    pub fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        self.state.is_available() && self.last_used_at.elapsed() > idle_timeout
    }

    /// Mark the connection as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
        self.state = ConnectionState::InUse;
    }

    /// Mark the connection as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
        self.state = ConnectionState::Idle;
    }

    /// Mark the connection as being torn down.
    pub fn mark_closing(&mut self) {
        self.state = ConnectionState::Closing;
    }

    /// Mark the connection as closed.
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_availability() {
        assert!(ConnectionState::Idle.is_available());
        assert!(!ConnectionState::InUse.is_available());
        assert!(!ConnectionState::Closing.is_available());
    }

    #[test]
    fn test_connection_state_terminal() {
        assert!(!ConnectionState::Idle.is_terminal());
        assert!(!ConnectionState::InUse.is_terminal());
        assert!(ConnectionState::Closing.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
    }

    #[test]
    fn test_connection_metadata_new() {
        let meta = ConnectionMetadata::new(1);
        assert_eq!(meta.id, 1);
        assert_eq!(meta.checkout_count, 0);
        assert_eq!(meta.state, ConnectionState::Idle);
    }

    #[test]
    fn test_connection_metadata_checkout_checkin() {
        let mut meta = ConnectionMetadata::new(1);
        meta.mark_checkout();
        assert_eq!(meta.checkout_count, 1);
        assert_eq!(meta.state, ConnectionState::InUse);

        meta.mark_checkin();
        assert_eq!(meta.state, ConnectionState::Idle);
    }

    #[test]
    fn test_idle_expiry_ignores_checked_out() {
        let mut meta = ConnectionMetadata::new(1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(meta.is_idle_expired(Duration::from_millis(1)));

        meta.mark_checkout();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!meta.is_idle_expired(Duration::from_millis(1)));
    }

    #[test]
    fn test_lifetime_expiry() {
        let meta = ConnectionMetadata::new(1);
        assert!(!meta.is_expired(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(meta.is_expired(Duration::from_millis(1)));
    }

    #[test]
    fn test_closing_and_closed() {
        let mut meta = ConnectionMetadata::new(1);
        meta.mark_closing();
        assert!(meta.state.is_terminal());
        meta.mark_closed();
        assert_eq!(meta.state, ConnectionState::Closed);
    }
}
