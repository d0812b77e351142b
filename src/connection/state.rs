//! Connection state.

/// Lifecycle state of a client connection.
///
/// Transitions are owned exclusively by the client; teardown always
/// funnels through its single forced-disconnect routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected; the only state that permits `connect`.
    #[default]
    Disconnected,
    /// Connect-request sent, waiting for the connect-response.
    Connecting,
    /// Tunnel established (or multicast joined); group traffic allowed.
    Connected,
    /// Disconnect-request sent, waiting for the disconnect-response.
    Disconnecting,
}

impl ConnectionState {
    /// Whether group read/write/respond operations are allowed.
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }

    /// Whether a connect attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        *self == ConnectionState::Connecting
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Disconnecting.is_connected());
        assert!(ConnectionState::Connecting.is_connecting());
        assert_eq!(ConnectionState::Disconnecting.to_string(), "disconnecting");
    }
}
