//! Error types for KNXnet/IP client operations.

use std::io;
use thiserror::Error;

/// Errors that can occur during KNXnet/IP operations.
///
/// Synchronous precondition failures (`InvalidState`, `NoSocket`) are
/// returned directly from public operations; everything that happens on an
/// asynchronous path (ack timeouts, gateway status errors, socket failures,
/// malformed inbound frames) is surfaced through the event channel instead
/// of being thrown across an event boundary.
#[derive(Error, Debug)]
pub enum KnxIpError {
    /// Operation attempted in the wrong connection state.
    #[error("Invalid connection state: {0}")]
    InvalidState(&'static str),

    /// Operation attempted before a transport exists.
    #[error("No client socket defined")]
    NoSocket,

    /// A tunneling request was never acknowledged within the timeout window.
    #[error(
        "Request timeout: seqCounter:{seq}, dest:{destination}, ackRequested:{ack_requested}, \
         timed out waiting telegram acknowledge by {peer}"
    )]
    RequestTimeout {
        /// Sequence number the request was tagged with.
        seq: u8,
        /// Destination group/individual address of the telegram.
        destination: String,
        /// Whether the acknowledge-request control bit was set.
        ack_requested: bool,
        /// Gateway host the acknowledgment was expected from.
        peer: String,
    },

    /// The gateway answered with a non-success status code.
    #[error("Protocol status error: {reason}")]
    ProtocolStatus {
        /// Raw status byte from the response.
        status: u8,
        /// Human-readable rendering of the status.
        reason: String,
    },

    /// Buffer too short to contain the declared structure.
    #[error("Buffer too short: expected at least {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    /// Header total length disagrees with the received byte count.
    #[error("Frame length mismatch: header says {header_length} bytes, got {actual_length}")]
    LengthMismatch {
        header_length: u16,
        actual_length: usize,
    },

    /// Unknown service type identifier.
    #[error("Unknown service type: 0x{0:04X}")]
    UnknownServiceType(u16),

    /// Unknown cEMI message code.
    #[error("Unknown cEMI message code: 0x{0:02X}")]
    UnknownMessageCode(u8),

    /// Wrong KNXnet/IP protocol version.
    #[error("Wrong protocol version: expected 0x10, got 0x{0:02X}")]
    WrongProtocolVersion(u8),

    /// Malformed KNX individual or group address.
    #[error("Invalid KNX address: {0}")]
    InvalidAddress(String),

    /// Datapoint type not supported by the encoder, or value out of range.
    #[error("Unsupported datapoint encoding: {0}")]
    UnsupportedDpt(String),

    /// Raw payload rejected before reaching the wire.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The connection was declared dead after repeated heartbeat failures.
    #[error("Connection dead with {0}")]
    ConnectionDead(String),

    /// Connect attempt timed out.
    #[error("Connection timeout to {0}")]
    ConnectTimeout(String),

    /// I/O error on the underlying transport.
    #[error("Transport error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for KNXnet/IP operations.
pub type Result<T> = std::result::Result<T, KnxIpError>;

impl KnxIpError {
    /// Whether this error names a malformed-frame condition that is
    /// isolated to a single inbound datagram.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::BufferTooShort { .. }
                | Self::LengthMismatch { .. }
                | Self::UnknownServiceType(_)
                | Self::UnknownMessageCode(_)
                | Self::WrongProtocolVersion(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KnxIpError::UnknownServiceType(0x0999);
        assert_eq!(format!("{err}"), "Unknown service type: 0x0999");

        let err = KnxIpError::BufferTooShort {
            expected: 6,
            actual: 2,
        };
        assert_eq!(
            format!("{err}"),
            "Buffer too short: expected at least 6 bytes, got 2"
        );
    }

    #[test]
    fn test_request_timeout_display() {
        let err = KnxIpError::RequestTimeout {
            seq: 10,
            destination: "1/2/3".to_string(),
            ack_requested: true,
            peer: "192.168.1.50".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("seqCounter:10"));
        assert!(msg.contains("1/2/3"));
        assert!(msg.contains("192.168.1.50"));
    }

    #[test]
    fn test_is_parse_error() {
        assert!(KnxIpError::UnknownMessageCode(0xFF).is_parse_error());
        assert!(KnxIpError::WrongProtocolVersion(0x20).is_parse_error());
        assert!(!KnxIpError::NoSocket.is_parse_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "test");
        let err: KnxIpError = io_err.into();
        assert!(matches!(err, KnxIpError::Io(_)));
    }
}
