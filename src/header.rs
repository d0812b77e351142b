//! KNXnet/IP frame header.

use crate::error::{KnxIpError, Result};
use crate::types::{ServiceType, PROTOCOL_VERSION};

/// Size of the KNXnet/IP header in bytes.
pub const HEADER_SIZE: usize = 6;

/// KNXnet/IP frame header (6 bytes).
///
/// ```text
/// +--------------+--------------+-----------------+-----------------+
/// | Header Len   | Protocol Ver |     Service Type (16 bits)        |
/// |  (0x06)      |  (0x10)      |                                   |
/// +--------------+--------------+-----------------------------------+
/// |           Total Length (16 bits) - header + body                |
/// +------------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnxIpHeader {
    /// Service type identifier.
    pub service_type: ServiceType,
    /// Total frame length including the header itself.
    pub total_length: u16,
}

impl KnxIpHeader {
    /// Create a header for a body of the given length. The total length is
    /// always recomputed from the body, never hand-maintained.
    pub const fn new(service_type: ServiceType, body_length: u16) -> Self {
        Self {
            service_type,
            total_length: HEADER_SIZE as u16 + body_length,
        }
    }

    /// Expected body length declared by the header.
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(HEADER_SIZE as u16)
    }

    /// Parse a header from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(KnxIpError::BufferTooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        if data[0] != HEADER_SIZE as u8 {
            return Err(KnxIpError::LengthMismatch {
                header_length: data[0] as u16,
                actual_length: HEADER_SIZE,
            });
        }
        if data[1] != PROTOCOL_VERSION {
            return Err(KnxIpError::WrongProtocolVersion(data[1]));
        }

        let raw_service = u16::from_be_bytes([data[2], data[3]]);
        let service_type = ServiceType::from_u16(raw_service)
            .ok_or(KnxIpError::UnknownServiceType(raw_service))?;
        let total_length = u16::from_be_bytes([data[4], data[5]]);

        Ok(Self {
            service_type,
            total_length,
        })
    }

    /// Serialize the header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = HEADER_SIZE as u8;
        buf[1] = PROTOCOL_VERSION;
        buf[2..4].copy_from_slice(&self.service_type.to_u16().to_be_bytes());
        buf[4..6].copy_from_slice(&self.total_length.to_be_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = KnxIpHeader::new(ServiceType::ConnectRequest, 20);
        let bytes = header.to_bytes();
        let parsed = KnxIpHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, parsed);
        assert_eq!(parsed.total_length, 26);
        assert_eq!(parsed.body_length(), 20);
    }

    #[test]
    fn test_header_byte_order() {
        let header = KnxIpHeader::new(ServiceType::TunnelingRequest, 4);
        let bytes = header.to_bytes();
        assert_eq!(bytes[0], 0x06);
        assert_eq!(bytes[1], 0x10);
        assert_eq!(bytes[2], 0x04);
        assert_eq!(bytes[3], 0x20);
        assert_eq!(bytes[4], 0x00);
        assert_eq!(bytes[5], 0x0A);
    }

    #[test]
    fn test_parse_too_short() {
        let result = KnxIpHeader::from_bytes(&[0x06, 0x10, 0x02]);
        assert!(matches!(result, Err(KnxIpError::BufferTooShort { .. })));
    }

    #[test]
    fn test_parse_wrong_version() {
        let result = KnxIpHeader::from_bytes(&[0x06, 0x20, 0x02, 0x05, 0x00, 0x06]);
        assert!(matches!(result, Err(KnxIpError::WrongProtocolVersion(0x20))));
    }

    #[test]
    fn test_parse_unknown_service() {
        let result = KnxIpHeader::from_bytes(&[0x06, 0x10, 0x09, 0x99, 0x00, 0x06]);
        assert!(matches!(
            result,
            Err(KnxIpError::UnknownServiceType(0x0999))
        ));
    }
}
