//! HPAI and tunnel CRI/CRD fixed-layout structures.

use std::net::Ipv4Addr;

use crate::addressing::IndividualAddress;
use crate::error::{KnxIpError, Result};
use crate::types::{IPV4_TCP, IPV4_UDP, TunnelLayer, TUNNEL_CONNECTION};

/// Host Protocol Address Information (8 bytes).
///
/// ```text
/// +--------------+--------------+-----------------------------------+
/// | Structure Len| Host Protocol|      IPv4 Address (4 bytes)       |
/// |   (0x08)     | (0x01/0x02)  |                                   |
/// +--------------+--------------+-----------------------------------+
/// |                      Port (2 bytes)                             |
/// +------------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hpai {
    /// Host protocol code (`IPV4_UDP` or `IPV4_TCP`).
    pub protocol: u8,
    /// Endpoint IPv4 address.
    pub address: Ipv4Addr,
    /// Endpoint port.
    pub port: u16,
}

impl Hpai {
    /// Serialized size in bytes.
    pub const SIZE: usize = 8;

    /// Create a UDP HPAI.
    pub const fn udp(address: Ipv4Addr, port: u16) -> Self {
        Self {
            protocol: IPV4_UDP,
            address,
            port,
        }
    }

    /// Create a TCP HPAI.
    pub const fn tcp(address: Ipv4Addr, port: u16) -> Self {
        Self {
            protocol: IPV4_TCP,
            address,
            port,
        }
    }

    /// The all-zero "route back" HPAI used on TCP control frames.
    pub const fn null(protocol: u8) -> Self {
        Self {
            protocol,
            address: Ipv4Addr::UNSPECIFIED,
            port: 0,
        }
    }

    /// Parse an HPAI from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxIpError::BufferTooShort {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        if data[0] != Self::SIZE as u8 {
            return Err(KnxIpError::LengthMismatch {
                header_length: data[0] as u16,
                actual_length: Self::SIZE,
            });
        }
        Ok(Self {
            protocol: data[1],
            address: Ipv4Addr::new(data[2], data[3], data[4], data[5]),
            port: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// Serialize the HPAI to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = Self::SIZE as u8;
        buf[1] = self.protocol;
        buf[2..6].copy_from_slice(&self.address.octets());
        buf[6..8].copy_from_slice(&self.port.to_be_bytes());
        buf
    }
}

/// Connection Request Information for a tunnel connection (4 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelCri {
    /// Requested tunnel layer.
    pub layer: TunnelLayer,
}

impl TunnelCri {
    /// Serialized size in bytes.
    pub const SIZE: usize = 4;

    /// Create a CRI requesting the given layer.
    pub const fn new(layer: TunnelLayer) -> Self {
        Self { layer }
    }

    /// Parse a tunnel CRI from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxIpError::BufferTooShort {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        if data[0] != Self::SIZE as u8 || data[1] != TUNNEL_CONNECTION {
            return Err(KnxIpError::LengthMismatch {
                header_length: data[0] as u16,
                actual_length: Self::SIZE,
            });
        }
        let layer = TunnelLayer::from_u8(data[2])
            .ok_or(KnxIpError::UnknownMessageCode(data[2]))?;
        Ok(Self { layer })
    }

    /// Serialize the CRI to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [Self::SIZE as u8, TUNNEL_CONNECTION, self.layer as u8, 0x00]
    }
}

/// Connection Response Data block for a tunnel connection (4 bytes):
/// the gateway grants its KNX individual address to the tunnel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelCrd {
    /// KNX individual address assigned to this tunnel.
    pub address: IndividualAddress,
}

impl TunnelCrd {
    /// Serialized size in bytes.
    pub const SIZE: usize = 4;

    /// Parse a tunnel CRD from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(KnxIpError::BufferTooShort {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        if data[0] != Self::SIZE as u8 || data[1] != TUNNEL_CONNECTION {
            return Err(KnxIpError::LengthMismatch {
                header_length: data[0] as u16,
                actual_length: Self::SIZE,
            });
        }
        Ok(Self {
            address: IndividualAddress(u16::from_be_bytes([data[2], data[3]])),
        })
    }

    /// Serialize the CRD to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let addr = self.address.0.to_be_bytes();
        [Self::SIZE as u8, TUNNEL_CONNECTION, addr[0], addr[1]]
    }
}
