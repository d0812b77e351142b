//! Client configuration.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::addressing::IndividualAddress;
use crate::types::{CONNECTION_ALIVE_TIME, KNX_MULTICAST_ADDR, KNX_PORT};

/// Transport mode of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostProtocol {
    /// Point-to-point UDP tunneling (the common gateway mode).
    #[default]
    TunnelUdp,
    /// TCP tunneling, required for KNX/IP Secure gateways.
    TunnelTcp,
    /// Connectionless multicast routing.
    Multicast,
}

/// Immutable configuration snapshot captured at client construction.
///
/// Only the resolved local IP is filled in later, during bind.
#[derive(Debug, Clone)]
pub struct KnxOptions {
    /// KNX individual address the client sources telegrams from.
    pub physical_address: IndividualAddress,
    /// Gateway IP, or the multicast group in routing mode.
    pub peer_host: Ipv4Addr,
    /// Gateway port.
    pub peer_port: u16,
    /// Transport mode.
    pub protocol: HostProtocol,
    /// Interval between connection-state probes while connected.
    pub keep_alive_interval: Duration,
    /// Never arm acknowledgment timeouts and treat all inbound acks as
    /// expected.
    pub suppress_ack: bool,
    /// Raise a local `indication` event for every outgoing telegram.
    pub local_echo: bool,
    /// Local interface address for multicast membership and the HPAI.
    pub interface: Option<Ipv4Addr>,
    /// Opaque public value; when present on a TCP connect, a secure
    /// session-request is emitted before the connect-request.
    pub secure_key: Option<[u8; 32]>,
    /// Local IP resolved during bind.
    pub(crate) local_ip: Option<Ipv4Addr>,
}

impl KnxOptions {
    /// Options for tunneling to a gateway at `peer_host:peer_port`.
    pub fn new(peer_host: Ipv4Addr, peer_port: u16) -> Self {
        Self {
            // 15.15.200, the conventional engineering-tool address.
            physical_address: IndividualAddress(0xFFC8),
            peer_host,
            peer_port,
            protocol: HostProtocol::TunnelUdp,
            keep_alive_interval: CONNECTION_ALIVE_TIME,
            suppress_ack: false,
            local_echo: true,
            interface: None,
            secure_key: None,
            local_ip: None,
        }
    }

    /// Options for multicast routing on the standard KNX group.
    pub fn multicast() -> Self {
        Self {
            protocol: HostProtocol::Multicast,
            ..Self::new(KNX_MULTICAST_ADDR, KNX_PORT)
        }
    }

    /// Set the client's KNX individual address.
    pub fn with_physical_address(mut self, address: IndividualAddress) -> Self {
        self.physical_address = address;
        self
    }

    /// Set the transport mode.
    pub fn with_protocol(mut self, protocol: HostProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the heartbeat interval.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Disable acknowledgment tracking for outgoing telegrams.
    pub fn with_suppressed_acks(mut self) -> Self {
        self.suppress_ack = true;
        self
    }

    /// Enable or disable local echo events.
    pub fn with_local_echo(mut self, enabled: bool) -> Self {
        self.local_echo = enabled;
        self
    }

    /// Bind multicast membership and the HPAI to a specific interface.
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Supply secure-session key material for TCP connects.
    pub fn with_secure_key(mut self, key: [u8; 32]) -> Self {
        self.secure_key = Some(key);
        self
    }

    /// The local IP resolved during bind, if any.
    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.local_ip
    }
}
