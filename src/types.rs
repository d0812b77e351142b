//! Core KNXnet/IP types and protocol constants.

use std::net::Ipv4Addr;
use std::time::Duration;

/// KNXnet/IP protocol version 1.0 (always 0x10 on the wire).
pub const PROTOCOL_VERSION: u8 = 0x10;

/// Standard UDP/TCP port for KNXnet/IP gateways.
pub const KNX_PORT: u16 = 3671;

/// KNXnet/IP system multicast address used for routing and discovery.
pub const KNX_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 12);

/// Timeout waiting for a connect-response.
pub const CONNECT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout waiting for a connection-state response (heartbeat probe).
pub const CONNECTIONSTATE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout waiting for a disconnect-response before forcing local teardown.
pub const DISCONNECT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout waiting for a tunneling acknowledgment.
pub const TUNNELING_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout waiting for a description-response.
pub const DEVICE_CONFIGURATION_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Window during which search-responses are accepted after a search-request.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Default interval between connection-state probes while connected.
pub const CONNECTION_ALIVE_TIME: Duration = Duration::from_secs(60);

/// Consecutive heartbeat failures after which the connection is declared dead.
pub const MAX_HEARTBEAT_FAILURES: u32 = 3;

/// KNXnet/IP service type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ServiceType {
    /// SEARCH_REQUEST - gateway discovery probe.
    SearchRequest = 0x0201,
    /// SEARCH_RESPONSE - gateway discovery answer.
    SearchResponse = 0x0202,
    /// DESCRIPTION_REQUEST - device description query.
    DescriptionRequest = 0x0203,
    /// DESCRIPTION_RESPONSE - device description answer.
    DescriptionResponse = 0x0204,
    /// CONNECT_REQUEST - tunnel connection handshake.
    ConnectRequest = 0x0205,
    /// CONNECT_RESPONSE - tunnel connection answer carrying the channel id.
    ConnectResponse = 0x0206,
    /// CONNECTIONSTATE_REQUEST - tunnel liveness probe.
    ConnectionStateRequest = 0x0207,
    /// CONNECTIONSTATE_RESPONSE - tunnel liveness answer.
    ConnectionStateResponse = 0x0208,
    /// DISCONNECT_REQUEST - tunnel teardown.
    DisconnectRequest = 0x0209,
    /// DISCONNECT_RESPONSE - tunnel teardown acknowledgment.
    DisconnectResponse = 0x020A,
    /// TUNNELING_REQUEST - cEMI frame carried over a tunnel.
    TunnelingRequest = 0x0420,
    /// TUNNELING_ACK - per-sequence acknowledgment.
    TunnelingAck = 0x0421,
    /// ROUTING_INDICATION - cEMI frame broadcast on the multicast group.
    RoutingIndication = 0x0530,
    /// ROUTING_LOST_MESSAGE - router signalled dropped frames.
    RoutingLostMessage = 0x0531,
    /// SESSION_REQUEST - secure session initiation.
    SessionRequest = 0x0951,
}

impl ServiceType {
    /// Convert a raw u16 service identifier to a `ServiceType`.
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0201 => Some(Self::SearchRequest),
            0x0202 => Some(Self::SearchResponse),
            0x0203 => Some(Self::DescriptionRequest),
            0x0204 => Some(Self::DescriptionResponse),
            0x0205 => Some(Self::ConnectRequest),
            0x0206 => Some(Self::ConnectResponse),
            0x0207 => Some(Self::ConnectionStateRequest),
            0x0208 => Some(Self::ConnectionStateResponse),
            0x0209 => Some(Self::DisconnectRequest),
            0x020A => Some(Self::DisconnectResponse),
            0x0420 => Some(Self::TunnelingRequest),
            0x0421 => Some(Self::TunnelingAck),
            0x0530 => Some(Self::RoutingIndication),
            0x0531 => Some(Self::RoutingLostMessage),
            0x0951 => Some(Self::SessionRequest),
            _ => None,
        }
    }

    /// Convert to the raw wire identifier.
    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Status byte for "no error" in connect / connection-state / disconnect
/// responses and tunneling acks.
pub const E_NO_ERROR: u8 = 0x00;
/// Invalid sequence number.
pub const E_SEQUENCE_NUMBER: u8 = 0x04;
/// Connection type not supported by the gateway.
pub const E_CONNECTION_TYPE: u8 = 0x22;
/// Connection option not supported by the gateway.
pub const E_CONNECTION_OPTION: u8 = 0x23;
/// The gateway has no free tunnel slots.
pub const E_NO_MORE_CONNECTIONS: u8 = 0x24;
/// Data connection error.
pub const E_DATA_CONNECTION: u8 = 0x26;
/// KNX subsystem connection error.
pub const E_KNX_CONNECTION: u8 = 0x27;
/// Requested tunneling layer not supported.
pub const E_TUNNELING_LAYER: u8 = 0x29;

/// Render a gateway status byte as a human-readable reason.
pub fn status_to_string(status: u8) -> String {
    match status {
        E_NO_ERROR => "No Error".to_string(),
        E_SEQUENCE_NUMBER => "Invalid Sequence Number".to_string(),
        E_CONNECTION_TYPE => "Invalid Connection Type".to_string(),
        E_CONNECTION_OPTION => "Invalid Connection Option".to_string(),
        E_NO_MORE_CONNECTIONS => "No More Connections".to_string(),
        E_DATA_CONNECTION => "Invalid Data Connection".to_string(),
        E_KNX_CONNECTION => "Invalid KNX Connection".to_string(),
        E_TUNNELING_LAYER => "Invalid Tunneling Layer".to_string(),
        other => format!("Unknown error {other}"),
    }
}

/// Host protocol code for IPv4 UDP endpoints.
pub const IPV4_UDP: u8 = 0x01;
/// Host protocol code for IPv4 TCP endpoints.
pub const IPV4_TCP: u8 = 0x02;

/// Connection type code for a tunnel connection.
pub const TUNNEL_CONNECTION: u8 = 0x04;

/// Requested tunnel layer, negotiated through the CRI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TunnelLayer {
    /// Link-layer tunnel - ordinary group communication.
    #[default]
    LinkLayer = 0x02,
    /// Raw tunnel.
    Raw = 0x04,
    /// Busmonitor tunnel - passive telegram capture.
    Busmonitor = 0x80,
}

impl TunnelLayer {
    /// Convert a raw CRI layer byte to a `TunnelLayer`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x02 => Some(Self::LinkLayer),
            0x04 => Some(Self::Raw),
            0x80 => Some(Self::Busmonitor),
            _ => None,
        }
    }
}
