//! Network transport binding.
//!
//! One uniform send/recv surface over the three connection modes: UDP
//! unicast tunneling, UDP multicast routing, and TCP tunneling. The engine
//! never touches a socket directly.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::error::{KnxIpError, Result};
use crate::header::HEADER_SIZE;

/// Receive buffer size; a KNXnet/IP total length field is 16 bits.
const RECV_BUFFER_SIZE: usize = 65535;

/// Time-to-live applied to outgoing datagrams.
const UDP_TTL: u32 = 128;

/// A bound KNXnet/IP transport.
pub enum Transport {
    /// Point-to-point UDP tunneling socket, ephemeral local port.
    Udp {
        socket: UdpSocket,
        peer: SocketAddr,
    },
    /// Multicast routing socket bound on the group port.
    Multicast {
        socket: UdpSocket,
        group: Ipv4Addr,
        peer: SocketAddr,
    },
    /// TCP tunneling stream with its reassembly buffer.
    Tcp {
        stream: TcpStream,
        peer: SocketAddr,
        buffer: BytesMut,
    },
}

impl Transport {
    /// Bind a UDP unicast socket on an ephemeral port for tunneling to
    /// `peer`.
    pub async fn udp(peer: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_ttl(UDP_TTL)?;
        Ok(Self::Udp { socket, peer })
    }

    /// Bind a multicast socket on the group port, join the group on the
    /// given interface, and enable loopback so locally sent frames are
    /// received back.
    pub async fn multicast(group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        socket.join_multicast_v4(group, interface)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_multicast_ttl_v4(UDP_TTL)?;
        Ok(Self::Multicast {
            socket,
            group,
            peer: SocketAddr::V4(SocketAddrV4::new(group, port)),
        })
    }

    /// Open a TCP tunneling stream to `peer`.
    pub async fn tcp(peer: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(peer).await?;
        Ok(Self::Tcp {
            stream,
            peer,
            buffer: BytesMut::with_capacity(RECV_BUFFER_SIZE),
        })
    }

    /// The address outgoing frames are sent to.
    pub fn peer(&self) -> SocketAddr {
        match self {
            Self::Udp { peer, .. } | Self::Multicast { peer, .. } | Self::Tcp { peer, .. } => *peer,
        }
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match self {
            Self::Udp { socket, .. } | Self::Multicast { socket, .. } => {
                Ok(socket.local_addr()?)
            }
            Self::Tcp { stream, .. } => Ok(stream.local_addr()?),
        }
    }

    /// Whether this transport is the multicast routing mode.
    pub fn is_multicast(&self) -> bool {
        matches!(self, Self::Multicast { .. })
    }

    /// Send one serialized frame to the peer.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Udp { socket, peer } | Self::Multicast { socket, peer, .. } => {
                socket.send_to(data, *peer).await?;
            }
            Self::Tcp { stream, .. } => {
                stream.write_all(data).await?;
            }
        }
        Ok(())
    }

    /// Send one serialized frame to an explicit address (discovery probes
    /// go to the multicast group regardless of the configured peer).
    pub async fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> Result<()> {
        match self {
            Self::Udp { socket, .. } | Self::Multicast { socket, .. } => {
                socket.send_to(data, addr).await?;
                Ok(())
            }
            Self::Tcp { .. } => Err(KnxIpError::InvalidState(
                "cannot address individual peers on a TCP stream",
            )),
        }
    }

    /// Receive the next complete frame and the address it came from.
    ///
    /// UDP modes return one datagram per call. The TCP mode reassembles
    /// the byte stream into frames using the total-length header field.
    pub async fn recv(&mut self) -> Result<(Bytes, SocketAddr)> {
        match self {
            Self::Udp { socket, .. } | Self::Multicast { socket, .. } => {
                let mut buf = vec![0u8; RECV_BUFFER_SIZE];
                let (len, addr) = socket.recv_from(&mut buf).await?;
                buf.truncate(len);
                Ok((Bytes::from(buf), addr))
            }
            Self::Tcp {
                stream,
                peer,
                buffer,
            } => {
                loop {
                    if buffer.len() >= HEADER_SIZE {
                        let total =
                            u16::from_be_bytes([buffer[4], buffer[5]]) as usize;
                        if total < HEADER_SIZE {
                            return Err(KnxIpError::LengthMismatch {
                                header_length: total as u16,
                                actual_length: buffer.len(),
                            });
                        }
                        if buffer.len() >= total {
                            let frame = buffer.split_to(total).freeze();
                            return Ok((frame, *peer));
                        }
                    }
                    let read = stream.read_buf(buffer).await?;
                    if read == 0 {
                        return Err(KnxIpError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "stream closed by gateway",
                        )));
                    }
                }
            }
        }
    }

    /// Close the transport. UDP sockets leave their multicast group;
    /// the TCP stream is shut down.
    pub async fn close(&mut self) -> Result<()> {
        match self {
            Self::Udp { .. } => Ok(()),
            Self::Multicast { socket, group, .. } => {
                socket
                    .leave_multicast_v4(*group, Ipv4Addr::UNSPECIFIED)
                    .ok();
                Ok(())
            }
            Self::Tcp { stream, buffer, .. } => {
                buffer.clear();
                stream.shutdown().await.ok();
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp { peer, .. } => f.debug_struct("Udp").field("peer", peer).finish(),
            Self::Multicast { group, peer, .. } => f
                .debug_struct("Multicast")
                .field("group", group)
                .field("peer", peer)
                .finish(),
            Self::Tcp { peer, .. } => f.debug_struct("Tcp").field("peer", peer).finish(),
        }
    }
}
