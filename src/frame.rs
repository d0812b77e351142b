//! KNXnet/IP frame codec.
//!
//! Pure, stateless parse/serialize for every supported service body.
//! `Frame::parse` and `Frame::to_bytes` are exact inverses; the header
//! length field is always recomputed from the serialized body.

use bytes::Bytes;

use crate::cemi::CemiMessage;
use crate::error::{KnxIpError, Result};
use crate::header::{KnxIpHeader, HEADER_SIZE};
use crate::hpai::{Hpai, TunnelCrd, TunnelCri};
use crate::types::ServiceType;

/// Length of the connection header on tunneling requests and acks.
const CONNECTION_HEADER_SIZE: usize = 4;

/// Service-specific body of a KNXnet/IP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Discovery probe carrying the client's response endpoint.
    SearchRequest {
        /// Endpoint search-responses should be sent to.
        discovery: Hpai,
    },
    /// Discovery answer: gateway control endpoint plus raw description
    /// information blocks.
    SearchResponse {
        /// Gateway control endpoint.
        control: Hpai,
        /// Raw DIB blocks (device info, supported families).
        description: Bytes,
    },
    /// Device description query.
    DescriptionRequest {
        /// Endpoint the description-response should be sent to.
        control: Hpai,
    },
    /// Device description answer as raw DIB blocks.
    DescriptionResponse {
        /// Raw DIB blocks.
        description: Bytes,
    },
    /// Tunnel connection handshake.
    ConnectRequest {
        /// Control endpoint of the client.
        control: Hpai,
        /// Data endpoint of the client.
        data: Hpai,
        /// Requested tunnel layer.
        cri: TunnelCri,
    },
    /// Tunnel connection answer.
    ConnectResponse {
        /// Channel id assigned by the gateway.
        channel_id: u8,
        /// Gateway status byte.
        status: u8,
        /// Data endpoint and CRD, present only on success.
        data: Option<(Hpai, TunnelCrd)>,
    },
    /// Tunnel liveness probe.
    ConnectionStateRequest {
        /// Channel being probed.
        channel_id: u8,
        /// Control endpoint of the client.
        control: Hpai,
    },
    /// Tunnel liveness answer.
    ConnectionStateResponse {
        /// Channel that was probed.
        channel_id: u8,
        /// Gateway status byte.
        status: u8,
    },
    /// Tunnel teardown request.
    DisconnectRequest {
        /// Channel being torn down.
        channel_id: u8,
        /// Control endpoint of the requester.
        control: Hpai,
    },
    /// Tunnel teardown acknowledgment.
    DisconnectResponse {
        /// Channel that was torn down.
        channel_id: u8,
        /// Status byte.
        status: u8,
    },
    /// cEMI frame carried over an established tunnel.
    TunnelingRequest {
        /// Tunnel channel id.
        channel_id: u8,
        /// Sequence counter tagging this request.
        seq: u8,
        /// The carried link-layer message.
        cemi: CemiMessage,
    },
    /// Acknowledgment of a tunneling request.
    TunnelingAck {
        /// Tunnel channel id.
        channel_id: u8,
        /// Acknowledged sequence counter.
        seq: u8,
        /// Status byte.
        status: u8,
    },
    /// cEMI frame broadcast on the routing multicast group.
    RoutingIndication {
        /// The carried link-layer message.
        cemi: CemiMessage,
    },
    /// Router signalled that frames were dropped.
    RoutingLostMessage {
        /// Router device state.
        device_state: u8,
        /// Number of lost frames.
        lost_messages: u16,
    },
    /// Secure session initiation (TCP only). Key material is opaque here.
    SessionRequest {
        /// Control endpoint of the client.
        control: Hpai,
        /// Client's public value (Curve25519, handled externally).
        public_key: [u8; 32],
    },
}

impl Body {
    /// The service type identifying this body on the wire.
    pub const fn service_type(&self) -> ServiceType {
        match self {
            Self::SearchRequest { .. } => ServiceType::SearchRequest,
            Self::SearchResponse { .. } => ServiceType::SearchResponse,
            Self::DescriptionRequest { .. } => ServiceType::DescriptionRequest,
            Self::DescriptionResponse { .. } => ServiceType::DescriptionResponse,
            Self::ConnectRequest { .. } => ServiceType::ConnectRequest,
            Self::ConnectResponse { .. } => ServiceType::ConnectResponse,
            Self::ConnectionStateRequest { .. } => ServiceType::ConnectionStateRequest,
            Self::ConnectionStateResponse { .. } => ServiceType::ConnectionStateResponse,
            Self::DisconnectRequest { .. } => ServiceType::DisconnectRequest,
            Self::DisconnectResponse { .. } => ServiceType::DisconnectResponse,
            Self::TunnelingRequest { .. } => ServiceType::TunnelingRequest,
            Self::TunnelingAck { .. } => ServiceType::TunnelingAck,
            Self::RoutingIndication { .. } => ServiceType::RoutingIndication,
            Self::RoutingLostMessage { .. } => ServiceType::RoutingLostMessage,
            Self::SessionRequest { .. } => ServiceType::SessionRequest,
        }
    }

    /// Serialize the body to bytes.
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::SearchRequest { discovery } => discovery.to_bytes().to_vec(),
            Self::SearchResponse {
                control,
                description,
            } => {
                let mut buf = control.to_bytes().to_vec();
                buf.extend_from_slice(description);
                buf
            }
            Self::DescriptionRequest { control } => control.to_bytes().to_vec(),
            Self::DescriptionResponse { description } => description.to_vec(),
            Self::ConnectRequest { control, data, cri } => {
                let mut buf = control.to_bytes().to_vec();
                buf.extend_from_slice(&data.to_bytes());
                buf.extend_from_slice(&cri.to_bytes());
                buf
            }
            Self::ConnectResponse {
                channel_id,
                status,
                data,
            } => {
                let mut buf = vec![*channel_id, *status];
                if let Some((hpai, crd)) = data {
                    buf.extend_from_slice(&hpai.to_bytes());
                    buf.extend_from_slice(&crd.to_bytes());
                }
                buf
            }
            Self::ConnectionStateRequest {
                channel_id,
                control,
            }
            | Self::DisconnectRequest {
                channel_id,
                control,
            } => {
                let mut buf = vec![*channel_id, 0x00];
                buf.extend_from_slice(&control.to_bytes());
                buf
            }
            Self::ConnectionStateResponse { channel_id, status }
            | Self::DisconnectResponse { channel_id, status } => {
                vec![*channel_id, *status]
            }
            Self::TunnelingRequest {
                channel_id,
                seq,
                cemi,
            } => {
                let mut buf = vec![CONNECTION_HEADER_SIZE as u8, *channel_id, *seq, 0x00];
                buf.extend_from_slice(&cemi.to_bytes());
                buf
            }
            Self::TunnelingAck {
                channel_id,
                seq,
                status,
            } => {
                vec![CONNECTION_HEADER_SIZE as u8, *channel_id, *seq, *status]
            }
            Self::RoutingIndication { cemi } => cemi.to_bytes(),
            Self::RoutingLostMessage {
                device_state,
                lost_messages,
            } => {
                let lost = lost_messages.to_be_bytes();
                vec![CONNECTION_HEADER_SIZE as u8, *device_state, lost[0], lost[1]]
            }
            Self::SessionRequest {
                control,
                public_key,
            } => {
                let mut buf = control.to_bytes().to_vec();
                buf.extend_from_slice(public_key);
                buf
            }
        }
    }

    /// Parse a body of the given service type from bytes.
    fn parse(service_type: ServiceType, data: &[u8]) -> Result<Self> {
        let need = |expected: usize| -> Result<()> {
            if data.len() < expected {
                Err(KnxIpError::BufferTooShort {
                    expected,
                    actual: data.len(),
                })
            } else {
                Ok(())
            }
        };

        match service_type {
            ServiceType::SearchRequest => Ok(Self::SearchRequest {
                discovery: Hpai::from_bytes(data)?,
            }),
            ServiceType::SearchResponse => {
                let control = Hpai::from_bytes(data)?;
                Ok(Self::SearchResponse {
                    control,
                    description: Bytes::copy_from_slice(&data[Hpai::SIZE..]),
                })
            }
            ServiceType::DescriptionRequest => Ok(Self::DescriptionRequest {
                control: Hpai::from_bytes(data)?,
            }),
            ServiceType::DescriptionResponse => Ok(Self::DescriptionResponse {
                description: Bytes::copy_from_slice(data),
            }),
            ServiceType::ConnectRequest => {
                need(Hpai::SIZE * 2 + TunnelCri::SIZE)?;
                Ok(Self::ConnectRequest {
                    control: Hpai::from_bytes(&data[..Hpai::SIZE])?,
                    data: Hpai::from_bytes(&data[Hpai::SIZE..])?,
                    cri: TunnelCri::from_bytes(&data[Hpai::SIZE * 2..])?,
                })
            }
            ServiceType::ConnectResponse => {
                need(2)?;
                let channel_id = data[0];
                let status = data[1];
                let data_block = if data.len() > 2 {
                    let hpai = Hpai::from_bytes(&data[2..])?;
                    let crd = TunnelCrd::from_bytes(&data[2 + Hpai::SIZE..])?;
                    Some((hpai, crd))
                } else {
                    None
                };
                Ok(Self::ConnectResponse {
                    channel_id,
                    status,
                    data: data_block,
                })
            }
            ServiceType::ConnectionStateRequest => {
                need(2 + Hpai::SIZE)?;
                Ok(Self::ConnectionStateRequest {
                    channel_id: data[0],
                    control: Hpai::from_bytes(&data[2..])?,
                })
            }
            ServiceType::ConnectionStateResponse => {
                need(2)?;
                Ok(Self::ConnectionStateResponse {
                    channel_id: data[0],
                    status: data[1],
                })
            }
            ServiceType::DisconnectRequest => {
                need(2 + Hpai::SIZE)?;
                Ok(Self::DisconnectRequest {
                    channel_id: data[0],
                    control: Hpai::from_bytes(&data[2..])?,
                })
            }
            ServiceType::DisconnectResponse => {
                need(2)?;
                Ok(Self::DisconnectResponse {
                    channel_id: data[0],
                    status: data[1],
                })
            }
            ServiceType::TunnelingRequest => {
                need(CONNECTION_HEADER_SIZE + CemiMessage::MIN_SIZE)?;
                Ok(Self::TunnelingRequest {
                    channel_id: data[1],
                    seq: data[2],
                    cemi: CemiMessage::from_bytes(&data[CONNECTION_HEADER_SIZE..])?,
                })
            }
            ServiceType::TunnelingAck => {
                need(CONNECTION_HEADER_SIZE)?;
                Ok(Self::TunnelingAck {
                    channel_id: data[1],
                    seq: data[2],
                    status: data[3],
                })
            }
            ServiceType::RoutingIndication => Ok(Self::RoutingIndication {
                cemi: CemiMessage::from_bytes(data)?,
            }),
            ServiceType::RoutingLostMessage => {
                need(CONNECTION_HEADER_SIZE)?;
                Ok(Self::RoutingLostMessage {
                    device_state: data[1],
                    lost_messages: u16::from_be_bytes([data[2], data[3]]),
                })
            }
            ServiceType::SessionRequest => {
                need(Hpai::SIZE + 32)?;
                let mut public_key = [0u8; 32];
                public_key.copy_from_slice(&data[Hpai::SIZE..Hpai::SIZE + 32]);
                Ok(Self::SessionRequest {
                    control: Hpai::from_bytes(data)?,
                    public_key,
                })
            }
        }
    }
}

/// A complete KNXnet/IP frame (header + body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header; the total length always matches the serialized body.
    pub header: KnxIpHeader,
    /// Service-specific body.
    pub body: Body,
}

impl Frame {
    /// Wrap a body into a frame, computing the header from the body.
    pub fn new(body: Body) -> Self {
        let body_len = body.to_bytes().len() as u16;
        Self {
            header: KnxIpHeader::new(body.service_type(), body_len),
            body,
        }
    }

    /// Parse a frame from bytes.
    ///
    /// Fails cleanly if the buffer is shorter than the declared total
    /// length or the service type is unrecognized.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = KnxIpHeader::from_bytes(data)?;
        let total = header.total_length as usize;
        if data.len() < total || total < HEADER_SIZE {
            return Err(KnxIpError::LengthMismatch {
                header_length: header.total_length,
                actual_length: data.len(),
            });
        }
        let body = Body::parse(header.service_type, &data[HEADER_SIZE..total])?;
        Ok(Self { header, body })
    }

    /// Serialize the frame to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body.to_bytes();
        let header = KnxIpHeader::new(self.body.service_type(), body.len() as u16);
        let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&body);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{GroupAddress, IndividualAddress, KnxAddress};
    use crate::cemi::{GroupService, GroupValue};
    use crate::types::{TunnelLayer, E_NO_ERROR};
    use std::net::Ipv4Addr;

    fn sample_cemi() -> CemiMessage {
        CemiMessage::l_data_req(
            IndividualAddress::new(15, 15, 200).unwrap(),
            KnxAddress::Group(GroupAddress::new(1, 2, 3).unwrap()),
            GroupService::Write(GroupValue::Short(1)),
            true,
        )
    }

    fn roundtrip(body: Body) {
        let frame = Frame::new(body);
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), frame.header.total_length as usize);
        let parsed = Frame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_roundtrip_connect_request() {
        let hpai = Hpai::udp(Ipv4Addr::new(192, 168, 1, 10), 3671);
        roundtrip(Body::ConnectRequest {
            control: hpai,
            data: hpai,
            cri: TunnelCri::new(TunnelLayer::LinkLayer),
        });
    }

    #[test]
    fn test_roundtrip_connect_response() {
        roundtrip(Body::ConnectResponse {
            channel_id: 5,
            status: E_NO_ERROR,
            data: Some((
                Hpai::udp(Ipv4Addr::new(192, 168, 1, 50), 3671),
                TunnelCrd {
                    address: IndividualAddress::new(1, 1, 250).unwrap(),
                },
            )),
        });

        // Error responses carry no data block.
        roundtrip(Body::ConnectResponse {
            channel_id: 0,
            status: 0x24,
            data: None,
        });
    }

    #[test]
    fn test_roundtrip_state_and_disconnect() {
        let hpai = Hpai::udp(Ipv4Addr::new(10, 0, 0, 2), 50001);
        roundtrip(Body::ConnectionStateRequest {
            channel_id: 7,
            control: hpai,
        });
        roundtrip(Body::ConnectionStateResponse {
            channel_id: 7,
            status: E_NO_ERROR,
        });
        roundtrip(Body::DisconnectRequest {
            channel_id: 7,
            control: hpai,
        });
        roundtrip(Body::DisconnectResponse {
            channel_id: 7,
            status: E_NO_ERROR,
        });
    }

    #[test]
    fn test_roundtrip_tunneling() {
        roundtrip(Body::TunnelingRequest {
            channel_id: 5,
            seq: 10,
            cemi: sample_cemi(),
        });
        roundtrip(Body::TunnelingAck {
            channel_id: 5,
            seq: 10,
            status: E_NO_ERROR,
        });
    }

    #[test]
    fn test_roundtrip_routing() {
        roundtrip(Body::RoutingIndication {
            cemi: sample_cemi(),
        });
        roundtrip(Body::RoutingLostMessage {
            device_state: 0,
            lost_messages: 3,
        });
    }

    #[test]
    fn test_roundtrip_discovery() {
        let hpai = Hpai::udp(Ipv4Addr::new(192, 168, 1, 10), 50000);
        roundtrip(Body::SearchRequest { discovery: hpai });
        roundtrip(Body::SearchResponse {
            control: hpai,
            description: Bytes::from_static(&[0x02, 0x02]),
        });
        roundtrip(Body::DescriptionRequest { control: hpai });
        roundtrip(Body::DescriptionResponse {
            description: Bytes::from_static(&[0x02, 0x01]),
        });
    }

    #[test]
    fn test_roundtrip_session_request() {
        roundtrip(Body::SessionRequest {
            control: Hpai::null(crate::types::IPV4_TCP),
            public_key: [0xAB; 32],
        });
    }

    #[test]
    fn test_parse_truncated_fails_cleanly() {
        let frame = Frame::new(Body::TunnelingRequest {
            channel_id: 1,
            seq: 0,
            cemi: sample_cemi(),
        });
        let bytes = frame.to_bytes();
        for cut in 0..bytes.len() {
            assert!(Frame::parse(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn test_parse_corrupt_cemi_fails_cleanly() {
        let frame = Frame::new(Body::TunnelingRequest {
            channel_id: 1,
            seq: 0,
            cemi: sample_cemi(),
        });
        let bytes = frame.to_bytes();
        // cEMI starts after the 6-byte header and 4-byte connection header.

        // Additional-info length pointing past the end of the datagram.
        let mut oversized = bytes.clone();
        oversized[11] = 0xFF;
        assert!(Frame::parse(&oversized).is_err());

        // NPDU length of zero, which leaves no room for an APCI octet.
        let mut zero_npdu = bytes.clone();
        zero_npdu[18] = 0x00;
        assert!(Frame::parse(&zero_npdu).is_err());
    }

    #[test]
    fn test_header_length_recomputed() {
        let frame = Frame::new(Body::DisconnectResponse {
            channel_id: 1,
            status: 0,
        });
        let bytes = frame.to_bytes();
        assert_eq!(bytes[4], 0x00);
        assert_eq!(bytes[5], 8); // 6 header + 2 body
    }
}
