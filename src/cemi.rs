//! Common External Message Interface (cEMI) link-layer frames.
//!
//! cEMI is the frame format KNX telegrams travel in when carried over
//! KNXnet/IP. This module builds outgoing `L_Data.req` frames and parses
//! inbound indications/confirmations, including the control-field bit
//! layouts and the group-object NPDU.
//!
//! ```text
//! +------------------------------------------+
//! | Message Code (1 byte)                    |
//! | Additional Info Length (1 byte)          |
//! | Additional Info (variable)               |
//! | Control Field 1 (1 byte)                 |
//! | Control Field 2 (1 byte)                 |
//! | Source Address (2 bytes)                 |
//! | Destination Address (2 bytes)            |
//! | NPDU Length (1 byte)                     |
//! | TPCI/APCI (2 bytes)                      |
//! | Data (variable)                          |
//! +------------------------------------------+
//! ```

use bytes::Bytes;

use crate::addressing::{GroupAddress, IndividualAddress, KnxAddress};
use crate::error::{KnxIpError, Result};

/// cEMI message codes for L_Data frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CemiCode {
    /// `L_Data.req` - outgoing data request.
    LDataReq = 0x11,
    /// `L_Data.ind` - inbound bus telegram indication.
    LDataInd = 0x29,
    /// `L_Data.con` - confirmation of a previously sent request.
    LDataCon = 0x2E,
}

impl CemiCode {
    /// Convert a raw message code byte to a `CemiCode`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x11 => Some(Self::LDataReq),
            0x29 => Some(Self::LDataInd),
            0x2E => Some(Self::LDataCon),
            _ => None,
        }
    }

    /// Whether this code marks an indication (telegram from the bus).
    pub const fn is_indication(self) -> bool {
        matches!(self, Self::LDataInd)
    }

    /// Whether this code marks a confirmation of a local send.
    pub const fn is_confirmation(self) -> bool {
        matches!(self, Self::LDataCon)
    }
}

/// Control Field 1.
///
/// ```text
/// Bit 7: Frame Type (1=standard)
/// Bit 5: Repeat (1=do not repeat)
/// Bit 4: System Broadcast (1=broadcast)
/// Bit 3-2: Priority (00=system, 01=normal, 10=urgent, 11=low)
/// Bit 1: Acknowledge Request
/// Bit 0: Confirm Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField1(pub u8);

impl ControlField1 {
    /// The profile used for every outgoing telegram: standard frame, do not
    /// repeat, broadcast, low priority. The ack bit is set separately.
    pub const OUTGOING: Self = Self(0xBC);

    /// Whether the acknowledge-request bit is set.
    pub const fn ack_requested(self) -> bool {
        self.0 & 0x02 != 0
    }

    /// Return a copy with the acknowledge-request bit set or cleared.
    pub const fn with_ack(self, ack: bool) -> Self {
        if ack {
            Self(self.0 | 0x02)
        } else {
            Self(self.0 & !0x02)
        }
    }

    /// Whether the broadcast bit is set.
    pub const fn is_broadcast(self) -> bool {
        self.0 & 0x10 != 0
    }

    /// Priority bits (0-3).
    pub const fn priority(self) -> u8 {
        (self.0 >> 2) & 0x03
    }
}

/// Control Field 2.
///
/// ```text
/// Bit 7: Destination Address Type (1=group)
/// Bit 6-4: Hop Count
/// Bit 3-0: Extended Frame Format
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField2(pub u8);

impl ControlField2 {
    /// Build a control field 2 for the given address type with hop count 6.
    pub const fn for_destination(is_group: bool) -> Self {
        if is_group {
            Self(0x80 | (6 << 4))
        } else {
            Self(6 << 4)
        }
    }

    /// Whether the destination is a group address.
    pub const fn is_group_address(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Hop count (0-7).
    pub const fn hop_count(self) -> u8 {
        (self.0 >> 4) & 0x07
    }
}

/// Application payload of a group-object service.
///
/// Values of six bits or fewer ride inside the APCI octet itself; anything
/// larger follows as separate octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupValue {
    /// Value merged into the APCI octet (low 6 bits).
    Short(u8),
    /// Value carried as separate octets after the APCI.
    Data(Bytes),
}

impl GroupValue {
    /// Number of octets the NPDU length field counts for this value
    /// (the APCI octet plus any trailing data).
    fn npdu_length(&self) -> usize {
        match self {
            Self::Short(_) => 1,
            Self::Data(data) => 1 + data.len(),
        }
    }

    /// The raw application bytes, regardless of encoding form.
    pub fn as_bytes(&self) -> Bytes {
        match self {
            Self::Short(v) => Bytes::copy_from_slice(&[*v]),
            Self::Data(data) => data.clone(),
        }
    }
}

/// Group-object service carried in the NPDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupService {
    /// `A_GroupValue_Read` - ask the bus for the current value.
    Read,
    /// `A_GroupValue_Write` - set a new value.
    Write(GroupValue),
    /// `A_GroupValue_Response` - answer a read.
    Response(GroupValue),
}

impl GroupService {
    const APCI_READ: u8 = 0x00;
    const APCI_RESPONSE: u8 = 0x40;
    const APCI_WRITE: u8 = 0x80;

    /// Short name used in send-path logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write(_) => "Write",
            Self::Response(_) => "Response",
        }
    }
}

/// A cEMI L_Data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CemiMessage {
    /// Message code.
    pub code: CemiCode,
    /// Control field 1.
    pub ctrl1: ControlField1,
    /// Control field 2.
    pub ctrl2: ControlField2,
    /// Source individual address.
    pub source: IndividualAddress,
    /// Destination group or individual address.
    pub destination: KnxAddress,
    /// Group-object service and payload.
    pub service: GroupService,
}

impl CemiMessage {
    /// Minimum serialized size: code, add-info len, two control fields,
    /// source, destination, NPDU length, TPCI and APCI octets.
    pub const MIN_SIZE: usize = 11;

    /// Build an outgoing `L_Data.req` with the fixed control profile
    /// (standard frame, broadcast, low priority, hop count 6).
    pub fn l_data_req(
        source: IndividualAddress,
        destination: KnxAddress,
        service: GroupService,
        ack: bool,
    ) -> Self {
        Self {
            code: CemiCode::LDataReq,
            ctrl1: ControlField1::OUTGOING.with_ack(ack),
            ctrl2: ControlField2::for_destination(destination.is_group()),
            source,
            destination,
            service,
        }
    }

    /// Parse a cEMI message from bytes, skipping any additional info block.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(KnxIpError::BufferTooShort {
                expected: Self::MIN_SIZE,
                actual: data.len(),
            });
        }

        let code = CemiCode::from_u8(data[0]).ok_or(KnxIpError::UnknownMessageCode(data[0]))?;
        let add_info_len = data[1] as usize;
        let body = data
            .get(2 + add_info_len..)
            .ok_or(KnxIpError::BufferTooShort {
                expected: 2 + add_info_len + (Self::MIN_SIZE - 2),
                actual: data.len(),
            })?;
        if body.len() < Self::MIN_SIZE - 2 {
            return Err(KnxIpError::BufferTooShort {
                expected: 2 + add_info_len + Self::MIN_SIZE - 2,
                actual: data.len(),
            });
        }

        let ctrl1 = ControlField1(body[0]);
        let ctrl2 = ControlField2(body[1]);
        let source = IndividualAddress(u16::from_be_bytes([body[2], body[3]]));
        let dst_raw = u16::from_be_bytes([body[4], body[5]]);
        let destination = if ctrl2.is_group_address() {
            KnxAddress::Group(GroupAddress(dst_raw))
        } else {
            KnxAddress::Individual(IndividualAddress(dst_raw))
        };

        let npdu_len = body[6] as usize;
        // NPDU length counts the APCI octet and trailing data, not the TPCI;
        // zero leaves no room for an APCI octet at all.
        if npdu_len == 0 || body.len() < 7 + 1 + npdu_len {
            return Err(KnxIpError::LengthMismatch {
                header_length: npdu_len as u16,
                actual_length: body.len().saturating_sub(8),
            });
        }
        let tpci_apci = body[7];
        let apci_octet = body[8];
        let apci = ((tpci_apci as u16 & 0x03) << 8) | (apci_octet as u16 & 0xC0);

        let value = if npdu_len == 1 {
            GroupValue::Short(apci_octet & 0x3F)
        } else {
            GroupValue::Data(Bytes::copy_from_slice(&body[9..8 + npdu_len]))
        };

        let service = match apci {
            0x000 => GroupService::Read,
            0x040 => GroupService::Response(value),
            0x080 => GroupService::Write(value),
            other => {
                return Err(KnxIpError::UnknownMessageCode((other >> 2) as u8));
            }
        };

        Ok(Self {
            code,
            ctrl1,
            ctrl2,
            source,
            destination,
            service,
        })
    }

    /// Serialize the message to bytes (no additional info).
    pub fn to_bytes(&self) -> Vec<u8> {
        let (apci, value) = match &self.service {
            GroupService::Read => (GroupService::APCI_READ, None),
            GroupService::Response(v) => (GroupService::APCI_RESPONSE, Some(v)),
            GroupService::Write(v) => (GroupService::APCI_WRITE, Some(v)),
        };

        let npdu_len = value.map_or(1, GroupValue::npdu_length);
        let mut buf = Vec::with_capacity(Self::MIN_SIZE + npdu_len);
        buf.push(self.code as u8);
        buf.push(0x00);
        buf.push(self.ctrl1.0);
        buf.push(self.ctrl2.0);
        buf.extend_from_slice(&self.source.0.to_be_bytes());
        buf.extend_from_slice(&self.destination.raw().to_be_bytes());
        buf.push(npdu_len as u8);
        buf.push(0x00); // TPCI: unnumbered data

        match value {
            None => buf.push(apci),
            Some(GroupValue::Short(v)) => buf.push(apci | (v & 0x3F)),
            Some(GroupValue::Data(data)) => {
                buf.push(apci);
                buf.extend_from_slice(data);
            }
        }

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_field1_ack() {
        let ctrl = ControlField1::OUTGOING;
        assert!(!ctrl.ack_requested());
        assert!(ctrl.is_broadcast());
        assert_eq!(ctrl.priority(), 0b11);

        let with_ack = ctrl.with_ack(true);
        assert!(with_ack.ack_requested());
        assert_eq!(with_ack.0, 0xBE);
        assert_eq!(with_ack.with_ack(false), ctrl);
    }

    #[test]
    fn test_control_field2() {
        let group = ControlField2::for_destination(true);
        assert!(group.is_group_address());
        assert_eq!(group.hop_count(), 6);
        assert_eq!(group.0, 0xE0);

        let individual = ControlField2::for_destination(false);
        assert!(!individual.is_group_address());
    }

    #[test]
    fn test_short_write_roundtrip() {
        let msg = CemiMessage::l_data_req(
            IndividualAddress::new(15, 15, 200).unwrap(),
            KnxAddress::Group(GroupAddress::new(1, 2, 3).unwrap()),
            GroupService::Write(GroupValue::Short(1)),
            true,
        );

        let bytes = msg.to_bytes();
        // NPDU length 1, value merged into the APCI octet.
        assert_eq!(bytes[8], 0x01);
        assert_eq!(bytes[9], 0x00);
        assert_eq!(bytes[10], 0x81);

        let parsed = CemiMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_data_write_roundtrip() {
        let msg = CemiMessage::l_data_req(
            IndividualAddress::new(1, 1, 1).unwrap(),
            KnxAddress::Group(GroupAddress::new(4, 0, 1).unwrap()),
            GroupService::Write(GroupValue::Data(Bytes::from_static(&[0x0C, 0x1A]))),
            false,
        );

        let bytes = msg.to_bytes();
        // NPDU length counts APCI + 2 data octets.
        assert_eq!(bytes[8], 0x03);
        assert_eq!(bytes[10], 0x80);
        assert_eq!(&bytes[11..], &[0x0C, 0x1A]);

        let parsed = CemiMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_read_roundtrip() {
        let msg = CemiMessage::l_data_req(
            IndividualAddress::new(1, 1, 1).unwrap(),
            KnxAddress::Group(GroupAddress::new(5, 6, 7).unwrap()),
            GroupService::Read,
            false,
        );

        let bytes = msg.to_bytes();
        assert_eq!(bytes[8], 0x01);
        assert_eq!(bytes[10], 0x00);

        let parsed = CemiMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.service, GroupService::Read);
        assert!(!parsed.ctrl1.ack_requested());
    }

    #[test]
    fn test_parse_indication() {
        // L_Data.ind: group response 5/1/2 with merged value 0x30
        let data = [
            0x29, 0x00, 0xBC, 0xE0, 0x12, 0x02, 0x29, 0x02, 0x01, 0x00, 0x70,
        ];
        let msg = CemiMessage::from_bytes(&data).unwrap();
        assert_eq!(msg.code, CemiCode::LDataInd);
        assert!(msg.code.is_indication());
        assert_eq!(
            msg.destination,
            KnxAddress::Group(GroupAddress::new(5, 1, 2).unwrap())
        );
        assert_eq!(
            msg.service,
            GroupService::Response(GroupValue::Short(0x30))
        );
    }

    #[test]
    fn test_parse_with_additional_info() {
        let data = [
            0x29, 0x02, 0xAA, 0xBB, // add info skipped
            0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x01, 0x00, 0x80,
        ];
        let msg = CemiMessage::from_bytes(&data).unwrap();
        assert_eq!(msg.source, IndividualAddress::new(1, 1, 1).unwrap());
        assert_eq!(msg.service, GroupService::Write(GroupValue::Short(0)));
    }

    #[test]
    fn test_parse_unknown_code() {
        let data = [0xFF; 11];
        assert!(matches!(
            CemiMessage::from_bytes(&data),
            Err(KnxIpError::UnknownMessageCode(0xFF))
        ));
    }

    #[test]
    fn test_parse_truncated() {
        let data = [0x29, 0x00, 0xBC];
        assert!(matches!(
            CemiMessage::from_bytes(&data),
            Err(KnxIpError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_parse_additional_info_beyond_buffer() {
        // Additional-info length claims 255 octets but only 9 follow.
        let data = [
            0x29, 0xFF, 0xBC, 0xE0, 0x12, 0x02, 0x29, 0x02, 0x01, 0x00, 0x70,
        ];
        assert!(matches!(
            CemiMessage::from_bytes(&data),
            Err(KnxIpError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_parse_zero_npdu_length() {
        // Well-formed layout except the NPDU length byte is zero, which
        // leaves no room for an APCI octet.
        let data = [
            0x29, 0x00, 0xBC, 0xE0, 0x12, 0x02, 0x29, 0x02, 0x00, 0x00, 0x70,
        ];
        assert!(matches!(
            CemiMessage::from_bytes(&data),
            Err(KnxIpError::LengthMismatch { .. })
        ));
    }
}
