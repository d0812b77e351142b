//! Datapoint type (DPT) value encoding.
//!
//! The engine never interprets application values itself; it hands them to
//! a [`DptEncoder`] which maps them to raw NPDU payload bytes. Decoding of
//! inbound payloads stays with the caller.

use crate::cemi::GroupValue;
use crate::error::{KnxIpError, Result};
use bytes::Bytes;

/// An application value to be encoded for a group write or response.
#[derive(Debug, Clone, PartialEq)]
pub enum DptValue {
    /// Boolean / 1-bit value (DPT 1.x).
    Bool(bool),
    /// Unsigned integer value (DPT 5.x, 7.x).
    Unsigned(u32),
    /// Floating point value (DPT 5.001 scaling, 9.x).
    Float(f64),
    /// Pre-encoded payload bytes, passed through untouched.
    Raw(Bytes),
}

/// Maps an application value and a DPT identifier ("main.sub", e.g.
/// "1.001" or "9.001") to the raw group-object payload.
pub trait DptEncoder {
    /// Encode `value` according to `dpt_id`.
    fn encode(&self, value: &DptValue, dpt_id: &str) -> Result<GroupValue>;
}

/// Encoder for the common DPT families used on the write path.
///
/// | Family | Value        | Encoding                               |
/// |--------|--------------|----------------------------------------|
/// | 1.x    | bool         | single bit, merged into the APCI octet |
/// | 5.001  | float 0..100 | one byte, scaled to 0..255             |
/// | 5.x    | u8           | one byte                               |
/// | 7.x    | u16          | two bytes, big endian                  |
/// | 9.x    | float        | KNX 16-bit float                       |
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDptEncoder;

impl DptEncoder for DefaultDptEncoder {
    fn encode(&self, value: &DptValue, dpt_id: &str) -> Result<GroupValue> {
        if let DptValue::Raw(bytes) = value {
            return Ok(GroupValue::Data(bytes.clone()));
        }

        let (main, sub) = parse_dpt_id(dpt_id)?;
        match (main, value) {
            (1, DptValue::Bool(b)) => Ok(GroupValue::Short(*b as u8)),
            (1, DptValue::Unsigned(v)) if *v <= 1 => Ok(GroupValue::Short(*v as u8)),

            (5, DptValue::Float(pct)) if sub == Some(1) => {
                if !(0.0..=100.0).contains(pct) {
                    return Err(KnxIpError::UnsupportedDpt(format!(
                        "DPT 5.001 value {pct} out of range 0..100"
                    )));
                }
                let scaled = (pct * 255.0 / 100.0).round() as u8;
                Ok(GroupValue::Data(Bytes::copy_from_slice(&[scaled])))
            }
            (5, DptValue::Unsigned(v)) => {
                let byte = u8::try_from(*v).map_err(|_| {
                    KnxIpError::UnsupportedDpt(format!("DPT 5.x value {v} exceeds one byte"))
                })?;
                Ok(GroupValue::Data(Bytes::copy_from_slice(&[byte])))
            }

            (7, DptValue::Unsigned(v)) => {
                let word = u16::try_from(*v).map_err(|_| {
                    KnxIpError::UnsupportedDpt(format!("DPT 7.x value {v} exceeds two bytes"))
                })?;
                Ok(GroupValue::Data(Bytes::copy_from_slice(&word.to_be_bytes())))
            }

            (9, DptValue::Float(v)) => {
                let raw = encode_f16(*v)?;
                Ok(GroupValue::Data(Bytes::copy_from_slice(&raw.to_be_bytes())))
            }

            _ => Err(KnxIpError::UnsupportedDpt(format!(
                "no encoding for value {value:?} as DPT {dpt_id}"
            ))),
        }
    }
}

/// Split a "main.sub" DPT identifier. The sub number is optional.
fn parse_dpt_id(dpt_id: &str) -> Result<(u16, Option<u16>)> {
    let mut parts = dpt_id.splitn(2, '.');
    let main = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| KnxIpError::UnsupportedDpt(format!("malformed DPT id {dpt_id:?}")))?;
    let sub = match parts.next() {
        Some(s) => Some(
            s.parse()
                .map_err(|_| KnxIpError::UnsupportedDpt(format!("malformed DPT id {dpt_id:?}")))?,
        ),
        None => None,
    };
    Ok((main, sub))
}

/// Encode a KNX 16-bit float (sign, 4-bit exponent, 11-bit mantissa,
/// resolution 0.01).
fn encode_f16(value: f64) -> Result<u16> {
    if !value.is_finite() || !(-671_088.64..=670_760.96).contains(&value) {
        return Err(KnxIpError::UnsupportedDpt(format!(
            "DPT 9.x value {value} out of representable range"
        )));
    }
    let mut mantissa = (value * 100.0).round() as i32;
    let mut exponent = 0u16;
    while !(-2048..=2047).contains(&mantissa) {
        mantissa >>= 1;
        exponent += 1;
    }
    let sign = if value < 0.0 { 0x8000 } else { 0x0000 };
    Ok(sign | (exponent << 11) | (mantissa as u16 & 0x07FF))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: DptValue, dpt: &str) -> GroupValue {
        DefaultDptEncoder.encode(&value, dpt).unwrap()
    }

    #[test]
    fn test_dpt1_bool() {
        assert_eq!(encode(DptValue::Bool(true), "1.001"), GroupValue::Short(1));
        assert_eq!(encode(DptValue::Bool(false), "1.001"), GroupValue::Short(0));
        assert_eq!(encode(DptValue::Unsigned(1), "1.001"), GroupValue::Short(1));
    }

    #[test]
    fn test_dpt5_scaling() {
        assert_eq!(
            encode(DptValue::Float(100.0), "5.001"),
            GroupValue::Data(Bytes::from_static(&[0xFF]))
        );
        assert_eq!(
            encode(DptValue::Float(50.0), "5.001"),
            GroupValue::Data(Bytes::from_static(&[0x80]))
        );
        assert!(DefaultDptEncoder
            .encode(&DptValue::Float(101.0), "5.001")
            .is_err());
    }

    #[test]
    fn test_dpt5_u8() {
        assert_eq!(
            encode(DptValue::Unsigned(42), "5.010"),
            GroupValue::Data(Bytes::from_static(&[42]))
        );
        assert!(DefaultDptEncoder
            .encode(&DptValue::Unsigned(256), "5.010")
            .is_err());
    }

    #[test]
    fn test_dpt7_u16() {
        assert_eq!(
            encode(DptValue::Unsigned(0x1234), "7.001"),
            GroupValue::Data(Bytes::from_static(&[0x12, 0x34]))
        );
    }

    #[test]
    fn test_dpt9_float() {
        // 21.0 C encodes as 0x0C1A in KNX half-float.
        assert_eq!(
            encode(DptValue::Float(21.0), "9.001"),
            GroupValue::Data(Bytes::from_static(&[0x0C, 0x1A]))
        );
        // 0.0 is all zeros.
        assert_eq!(
            encode(DptValue::Float(0.0), "9.001"),
            GroupValue::Data(Bytes::from_static(&[0x00, 0x00]))
        );
        assert!(DefaultDptEncoder
            .encode(&DptValue::Float(1e9), "9.001")
            .is_err());
    }

    #[test]
    fn test_raw_passthrough() {
        let payload = Bytes::from_static(&[0xDE, 0xAD]);
        assert_eq!(
            encode(DptValue::Raw(payload.clone()), "9.001"),
            GroupValue::Data(payload)
        );
    }

    #[test]
    fn test_malformed_dpt_id() {
        assert!(DefaultDptEncoder
            .encode(&DptValue::Bool(true), "abc")
            .is_err());
        assert!(DefaultDptEncoder
            .encode(&DptValue::Bool(true), "1.x")
            .is_err());
    }
}
