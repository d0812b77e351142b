//! KNX individual and group addressing.
//!
//! Both address kinds occupy 16 bits on the wire. Individual addresses
//! identify a physical device (`area.line.device`, 4/4/8 bits); group
//! addresses identify a communication object in three-level notation
//! (`main/middle/sub`, 5/3/8 bits).

use std::fmt;
use std::str::FromStr;

use crate::error::KnxIpError;

/// Physical address of a KNX device (`area.line.device`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndividualAddress(pub u16);

impl IndividualAddress {
    /// Create from the three dotted components.
    ///
    /// Fails if area > 15, line > 15 or device > 255.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self, KnxIpError> {
        if area > 0x0F || line > 0x0F {
            return Err(KnxIpError::InvalidAddress(format!(
                "{area}.{line}.{device}"
            )));
        }
        Ok(Self(
            ((area as u16) << 12) | ((line as u16) << 8) | device as u16,
        ))
    }

    /// Area component (0-15).
    pub const fn area(self) -> u8 {
        ((self.0 >> 12) & 0x0F) as u8
    }

    /// Line component (0-15).
    pub const fn line(self) -> u8 {
        ((self.0 >> 8) & 0x0F) as u8
    }

    /// Device component (0-255).
    pub const fn device(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl From<u16> for IndividualAddress {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl FromStr for IndividualAddress {
    type Err = KnxIpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let (Some(a), Some(l), Some(d), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KnxIpError::InvalidAddress(s.to_string()));
        };
        let parse = |p: &str| {
            p.parse::<u8>()
                .map_err(|_| KnxIpError::InvalidAddress(s.to_string()))
        };
        Self::new(parse(a)?, parse(l)?, parse(d)?)
            .map_err(|_| KnxIpError::InvalidAddress(s.to_string()))
    }
}

/// KNX group address in three-level notation (`main/middle/sub`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroupAddress(pub u16);

impl GroupAddress {
    /// Create from the three slash-separated components.
    ///
    /// Fails if main > 31, middle > 7 or sub > 255.
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self, KnxIpError> {
        if main > 0x1F || middle > 0x07 {
            return Err(KnxIpError::InvalidAddress(format!(
                "{main}/{middle}/{sub}"
            )));
        }
        Ok(Self(
            ((main as u16) << 11) | ((middle as u16) << 8) | sub as u16,
        ))
    }

    /// Main group (0-31).
    pub const fn main(self) -> u8 {
        ((self.0 >> 11) & 0x1F) as u8
    }

    /// Middle group (0-7).
    pub const fn middle(self) -> u8 {
        ((self.0 >> 8) & 0x07) as u8
    }

    /// Sub group (0-255).
    pub const fn sub(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl From<u16> for GroupAddress {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl FromStr for GroupAddress {
    type Err = KnxIpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(m), Some(mid), Some(sub), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KnxIpError::InvalidAddress(s.to_string()));
        };
        let parse = |p: &str| {
            p.parse::<u8>()
                .map_err(|_| KnxIpError::InvalidAddress(s.to_string()))
        };
        Self::new(parse(m)?, parse(mid)?, parse(sub)?)
            .map_err(|_| KnxIpError::InvalidAddress(s.to_string()))
    }
}

/// Destination of an L_Data frame: group or individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnxAddress {
    /// Group address destination (the usual case for group communication).
    Group(GroupAddress),
    /// Individual device destination.
    Individual(IndividualAddress),
}

impl KnxAddress {
    /// Raw 16-bit wire value.
    pub const fn raw(self) -> u16 {
        match self {
            Self::Group(a) => a.0,
            Self::Individual(a) => a.0,
        }
    }

    /// Whether this is a group destination (drives the control-field
    /// address-type bit).
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group(_))
    }
}

impl From<GroupAddress> for KnxAddress {
    fn from(a: GroupAddress) -> Self {
        Self::Group(a)
    }
}

impl From<IndividualAddress> for KnxAddress {
    fn from(a: IndividualAddress) -> Self {
        Self::Individual(a)
    }
}

impl fmt::Display for KnxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(a) => a.fmt(f),
            Self::Individual(a) => a.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_individual_address_components() {
        let addr = IndividualAddress::new(15, 15, 200).unwrap();
        assert_eq!(addr.area(), 15);
        assert_eq!(addr.line(), 15);
        assert_eq!(addr.device(), 200);
        assert_eq!(addr.to_string(), "15.15.200");
    }

    #[test]
    fn test_individual_address_parse() {
        let addr: IndividualAddress = "1.1.1".parse().unwrap();
        assert_eq!(addr, IndividualAddress::new(1, 1, 1).unwrap());

        assert!("1.1".parse::<IndividualAddress>().is_err());
        assert!("16.0.0".parse::<IndividualAddress>().is_err());
        assert!("a.b.c".parse::<IndividualAddress>().is_err());
    }

    #[test]
    fn test_group_address_components() {
        let addr = GroupAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.main(), 1);
        assert_eq!(addr.middle(), 2);
        assert_eq!(addr.sub(), 3);
        assert_eq!(addr.0, 0x0A03);
        assert_eq!(addr.to_string(), "1/2/3");
    }

    #[test]
    fn test_group_address_parse() {
        let addr: GroupAddress = "31/7/255".parse().unwrap();
        assert_eq!(addr.main(), 31);
        assert_eq!(addr.middle(), 7);
        assert_eq!(addr.sub(), 255);

        assert!("32/0/0".parse::<GroupAddress>().is_err());
        assert!("1/8/0".parse::<GroupAddress>().is_err());
        assert!("1/2/3/4".parse::<GroupAddress>().is_err());
    }

    #[test]
    fn test_knx_address_raw() {
        let group = KnxAddress::from(GroupAddress::new(1, 2, 3).unwrap());
        assert!(group.is_group());
        assert_eq!(group.raw(), 0x0A03);

        let ind = KnxAddress::from(IndividualAddress::new(1, 1, 1).unwrap());
        assert!(!ind.is_group());
    }
}
