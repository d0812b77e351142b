//! KNXnet/IP tunneling and routing client built on tokio.
//!
//! This crate speaks the KNXnet/IP protocol family used to control
//! building-automation (KNX) buses over IP: it establishes and maintains a
//! tunnel (UDP or TCP) or multicast routing channel to a KNX/IP gateway,
//! encodes/decodes the binary KNXnet/IP and cEMI frame formats, and exposes
//! read/write/respond operations against KNX group addresses.
//!
//! # Features
//!
//! - Tunneling over UDP and TCP, and connectionless multicast routing
//! - Full connection lifecycle: connect, heartbeat, disconnect, with the
//!   per-sequence acknowledgment protocol
//! - Typed frame codec for every KNXnet/IP service, plus the cEMI
//!   link-layer format
//! - Gateway discovery and description queries
//! - Datapoint value encoding for the common DPT families
//!
//! # Example
//!
//! ```no_run
//! use knxip_rs::connection::{KnxClient, KnxOptions};
//! use knxip_rs::addressing::GroupAddress;
//! use knxip_rs::dpt::DptValue;
//! use knxip_rs::types::TunnelLayer;
//!
//! # async fn example() -> knxip_rs::Result<()> {
//! let options = KnxOptions::new("192.168.1.50".parse().unwrap(), 3671);
//! let (mut client, mut events) = KnxClient::new(options);
//! client.connect(TunnelLayer::LinkLayer).await?;
//!
//! // Drive the engine and consume events elsewhere; once connected:
//! let lamp: GroupAddress = "1/2/3".parse()?;
//! client.group_write(lamp, &DptValue::Bool(true), "1.001").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Frame format
//!
//! Every KNXnet/IP frame starts with a fixed 6-byte header:
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+
//! |  0x06  |  0x10  |  Service Type   |  Total Length   |
//! +--------+--------+--------+--------+--------+--------+
//! |                 Service body ...                    |
//! +-----------------------------------------------------+
//! ```
//!
//! Group telegrams travel inside tunneling-request or routing-indication
//! bodies as cEMI `L_Data` frames.

pub mod addressing;
pub mod cemi;
pub mod connection;
pub mod dpt;
pub mod error;
pub mod frame;
pub mod header;
pub mod hpai;
pub mod transport;
pub mod types;

// Re-export commonly used types at the crate root
pub use addressing::{GroupAddress, IndividualAddress, KnxAddress};
pub use cemi::{CemiCode, CemiMessage, GroupService, GroupValue};
pub use connection::{ConnectionState, HostProtocol, KnxClient, KnxEvent, KnxOptions};
pub use dpt::{DefaultDptEncoder, DptEncoder, DptValue};
pub use error::{KnxIpError, Result};
pub use frame::{Body, Frame};
pub use header::{KnxIpHeader, HEADER_SIZE};
pub use types::{ServiceType, TunnelLayer, KNX_MULTICAST_ADDR, KNX_PORT, PROTOCOL_VERSION};
