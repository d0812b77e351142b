//! Connection engine: state machine, sequence tracking, heartbeat and
//! event delivery.
//!
//! # Example
//!
//! ```no_run
//! use knxip_rs::connection::{KnxClient, KnxOptions, KnxEvent};
//! use knxip_rs::types::TunnelLayer;
//!
//! # async fn example() -> knxip_rs::Result<()> {
//! let options = KnxOptions::new("192.168.1.50".parse().unwrap(), 3671);
//! let (mut client, mut events) = KnxClient::new(options);
//!
//! client.connect(TunnelLayer::LinkLayer).await?;
//!
//! tokio::select! {
//!     _ = client.run() => {}
//!     event = events.recv() => {
//!         if let Some(KnxEvent::Connected) = event {
//!             // ready for group traffic
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod events;
pub mod heartbeat;
pub mod options;
pub mod sequence;
pub mod state;

pub use client::KnxClient;
pub use events::{EventBus, KnxEvent};
pub use heartbeat::HeartbeatMonitor;
pub use options::{HostProtocol, KnxOptions};
pub use sequence::{PendingRequest, SequenceTracker};
pub use state::ConnectionState;
