//! Typed client events.
//!
//! All asynchronous-path outcomes (indications, responses, failures) are
//! surfaced through one event channel; nothing is thrown across an event
//! boundary.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::cemi::CemiMessage;
use crate::error::KnxIpError;
use crate::frame::Frame;

/// Events raised by a [`KnxClient`](super::client::KnxClient).
#[derive(Debug)]
pub enum KnxEvent {
    /// A connect attempt has started.
    Connecting,
    /// The connection is established; group traffic is now allowed.
    Connected,
    /// The connection was torn down, with the reason.
    Disconnected(String),
    /// A bus telegram arrived (or was locally echoed).
    Indication {
        /// The parsed link-layer message.
        message: CemiMessage,
        /// True when this reports a telegram this client just sent.
        local_echo: bool,
        /// Hex rendering of the raw cEMI bytes.
        raw: String,
    },
    /// An awaited control-flow response arrived (description,
    /// connection-state and similar request flows).
    Response {
        /// Address the response came from.
        sender: SocketAddr,
        /// The parsed frame.
        frame: Frame,
    },
    /// A gateway answered a discovery probe.
    Discover {
        /// Address the search-response came from.
        sender: SocketAddr,
        /// The parsed frame carrying the gateway's description blocks.
        frame: Frame,
    },
    /// An asynchronous-path failure.
    Error(KnxIpError),
}

/// Single emission point for client events.
///
/// Emitting never fails: if the receiver is gone the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<KnxEvent>,
}

impl EventBus {
    /// Create a bus and the receiving end callers consume events from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<KnxEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish one event.
    pub fn emit(&self, event: KnxEvent) {
        let _ = self.tx.send(event);
    }
}
