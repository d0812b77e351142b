//! The KNXnet/IP client engine.
//!
//! A [`KnxClient`] owns all connection state: the transport, the state
//! machine, the channel identity, the sequence tracker and the heartbeat
//! monitor. Every mutation goes through one of its `&mut self` entry
//! points, so inbound frames, timer expiries and public operations are
//! serialized without any locking. [`KnxClient::run`] drives the engine;
//! outcomes are delivered on the event channel handed out at construction.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::addressing::KnxAddress;
use crate::cemi::{CemiMessage, GroupService, GroupValue};
use crate::dpt::{DefaultDptEncoder, DptEncoder, DptValue};
use crate::error::{KnxIpError, Result};
use crate::frame::{Body, Frame};
use crate::hpai::{Hpai, TunnelCri};
use crate::transport::Transport;
use crate::types::{
    status_to_string, ServiceType, TunnelLayer, CONNECT_REQUEST_TIMEOUT,
    DEVICE_CONFIGURATION_REQUEST_TIMEOUT, DISCONNECT_REQUEST_TIMEOUT, E_NO_ERROR, IPV4_TCP,
    KNX_MULTICAST_ADDR, KNX_PORT, SEARCH_TIMEOUT, TUNNELING_REQUEST_TIMEOUT,
};

use super::events::{EventBus, KnxEvent};
use super::heartbeat::HeartbeatMonitor;
use super::options::{HostProtocol, KnxOptions};
use super::sequence::{PendingRequest, SequenceTracker};
use super::state::ConnectionState;

/// What woke the event loop up.
enum Wakeup {
    Datagram(Result<(Bytes, SocketAddr)>),
    Deadline,
}

/// A KNXnet/IP tunneling/routing client.
pub struct KnxClient {
    options: KnxOptions,
    encoder: Box<dyn DptEncoder + Send + Sync>,
    transport: Option<Transport>,
    state: ConnectionState,
    channel_id: Option<u8>,
    local_port: u16,
    sequence: SequenceTracker,
    heartbeat: HeartbeatMonitor,
    events: EventBus,
    connect_deadline: Option<Instant>,
    disconnect_deadline: Option<Instant>,
    discovery_until: Option<Instant>,
    awaiting_response: Option<(ServiceType, Instant)>,
}

impl KnxClient {
    /// Create a client with the default datapoint encoder. The returned
    /// receiver delivers all [`KnxEvent`]s.
    pub fn new(options: KnxOptions) -> (Self, UnboundedReceiver<KnxEvent>) {
        Self::with_encoder(options, DefaultDptEncoder)
    }

    /// Create a client with a custom datapoint encoder.
    pub fn with_encoder(
        options: KnxOptions,
        encoder: impl DptEncoder + Send + Sync + 'static,
    ) -> (Self, UnboundedReceiver<KnxEvent>) {
        let (events, rx) = EventBus::channel();
        (
            Self {
                options,
                encoder: Box::new(encoder),
                transport: None,
                state: ConnectionState::default(),
                channel_id: None,
                local_port: 0,
                sequence: SequenceTracker::default(),
                heartbeat: HeartbeatMonitor::default(),
                events,
                connect_deadline: None,
                disconnect_deadline: None,
                discovery_until: None,
                awaiting_response: None,
            },
            rx,
        )
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether group traffic is currently allowed.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Channel id assigned by the gateway, while connected.
    pub fn channel_id(&self) -> Option<u8> {
        self.channel_id
    }

    /// The configuration this client was built with.
    pub fn options(&self) -> &KnxOptions {
        &self.options
    }

    /// Establish the connection.
    ///
    /// UDP/TCP tunneling sends a connect-request and completes
    /// asynchronously when the connect-response arrives (drive the engine
    /// with [`run`](Self::run) or [`step`](Self::step)). Multicast routing
    /// has no handshake and is connected on return.
    pub async fn connect(&mut self, layer: TunnelLayer) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(KnxIpError::InvalidState(
                "connect attempted while a connection exists",
            ));
        }
        self.events.emit(KnxEvent::Connecting);

        let peer = SocketAddr::V4(SocketAddrV4::new(
            self.options.peer_host,
            self.options.peer_port,
        ));
        match self.options.protocol {
            HostProtocol::Multicast => {
                let interface = self.options.interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
                let transport =
                    Transport::multicast(self.options.peer_host, self.options.peer_port, interface)
                        .await?;
                self.remember_local_addr(&transport);
                self.transport = Some(transport);
                self.state = ConnectionState::Connected;
                debug!(group = %self.options.peer_host, "joined routing multicast group");
                self.events.emit(KnxEvent::Connected);
            }
            HostProtocol::TunnelUdp => {
                let transport = Transport::udp(peer).await?;
                self.remember_local_addr(&transport);
                self.transport = Some(transport);
                self.state = ConnectionState::Connecting;
                self.connect_deadline = Some(Instant::now() + CONNECT_REQUEST_TIMEOUT);
                let control = self.control_hpai();
                self.send_frame(Body::ConnectRequest {
                    control,
                    data: control,
                    cri: TunnelCri::new(layer),
                })
                .await?;
            }
            HostProtocol::TunnelTcp => {
                let transport = Transport::tcp(peer).await?;
                self.remember_local_addr(&transport);
                self.transport = Some(transport);
                if let Some(key) = self.options.secure_key {
                    self.send_frame(Body::SessionRequest {
                        control: Hpai::null(IPV4_TCP),
                        public_key: key,
                    })
                    .await?;
                }
                self.state = ConnectionState::Connecting;
                self.connect_deadline = Some(Instant::now() + CONNECT_REQUEST_TIMEOUT);
                let control = Hpai::null(IPV4_TCP);
                self.send_frame(Body::ConnectRequest {
                    control,
                    data: control,
                    cri: TunnelCri::new(layer),
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Tear the connection down.
    ///
    /// Sends a disconnect-request and arms a fallback timer that forces
    /// local teardown if the gateway never answers. Multicast mode has no
    /// handshake and tears down immediately.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(KnxIpError::NoSocket);
        }
        if self.options.protocol == HostProtocol::Multicast || self.channel_id.is_none() {
            self.force_disconnected("disconnect requested").await;
            return Ok(());
        }

        self.heartbeat.stop();
        self.state = ConnectionState::Disconnecting;
        self.disconnect_deadline = Some(Instant::now() + DISCONNECT_REQUEST_TIMEOUT);
        let channel_id = self.channel_id.unwrap_or_default();
        let control = self.control_hpai();
        self.send_frame(Body::DisconnectRequest {
            channel_id,
            control,
        })
        .await?;
        Ok(())
    }

    /// Write a value to a group address, encoding it per `dpt_id`.
    pub async fn group_write(
        &mut self,
        destination: impl Into<KnxAddress>,
        value: &DptValue,
        dpt_id: &str,
    ) -> Result<()> {
        self.ensure_connected()?;
        let payload = self.encoder.encode(value, dpt_id)?;
        self.send_group_service(destination.into(), GroupService::Write(payload), true)
            .await
    }

    /// Answer a group read with a value, encoding it per `dpt_id`.
    pub async fn group_respond(
        &mut self,
        destination: impl Into<KnxAddress>,
        value: &DptValue,
        dpt_id: &str,
    ) -> Result<()> {
        self.ensure_connected()?;
        let payload = self.encoder.encode(value, dpt_id)?;
        self.send_group_service(destination.into(), GroupService::Response(payload), true)
            .await
    }

    /// Ask the bus for the current value of a group address. Read
    /// requests never carry the acknowledge-request bit.
    pub async fn group_read(&mut self, destination: impl Into<KnxAddress>) -> Result<()> {
        self.ensure_connected()?;
        self.send_group_service(destination.into(), GroupService::Read, false)
            .await
    }

    /// Write a pre-encoded application payload, bypassing the datapoint
    /// encoder.
    pub async fn write_raw(
        &mut self,
        destination: impl Into<KnxAddress>,
        payload: &[u8],
    ) -> Result<()> {
        self.ensure_connected()?;
        if payload.is_empty() || payload.len() > 14 {
            return Err(KnxIpError::InvalidPayload(format!(
                "raw payload must be 1..=14 bytes, got {}",
                payload.len()
            )));
        }
        let value = if payload.len() == 1 && payload[0] <= 0x3F {
            GroupValue::Short(payload[0])
        } else {
            GroupValue::Data(Bytes::copy_from_slice(payload))
        };
        self.send_group_service(destination.into(), GroupService::Write(value), true)
            .await
    }

    /// Probe the network for gateways. Search-responses arriving within
    /// the discovery window are raised as `Discover` events.
    ///
    /// Discovery works without an established connection: when no
    /// transport exists yet, a standalone UDP socket is bound for the
    /// duration of the discovery window.
    pub async fn start_discovery(&mut self) -> Result<()> {
        let target = SocketAddr::V4(SocketAddrV4::new(KNX_MULTICAST_ADDR, KNX_PORT));
        if self.transport.is_none() {
            let transport = Transport::udp(target).await?;
            self.remember_local_addr(&transport);
            self.transport = Some(transport);
        }
        let discovery = self.control_hpai();
        let frame = Frame::new(Body::SearchRequest { discovery });
        let transport = self.transport.as_mut().ok_or(KnxIpError::NoSocket)?;
        debug!(%target, "sending search request");
        transport.send_to(&frame.to_bytes(), target).await?;
        self.discovery_until = Some(Instant::now() + SEARCH_TIMEOUT);
        Ok(())
    }

    /// Close the discovery window early.
    pub fn stop_discovery(&mut self) {
        self.discovery_until = None;
    }

    /// Whether search-responses are currently accepted.
    pub fn is_discovery_running(&self) -> bool {
        self.discovery_until.is_some_and(|until| until > Instant::now())
    }

    /// Ask the gateway for its description. The description-response is
    /// raised as a `Response` event.
    pub async fn get_description(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(KnxIpError::NoSocket);
        }
        let control = self.control_hpai();
        self.awaiting_response = Some((
            ServiceType::DescriptionResponse,
            Instant::now() + DEVICE_CONFIGURATION_REQUEST_TIMEOUT,
        ));
        self.send_frame(Body::DescriptionRequest { control }).await
    }

    /// Drive the engine until the connection is torn down.
    pub async fn run(&mut self) {
        while self.step().await {}
    }

    /// Process one inbound frame or timer expiry. Returns `false` once no
    /// transport remains to wait on.
    pub async fn step(&mut self) -> bool {
        let deadline = self.next_deadline();
        let wakeup = {
            let Some(transport) = self.transport.as_mut() else {
                return false;
            };
            tokio::select! {
                result = transport.recv() => Wakeup::Datagram(result),
                () = async {
                    match deadline {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => Wakeup::Deadline,
            }
        };

        match wakeup {
            Wakeup::Datagram(Ok((data, sender))) => self.handle_datagram(&data, sender).await,
            Wakeup::Datagram(Err(err)) => {
                self.events.emit(KnxEvent::Error(err));
                self.force_disconnected("transport failure").await;
            }
            Wakeup::Deadline => self.handle_deadlines(Instant::now()).await,
        }
        self.transport.is_some()
    }

    /// Parse and dispatch one inbound datagram/segment. Malformed frames
    /// are reported and dropped without touching connection state.
    async fn handle_datagram(&mut self, data: &[u8], sender: SocketAddr) {
        match Frame::parse(data) {
            Ok(frame) => self.dispatch(frame, sender).await,
            Err(err) => {
                warn!(%sender, error = %err, "dropping malformed frame");
                self.events.emit(KnxEvent::Error(err));
            }
        }
    }

    async fn dispatch(&mut self, frame: Frame, sender: SocketAddr) {
        let header = frame.header;
        match frame.body {
            body @ Body::SearchResponse { .. } => {
                if self.is_discovery_running() {
                    self.events.emit(KnxEvent::Discover {
                        sender,
                        frame: Frame { header, body },
                    });
                }
            }
            Body::ConnectResponse {
                channel_id, status, ..
            } => {
                if !self.state.is_connecting() {
                    return;
                }
                self.connect_deadline = None;
                if status != E_NO_ERROR {
                    let reason = status_to_string(status);
                    self.events
                        .emit(KnxEvent::Error(KnxIpError::ProtocolStatus {
                            status,
                            reason: reason.clone(),
                        }));
                    self.force_disconnected(&reason).await;
                } else {
                    self.channel_id = Some(channel_id);
                    self.state = ConnectionState::Connected;
                    debug!(channel = channel_id, "tunnel established");
                    self.events.emit(KnxEvent::Connected);
                    self.heartbeat
                        .start(Instant::now(), self.options.keep_alive_interval);
                }
            }
            Body::ConnectionStateResponse { channel_id, status } => {
                if self.channel_id != Some(channel_id) {
                    return;
                }
                if status == E_NO_ERROR {
                    self.heartbeat
                        .on_success(Instant::now(), self.options.keep_alive_interval);
                    // Routine heartbeat answers stay internal; only an
                    // explicitly awaited probe surfaces as a response event.
                    if matches!(
                        self.awaiting_response,
                        Some((ServiceType::ConnectionStateResponse, _))
                    ) {
                        self.awaiting_response = None;
                        self.events.emit(KnxEvent::Response {
                            sender,
                            frame: Frame {
                                header,
                                body: Body::ConnectionStateResponse { channel_id, status },
                            },
                        });
                    }
                } else {
                    let reason = status_to_string(status);
                    self.events
                        .emit(KnxEvent::Error(KnxIpError::ProtocolStatus {
                            status,
                            reason: reason.clone(),
                        }));
                    self.force_disconnected(&reason).await;
                }
            }
            Body::DisconnectResponse { .. } => {
                if self.state != ConnectionState::Disconnecting {
                    self.events.emit(KnxEvent::Error(KnxIpError::InvalidState(
                        "unexpected disconnect-response",
                    )));
                }
                self.force_disconnected("disconnected from gateway").await;
            }
            Body::DisconnectRequest { channel_id, .. } => {
                if self.channel_id != Some(channel_id) {
                    return;
                }
                self.state = ConnectionState::Disconnecting;
                if let Err(err) = self
                    .send_frame(Body::DisconnectResponse {
                        channel_id,
                        status: E_NO_ERROR,
                    })
                    .await
                {
                    self.events.emit(KnxEvent::Error(err));
                }
                self.force_disconnected("disconnect requested by gateway")
                    .await;
            }
            Body::TunnelingRequest {
                channel_id,
                seq,
                cemi,
            } => {
                if self.channel_id != Some(channel_id) {
                    return;
                }
                // The gateway is always acked, indication or confirmation.
                if let Err(err) = self
                    .send_frame(Body::TunnelingAck {
                        channel_id,
                        seq,
                        status: E_NO_ERROR,
                    })
                    .await
                {
                    self.events.emit(KnxEvent::Error(err));
                }
                if cemi.code.is_indication() {
                    let raw = hex_string(&cemi.to_bytes());
                    self.events.emit(KnxEvent::Indication {
                        message: cemi,
                        local_echo: false,
                        raw,
                    });
                } else if cemi.code.is_confirmation() {
                    debug!(source = %cemi.source, destination = %cemi.destination,
                        "L_Data.con from gateway");
                }
            }
            Body::TunnelingAck {
                channel_id, seq, ..
            } => {
                if self.channel_id != Some(channel_id) {
                    return;
                }
                self.sequence.advance(seq);
                if self.sequence.cancel(seq).is_none() && !self.options.suppress_ack {
                    warn!(seq, "unexpected tunneling-ack");
                }
            }
            Body::RoutingIndication { cemi } => {
                // Looped-back own frames were already echoed at send time.
                if cemi.source == self.options.physical_address {
                    return;
                }
                if cemi.code.is_indication() {
                    let raw = hex_string(&cemi.to_bytes());
                    self.events.emit(KnxEvent::Indication {
                        message: cemi,
                        local_echo: false,
                        raw,
                    });
                }
            }
            Body::RoutingLostMessage {
                device_state,
                lost_messages,
            } => {
                warn!(device_state, lost_messages, "router reported lost frames");
            }
            body => {
                if let Some((awaited, _)) = self.awaiting_response {
                    if body.service_type() == awaited {
                        self.awaiting_response = None;
                        self.events.emit(KnxEvent::Response {
                            sender,
                            frame: Frame { header, body },
                        });
                        return;
                    }
                }
                debug!(service = ?body.service_type(), %sender, "ignoring frame");
            }
        }
    }

    /// Fire every deadline that has passed.
    async fn handle_deadlines(&mut self, now: Instant) {
        if self.connect_deadline.is_some_and(|at| at <= now) {
            self.connect_deadline = None;
            self.events.emit(KnxEvent::Error(KnxIpError::ConnectTimeout(
                self.peer_string(),
            )));
            self.force_disconnected("connection timeout").await;
            return;
        }
        if self.disconnect_deadline.is_some_and(|at| at <= now) {
            self.disconnect_deadline = None;
            self.force_disconnected("disconnect timeout").await;
            return;
        }
        if self.discovery_until.is_some_and(|at| at <= now) {
            self.discovery_until = None;
            debug!("discovery window closed");
            // A socket bound only for discovery is released with the window.
            if self.state == ConnectionState::Disconnected {
                if let Some(mut transport) = self.transport.take() {
                    transport.close().await.ok();
                }
            }
        }
        if let Some((service, at)) = self.awaiting_response {
            if at <= now {
                self.awaiting_response = None;
                warn!(service = ?service, "timed out waiting for response");
            }
        }
        if self.heartbeat.probe_deadline().is_some_and(|at| at <= now) {
            if self.heartbeat.on_timeout() {
                self.events.emit(KnxEvent::Error(KnxIpError::ConnectionDead(
                    self.peer_string(),
                )));
                self.force_disconnected("connection dead").await;
                return;
            }
            self.send_heartbeat_probe(now).await;
        }
        if self.heartbeat.next_probe().is_some_and(|at| at <= now) {
            self.send_heartbeat_probe(now).await;
        }
        for (seq, pending) in self.sequence.take_expired(now) {
            self.events.emit(KnxEvent::Error(KnxIpError::RequestTimeout {
                seq,
                destination: pending.destination,
                ack_requested: pending.ack_requested,
                peer: self.peer_string(),
            }));
        }
    }

    /// Idempotent teardown: cancel every timer, clear channel identity,
    /// sequence state and the pending table, close the transport, and
    /// raise `Disconnected` once per actual transition.
    async fn force_disconnected(&mut self, reason: &str) {
        self.connect_deadline = None;
        self.disconnect_deadline = None;
        self.discovery_until = None;
        self.awaiting_response = None;
        self.heartbeat.stop();
        self.sequence.reset();
        self.channel_id = None;

        let was = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        if was != ConnectionState::Disconnected {
            debug!(reason, "connection torn down");
            self.events.emit(KnxEvent::Disconnected(reason.to_string()));
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await.ok();
        }
    }

    async fn send_group_service(
        &mut self,
        destination: KnxAddress,
        service: GroupService,
        wants_ack: bool,
    ) -> Result<()> {
        let multicast = self.options.protocol == HostProtocol::Multicast;
        let ack = wants_ack && !multicast && !self.options.suppress_ack;
        let kind = service.kind();
        let cemi =
            CemiMessage::l_data_req(self.options.physical_address, destination, service, ack);
        let raw = hex_string(&cemi.to_bytes());

        if multicast {
            debug!(%destination, kind, "sending routing indication");
            self.send_frame(Body::RoutingIndication { cemi: cemi.clone() })
                .await?;
        } else {
            let channel_id = self
                .channel_id
                .ok_or(KnxIpError::InvalidState("no channel assigned"))?;
            let seq = self.sequence.current();
            if ack {
                self.sequence.arm(
                    seq,
                    PendingRequest {
                        destination: destination.to_string(),
                        ack_requested: true,
                        deadline: Instant::now() + TUNNELING_REQUEST_TIMEOUT,
                    },
                )?;
            }
            debug!(%destination, kind, channel = channel_id, seq, "sending tunneling request");
            if let Err(err) = self
                .send_frame(Body::TunnelingRequest {
                    channel_id,
                    seq,
                    cemi: cemi.clone(),
                })
                .await
            {
                self.sequence.cancel(seq);
                return Err(err);
            }
        }

        if self.options.local_echo {
            self.events.emit(KnxEvent::Indication {
                message: cemi,
                local_echo: true,
                raw,
            });
        }
        Ok(())
    }

    async fn send_heartbeat_probe(&mut self, now: Instant) {
        let Some(channel_id) = self.channel_id else {
            return;
        };
        let control = self.control_hpai();
        match self
            .send_frame(Body::ConnectionStateRequest {
                channel_id,
                control,
            })
            .await
        {
            Ok(()) => self.heartbeat.probe_sent(now),
            Err(err) => self.events.emit(KnxEvent::Error(err)),
        }
    }

    async fn send_frame(&mut self, body: Body) -> Result<()> {
        let frame = Frame::new(body);
        let bytes = frame.to_bytes();
        let transport = self.transport.as_mut().ok_or(KnxIpError::NoSocket)?;
        debug!(service = ?frame.header.service_type, len = bytes.len(),
            peer = %transport.peer(), "sending frame");
        transport.send(&bytes).await
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(KnxIpError::InvalidState("client is not connected"))
        }
    }

    /// The HPAI this client advertises in control frames. TCP tunneling
    /// uses the all-zero route-back form.
    fn control_hpai(&self) -> Hpai {
        if self.options.protocol == HostProtocol::TunnelTcp {
            return Hpai::null(IPV4_TCP);
        }
        let ip = self
            .options
            .local_ip
            .filter(|ip| !ip.is_unspecified())
            .or(self.options.interface)
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        Hpai::udp(ip, self.local_port)
    }

    fn remember_local_addr(&mut self, transport: &Transport) {
        if let Ok(SocketAddr::V4(addr)) = transport.local_addr() {
            self.options.local_ip = Some(*addr.ip());
            self.local_port = addr.port();
        }
    }

    fn peer_string(&self) -> String {
        format!("{}:{}", self.options.peer_host, self.options.peer_port)
    }

    /// The closest armed deadline, if any timer is running.
    fn next_deadline(&self) -> Option<Instant> {
        [
            self.connect_deadline,
            self.disconnect_deadline,
            self.discovery_until,
            self.awaiting_response.map(|(_, at)| at),
            self.heartbeat.next_probe(),
            self.heartbeat.probe_deadline(),
            self.sequence.earliest_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

/// Hex rendering used for raw-frame reporting on indications.
fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
