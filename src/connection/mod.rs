// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Sans-I/O connection engine.
//!
//! A [`Connection`] consumes bytes and packets and produces an ordered list
//! of [`Event`]s; it performs no socket, timer or runtime calls itself.
//! The host owns the transport and the timers, feeds everything it reads
//! into [`Connection::recv`], and carries out the returned events in order.

mod assembler;
mod config;
mod event;
mod packet_id;
mod recv;
mod send;
mod store;
mod topic_alias;

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::time::Duration;

pub use assembler::{FrameAssembler, FrameError};
pub use config::ConnectionConfig;
pub use event::{Event, TimerKind, TimerOp};
pub use packet_id::{AcquireWait, IdValue, PacketIdManager};
pub use store::{ResponsePacketType, SendStore, StorePacket};
pub use topic_alias::{TopicAliasRecv, TopicAliasSend};

use crate::packet::PacketVariant;
use crate::{MqttError, PacketId, ProtocolVersion, QoS, Role};

/// Largest packet the wire format can express: one type byte, four
/// remaining-length bytes and 256MB of payload.
pub const PACKET_SIZE_NO_LIMIT: u32 = 268_435_460;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No session is in progress.
    Disconnected,

    /// CONNECT was sent or received, CONNACK is outstanding.
    Connecting,

    /// CONNACK with a success code was exchanged.
    Connected,

    /// A disconnect packet was sent or received; waiting for transport
    /// close.
    Disconnecting,
}

/// Protocol engine of one MQTT connection, client or server side.
///
/// Every method runs to completion without suspension and returns the
/// events the host must act on, in order. The engine holds no locks and
/// spawns nothing; distinct connections are fully independent.
pub struct Connection {
    config: ConnectionConfig,
    version: ProtocolVersion,
    status: ConnectionStatus,
    handshaked: bool,

    pub(crate) pid_manager: PacketIdManager<u16>,

    /// Identifiers awaiting SUBACK.
    pub(crate) pid_suback: BTreeSet<u16>,
    /// Identifiers awaiting UNSUBACK.
    pub(crate) pid_unsuback: BTreeSet<u16>,
    /// Identifiers of `QoS` 1 publishes awaiting PUBACK.
    pub(crate) pid_puback: BTreeSet<u16>,
    /// Identifiers of `QoS` 2 publishes awaiting PUBREC.
    pub(crate) pid_pubrec: BTreeSet<u16>,
    /// Identifiers of sent PUBRELs awaiting PUBCOMP.
    pub(crate) pid_pubcomp: BTreeSet<u16>,

    /// Whether session state survives transport loss.
    pub(crate) need_store: bool,
    pub(crate) store: SendStore,

    pub(crate) topic_alias_send: Option<TopicAliasSend>,
    pub(crate) topic_alias_recv: Option<TopicAliasRecv>,

    /// Peer's receive maximum; `None` means no limit (v3.1.1).
    pub(crate) publish_send_max: Option<u16>,
    /// Our receive maximum, advertised in CONNECT / CONNACK.
    pub(crate) publish_recv_max: Option<u16>,
    /// In-flight outbound `QoS` 1/2 publish count.
    pub(crate) publish_send_count: u16,
    /// In-flight inbound `QoS` 1/2 publish identifiers.
    pub(crate) publish_recv: BTreeSet<u16>,

    /// Publishes queued while the peer's receive maximum was exhausted.
    pub(crate) publish_queue: VecDeque<PacketVariant>,

    pub(crate) maximum_packet_size_send: u32,
    pub(crate) maximum_packet_size_recv: u32,

    /// Ping request interval while connected, client side.
    pub(crate) pingreq_send_interval: Option<Duration>,
    /// Peer silence timeout, server side: keep alive times 1.5.
    pub(crate) pingreq_recv_timeout: Option<Duration>,

    /// Inbound `QoS` 2 identifiers for which PUBREC was produced; used for
    /// duplicate suppression until the matching PUBREL arrives.
    pub(crate) qos2_publish_handled: BTreeSet<u16>,
    /// Inbound `QoS` 2 identifiers between packet arrival and PUBREL.
    pub(crate) qos2_publish_processing: BTreeSet<u16>,

    pub(crate) pingreq_send_armed: bool,
    pub(crate) pingreq_recv_armed: bool,
    pub(crate) pingresp_recv_armed: bool,

    pub(crate) assembler: FrameAssembler,
}

impl Connection {
    /// Create a connection with `role` speaking `version` and default
    /// configuration.
    #[must_use]
    pub fn new(role: Role, version: ProtocolVersion) -> Self {
        Self::with_config(ConnectionConfig::new(role, version))
    }

    /// Create a connection from an explicit configuration.
    #[must_use]
    pub fn with_config(config: ConnectionConfig) -> Self {
        let version = config.version;
        Self {
            config,
            version,
            status: ConnectionStatus::Disconnected,
            handshaked: false,

            pid_manager: PacketIdManager::new(),
            pid_suback: BTreeSet::new(),
            pid_unsuback: BTreeSet::new(),
            pid_puback: BTreeSet::new(),
            pid_pubrec: BTreeSet::new(),
            pid_pubcomp: BTreeSet::new(),

            need_store: false,
            store: SendStore::new(),

            topic_alias_send: None,
            topic_alias_recv: None,

            publish_send_max: None,
            publish_recv_max: None,
            publish_send_count: 0,
            publish_recv: BTreeSet::new(),

            publish_queue: VecDeque::new(),

            maximum_packet_size_send: PACKET_SIZE_NO_LIMIT,
            maximum_packet_size_recv: PACKET_SIZE_NO_LIMIT,

            pingreq_send_interval: None,
            pingreq_recv_timeout: None,

            qos2_publish_handled: BTreeSet::new(),
            qos2_publish_processing: BTreeSet::new(),

            pingreq_send_armed: false,
            pingreq_recv_armed: false,
            pingresp_recv_armed: false,

            assembler: FrameAssembler::new(),
        }
    }

    /// Get configured role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.config.role
    }

    /// Get current protocol version. A server connection reports
    /// `Undetermined` until the first CONNECT packet arrives.
    #[must_use]
    pub const fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// Get current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    ///
    /// Changing auto behaviors mid-session takes effect on the next
    /// engine call.
    pub fn config_mut(&mut self) -> &mut ConnectionConfig {
        &mut self.config
    }

    pub(crate) const fn is_client_side(&self) -> bool {
        self.config.role.is_client()
    }

    pub(crate) const fn is_server_side(&self) -> bool {
        self.config.role.is_server()
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            log::info!("connection: status {:?} -> {:?}", self.status, status);
            self.status = status;
        }
    }

    pub(crate) fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// The underlying transport finished its handshake; a client may now
    /// send CONNECT, a server may now receive it.
    pub fn notify_handshaked(&mut self) -> Vec<Event> {
        self.handshaked = true;
        Vec::new()
    }

    pub(crate) const fn is_handshaked(&self) -> bool {
        self.handshaked
    }

    /// The transport was torn down.
    ///
    /// Transient state is dropped; stored packets and their identifiers
    /// survive if and only if the session is persistent. Calling this twice
    /// in a row is a no-op.
    pub fn notify_closed(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        if self.status == ConnectionStatus::Disconnected && !self.handshaked {
            return events;
        }

        self.cancel_timers(&mut events);

        self.set_status(ConnectionStatus::Disconnected);
        self.handshaked = false;
        self.assembler.reset();

        self.topic_alias_send = None;
        self.topic_alias_recv = None;
        self.publish_send_max = None;
        self.publish_recv_max = None;
        self.publish_send_count = 0;
        self.publish_recv.clear();
        self.qos2_publish_processing.clear();
        self.maximum_packet_size_send = PACKET_SIZE_NO_LIMIT;
        self.maximum_packet_size_recv = PACKET_SIZE_NO_LIMIT;
        self.pingreq_send_interval = None;
        self.pingreq_recv_timeout = None;

        // Subscription flows do not survive reconnect.
        for pid in std::mem::take(&mut self.pid_suback) {
            self.pid_manager.release(pid);
            events.push(Event::PacketIdReleased(PacketId::new(pid)));
        }
        for pid in std::mem::take(&mut self.pid_unsuback) {
            self.pid_manager.release(pid);
            events.push(Event::PacketIdReleased(PacketId::new(pid)));
        }

        // Publishes queued but never written have not entered any flow.
        for packet in std::mem::take(&mut self.publish_queue) {
            if let Some(packet_id) = packet.packet_id() {
                self.pid_manager.release(packet_id.value());
                events.push(Event::PacketIdReleased(packet_id));
            }
        }

        if !self.need_store {
            self.store.clear();
            self.qos2_publish_handled.clear();
            for pid in std::mem::take(&mut self.pid_puback)
                .into_iter()
                .chain(std::mem::take(&mut self.pid_pubrec))
                .chain(std::mem::take(&mut self.pid_pubcomp))
            {
                self.pid_manager.release(pid);
                events.push(Event::PacketIdReleased(PacketId::new(pid)));
            }
        }

        events
    }

    /// A timer the host armed for this connection fired.
    pub fn notify_timer_fired(&mut self, kind: TimerKind) -> Vec<Event> {
        let mut events = Vec::new();
        match kind {
            TimerKind::PingreqSend => {
                self.pingreq_send_armed = false;
                if self.status != ConnectionStatus::Connected {
                    return events;
                }
                self.emit_pingreq(&mut events);
            }
            TimerKind::PingreqRecv => {
                self.pingreq_recv_armed = false;
                log::warn!("connection: keep alive window expired, closing");
                if self.version == ProtocolVersion::V5_0 {
                    let disconnect = crate::v5::DisconnectPacket::with_reason(
                        crate::v5::ReasonCode::KeepAliveTimeout,
                    );
                    self.emit_packet_best_effort(disconnect.into(), &mut events);
                }
                self.set_status(ConnectionStatus::Disconnecting);
                events.push(Event::Error(MqttError::DisconnectReasonCode(
                    crate::v5::ReasonCode::KeepAliveTimeout,
                )));
                events.push(Event::Close);
            }
            TimerKind::PingrespRecv => {
                self.pingresp_recv_armed = false;
                log::warn!("connection: no ping response in time, closing");
                self.set_status(ConnectionStatus::Disconnecting);
                events.push(Event::Error(MqttError::PingrespRecvTimeout));
                events.push(Event::Close);
            }
            TimerKind::CloseByDisconnect => {
                events.push(Event::Close);
            }
        }
        events
    }

    /// Emit a PINGREQ together with its timer bookkeeping.
    pub(crate) fn emit_pingreq(&mut self, events: &mut Vec<Event>) {
        if let Some(interval) = self.pingreq_send_interval {
            self.pingreq_send_armed = true;
            events.push(Event::timer_reset(TimerKind::PingreqSend, interval));
        }
        let chunks = match self.version {
            ProtocolVersion::V5_0 => crate::v5::PingRequestPacket::new()
                .encode_to_chunks(),
            _ => crate::v3::PingRequestPacket::new().encode_to_chunks(),
        };
        events.push(Event::Send {
            chunks,
            release_on_error: None,
        });
        if let Some(timeout) = self.config.pingresp_recv_timeout {
            self.pingresp_recv_armed = true;
            events.push(Event::timer_reset(TimerKind::PingrespRecv, timeout));
        }
    }

    /// Encode `packet` and append a `Send` event, swallowing encode errors.
    /// Used on error paths where the connection is about to close anyway.
    pub(crate) fn emit_packet_best_effort(
        &mut self,
        packet: PacketVariant,
        events: &mut Vec<Event>,
    ) {
        match packet.to_chunks() {
            Ok(chunks) => events.push(Event::Send {
                chunks,
                release_on_error: None,
            }),
            Err(err) => log::error!("connection: failed to encode packet: {err:?}"),
        }
    }

    pub(crate) fn cancel_timers(&mut self, events: &mut Vec<Event>) {
        if self.pingreq_send_armed {
            self.pingreq_send_armed = false;
            events.push(Event::timer_cancel(TimerKind::PingreqSend));
        }
        if self.pingreq_recv_armed {
            self.pingreq_recv_armed = false;
            events.push(Event::timer_cancel(TimerKind::PingreqRecv));
        }
        if self.pingresp_recv_armed {
            self.pingresp_recv_armed = false;
            events.push(Event::timer_cancel(TimerKind::PingrespRecv));
        }
    }

    /// Take the lowest free packet identifier, or `None` if all 65535 are
    /// outstanding. Never blocks.
    #[must_use]
    pub fn acquire_unique_packet_id(&mut self) -> Option<PacketId> {
        self.pid_manager.acquire().map(PacketId::new)
    }

    /// Wait asynchronously for a free packet identifier.
    ///
    /// The returned future is cancel-safe and served in FIFO order; see
    /// [`PacketIdManager::acquire_wait`].
    #[must_use]
    pub fn acquire_unique_packet_id_wait(&self) -> AcquireWait<u16> {
        self.pid_manager.acquire_wait()
    }

    /// Mark an externally chosen identifier as in-use.
    ///
    /// Returns false if it is already taken.
    pub fn register_packet_id(&mut self, packet_id: PacketId) -> bool {
        self.pid_manager.register(packet_id.value())
    }

    /// Return `packet_id` to the pool. Releasing an unused identifier is a
    /// no-op.
    pub fn release_packet_id(&mut self, packet_id: PacketId) -> Vec<Event> {
        let mut events = Vec::new();
        if self.pid_manager.is_used(packet_id.value()) {
            let pid = packet_id.value();
            self.pid_suback.remove(&pid);
            self.pid_unsuback.remove(&pid);
            self.pid_puback.remove(&pid);
            self.pid_pubrec.remove(&pid);
            self.pid_pubcomp.remove(&pid);
            self.store.erase(packet_id);
            self.pid_manager.release(pid);
            events.push(Event::PacketIdReleased(packet_id));
        }
        events
    }

    /// Get remaining send quota of `QoS` 1/2 publishes, or `None` when the
    /// peer advertised no limit.
    #[must_use]
    pub fn get_receive_maximum_vacancy_for_send(&self) -> Option<u16> {
        self.publish_send_max
            .map(|max| max.saturating_sub(self.publish_send_count))
    }

    /// Check whether an inbound `QoS` 2 publish flow with `packet_id` is
    /// still in progress (PUBREL not handled yet).
    #[must_use]
    pub fn is_publish_processing(&self, packet_id: PacketId) -> bool {
        self.qos2_publish_processing.contains(&packet_id.value())
    }

    /// Override the interval between automatic ping requests.
    pub fn set_pingreq_send_interval(&mut self, interval: Duration) {
        self.config.pingreq_send_interval = Some(interval);
        if self.status == ConnectionStatus::Connected {
            self.pingreq_send_interval = Some(interval);
        }
    }

    /// Get stored packets for session hand-off, in retransmission order.
    #[must_use]
    pub fn get_stored_packets(&self) -> Vec<StorePacket> {
        self.store.entries().to_vec()
    }

    /// Rehydrate stored packets of a previous session.
    ///
    /// Each packet identifier is registered with the allocator; packets
    /// whose identifier is already in use are rejected.
    ///
    /// # Errors
    ///
    /// Returns `PacketIdentifierConflict` on the first conflicting entry;
    /// earlier entries stay restored.
    pub fn restore_packets(&mut self, packets: Vec<StorePacket>) -> Result<(), MqttError> {
        for packet in packets {
            let pid = packet.packet_id().value();
            if !self.pid_manager.register(pid) {
                return Err(MqttError::PacketIdentifierConflict);
            }
            match &packet {
                StorePacket::PublishV3(p) => {
                    if p.qos() == QoS::ExactOnce {
                        self.pid_pubrec.insert(pid);
                    } else {
                        self.pid_puback.insert(pid);
                    }
                }
                StorePacket::PublishV5(p) => {
                    if p.qos() == QoS::ExactOnce {
                        self.pid_pubrec.insert(pid);
                    } else {
                        self.pid_puback.insert(pid);
                    }
                }
                StorePacket::PubrelV3(..) | StorePacket::PubrelV5(..) => {
                    self.pid_pubcomp.insert(pid);
                }
            }
            self.store.add(packet).map_err(|err| {
                self.pid_manager.release(pid);
                err
            })?;
        }
        self.need_store = true;
        Ok(())
    }

    /// Get identifiers of inbound `QoS` 2 publishes already handled, for
    /// session hand-off.
    #[must_use]
    pub fn get_qos2_publish_handled_pids(&self) -> BTreeSet<PacketId> {
        self.qos2_publish_handled
            .iter()
            .map(|pid| PacketId::new(*pid))
            .collect()
    }

    /// Rehydrate the duplicate-suppression set of a previous session.
    pub fn restore_qos2_publish_handled_pids(&mut self, pids: BTreeSet<PacketId>) {
        self.qos2_publish_handled = pids.into_iter().map(|pid| pid.value()).collect();
    }

    /// Strip the topic alias from `packet` and restore its full topic name,
    /// so the stored copy is replayable on a fresh connection where alias
    /// mappings no longer exist.
    ///
    /// # Errors
    ///
    /// Returns `TopicAliasInvalid` if the packet relies on an alias with no
    /// current mapping.
    pub fn regulate_for_store(
        &self,
        mut packet: crate::v5::PublishPacket,
    ) -> Result<crate::v5::PublishPacket, MqttError> {
        if packet.topic().is_empty() {
            let alias = packet
                .topic_alias()
                .ok_or(MqttError::TopicAliasInvalid)?;
            let topic = self
                .topic_alias_send
                .as_ref()
                .and_then(|table| table.find_topic(alias))
                .ok_or(MqttError::TopicAliasInvalid)?
                .to_string();
            packet
                .set_topic(&topic)
                .map_err(|_err| MqttError::TopicNameInvalid)?;
        }
        packet
            .properties_mut()
            .remove(crate::v5::PropertyType::TopicAlias);
        Ok(packet)
    }

    /// Replay every stored packet after a session was resumed.
    pub(crate) fn send_stored(&mut self, events: &mut Vec<Event>) {
        #[allow(clippy::cast_possible_truncation)]
        let in_flight = self.store.len().min(usize::from(u16::MAX)) as u16;
        self.publish_send_count = in_flight;
        for entry in self.store.entries().to_vec() {
            let packet = entry.to_retransmit_packet();
            match packet.to_chunks() {
                Ok(chunks) => events.push(Event::Send {
                    chunks,
                    release_on_error: None,
                }),
                Err(err) => {
                    log::error!("connection: failed to encode stored packet: {err:?}");
                }
            }
        }
    }
}

trait EncodeToChunks {
    fn encode_to_chunks(&self) -> Vec<bytes::Bytes>;
}

impl<T: crate::EncodePacket> EncodeToChunks for T {
    fn encode_to_chunks(&self) -> Vec<bytes::Bytes> {
        let mut buf = Vec::new();
        // Ping packets and other fixed-size packets cannot fail to encode.
        match self.encode(&mut buf) {
            Ok(_) => vec![bytes::Bytes::from(buf)],
            Err(_) => Vec::new(),
        }
    }
}
