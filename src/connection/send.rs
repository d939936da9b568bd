// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Outbound packet handling.

use super::{Connection, ConnectionStatus, Event, StorePacket, TimerKind};
use crate::packet::PacketVariant;
use crate::{v5, MqttError, PacketId, PacketType, ProtocolVersion, QoS};

impl Connection {
    /// Validate and emit one outbound packet.
    ///
    /// On success the returned events carry the encoded bytes and related
    /// timer and identifier instructions, in the order the host must apply
    /// them. On error nothing was emitted and session state is unchanged,
    /// except [`MqttError::PacketEnqueued`] which reports that the publish
    /// went into the offline queue.
    ///
    /// # Errors
    ///
    /// Returns a single error kind describing why the packet was rejected.
    pub fn send(&mut self, packet: PacketVariant) -> Result<Vec<Event>, MqttError> {
        self.check_role_can_send(packet.packet_type())?;
        self.check_send_version(&packet)?;
        self.check_send_size(&packet)?;

        let mut events = Vec::new();
        match packet {
            PacketVariant::ConnectV3(..) | PacketVariant::ConnectV5(..) => {
                self.send_connect(packet, &mut events)?;
            }
            PacketVariant::ConnectAckV3(..) | PacketVariant::ConnectAckV5(..) => {
                self.send_connect_ack(packet, &mut events)?;
            }
            PacketVariant::PublishV3(..) | PacketVariant::PublishV5(..) => {
                self.send_publish(packet, &mut events)?;
            }
            PacketVariant::PublishAckV3(..) | PacketVariant::PublishAckV5(..) => {
                self.send_publish_response(packet, &mut events)?;
            }
            PacketVariant::PublishReceivedV3(..) | PacketVariant::PublishReceivedV5(..) => {
                self.send_publish_received(packet, &mut events)?;
            }
            PacketVariant::PublishReleaseV3(..) | PacketVariant::PublishReleaseV5(..) => {
                self.send_publish_release(packet, &mut events)?;
            }
            PacketVariant::PublishCompleteV3(..) | PacketVariant::PublishCompleteV5(..) => {
                self.send_publish_response(packet, &mut events)?;
            }
            PacketVariant::SubscribeV3(..) | PacketVariant::SubscribeV5(..) => {
                self.send_subscribe_kind(packet, true, &mut events)?;
            }
            PacketVariant::UnsubscribeV3(..) | PacketVariant::UnsubscribeV5(..) => {
                self.send_subscribe_kind(packet, false, &mut events)?;
            }
            PacketVariant::SubscribeAckV3(..)
            | PacketVariant::SubscribeAckV5(..)
            | PacketVariant::UnsubscribeAckV3(..)
            | PacketVariant::UnsubscribeAckV5(..) => {
                self.require_status(ConnectionStatus::Connected)?;
                self.emit_plain(packet, &mut events)?;
            }
            PacketVariant::PingRequestV3(..) | PacketVariant::PingRequestV5(..) => {
                self.require_status(ConnectionStatus::Connected)?;
                self.emit_pingreq(&mut events);
            }
            PacketVariant::PingResponseV3(..) | PacketVariant::PingResponseV5(..) => {
                self.require_status(ConnectionStatus::Connected)?;
                self.emit_plain(packet, &mut events)?;
            }
            PacketVariant::DisconnectV3(..) | PacketVariant::DisconnectV5(..) => {
                self.send_disconnect(packet, &mut events)?;
            }
            PacketVariant::AuthV5(..) => {
                if self.status() != ConnectionStatus::Connecting
                    && self.status() != ConnectionStatus::Connected
                {
                    return Err(MqttError::ProtocolError);
                }
                self.emit_plain(packet, &mut events)?;
            }
        }
        Ok(events)
    }

    fn check_role_can_send(&self, packet_type: PacketType) -> Result<(), MqttError> {
        let allowed = match packet_type {
            PacketType::Connect
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::PingRequest => self.is_client_side(),
            PacketType::ConnectAck
            | PacketType::SubscribeAck
            | PacketType::UnsubscribeAck
            | PacketType::PingResponse => self.is_server_side(),
            PacketType::Disconnect => {
                // A v3.1.1 disconnect flows only from client to server.
                if self.protocol_version() == ProtocolVersion::V3_1_1 {
                    self.is_client_side()
                } else {
                    true
                }
            }
            _ => true,
        };
        if allowed {
            Ok(())
        } else {
            log::error!(
                "connection: role {:?} may not send {packet_type:?}",
                self.role()
            );
            Err(MqttError::ProtocolError)
        }
    }

    fn check_send_version(&self, packet: &PacketVariant) -> Result<(), MqttError> {
        let packet_version = packet.protocol_version();
        match self.protocol_version() {
            // The first CONNECT fixes the version of the session.
            ProtocolVersion::Undetermined => {
                if matches!(
                    packet,
                    PacketVariant::ConnectV3(..) | PacketVariant::ConnectV5(..)
                ) {
                    Ok(())
                } else {
                    Err(MqttError::ProtocolError)
                }
            }
            version if version == packet_version => Ok(()),
            _ => Err(MqttError::ProtocolError),
        }
    }

    fn check_send_size(&self, packet: &PacketVariant) -> Result<(), MqttError> {
        let bytes = packet.bytes().map_err(|_err| MqttError::PacketTooLarge)?;
        if bytes > self.maximum_packet_size_send as usize {
            log::error!(
                "connection: packet of {bytes} bytes exceeds peer maximum {}",
                self.maximum_packet_size_send
            );
            return Err(MqttError::PacketTooLarge);
        }
        Ok(())
    }

    fn require_status(&self, expected: ConnectionStatus) -> Result<(), MqttError> {
        if self.status() == expected {
            Ok(())
        } else if self.status() == ConnectionStatus::Disconnected {
            // The transport is gone; this is not a protocol mistake.
            Err(MqttError::ConnectionReset)
        } else {
            Err(MqttError::ProtocolError)
        }
    }

    /// Reset the ping request timer; sending any packet counts as activity.
    pub(crate) fn reset_pingreq_send_timer(&mut self, events: &mut Vec<Event>) {
        if let Some(interval) = self.pingreq_send_interval {
            if self.is_client_side() {
                self.pingreq_send_armed = true;
                events.push(Event::timer_reset(TimerKind::PingreqSend, interval));
            }
        }
    }

    fn emit_plain(
        &mut self,
        packet: PacketVariant,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        self.reset_pingreq_send_timer(events);
        let chunks = packet.to_chunks().map_err(MqttError::from)?;
        events.push(Event::Send {
            chunks,
            release_on_error: None,
        });
        Ok(())
    }

    fn send_connect(
        &mut self,
        packet: PacketVariant,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        if self.status() != ConnectionStatus::Disconnected || !self.is_handshaked() {
            return Err(MqttError::ProtocolError);
        }
        self.set_version(packet.protocol_version());

        let keep_alive = match &packet {
            PacketVariant::ConnectV3(p) => {
                self.need_store = !p.connect_flags().clean_session();
                p.keep_alive()
            }
            PacketVariant::ConnectV5(p) => {
                let props = p.properties();
                self.publish_recv_max = props.receive_maximum();
                if let Some(maximum) = props.topic_alias_maximum() {
                    if maximum > 0 {
                        self.topic_alias_recv = Some(super::TopicAliasRecv::new(maximum));
                    }
                }
                if let Some(size) = props.maximum_packet_size() {
                    self.maximum_packet_size_recv = size;
                }
                self.need_store = props
                    .session_expiry_interval()
                    .unwrap_or(v5::Property::default_session_expiry_interval())
                    > 0;
                p.keep_alive()
            }
            _ => unreachable!(),
        };

        // The configured override wins over the CONNECT keep alive.
        self.pingreq_send_interval = self.config().pingreq_send_interval().or_else(|| {
            (keep_alive > 0).then(|| std::time::Duration::from_secs(u64::from(keep_alive)))
        });

        self.set_status(ConnectionStatus::Connecting);
        self.reset_pingreq_send_timer(events);
        let chunks = packet.to_chunks().map_err(MqttError::from)?;
        events.push(Event::Send {
            chunks,
            release_on_error: None,
        });
        Ok(())
    }

    fn send_connect_ack(
        &mut self,
        packet: PacketVariant,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        self.require_status(ConnectionStatus::Connecting)?;

        let (accepted, session_present) = match &packet {
            PacketVariant::ConnectAckV3(p) => (
                p.return_code() == crate::v3::ConnectReturnCode::Accepted,
                p.session_present(),
            ),
            PacketVariant::ConnectAckV5(p) => {
                let accepted = p.reason_code() == v5::ReasonCode::Success;
                if accepted {
                    let props = p.properties();
                    self.publish_recv_max = props.receive_maximum();
                    if let Some(maximum) = props.topic_alias_maximum() {
                        if maximum > 0 {
                            self.topic_alias_recv = Some(super::TopicAliasRecv::new(maximum));
                        }
                    }
                    if let Some(size) = props.maximum_packet_size() {
                        self.maximum_packet_size_recv = size;
                    }
                    // The keep alive the server assigns replaces the one the
                    // client requested [MQTT-3.2.2-21].
                    if let Some(keep_alive) = props.server_keep_alive() {
                        self.pingreq_recv_timeout = keep_alive_timeout(keep_alive);
                    }
                }
                (accepted, p.session_present())
            }
            _ => unreachable!(),
        };

        let chunks = packet.to_chunks().map_err(MqttError::from)?;
        events.push(Event::Send {
            chunks,
            release_on_error: None,
        });

        if accepted {
            self.set_status(ConnectionStatus::Connected);
            if session_present {
                self.send_stored(events);
            } else {
                self.drop_session_state(events);
            }
            if self.pingreq_recv_armed {
                if let Some(timeout) = self.pingreq_recv_timeout {
                    events.push(Event::timer_reset(TimerKind::PingreqRecv, timeout));
                }
            }
        } else {
            self.set_status(ConnectionStatus::Disconnected);
            events.push(Event::Close);
        }
        Ok(())
    }

    /// Clear stored session state after a session-present=false handshake.
    pub(crate) fn drop_session_state(&mut self, events: &mut Vec<Event>) {
        self.store.clear();
        self.qos2_publish_handled.clear();
        self.publish_send_count = 0;
        for pid in std::mem::take(&mut self.pid_puback)
            .into_iter()
            .chain(std::mem::take(&mut self.pid_pubrec))
            .chain(std::mem::take(&mut self.pid_pubcomp))
        {
            self.pid_manager.release(pid);
            events.push(Event::PacketIdReleased(PacketId::new(pid)));
        }
    }

    fn send_publish(
        &mut self,
        mut packet: PacketVariant,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        self.require_status(ConnectionStatus::Connected)?;

        let (qos, dup) = match &packet {
            PacketVariant::PublishV3(p) => (p.qos(), p.dup()),
            PacketVariant::PublishV5(p) => (p.qos(), p.dup()),
            _ => unreachable!(),
        };

        // Re-delivery is the engine's duty; the first send of a packet must
        // not claim to be a duplicate.
        if dup {
            return Err(MqttError::ProtocolError);
        }

        let auto_map = self.config().auto_map_topic_alias_send();
        let auto_replace = self.config().auto_replace_topic_alias_send();

        if qos == QoS::AtMostOnce {
            if let PacketVariant::PublishV5(p) = &mut packet {
                Self::apply_topic_alias_policy(
                    p,
                    self.topic_alias_send.as_mut(),
                    auto_map,
                    auto_replace,
                )?;
            }
            return self.emit_plain(packet, events);
        }

        let packet_id = packet
            .packet_id()
            .filter(|packet_id| packet_id.value() != 0)
            .ok_or(MqttError::PacketIdentifierConflict)?;
        if !self.pid_manager.is_used(packet_id.value()) {
            log::error!("connection: publish with unregistered packet id {packet_id}");
            return Err(MqttError::PacketIdentifierConflict);
        }
        if self.store.contains(packet_id) {
            return Err(MqttError::PacketIdentifierConflict);
        }

        // Flow control: the peer accepts only so many concurrent flows.
        // Queued packets keep their full topic name; alias mappings may
        // change before they are finally written.
        if let Some(max) = self.publish_send_max {
            if self.publish_send_count >= max {
                if self.config().offline_publish() {
                    self.publish_queue.push_back(packet);
                    return Err(MqttError::PacketEnqueued);
                }
                return Err(MqttError::ReceiveMaximumExceeded);
            }
        }

        if let PacketVariant::PublishV5(p) = &mut packet {
            Self::apply_topic_alias_policy(
                p,
                self.topic_alias_send.as_mut(),
                auto_map,
                auto_replace,
            )?;
        }

        self.emit_publish_flow(packet, packet_id, qos, events)
    }

    /// Emit one `QoS` 1/2 publish: store it, track its identifier, count it
    /// against the flow quota.
    fn emit_publish_flow(
        &mut self,
        packet: PacketVariant,
        packet_id: PacketId,
        qos: QoS,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        let entry = match &packet {
            PacketVariant::PublishV3(p) => StorePacket::PublishV3(p.clone()),
            PacketVariant::PublishV5(p) => {
                StorePacket::PublishV5(self.regulate_for_store(p.clone())?)
            }
            _ => unreachable!(),
        };
        self.store.add(entry)?;

        if qos == QoS::ExactOnce {
            self.pid_pubrec.insert(packet_id.value());
        } else {
            self.pid_puback.insert(packet_id.value());
        }
        self.publish_send_count = self.publish_send_count.saturating_add(1);

        self.reset_pingreq_send_timer(events);
        let chunks = packet.to_chunks().map_err(MqttError::from)?;
        let release_on_error = (!self.need_store).then_some(packet_id);
        events.push(Event::Send {
            chunks,
            release_on_error,
        });
        Ok(())
    }

    /// Move queued publishes out while flow quota is available.
    pub(crate) fn drain_publish_queue(&mut self, events: &mut Vec<Event>) {
        loop {
            if let Some(max) = self.publish_send_max {
                if self.publish_send_count >= max {
                    return;
                }
            }
            let Some(packet) = self.publish_queue.pop_front() else {
                return;
            };
            let (qos, packet_id) = match (&packet, packet.packet_id()) {
                (PacketVariant::PublishV3(p), Some(packet_id)) => (p.qos(), packet_id),
                (PacketVariant::PublishV5(p), Some(packet_id)) => (p.qos(), packet_id),
                _ => continue,
            };
            if let Err(err) = self.emit_publish_flow(packet, packet_id, qos, events) {
                log::error!("connection: dropping queued publish: {err:?}");
                events.push(Event::Error(err));
            }
        }
    }

    fn apply_topic_alias_policy(
        packet: &mut v5::PublishPacket,
        table: Option<&mut super::TopicAliasSend>,
        auto_map: bool,
        auto_replace: bool,
    ) -> Result<(), MqttError> {
        let Some(table) = table else {
            // The peer did not advertise alias support; any alias on the
            // packet is a protocol violation.
            if packet.topic_alias().is_some() {
                return Err(MqttError::TopicAliasInvalid);
            }
            if packet.topic().is_empty() {
                return Err(MqttError::TopicAliasInvalid);
            }
            return Ok(());
        };

        if let Some(alias) = packet.topic_alias() {
            // The host picked an alias itself; validate and track it.
            if alias == 0 || alias > table.maximum() {
                return Err(MqttError::TopicAliasInvalid);
            }
            if packet.topic().is_empty() {
                if table.find_topic(alias).is_none() {
                    return Err(MqttError::TopicAliasInvalid);
                }
            } else {
                let topic = packet.topic().to_string();
                table.insert_or_update(&topic, alias);
            }
            return Ok(());
        }

        if packet.topic().is_empty() {
            return Err(MqttError::TopicAliasInvalid);
        }

        let topic = packet.topic().to_string();
        if let Some(alias) = table.find_alias(&topic) {
            if auto_replace || auto_map {
                packet.set_topic("").map_err(MqttError::from)?;
                packet.set_topic_alias(alias);
            }
            return Ok(());
        }

        if auto_map {
            if let Some(alias) = table.lru_alias() {
                table.insert_or_update(&topic, alias);
                // Keep the full topic on the wire for the send which
                // installs the mapping at the receiver.
                packet.set_topic_alias(alias);
            }
        }
        Ok(())
    }

    fn send_publish_response(
        &mut self,
        packet: PacketVariant,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        self.require_status(ConnectionStatus::Connected)?;
        if let Some(packet_id) = packet.packet_id() {
            // PUBACK and PUBCOMP end an inbound flow.
            self.publish_recv.remove(&packet_id.value());
        }
        self.emit_plain(packet, events)
    }

    fn send_publish_received(
        &mut self,
        packet: PacketVariant,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        self.require_status(ConnectionStatus::Connected)?;
        let error_reason = match &packet {
            PacketVariant::PublishReceivedV5(p) => p.reason_code().is_error(),
            _ => false,
        };
        if error_reason {
            // An error-coded PUBREC terminates the inbound flow at once.
            if let Some(packet_id) = packet.packet_id() {
                let pid = packet_id.value();
                self.publish_recv.remove(&pid);
                self.qos2_publish_handled.remove(&pid);
                self.qos2_publish_processing.remove(&pid);
            }
        }
        self.emit_plain(packet, events)
    }

    fn send_publish_release(
        &mut self,
        packet: PacketVariant,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        self.require_status(ConnectionStatus::Connected)?;
        let packet_id = packet
            .packet_id()
            .ok_or(MqttError::PacketIdentifierConflict)?;
        if !self.pid_manager.is_used(packet_id.value()) {
            return Err(MqttError::PacketIdentifierConflict);
        }

        let entry = match &packet {
            PacketVariant::PublishReleaseV3(p) => StorePacket::PubrelV3(*p),
            PacketVariant::PublishReleaseV5(p) => StorePacket::PubrelV5(p.clone()),
            _ => unreachable!(),
        };
        if !self.store.replace_publish_with_pubrel(packet_id, entry.clone()) {
            // Already swapped when PUBREC arrived, or restored as PUBREL.
            if !self.store.contains(packet_id) {
                self.store.add(entry)?;
            }
        }
        self.pid_pubrec.remove(&packet_id.value());
        self.pid_pubcomp.insert(packet_id.value());

        self.emit_plain(packet, events)
    }

    fn send_subscribe_kind(
        &mut self,
        packet: PacketVariant,
        subscribe: bool,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        self.require_status(ConnectionStatus::Connected)?;
        let packet_id = packet
            .packet_id()
            .filter(|packet_id| packet_id.value() != 0)
            .ok_or(MqttError::PacketIdentifierConflict)?;
        let pid = packet_id.value();
        if !self.pid_manager.is_used(pid) {
            log::error!("connection: subscribe with unregistered packet id {packet_id}");
            return Err(MqttError::PacketIdentifierConflict);
        }
        if self.pid_suback.contains(&pid) || self.pid_unsuback.contains(&pid) {
            return Err(MqttError::PacketIdentifierConflict);
        }

        if subscribe {
            self.pid_suback.insert(pid);
        } else {
            self.pid_unsuback.insert(pid);
        }

        self.reset_pingreq_send_timer(events);
        let chunks = packet.to_chunks().map_err(MqttError::from)?;
        events.push(Event::Send {
            chunks,
            release_on_error: Some(packet_id),
        });
        Ok(())
    }

    fn send_disconnect(
        &mut self,
        packet: PacketVariant,
        events: &mut Vec<Event>,
    ) -> Result<(), MqttError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(MqttError::ProtocolError);
        }

        self.set_status(ConnectionStatus::Disconnecting);
        self.cancel_timers(events);
        let chunks = packet.to_chunks().map_err(MqttError::from)?;
        events.push(Event::Send {
            chunks,
            release_on_error: None,
        });

        let delay = self.config().close_delay_after_disconnect_sent();
        if delay.is_zero() {
            events.push(Event::Close);
        } else {
            events.push(Event::timer_reset(TimerKind::CloseByDisconnect, delay));
        }
        Ok(())
    }
}

/// Keep alive of zero disables the watchdog; otherwise the peer must show
/// activity within 1.5 times the interval.
pub(crate) fn keep_alive_timeout(keep_alive: u16) -> Option<std::time::Duration> {
    (keep_alive > 0)
        .then(|| std::time::Duration::from_millis(u64::from(keep_alive) * 1500))
}
