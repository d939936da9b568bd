// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Inbound byte stream handling.

use bytes::Bytes;

use super::send::keep_alive_timeout;
use super::{Connection, ConnectionStatus, Event, FrameError, StorePacket, TimerKind};
use crate::packet::{sniff_connect_version, PacketVariant};
use crate::{
    v3, v5, ByteArray, MqttError, PacketId, PacketType, ProtocolVersion, QoS,
};

impl Connection {
    /// Feed raw transport bytes into the engine.
    ///
    /// Any number of bytes is fine; the engine frames them internally and
    /// processes every completed packet. Protocol errors become events,
    /// never panics or return values.
    pub fn recv(&mut self, data: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut frames = Vec::new();
        self.assembler.feed(data, &mut frames);

        for frame in frames {
            match frame {
                Ok(frame) => {
                    self.process_frame(&frame, &mut events);
                }
                Err(FrameError::PacketTooLarge) => {
                    log::error!("connection: malformed remaining length in stream");
                    self.protocol_violation(
                        MqttError::PacketTooLarge,
                        v5::ReasonCode::PacketTooLarge,
                        &mut events,
                    );
                }
            }
            // A violation tears the stream down; later frames are garbage.
            if self.status() == ConnectionStatus::Disconnecting
                || self.status() == ConnectionStatus::Disconnected
            {
                break;
            }
        }
        events
    }

    fn process_frame(&mut self, frame: &Bytes, events: &mut Vec<Event>) {
        if frame.len() > self.maximum_packet_size_recv as usize {
            log::error!(
                "connection: peer sent {} bytes, over our maximum {}",
                frame.len(),
                self.maximum_packet_size_recv
            );
            self.protocol_violation(
                MqttError::PacketTooLarge,
                v5::ReasonCode::PacketTooLarge,
                events,
            );
            return;
        }

        // A server learns the protocol version from the first CONNECT.
        if self.protocol_version() == ProtocolVersion::Undetermined {
            match sniff_connect_version(frame) {
                Ok(version) => self.set_version(version),
                Err(err) => {
                    log::error!("connection: cannot determine version: {err:?}");
                    self.protocol_violation(
                        MqttError::MalformedPacket,
                        v5::ReasonCode::MalformedPacket,
                        events,
                    );
                    return;
                }
            }
        }

        let mut ba = ByteArray::from_bytes(frame);
        let packet = match PacketVariant::decode(&mut ba, self.protocol_version()) {
            Ok(packet) => packet,
            Err(err) => {
                log::error!("connection: failed to decode packet: {err:?}");
                let error = MqttError::from(err);
                let reason = match error {
                    MqttError::PacketTooLarge => v5::ReasonCode::PacketTooLarge,
                    MqttError::ProtocolError => v5::ReasonCode::ProtocolError,
                    _ => v5::ReasonCode::MalformedPacket,
                };
                self.protocol_violation(error, reason, events);
                return;
            }
        };

        if !self.check_role_can_recv(packet.packet_type()) {
            self.protocol_violation(
                MqttError::ProtocolError,
                v5::ReasonCode::ProtocolError,
                events,
            );
            return;
        }

        // Any traffic from the peer proves it is alive.
        self.reset_pingreq_recv_timer(events);

        match packet {
            PacketVariant::ConnectV3(..) | PacketVariant::ConnectV5(..) => {
                self.recv_connect(packet, events);
            }
            PacketVariant::ConnectAckV3(..) | PacketVariant::ConnectAckV5(..) => {
                self.recv_connect_ack(packet, events);
            }
            PacketVariant::PublishV3(..) | PacketVariant::PublishV5(..) => {
                self.recv_publish(packet, events);
            }
            PacketVariant::PublishAckV3(..) | PacketVariant::PublishAckV5(..) => {
                self.recv_publish_ack(&packet, events);
            }
            PacketVariant::PublishReceivedV3(..) | PacketVariant::PublishReceivedV5(..) => {
                self.recv_publish_received(&packet, events);
            }
            PacketVariant::PublishReleaseV3(..) | PacketVariant::PublishReleaseV5(..) => {
                self.recv_publish_release(&packet, events);
            }
            PacketVariant::PublishCompleteV3(..) | PacketVariant::PublishCompleteV5(..) => {
                self.recv_publish_complete(&packet, events);
            }
            PacketVariant::SubscribeV3(..)
            | PacketVariant::SubscribeV5(..)
            | PacketVariant::UnsubscribeV3(..)
            | PacketVariant::UnsubscribeV5(..) => {
                if self.status() != ConnectionStatus::Connected {
                    self.protocol_violation(
                        MqttError::ProtocolError,
                        v5::ReasonCode::ProtocolError,
                        events,
                    );
                    return;
                }
                events.push(Event::PacketReceived(packet));
            }
            PacketVariant::SubscribeAckV3(..) | PacketVariant::SubscribeAckV5(..) => {
                self.recv_subscribe_ack_kind(packet, true, events);
            }
            PacketVariant::UnsubscribeAckV3(..) | PacketVariant::UnsubscribeAckV5(..) => {
                self.recv_subscribe_ack_kind(packet, false, events);
            }
            PacketVariant::PingRequestV3(..) | PacketVariant::PingRequestV5(..) => {
                events.push(Event::PacketReceived(packet));
                if self.config().auto_ping_response() {
                    let response: PacketVariant =
                        if self.protocol_version() == ProtocolVersion::V5_0 {
                            v5::PingResponsePacket::new().into()
                        } else {
                            v3::PingResponsePacket::new().into()
                        };
                    self.emit_packet_best_effort(response, events);
                }
            }
            PacketVariant::PingResponseV3(..) | PacketVariant::PingResponseV5(..) => {
                if self.pingresp_recv_armed {
                    self.pingresp_recv_armed = false;
                    events.push(Event::timer_cancel(TimerKind::PingrespRecv));
                }
                events.push(Event::PacketReceived(packet));
            }
            PacketVariant::DisconnectV3(..) | PacketVariant::DisconnectV5(..) => {
                self.cancel_timers(events);
                self.set_status(ConnectionStatus::Disconnecting);
                events.push(Event::PacketReceived(packet));
                events.push(Event::Close);
            }
            PacketVariant::AuthV5(..) => {
                if self.status() != ConnectionStatus::Connecting
                    && self.status() != ConnectionStatus::Connected
                {
                    self.protocol_violation(
                        MqttError::ProtocolError,
                        v5::ReasonCode::ProtocolError,
                        events,
                    );
                    return;
                }
                // The host drives the re-authentication exchange.
                events.push(Event::PacketReceived(packet));
            }
        }
    }

    fn check_role_can_recv(&self, packet_type: PacketType) -> bool {
        match packet_type {
            // What the peer may send is the mirror of what we may.
            PacketType::Connect
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::PingRequest => self.is_server_side(),
            PacketType::ConnectAck
            | PacketType::SubscribeAck
            | PacketType::UnsubscribeAck
            | PacketType::PingResponse => self.is_client_side(),
            PacketType::Disconnect => {
                if self.protocol_version() == ProtocolVersion::V3_1_1 {
                    self.is_server_side()
                } else {
                    true
                }
            }
            _ => true,
        }
    }

    /// Emit an error event, optionally a disconnect packet, and close.
    pub(crate) fn protocol_violation(
        &mut self,
        error: MqttError,
        reason: v5::ReasonCode,
        events: &mut Vec<Event>,
    ) {
        events.push(Event::Error(error));
        if self.protocol_version() == ProtocolVersion::V5_0
            && self.status() == ConnectionStatus::Connected
        {
            let disconnect = v5::DisconnectPacket::with_reason(reason);
            self.emit_packet_best_effort(disconnect.into(), events);
        }
        self.cancel_timers(events);
        self.set_status(ConnectionStatus::Disconnecting);
        events.push(Event::Close);
    }

    fn reset_pingreq_recv_timer(&mut self, events: &mut Vec<Event>) {
        if !self.is_server_side() {
            return;
        }
        if let Some(timeout) = self.pingreq_recv_timeout {
            self.pingreq_recv_armed = true;
            events.push(Event::timer_reset(TimerKind::PingreqRecv, timeout));
        }
    }

    fn recv_connect(&mut self, packet: PacketVariant, events: &mut Vec<Event>) {
        // The Server MUST process a second CONNECT packet sent from a
        // Client as a protocol violation [MQTT-3.1.0-2].
        if self.status() != ConnectionStatus::Disconnected {
            self.protocol_violation(
                MqttError::ProtocolError,
                v5::ReasonCode::ProtocolError,
                events,
            );
            return;
        }

        let keep_alive = match &packet {
            PacketVariant::ConnectV3(p) => {
                self.need_store = !p.connect_flags().clean_session();
                p.keep_alive()
            }
            PacketVariant::ConnectV5(p) => {
                let props = p.properties();
                self.publish_send_max =
                    Some(props.receive_maximum().unwrap_or_else(v5::Property::default_receive_maximum));
                let alias_maximum = props
                    .topic_alias_maximum()
                    .unwrap_or_else(v5::Property::default_topic_alias_maximum);
                if alias_maximum > 0 {
                    self.topic_alias_send = Some(super::TopicAliasSend::new(alias_maximum));
                }
                if let Some(size) = props.maximum_packet_size() {
                    self.maximum_packet_size_send = size;
                }
                self.need_store = props
                    .session_expiry_interval()
                    .unwrap_or_else(v5::Property::default_session_expiry_interval)
                    > 0;
                p.keep_alive()
            }
            _ => unreachable!(),
        };

        self.pingreq_recv_timeout = keep_alive_timeout(keep_alive);
        self.reset_pingreq_recv_timer(events);

        self.set_status(ConnectionStatus::Connecting);
        events.push(Event::PacketReceived(packet));
    }

    fn recv_connect_ack(&mut self, packet: PacketVariant, events: &mut Vec<Event>) {
        if self.status() != ConnectionStatus::Connecting {
            self.protocol_violation(
                MqttError::ProtocolError,
                v5::ReasonCode::ProtocolError,
                events,
            );
            return;
        }

        let (accepted, session_present) = match &packet {
            PacketVariant::ConnectAckV3(p) => (
                p.return_code() == v3::ConnectReturnCode::Accepted,
                p.session_present(),
            ),
            PacketVariant::ConnectAckV5(p) => {
                let accepted = p.reason_code() == v5::ReasonCode::Success;
                if accepted {
                    let props = p.properties();
                    self.publish_send_max = Some(
                        props
                            .receive_maximum()
                            .unwrap_or_else(v5::Property::default_receive_maximum),
                    );
                    let alias_maximum = props
                        .topic_alias_maximum()
                        .unwrap_or_else(v5::Property::default_topic_alias_maximum);
                    if alias_maximum > 0 {
                        self.topic_alias_send =
                            Some(super::TopicAliasSend::new(alias_maximum));
                    }
                    if let Some(size) = props.maximum_packet_size() {
                        self.maximum_packet_size_send = size;
                    }
                    // The keep alive assigned by the server replaces the
                    // value sent on CONNECT [MQTT-3.2.2-21].
                    if let Some(keep_alive) = props.server_keep_alive() {
                        self.pingreq_send_interval =
                            self.config().pingreq_send_interval().or_else(|| {
                                (keep_alive > 0).then(|| {
                                    std::time::Duration::from_secs(u64::from(keep_alive))
                                })
                            });
                    }
                }
                (accepted, p.session_present())
            }
            _ => unreachable!(),
        };

        events.push(Event::PacketReceived(packet));

        if accepted {
            self.set_status(ConnectionStatus::Connected);
            if session_present {
                self.send_stored(events);
            } else {
                // The server kept nothing; neither may we.
                self.drop_session_state(events);
            }
            self.reset_pingreq_send_timer(events);
        } else {
            self.cancel_timers(events);
            self.set_status(ConnectionStatus::Disconnected);
            events.push(Event::Close);
        }
    }

    fn recv_publish(&mut self, mut packet: PacketVariant, events: &mut Vec<Event>) {
        if self.status() != ConnectionStatus::Connected {
            self.protocol_violation(
                MqttError::ProtocolError,
                v5::ReasonCode::ProtocolError,
                events,
            );
            return;
        }

        if let PacketVariant::PublishV5(p) = &mut packet {
            if let Err((error, reason)) = Self::resolve_recv_topic_alias(
                p,
                self.topic_alias_recv.as_mut(),
            ) {
                self.protocol_violation(error, reason, events);
                return;
            }

            // A payload declared as UTF-8 character data must actually
            // be well-formed UTF-8.
            if p.properties().payload_format_indicator() == Some(true)
                && std::str::from_utf8(&p.message().to_vec()).is_err()
            {
                self.protocol_violation(
                    MqttError::PayloadFormatInvalid,
                    v5::ReasonCode::PayloadFormatInvalid,
                    events,
                );
                return;
            }
        }

        let (qos, packet_id) = match &packet {
            PacketVariant::PublishV3(p) => (p.qos(), p.packet_id()),
            PacketVariant::PublishV5(p) => (p.qos(), p.packet_id()),
            _ => unreachable!(),
        };

        match qos {
            QoS::AtMostOnce => {
                events.push(Event::PacketReceived(packet));
            }
            QoS::AtLeastOnce => {
                let pid = packet_id.value();
                self.publish_recv.insert(pid);
                if self.publish_recv_overflow() {
                    self.protocol_violation(
                        MqttError::ReceiveMaximumExceeded,
                        v5::ReasonCode::ReceiveMaximumExceeded,
                        events,
                    );
                    return;
                }
                events.push(Event::PacketReceived(packet));
                if self.config().auto_pub_response() {
                    let response: PacketVariant =
                        if self.protocol_version() == ProtocolVersion::V5_0 {
                            v5::PublishAckPacket::new(packet_id).into()
                        } else {
                            v3::PublishAckPacket::new(packet_id).into()
                        };
                    self.publish_recv.remove(&pid);
                    self.emit_packet_best_effort(response, events);
                }
            }
            QoS::ExactOnce => {
                let pid = packet_id.value();
                if self.qos2_publish_handled.contains(&pid) {
                    // Duplicate delivery attempt: acknowledge again, but
                    // the host sees the message only once.
                    log::info!("connection: suppressing duplicate qos2 publish {pid}");
                    if self.config().auto_pub_response() {
                        self.emit_pubrec(packet_id, events);
                    }
                    return;
                }
                self.publish_recv.insert(pid);
                if self.publish_recv_overflow() {
                    self.protocol_violation(
                        MqttError::ReceiveMaximumExceeded,
                        v5::ReasonCode::ReceiveMaximumExceeded,
                        events,
                    );
                    return;
                }
                self.qos2_publish_handled.insert(pid);
                self.qos2_publish_processing.insert(pid);
                events.push(Event::PacketReceived(packet));
                if self.config().auto_pub_response() {
                    self.emit_pubrec(packet_id, events);
                }
            }
        }
    }

    fn emit_pubrec(&mut self, packet_id: PacketId, events: &mut Vec<Event>) {
        let response: PacketVariant = if self.protocol_version() == ProtocolVersion::V5_0 {
            v5::PublishReceivedPacket::new(packet_id).into()
        } else {
            v3::PublishReceivedPacket::new(packet_id).into()
        };
        self.emit_packet_best_effort(response, events);
    }

    fn publish_recv_overflow(&self) -> bool {
        match self.publish_recv_max {
            Some(max) => self.publish_recv.len() > usize::from(max),
            None => false,
        }
    }

    /// Enforce receive-side topic alias rules and rewrite the packet to
    /// carry its full topic name.
    fn resolve_recv_topic_alias(
        packet: &mut v5::PublishPacket,
        table: Option<&mut super::TopicAliasRecv>,
    ) -> Result<(), (MqttError, v5::ReasonCode)> {
        match packet.topic_alias() {
            Some(alias) => {
                let Some(table) = table else {
                    // We advertised no alias support at all.
                    return Err((
                        MqttError::TopicAliasInvalid,
                        v5::ReasonCode::TopicAliasInvalid,
                    ));
                };
                if alias == 0 || alias > table.maximum() {
                    return Err((
                        MqttError::TopicAliasInvalid,
                        v5::ReasonCode::TopicAliasInvalid,
                    ));
                }
                if packet.topic().is_empty() {
                    let Some(topic) = table.find_topic(alias).map(str::to_string) else {
                        // Alias used before any mapping was installed.
                        return Err((
                            MqttError::ProtocolError,
                            v5::ReasonCode::ProtocolError,
                        ));
                    };
                    if packet.set_topic(&topic).is_err() {
                        return Err((
                            MqttError::TopicNameInvalid,
                            v5::ReasonCode::TopicNameInvalid,
                        ));
                    }
                } else {
                    let topic = packet.topic().to_string();
                    table.insert(alias, &topic);
                }
                Ok(())
            }
            None => {
                if packet.topic().is_empty() {
                    // No topic and no alias leaves the message unroutable.
                    return Err((MqttError::ProtocolError, v5::ReasonCode::ProtocolError));
                }
                Ok(())
            }
        }
    }

    fn recv_publish_ack(&mut self, packet: &PacketVariant, events: &mut Vec<Event>) {
        let Some(packet_id) = packet.packet_id() else {
            return;
        };
        let pid = packet_id.value();
        if !self.pid_puback.remove(&pid) {
            log::error!("connection: puback for unknown packet id {packet_id}");
            self.protocol_violation(
                MqttError::ProtocolError,
                v5::ReasonCode::ProtocolError,
                events,
            );
            return;
        }

        self.store.erase(packet_id);
        self.pid_manager.release(pid);
        events.push(Event::PacketReceived(packet.clone()));
        events.push(Event::PacketIdReleased(packet_id));

        self.publish_send_count = self.publish_send_count.saturating_sub(1);
        self.drain_publish_queue(events);
    }

    fn recv_publish_received(&mut self, packet: &PacketVariant, events: &mut Vec<Event>) {
        let Some(packet_id) = packet.packet_id() else {
            return;
        };
        let pid = packet_id.value();
        if !self.pid_pubrec.contains(&pid) {
            log::error!("connection: pubrec for unknown packet id {packet_id}");
            self.protocol_violation(
                MqttError::ProtocolError,
                v5::ReasonCode::ProtocolError,
                events,
            );
            return;
        }

        let error_reason = match packet {
            PacketVariant::PublishReceivedV5(p) => p.reason_code().is_error(),
            _ => false,
        };

        if error_reason {
            // The flow ends here: no release packet follows an error.
            self.pid_pubrec.remove(&pid);
            self.store.erase(packet_id);
            self.pid_manager.release(pid);
            events.push(Event::PacketReceived(packet.clone()));
            events.push(Event::PacketIdReleased(packet_id));
            self.publish_send_count = self.publish_send_count.saturating_sub(1);
            self.drain_publish_queue(events);
            return;
        }

        self.pid_pubrec.remove(&pid);
        self.pid_pubcomp.insert(pid);
        let pubrel_entry: StorePacket = if self.protocol_version() == ProtocolVersion::V5_0 {
            StorePacket::PubrelV5(v5::PublishReleasePacket::new(packet_id))
        } else {
            StorePacket::PubrelV3(v3::PublishReleasePacket::new(packet_id))
        };
        self.store
            .replace_publish_with_pubrel(packet_id, pubrel_entry);

        events.push(Event::PacketReceived(packet.clone()));
        if self.config().auto_pub_response() {
            let response: PacketVariant = if self.protocol_version() == ProtocolVersion::V5_0 {
                v5::PublishReleasePacket::new(packet_id).into()
            } else {
                v3::PublishReleasePacket::new(packet_id).into()
            };
            self.reset_pingreq_send_timer(events);
            self.emit_packet_best_effort(response, events);
        }
    }

    fn recv_publish_release(&mut self, packet: &PacketVariant, events: &mut Vec<Event>) {
        let Some(packet_id) = packet.packet_id() else {
            return;
        };
        let pid = packet_id.value();

        // The sender finished its part; the id no longer identifies a
        // duplicate-suppressed message.
        self.qos2_publish_handled.remove(&pid);
        self.qos2_publish_processing.remove(&pid);
        self.publish_recv.remove(&pid);

        events.push(Event::PacketReceived(packet.clone()));
        if self.config().auto_pub_response() {
            let response: PacketVariant = if self.protocol_version() == ProtocolVersion::V5_0 {
                v5::PublishCompletePacket::new(packet_id).into()
            } else {
                v3::PublishCompletePacket::new(packet_id).into()
            };
            self.emit_packet_best_effort(response, events);
        }
    }

    fn recv_publish_complete(&mut self, packet: &PacketVariant, events: &mut Vec<Event>) {
        let Some(packet_id) = packet.packet_id() else {
            return;
        };
        let pid = packet_id.value();
        if !self.pid_pubcomp.remove(&pid) {
            log::error!("connection: pubcomp for unknown packet id {packet_id}");
            self.protocol_violation(
                MqttError::ProtocolError,
                v5::ReasonCode::ProtocolError,
                events,
            );
            return;
        }

        self.store.erase(packet_id);
        self.pid_manager.release(pid);
        events.push(Event::PacketReceived(packet.clone()));
        events.push(Event::PacketIdReleased(packet_id));

        self.publish_send_count = self.publish_send_count.saturating_sub(1);
        self.drain_publish_queue(events);
    }

    fn recv_subscribe_ack_kind(
        &mut self,
        packet: PacketVariant,
        subscribe: bool,
        events: &mut Vec<Event>,
    ) {
        let Some(packet_id) = packet.packet_id() else {
            return;
        };
        let pid = packet_id.value();
        let known = if subscribe {
            self.pid_suback.remove(&pid)
        } else {
            self.pid_unsuback.remove(&pid)
        };
        if !known {
            log::error!("connection: ack for unknown packet id {packet_id}");
            self.protocol_violation(
                MqttError::ProtocolError,
                v5::ReasonCode::ProtocolError,
                events,
            );
            return;
        }

        self.pid_manager.release(pid);
        events.push(Event::PacketReceived(packet));
        events.push(Event::PacketIdReleased(packet_id));
    }
}
