// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::packet::PacketVariant;
use crate::{v3, v5, MqttError, PacketId, QoS};

/// Packet type the peer answers a stored packet with.
///
/// Stored packets are self-describing for session hand-off: a host which
/// rehydrates a session from storage can tell which acknowledgement each
/// entry is still waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePacketType {
    PubackV3,
    PubrecV3,
    PubcompV3,
    PubackV5,
    PubrecV5,
    PubcompV5,
}

/// A persisted outbound packet awaiting acknowledgement.
///
/// Only `QoS` 1/2 publish packets and publish release packets take part in
/// store-and-forward; everything else is fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StorePacket {
    PublishV3(v3::PublishPacket),
    PublishV5(v5::PublishPacket),
    PubrelV3(v3::PublishReleasePacket),
    PubrelV5(v5::PublishReleasePacket),
}

impl StorePacket {
    /// Get packet id of the stored packet.
    #[must_use]
    pub fn packet_id(&self) -> PacketId {
        match self {
            Self::PublishV3(p) => p.packet_id(),
            Self::PublishV5(p) => p.packet_id(),
            Self::PubrelV3(p) => p.packet_id(),
            Self::PubrelV5(p) => p.packet_id(),
        }
    }

    /// Get the packet type which completes this entry's flow.
    #[must_use]
    pub fn response_packet_type(&self) -> ResponsePacketType {
        match self {
            Self::PublishV3(p) => {
                if p.qos() == QoS::ExactOnce {
                    ResponsePacketType::PubrecV3
                } else {
                    ResponsePacketType::PubackV3
                }
            }
            Self::PublishV5(p) => {
                if p.qos() == QoS::ExactOnce {
                    ResponsePacketType::PubrecV5
                } else {
                    ResponsePacketType::PubackV5
                }
            }
            Self::PubrelV3(..) => ResponsePacketType::PubcompV3,
            Self::PubrelV5(..) => ResponsePacketType::PubcompV5,
        }
    }

    /// Convert this entry into a sendable packet with the DUP flag set on
    /// publish variants, as every replay is a potential re-delivery.
    #[must_use]
    pub fn to_retransmit_packet(&self) -> PacketVariant {
        match self {
            Self::PublishV3(p) => {
                let mut p = p.clone();
                if p.qos() != QoS::AtMostOnce {
                    // set_dup only fails for QoS 0, which the store
                    // never holds.
                    let _ignore = p.set_dup(true);
                }
                p.into()
            }
            Self::PublishV5(p) => {
                let mut p = p.clone();
                if p.qos() != QoS::AtMostOnce {
                    let _ignore = p.set_dup(true);
                }
                p.into()
            }
            Self::PubrelV3(p) => (*p).into(),
            Self::PubrelV5(p) => p.clone().into(),
        }
    }
}

/// Insertion-ordered store of packets awaiting acknowledgement.
///
/// Retransmission on session resume walks the entries in insertion order,
/// preserving the original publish order on the wire.
#[derive(Debug, Default, Clone)]
pub struct SendStore {
    entries: Vec<StorePacket>,
}

impl SendStore {
    /// Create an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append `packet`, preserving insertion order.
    ///
    /// # Errors
    ///
    /// Returns `PacketIdentifierConflict` if an entry with the same packet
    /// id exists; this indicates an id allocation bug in the caller.
    pub fn add(&mut self, packet: StorePacket) -> Result<(), MqttError> {
        if self.contains(packet.packet_id()) {
            return Err(MqttError::PacketIdentifierConflict);
        }
        self.entries.push(packet);
        Ok(())
    }

    /// Remove the entry with `packet_id`. Returns true if one was removed.
    pub fn erase(&mut self, packet_id: PacketId) -> bool {
        let old_len = self.entries.len();
        self.entries.retain(|p| p.packet_id() != packet_id);
        self.entries.len() != old_len
    }

    /// Swap the stored `QoS` 2 publish for the publish release which
    /// continues its flow, keeping the entry's position.
    ///
    /// Returns false if no publish entry with `packet_id` exists.
    pub fn replace_publish_with_pubrel(
        &mut self,
        packet_id: PacketId,
        pubrel: StorePacket,
    ) -> bool {
        for entry in &mut self.entries {
            if entry.packet_id() == packet_id
                && matches!(entry, StorePacket::PublishV3(..) | StorePacket::PublishV5(..))
            {
                *entry = pubrel;
                return true;
            }
        }
        false
    }

    /// Check whether an entry with `packet_id` exists.
    #[must_use]
    pub fn contains(&self, packet_id: PacketId) -> bool {
        self.entries.iter().any(|p| p.packet_id() == packet_id)
    }

    /// Get entries in insertion order, for replay after session resume.
    #[must_use]
    pub fn entries(&self) -> &[StorePacket] {
        &self.entries
    }

    /// Get number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish_entry(id: u16) -> StorePacket {
        let mut packet = v5::PublishPacket::new("state", QoS::AtLeastOnce, b"on").unwrap();
        packet.set_packet_id(PacketId::new(id));
        StorePacket::PublishV5(packet)
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let mut store = SendStore::new();
        store.add(publish_entry(1)).unwrap();
        assert_eq!(
            store.add(publish_entry(1)),
            Err(MqttError::PacketIdentifierConflict)
        );
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut store = SendStore::new();
        store.add(publish_entry(3)).unwrap();
        store.add(publish_entry(1)).unwrap();
        store.add(publish_entry(2)).unwrap();
        let ids: Vec<u16> = store
            .entries()
            .iter()
            .map(|p| p.packet_id().value())
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_replace_publish_with_pubrel() {
        let mut store = SendStore::new();
        let mut packet = v5::PublishPacket::new("state", QoS::ExactOnce, b"on").unwrap();
        packet.set_packet_id(PacketId::new(7));
        store.add(StorePacket::PublishV5(packet)).unwrap();

        let pubrel = StorePacket::PubrelV5(v5::PublishReleasePacket::new(PacketId::new(7)));
        assert!(store.replace_publish_with_pubrel(PacketId::new(7), pubrel));
        assert_eq!(
            store.entries()[0].response_packet_type(),
            ResponsePacketType::PubcompV5
        );
    }

    #[test]
    fn test_retransmit_sets_dup() {
        let entry = publish_entry(5);
        match entry.to_retransmit_packet() {
            PacketVariant::PublishV5(p) => assert!(p.dup()),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_erase() {
        let mut store = SendStore::new();
        store.add(publish_entry(9)).unwrap();
        assert!(store.erase(PacketId::new(9)));
        assert!(!store.erase(PacketId::new(9)));
        assert!(store.is_empty());
    }
}
