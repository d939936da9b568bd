// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

use crate::{ProtocolVersion, Role};

/// Per-connection configuration.
///
/// Most behaviors default to off, mirroring the protocol's own defaults;
/// hosts opt into the automatic responses they want the engine to produce.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub(crate) role: Role,
    pub(crate) version: ProtocolVersion,

    /// Queue `QoS` 1/2 publish packets while the peer's receive maximum is
    /// exhausted, instead of failing the send call.
    pub(crate) offline_publish: bool,

    /// Automatically answer inbound publish flows with PUBACK / PUBREC /
    /// PUBREL / PUBCOMP.
    pub(crate) auto_pub_response: bool,

    /// Automatically answer PINGREQ with PINGRESP.
    pub(crate) auto_ping_response: bool,

    /// Assign a topic alias to every outbound publish whose topic has none
    /// yet, evicting the least recently used alias when the table is full.
    pub(crate) auto_map_topic_alias_send: bool,

    /// Replace the topic of an outbound publish with its alias when a
    /// mapping already exists.
    pub(crate) auto_replace_topic_alias_send: bool,

    /// How long to wait for PINGRESP after sending PINGREQ before closing
    /// the transport. `None` disables the check.
    pub(crate) pingresp_recv_timeout: Option<Duration>,

    /// Delay between sending a disconnect packet and closing the transport.
    /// Zero closes immediately.
    pub(crate) close_delay_after_disconnect_sent: Duration,

    /// Suggested transport read buffer size, surfaced to the host.
    pub(crate) read_buffer_size: usize,

    /// Whether the host should coalesce consecutive `Send` events into one
    /// gathered write. Surfaced to the host only; the engine emits the same
    /// events either way.
    pub(crate) bulk_write: bool,

    /// Overrides the CONNECT keep-alive as the ping request interval.
    pub(crate) pingreq_send_interval: Option<Duration>,
}

impl ConnectionConfig {
    /// Create a configuration for `role` speaking `version`.
    #[must_use]
    pub fn new(role: Role, version: ProtocolVersion) -> Self {
        Self {
            role,
            version,
            offline_publish: false,
            auto_pub_response: false,
            auto_ping_response: false,
            auto_map_topic_alias_send: false,
            auto_replace_topic_alias_send: false,
            pingresp_recv_timeout: None,
            close_delay_after_disconnect_sent: Duration::ZERO,
            read_buffer_size: 4096,
            bulk_write: false,
            pingreq_send_interval: None,
        }
    }

    /// Get configured role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Get initial protocol version.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Update offline-publish flag.
    pub fn set_offline_publish(&mut self, on: bool) -> &mut Self {
        self.offline_publish = on;
        self
    }

    /// Get offline-publish flag.
    #[must_use]
    pub const fn offline_publish(&self) -> bool {
        self.offline_publish
    }

    /// Update auto-pub-response flag.
    pub fn set_auto_pub_response(&mut self, on: bool) -> &mut Self {
        self.auto_pub_response = on;
        self
    }

    /// Get auto-pub-response flag.
    #[must_use]
    pub const fn auto_pub_response(&self) -> bool {
        self.auto_pub_response
    }

    /// Update auto-ping-response flag.
    pub fn set_auto_ping_response(&mut self, on: bool) -> &mut Self {
        self.auto_ping_response = on;
        self
    }

    /// Get auto-ping-response flag.
    #[must_use]
    pub const fn auto_ping_response(&self) -> bool {
        self.auto_ping_response
    }

    /// Update auto-map flag of send-side topic aliases.
    pub fn set_auto_map_topic_alias_send(&mut self, on: bool) -> &mut Self {
        self.auto_map_topic_alias_send = on;
        self
    }

    /// Get auto-map flag of send-side topic aliases.
    #[must_use]
    pub const fn auto_map_topic_alias_send(&self) -> bool {
        self.auto_map_topic_alias_send
    }

    /// Update auto-replace flag of send-side topic aliases.
    pub fn set_auto_replace_topic_alias_send(&mut self, on: bool) -> &mut Self {
        self.auto_replace_topic_alias_send = on;
        self
    }

    /// Get auto-replace flag of send-side topic aliases.
    #[must_use]
    pub const fn auto_replace_topic_alias_send(&self) -> bool {
        self.auto_replace_topic_alias_send
    }

    /// Update ping response timeout.
    pub fn set_pingresp_recv_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.pingresp_recv_timeout = timeout;
        self
    }

    /// Get ping response timeout.
    #[must_use]
    pub const fn pingresp_recv_timeout(&self) -> Option<Duration> {
        self.pingresp_recv_timeout
    }

    /// Update close delay applied after a disconnect packet is sent.
    pub fn set_close_delay_after_disconnect_sent(&mut self, delay: Duration) -> &mut Self {
        self.close_delay_after_disconnect_sent = delay;
        self
    }

    /// Get close delay applied after a disconnect packet is sent.
    #[must_use]
    pub const fn close_delay_after_disconnect_sent(&self) -> Duration {
        self.close_delay_after_disconnect_sent
    }

    /// Update suggested read buffer size.
    pub fn set_read_buffer_size(&mut self, size: usize) -> &mut Self {
        self.read_buffer_size = size;
        self
    }

    /// Get suggested read buffer size.
    #[must_use]
    pub const fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// Update bulk-write hint.
    pub fn set_bulk_write(&mut self, on: bool) -> &mut Self {
        self.bulk_write = on;
        self
    }

    /// Get bulk-write hint.
    #[must_use]
    pub const fn bulk_write(&self) -> bool {
        self.bulk_write
    }

    /// Update ping request interval override.
    pub fn set_pingreq_send_interval(&mut self, interval: Option<Duration>) -> &mut Self {
        self.pingreq_send_interval = interval;
        self
    }

    /// Get ping request interval override.
    #[must_use]
    pub const fn pingreq_send_interval(&self) -> Option<Duration> {
        self.pingreq_send_interval
    }
}
