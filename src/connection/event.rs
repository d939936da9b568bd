// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;
use std::time::Duration;

use crate::packet::PacketVariant;
use crate::{MqttError, PacketId};

/// Timers the host maintains on behalf of a connection, keyed per
/// (connection, kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Client side: fires when it is time to send a ping request.
    PingreqSend,

    /// Server side: fires when the peer has been silent for 1.5 times the
    /// keep alive interval.
    PingreqRecv,

    /// Client side: fires when no ping response arrived in the configured
    /// window.
    PingrespRecv,

    /// Either side: delayed transport close after a disconnect packet was
    /// sent.
    CloseByDisconnect,
}

/// What the host must do with a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    /// (Re)arm the timer with the attached duration.
    Reset,

    /// Cancel the timer if armed.
    Cancel,
}

/// One instruction to the host, emitted by the connection engine.
///
/// Events come out of every engine call as an ordered list; the host MUST
/// act on them in that order. Multiple `Send` events must reach the
/// transport in list order to preserve protocol semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Write these chunks to the transport back to back, as one packet.
    ///
    /// If the write fails, the host must release `release_on_error` (when
    /// set) via `Connection::release_packet_id` and then call
    /// `notify_closed`.
    Send {
        chunks: Vec<Bytes>,
        release_on_error: Option<PacketId>,
    },

    /// A complete, validated packet arrived for the host.
    PacketReceived(PacketVariant),

    /// The identifier finished its flow and may be reused.
    PacketIdReleased(PacketId),

    /// Arm, re-arm or cancel a timer.
    Timer {
        op: TimerOp,
        kind: TimerKind,
        duration: Option<Duration>,
    },

    /// Tear down the transport, then call `notify_closed`.
    Close,

    /// A protocol or local error occurred; usually paired with `Close`.
    Error(MqttError),
}

impl Event {
    /// Shorthand for a timer reset event.
    #[must_use]
    pub const fn timer_reset(kind: TimerKind, duration: Duration) -> Self {
        Self::Timer {
            op: TimerOp::Reset,
            kind,
            duration: Some(duration),
        }
    }

    /// Shorthand for a timer cancel event.
    #[must_use]
    pub const fn timer_cancel(kind: TimerKind) -> Self {
        Self::Timer {
            op: TimerOp::Cancel,
            kind,
            duration: None,
        }
    }
}
