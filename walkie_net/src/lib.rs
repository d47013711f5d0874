//! UDP transport for relay packets.
//!
//! A [`PacketTransport`] owns one socket, bound to the relay port, and uses it
//! both ways:
//!
//! - outgoing packets are stamped with the board's identity, the next sequence
//!   number and the current wall-clock time, then sent to a fixed [`Destination`],
//!   either a single peer or a multicast group.
//! - incoming datagrams are received with a bounded timeout and parsed, a
//!   timeout being reported as "nothing received" rather than as an error.
//!
//! The socket itself is abstracted by [`DatagramSocket`], so the relay loops can
//! be driven over an in-memory socket in tests.

use core::{fmt, net};
use std::io;

mod socket;
mod transport;

pub use socket::{DatagramSocket, bind};
pub use transport::{MIN_RECV_TIMEOUT, PacketTransport, Received};

/// Default multicast group all boards join.
pub const DEFAULT_GROUP: net::Ipv4Addr = net::Ipv4Addr::new(239, 0, 0, 1);

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(#[source] io::Error),
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),
    #[error("malformed datagram: {0}")]
    Malformed(#[from] walkie_proto::WireError),
    #[error("refusing to send invalid packet: {0}")]
    InvalidPacket(#[source] walkie_proto::WireError),
    #[error("transport is closed")]
    Closed,
}

/// Where outgoing packets go. Incoming packets are accepted on the same port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Unicast(net::SocketAddrV4),
    Multicast(net::SocketAddrV4),
}

impl Destination {
    #[inline(always)]
    pub const fn addr(&self) -> net::SocketAddrV4 {
        match *self {
            Self::Unicast(addr) | Self::Multicast(addr) => addr,
        }
    }

    #[inline(always)]
    pub const fn port(&self) -> u16 {
        self.addr().port()
    }

    /// The multicast group to join, if any.
    #[inline(always)]
    pub const fn group(&self) -> Option<net::Ipv4Addr> {
        match *self {
            Self::Multicast(addr) => Some(*addr.ip()),
            Self::Unicast(_) => None,
        }
    }

    #[inline(always)]
    pub const fn is_multicast(&self) -> bool {
        matches!(self, Self::Multicast(_))
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::Multicast(net::SocketAddrV4::new(DEFAULT_GROUP, DEFAULT_PORT))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unicast(addr) => write!(f, "unicast to {addr}"),
            Self::Multicast(addr) => write!(f, "multicast group {addr}"),
        }
    }
}

/// Returns `true` if the given I/O error kind represents a receive timeout.
///
/// Both `WouldBlock` and `TimedOut` count, as platforms differ on which one
/// an expired `SO_RCVTIMEO` produces.
#[inline(always)]
pub(crate) fn io_err_is_timeout(e: io::ErrorKind) -> bool {
    use io::ErrorKind::*;
    [WouldBlock, TimedOut].contains(&e)
}
