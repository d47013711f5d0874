use core::{net, time::Duration};
use std::{
    io,
    sync::atomic::{AtomicU32, Ordering},
    time::SystemTime,
};

use walkie_proto::{Flags, Packet, Timestamp};

use crate::{DatagramSocket, Destination, TransportError, io_err_is_timeout};

/// Shorter receive timeouts are rounded up to this.
pub const MIN_RECV_TIMEOUT: Duration = Duration::from_millis(1);

/// A parsed datagram, borrowing the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct Received<'a> {
    pub packet: Packet<'a>,
    /// Size of the datagram on the wire.
    pub len: usize,
    pub source: net::SocketAddr,
}

#[inline]
fn now() -> Timestamp {
    let since_epoch = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    Timestamp::from_unix(since_epoch)
}

/// Sends and receives relay packets over a single socket.
///
/// Sending and receiving only need `&self`, so one transport may be shared by
/// a sending and a receiving thread.
#[derive(Debug)]
pub struct PacketTransport<S: DatagramSocket = std::net::UdpSocket> {
    socket: Option<S>,
    board_id: u32,
    destination: Destination,
    next_seq: AtomicU32,
}

impl PacketTransport {
    /// Binds the relay port and joins the destination's group, if any.
    pub fn initialize(board_id: u32, destination: Destination) -> Result<Self, TransportError> {
        let socket = crate::bind(&destination).map_err(TransportError::NetworkUnavailable)?;

        log::info!("network initialized: {destination}, board {board_id}");

        Ok(Self::with_socket(socket, board_id, destination))
    }
}

impl<S: DatagramSocket> PacketTransport<S> {
    /// Wraps an already set up socket.
    pub fn with_socket(socket: S, board_id: u32, destination: Destination) -> Self {
        Self {
            socket: Some(socket),
            board_id,
            destination,
            next_seq: AtomicU32::new(0),
        }
    }

    #[inline(always)]
    pub fn board_id(&self) -> u32 {
        self.board_id
    }

    #[inline(always)]
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    #[inline(always)]
    pub fn socket(&self) -> Option<&S> {
        self.socket.as_ref()
    }

    /// The sequence number the next send will use.
    #[inline(always)]
    pub fn next_sequence(&self) -> u32 {
        self.next_seq.load(Ordering::Relaxed)
    }

    #[inline(always)]
    fn open_socket(&self) -> Result<&S, TransportError> {
        self.socket.as_ref().ok_or(TransportError::Closed)
    }

    /// Sends one packet, returning the number of bytes put on the wire.
    ///
    /// Every call consumes one sequence number, whether or not it succeeds.
    /// Only the header and `payload` are sent.
    pub fn send(&self, payload: &[u8], flags: Flags) -> Result<usize, TransportError> {
        let socket = self.open_socket()?;
        let seq_num = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let packet = Packet::new(self.board_id, seq_num, now(), flags, payload)
            .map_err(TransportError::InvalidPacket)?;
        let datagram = packet.encode();

        let sent = socket
            .send_to(&datagram, self.destination.addr().into())
            .map_err(TransportError::SendFailed)?;

        if sent != datagram.len() {
            return Err(TransportError::SendFailed(io::ErrorKind::WriteZero.into()));
        }

        log::trace!("sent seq {seq_num}, {sent} bytes, flags {:#04x}", flags.bits());

        Ok(sent)
    }

    #[inline(always)]
    pub fn send_start(&self) -> Result<usize, TransportError> {
        self.send(&[], Flags::START)
    }

    #[inline(always)]
    pub fn send_end(&self) -> Result<usize, TransportError> {
        self.send(&[], Flags::END)
    }

    #[inline(always)]
    pub fn send_audio(&self, payload: &[u8]) -> Result<usize, TransportError> {
        self.send(payload, Flags::NONE)
    }

    /// Waits at most `timeout` for a datagram, and parses it.
    ///
    /// Returns `Ok(None)` if nothing arrived in time. `buf` should be
    /// [`MAX_DATAGRAM_LEN`](walkie_proto::MAX_DATAGRAM_LEN) bytes long, longer
    /// datagrams are truncated by the socket.
    pub fn receive<'a>(
        &self,
        timeout: Duration,
        buf: &'a mut [u8],
    ) -> Result<Option<Received<'a>>, TransportError> {
        let socket = self.open_socket()?;

        socket
            .set_recv_timeout(Some(timeout.max(MIN_RECV_TIMEOUT)))
            .map_err(TransportError::ReceiveFailed)?;

        let (len, source) = match socket.recv_from(buf) {
            Ok(received) => received,
            Err(e) if io_err_is_timeout(e.kind()) => return Ok(None),
            Err(e) => return Err(TransportError::ReceiveFailed(e)),
        };

        let datagram: &'a [u8] = buf;
        let packet = Packet::decode(&datagram[..len])?;

        Ok(Some(Received {
            packet,
            len,
            source,
        }))
    }

    /// Leaves the multicast group, if any, and closes the socket. Idempotent.
    pub fn cleanup(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };

        if let Some(group) = self.destination.group()
            && let Err(e) = socket.leave_multicast_v4(group)
        {
            log::warn!("failed to leave multicast group {group}: {e}");
        }

        log::info!("network closed");
    }
}

impl<S: DatagramSocket> Drop for PacketTransport<S> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
