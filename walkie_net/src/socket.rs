use core::{net, time::Duration};
use std::io;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::Destination;

/// The subset of a UDP socket the transport needs.
///
/// All methods take `&self`, one socket is shared by the sending and the
/// receiving thread.
pub trait DatagramSocket: Send + Sync {
    fn send_to(&self, buf: &[u8], addr: net::SocketAddr) -> io::Result<usize>;

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, net::SocketAddr)>;

    /// `None` blocks indefinitely. A zero duration is invalid.
    fn set_recv_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn leave_multicast_v4(&self, _group: net::Ipv4Addr) -> io::Result<()> {
        Ok(())
    }
}

impl DatagramSocket for std::net::UdpSocket {
    #[inline(always)]
    fn send_to(&self, buf: &[u8], addr: net::SocketAddr) -> io::Result<usize> {
        self.send_to(buf, addr)
    }

    #[inline(always)]
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, net::SocketAddr)> {
        self.recv_from(buf)
    }

    #[inline(always)]
    fn set_recv_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }

    #[inline(always)]
    fn leave_multicast_v4(&self, group: net::Ipv4Addr) -> io::Result<()> {
        std::net::UdpSocket::leave_multicast_v4(self, &group, &net::Ipv4Addr::UNSPECIFIED)
    }
}

/// Creates the relay socket: bound to `destination`'s port on all interfaces,
/// with address reuse, and member of `destination`'s group if it is a multicast one.
pub fn bind(destination: &Destination) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let local = net::SocketAddrV4::new(net::Ipv4Addr::UNSPECIFIED, destination.port());
    socket.bind(&SockAddr::from(local))?;

    if let Some(group) = destination.group() {
        socket.join_multicast_v4(&group, &net::Ipv4Addr::UNSPECIFIED)?;
        // boards filter their own packets by identity
        socket.set_multicast_loop_v4(true)?;
    }

    Ok(socket.into())
}
