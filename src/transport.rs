//! A concrete `UdpTransport` over `std::net::UdpSocket`, for hosts that
//! don't want to supply their own. Blocking, with a read timeout set per
//! receive call — the same style as the teacher's `v6/worker.rs` socket
//! loop, minus the multi-tenant dispatch (this is a single client session).

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6, UdpSocket};
use std::time::Duration;

use tracing::trace;

use crate::collaborators::{self, UdpTransport};

/// A `UdpSocket` bound to the DHCPv6 client port, joined to the
/// all-relay-agents-and-servers multicast group on the given interface.
pub struct StdUdpTransport {
    socket: UdpSocket,
}

impl StdUdpTransport {
    pub fn bind(interface_index: u32) -> std::io::Result<Self> {
        let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, collaborators::CLIENT_PORT, 0, 0);
        let socket = UdpSocket::bind(bind_addr)?;
        socket.join_multicast_v6(&collaborators::ALL_DHCP_RELAY_AGENTS_AND_SERVERS, interface_index)?;
        Ok(StdUdpTransport { socket })
    }
}

impl UdpTransport for StdUdpTransport {
    fn send_from_source(
        &mut self,
        packet: &[u8],
        dest: Ipv6Addr,
        dest_port: u16,
        _source: Option<Ipv6Addr>,
    ) -> Result<(), std::io::Error> {
        trace!(bytes = packet.len(), %dest, "sending DHCPv6 message");
        let dest = SocketAddr::V6(SocketAddrV6::new(dest, dest_port, 0, 0));
        self.socket.send_to(packet, dest)?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, std::io::Error> {
        self.socket.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; 1500];
        match self.socket.recv(&mut buf) {
            Ok(n) => {
                trace!(bytes = n, "received datagram");
                Ok(Some(buf[..n].to_vec()))
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
