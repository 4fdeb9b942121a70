//! Trait seams for everything spec §1/§6 calls an "external collaborator":
//! the IPv6 stack, the UDP transport, and the host callbacks. The core
//! never talks to the OS directly — it only ever talks to these traits, so
//! a host can substitute mocks (as the demo binary does) or a real network
//! stack.

use std::net::Ipv6Addr;
use std::time::Duration;

use crate::fsm::ClientState;

/// Opaque handle the IP stack hands back when an address is registered;
/// the session never interprets it, only stores and returns it (spec §3's
/// ownership note: "the session holds an opaque index used only to delete
/// them").
pub type IpStackIndex = u64;

/// The IPv6 stack collaborator: address table management, default-router
/// list, and source-address selection (spec §6).
pub trait IpStack: Send {
    /// Register `address` on `interface`, returning an opaque slot index.
    fn address_set(&mut self, interface: &str, address: Ipv6Addr, prefix_len: u8) -> Result<IpStackIndex, IpStackError>;

    fn address_delete(&mut self, index: IpStackIndex) -> Result<(), IpStackError>;

    fn default_router_add(&mut self, address: Ipv6Addr, interface: &str, lifetime: Duration) -> Result<(), IpStackError>;

    fn default_router_delete(&mut self, address: Ipv6Addr) -> Result<(), IpStackError>;

    /// Source address to use for a unicast send to `destination`, when the
    /// client is not sending to the multicast all-servers group (spec §6).
    fn select_source_address(&self, interface: &str, destination: Ipv6Addr) -> Option<Ipv6Addr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpStackError;

impl std::fmt::Display for IpStackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IP stack operation failed")
    }
}
impl std::error::Error for IpStackError {}

/// The UDP transport collaborator (spec §6): client port 546, server port
/// 547, destination normally the multicast group `ff02::1:2`.
pub trait UdpTransport: Send {
    fn send_from_source(
        &mut self,
        packet: &[u8],
        dest: Ipv6Addr,
        dest_port: u16,
        source: Option<Ipv6Addr>,
    ) -> Result<(), std::io::Error>;

    /// Block for up to `timeout` waiting for a datagram; `Ok(None)` means
    /// the timeout elapsed with nothing received.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, std::io::Error>;
}

/// The all-DHCPv6-relay-agents-and-servers multicast group (RFC 8415
/// §7.1), used as the destination unless a unicast server address is
/// already known.
pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);
pub const CLIENT_PORT: u16 = 546;
pub const SERVER_PORT: u16 = 547;

/// Fired once per state transition, after the mutation is visible under
/// the session mutex (spec §5's ordering guarantee).
pub trait StateChangeCallback: Send {
    fn on_state_change(&mut self, old: ClientState, new: ClientState);
}

/// Category of error the server-error callback reports, mirroring which
/// stage of reply processing produced it (spec §7's propagation rules).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    TopLevelStatus,
    IaNaStatus,
    IaAddressStatus,
}

/// Fired at most once per received reply option carrying a non-success
/// status (spec §5's ordering guarantee, §7's user-visible behaviour).
pub trait ServerErrorCallback: Send {
    fn on_server_error(&mut self, kind: ServerErrorKind, status_code: u16, message_type: u8);
}

/// Invoked by the IP stack when Duplicate Address Detection completes for
/// a previously-registered address (spec §4.5's DAD paragraph).
pub trait DadNotifier: Send {
    fn on_dad_result(&mut self, index: IpStackIndex, success: bool);
}

/// No-op implementations used by tests and by hosts that don't care about
/// a particular seam.
pub struct NullStateChangeCallback;
impl StateChangeCallback for NullStateChangeCallback {
    fn on_state_change(&mut self, _old: ClientState, _new: ClientState) {}
}

pub struct NullServerErrorCallback;
impl ServerErrorCallback for NullServerErrorCallback {
    fn on_server_error(&mut self, _kind: ServerErrorKind, _status_code: u16, _message_type: u8) {}
}
