//! A DHCPv6 client core (RFC 8415, RFC 4704 Client FQDN): wire codec,
//! identity/lease bookkeeping, retransmission scheduling, and the state
//! machine that drives a session from INIT through BOUND and back. The
//! core never touches a socket or the OS address table directly — see
//! `collaborators` for the seams a host implements.

pub mod codec;
pub mod collaborators;
pub mod config;
pub mod duid;
pub mod error;
pub mod fsm;
pub mod identity;
pub mod lease;
pub mod logging;
pub mod persist;
pub mod scheduler;
pub mod transport;

pub use config::SessionConfig;
pub use error::ClientError;
pub use fsm::{ClientState, Session};
